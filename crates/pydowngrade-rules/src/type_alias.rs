//! Rule: Convert `type Name[T] = value` to `Name: TypeAlias = value`
//!
//! Type parameters of a generic alias become declarations in the enclosing
//! scope; the value is kept as written.

use pydowngrade_core::{AuxiliaryDeclaration, Pattern, SyntaxNode};

use crate::captures::Captures;
use crate::registry::{Rewrite, Rule, RuleError};
use crate::type_params::{declarations, parse_type_params, TYPING};

pub struct TypeAliasRule;

impl Rule for TypeAliasRule {
    fn name(&self) -> &'static str {
        "type_alias"
    }

    fn description(&self) -> &'static str {
        "Convert type statements to TypeAlias annotations (PEP 695 -> 3.11)"
    }

    fn pattern(&self) -> Pattern {
        Pattern::kind("type_alias_statement")
            .named_child(0, Pattern::kind("type").capture("target"))
            .named_child(1, Pattern::kind("type").capture("value"))
    }

    fn guard(&self, captures: &Captures<'_>) -> bool {
        match captures.node("target").and_then(alias_target) {
            Some((_, None)) => true,
            Some((_, Some(params))) => parse_type_params(params).is_some(),
            None => false,
        }
    }

    fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError> {
        let target = captures.require("target")?;
        let (name, params) =
            alias_target(target).ok_or_else(|| RuleError::new("unsupported alias target"))?;

        let mut declared = vec![AuxiliaryDeclaration::import(TYPING, "TypeAlias")];
        if let Some(params) = params {
            let params = parse_type_params(params)
                .ok_or_else(|| RuleError::new("unsupported type parameter list"))?;
            declared.extend(declarations(&params, captures));
        }
        captures.discard(target.span());

        let replacement = format!(
            "{}: {} = {}",
            name.text(),
            captures.symbol("TypeAlias"),
            captures.text("value")?,
        );

        Ok(Rewrite {
            replacement,
            declarations: declared,
        })
    }
}

/// Alias name and optional parameter list of `Name` or `Name[params]`
fn alias_target(target: SyntaxNode<'_>) -> Option<(SyntaxNode<'_>, Option<SyntaxNode<'_>>)> {
    let children = target.named_children();
    let [inner] = children.as_slice() else {
        return None;
    };

    match inner.kind() {
        "identifier" => Some((*inner, None)),
        "generic_type" => match inner.named_children().as_slice() {
            [name, params] if name.kind() == "identifier" && params.kind() == "type_parameter" => {
                Some((*name, Some(*params)))
            }
            _ => None,
        },
        _ => None,
    }
}
