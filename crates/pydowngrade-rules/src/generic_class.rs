//! Rule: Convert `class Name[T](Base):` to `class Name(Base, Generic[T]):`
//!
//! The type parameters become `TypeVar`/`TypeVarTuple`/`ParamSpec`
//! declarations in the enclosing scope and the class gains `Generic[...]`
//! as its last positional base. Everything after the header is preserved.

use pydowngrade_core::{AuxiliaryDeclaration, Pattern, Span, SyntaxNode};

use crate::captures::Captures;
use crate::registry::{Rewrite, Rule, RuleError};
use crate::type_params::{declarations, parse_type_params, TYPING};

pub struct GenericClassRule;

impl Rule for GenericClassRule {
    fn name(&self) -> &'static str {
        "generic_class"
    }

    fn description(&self) -> &'static str {
        "Convert class type parameters to a Generic[...] base (PEP 695 -> 3.11)"
    }

    fn pattern(&self) -> Pattern {
        Pattern::kind("class_definition")
            .field("name", Pattern::kind("identifier").capture("name"))
            .field("type_parameters", Pattern::kind("type_parameter").capture("params"))
            .optional_field("superclasses", Pattern::kind("argument_list").capture("bases"))
    }

    fn guard(&self, captures: &Captures<'_>) -> bool {
        captures
            .node("params")
            .and_then(parse_type_params)
            .is_some()
    }

    fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError> {
        let root = captures.root().span();
        let params_node = captures.require("params")?;
        let params = parse_type_params(params_node)
            .ok_or_else(|| RuleError::new("unsupported type parameter list"))?;

        let arguments: Vec<String> = params.iter().map(|p| p.generic_argument(captures)).collect();
        let generic = format!("{}[{}]", captures.symbol("Generic"), arguments.join(", "));

        let mut declarations = declarations(&params, captures);
        declarations.insert(0, AuxiliaryDeclaration::import(TYPING, "Generic"));
        captures.discard(params_node.span());

        let head = captures.render(Span::new(root.start, params_node.span().start));
        let replacement = match captures.node("bases") {
            None => format!("{head}({generic}){}", captures.tail("params")?),
            Some(bases) => {
                let (at, inserted) = generic_slot(bases, &generic);
                format!(
                    "{head}{}{inserted}{}",
                    captures.render(Span::new(params_node.span().end, at)),
                    captures.render(Span::new(at, root.end)),
                )
            }
        };

        Ok(Rewrite {
            replacement,
            declarations,
        })
    }
}

/// Offset inside the base list where `Generic[...]` goes, and the text to
/// insert there: before the first keyword argument, else after the last
/// positional base, else right after the opening parenthesis
fn generic_slot(bases: SyntaxNode<'_>, generic: &str) -> (usize, String) {
    let arguments = bases.named_children();

    if let Some(keyword) = arguments
        .iter()
        .find(|a| matches!(a.kind(), "keyword_argument" | "dictionary_splat"))
    {
        return (keyword.span().start, format!("{generic}, "));
    }

    match arguments.last() {
        Some(last) => (last.span().end, format!(", {generic}")),
        None => (bases.span().start + 1, generic.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RewriteEngine, RuleSet};

    fn transform(source: &str) -> String {
        let mut rules = RuleSet::new();
        rules.register(Box::new(GenericClassRule)).unwrap();
        RewriteEngine::new(rules).rewrite_str(source).unwrap()
    }

    // ==================== Basic Transformation Tests ====================

    #[test]
    fn test_simple_generic_class() {
        let source = "class Box[T]:\n    def get(self) -> T: ...\n";
        assert_eq!(
            transform(source),
            "from typing import Generic, TypeVar\n\
             T = TypeVar(\"T\")\n\
             class Box(Generic[T]):\n    def get(self) -> T: ...\n"
        );
    }

    #[test]
    fn test_existing_bases() {
        let source = "class Pair[K, V](Base, Mixin):\n    pass\n";
        let output = transform(source);
        assert!(output.contains("class Pair(Base, Mixin, Generic[K, V]):\n    pass\n"));
    }

    #[test]
    fn test_empty_parentheses() {
        let source = "class Box[T]():\n    pass\n";
        assert!(transform(source).contains("class Box(Generic[T]):\n"));
    }

    #[test]
    fn test_keyword_bases_stay_last() {
        let source = "class Meta[T](Base, metaclass=ABCMeta):\n    pass\n";
        assert!(transform(source).contains("class Meta(Base, Generic[T], metaclass=ABCMeta):\n"));

        let source = "class Meta[T](metaclass=ABCMeta, **kw):\n    pass\n";
        assert!(transform(source).contains("class Meta(Generic[T], metaclass=ABCMeta, **kw):\n"));
    }

    #[test]
    fn test_variadic_and_param_spec() {
        let source = "class Call[*Ts, **P]:\n    pass\n";
        let output = transform(source);
        assert!(output.contains("from typing import Generic, ParamSpec, TypeVarTuple\n"));
        assert!(output.contains("Ts = TypeVarTuple(\"Ts\")\nP = ParamSpec(\"P\")\n"));
        assert!(output.contains("class Call(Generic[*Ts, P]):\n"));
    }

    #[test]
    fn test_body_and_comments_preserved() {
        let source = "class Box[T]:  # holds one item\n    item: T\n\n    # accessor\n    def get(self) -> T:\n        return self.item\n";
        let output = transform(source);
        assert!(output.ends_with(
            "class Box(Generic[T]):  # holds one item\n    item: T\n\n    # accessor\n    def get(self) -> T:\n        return self.item\n"
        ));
    }

    // ==================== Skip Cases ====================

    #[test]
    fn test_plain_class_unchanged() {
        let source = "class Plain(Base):\n    pass\n";
        assert_eq!(transform(source), source);
    }
}
