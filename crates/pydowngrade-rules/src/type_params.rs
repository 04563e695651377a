//! PEP 695 type parameter lists and their `typing` equivalents
//!
//! Every parameter in `[T, U: Bound, V: (A, B), *Ts, **P]` becomes a
//! module- or block-level declaration built from a `typing` helper:
//!
//! ```text
//! T         ->  T = TypeVar("T")
//! U: Bound  ->  U = TypeVar("U", bound="Bound")
//! V: (A, B) ->  V = TypeVar("V", "A", "B")
//! *Ts       ->  Ts = TypeVarTuple("Ts")
//! **P       ->  P = ParamSpec("P")
//! ```
//!
//! Bounds and constraints are emitted as forward-reference strings, since
//! the declaration is hoisted above the construct that may define them.

use std::collections::HashSet;

use pydowngrade_core::{AuxiliaryDeclaration, SyntaxNode};

use crate::captures::Captures;

/// Module every helper symbol is imported from
pub const TYPING: &str = "typing";

/// Runtime constructor a type parameter declaration uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeParamKind {
    TypeVar,
    TypeVarTuple,
    ParamSpec,
}

impl TypeParamKind {
    /// `typing` helper constructing this kind of parameter
    pub fn helper(self) -> &'static str {
        match self {
            TypeParamKind::TypeVar => "TypeVar",
            TypeParamKind::TypeVarTuple => "TypeVarTuple",
            TypeParamKind::ParamSpec => "ParamSpec",
        }
    }
}

/// One entry of a `type_parameter` list
#[derive(Debug, Clone)]
pub struct TypeParam<'t> {
    pub name: SyntaxNode<'t>,
    pub kind: TypeParamKind,
    pub bound: Option<SyntaxNode<'t>>,
    pub constraints: Vec<SyntaxNode<'t>>,
}

/// Parse a `type_parameter` node.
///
/// Returns `None` for any shape without a pre-3.12 equivalent (unknown
/// parameter syntax, duplicate names), which callers treat as a non-match.
pub fn parse_type_params<'t>(list: SyntaxNode<'t>) -> Option<Vec<TypeParam<'t>>> {
    if list.kind() != "type_parameter" {
        return None;
    }

    let mut params = Vec::new();
    let mut seen = HashSet::new();
    for entry in list.named_children() {
        let param = parse_param(entry)?;
        if !seen.insert(param.name.text()) {
            return None;
        }
        params.push(param);
    }

    if params.is_empty() {
        None
    } else {
        Some(params)
    }
}

fn parse_param(entry: SyntaxNode<'_>) -> Option<TypeParam<'_>> {
    let inner = only_child(entry, "type")?;
    match inner.kind() {
        "identifier" => Some(TypeParam {
            name: inner,
            kind: TypeParamKind::TypeVar,
            bound: None,
            constraints: Vec::new(),
        }),
        "splat_type" => {
            let name = inner.named_child(0).filter(|n| n.kind() == "identifier")?;
            let kind = if inner.text().starts_with("**") {
                TypeParamKind::ParamSpec
            } else {
                TypeParamKind::TypeVarTuple
            };
            Some(TypeParam {
                name,
                kind,
                bound: None,
                constraints: Vec::new(),
            })
        }
        "constrained_type" => {
            let parts = inner.named_children();
            let [target, bound] = parts.as_slice() else {
                return None;
            };
            let name = only_child(*target, "type").filter(|n| n.kind() == "identifier")?;
            if bound.kind() != "type" {
                return None;
            }

            match only_child(*bound, "type") {
                Some(tuple) if tuple.kind() == "tuple" => {
                    let constraints = tuple.named_children();
                    // A single constraint is rejected at runtime
                    if constraints.len() < 2 {
                        return None;
                    }
                    Some(TypeParam {
                        name,
                        kind: TypeParamKind::TypeVar,
                        bound: None,
                        constraints,
                    })
                }
                _ => Some(TypeParam {
                    name,
                    kind: TypeParamKind::TypeVar,
                    bound: Some(*bound),
                    constraints: Vec::new(),
                }),
            }
        }
        _ => None,
    }
}

/// The single named child of a node of kind `kind`
fn only_child<'t>(node: SyntaxNode<'t>, kind: &str) -> Option<SyntaxNode<'t>> {
    if node.kind() != kind {
        return None;
    }
    match node.named_children().as_slice() {
        [child] => Some(*child),
        _ => None,
    }
}

impl<'t> TypeParam<'t> {
    /// Name as written in the parameter list
    pub fn proposed_name(&self) -> &'t str {
        self.name.text()
    }

    /// How the parameter is spelled inside `Generic[...]`
    pub fn generic_argument(&self, captures: &Captures<'_>) -> String {
        let name = captures.declared_name(self.proposed_name());
        match self.kind {
            TypeParamKind::TypeVarTuple => format!("*{name}"),
            TypeParamKind::TypeVar | TypeParamKind::ParamSpec => name,
        }
    }

    /// `name = Helper("name", ...)` binding for this parameter
    pub fn declaration(&self, captures: &Captures<'_>) -> AuxiliaryDeclaration {
        let name = captures.declared_name(self.proposed_name());
        let helper = captures.symbol(self.kind.helper());

        let mut args = vec![format!("\"{name}\"")];
        args.extend(self.constraints.iter().map(|c| forward_ref(captures, *c)));
        if let Some(bound) = self.bound {
            args.push(format!("bound={}", forward_ref(captures, bound)));
        }

        AuxiliaryDeclaration::binding(
            captures.scope(),
            self.proposed_name(),
            format!("{name} = {helper}({})", args.join(", ")),
        )
    }
}

/// Helper imports followed by one binding per parameter
pub fn declarations(params: &[TypeParam<'_>], captures: &Captures<'_>) -> Vec<AuxiliaryDeclaration> {
    let mut helpers: Vec<TypeParamKind> = params.iter().map(|p| p.kind).collect();
    helpers.sort();
    helpers.dedup();

    let mut declarations: Vec<AuxiliaryDeclaration> = helpers
        .into_iter()
        .map(|kind| AuxiliaryDeclaration::import(TYPING, kind.helper()))
        .collect();
    declarations.extend(params.iter().map(|p| p.declaration(captures)));
    declarations
}

/// A type expression as a string literal, whitespace collapsed
fn forward_ref(captures: &Captures<'_>, node: SyntaxNode<'_>) -> String {
    let value = if node.kind() == "type" {
        only_child(node, "type").unwrap_or(node)
    } else {
        node
    };
    if value.kind() == "string" {
        return captures.render(value.span());
    }

    let text = captures
        .render(node.span())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.contains('"') {
        format!("'{}'", text.replace('\'', "\\'"))
    } else {
        format!("\"{text}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pydowngrade_core::{Pattern, SourceText, SyntaxTree};

    fn with_params<R>(source: &str, f: impl FnOnce(Option<Vec<TypeParam<'_>>>, &Captures<'_>) -> R) -> R {
        let tree = SyntaxTree::parse(&SourceText::new(source)).unwrap();
        let list = tree.root().find("type_parameter").unwrap();
        let construct = list.parent().unwrap();
        let bindings = Pattern::any().matches(construct).unwrap();
        let captures = Captures::new(&bindings);
        f(parse_type_params(list), &captures)
    }

    fn declaration_texts(source: &str) -> Vec<String> {
        with_params(source, |params, captures| {
            declarations(&params.unwrap(), captures)
                .into_iter()
                .map(|d| d.text)
                .collect()
        })
    }

    #[test]
    fn test_all_parameter_forms() {
        let texts = declaration_texts(
            "class A[T, U: int, V: (str, bytes), *Ts, **P]:\n    pass\n",
        );
        assert_eq!(
            texts,
            vec![
                "from typing import TypeVar",
                "from typing import TypeVarTuple",
                "from typing import ParamSpec",
                "T = TypeVar(\"T\")",
                "U = TypeVar(\"U\", bound=\"int\")",
                "V = TypeVar(\"V\", \"str\", \"bytes\")",
                "Ts = TypeVarTuple(\"Ts\")",
                "P = ParamSpec(\"P\")",
            ]
        );
    }

    #[test]
    fn test_bound_whitespace_is_collapsed() {
        let texts = declaration_texts("def f[K: Mapping[str,\n        int]](k: K): ...\n");
        assert_eq!(texts[1], "K = TypeVar(\"K\", bound=\"Mapping[str, int]\")");
    }

    #[test]
    fn test_bound_with_double_quotes_uses_single_quotes() {
        let texts = declaration_texts("def f[T: Literal[\"a\"]](x: T): ...\n");
        assert_eq!(texts[1], "T = TypeVar(\"T\", bound='Literal[\"a\"]')");
    }

    #[test]
    fn test_string_bound_kept_verbatim() {
        let texts = declaration_texts("class Node[T: \"Node\"]:\n    pass\n");
        assert_eq!(texts[1], "T = TypeVar(\"T\", bound=\"Node\")");
    }

    #[test]
    fn test_generic_arguments() {
        with_params("class A[T, *Ts, **P]:\n    pass\n", |params, captures| {
            let args: Vec<String> = params
                .unwrap()
                .iter()
                .map(|p| p.generic_argument(captures))
                .collect();
            assert_eq!(args, vec!["T", "*Ts", "P"]);
        });
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        with_params("class A[T, T]:\n    pass\n", |params, _| {
            assert!(params.is_none());
        });
    }

    #[test]
    fn test_module_scope_for_top_level_construct() {
        with_params("def f[T](x: T) -> T:\n    return x\n", |params, captures| {
            let decl = params.unwrap()[0].declaration(captures);
            assert_eq!(decl.scope, pydowngrade_core::Scope::Module);
            assert_eq!(decl.name, "T");
        });
    }
}
