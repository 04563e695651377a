//! Rule: Convert `def name[T](x: T) -> T:` to `def name(x: T) -> T:`
//!
//! The parameter list is dropped and each parameter becomes a declaration
//! in the scope enclosing the function.

use pydowngrade_core::{Pattern, Span};

use crate::captures::Captures;
use crate::registry::{Rewrite, Rule, RuleError};
use crate::type_params::{declarations, parse_type_params};

pub struct GenericFunctionRule;

impl Rule for GenericFunctionRule {
    fn name(&self) -> &'static str {
        "generic_function"
    }

    fn description(&self) -> &'static str {
        "Convert function type parameters to TypeVar declarations (PEP 695 -> 3.11)"
    }

    fn pattern(&self) -> Pattern {
        Pattern::kind("function_definition")
            .field("name", Pattern::kind("identifier").capture("name"))
            .field("type_parameters", Pattern::kind("type_parameter").capture("params"))
            .field("parameters", Pattern::kind("parameters"))
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

        let declarations = declarations(&params, captures);
        captures.discard(params_node.span());

        let replacement = format!(
            "{}{}",
            captures.render(Span::new(root.start, params_node.span().start)),
            captures.tail("params")?,
        );

        Ok(Rewrite {
            replacement,
            declarations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RewriteEngine, RuleSet};

    fn transform(source: &str) -> String {
        let mut rules = RuleSet::new();
        rules.register(Box::new(GenericFunctionRule)).unwrap();
        RewriteEngine::new(rules).rewrite_str(source).unwrap()
    }

    #[test]
    fn test_simple_generic_function() {
        let source = "import os\n\ndef first[T](items: list[T]) -> T:\n    return items[0]\n";
        assert_eq!(
            transform(source),
            "import os\n\
             from typing import TypeVar\n\
             T = TypeVar(\"T\")\n\
             \n\
             def first(items: list[T]) -> T:\n    return items[0]\n"
        );
    }

    #[test]
    fn test_async_and_decorated() {
        let source = "@cache\nasync def fetch[K, V](key: K) -> V:\n    ...\n";
        let output = transform(source);
        assert!(output.contains("@cache\nasync def fetch(key: K) -> V:\n    ...\n"));
        assert!(output.contains("K = TypeVar(\"K\")\nV = TypeVar(\"V\")\n"));
    }

    #[test]
    fn test_param_spec() {
        let source = "def wrap[**P, R](f: Callable[P, R]) -> Callable[P, R]:\n    return f\n";
        let output = transform(source);
        assert!(output.starts_with("from typing import ParamSpec, TypeVar\nP = ParamSpec(\"P\")\nR = TypeVar(\"R\")\n"));
        assert!(output.contains("def wrap(f: Callable[P, R]) -> Callable[P, R]:\n"));
    }

    #[test]
    fn test_method_declarations_go_to_module() {
        let source = "class Repo:\n    def get[T](self, kind: type[T]) -> T:\n        ...\n";
        let output = transform(source);
        assert!(output.starts_with("from typing import TypeVar\nT = TypeVar(\"T\")\nclass Repo:\n"));
        assert!(output.contains("    def get(self, kind: type[T]) -> T:\n"));
    }

    #[test]
    fn test_nested_function_declares_in_enclosing_body() {
        let source = "def outer():\n    def inner[T](x: T) -> T:\n        return x\n    return inner\n";
        assert_eq!(
            transform(source),
            "from typing import TypeVar\n\
             def outer():\n    T = TypeVar(\"T\")\n    def inner(x: T) -> T:\n        return x\n    return inner\n"
        );
    }

    #[test]
    fn test_plain_function_unchanged() {
        let source = "def plain(x):\n    return x\n";
        assert_eq!(transform(source), source);
    }
}
