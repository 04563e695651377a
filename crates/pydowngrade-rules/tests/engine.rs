use pydowngrade_core::{Pattern, SourceText};
use pydowngrade_rules::{
    rewrite_source, Captures, Rewrite, RewriteEngine, RewriteError, Rule, RuleError, RuleSet,
};

fn transform(source: &str) -> String {
    rewrite_source(source).unwrap()
}

// ==================== Scenarios ====================

#[test]
fn test_generic_alias_with_bound() {
    let source = "
type NodeProcessed[CalledMethodT: CalledMethod] = TypedNode[
    ProcessedTreeNodeData[CalledMethodBad]
]
";
    let expected = "
from typing import TypeAlias, TypeVar
CalledMethodT = TypeVar(\"CalledMethodT\", bound=\"CalledMethod\")
NodeProcessed: TypeAlias = TypedNode[
    ProcessedTreeNodeData[CalledMethodBad]
]
";
    assert_eq!(transform(source), expected);
}

#[test]
fn test_generic_class_after_prologue() {
    let source = "\"\"\"Module doc.\"\"\"\nfrom __future__ import annotations\n\nclass Box[T]:\n    pass\n";
    assert_eq!(
        transform(source),
        "\"\"\"Module doc.\"\"\"\n\
         from __future__ import annotations\n\
         from typing import Generic, TypeVar\n\
         T = TypeVar(\"T\")\n\
         \n\
         class Box(Generic[T]):\n    pass\n"
    );
}

#[test]
fn test_trailing_comment_stays_on_its_import() {
    let source = "import os  # needed\n\nclass Box[T]:\n    pass\n";
    assert_eq!(
        transform(source),
        "import os  # needed\n\
         from typing import Generic, TypeVar\n\
         T = TypeVar(\"T\")\n\
         \n\
         class Box(Generic[T]):\n    pass\n"
    );
}

#[test]
fn test_import_after_first_statement_is_not_reused() {
    let source = "x = 1\nfrom typing import TypeVar\n\nclass Box[T]:\n    pass\n";
    assert_eq!(
        transform(source),
        "from typing import Generic, TypeVar as TypeVar_2\n\
         T = TypeVar_2(\"T\")\n\
         x = 1\n\
         from typing import TypeVar\n\
         \n\
         class Box(Generic[T]):\n    pass\n"
    );
}

#[test]
fn test_import_at_end_of_module_is_not_reused() {
    let source = "def f[T](x: T) -> T: ...\nfrom typing import TypeVar\n";
    let output = transform(source);
    let declared = output.find("T = TypeVar_2(\"T\")").unwrap();
    let imported = output.find("import TypeVar as TypeVar_2").unwrap();
    assert!(imported < declared);
}

#[test]
fn test_no_matches_is_identity() {
    let source = "import os\n\n# nothing new here\ndef f(x):\n    return os.path.join(x, 'y')\n";
    let outcome = RewriteEngine::default()
        .rewrite(&SourceText::named("plain.py", source))
        .unwrap();
    assert!(!outcome.is_changed());
    assert_eq!(outcome.source.text(), source);
    assert_eq!(outcome.source.name(), Some("plain.py"));
}

#[test]
fn test_malformed_input_fails_with_position() {
    let source = "class Box[T]:\n    def get(self, x: T\n";
    let err = rewrite_source(source).unwrap_err();
    assert!(matches!(err, RewriteError::Parse(_)));
    assert!(err.position().line >= 1);
    assert!(!err.message().is_empty());
}

#[test]
fn test_nested_constructs_compose() {
    let source = "def make():\n    class Box[T]:\n        def map[U](self, f: Callable[[T], U]) -> \"Box[U]\":\n            ...\n    return Box\n";
    assert_eq!(
        transform(source),
        "from typing import Generic, TypeVar\n\
         def make():\n    \
         T = TypeVar(\"T\")\n    \
         U = TypeVar(\"U\")\n    \
         class Box(Generic[T]):\n        \
         def map(self, f: Callable[[T], U]) -> \"Box[U]\":\n            \
         ...\n    \
         return Box\n"
    );
}

#[test]
fn test_nested_declarations_inside_rewritten_function() {
    let source = "def outer[T](x: T) -> T:\n    def inner[U](y: U) -> U:\n        return y\n    return x\n";
    assert_eq!(
        transform(source),
        "from typing import TypeVar\n\
         T = TypeVar(\"T\")\n\
         def outer(x: T) -> T:\n    \
         U = TypeVar(\"U\")\n    \
         def inner(y: U) -> U:\n        \
         return y\n    \
         return x\n"
    );
}

#[test]
fn test_single_line_body_is_unresolvable() {
    let source = "def f(): type Pair[T] = tuple[T, T]\n";
    let err = rewrite_source(source).unwrap_err();
    assert!(matches!(err, RewriteError::UnresolvableInjection { .. }));
}

// ==================== Name Safety ====================

#[test]
fn test_colliding_type_parameter_is_renamed() {
    let source = "T = 5\n\nclass Box[T]:\n    def get(self) -> T:\n        return self.item\n";
    assert_eq!(
        transform(source),
        "from typing import Generic, TypeVar\n\
         T_2 = TypeVar(\"T_2\")\n\
         T = 5\n\
         \n\
         class Box(Generic[T_2]):\n    \
         def get(self) -> T_2:\n        \
         return self.item\n"
    );
}

#[test]
fn test_colliding_helper_is_aliased() {
    let source = "Generic = object\n\nclass Box[T]:\n    pass\n";
    assert_eq!(
        transform(source),
        "from typing import Generic as Generic_2, TypeVar\n\
         T = TypeVar(\"T\")\n\
         Generic = object\n\
         \n\
         class Box(Generic_2[T]):\n    pass\n"
    );
}

#[test]
fn test_existing_import_is_reused() {
    let source = "from typing import TypeVar\n\ndef f[T](x: T) -> T:\n    return x\n";
    assert_eq!(
        transform(source),
        "from typing import TypeVar\n\
         T = TypeVar(\"T\")\n\
         \n\
         def f(x: T) -> T:\n    return x\n"
    );
}

#[test]
fn test_identical_declarations_are_shared() {
    let source = "def first[T](xs: list[T]) -> T:\n    return xs[0]\n\n\ndef last[T](xs: list[T]) -> T:\n    return xs[-1]\n";
    let output = transform(source);
    assert_eq!(output.matches("T = TypeVar(\"T\")").count(), 1);
    assert!(output.contains("def first(xs: list[T]) -> T:"));
    assert!(output.contains("def last(xs: list[T]) -> T:"));
}

#[test]
fn test_differing_declarations_get_distinct_names() {
    let source = "def a[T](x: T) -> T:\n    return x\n\ndef b[T: int](x: T) -> T:\n    return x\n";
    assert_eq!(
        transform(source),
        "from typing import TypeVar\n\
         T = TypeVar(\"T\")\n\
         T_2 = TypeVar(\"T_2\", bound=\"int\")\n\
         def a(x: T) -> T:\n    return x\n\
         \n\
         def b(x: T_2) -> T_2:\n    return x\n"
    );
}

#[test]
fn test_attribute_named_like_parameter_is_not_renamed() {
    let source = "T = 1\n\ndef f[T](obj) -> T:\n    return obj.T\n";
    let output = transform(source);
    assert!(output.contains("def f(obj) -> T_2:\n    return obj.T\n"));
}

#[test]
fn test_nested_parameter_keeps_its_name() {
    let source = "T = 1\ndef g[T](x: T) -> T:\n    def h(T):\n        return T\n    return h(T=x)\n";
    assert_eq!(
        transform(source),
        "from typing import TypeVar\n\
         T_2 = TypeVar(\"T_2\")\n\
         T = 1\n\
         def g(x: T_2) -> T_2:\n    \
         def h(T):\n        \
         return T\n    \
         return h(T=x)\n"
    );
}

#[test]
fn test_nested_lambda_parameter_keeps_its_name() {
    let source = "T = 1\ndef g[T](x: T, y: T = None) -> T:\n    pick = lambda T, *rest: T\n    return pick(x)\n";
    let output = transform(source);
    assert!(output.contains("def g(x: T_2, y: T_2 = None) -> T_2:"));
    assert!(output.contains("pick = lambda T, *rest: T\n"));
}

// ==================== Properties ====================

const MIXED: &str = "\"\"\"Containers.\"\"\"\nimport abc\n\ntype Pair[K, V] = tuple[K, V]\n\nclass Registry[K, V](abc.ABC, metaclass=abc.ABCMeta):\n    def lookup[D](self, key: K, default: D) -> V | D:\n        ...\n\ndef wrap[**P, R](f: Callable[P, R]) -> Callable[P, R]:\n    return f\n";

#[test]
fn test_rewrite_is_idempotent() {
    let once = transform(MIXED);
    let twice = transform(&once);
    assert_eq!(once, twice);
}

#[test]
fn test_rewrite_is_deterministic() {
    assert_eq!(transform(MIXED), transform(MIXED));
}

#[test]
fn test_applied_spans_never_cross() {
    let outcome = RewriteEngine::default()
        .rewrite(&SourceText::new(MIXED))
        .unwrap();
    assert_eq!(outcome.applied.len(), 4);
    for a in &outcome.applied {
        for b in &outcome.applied {
            if a != b {
                assert!(!a.span.conflicts_with(&b.span));
            }
        }
    }
}

#[test]
fn test_output_has_no_new_syntax_left() {
    let output = transform(MIXED);
    assert!(!output.contains("type Pair"));
    assert!(output.contains("Pair: TypeAlias = tuple[K, V]"));
    assert!(output.contains("class Registry(abc.ABC, Generic[K, V], metaclass=abc.ABCMeta):"));
    assert!(output.contains("def lookup(self, key: K, default: D) -> V | D:"));
    assert!(output.contains("def wrap(f: Callable[P, R]) -> Callable[P, R]:"));
}

// ==================== Custom Rules ====================

struct EraseClassRule;

impl Rule for EraseClassRule {
    fn name(&self) -> &'static str {
        "erase_class"
    }

    fn description(&self) -> &'static str {
        "Replace every class with pass"
    }

    fn pattern(&self) -> Pattern {
        Pattern::kind("class_definition")
    }

    fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError> {
        captures.discard(captures.root().span());
        Ok(Rewrite {
            replacement: "pass".to_string(),
            declarations: Vec::new(),
        })
    }
}

/// Returns the original function text, ignoring nested rewrites
struct VerbatimFunctionRule;

impl Rule for VerbatimFunctionRule {
    fn name(&self) -> &'static str {
        "verbatim_function"
    }

    fn description(&self) -> &'static str {
        "Copy functions unchanged"
    }

    fn pattern(&self) -> Pattern {
        Pattern::kind("function_definition")
    }

    fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError> {
        Ok(Rewrite {
            replacement: captures.root().text().to_string(),
            declarations: Vec::new(),
        })
    }
}

fn engine(rules: Vec<Box<dyn Rule>>) -> RewriteEngine {
    let mut set = RuleSet::new();
    for rule in rules {
        set.register(rule).unwrap();
    }
    RewriteEngine::new(set)
}

#[test]
fn test_higher_priority_rule_wins_same_span() {
    let source = "class Box[T]:\n    pass\n";

    let erase_first = engine(vec![
        Box::new(EraseClassRule),
        Box::new(pydowngrade_rules::generic_class::GenericClassRule),
    ]);
    assert_eq!(erase_first.rewrite_str(source).unwrap(), "pass\n");

    let generic_first = engine(vec![
        Box::new(pydowngrade_rules::generic_class::GenericClassRule),
        Box::new(EraseClassRule),
    ]);
    assert!(generic_first
        .rewrite_str(source)
        .unwrap()
        .contains("class Box(Generic[T]):"));
}

#[test]
fn test_dropped_nested_edit_is_invariant_violation() {
    let source = "def f():\n    class A[T]:\n        pass\n    return A\n";
    let engine = engine(vec![
        Box::new(pydowngrade_rules::generic_class::GenericClassRule),
        Box::new(VerbatimFunctionRule),
    ]);
    let err = engine.rewrite_str(source).unwrap_err();
    assert!(matches!(err, RewriteError::InternalInvariantViolation { .. }));
}
