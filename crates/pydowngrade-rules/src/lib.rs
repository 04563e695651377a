//! pydowngrade-rules: Rewrite rules and the rewrite engine
//!
//! Available rules, highest priority first:
//! - type_alias: Convert `type X[T] = ...` to `X: TypeAlias = ...`
//! - generic_class: Convert `class C[T](B):` to `class C(B, Generic[T]):`
//! - generic_function: Convert `def f[T](x: T):` to `def f(x: T):`
//!
//! Each rule hoists its type parameters into `TypeVar`, `TypeVarTuple` or
//! `ParamSpec` declarations and requests the `typing` imports it needs.

mod captures;
pub mod engine;
pub mod generic_class;
pub mod generic_function;
pub mod registry;
pub mod type_alias;
pub mod type_params;

pub use captures::Captures;
pub use engine::{rewrite_source, AppliedRewrite, RewriteEngine, RewriteError, RewriteOutcome};
pub use registry::{Rewrite, Rule, RuleError, RuleSet, RuleSetError};
