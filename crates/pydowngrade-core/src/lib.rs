//! pydowngrade-core: Core abstractions for Python syntax downgrading
//!
//! This crate provides:
//! - `SyntaxTree` / `SyntaxNode`: position-addressed tree over tree-sitter-python
//! - `Pattern`: structural matching with named captures
//! - `Visitor`: Trait for traversing the syntax tree
//! - `Edit` / `EditPlan`: span-based code modifications, applied in one pass
//! - `SymbolInjector`: collision-free naming and placement of helper declarations

mod edit;
pub mod injector;
pub mod pattern;
mod span;
pub mod tree;
pub mod visitor;

pub use edit::{apply_edits, lies_within, render_range, Edit, EditError, EditPlan};
pub use injector::{
    AuxiliaryDeclaration, DeclarationKind, Exclusion, InjectionError, Placement, Scope,
    SymbolInjector,
};
pub use pattern::{find_all, Bindings, Pattern};
pub use span::{Position, SourceText, Span};
pub use tree::{ParseError, SyntaxNode, SyntaxTree};
pub use visitor::{visit, Visitor};
