//! Depth-first traversal of syntax trees
//!
//! Visitors get an `enter` call before a node's children and a `leave` call
//! after them, so post-order consumers (the rewrite engine) and pre-order
//! consumers (scope indexing) share one walker.

use crate::tree::SyntaxNode;

/// Trait for visiting syntax nodes
///
/// Default implementations visit everything and do nothing.
pub trait Visitor<'t> {
    /// Called before the node's children. Return `false` to skip them.
    fn enter(&mut self, _node: SyntaxNode<'t>) -> bool {
        true
    }

    /// Called after the node's children (or right after `enter` returned false)
    fn leave(&mut self, _node: SyntaxNode<'t>) {}
}

enum Step<'t> {
    Enter(SyntaxNode<'t>),
    Leave(SyntaxNode<'t>),
}

/// Walk `root` and its descendants in source order.
///
/// Uses an explicit stack, so deeply nested input cannot exhaust the call
/// stack.
pub fn visit<'t, V: Visitor<'t> + ?Sized>(root: SyntaxNode<'t>, visitor: &mut V) {
    let mut stack = vec![Step::Enter(root)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node) => {
                stack.push(Step::Leave(node));
                if visitor.enter(node) {
                    stack.extend(node.children().into_iter().rev().map(Step::Enter));
                }
            }
            Step::Leave(node) => visitor.leave(node),
        }
    }
}
