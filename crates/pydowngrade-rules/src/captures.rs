//! Render context handed to rules
//!
//! A rule never sees raw engine state. It reads its captures through
//! [`Captures`], which renders any span of the match with every nested edit
//! (inner rewrites, renames, block insertions) already applied, and records
//! which of those edits made it into the rule's output.

use std::cell::RefCell;
use std::collections::BTreeMap;

use pydowngrade_core::{lies_within, render_range, Bindings, Edit, Scope, Span, SyntaxNode};

use crate::registry::RuleError;

static NO_SYMBOLS: BTreeMap<String, String> = BTreeMap::new();

/// Bindings of one match plus the edits nested inside it
pub struct Captures<'a> {
    bindings: &'a Bindings<'a>,
    nested: &'a [Edit],
    consumed: RefCell<Vec<bool>>,
    symbols: &'a BTreeMap<String, String>,
    names: BTreeMap<String, String>,
}

impl<'a> Captures<'a> {
    /// Captures over the original text, with no nested edits and no renames
    pub fn new(bindings: &'a Bindings<'a>) -> Self {
        Self {
            bindings,
            nested: &[],
            consumed: RefCell::new(Vec::new()),
            symbols: &NO_SYMBOLS,
            names: BTreeMap::new(),
        }
    }

    /// Edits (absolute offsets) that lie inside the match
    pub fn with_nested(mut self, nested: &'a [Edit]) -> Self {
        self.nested = nested;
        self.consumed = RefCell::new(vec![false; nested.len()]);
        self
    }

    /// Local names of helper symbols (`Generic` may be imported as `Generic_2`)
    pub fn with_symbols(mut self, symbols: &'a BTreeMap<String, String>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Final names of the declarations this match introduces
    pub fn with_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.names = names;
        self
    }

    /// The matched node
    pub fn root(&self) -> SyntaxNode<'a> {
        self.bindings.root()
    }

    pub fn node(&self, name: &str) -> Option<SyntaxNode<'a>> {
        self.bindings.get(name)
    }

    /// A capture the rule's pattern guarantees to be bound
    pub fn require(&self, name: &str) -> Result<SyntaxNode<'a>, RuleError> {
        self.node(name)
            .ok_or_else(|| RuleError::new(format!("capture `{name}` is not bound")))
    }

    /// Scope receiving this match's declarations
    pub fn scope(&self) -> Scope {
        Scope::enclosing(self.root())
    }

    /// Text of `span` with nested edits applied
    pub fn render(&self, span: Span) -> String {
        let edits: Vec<&Edit> = self.nested.iter().collect();
        self.mark(span);
        render_range(self.root().source().text(), span, &edits)
    }

    /// Rendered text of a capture
    pub fn text(&self, name: &str) -> Result<String, RuleError> {
        Ok(self.render(self.require(name)?.span()))
    }

    /// Rendered text from the end of a capture to the end of the match
    pub fn tail(&self, name: &str) -> Result<String, RuleError> {
        let node = self.require(name)?;
        Ok(self.render(Span::new(node.span().end, self.root().span().end)))
    }

    /// Drop a region from the output along with any edits inside it
    pub fn discard(&self, span: Span) {
        self.mark(span);
    }

    /// Local name of a helper symbol
    pub fn symbol(&self, helper: &str) -> String {
        self.symbols
            .get(helper)
            .cloned()
            .unwrap_or_else(|| helper.to_string())
    }

    /// Final name of a declaration this match proposed as `proposed`
    pub fn declared_name(&self, proposed: &str) -> String {
        self.names
            .get(proposed)
            .cloned()
            .unwrap_or_else(|| proposed.to_string())
    }

    /// Index of the first nested edit the rule neither rendered nor discarded
    pub fn first_unconsumed(&self) -> Option<usize> {
        self.consumed.borrow().iter().position(|done| !done)
    }

    fn mark(&self, span: Span) {
        let mut consumed = self.consumed.borrow_mut();
        for (edit, done) in self.nested.iter().zip(consumed.iter_mut()) {
            if lies_within(edit, span) {
                *done = true;
            }
        }
    }
}
