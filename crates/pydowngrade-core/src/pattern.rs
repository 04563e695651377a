//! Structural pattern matching over syntax nodes
//!
//! Patterns describe the shape of a subtree (node kind, field and positional
//! sub-patterns) and bind named captures to the sub-nodes they match.
//! Matching is purely structural: no names are resolved.

use std::collections::BTreeMap;

use crate::tree::SyntaxNode;
use crate::visitor::{visit, Visitor};

/// A declarative shape to match against a syntax node
#[derive(Debug, Clone)]
pub struct Pattern {
    shape: Shape,
    capture: Option<String>,
    fields: Vec<FieldPattern>,
    positional: Vec<(usize, Pattern)>,
}

#[derive(Debug, Clone)]
enum Shape {
    /// Any node
    Any,
    /// Node of exactly this kind
    Kind(String),
    /// First alternative that matches
    OneOf(Vec<Pattern>),
}

#[derive(Debug, Clone)]
struct FieldPattern {
    field: String,
    pattern: Pattern,
    required: bool,
}

impl Pattern {
    pub fn any() -> Self {
        Self::with_shape(Shape::Any)
    }

    pub fn kind(kind: impl Into<String>) -> Self {
        Self::with_shape(Shape::Kind(kind.into()))
    }

    pub fn one_of(alternatives: impl IntoIterator<Item = Pattern>) -> Self {
        Self::with_shape(Shape::OneOf(alternatives.into_iter().collect()))
    }

    fn with_shape(shape: Shape) -> Self {
        Self {
            shape,
            capture: None,
            fields: Vec::new(),
            positional: Vec::new(),
        }
    }

    /// Bind the matched node to `name`
    pub fn capture(mut self, name: impl Into<String>) -> Self {
        self.capture = Some(name.into());
        self
    }

    /// The field must be present and match `pattern`
    pub fn field(mut self, field: impl Into<String>, pattern: Pattern) -> Self {
        self.fields.push(FieldPattern {
            field: field.into(),
            pattern,
            required: true,
        });
        self
    }

    /// If the field is present it must match `pattern`
    pub fn optional_field(mut self, field: impl Into<String>, pattern: Pattern) -> Self {
        self.fields.push(FieldPattern {
            field: field.into(),
            pattern,
            required: false,
        });
        self
    }

    /// The `index`-th named child (comments excluded) must match `pattern`
    pub fn named_child(mut self, index: usize, pattern: Pattern) -> Self {
        self.positional.push((index, pattern));
        self
    }

    /// Match this pattern against `node`, returning the captured bindings
    pub fn matches<'t>(&self, node: SyntaxNode<'t>) -> Option<Bindings<'t>> {
        let mut bindings = Bindings::new(node);
        if self.match_into(node, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }

    fn match_into<'t>(&self, node: SyntaxNode<'t>, bindings: &mut Bindings<'t>) -> bool {
        match &self.shape {
            Shape::Any => {}
            Shape::Kind(kind) => {
                if node.kind() != kind {
                    return false;
                }
            }
            Shape::OneOf(alternatives) => {
                let matched = alternatives.iter().find_map(|alt| {
                    let mut attempt = bindings.clone();
                    alt.match_into(node, &mut attempt).then_some(attempt)
                });
                match matched {
                    Some(attempt) => *bindings = attempt,
                    None => return false,
                }
            }
        }

        for field in &self.fields {
            match node.child_by_field(&field.field) {
                Some(child) => {
                    if !field.pattern.match_into(child, bindings) {
                        return false;
                    }
                }
                None if field.required => return false,
                None => {}
            }
        }

        if !self.positional.is_empty() {
            let named = node.named_children();
            for (index, pattern) in &self.positional {
                match named.get(*index) {
                    Some(child) => {
                        if !pattern.match_into(*child, bindings) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }

        if let Some(name) = &self.capture {
            bindings.insert(name.clone(), node);
        }

        true
    }
}

/// Named sub-nodes bound by a successful match
#[derive(Debug, Clone)]
pub struct Bindings<'t> {
    root: SyntaxNode<'t>,
    captures: BTreeMap<String, SyntaxNode<'t>>,
}

impl<'t> Bindings<'t> {
    fn new(root: SyntaxNode<'t>) -> Self {
        Self {
            root,
            captures: BTreeMap::new(),
        }
    }

    /// The node the pattern was matched against
    pub fn root(&self) -> SyntaxNode<'t> {
        self.root
    }

    pub fn get(&self, name: &str) -> Option<SyntaxNode<'t>> {
        self.captures.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.captures.contains_key(name)
    }

    pub fn insert(&mut self, name: String, node: SyntaxNode<'t>) {
        self.captures.insert(name, node);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SyntaxNode<'t>)> {
        self.captures.iter()
    }
}

/// Every match of `pattern` under `root`, depth-first in post-order
pub fn find_all<'t>(pattern: &Pattern, root: SyntaxNode<'t>) -> Vec<Bindings<'t>> {
    struct Collector<'p, 't> {
        pattern: &'p Pattern,
        found: Vec<Bindings<'t>>,
    }

    impl<'t> Visitor<'t> for Collector<'_, 't> {
        fn leave(&mut self, node: SyntaxNode<'t>) {
            if let Some(bindings) = self.pattern.matches(node) {
                self.found.push(bindings);
            }
        }
    }

    let mut collector = Collector {
        pattern,
        found: Vec::new(),
    };
    visit(root, &mut collector);
    collector.found
}
