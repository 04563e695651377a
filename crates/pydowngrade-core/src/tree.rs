//! Tree adapter over tree-sitter's Python grammar
//!
//! Parsing is fail-closed: any ERROR or MISSING node turns the whole parse
//! into a [`ParseError`], so no file is ever rewritten from a broken tree.

use std::fmt;

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

use crate::span::{Position, SourceText, Span};

/// Source text that is not valid under the source grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at {position}: {message}")]
pub struct ParseError {
    pub position: Position,
    pub message: String,
}

/// A parsed module together with the text it was parsed from
pub struct SyntaxTree {
    source: SourceText,
    tree: Tree,
}

impl SyntaxTree {
    /// Parse Python source, rejecting any input that contains syntax errors
    pub fn parse(source: &SourceText) -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError {
                position: source.position(0),
                message: format!("failed to load Python grammar: {e}"),
            })?;

        let tree = parser
            .parse(source.text(), None)
            .ok_or_else(|| ParseError {
                position: source.position(0),
                message: "parser produced no tree".to_string(),
            })?;

        let syntax_tree = Self {
            source: source.clone(),
            tree,
        };

        if let Some(error) = syntax_tree.first_error() {
            return Err(error);
        }

        Ok(syntax_tree)
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn root(&self) -> SyntaxNode<'_> {
        SyntaxNode {
            node: self.tree.root_node(),
            source: &self.source,
        }
    }

    /// Text covered by `span` in the parsed source
    pub fn text_of(&self, span: Span) -> &str {
        self.source.slice(span)
    }

    /// Innermost node of kind `kind` that starts exactly at `offset`
    pub fn node_at(&self, offset: usize, kind: &str) -> Option<SyntaxNode<'_>> {
        let leaf = self
            .tree
            .root_node()
            .descendant_for_byte_range(offset, offset)?;
        let start = SyntaxNode {
            node: leaf,
            source: &self.source,
        };
        std::iter::once(start)
            .chain(start.ancestors())
            .find(|n| n.kind() == kind && n.span().start == offset)
    }

    fn first_error(&self) -> Option<ParseError> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_missing() {
                return Some(ParseError {
                    position: self.source.position(node.start_byte()),
                    message: format!("missing `{}`", node.kind()),
                });
            }
            if node.is_error() {
                let text = self.source.slice(Span::new(node.start_byte(), node.end_byte()));
                let snippet: String = text.trim().chars().take(24).collect();
                let message = if snippet.is_empty() {
                    "unexpected end of input".to_string()
                } else {
                    format!("unexpected `{snippet}`")
                };
                return Some(ParseError {
                    position: self.source.position(node.start_byte()),
                    message,
                });
            }

            // Push in reverse so the leftmost error is reported first
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            for child in children.into_iter().rev() {
                if child.has_error() || child.is_missing() || child.is_error() {
                    stack.push(child);
                }
            }
        }

        Some(ParseError {
            position: self.source.position(0),
            message: "syntax error".to_string(),
        })
    }
}

/// A position-addressed node borrowed from its [`SyntaxTree`]
#[derive(Clone, Copy)]
pub struct SyntaxNode<'t> {
    node: Node<'t>,
    source: &'t SourceText,
}

impl<'t> SyntaxNode<'t> {
    pub fn kind(&self) -> &'static str {
        self.node.kind()
    }

    pub fn span(&self) -> Span {
        Span::new(self.node.start_byte(), self.node.end_byte())
    }

    pub fn text(&self) -> &'t str {
        self.source.slice(self.span())
    }

    pub fn is_named(&self) -> bool {
        self.node.is_named()
    }

    /// 0-based row where the node starts
    pub fn start_row(&self) -> usize {
        self.node.start_position().row
    }

    pub fn end_row(&self) -> usize {
        self.node.end_position().row
    }

    pub fn source(&self) -> &'t SourceText {
        self.source
    }

    pub fn children(&self) -> Vec<SyntaxNode<'t>> {
        let mut cursor = self.node.walk();
        self.node
            .children(&mut cursor)
            .map(|node| self.wrap(node))
            .collect()
    }

    /// Named children, skipping comments
    pub fn named_children(&self) -> Vec<SyntaxNode<'t>> {
        self.children()
            .into_iter()
            .filter(|c| c.is_named() && c.kind() != "comment")
            .collect()
    }

    pub fn named_child(&self, index: usize) -> Option<SyntaxNode<'t>> {
        self.named_children().into_iter().nth(index)
    }

    pub fn child_by_field(&self, field: &str) -> Option<SyntaxNode<'t>> {
        self.node.child_by_field_name(field).map(|n| self.wrap(n))
    }

    pub fn parent(&self) -> Option<SyntaxNode<'t>> {
        self.node.parent().map(|n| self.wrap(n))
    }

    /// Parents from the closest outward, ending at the module
    pub fn ancestors(&self) -> impl Iterator<Item = SyntaxNode<'t>> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    /// All descendants of kind `kind`, in source order, including `self`
    pub fn find_all(&self, kind: &str) -> Vec<SyntaxNode<'t>> {
        let mut found = Vec::new();
        let mut stack = vec![*self];
        while let Some(node) = stack.pop() {
            if node.kind() == kind {
                found.push(node);
            }
            stack.extend(node.children().into_iter().rev());
        }
        found
    }

    pub fn find(&self, kind: &str) -> Option<SyntaxNode<'t>> {
        self.find_all(kind).into_iter().next()
    }

    /// Same node in the same tree
    pub fn same_as(&self, other: &SyntaxNode<'_>) -> bool {
        self.node.id() == other.node.id()
    }

    fn wrap(&self, node: Node<'t>) -> SyntaxNode<'t> {
        SyntaxNode {
            node,
            source: self.source,
        }
    }
}

impl fmt::Debug for SyntaxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind(), self.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SyntaxTree {
        SyntaxTree::parse(&SourceText::new(text)).unwrap()
    }

    #[test]
    fn test_parse_module() {
        let tree = parse("x = 1\n");
        assert_eq!(tree.root().kind(), "module");
        assert_eq!(tree.root().named_children().len(), 1);
    }

    #[test]
    fn test_class_fields() {
        let tree = parse("class Box[T](Base):\n    pass\n");
        let class = tree.root().find("class_definition").unwrap();
        assert_eq!(class.child_by_field("name").unwrap().text(), "Box");
        assert_eq!(
            class.child_by_field("type_parameters").unwrap().text(),
            "[T]"
        );
        assert_eq!(class.child_by_field("superclasses").unwrap().text(), "(Base)");
    }

    #[test]
    fn test_unterminated_block_is_parse_error() {
        let source = SourceText::new("class Box[T]:\n    def get(self, x: T\n");
        let err = SyntaxTree::parse(&source).err().unwrap();
        assert!(err.position.line >= 1);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_ancestors_reach_module() {
        let tree = parse("def f():\n    return 1\n");
        let ret = tree.root().find("return_statement").unwrap();
        let kinds: Vec<_> = ret.ancestors().map(|n| n.kind()).collect();
        assert_eq!(kinds.last(), Some(&"module"));
        assert!(kinds.contains(&"function_definition"));
    }

    #[test]
    fn test_node_at() {
        let tree = parse("import os\n\ndef f():\n    pass\n");
        let func = tree.node_at(11, "function_definition").unwrap();
        assert_eq!(func.child_by_field("name").unwrap().text(), "f");
        assert!(tree.node_at(0, "function_definition").is_none());
    }
}
