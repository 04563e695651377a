//! Symbol injection: collision-free names and placement for helper declarations
//!
//! A rewrite may need helper code that did not exist in the original source
//! (a `TypeVar` declaration, a `typing` import). The injector decides which
//! name such a helper gets in its target scope and where its text goes.
//!
//! Names are reserved against every identifier that already occurs in the
//! scope plus the names reserved earlier in the same pass. The first free
//! candidate among `name`, `name_2`, `name_3`, ... wins, so output is
//! deterministic for a fixed input.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::edit::Edit;
use crate::span::Span;
use crate::tree::{SyntaxNode, SyntaxTree};
use crate::visitor::{visit, Visitor};

/// Where an auxiliary declaration is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// Module top, after the leading docstring and import block
    Module,
    /// Start of the body of the function defined at this byte offset
    Function(usize),
}

impl Scope {
    /// Scope that receives declarations for a construct at `node`: the
    /// nearest enclosing function, or the module. Class bodies are skipped
    /// because their names are invisible inside method bodies.
    pub fn enclosing(node: SyntaxNode<'_>) -> Scope {
        node.ancestors()
            .find(|n| n.kind() == "function_definition")
            .map(|f| Scope::Function(f.span().start))
            .unwrap_or(Scope::Module)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Module => write!(f, "module"),
            Scope::Function(offset) => write!(f, "function at byte {offset}"),
        }
    }
}

/// What kind of helper a declaration introduces
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclarationKind {
    /// A statement binding `name` (e.g. `T = TypeVar("T")`)
    Binding,
    /// `name` imported from `module`
    Import { module: String },
}

/// Helper code a rewrite needs in order to resolve under the older syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuxiliaryDeclaration {
    /// Proposed name; may be renamed when it collides
    pub name: String,
    /// Declaration text, one logical line without indentation
    pub text: String,
    pub scope: Scope,
    pub kind: DeclarationKind,
}

impl AuxiliaryDeclaration {
    pub fn binding(scope: Scope, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            scope,
            kind: DeclarationKind::Binding,
        }
    }

    /// `from module import name`, always module-level
    pub fn import(module: impl Into<String>, name: impl Into<String>) -> Self {
        let module = module.into();
        let name = name.into();
        Self {
            text: format!("from {module} import {name}"),
            name,
            scope: Scope::Module,
            kind: DeclarationKind::Import { module },
        }
    }

    pub fn is_import(&self) -> bool {
        matches!(self.kind, DeclarationKind::Import { .. })
    }
}

/// A declaration could not be placed without breaking the program
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot inject declarations into {scope}: {message}")]
pub struct InjectionError {
    pub scope: Scope,
    pub offset: usize,
    pub message: String,
}

/// Identifier occurrences that must not count as taken names: references to
/// a type parameter inside the construct that introduces it
#[derive(Debug, Clone)]
pub struct Exclusion {
    pub region: Span,
    pub names: BTreeSet<String>,
}

/// Names present in one scope, and names reserved in it during this pass
#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    occupied: BTreeSet<String>,
    reserved: BTreeSet<String>,
    /// `from module import name` statements at the top of the module
    imported: BTreeMap<String, BTreeSet<String>>,
}

impl ScopeIndex {
    /// Index every identifier occurring inside `region`.
    ///
    /// Only the `from` imports in `prologue` are recorded: declarations are
    /// inserted right after it, so a later import does not bind in time.
    pub fn build(
        region: SyntaxNode<'_>,
        prologue: &[SyntaxNode<'_>],
        exclusions: &[Exclusion],
    ) -> Self {
        let mut collector = IdentifierCollector {
            exclusions,
            names: BTreeSet::new(),
        };
        visit(region, &mut collector);

        let mut index = Self {
            occupied: collector.names,
            ..Self::default()
        };
        for stmt in prologue {
            if stmt.kind() == "import_from_statement" {
                index.record_import(*stmt);
            }
        }

        index
    }

    fn record_import(&mut self, stmt: SyntaxNode<'_>) {
        let children = stmt.named_children();
        let Some((module, names)) = children.split_first() else {
            return;
        };

        let entry = self.imported.entry(module.text().to_string()).or_default();
        for name in names {
            match name.kind() {
                "dotted_name" => {
                    entry.insert(name.text().to_string());
                }
                "aliased_import" => {
                    let original = name.child_by_field("name").map(|n| n.text());
                    let alias = name.child_by_field("alias").map(|n| n.text());
                    if let (Some(original), Some(alias)) = (original, alias) {
                        if original == alias {
                            entry.insert(original.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Whether `name` already occurs in the scope or was reserved this pass
    pub fn is_taken(&self, name: &str) -> bool {
        self.occupied.contains(name) || self.reserved.contains(name)
    }

    /// Whether `from module import name` already exists at module top
    pub fn imports(&self, module: &str, name: &str) -> bool {
        self.imported
            .get(module)
            .is_some_and(|names| names.contains(name))
    }

    /// Reserve `proposed` or the first free `proposed_N` (N >= 2)
    pub fn reserve(&mut self, proposed: &str) -> String {
        let mut candidate = proposed.to_string();
        let mut suffix = 2;
        while self.is_taken(&candidate) {
            candidate = format!("{proposed}_{suffix}");
            suffix += 1;
        }
        self.reserved.insert(candidate.clone());
        candidate
    }
}

struct IdentifierCollector<'e> {
    exclusions: &'e [Exclusion],
    names: BTreeSet<String>,
}

impl<'t> Visitor<'t> for IdentifierCollector<'_> {
    fn enter(&mut self, node: SyntaxNode<'t>) -> bool {
        if node.kind() == "identifier" && !is_member_name(node) {
            let text = node.text();
            let excluded = self.exclusions.iter().any(|ex| {
                ex.region.contains(&node.span()) && ex.names.contains(text)
            });
            if !excluded {
                self.names.insert(text.to_string());
            }
        }
        true
    }
}

/// Attribute names (`obj.name`) and keyword-argument names (`f(name=...)`)
/// are not bindings or references in the enclosing scope
pub fn is_member_name(node: SyntaxNode<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let field = match parent.kind() {
        "attribute" => "attribute",
        "keyword_argument" => "name",
        _ => return false,
    };
    parent
        .child_by_field(field)
        .is_some_and(|child| child.same_as(&node))
}

/// Resolved insertion point for a scope's declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Insert before the statement at `offset`; each line is followed by a
    /// newline and `indent`
    Before { offset: usize, indent: String },
    /// Insert after the statement ending at `offset`; each line is preceded
    /// by a newline and `indent`
    After { offset: usize, indent: String },
}

impl Placement {
    pub fn offset(&self) -> usize {
        match self {
            Placement::Before { offset, .. } | Placement::After { offset, .. } => *offset,
        }
    }

    /// Text to insert for `lines` at this placement
    pub fn render(&self, lines: &[String]) -> String {
        match self {
            Placement::Before { indent, .. } => lines
                .iter()
                .map(|line| format!("{line}\n{indent}"))
                .collect(),
            Placement::After { indent, .. } => lines
                .iter()
                .map(|line| format!("\n{indent}{line}"))
                .collect(),
        }
    }
}

/// Per-pass name reservation and placement for one syntax tree
pub struct SymbolInjector<'t> {
    tree: &'t SyntaxTree,
    exclusions: Vec<Exclusion>,
    scopes: BTreeMap<Scope, ScopeIndex>,
}

impl<'t> SymbolInjector<'t> {
    pub fn new(tree: &'t SyntaxTree, exclusions: Vec<Exclusion>) -> Self {
        Self {
            tree,
            exclusions,
            scopes: BTreeMap::new(),
        }
    }

    /// Reserve a collision-free name for `proposed` in `scope`
    pub fn reserve_name(&mut self, scope: Scope, proposed: &str) -> Result<String, InjectionError> {
        let name = self.index(scope)?.reserve(proposed);
        if name != proposed {
            debug!(%scope, proposed, resolved = %name, "renamed injected symbol");
        }
        Ok(name)
    }

    /// Whether `from module import name` is already present at module top
    pub fn is_imported(&mut self, module: &str, name: &str) -> Result<bool, InjectionError> {
        Ok(self.index(Scope::Module)?.imports(module, name))
    }

    fn index(&mut self, scope: Scope) -> Result<&mut ScopeIndex, InjectionError> {
        if !self.scopes.contains_key(&scope) {
            let region = self.scope_node(scope)?;
            let prologue = match scope {
                Scope::Module => module_prologue(region),
                Scope::Function(_) => Vec::new(),
            };
            let index = ScopeIndex::build(region, &prologue, &self.exclusions);
            self.scopes.insert(scope, index);
        }
        self.scopes.get_mut(&scope).ok_or_else(|| InjectionError {
            scope,
            offset: 0,
            message: "scope index missing".to_string(),
        })
    }

    fn scope_node(&self, scope: Scope) -> Result<SyntaxNode<'t>, InjectionError> {
        match scope {
            Scope::Module => Ok(self.tree.root()),
            Scope::Function(offset) => {
                self.tree
                    .node_at(offset, "function_definition")
                    .ok_or_else(|| InjectionError {
                        scope,
                        offset,
                        message: "no function definition starts here".to_string(),
                    })
            }
        }
    }

    /// Where declarations for `scope` are inserted
    pub fn place(&self, scope: Scope) -> Result<Placement, InjectionError> {
        match scope {
            Scope::Module => Ok(self.place_in_module()),
            Scope::Function(_) => self.place_in_function(scope),
        }
    }

    /// An insertion edit carrying `lines` for `scope`
    pub fn insertion(&self, scope: Scope, lines: &[String]) -> Result<Edit, InjectionError> {
        let placement = self.place(scope)?;
        Ok(Edit::insert(
            placement.offset(),
            placement.render(lines),
            format!("Declare helpers in {scope}"),
        ))
    }

    fn place_in_module(&self) -> Placement {
        let root = self.tree.root();

        if let Some(last) = module_prologue(root).last() {
            return Placement::After {
                offset: self.after_statement(*last),
                indent: String::new(),
            };
        }

        let offset = root
            .children()
            .into_iter()
            .find(|c| c.kind() != "comment")
            .map(|c| c.span().start)
            .unwrap_or(0);
        Placement::Before {
            offset,
            indent: String::new(),
        }
    }

    /// Insertion offset after `stmt`, past a trailing comment on its line
    fn after_statement(&self, stmt: SyntaxNode<'_>) -> usize {
        let source = self.tree.source();
        let end = stmt.span().end;
        let line_end = source.line_end(end);
        let rest = source.slice(Span::new(end, line_end)).trim_start();
        if rest.is_empty() || rest.starts_with('#') {
            line_end
        } else {
            end
        }
    }

    fn place_in_function(&self, scope: Scope) -> Result<Placement, InjectionError> {
        let function = self.scope_node(scope)?;
        let unresolvable = |message: &str| InjectionError {
            scope,
            offset: function.span().start,
            message: message.to_string(),
        };

        let body = function
            .child_by_field("body")
            .ok_or_else(|| unresolvable("function has no body"))?;
        let colon = function
            .children()
            .into_iter()
            .filter(|c| c.kind() == ":" && c.span().end <= body.span().start)
            .last()
            .ok_or_else(|| unresolvable("function header has no colon"))?;
        if body.start_row() == colon.end_row() {
            return Err(unresolvable("function body shares its header line"));
        }

        let first = body
            .named_children()
            .into_iter()
            .next()
            .ok_or_else(|| unresolvable("function body is empty"))?;
        let source = self.tree.source();
        let line_start = source.line_start(first.span().start);
        let indent = source
            .slice(Span::new(line_start, first.span().start))
            .to_string();
        if !indent.chars().all(char::is_whitespace) {
            return Err(unresolvable("first body statement does not start its line"));
        }

        if is_docstring(first) {
            Ok(Placement::After {
                offset: self.after_statement(first),
                indent,
            })
        } else {
            Ok(Placement::Before {
                offset: first.span().start,
                indent,
            })
        }
    }
}

/// Leading docstring, `__future__` and import statements of a module
fn module_prologue(root: SyntaxNode<'_>) -> Vec<SyntaxNode<'_>> {
    let mut prologue = Vec::new();

    for child in root.named_children() {
        let in_prologue = match child.kind() {
            "future_import_statement" | "import_statement" | "import_from_statement" => true,
            "expression_statement" => prologue.is_empty() && is_docstring(child),
            _ => false,
        };
        if !in_prologue {
            break;
        }
        prologue.push(child);
    }

    prologue
}

/// An expression statement made of a single string literal
fn is_docstring(stmt: SyntaxNode<'_>) -> bool {
    if stmt.kind() != "expression_statement" {
        return false;
    }
    let children = stmt.named_children();
    children.len() == 1 && children[0].kind() == "string"
}
