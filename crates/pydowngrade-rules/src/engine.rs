//! Rewrite engine: parse, match, resolve, render, apply
//!
//! One call to [`RewriteEngine::rewrite`] is one pass over one source text:
//!
//! 1. parse the text, failing closed on any syntax error
//! 2. collect matches bottom-up, every rule tried at every node in priority
//!    order
//! 3. drop matches that conflict with a higher-priority one (equal or
//!    crossing spans); strictly nested matches compose
//! 4. reserve collision-free names for injected helpers and rename type
//!    parameters whose names are taken
//! 5. render matches innermost first, so an outer replacement carries the
//!    already-rewritten text of everything nested inside it
//! 6. apply the top-level edits and the declaration insertions in one pass
//!
//! Nothing is written back into the tree: every step works on spans of the
//! original text, and the result is a fresh [`SourceText`].

use std::collections::{BTreeMap, BTreeSet};

use pydowngrade_core::{
    visit, AuxiliaryDeclaration, Bindings, DeclarationKind, Edit, EditPlan, Exclusion,
    InjectionError, Position, Scope, SourceText, Span, SymbolInjector, SyntaxNode, SyntaxTree,
    Visitor,
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::captures::Captures;
use crate::registry::{Rule, RuleError, RuleSet};

/// Why a pass produced no output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error(transparent)]
    Parse(#[from] pydowngrade_core::ParseError),

    #[error("cannot place helper declarations at {position}: {message}")]
    UnresolvableInjection { position: Position, message: String },

    #[error("internal invariant violated at {position}: {message}")]
    InternalInvariantViolation { position: Position, message: String },
}

impl RewriteError {
    pub fn position(&self) -> Position {
        match self {
            RewriteError::Parse(err) => err.position,
            RewriteError::UnresolvableInjection { position, .. }
            | RewriteError::InternalInvariantViolation { position, .. } => *position,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RewriteError::Parse(err) => err.message.clone(),
            RewriteError::UnresolvableInjection { message, .. }
            | RewriteError::InternalInvariantViolation { message, .. } => message.clone(),
        }
    }
}

/// One accepted match, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRewrite {
    pub rule: &'static str,
    pub span: Span,
    pub position: Position,
    pub message: &'static str,
}

/// Result of a successful pass
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub source: SourceText,
    /// Accepted matches in source order
    pub applied: Vec<AppliedRewrite>,
}

impl RewriteOutcome {
    pub fn is_changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Applies a [`RuleSet`] to source texts
pub struct RewriteEngine {
    rules: RuleSet,
    patterns: Vec<pydowngrade_core::Pattern>,
}

/// A rule firing on a node of the original tree
struct Match<'t> {
    /// Index into the rule set; lower is higher priority
    rule: usize,
    span: Span,
    bindings: Bindings<'t>,
}

/// Names and edits decided before rendering
struct Resolution {
    /// Helper symbol -> local name
    symbols: BTreeMap<String, String>,
    /// (module, helper) pairs the module already imports
    satisfied: BTreeSet<(String, String)>,
    /// Per match: proposed declaration name -> final name
    names: Vec<BTreeMap<String, String>>,
    /// Identifier renames for type parameters whose name was taken
    renames: Vec<Edit>,
}

impl RewriteEngine {
    pub fn new(rules: RuleSet) -> Self {
        let patterns = rules.iter().map(|r| r.pattern()).collect();
        Self { rules, patterns }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Rewrite `source`; with no matches the output equals the input
    pub fn rewrite(&self, source: &SourceText) -> Result<RewriteOutcome, RewriteError> {
        let tree = SyntaxTree::parse(source)?;

        let candidates = self.collect(&tree);
        if candidates.is_empty() {
            return Ok(RewriteOutcome {
                source: source.clone(),
                applied: Vec::new(),
            });
        }

        let matches = resolve_conflicts(candidates, &self.rules);
        let proposals = self.propose(&tree, &matches)?;

        let mut injector = SymbolInjector::new(&tree, exclusions(&matches, &proposals));
        let resolution = resolve_names(&tree, &mut injector, &matches, &proposals)?;
        let insertions = self.declare(&tree, &injector, &matches, &proposals, &resolution)?;
        let edits = self.render(&tree, &matches, &resolution, insertions)?;

        let plan = EditPlan::new(edits, source.len()).map_err(|e| {
            RewriteError::InternalInvariantViolation {
                position: source.position(0),
                message: e.to_string(),
            }
        })?;
        let output = plan.apply(source.text());

        let applied = matches
            .iter()
            .map(|m| {
                let rule = self.rule(m.rule);
                AppliedRewrite {
                    rule: rule.name(),
                    span: m.span,
                    position: source.position(m.span.start),
                    message: rule.description(),
                }
            })
            .collect();

        Ok(RewriteOutcome {
            source: source.with_text(output),
            applied,
        })
    }

    /// Rewrite a plain string
    pub fn rewrite_str(&self, text: &str) -> Result<String, RewriteError> {
        let outcome = self.rewrite(&SourceText::new(text))?;
        Ok(outcome.source.text().to_string())
    }

    fn rule(&self, index: usize) -> &dyn Rule {
        self.rules.at(index)
    }

    /// Every guarded match in the tree, bottom-up
    fn collect<'t>(&self, tree: &'t SyntaxTree) -> Vec<Match<'t>> {
        struct Collector<'e, 't> {
            engine: &'e RewriteEngine,
            found: Vec<Match<'t>>,
        }

        impl<'t> Visitor<'t> for Collector<'_, 't> {
            fn leave(&mut self, node: SyntaxNode<'t>) {
                for (index, (rule, pattern)) in self
                    .engine
                    .rules
                    .iter()
                    .zip(&self.engine.patterns)
                    .enumerate()
                {
                    let Some(bindings) = pattern.matches(node) else {
                        continue;
                    };
                    if !rule.guard(&Captures::new(&bindings)) {
                        trace!(rule = rule.name(), span = %node.span(), "guard rejected match");
                        continue;
                    }
                    self.found.push(Match {
                        rule: index,
                        span: node.span(),
                        bindings,
                    });
                }
            }
        }

        let mut collector = Collector {
            engine: self,
            found: Vec::new(),
        };
        visit(tree.root(), &mut collector);
        collector.found
    }

    /// Declarations each match proposes against the original text
    fn propose(
        &self,
        tree: &SyntaxTree,
        matches: &[Match<'_>],
    ) -> Result<Vec<Vec<AuxiliaryDeclaration>>, RewriteError> {
        matches
            .iter()
            .map(|m| {
                let captures = Captures::new(&m.bindings);
                self.rule(m.rule)
                    .rewrite(&captures)
                    .map(|rewrite| rewrite.declarations)
                    .map_err(|e| self.rule_failed(tree, m, e))
            })
            .collect()
    }

    /// One insertion edit per scope holding the final declaration lines
    fn declare(
        &self,
        tree: &SyntaxTree,
        injector: &SymbolInjector<'_>,
        matches: &[Match<'_>],
        proposals: &[Vec<AuxiliaryDeclaration>],
        resolution: &Resolution,
    ) -> Result<Vec<Edit>, RewriteError> {
        // module -> [(imported name, local name)]
        let mut imports: BTreeMap<String, BTreeSet<(String, String)>> = BTreeMap::new();
        let mut bindings: BTreeMap<Scope, Vec<String>> = BTreeMap::new();
        let mut seen: BTreeSet<(Scope, String)> = BTreeSet::new();

        for (index, m) in matches.iter().enumerate() {
            let nested: Vec<Edit> = resolution
                .renames
                .iter()
                .filter(|e| m.span.contains(&e.span))
                .cloned()
                .collect();
            let captures = Captures::new(&m.bindings)
                .with_nested(&nested)
                .with_symbols(&resolution.symbols)
                .with_names(resolution.names[index].clone());
            let finals = self
                .rule(m.rule)
                .rewrite(&captures)
                .map_err(|e| self.rule_failed(tree, m, e))?
                .declarations;

            if finals.len() != proposals[index].len() {
                return Err(RewriteError::InternalInvariantViolation {
                    position: tree.source().position(m.span.start),
                    message: format!(
                        "rule `{}` changed its declarations after renaming",
                        self.rule(m.rule).name()
                    ),
                });
            }

            for (proposed, last) in proposals[index].iter().zip(finals) {
                match &proposed.kind {
                    DeclarationKind::Import { module } => {
                        let key = (module.clone(), proposed.name.clone());
                        if resolution.satisfied.contains(&key) {
                            continue;
                        }
                        if let Some(local) = resolution.symbols.get(&proposed.name) {
                            imports
                                .entry(module.clone())
                                .or_default()
                                .insert((proposed.name.clone(), local.clone()));
                        }
                    }
                    DeclarationKind::Binding => {
                        if seen.insert((proposed.scope, proposed.text.clone())) {
                            bindings.entry(last.scope).or_default().push(last.text);
                        }
                    }
                }
            }
        }

        let mut lines: BTreeMap<Scope, Vec<String>> = BTreeMap::new();
        for (module, names) in imports {
            let names: Vec<String> = names
                .into_iter()
                .map(|(name, local)| {
                    if name == local {
                        name
                    } else {
                        format!("{name} as {local}")
                    }
                })
                .collect();
            lines
                .entry(Scope::Module)
                .or_default()
                .push(format!("from {module} import {}", names.join(", ")));
        }
        for (scope, texts) in bindings {
            lines.entry(scope).or_default().extend(texts);
        }

        lines
            .into_iter()
            .map(|(scope, lines)| {
                debug!(%scope, count = lines.len(), "injecting declarations");
                injector
                    .insertion(scope, &lines)
                    .map_err(|e| unresolvable(tree, e))
            })
            .collect()
    }

    /// Render every match innermost first; returns the top-level edits
    fn render(
        &self,
        tree: &SyntaxTree,
        matches: &[Match<'_>],
        resolution: &Resolution,
        insertions: Vec<Edit>,
    ) -> Result<Vec<Edit>, RewriteError> {
        let mut pending: Vec<Edit> = resolution.renames.clone();
        pending.extend(insertions);

        // Children end no later than their parent and start after it when
        // they end together, so this order visits children first.
        let mut order: Vec<usize> = (0..matches.len()).collect();
        order.sort_by_key(|&i| (matches[i].span.end, std::cmp::Reverse(matches[i].span.start)));

        for index in order {
            let m = &matches[index];
            let rule = self.rule(m.rule);

            let (nested, rest): (Vec<Edit>, Vec<Edit>) =
                pending.into_iter().partition(|e| nested_in(e, m.span));
            pending = rest;

            let captures = Captures::new(&m.bindings)
                .with_nested(&nested)
                .with_symbols(&resolution.symbols)
                .with_names(resolution.names[index].clone());
            let rewrite = rule
                .rewrite(&captures)
                .map_err(|e| self.rule_failed(tree, m, e))?;

            if let Some(dropped) = captures.first_unconsumed() {
                return Err(RewriteError::InternalInvariantViolation {
                    position: tree.source().position(nested[dropped].span.start),
                    message: format!(
                        "rule `{}` dropped a nested edit ({})",
                        rule.name(),
                        nested[dropped].message
                    ),
                });
            }

            debug!(
                rule = rule.name(),
                span = %m.span,
                nested = nested.len(),
                "rendered match"
            );
            pending.push(Edit::new(m.span, rewrite.replacement, rule.description()));
        }

        Ok(pending)
    }

    fn rule_failed(&self, tree: &SyntaxTree, m: &Match<'_>, error: RuleError) -> RewriteError {
        RewriteError::InternalInvariantViolation {
            position: tree.source().position(m.span.start),
            message: format!("rule `{}` failed: {error}", self.rule(m.rule).name()),
        }
    }
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self::new(RuleSet::builtin())
    }
}

/// Rewrite `text` with the built-in rules
pub fn rewrite_source(text: &str) -> Result<String, RewriteError> {
    RewriteEngine::default().rewrite_str(text)
}

/// Keep the highest-priority match among conflicting ones, ties going to
/// the earlier start; the result is in source order
fn resolve_conflicts<'t>(mut candidates: Vec<Match<'t>>, rules: &RuleSet) -> Vec<Match<'t>> {
    candidates.sort_by_key(|m| (m.rule, m.span.start, m.span.end));

    let mut accepted: Vec<Match<'t>> = Vec::new();
    for candidate in candidates {
        let rule = rules.at(candidate.rule).name();
        if let Some(winner) = accepted
            .iter()
            .find(|a| a.span.conflicts_with(&candidate.span))
        {
            trace!(rule, span = %candidate.span, winner = %winner.span, "dropped conflicting match");
            continue;
        }
        debug!(rule, span = %candidate.span, "accepted match");
        accepted.push(candidate);
    }

    accepted.sort_by_key(|m| (m.span.start, std::cmp::Reverse(m.span.end)));
    accepted
}

/// Type parameter references inside each match do not occupy their name
fn exclusions(matches: &[Match<'_>], proposals: &[Vec<AuxiliaryDeclaration>]) -> Vec<Exclusion> {
    matches
        .iter()
        .zip(proposals)
        .filter_map(|(m, declarations)| {
            let names: BTreeSet<String> = declarations
                .iter()
                .filter(|d| d.kind == DeclarationKind::Binding)
                .map(|d| d.name.clone())
                .collect();
            (!names.is_empty()).then_some(Exclusion {
                region: m.span,
                names,
            })
        })
        .collect()
}

fn resolve_names(
    tree: &SyntaxTree,
    injector: &mut SymbolInjector<'_>,
    matches: &[Match<'_>],
    proposals: &[Vec<AuxiliaryDeclaration>],
) -> Result<Resolution, RewriteError> {
    let mut symbols = BTreeMap::new();
    let mut satisfied_helpers = BTreeSet::new();

    // Helpers first, so `Generic` keeps its name whenever it is free
    let helpers: BTreeSet<(&str, &str)> = proposals
        .iter()
        .flatten()
        .filter_map(|d| match &d.kind {
            DeclarationKind::Import { module } => Some((module.as_str(), d.name.as_str())),
            DeclarationKind::Binding => None,
        })
        .collect();
    for (module, name) in helpers {
        let satisfied = injector
            .is_imported(module, name)
            .map_err(|e| unresolvable(tree, e))?;
        let local = if satisfied {
            satisfied_helpers.insert((module.to_string(), name.to_string()));
            name.to_string()
        } else {
            injector
                .reserve_name(Scope::Module, name)
                .map_err(|e| unresolvable(tree, e))?
        };
        symbols.insert(name.to_string(), local);
    }

    let mut names = Vec::with_capacity(matches.len());
    let mut shared: BTreeMap<(Scope, String), String> = BTreeMap::new();
    for declarations in proposals {
        let mut local = BTreeMap::new();
        for decl in declarations.iter().filter(|d| !d.is_import()) {
            let key = (decl.scope, decl.text.clone());
            let name = match shared.get(&key) {
                Some(name) => name.clone(),
                None => {
                    let name = injector
                        .reserve_name(decl.scope, &decl.name)
                        .map_err(|e| unresolvable(tree, e))?;
                    shared.insert(key, name.clone());
                    name
                }
            };
            local.insert(decl.name.clone(), name);
        }
        names.push(local);
    }

    let renames = rename_edits(matches, proposals, &names);

    Ok(Resolution {
        symbols,
        satisfied: satisfied_helpers,
        names,
        renames,
    })
}

/// Renames for every identifier that refers to a renamed type parameter
fn rename_edits(
    matches: &[Match<'_>],
    proposals: &[Vec<AuxiliaryDeclaration>],
    names: &[BTreeMap<String, String>],
) -> Vec<Edit> {
    let mut edits = Vec::new();

    for (index, m) in matches.iter().enumerate() {
        for (proposed, last) in &names[index] {
            if proposed == last {
                continue;
            }

            // Nested constructs that introduce the same name own its references
            let shadows: Vec<Span> = matches
                .iter()
                .zip(proposals)
                .filter(|(other, declarations)| {
                    m.span.strictly_contains(&other.span)
                        && declarations
                            .iter()
                            .any(|d| !d.is_import() && &d.name == proposed)
                })
                .map(|(other, _)| other.span)
                .collect();

            let root = m.bindings.root();
            for ident in root.find_all("identifier") {
                if ident.text() != proposed
                    || pydowngrade_core::injector::is_member_name(ident)
                    || shadows.iter().any(|s| s.contains(&ident.span()))
                    || rebound_by_parameter(ident, root)
                {
                    continue;
                }
                edits.push(Edit::new(
                    ident.span(),
                    last.clone(),
                    format!("Rename {proposed} to {last}"),
                ));
            }
        }
    }

    edits
}

/// Whether a function or lambda nested below `root` takes a parameter named
/// like `ident` and `ident` is that parameter or sits in its body.
///
/// Annotations and defaults of such a parameter are evaluated outside the
/// nested scope and are not covered.
fn rebound_by_parameter(ident: SyntaxNode<'_>, root: SyntaxNode<'_>) -> bool {
    let name = ident.text();

    for scope in ident.ancestors().take_while(|a| !a.same_as(&root)) {
        if !matches!(scope.kind(), "function_definition" | "lambda") {
            continue;
        }
        let Some(parameters) = scope.child_by_field("parameters") else {
            continue;
        };
        let Some(binding) = parameters
            .named_children()
            .into_iter()
            .filter_map(parameter_name)
            .find(|p| p.text() == name)
        else {
            continue;
        };

        let in_body = scope
            .child_by_field("body")
            .is_some_and(|body| body.span().contains(&ident.span()));
        if in_body || binding.same_as(&ident) {
            return true;
        }
    }

    false
}

/// Identifier a single parameter binds (`x`, `x: int`, `x=1`, `*xs`, `**kw`)
fn parameter_name(parameter: SyntaxNode<'_>) -> Option<SyntaxNode<'_>> {
    match parameter.kind() {
        "identifier" => Some(parameter),
        "default_parameter" | "typed_default_parameter" => parameter.child_by_field("name"),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            parameter.named_child(0).and_then(parameter_name)
        }
        _ => None,
    }
}

/// Whether `edit` is carried by the render of a match over `span`
fn nested_in(edit: &Edit, span: Span) -> bool {
    if edit.span.is_empty() {
        span.start < edit.span.start && edit.span.start < span.end
    } else {
        span.contains(&edit.span) && edit.span != span
    }
}

fn unresolvable(tree: &SyntaxTree, error: InjectionError) -> RewriteError {
    RewriteError::UnresolvableInjection {
        position: tree.source().position(error.offset),
        message: error.to_string(),
    }
}
