//! Rule trait and rule set for pydowngrade rewrite rules

use std::collections::HashSet;

use pydowngrade_core::{AuxiliaryDeclaration, Pattern};
use thiserror::Error;

use crate::captures::Captures;

/// A rule's rewrite could not be produced from its captures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while assembling a rule set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("Rule `{0}` is already registered")]
    DuplicateRule(&'static str),

    #[error("Unknown rule `{0}`")]
    UnknownRule(String),
}

/// Output of a rule for one match
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rewrite {
    /// Text replacing the whole matched span
    pub replacement: String,
    /// Helper code the replacement depends on
    pub declarations: Vec<AuxiliaryDeclaration>,
}

/// A rewrite rule targeting exactly one newer-syntax construct
pub trait Rule: Send + Sync {
    /// The unique identifier for this rule (e.g., "generic_class")
    fn name(&self) -> &'static str;

    /// A short description of what this rule does
    fn description(&self) -> &'static str;

    /// Shape of the construct this rule rewrites
    fn pattern(&self) -> Pattern;

    /// Extra condition over the captures; a failing guard is a non-match
    fn guard(&self, _captures: &Captures<'_>) -> bool {
        true
    }

    /// Replacement text and declarations for one match.
    ///
    /// Must be deterministic and must not depend on anything outside
    /// `captures`.
    fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError>;
}

/// Ordered set of rules; a rule's position is its priority (first wins)
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a rule set with all built-in rules, highest priority first
    pub fn builtin() -> Self {
        let mut set = Self::new();

        // Built-in names are distinct, so registration cannot fail here
        set.rules.push(Box::new(super::type_alias::TypeAliasRule));
        set.rules.push(Box::new(super::generic_class::GenericClassRule));
        set.rules.push(Box::new(super::generic_function::GenericFunctionRule));

        set
    }

    /// Register a new rule at the lowest priority
    pub fn register(&mut self, rule: Box<dyn Rule>) -> Result<(), RuleSetError> {
        if self.get(rule.name()).is_some() {
            return Err(RuleSetError::DuplicateRule(rule.name()));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Keep only the named rules, preserving priority order
    pub fn select(self, enabled: &HashSet<String>) -> Result<Self, RuleSetError> {
        for name in enabled {
            if self.get(name).is_none() {
                return Err(RuleSetError::UnknownRule(name.clone()));
            }
        }
        let rules = self
            .rules
            .into_iter()
            .filter(|r| enabled.contains(r.name()))
            .collect();
        Ok(Self { rules })
    }

    pub fn get(&self, name: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
    }

    /// Get all rule names
    pub fn all_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Get all rules with their descriptions (for --list-rules)
    pub fn list_rules(&self) -> Vec<(&'static str, &'static str)> {
        self.rules
            .iter()
            .map(|r| (r.name(), r.description()))
            .collect()
    }

    /// Rule at a priority index obtained from [`RuleSet::iter`]
    pub(crate) fn at(&self, index: usize) -> &dyn Rule {
        self.rules[index].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopRule(&'static str);

    impl Rule for NoopRule {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "does nothing"
        }

        fn pattern(&self) -> Pattern {
            Pattern::kind("pass_statement")
        }

        fn rewrite(&self, captures: &Captures<'_>) -> Result<Rewrite, RuleError> {
            Ok(Rewrite {
                replacement: captures.root().text().to_string(),
                declarations: Vec::new(),
            })
        }
    }

    #[test]
    fn test_builtin_priority_order() {
        let set = RuleSet::builtin();
        assert_eq!(
            set.all_names(),
            vec!["type_alias", "generic_class", "generic_function"]
        );
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut set = RuleSet::new();
        set.register(Box::new(NoopRule("noop"))).unwrap();
        let err = set.register(Box::new(NoopRule("noop"))).unwrap_err();
        assert_eq!(err, RuleSetError::DuplicateRule("noop"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_select_preserves_priority() {
        let enabled: HashSet<String> = ["generic_function", "type_alias"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let set = RuleSet::builtin().select(&enabled).unwrap();
        assert_eq!(set.all_names(), vec!["type_alias", "generic_function"]);
    }

    #[test]
    fn test_select_unknown_rule() {
        let enabled: HashSet<String> = ["walrus".to_string()].into_iter().collect();
        assert!(matches!(
            RuleSet::builtin().select(&enabled),
            Err(RuleSetError::UnknownRule(name)) if name == "walrus"
        ));
    }

    #[test]
    fn test_list_rules_has_descriptions() {
        for (name, description) in RuleSet::builtin().list_rules() {
            assert!(!name.is_empty());
            assert!(!description.is_empty());
        }
    }
}
