//! `.pydowngrade.toml` support
//!
//! The file is validated when it is loaded: unknown keys, unknown rule names
//! and malformed exclude globs are reported against the config path before
//! any Python file is read.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pydowngrade_rules::RuleSet;

pub const CONFIG_FILE: &str = ".pydowngrade.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub rules: RulesConfig,
    pub paths: PathsConfig,
    pub output: OutputConfig,
    #[serde(skip)]
    excludes: Vec<Exclude>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    /// Only these rules run; all built-in rules when absent
    pub enabled: Option<Vec<String>>,
    /// Removed from the enabled set
    pub disabled: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// `dir/` skips any directory of that name; anything else is a glob
    /// matched against the whole path and the file name
    pub exclude: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// "text", "json" or "diff"
    pub format: Option<String>,
}

#[derive(Debug)]
enum Exclude {
    Directory(String),
    Glob(glob::Pattern),
}

impl Exclude {
    fn parse(pattern: &str) -> Result<Self> {
        if let Some(dir) = pattern.strip_suffix('/') {
            return Ok(Exclude::Directory(dir.to_string()));
        }
        let glob = glob::Pattern::new(pattern)
            .with_context(|| format!("Invalid exclude pattern '{pattern}'"))?;
        Ok(Exclude::Glob(glob))
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            Exclude::Directory(name) => path
                .parent()
                .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == name.as_str())),
            Exclude::Glob(glob) => {
                glob.matches_path(path)
                    || path
                        .file_name()
                        .is_some_and(|file| glob.matches(&file.to_string_lossy()))
            }
        }
    }
}

impl Config {
    /// Find `.pydowngrade.toml` in the current directory or a parent
    pub fn load(known_rules: &[&str]) -> Result<Option<(Config, PathBuf)>> {
        Self::discover(&std::env::current_dir()?, known_rules)
    }

    /// Find `.pydowngrade.toml` in `start` or the nearest parent holding one
    pub fn discover(start: &Path, known_rules: &[&str]) -> Result<Option<(Config, PathBuf)>> {
        let Some(path) = start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
        else {
            return Ok(None);
        };
        let config = Self::load_path(&path, known_rules)?;
        Ok(Some((config, path)))
    }

    pub fn load_path(path: &Path, known_rules: &[&str]) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&contents, known_rules)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse and validate config text
    pub fn parse(contents: &str, known_rules: &[&str]) -> Result<Config> {
        let mut config: Config = toml::from_str(contents)?;

        let configured = config
            .rules
            .enabled
            .iter()
            .flatten()
            .chain(&config.rules.disabled);
        for name in configured {
            if !known_rules.contains(&name.as_str()) {
                bail!(
                    "Unknown rule '{}'. Available rules: {}",
                    name,
                    known_rules.join(", ")
                );
            }
        }

        config.excludes = config
            .paths
            .exclude
            .iter()
            .map(|pattern| Exclude::parse(pattern))
            .collect::<Result<_>>()?;

        Ok(config)
    }

    /// Narrow `rules` to what should run: `-r` names when given, otherwise
    /// `[rules] enabled` (default all) minus `[rules] disabled`
    pub fn select_rules(&self, rules: RuleSet, cli_rules: &[String]) -> Result<RuleSet> {
        let enabled: HashSet<String> = if !cli_rules.is_empty() {
            cli_rules.iter().cloned().collect()
        } else {
            let mut enabled: HashSet<String> = match &self.rules.enabled {
                Some(names) => names.iter().cloned().collect(),
                None => rules.all_names().iter().map(|s| s.to_string()).collect(),
            };
            for name in &self.rules.disabled {
                enabled.remove(name);
            }
            enabled
        };

        if enabled.is_empty() {
            bail!("No rules enabled");
        }
        Ok(rules.select(&enabled)?)
    }

    pub fn should_exclude(&self, path: &Path) -> bool {
        self.excludes.iter().any(|exclude| exclude.matches(path))
    }
}
