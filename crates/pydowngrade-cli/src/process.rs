//! File processing logic for pydowngrade

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use pydowngrade_core::SourceText;
use pydowngrade_rules::{RewriteEngine, RewriteOutcome};

use crate::output::EditInfo;

/// Result of processing a single file
#[derive(Debug)]
pub struct ProcessResult {
    /// Rewrites that were found/applied
    pub edits: Vec<EditInfo>,
    /// Original source code
    pub old_source: String,
    /// New source code (only if something was rewritten)
    pub new_source: Option<String>,
}

/// Rewrite one file in memory; nothing is written back
pub fn process_file(path: &Path, engine: &RewriteEngine) -> Result<ProcessResult> {
    let source_code = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let source = SourceText::named(path.display().to_string(), source_code);
    let outcome = engine
        .rewrite(&source)
        .with_context(|| format!("Failed to rewrite {}", path.display()))?;

    Ok(to_result(source, outcome))
}

/// Rewrite standard input to a string
pub fn process_stdin(engine: &RewriteEngine) -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read standard input")?;

    let outcome = engine
        .rewrite(&SourceText::named("<stdin>", text))
        .context("Failed to rewrite standard input")?;
    Ok(outcome.source.text().to_string())
}

fn to_result(source: SourceText, outcome: RewriteOutcome) -> ProcessResult {
    let edits: Vec<EditInfo> = outcome
        .applied
        .iter()
        .map(|applied| EditInfo {
            rule: applied.rule.to_string(),
            line: applied.position.line,
            column: applied.position.column,
            message: applied.message.to_string(),
        })
        .collect();

    let new_source = outcome
        .is_changed()
        .then(|| outcome.source.text().to_string());

    ProcessResult {
        edits,
        old_source: source.text().to_string(),
        new_source,
    }
}

/// Write the processed result to the file
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write file: {}", path.display()))
}
