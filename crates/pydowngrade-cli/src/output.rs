//! Output formatting for pydowngrade
//!
//! Supports text (colored terminal), JSON and unified diff output formats.
//! Reports go to stdout; diagnostics go through `tracing` on stderr.

use anyhow::Result;
use colored::*;
use serde::Serialize;
use std::path::Path;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Diff,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<OutputFormat> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "diff" => Some(OutputFormat::Diff),
            _ => None,
        }
    }
}

/// One rewritten construct
#[derive(Debug, Clone, Serialize)]
pub struct EditInfo {
    pub rule: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Unchanged,
    /// Would change (check mode)
    Changed,
    /// Rewritten on disk (fix mode)
    Fixed,
    Error,
}

/// Result of processing a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<EditInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn new(path: &Path, status: FileStatus, edits: Vec<EditInfo>) -> Self {
        Self {
            path: path.display().to_string(),
            status,
            edits,
            error: None,
        }
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub files_processed: usize,
    pub files_with_changes: usize,
    pub total_rewrites: usize,
    pub errors: usize,
}

/// Full JSON output structure
#[derive(Debug, Serialize)]
pub struct JsonOutput {
    pub version: String,
    pub target: String,
    pub summary: Summary,
    pub files: Vec<FileReport>,
}

/// Accumulates per-file results and prints them
pub struct Reporter {
    format: OutputFormat,
    verbose: bool,
    files: Vec<FileReport>,
    summary: Summary,
}

impl Reporter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self {
            format,
            verbose,
            files: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn report_unchanged(&mut self, path: &Path) {
        self.summary.files_processed += 1;
        if self.verbose && self.format == OutputFormat::Text {
            println!("{}: No changes needed", path.display());
        }
        self.files
            .push(FileReport::new(path, FileStatus::Unchanged, Vec::new()));
    }

    /// A file that would change (check mode)
    pub fn report_check(&mut self, path: &Path, edits: Vec<EditInfo>, old: &str, new: &str) {
        self.count_changes(&edits);

        match self.format {
            OutputFormat::Text => {
                println!("{}", path.display().to_string().bold());
                print_changed_lines(old, new);
                println!();
                print_edits(&edits);
                println!();
            }
            OutputFormat::Diff => print_unified_diff(path, old, new),
            OutputFormat::Json => {}
        }

        self.files
            .push(FileReport::new(path, FileStatus::Changed, edits));
    }

    /// A file that was rewritten on disk
    pub fn report_fix(&mut self, path: &Path, edits: Vec<EditInfo>) {
        self.count_changes(&edits);

        if self.format == OutputFormat::Text {
            println!("{}", path.display().to_string().bold());
            println!("  {} Applied {} rewrite(s)", "OK".green(), edits.len());
            if self.verbose {
                print_edits(&edits);
            }
            println!();
        }

        self.files.push(FileReport::new(path, FileStatus::Fixed, edits));
    }

    pub fn report_error(&mut self, path: &Path, error: &str) {
        self.summary.files_processed += 1;
        self.summary.errors += 1;

        if self.format != OutputFormat::Json {
            eprintln!("{}: {} - {}", "Error".red(), path.display(), error);
        }

        let mut report = FileReport::new(path, FileStatus::Error, Vec::new());
        report.error = Some(error.to_string());
        self.files.push(report);
    }

    fn count_changes(&mut self, edits: &[EditInfo]) {
        self.summary.files_processed += 1;
        self.summary.files_with_changes += 1;
        self.summary.total_rewrites += edits.len();
    }

    /// Print final summary/output
    pub fn finish(self, check_mode: bool) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                println!("{}", "Summary".bold().underline());
                println!("  Files processed: {}", self.summary.files_processed);
                println!("  Files with changes: {}", self.summary.files_with_changes);
                println!("  Total rewrites: {}", self.summary.total_rewrites);
                if self.summary.errors > 0 {
                    println!("  Errors: {}", self.summary.errors.to_string().red());
                }

                if check_mode && self.summary.total_rewrites > 0 {
                    println!();
                    println!("{}", "Run with --fix to apply changes".yellow());
                }
            }
            OutputFormat::Json => {
                let output = JsonOutput {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    target: "3.11".to_string(),
                    summary: self.summary,
                    files: self.files,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            // Patch-compatible output carries no summary
            OutputFormat::Diff => {}
        }
        Ok(())
    }

    /// Get summary for exit code determination
    pub fn summary(&self) -> &Summary {
        &self.summary
    }
}

fn print_edits(edits: &[EditInfo]) {
    for edit in edits {
        println!(
            "  {} {}:{} [{}] {}",
            "->".green(),
            edit.line,
            edit.column,
            edit.rule.cyan(),
            edit.message
        );
    }
}

/// Print removed and added lines only
fn print_changed_lines(old: &str, new: &str) {
    for line in diff::lines(old, new) {
        match line {
            diff::Result::Left(l) => println!("  {}", format!("- {}", l).red()),
            diff::Result::Right(r) => println!("  {}", format!("+ {}", r).green()),
            diff::Result::Both(_, _) => {}
        }
    }
}

/// Print unified diff format (standard diff -u compatible)
fn print_unified_diff(path: &Path, old: &str, new: &str) {
    print!("{}", unified_diff(path, old, new));
}

fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    use similar::TextDiff;

    let path_str = path.display().to_string();
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path_str}"), &format!("b/{path_str}"))
        .to_string()
}
