//! pydowngrade CLI - rewrite Python 3.12 type parameter syntax for Python 3.11
//!
//! Available rules:
//! - type_alias: Convert `type X[T] = ...` to `X: TypeAlias = ...`
//! - generic_class: Convert `class C[T]:` to `class C(Generic[T]):`
//! - generic_function: Convert `def f[T](x: T):` to `def f(x: T):`

mod config;
mod output;
mod process;

use anyhow::Result;
use clap::Parser;
use colored::*;
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use output::{EditInfo, OutputFormat, Reporter};
use process::{process_file, process_stdin, write_file};
use pydowngrade_rules::{RewriteEngine, RuleSet};

/// File extensions picked up when walking directories
const PYTHON_EXTENSIONS: &[&str] = &["py", "pyi"];

#[derive(Parser)]
#[command(name = "pydowngrade")]
#[command(version)]
#[command(about = "Rewrite Python 3.12 type parameter syntax into Python 3.11 code")]
struct Cli {
    /// Files or directories to process
    #[arg(required_unless_present_any = ["list_rules", "stdin"])]
    paths: Vec<PathBuf>,

    /// Report files that would change without writing them (default mode)
    #[arg(long, conflicts_with = "fix")]
    check: bool,

    /// Rewrite files in place
    #[arg(long, conflicts_with = "check")]
    fix: bool,

    /// Read source from standard input and print the rewritten source
    #[arg(long, conflicts_with_all = ["paths", "fix", "check"])]
    stdin: bool,

    /// Show verbose output and debug logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Rules to run (can be specified multiple times). Overrides config file.
    #[arg(long, short = 'r', value_name = "RULE")]
    rule: Vec<String>,

    /// Output format: text, json, diff
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(long, conflicts_with = "format")]
    json: bool,

    /// Path to config file (default: auto-detect .pydowngrade.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ignore config files
    #[arg(long, conflicts_with = "config")]
    no_config: bool,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

/// Diagnostics go to stderr so stdout stays usable for reports and `--stdin`
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "pydowngrade_cli=debug,pydowngrade_rules=debug,pydowngrade_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let rules = RuleSet::builtin();

    if cli.list_rules {
        println!("{}", "Available rules:".bold());
        for (name, description) in rules.list_rules() {
            println!("  {} - {}", name.green(), description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli, &rules.all_names())?;
    let rules = config.select_rules(rules, &cli.rule)?;
    debug!(rules = ?rules.all_names(), "selected rules");
    let engine = RewriteEngine::new(rules);

    if cli.stdin {
        let rewritten = process_stdin(&engine)?;
        std::io::stdout().write_all(rewritten.as_bytes())?;
        return Ok(ExitCode::SUCCESS);
    }

    let output_format = output_format(&cli, &config)?;
    let check_mode = is_check_mode(&cli);
    let fix_mode = !check_mode;
    info!(mode = if fix_mode { "fix" } else { "check" }, "starting");

    let file_paths = collect_files(&cli.paths, &config);
    debug!(files = file_paths.len(), "collected input files");

    // Processing is pure; writes and reporting happen afterwards in path order
    let mut results: Vec<(&PathBuf, FileResult)> = file_paths
        .par_iter()
        .map(|path| (path, process_file_to_result(path, &engine)))
        .collect();
    results.sort_by(|a, b| a.0.cmp(b.0));

    let mut reporter = Reporter::new(output_format, cli.verbose);
    for (path, result) in results {
        report_result(path, result, fix_mode, &mut reporter);
    }

    let summary = reporter.summary();
    let exit_code = if summary.errors > 0 {
        ExitCode::from(1)
    } else if check_mode && summary.files_with_changes > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    };

    reporter.finish(check_mode)?;

    Ok(exit_code)
}

/// `--check` is the default; only an explicit `--fix` writes files
fn is_check_mode(cli: &Cli) -> bool {
    cli.check || !cli.fix
}

fn load_config(cli: &Cli, known_rules: &[&str]) -> Result<Config> {
    if cli.no_config {
        return Ok(Config::default());
    }
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "using config");
        return Config::load_path(path, known_rules);
    }
    Ok(match Config::load(known_rules)? {
        Some((config, path)) => {
            info!(path = %path.display(), "using config");
            config
        }
        None => Config::default(),
    })
}

/// `--json` beats `--format`, which beats the config file
fn output_format(cli: &Cli, config: &Config) -> Result<OutputFormat> {
    if cli.json {
        return Ok(OutputFormat::Json);
    }
    match cli.format.as_deref().or(config.output.format.as_deref()) {
        None => Ok(OutputFormat::default()),
        Some(name) => OutputFormat::parse(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid output format '{}'. Valid options: text, json, diff",
                name
            )
        }),
    }
}

fn is_python_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PYTHON_EXTENSIONS.contains(&ext))
}

/// Explicit files are always taken; directories are walked for Python files
fn collect_files(paths: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_python_file(e.path()))
            {
                if config.should_exclude(entry.path()) {
                    debug!(path = %entry.path().display(), "excluded by config");
                    continue;
                }
                files.push(entry.path().to_path_buf());
            }
        } else {
            warn!(path = %path.display(), "path does not exist");
        }
    }

    files
}

/// Result of processing a single file (for parallel processing)
enum FileResult {
    NoChanges,
    HasChanges {
        edits: Vec<EditInfo>,
        old_source: String,
        new_source: String,
    },
    Error(String),
}

fn process_file_to_result(path: &Path, engine: &RewriteEngine) -> FileResult {
    match process_file(path, engine) {
        Ok(result) => match result.new_source {
            Some(new_source) => FileResult::HasChanges {
                edits: result.edits,
                old_source: result.old_source,
                new_source,
            },
            None => FileResult::NoChanges,
        },
        Err(e) => FileResult::Error(format!("{:#}", e)),
    }
}

/// Report a file result and apply it in fix mode
fn report_result(path: &Path, result: FileResult, fix_mode: bool, reporter: &mut Reporter) {
    match result {
        FileResult::NoChanges => reporter.report_unchanged(path),
        FileResult::HasChanges {
            edits,
            old_source,
            new_source,
        } => {
            if !fix_mode {
                reporter.report_check(path, edits, &old_source, &new_source);
            } else if let Err(e) = write_file(path, &new_source) {
                reporter.report_error(path, &format!("{:#}", e));
            } else {
                reporter.report_fix(path, edits);
            }
        }
        FileResult::Error(msg) => reporter.report_error(path, &msg),
    }
}
