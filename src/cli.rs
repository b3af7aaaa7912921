//! Command-line interface module for filesorter.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing
//! - Building the engine from configuration
//! - Bulk, selection and auto-sort commands
//! - Printing outcomes

use crate::config::SorterConfig;
use crate::dispatch::DispatchEngine;
use crate::logging;
use crate::output::{ConsoleNotifier, OutputFormatter};
use crate::rules::Action;
use crate::watch::AutoSorter;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Route files into subfolders by extension.
#[derive(Debug, Parser)]
#[command(name = "filesorter", version, about)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug output on the console
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rotating file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sort every file in a directory (defaults to the configured source_dir)
    Sort {
        dir: Option<PathBuf>,
        /// Report what would happen without touching any file
        #[arg(long)]
        dry_run: bool,
    },
    /// Sort the given files
    SortFiles {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Sort a directory, then keep sorting new files until Enter is pressed
    Watch {
        dir: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective extension routing table
    Rules,
    /// Show the last lines of the newest log file (from --log-dir, else the current directory)
    Log {
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: usize,
    },
    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Runs the CLI application with parsed arguments.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use filesorter::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["filesorter", "sort", "/path/to/inbox", "--dry-run"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Sort { dir, dry_run } => {
            let (config, engine, _) = load_engine(config_path)?;
            let dir = resolve_source(dir, &config)?;
            engine.set_test_run(dry_run);
            announce(&format!("Sorting contents of: {}", dir.display()), dry_run);
            let outcome = engine.sort_directory(&dir)?;
            OutputFormatter::outcome(&outcome);
        }
        Command::SortFiles { paths, dry_run } => {
            let (_, engine, _) = load_engine(config_path)?;
            engine.set_test_run(dry_run);
            announce(&format!("Sorting {} selected files", paths.len()), dry_run);
            let outcome = engine.sort_files(&paths)?;
            OutputFormatter::outcome(&outcome);
        }
        Command::Watch { dir, dry_run } => {
            let (config, engine, notifier) = load_engine(config_path)?;
            let dir = resolve_source(dir, &config)?;
            engine.set_test_run(dry_run);
            announce(&format!("Auto-sorting: {}", dir.display()), dry_run);
            watch(Arc::new(engine), notifier, &dir, &config)?;
        }
        Command::Rules => {
            let (_, engine, _) = load_engine(config_path)?;
            print_rules(&engine);
        }
        Command::Log { lines } => {
            show_log(cli.log_dir.as_deref().unwrap_or(Path::new(".")), lines)?;
        }
        Command::InitConfig { path, force } => init_config(&path, force)?,
    }

    Ok(())
}

fn load_engine(
    config_path: Option<&Path>,
) -> Result<(SorterConfig, DispatchEngine, Arc<ConsoleNotifier>)> {
    let config = SorterConfig::load(config_path).context("Error loading configuration")?;
    let notifier = Arc::new(ConsoleNotifier::new());
    let engine = build_engine(&config, notifier.clone())?;
    Ok((config, engine, notifier))
}

/// Builds a dispatch engine from configuration.
pub fn build_engine(
    config: &SorterConfig,
    notifier: Arc<ConsoleNotifier>,
) -> Result<DispatchEngine> {
    let rules = config.rule_table().context("Invalid routing rules")?;
    let exclusions = config
        .exclusion_filter()
        .context("Invalid exclusion patterns")?;

    let mut engine = DispatchEngine::new(rules, notifier).with_exclusions(exclusions);
    if let Some(source_dir) = config.source_dir() {
        engine = engine.with_source_dir(source_dir);
    }
    Ok(engine)
}

fn resolve_source(dir: Option<PathBuf>, config: &SorterConfig) -> Result<PathBuf> {
    match dir.or_else(|| config.source_dir().map(Path::to_path_buf)) {
        Some(dir) => Ok(dir),
        None => bail!("No directory given and no source_dir configured"),
    }
}

fn announce(message: &str, dry_run: bool) {
    if dry_run {
        OutputFormatter::dry_run_notice(message);
    } else {
        OutputFormatter::info(message);
    }
}

fn watch(
    engine: Arc<DispatchEngine>,
    notifier: Arc<ConsoleNotifier>,
    dir: &Path,
    config: &SorterConfig,
) -> Result<()> {
    let sorter = AutoSorter::new(engine, notifier.clone()).with_debounce(config.debounce());

    let initial = sorter.enable(dir)?;
    OutputFormatter::outcome(&initial);

    let spinner = OutputFormatter::create_spinner("Watching for new files. Press Enter to stop.");
    notifier.attach_spinner(spinner.clone());

    let mut line = String::new();
    let waited = io::stdin().read_line(&mut line);

    spinner.finish_and_clear();
    notifier.detach_spinner();
    sorter.disable();

    waited.context("Failed to read from stdin")?;
    Ok(())
}

fn print_rules(engine: &DispatchEngine) {
    let rules = engine.rules();
    if rules.is_empty() {
        OutputFormatter::warning("No routing rules configured.");
        return;
    }

    OutputFormatter::header("ROUTING RULES");
    for (extension, route) in rules.entries() {
        let target = match route.action {
            Action::Delete => "(deleted)".to_string(),
            _ => format!("{}/", route.folder),
        };
        OutputFormatter::plain(&format!("  {:<7} {:<7} {}", extension, route.action, target));
    }
    if let Some(source_dir) = engine.source_dir() {
        OutputFormatter::plain(&format!("\nSource directory: {}", source_dir.display()));
    }
}

fn show_log(log_dir: &Path, lines: usize) -> Result<()> {
    let Some(path) = logging::latest_log_file(log_dir)
        .with_context(|| format!("Failed to read log directory: {}", log_dir.display()))?
    else {
        OutputFormatter::warning(&format!("No log file found in {}", log_dir.display()));
        return Ok(());
    };

    let tail = logging::tail_lines(&path, lines)
        .with_context(|| format!("Failed to read log file: {}", path.display()))?;
    OutputFormatter::header(&path.display().to_string());
    for line in &tail {
        OutputFormatter::plain(line);
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    SorterConfig::default()
        .save(path)
        .context("Error writing configuration")?;
    OutputFormatter::success(&format!("Default configuration written to {}", path.display()));
    Ok(())
}
