//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! the auto-sort spinner, and the per-folder summary table. Notifications from
//! the engine reach the terminal through [`ConsoleNotifier`].

use crate::dispatch::SortOutcome;
use crate::notifier::{Notifier, SortEvent};
use crate::rules::Action;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use filesorter::output::OutputFormatter;
    /// OutputFormatter::success("Sorted 3 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a spinner shown while auto-sort is running.
    pub fn create_spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Prints every dispatched file of `outcome`, then the summary.
    pub fn outcome(outcome: &SortOutcome) {
        if outcome.results.is_empty() {
            Self::info("No matching files found.");
        }

        for result in &outcome.results {
            let target = match (&result.final_name, result.action) {
                (_, Action::Delete) => String::new(),
                (Some(name), _) => format!(" → {}/{}", result.folder, name),
                (None, _) => format!(" → {}/", result.folder),
            };
            let line = format!(
                "{} {}{}",
                result.action.past_tense(),
                result.file_name,
                target
            );
            match (&result.error, outcome.test_run) {
                (Some(error), _) => Self::error(&format!("{}: {}", result.file_name, error)),
                (None, true) => Self::dry_run_notice(&format!("Would have {}", line)),
                (None, false) => Self::success(&capitalize(&line)),
            }
        }

        let counts = outcome.processed_by_folder();
        if !counts.is_empty() {
            Self::summary_table(&counts, outcome.files_processed);
        }

        println!();
        if outcome.failed_count() > 0 {
            Self::warning(&outcome.summary_message());
        } else if outcome.test_run {
            Self::dry_run_notice(&format!(
                "{} No files were modified.",
                outcome.summary_message()
            ));
        } else {
            Self::success(&outcome.summary_message());
        }
    }

    /// Prints a summary table with file counts per destination folder.
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_folder_len = folder_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(6); // At least "Folder" width

        println!(
            "{:<width$} | {}",
            "Folder".bold(),
            "Files".bold(),
            width = max_folder_len
        );
        println!("{}", "-".repeat(max_folder_len + 10));

        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count),
                width = max_folder_len
            );
        }

        println!("{}", "-".repeat(max_folder_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_folder_len
        );
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Prints notifications to the terminal.
///
/// Only auto-sort file events and auto-sort state changes are shown; batch
/// results and their errors are printed by the CLI from the returned outcome.
/// While a spinner is attached, lines are printed above it.
#[derive(Default)]
pub struct ConsoleNotifier {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_spinner(&self, spinner: ProgressBar) {
        *self.spinner.lock().unwrap_or_else(PoisonError::into_inner) = Some(spinner);
    }

    pub fn detach_spinner(&self) {
        self.spinner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn print(&self, line: String) {
        match &*self.spinner.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(spinner) => spinner.println(line),
            None => println!("{}", line),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, event: &SortEvent) {
        let visible = match event {
            SortEvent::FileSorted { auto, .. } => *auto,
            SortEvent::FileFailed { auto, .. } => *auto,
            SortEvent::BatchFinished { .. } | SortEvent::SourceUnavailable { .. } => false,
            SortEvent::AutoSortEnabled { .. } | SortEvent::AutoSortDisabled => true,
        };
        if !visible {
            return;
        }

        let title = format!("[{}]", event.title());
        let line = if event.is_error() {
            format!("{} {}", title.red().bold(), event.message())
        } else {
            format!("{} {}", title.cyan().bold(), event.message())
        };
        self.print(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("moved a.jpg"), "Moved a.jpg");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1), "file");
        assert_eq!(plural(0), "files");
        assert_eq!(plural(2), "files");
    }
}
