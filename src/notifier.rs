//! User-facing notifications.
//!
//! The core reports what happened through a [`Notifier`]. Delivery is best
//! effort: implementations must not block for long and must not fail the
//! operation that produced the event.

use crate::rules::Action;
use std::path::PathBuf;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEvent {
    FileSorted {
        file_name: String,
        folder: String,
        action: Action,
        auto: bool,
        test_run: bool,
    },
    FileFailed {
        file_name: String,
        error: String,
        auto: bool,
    },
    BatchFinished {
        processed: usize,
        failed: usize,
        test_run: bool,
    },
    SourceUnavailable {
        path: PathBuf,
    },
    AutoSortEnabled {
        source_dir: PathBuf,
    },
    AutoSortDisabled,
}

impl SortEvent {
    pub fn title(&self) -> &'static str {
        match self {
            SortEvent::FileSorted { auto: true, .. } => "Auto-sort",
            SortEvent::FileSorted { auto: false, .. } => "Sorted",
            SortEvent::FileFailed { auto: true, .. } => "Auto-sort error",
            SortEvent::FileFailed { auto: false, .. } => "Error",
            SortEvent::BatchFinished { .. } => "Done",
            SortEvent::SourceUnavailable { .. } => "Error",
            SortEvent::AutoSortEnabled { .. } | SortEvent::AutoSortDisabled => "Auto-sort",
        }
    }

    pub fn message(&self) -> String {
        match self {
            SortEvent::FileSorted {
                file_name,
                action,
                test_run,
                ..
            } => {
                let prefix = if *test_run { "(Test) " } else { "" };
                format!("{}File '{}' processed: {}", prefix, file_name, action)
            }
            SortEvent::FileFailed {
                file_name, error, ..
            } => format!("{}: {}", file_name, error),
            SortEvent::BatchFinished {
                processed,
                failed,
                test_run,
            } => {
                let mut msg = if *test_run {
                    format!("(Test) Processed {} files!", processed)
                } else {
                    format!("Processed {} files!", processed)
                };
                if *failed > 0 {
                    msg.push_str(&format!(" {} failed.", failed));
                }
                msg
            }
            SortEvent::SourceUnavailable { path } => format!(
                "Source directory is not set or does not exist: {}",
                path.display()
            ),
            SortEvent::AutoSortEnabled { source_dir } => {
                format!("Automatic sorting enabled for {}", source_dir.display())
            }
            SortEvent::AutoSortDisabled => "Automatic sorting disabled.".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SortEvent::FileFailed { .. } | SortEvent::SourceUnavailable { .. }
        )
    }
}

/// Receives [`SortEvent`]s from the engine and the watch loop.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &SortEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &SortEvent) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_message_distinguishes_dry_run() {
        let live = SortEvent::BatchFinished {
            processed: 3,
            failed: 0,
            test_run: false,
        };
        let dry = SortEvent::BatchFinished {
            processed: 3,
            failed: 0,
            test_run: true,
        };

        assert_eq!(live.message(), "Processed 3 files!");
        assert_eq!(dry.message(), "(Test) Processed 3 files!");
        assert_eq!(live.title(), "Done");
    }

    #[test]
    fn test_failed_batch_mentions_failures() {
        let event = SortEvent::BatchFinished {
            processed: 1,
            failed: 2,
            test_run: false,
        };
        assert_eq!(event.message(), "Processed 1 files! 2 failed.");
    }

    #[test]
    fn test_file_events() {
        let sorted = SortEvent::FileSorted {
            file_name: "a.jpg".to_string(),
            folder: "Images".to_string(),
            action: Action::Move,
            auto: true,
            test_run: false,
        };
        assert_eq!(sorted.title(), "Auto-sort");
        assert_eq!(sorted.message(), "File 'a.jpg' processed: Move");
        assert!(!sorted.is_error());

        let failed = SortEvent::FileFailed {
            file_name: "a.jpg".to_string(),
            error: "permission denied".to_string(),
            auto: false,
        };
        assert_eq!(failed.title(), "Error");
        assert_eq!(failed.message(), "a.jpg: permission denied");
        assert!(failed.is_error());
    }
}
