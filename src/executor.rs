//! Execution of a single routing action.
//!
//! [`ActionExecutor`] applies one [`Action`] to one file. Failures are captured
//! in the returned [`ExecutionResult`] rather than propagated, so a batch keeps
//! going when a single file cannot be handled. In test-run mode the executor
//! computes the same result it would report for a live run but leaves the
//! filesystem alone.

use crate::notifier::{Notifier, SortEvent};
use crate::rules::{Action, Route};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix appended to the file stem by [`Action::Rename`].
pub const RENAME_SUFFIX: &str = "_renamed";

/// One file to act on.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    /// Current location of the file.
    pub source: &'a Path,
    /// Folder the file is routed into. Ignored for [`Action::Delete`].
    pub dest_dir: Option<&'a Path>,
    /// Bare file name exactly as on disk; the destination keeps its bytes.
    pub file_name: &'a OsStr,
    pub route: &'a Route,
    /// Whether the request came from the auto-sort watcher.
    pub auto: bool,
}

/// Reported outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// File name for display; invalid UTF-8 is replaced.
    pub file_name: String,
    pub folder: String,
    pub action: Action,
    pub success: bool,
    /// Name of the file at its destination. `None` for deletions.
    pub final_name: Option<String>,
    /// Full destination path. `None` for deletions.
    pub destination: Option<PathBuf>,
    pub error: Option<String>,
}

/// Computes the destination file name for an action.
///
/// Rename appends [`RENAME_SUFFIX`] to the stem and keeps the extension; Move
/// and Copy keep the name; Delete has no destination. Works on raw OS names so
/// non-UTF-8 bytes survive.
///
/// ```
/// use filesorter::executor::final_name_for;
/// use filesorter::rules::Action;
///
/// assert_eq!(final_name_for("data.csv", Action::Rename), Some("data_renamed.csv".into()));
/// assert_eq!(final_name_for("data.csv", Action::Copy), Some("data.csv".into()));
/// assert_eq!(final_name_for("data.csv", Action::Delete), None);
/// ```
pub fn final_name_for(file_name: impl AsRef<OsStr>, action: Action) -> Option<OsString> {
    let file_name = file_name.as_ref();
    match action {
        Action::Move | Action::Copy => Some(file_name.to_os_string()),
        Action::Rename => {
            let path = Path::new(file_name);
            let mut renamed = path.file_stem().map(OsStr::to_os_string).unwrap_or_default();
            renamed.push(RENAME_SUFFIX);
            if let Some(ext) = path.extension() {
                renamed.push(".");
                renamed.push(ext);
            }
            Some(renamed)
        }
        Action::Delete => None,
    }
}

fn display_name(name: &OsStr) -> String {
    name.to_string_lossy().into_owned()
}

/// Applies routing actions to files and reports each outcome.
#[derive(Clone)]
pub struct ActionExecutor {
    notifier: Arc<dyn Notifier>,
}

impl ActionExecutor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Executes `request`, or only plans it when `test_run` is set.
    ///
    /// Exactly one notification and one log line are emitted per call.
    pub fn execute(&self, request: &ExecutionRequest<'_>, test_run: bool) -> ExecutionResult {
        let action = request.route.action;
        let final_name = final_name_for(request.file_name, action);

        let destination = match (action.needs_destination(), request.dest_dir, &final_name) {
            (true, Some(dir), Some(name)) => Some(dir.join(name)),
            _ => None,
        };

        let outcome = if action.needs_destination() && destination.is_none() {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no destination directory for this action",
            ))
        } else if test_run {
            // Read-only check so a vanished source fails as it would live.
            fs::symlink_metadata(request.source).map(|_| ())
        } else {
            apply(action, request.source, destination.as_deref())
        };

        let result = ExecutionResult {
            file_name: display_name(request.file_name),
            folder: request.route.folder.clone(),
            action,
            success: outcome.is_ok(),
            final_name: final_name.as_deref().map(display_name),
            destination,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        };

        self.report(&result, request.auto, test_run);
        result
    }

    /// Records a failure that happened before the action could run.
    pub(crate) fn report_failure(
        &self,
        request: &ExecutionRequest<'_>,
        error: String,
        test_run: bool,
    ) -> ExecutionResult {
        let action = request.route.action;
        let result = ExecutionResult {
            file_name: display_name(request.file_name),
            folder: request.route.folder.clone(),
            action,
            success: false,
            final_name: final_name_for(request.file_name, action)
                .as_deref()
                .map(display_name),
            destination: None,
            error: Some(error),
        };
        self.report(&result, request.auto, test_run);
        result
    }

    fn report(&self, result: &ExecutionResult, auto: bool, test_run: bool) {
        let event = match &result.error {
            None => {
                tracing::info!(
                    file = %result.file_name,
                    folder = %result.folder,
                    action = %result.action,
                    final_name = result.final_name.as_deref(),
                    auto,
                    test_run,
                    "File {}",
                    result.action.past_tense()
                );
                SortEvent::FileSorted {
                    file_name: result.file_name.clone(),
                    folder: result.folder.clone(),
                    action: result.action,
                    auto,
                    test_run,
                }
            }
            Some(error) => {
                tracing::error!(
                    file = %result.file_name,
                    folder = %result.folder,
                    action = %result.action,
                    auto,
                    test_run,
                    error = %error,
                    "Failed to process file"
                );
                SortEvent::FileFailed {
                    file_name: result.file_name.clone(),
                    error: error.clone(),
                    auto,
                }
            }
        };
        self.notifier.notify(&event);
    }
}

fn apply(action: Action, source: &Path, destination: Option<&Path>) -> io::Result<()> {
    match (action, destination) {
        (Action::Delete, _) => fs::remove_file(source),
        (Action::Copy, Some(dst)) => copy_with_metadata(source, dst),
        (Action::Move | Action::Rename, Some(dst)) => move_file(source, dst),
        (_, None) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no destination directory for this action",
        )),
    }
}

/// Renames `src` to `dst`, falling back to copy-and-remove across filesystems.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_with_metadata(src, dst)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Copies contents and permissions, then carries over timestamps where possible.
fn copy_with_metadata(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;

    let metadata = fs::metadata(src)?;
    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Err(e) = File::options()
        .write(true)
        .open(dst)
        .and_then(|file| file.set_times(times))
    {
        tracing::debug!(destination = %dst.display(), error = %e, "Could not preserve timestamps");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn route(folder: &str, action: Action) -> Route {
        Route {
            folder: folder.to_string(),
            action,
        }
    }

    struct Setup {
        temp_dir: TempDir,
        notifier: Arc<RecordingNotifier>,
        executor: ActionExecutor,
    }

    impl Setup {
        fn new() -> Self {
            let temp_dir = TempDir::new().expect("Failed to create temp directory");
            let notifier = Arc::new(RecordingNotifier::default());
            let executor = ActionExecutor::new(notifier.clone());
            fs::create_dir(temp_dir.path().join("Target")).unwrap();
            Self {
                temp_dir,
                notifier,
                executor,
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.temp_dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn target(&self) -> PathBuf {
            self.temp_dir.path().join("Target")
        }

        fn run(&self, name: &str, action: Action, test_run: bool) -> ExecutionResult {
            let source = self.temp_dir.path().join(name);
            let target = self.target();
            let route = route("Target", action);
            let request = ExecutionRequest {
                source: &source,
                dest_dir: Some(&target),
                file_name: OsStr::new(name),
                route: &route,
                auto: false,
            };
            self.executor.execute(&request, test_run)
        }
    }

    #[test]
    fn test_move() {
        let setup = Setup::new();
        let src = setup.file("a.jpg", "img");

        let result = setup.run("a.jpg", Action::Move, false);

        assert!(result.success);
        assert!(!src.exists());
        assert_eq!(
            fs::read_to_string(setup.target().join("a.jpg")).unwrap(),
            "img"
        );
        assert_eq!(result.destination, Some(setup.target().join("a.jpg")));
    }

    #[test]
    fn test_copy_keeps_source_and_mtime() {
        let setup = Setup::new();
        let src = setup.file("a.pdf", "doc");
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let result = setup.run("a.pdf", Action::Copy, false);

        assert!(result.success);
        assert!(src.exists());
        let copied = setup.target().join("a.pdf");
        assert_eq!(fs::read_to_string(&copied).unwrap(), "doc");
        let copied_mtime = fs::metadata(&copied).unwrap().modified().unwrap();
        let delta = copied_mtime
            .duration_since(old)
            .unwrap_or_else(|e| e.duration());
        assert!(delta < Duration::from_secs(2));
    }

    #[test]
    fn test_rename_moves_with_suffix() {
        let setup = Setup::new();
        let src = setup.file("data.csv", "1,2");

        let result = setup.run("data.csv", Action::Rename, false);

        assert!(result.success);
        assert!(!src.exists());
        assert!(setup.target().join("data_renamed.csv").exists());
        assert_eq!(result.final_name.as_deref(), Some("data_renamed.csv"));
    }

    #[test]
    fn test_delete() {
        let setup = Setup::new();
        let src = setup.file("x.log", "log");

        let result = setup.run("x.log", Action::Delete, false);

        assert!(result.success);
        assert!(!src.exists());
        assert_eq!(result.final_name, None);
        assert_eq!(result.destination, None);
    }

    #[test]
    fn test_missing_source_is_reported_not_raised() {
        let setup = Setup::new();

        let result = setup.run("gone.txt", Action::Move, false);

        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(matches!(
            setup.notifier.events().as_slice(),
            [SortEvent::FileFailed { .. }]
        ));
    }

    #[test]
    fn test_dry_run_matches_live_report_for_every_action() {
        for action in Action::ALL {
            let dry = Setup::new();
            let src = dry.file("data.csv", "keep me");
            let planned = dry.run("data.csv", action, true);

            assert!(src.exists(), "{action} dry run touched the source");
            assert_eq!(fs::read_to_string(&src).unwrap(), "keep me");
            assert_eq!(fs::read_dir(dry.target()).unwrap().count(), 0);

            let live = Setup::new();
            live.file("data.csv", "keep me");
            let applied = live.run("data.csv", action, false);

            assert!(planned.success && applied.success);
            assert_eq!(planned.action, applied.action);
            assert_eq!(planned.final_name, applied.final_name);
            assert_eq!(planned.folder, applied.folder);
        }
    }

    #[test]
    fn test_one_notification_per_execution() {
        let setup = Setup::new();
        setup.file("a.jpg", "img");

        setup.run("a.jpg", Action::Move, false);

        assert_eq!(setup.notifier.events().len(), 1);
    }

    #[test]
    fn test_final_name_without_extension() {
        assert_eq!(
            final_name_for("README", Action::Rename),
            Some("README_renamed".into())
        );
        assert_eq!(
            final_name_for("archive.tar.gz", Action::Rename),
            Some("archive.tar_renamed.gz".into())
        );
    }

    #[test]
    fn test_dry_run_of_missing_source_fails_like_live_run() {
        for action in Action::ALL {
            let dry = Setup::new();
            let planned = dry.run("gone.jpg", action, true);

            let live = Setup::new();
            let applied = live.run("gone.jpg", action, false);

            assert!(!planned.success, "{action} dry run reported success");
            assert!(!applied.success);
            assert!(planned.error.is_some());
            assert_eq!(planned.final_name, applied.final_name);
            assert!(matches!(
                dry.notifier.events().as_slice(),
                [SortEvent::FileFailed { .. }]
            ));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_keep_their_bytes() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let setup = Setup::new();
        let raw = OsStr::from_bytes(b"caf\xe9.csv");
        fs::write(setup.temp_dir.path().join(raw), "1,2").unwrap();
        let source = setup.temp_dir.path().join(raw);
        let target = setup.target();
        let route = route("Target", Action::Rename);
        let request = ExecutionRequest {
            source: &source,
            dest_dir: Some(&target),
            file_name: raw,
            route: &route,
            auto: false,
        };

        let result = setup.executor.execute(&request, false);

        assert!(result.success);
        let expected = OsString::from_vec(b"caf\xe9_renamed.csv".to_vec());
        assert!(target.join(&expected).is_file());
        assert_eq!(result.destination, Some(target.join(&expected)));
        assert_eq!(result.file_name, "caf\u{FFFD}.csv");
    }
}
