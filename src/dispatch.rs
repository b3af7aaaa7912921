//! Classification and dispatch of candidate files.
//!
//! [`DispatchEngine`] runs every candidate through the same decision procedure:
//! exclusion check, extension lookup, destination preparation and execution.
//! It backs the three sort triggers (a whole directory, an explicit selection
//! and a single auto-sorted file) and is safe to share between the caller's
//! thread and the watch worker.

use crate::exclusion::ExclusionFilter;
use crate::executor::{ActionExecutor, ExecutionRequest, ExecutionResult};
use crate::notifier::{Notifier, SortEvent};
use crate::rules::{Route, RuleTable};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Per-file entry of a [`SortOutcome`].
pub type FileResult = ExecutionResult;

/// Errors that abort a whole dispatch operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The source directory is missing or cannot be listed.
    #[error("Source directory {} is unavailable: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Aggregated result of one sort invocation.
#[derive(Debug, Clone)]
pub struct SortOutcome {
    /// Candidates enumerated, including excluded and unmatched ones.
    pub files_examined: usize,
    /// Candidates whose action succeeded.
    pub files_processed: usize,
    /// Every dispatched candidate, in processing order.
    pub results: Vec<FileResult>,
    /// Test-run flag, read once when the invocation started and applied to every file.
    pub test_run: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl SortOutcome {
    fn new(test_run: bool) -> Self {
        let now = Local::now();
        Self {
            files_examined: 0,
            files_processed: 0,
            results: Vec::new(),
            test_run,
            started_at: now,
            finished_at: now,
        }
    }

    fn record(&mut self, result: FileResult) {
        if result.success {
            self.files_processed += 1;
        }
        self.results.push(result);
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Successful files per destination folder, sorted by folder name.
    pub fn processed_by_folder(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in self.results.iter().filter(|r| r.success) {
            *counts.entry(result.folder.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary, with the `(Test)` marker for dry runs.
    pub fn summary_message(&self) -> String {
        SortEvent::BatchFinished {
            processed: self.files_processed,
            failed: self.failed_count(),
            test_run: self.test_run,
        }
        .message()
    }
}

/// Routes files according to a [`RuleTable`].
pub struct DispatchEngine {
    rules: RwLock<Arc<RuleTable>>,
    exclusions: ExclusionFilter,
    executor: ActionExecutor,
    notifier: Arc<dyn Notifier>,
    test_run: AtomicBool,
    source_dir: Option<PathBuf>,
}

impl DispatchEngine {
    /// Creates an engine with the built-in exclusions and no configured source directory.
    pub fn new(rules: RuleTable, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            exclusions: ExclusionFilter::new(),
            executor: ActionExecutor::new(notifier.clone()),
            notifier,
            test_run: AtomicBool::new(false),
            source_dir: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Sets the directory whose subfolders receive files from [`sort_files`](Self::sort_files).
    pub fn with_source_dir(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(source_dir.into());
        self
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    /// Current rule snapshot.
    pub fn rules(&self) -> Arc<RuleTable> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a rebuilt table. Invocations already running keep their snapshot.
    pub fn replace_rules(&self, rules: RuleTable) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rules);
        tracing::info!("Routing rules replaced");
    }

    pub fn set_test_run(&self, enabled: bool) {
        self.test_run.store(enabled, Ordering::SeqCst);
        tracing::info!(test_run = enabled, "Test-run mode changed");
    }

    pub fn is_test_run(&self) -> bool {
        self.test_run.load(Ordering::SeqCst)
    }

    /// Sorts every regular file directly inside `source_dir`.
    ///
    /// Subdirectories are not descended into. Files are visited in name order.
    pub fn sort_directory(&self, source_dir: &Path) -> DispatchResult<SortOutcome> {
        self.ensure_source(source_dir)?;

        let entries =
            fs::read_dir(source_dir).map_err(|e| self.source_unavailable(source_dir, e))?;
        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        candidates.sort();

        tracing::info!(
            source = %source_dir.display(),
            candidates = candidates.len(),
            "Sorting directory"
        );

        let rules = self.rules();
        let mut outcome = SortOutcome::new(self.is_test_run());
        for path in &candidates {
            outcome.files_examined += 1;
            let result = self.dispatch(&rules, source_dir, path, false, outcome.test_run);
            if let Some(result) = result {
                outcome.record(result);
            }
        }

        Ok(self.finish(outcome))
    }

    /// Sorts an explicit selection of files.
    ///
    /// Destination folders are created under the configured source directory,
    /// or next to each file when none is configured. Directories in the
    /// selection are skipped.
    pub fn sort_files(&self, paths: &[PathBuf]) -> DispatchResult<SortOutcome> {
        if let Some(source_dir) = &self.source_dir {
            self.ensure_source(source_dir)?;
        }

        tracing::info!(candidates = paths.len(), "Sorting selected files");

        let rules = self.rules();
        let mut outcome = SortOutcome::new(self.is_test_run());
        for path in paths {
            outcome.files_examined += 1;
            if path.is_dir() {
                tracing::debug!(path = %path.display(), "Skipping directory in selection");
                continue;
            }
            let root = self.source_dir.as_deref().unwrap_or_else(|| parent_dir(path));
            let result = self.dispatch(&rules, root, path, false, outcome.test_run);
            if let Some(result) = result {
                outcome.record(result);
            }
        }

        Ok(self.finish(outcome))
    }

    /// Sorts a single file into a subfolder of its own directory.
    ///
    /// Returns `Ok(None)` when the path is not a regular file, is excluded, or
    /// no rule matches it.
    pub fn sort_one(&self, path: &Path, auto: bool) -> DispatchResult<Option<FileResult>> {
        let root = parent_dir(path);
        self.ensure_source(root)?;

        if !path.is_file() {
            tracing::debug!(path = %path.display(), auto, "Not a regular file, skipping");
            return Ok(None);
        }

        let rules = self.rules();
        Ok(self.dispatch(&rules, root, path, auto, self.is_test_run()))
    }

    fn ensure_source(&self, source_dir: &Path) -> DispatchResult<()> {
        if source_dir.is_dir() {
            return Ok(());
        }
        Err(self.source_unavailable(
            source_dir,
            io::Error::new(io::ErrorKind::NotFound, "directory does not exist"),
        ))
    }

    fn source_unavailable(&self, path: &Path, source: io::Error) -> DispatchError {
        tracing::error!(
            source_dir = %path.display(),
            error = %source,
            "Source directory unavailable"
        );
        self.notifier.notify(&SortEvent::SourceUnavailable {
            path: path.to_path_buf(),
        });
        DispatchError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    fn finish(&self, mut outcome: SortOutcome) -> SortOutcome {
        outcome.finished_at = Local::now();
        tracing::info!(
            examined = outcome.files_examined,
            processed = outcome.files_processed,
            failed = outcome.failed_count(),
            test_run = outcome.test_run,
            "{}",
            outcome.summary_message()
        );
        self.notifier.notify(&SortEvent::BatchFinished {
            processed: outcome.files_processed,
            failed: outcome.failed_count(),
            test_run: outcome.test_run,
        });
        outcome
    }

    /// Runs one candidate through filter, classify, prepare and execute.
    fn dispatch(
        &self,
        rules: &RuleTable,
        root: &Path,
        path: &Path,
        auto: bool,
        test_run: bool,
    ) -> Option<FileResult> {
        let raw_name = path.file_name()?;
        let file_name = raw_name.to_string_lossy();

        if self.exclusions.is_excluded(&file_name) {
            tracing::debug!(file = %file_name, auto, "Excluded");
            return None;
        }

        let Some(extension) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            tracing::debug!(file = %file_name, auto, "No extension, skipping");
            return None;
        };
        let Some(route) = rules.lookup(&extension) else {
            tracing::debug!(file = %file_name, extension = %extension, auto, "No rule matches");
            return None;
        };
        tracing::debug!(
            file = %file_name,
            extension = %extension,
            folder = %route.folder,
            action = %route.action,
            auto,
            "Classified"
        );

        let dest_dir = if route.action.needs_destination() {
            let dir = root.join(&route.folder);
            if !test_run && let Err(e) = fs::create_dir_all(&dir) {
                let request = request(path, None, raw_name, route, auto);
                let error = format!("Failed to create directory {}: {}", dir.display(), e);
                return Some(self.executor.report_failure(&request, error, test_run));
            }
            Some(dir)
        } else {
            None
        };

        let request = request(path, dest_dir.as_deref(), raw_name, route, auto);
        Some(self.executor.execute(&request, test_run))
    }
}

/// Directory containing `path`, with `.` standing in for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn request<'a>(
    source: &'a Path,
    dest_dir: Option<&'a Path>,
    file_name: &'a OsStr,
    route: &'a Route,
    auto: bool,
) -> ExecutionRequest<'a> {
    ExecutionRequest {
        source,
        dest_dir,
        file_name,
        route,
        auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;
    use crate::notifier::testing::RecordingNotifier;
    use crate::rules::{Action, RoutingRule};
    use tempfile::TempDir;

    fn engine(rules: &[RoutingRule]) -> DispatchEngine {
        DispatchEngine::new(RuleTable::build(rules).unwrap(), Arc::new(NullNotifier))
    }

    fn images_move() -> Vec<RoutingRule> {
        vec![RoutingRule::new("Images", [".jpg", ".png"], Action::Move)]
    }

    #[test]
    fn test_sort_directory_routes_matching_files() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("a.jpg"), "img").unwrap();
        fs::write(base.join("b.txt"), "text").unwrap();

        let outcome = engine(&images_move()).sort_directory(base).unwrap();

        assert_eq!(outcome.files_examined, 2);
        assert_eq!(outcome.files_processed, 1);
        assert!(base.join("Images/a.jpg").exists());
        assert!(base.join("b.txt").exists());
    }

    #[test]
    fn test_sort_directory_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = DispatchEngine::new(
            RuleTable::build(&images_move()).unwrap(),
            notifier.clone(),
        );

        let result = engine.sort_directory(&temp_dir.path().join("missing"));

        assert!(matches!(result, Err(DispatchError::SourceUnavailable { .. })));
        assert!(matches!(
            notifier.events().as_slice(),
            [SortEvent::SourceUnavailable { .. }]
        ));
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("SHOUT.JPG"), "img").unwrap();

        let outcome = engine(&images_move()).sort_directory(base).unwrap();

        assert_eq!(outcome.files_processed, 1);
        assert!(base.join("Images/SHOUT.JPG").exists());
    }

    #[test]
    fn test_test_run_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("a.jpg"), "img").unwrap();
        let engine = engine(&images_move());
        engine.set_test_run(true);

        let outcome = engine.sort_directory(base).unwrap();

        assert!(outcome.test_run);
        assert_eq!(outcome.files_processed, 1);
        assert!(base.join("a.jpg").exists());
        assert!(!base.join("Images").exists());
        assert_eq!(outcome.summary_message(), "(Test) Processed 1 files!");
    }

    #[test]
    fn test_sort_one_skips_unmatched_and_excluded() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("notes.txt"), "text").unwrap();
        fs::write(base.join(".secret.jpg"), "img").unwrap();
        let engine = engine(&images_move());

        assert!(engine.sort_one(&base.join("notes.txt"), true).unwrap().is_none());
        assert!(engine.sort_one(&base.join(".secret.jpg"), true).unwrap().is_none());
        assert!(base.join(".secret.jpg").exists());
    }

    #[test]
    fn test_sort_one_routes_into_parent_subfolder() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("pic.png"), "img").unwrap();

        let result = engine(&images_move())
            .sort_one(&base.join("pic.png"), true)
            .unwrap()
            .unwrap();

        assert!(result.success);
        assert!(base.join("Images/pic.png").exists());
    }

    #[test]
    fn test_sort_one_never_moves_directories() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir(base.join("album.jpg")).unwrap();

        let result = engine(&images_move())
            .sort_one(&base.join("album.jpg"), true)
            .unwrap();

        assert!(result.is_none());
        assert!(base.join("album.jpg").is_dir());
        assert!(!base.join("Images").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_file_name_is_preserved_on_move() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let raw = OsStr::from_bytes(b"caf\xe9.jpg");
        fs::write(base.join(raw), "img").unwrap();

        let outcome = engine(&images_move()).sort_directory(base).unwrap();

        assert_eq!(outcome.files_processed, 1);
        assert!(base.join("Images").join(raw).is_file());
        assert!(!base.join(raw).exists());
        let moved: Vec<_> = fs::read_dir(base.join("Images"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(moved, vec![raw.to_os_string()]);
    }

    #[test]
    fn test_dry_run_summary_matches_live_run_on_failures() {
        let temp_dir = TempDir::new().unwrap();
        let selection = vec![temp_dir.path().join("vanished.jpg")];
        let engine = engine(&images_move());

        engine.set_test_run(true);
        let planned = engine.sort_files(&selection).unwrap();
        engine.set_test_run(false);
        let applied = engine.sort_files(&selection).unwrap();

        assert_eq!(planned.files_processed, applied.files_processed);
        assert_eq!(planned.failed_count(), 1);
        assert_eq!(applied.failed_count(), 1);
        assert_eq!(planned.summary_message(), "(Test) Processed 0 files! 1 failed.");
        assert_eq!(applied.summary_message(), "Processed 0 files! 1 failed.");
    }

    #[test]
    fn test_sort_files_uses_configured_source_dir() {
        let source = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let picked = elsewhere.path().join("pick.jpg");
        fs::write(&picked, "img").unwrap();
        let engine = engine(&images_move()).with_source_dir(source.path());

        let outcome = engine.sort_files(&[picked.clone()]).unwrap();

        assert_eq!(outcome.files_processed, 1);
        assert!(!picked.exists());
        assert!(source.path().join("Images/pick.jpg").exists());
    }

    #[test]
    fn test_sort_files_records_failures_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("ok.jpg"), "img").unwrap();
        let vanished = base.join("vanished.jpg");

        let outcome = engine(&images_move())
            .sort_files(&[vanished, base.join("ok.jpg")])
            .unwrap();

        assert_eq!(outcome.files_examined, 2);
        assert_eq!(outcome.files_processed, 1);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.results[0].file_name, "vanished.jpg");
        assert!(!outcome.results[0].success);
        assert!(base.join("Images/ok.jpg").exists());
    }

    #[test]
    fn test_directory_creation_failure_is_per_file() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        // A regular file where the destination folder should go.
        fs::write(base.join("Images"), "blocker").unwrap();
        fs::write(base.join("a.jpg"), "img").unwrap();

        let outcome = engine(&images_move()).sort_directory(base).unwrap();

        assert_eq!(outcome.files_processed, 0);
        assert_eq!(outcome.failed_count(), 1);
        assert!(base.join("a.jpg").exists());
    }

    #[test]
    fn test_replace_rules_applies_to_next_invocation() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("a.txt"), "text").unwrap();
        let engine = engine(&images_move());

        assert_eq!(engine.sort_directory(base).unwrap().files_processed, 0);

        engine.replace_rules(
            RuleTable::build(&[RoutingRule::new("Docs", [".txt"], Action::Move)]).unwrap(),
        );
        assert_eq!(engine.sort_directory(base).unwrap().files_processed, 1);
        assert!(base.join("Docs/a.txt").exists());
    }

    #[test]
    fn test_processed_by_folder() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        for name in ["a.jpg", "b.png", "c.pdf"] {
            fs::write(base.join(name), "x").unwrap();
        }
        let rules = vec![
            RoutingRule::new("Images", [".jpg", ".png"], Action::Copy),
            RoutingRule::new("Docs", [".pdf"], Action::Copy),
        ];

        let outcome = engine(&rules).sort_directory(base).unwrap();
        let counts = outcome.processed_by_folder();

        assert_eq!(counts.get("Images"), Some(&2));
        assert_eq!(counts.get("Docs"), Some(&1));
    }
}
