//! Auto-sort: dispatch files as they appear in a source directory.
//!
//! A [`WatchSession`] subscribes to creation events for one directory
//! (non-recursively), sorts what is already there, and hands every newly
//! created file to [`DispatchEngine::sort_one`] once it has been quiet for the
//! debounce interval. The session owns its worker thread; stopping it blocks
//! until the worker has exited, after which no further dispatch happens.
//!
//! [`AutoSorter`] is the on/off switch around a session and guarantees that at
//! most one is running.

use crate::dispatch::{DispatchEngine, DispatchError, SortOutcome};
use crate::notifier::{Notifier, SortEvent};
use indexmap::IndexMap;
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Quiet period before a newly created file is sorted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Errors that prevent auto-sort from starting.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Source(#[from] DispatchError),

    #[error("Failed to watch {}: {source}", .path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to start watch worker: {0}")]
    Worker(#[source] io::Error),
}

/// Lifecycle of the auto-sort switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Starting,
    Running,
}

enum WorkerMessage {
    Fs(notify::Result<Event>),
    Stop,
}

/// A running subscription on one source directory.
pub struct WatchSession {
    source_dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    control: Sender<WorkerMessage>,
    worker: Option<JoinHandle<()>>,
    initial_outcome: SortOutcome,
}

impl WatchSession {
    /// Subscribes to `source_dir`, sorts its current contents, then starts the worker.
    ///
    /// The subscription is made before the initial pass so files created
    /// during it are not missed; a file the pass already moved is simply gone
    /// by the time its event is handled.
    pub fn start(
        engine: Arc<DispatchEngine>,
        source_dir: &Path,
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        let source_dir =
            fs::canonicalize(source_dir).map_err(|e| DispatchError::SourceUnavailable {
                path: source_dir.to_path_buf(),
                source: e,
            })?;

        let (tx, rx) = mpsc::channel();
        let event_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(WorkerMessage::Fs(res));
        })
        .map_err(|e| WatchError::Subscribe {
            path: source_dir.clone(),
            source: e,
        })?;
        watcher
            .watch(&source_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Subscribe {
                path: source_dir.clone(),
                source: e,
            })?;

        let initial_outcome = engine.sort_directory(&source_dir)?;

        let worker_source = source_dir.clone();
        let worker = thread::Builder::new()
            .name("filesorter-watch".to_string())
            .spawn(move || run_worker(&engine, &worker_source, &rx, debounce))
            .map_err(WatchError::Worker)?;

        tracing::info!(source = %source_dir.display(), ?debounce, "Auto-sort running");

        Ok(Self {
            source_dir,
            watcher: Some(watcher),
            control: tx,
            worker: Some(worker),
            initial_outcome,
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Result of the bulk pass made while starting.
    pub fn initial_outcome(&self) -> &SortOutcome {
        &self.initial_outcome
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Unsubscribes and waits for the worker to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // Dropping the watcher releases the OS subscription.
        self.watcher.take();
        let _ = self.control.send(WorkerMessage::Stop);
        if worker.join().is_err() {
            tracing::error!(source = %self.source_dir.display(), "Watch worker panicked");
        }
        tracing::info!(source = %self.source_dir.display(), "Auto-sort stopped");
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    engine: &DispatchEngine,
    source_dir: &Path,
    rx: &Receiver<WorkerMessage>,
    debounce: Duration,
) {
    let mut pending: IndexMap<PathBuf, Instant> = IndexMap::new();

    loop {
        let now = Instant::now();
        let wait = pending
            .values()
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(WorkerMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(WorkerMessage::Fs(Ok(event))) => {
                for path in created_files(&event, source_dir) {
                    tracing::debug!(path = %path.display(), "Creation event");
                    pending.insert(path.clone(), Instant::now() + debounce);
                }
            }
            Ok(WorkerMessage::Fs(Err(e))) => {
                tracing::warn!(error = %e, "Watcher error");
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|&(_, deadline)| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in due {
            pending.shift_remove(&path);
            sort_created(engine, &path);
        }
    }

    if !pending.is_empty() {
        tracing::debug!(dropped = pending.len(), "Discarding pending events on stop");
    }
}

fn sort_created(engine: &DispatchEngine, path: &Path) {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "Created path is no longer a file");
        return;
    }
    if let Err(e) = engine.sort_one(path, true) {
        tracing::error!(path = %path.display(), error = %e, "Auto-sort failed");
    }
}

/// Paths of file-creation events located directly in `source_dir`.
fn created_files<'a>(
    event: &'a Event,
    source_dir: &'a Path,
) -> impl Iterator<Item = &'a PathBuf> {
    let file_created = matches!(
        event.kind,
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other)
    );
    event
        .paths
        .iter()
        .filter(move |path| file_created && is_direct_child(source_dir, path))
}

fn is_direct_child(source_dir: &Path, path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    if parent == source_dir {
        return true;
    }
    fs::canonicalize(parent).is_ok_and(|parent| parent == source_dir)
}

/// Switch that keeps at most one [`WatchSession`] alive.
pub struct AutoSorter {
    engine: Arc<DispatchEngine>,
    notifier: Arc<dyn Notifier>,
    debounce: Duration,
    session: Mutex<Option<WatchSession>>,
    state: Mutex<WatchState>,
}

impl AutoSorter {
    pub fn new(engine: Arc<DispatchEngine>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            engine,
            notifier,
            debounce: DEFAULT_DEBOUNCE,
            session: Mutex::new(None),
            state: Mutex::new(WatchState::Stopped),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Starts auto-sort on `source_dir`, stopping any running session first.
    ///
    /// Returns the outcome of the initial bulk pass. On failure the switch is
    /// left stopped.
    pub fn enable(&self, source_dir: &Path) -> Result<SortOutcome, WatchError> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = session.take() {
            previous.stop();
        }

        self.set_state(WatchState::Starting);
        match WatchSession::start(self.engine.clone(), source_dir, self.debounce) {
            Ok(started) => {
                let outcome = started.initial_outcome().clone();
                self.notifier.notify(&SortEvent::AutoSortEnabled {
                    source_dir: started.source_dir().to_path_buf(),
                });
                *session = Some(started);
                self.set_state(WatchState::Running);
                Ok(outcome)
            }
            Err(e) => {
                self.set_state(WatchState::Stopped);
                tracing::error!(
                    source = %source_dir.display(),
                    error = %e,
                    "Could not start auto-sort"
                );
                Err(e)
            }
        }
    }

    /// Stops the running session, if any. Returns whether one was running.
    pub fn disable(&self) -> bool {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(running) = session.take() else {
            return false;
        };
        running.stop();
        self.set_state(WatchState::Stopped);
        self.notifier.notify(&SortEvent::AutoSortDisabled);
        true
    }

    /// Flips auto-sort. Returns `true` when it ends up running.
    pub fn toggle(&self, source_dir: &Path) -> Result<bool, WatchError> {
        if self.state() == WatchState::Running {
            self.disable();
            Ok(false)
        } else {
            self.enable(source_dir).map(|_| true)
        }
    }
}

impl Drop for AutoSorter {
    fn drop(&mut self) {
        self.disable();
    }
}
