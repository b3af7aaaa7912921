//! filesorter - route files into subfolders by extension
//!
//! This library classifies files by extension against configured routing
//! rules and moves, copies, renames or deletes them accordingly. Sorting can
//! run once over a directory, over an explicit selection of files, or
//! continuously as new files appear. A test-run mode reports what would happen
//! without touching the filesystem.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod exclusion;
pub mod executor;
pub mod logging;
pub mod notifier;
pub mod output;
pub mod rules;
pub mod watch;

pub use config::{ConfigError, SorterConfig};
pub use dispatch::{DispatchEngine, DispatchError, FileResult, SortOutcome};
pub use exclusion::ExclusionFilter;
pub use executor::{ActionExecutor, ExecutionResult};
pub use notifier::{Notifier, NullNotifier, SortEvent};
pub use rules::{Action, RoutingRule, RuleError, RuleTable};
pub use watch::{AutoSorter, WatchError, WatchSession, WatchState};

pub use cli::{Cli, run_cli};
