//! Routing configuration.
//!
//! This module loads the user's routing configuration from TOML or JSON and
//! normalizes it into the strict shapes the engine consumes: an ordered list of
//! [`RoutingRule`]s, an [`ExclusionFilter`] and the watch settings.
//!
//! # Configuration File Format
//!
//! ```toml
//! source_dir = "/home/me/Downloads"
//!
//! [target_dirs.Images]
//! exts = [".jpg", ".png", ".gif"]
//! action = "move"
//!
//! [target_dirs.Logs]
//! exts = [".log"]
//! action = "delete"
//!
//! [exclude]
//! patterns = ["*.part"]
//! regex = []
//!
//! [watch]
//! debounce_ms = 500
//! ```
//!
//! A `target_dirs` entry may also be a bare list of extensions, in which case
//! the action is `move`. JSON files use the same structure.

use crate::exclusion::{ExclusionError, ExclusionFilter};
use crate::rules::{Action, RoutingRule, RuleError, RuleTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid configuration in {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("IO error on configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not serialize configuration: {0}")]
    Serialize(String),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Exclusion(#[from] ExclusionError),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Directory sorted by default and whose subfolders receive files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Destination folder → extensions and action, in declaration order.
    #[serde(default)]
    pub target_dirs: IndexMap<String, TargetSpec>,

    #[serde(default)]
    pub exclude: ExcludeRules,

    #[serde(default)]
    pub watch: WatchSettings,
}

/// One `target_dirs` entry, in either of its accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Detailed {
        exts: Vec<String>,
        #[serde(default = "default_action")]
        action: Action,
    },
    Extensions(Vec<String>),
}

fn default_action() -> Action {
    Action::Move
}

impl TargetSpec {
    fn extensions(&self) -> &[String] {
        match self {
            TargetSpec::Detailed { exts, .. } => exts,
            TargetSpec::Extensions(exts) => exts,
        }
    }

    fn action(&self) -> Action {
        match self {
            TargetSpec::Detailed { action, .. } => *action,
            TargetSpec::Extensions(_) => default_action(),
        }
    }
}

/// Extra exclusion patterns on top of the built-in hidden-file rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Glob patterns matched against file names (e.g. "*.part").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regex patterns matched against file names.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SorterConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. `.filesorter.toml` in the current directory
    /// 3. `config.json` in the current directory
    /// 4. `~/.config/filesorter/config.toml`
    /// 5. The built-in default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly provided file cannot be read or parsed,
    /// or if a discovered file is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        for local in [".filesorter.toml", "config.json"] {
            let local = PathBuf::from(local);
            if local.exists() {
                return Self::load_from_file(&local);
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("filesorter")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file. `.json` files are parsed as
    /// JSON, anything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let invalid = |reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        let config = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| invalid(e.to_string()))?
        };

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write this configuration to `path`, as JSON or TOML depending on the extension.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        };

        fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Configured source directory, treating an empty path as unset.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Rules in declaration order. Blank extension entries are dropped.
    pub fn routing_rules(&self) -> Vec<RoutingRule> {
        self.target_dirs
            .iter()
            .map(|(folder, spec)| {
                RoutingRule::new(
                    folder.clone(),
                    spec.extensions()
                        .iter()
                        .map(|ext| ext.trim())
                        .filter(|ext| !ext.is_empty()),
                    spec.action(),
                )
            })
            .collect()
    }

    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        Ok(RuleTable::build(&self.routing_rules())?)
    }

    pub fn exclusion_filter(&self) -> Result<ExclusionFilter, ConfigError> {
        let mut filter = ExclusionFilter::new();
        for pattern in &self.exclude.patterns {
            filter.add_glob(pattern)?;
        }
        for pattern in &self.exclude.regex {
            filter.add_regex(pattern)?;
        }
        Ok(filter)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}

impl Default for SorterConfig {
    fn default() -> Self {
        let mut target_dirs = IndexMap::new();
        for (folder, exts) in [
            ("Images", &[".jpg", ".png", ".gif"][..]),
            ("Documents", &[".pdf", ".docx", ".txt"][..]),
            ("Music", &[".mp3", ".wav"][..]),
        ] {
            target_dirs.insert(
                folder.to_string(),
                TargetSpec::Detailed {
                    exts: exts.iter().map(|e| e.to_string()).collect(),
                    action: Action::Move,
                },
            );
        }

        Self {
            source_dir: None,
            target_dirs,
            exclude: ExcludeRules::default(),
            watch: WatchSettings::default(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
