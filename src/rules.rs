//! Extension routing rules.
//!
//! A [`RuleTable`] is the single source of truth for which destination folder
//! and [`Action`] a file extension maps to. Tables are built in one shot from an
//! ordered list of [`RoutingRule`]s and never mutated afterwards; a changed
//! configuration produces a new table.
//!
//! # Examples
//!
//! ```
//! use filesorter::rules::{Action, RoutingRule, RuleTable};
//!
//! let rules = vec![RoutingRule::new("Images", [".jpg", "PNG"], Action::Move)];
//! let table = RuleTable::build(&rules).unwrap();
//!
//! let route = table.lookup(".png").unwrap();
//! assert_eq!(route.folder, "Images");
//! assert_eq!(route.action, Action::Move);
//! assert!(table.lookup(".txt").is_none());
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Extensions accepted in routing rules.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    ".txt", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".jpg", ".jpeg", ".png",
    ".gif", ".bmp", ".tiff", ".mp3", ".wav", ".ogg", ".flac", ".mp4", ".avi", ".mkv", ".mov",
    ".zip", ".rar", ".7z", ".tar", ".gz", ".exe", ".msi", ".bat", ".py", ".js", ".html", ".css",
    ".json", ".xml", ".csv", ".tsv", ".md", ".rtf", ".svg", ".log",
];

static EXTENSION_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.[\p{Alphabetic}\p{N}_]+$").expect("extension syntax regex is valid")
});

/// Errors raised while building a [`RuleTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The extension contains characters outside letters, digits and underscore.
    #[error(
        "Invalid file extension '{extension}': extensions must start with a dot and contain only letters, digits or underscores"
    )]
    MalformedExtension { extension: String },

    /// The extension is well-formed but not in [`KNOWN_EXTENSIONS`].
    #[error("Extension '{extension}' is not a recognized file extension")]
    UnknownExtension { extension: String },

    /// The destination folder name is empty or escapes the source directory.
    #[error("Invalid destination folder '{folder}'")]
    InvalidFolder { folder: String },

    /// An action name in the configuration could not be parsed.
    #[error("Unknown action '{0}': expected move, copy, rename or delete")]
    UnknownAction(String),
}

/// What to do with a file whose extension matched a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Action {
    Move,
    Copy,
    Rename,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Move, Action::Copy, Action::Rename, Action::Delete];

    /// Whether this action places a file into a destination folder.
    pub fn needs_destination(&self) -> bool {
        !matches!(self, Action::Delete)
    }

    /// Past-tense verb used in summaries and log lines.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Action::Move => "moved",
            Action::Copy => "copied",
            Action::Rename => "renamed",
            Action::Delete => "deleted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Move => "Move",
            Action::Copy => "Copy",
            Action::Rename => "Rename",
            Action::Delete => "Delete",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = RuleError;

    /// Parses an action name, case-insensitively.
    ///
    /// The localized labels stored by older configuration files are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "move" | "переместить" => Ok(Action::Move),
            "copy" | "копировать" => Ok(Action::Copy),
            "rename" | "переименовать" => Ok(Action::Rename),
            "delete" | "удалить" => Ok(Action::Delete),
            _ => Err(RuleError::UnknownAction(s.to_string())),
        }
    }
}

impl TryFrom<String> for Action {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A destination folder, the extensions routed to it, and the action applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub folder: String,
    pub extensions: Vec<String>,
    pub action: Action,
}

impl RoutingRule {
    pub fn new<I, S>(folder: impl Into<String>, extensions: I, action: Action) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            folder: folder.into(),
            extensions: extensions.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

/// Where a matched file goes and what happens to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub folder: String,
    pub action: Action,
}

/// Normalizes a raw extension: trims, lowercases and enforces the leading dot.
///
/// Returns [`RuleError::MalformedExtension`] when the body is empty or contains
/// anything other than letters, digits or underscores, and
/// [`RuleError::UnknownExtension`] when it is not in [`KNOWN_EXTENSIONS`].
pub fn normalize_extension(raw: &str) -> Result<String, RuleError> {
    let mut ext = raw.trim().to_lowercase();
    if !ext.starts_with('.') {
        ext.insert(0, '.');
    }

    if !EXTENSION_SYNTAX.is_match(&ext) {
        return Err(RuleError::MalformedExtension { extension: ext });
    }
    if !KNOWN_EXTENSIONS.contains(&ext.as_str()) {
        return Err(RuleError::UnknownExtension { extension: ext });
    }

    Ok(ext)
}

fn validate_folder(folder: &str) -> Result<(), RuleError> {
    let trimmed = folder.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return Err(RuleError::InvalidFolder {
            folder: folder.to_string(),
        });
    }
    Ok(())
}

/// Read-only extension → [`Route`] lookup.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    routes: HashMap<String, Route>,
}

impl RuleTable {
    /// Builds a table from rules in declaration order.
    ///
    /// When several rules declare the same extension, the last one wins. Every
    /// extension is validated before any entry is inserted, so a single bad
    /// extension rejects the whole build.
    pub fn build(rules: &[RoutingRule]) -> Result<Self, RuleError> {
        let mut validated = Vec::new();
        for rule in rules {
            validate_folder(&rule.folder)?;
            for raw in &rule.extensions {
                let ext = normalize_extension(raw)?;
                validated.push((ext, rule));
            }
        }

        let mut routes = HashMap::with_capacity(validated.len());
        for (ext, rule) in validated {
            routes.insert(
                ext,
                Route {
                    folder: rule.folder.trim().to_string(),
                    action: rule.action,
                },
            );
        }

        Ok(Self { routes })
    }

    /// Looks up the route for an extension, case-insensitively.
    ///
    /// The leading dot is optional.
    pub fn lookup(&self, extension: &str) -> Option<&Route> {
        let mut key = extension.to_lowercase();
        if !key.starts_with('.') {
            key.insert(0, '.');
        }
        self.routes.get(&key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// All entries sorted by extension.
    pub fn entries(&self) -> Vec<(&str, &Route)> {
        let mut entries: Vec<_> = self
            .routes
            .iter()
            .map(|(ext, route)| (ext.as_str(), route))
            .collect();
        entries.sort_by_key(|&(ext, _)| ext);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_adds_dot_and_lowercases() {
        assert_eq!(normalize_extension("JPG").unwrap(), ".jpg");
        assert_eq!(normalize_extension("  .Png ").unwrap(), ".png");
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert!(matches!(
            normalize_extension(".t-x"),
            Err(RuleError::MalformedExtension { .. })
        ));
        assert!(matches!(
            normalize_extension("."),
            Err(RuleError::MalformedExtension { .. })
        ));
        assert!(matches!(
            normalize_extension(".tar.gz"),
            Err(RuleError::MalformedExtension { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_unknown() {
        assert_eq!(
            normalize_extension(".xyz"),
            Err(RuleError::UnknownExtension {
                extension: ".xyz".to_string()
            })
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let rules = vec![RoutingRule::new("Docs", [".pdf"], Action::Copy)];
        let table = RuleTable::build(&rules).unwrap();

        assert_eq!(table.lookup(".PDF").unwrap().folder, "Docs");
        assert_eq!(table.lookup("pdf").unwrap().action, Action::Copy);
    }

    #[test]
    fn test_build_is_atomic() {
        let rules = vec![
            RoutingRule::new("Images", [".jpg"], Action::Move),
            RoutingRule::new("Broken", [".png", ".nope"], Action::Move),
        ];

        let result = RuleTable::build(&rules);
        assert!(matches!(result, Err(RuleError::UnknownExtension { .. })));
    }

    #[test]
    fn test_invalid_folder_rejected() {
        for folder in ["", "  ", "..", "a/b"] {
            let rules = vec![RoutingRule::new(folder, [".jpg"], Action::Move)];
            assert!(matches!(
                RuleTable::build(&rules),
                Err(RuleError::InvalidFolder { .. })
            ));
        }
    }

    #[test]
    fn test_duplicate_extension_last_rule_wins() {
        let rules = vec![
            RoutingRule::new("First", [".txt"], Action::Move),
            RoutingRule::new("Second", ["TXT"], Action::Delete),
        ];
        let table = RuleTable::build(&rules).unwrap();

        let route = table.lookup(".txt").unwrap();
        assert_eq!(route.folder, "Second");
        assert_eq!(route.action, Action::Delete);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_action_parse_accepts_legacy_labels() {
        assert_eq!("MOVE".parse::<Action>().unwrap(), Action::Move);
        assert_eq!("Копировать".parse::<Action>().unwrap(), Action::Copy);
        assert_eq!("Удалить".parse::<Action>().unwrap(), Action::Delete);
        assert!("shred".parse::<Action>().is_err());
    }

    fn rule_strategy() -> impl Strategy<Value = RoutingRule> {
        (
            prop::sample::select(vec!["A", "B", "C", "D"]),
            prop::collection::vec(prop::sample::select(KNOWN_EXTENSIONS.to_vec()), 1..5),
            prop::sample::select(Action::ALL.to_vec()),
        )
            .prop_map(|(folder, exts, action)| RoutingRule::new(folder, exts, action))
    }

    proptest! {
        #[test]
        fn prop_lookup_returns_last_declaring_rule(rules in prop::collection::vec(rule_strategy(), 1..8)) {
            let table = RuleTable::build(&rules).unwrap();

            for ext in KNOWN_EXTENSIONS {
                let expected = rules
                    .iter()
                    .rev()
                    .find(|rule| rule.extensions.iter().any(|e| e == ext));
                match expected {
                    Some(rule) => {
                        let route = table.lookup(ext).unwrap();
                        prop_assert_eq!(&route.folder, &rule.folder);
                        prop_assert_eq!(route.action, rule.action);
                    }
                    None => prop_assert!(table.lookup(ext).is_none()),
                }
            }
        }
    }
}
