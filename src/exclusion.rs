//! File name exclusion.
//!
//! An [`ExclusionFilter`] holds an ordered, append-only list of patterns. A file
//! whose name matches any of them is never classified or touched. The built-in
//! `.*` glob keeps hidden files out of every sort.

use glob::Pattern;
use regex::Regex;
use thiserror::Error;

/// Glob that excludes dotfiles.
pub const HIDDEN_FILES_PATTERN: &str = ".*";

/// Errors raised when adding an exclusion pattern.
#[derive(Debug, Clone, Error)]
pub enum ExclusionError {
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

#[derive(Debug, Clone)]
enum ExclusionPattern {
    Glob(Pattern),
    Regex(Regex),
}

impl ExclusionPattern {
    fn matches(&self, file_name: &str) -> bool {
        match self {
            ExclusionPattern::Glob(pattern) => pattern.matches(file_name),
            ExclusionPattern::Regex(regex) => regex.is_match(file_name),
        }
    }
}

/// Ordered set of file name exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionFilter {
    /// Creates a filter holding only the built-in hidden-file pattern.
    pub fn new() -> Self {
        let hidden = Pattern::new(HIDDEN_FILES_PATTERN).expect("built-in glob is valid");
        Self {
            patterns: vec![ExclusionPattern::Glob(hidden)],
        }
    }

    /// Appends a glob pattern matched against the bare file name.
    pub fn add_glob(&mut self, pattern: &str) -> Result<(), ExclusionError> {
        let compiled = Pattern::new(pattern).map_err(|e| ExclusionError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;
        self.patterns.push(ExclusionPattern::Glob(compiled));
        Ok(())
    }

    /// Appends a regex pattern matched against the bare file name.
    pub fn add_regex(&mut self, pattern: &str) -> Result<(), ExclusionError> {
        let compiled = Regex::new(pattern).map_err(|e| ExclusionError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.push(ExclusionPattern::Regex(compiled));
        Ok(())
    }

    /// Returns true as soon as one pattern matches, in insertion order.
    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(file_name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::new()
    }
}
