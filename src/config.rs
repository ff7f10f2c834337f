//! Analysis configuration
//!
//! Everything the analyzer core reads is collected here. The CLI fills it in
//! from flags, optionally on top of a TOML file.
//!
//! # Example
//! ```
//! use idlewake::config::AnalysisConfig;
//!
//! let config = AnalysisConfig::default();
//! assert!(config.process_filter.is_wildcard());
//! assert!(!config.include_inlined);
//! ```

use crate::filter::{ProcessFilter, TimeWindow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid source prefix pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Time window start {start} is after end {end}")]
    InvertedWindow { start: f64, end: f64 },

    #[error("Time window bound {0} is not a finite number of seconds")]
    NonFiniteWindow(f64),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which labels are attached to exported samples as pseudo-frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOptions {
    /// Append the process id to process labels
    pub process_ids: bool,
    /// Append the thread id to thread labels
    pub thread_ids: bool,
    /// Attach a thread label below the process label
    pub thread_names: bool,
    /// Split chrome.exe process labels by process type
    pub chrome_types: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            process_ids: false,
            thread_ids: false,
            thread_names: true,
            chrome_types: false,
        }
    }
}

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples outside this window are ignored
    pub time_window: TimeWindow,

    /// Switch-in processes to analyze; empty means all
    pub process_filter: ProcessFilter,

    /// Emit inlined-function lines on exported locations
    ///
    /// Roughly doubles the line count of the profile, so it is off by default.
    pub include_inlined: bool,

    /// Pattern stripped from the start of source file paths
    ///
    /// Applied after backslashes are turned into forward slashes, e.g.
    /// `.*/src/` turns `c:/b/s/w/ir/cache/builder/src/base/foo.cc` into
    /// `base/foo.cc`.
    pub source_prefix_pattern: Option<String>,

    pub labels: LabelOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_window: TimeWindow::default(),
            process_filter: ProcessFilter::all(),
            include_inlined: false,
            source_prefix_pattern: None,
            labels: LabelOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the time window and compile the source prefix pattern
    pub fn validate(&self) -> Result<()> {
        // NaN compares false against everything and would exclude every sample
        let bounds = std::iter::once(self.time_window.start).chain(self.time_window.end);
        for bound in bounds {
            if !bound.is_finite() {
                return Err(ConfigError::NonFiniteWindow(bound));
            }
        }
        if let Some(end) = self.time_window.end {
            if self.time_window.start > end {
                return Err(ConfigError::InvertedWindow {
                    start: self.time_window.start,
                    end,
                });
            }
        }
        self.source_prefix_regex()?;
        Ok(())
    }

    /// The source prefix pattern anchored at the start of the path
    pub fn source_prefix_regex(&self) -> Result<Option<Regex>> {
        match &self.source_prefix_pattern {
            Some(pattern) if !pattern.is_empty() => {
                Ok(Some(Regex::new(&format!("^(?:{})", pattern))?))
            }
            _ => Ok(None),
        }
    }
}
