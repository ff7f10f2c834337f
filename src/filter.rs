//! Sample filtering by process image name and time window
//!
//! Supports:
//! - Process lists: `--processes chrome.exe,msedge.exe`
//! - Wildcard: empty list or `*` analyzes every process
//! - Inclusive time windows: `--time-start 1.5 --time-end 9`

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Process filter that determines which switch-in processes are analyzed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ProcessFilter {
    /// Lower-cased image names to include (None = all processes)
    include: Option<HashSet<String>>,
}

impl ProcessFilter {
    /// Create a filter that includes all processes
    pub fn all() -> Self {
        Self { include: None }
    }

    /// Parse a comma-separated list like "chrome.exe,dwm.exe"
    ///
    /// An empty list, or one containing `*`, means all processes.
    pub fn from_list(list: &str) -> Self {
        Self::from_names(list.split(','))
    }

    fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut processes = HashSet::new();

        for name in names {
            let name = name.as_ref().trim();
            match name {
                "" => {}
                "*" => return Self::all(),
                _ => {
                    processes.insert(name.to_ascii_lowercase());
                }
            }
        }

        if processes.is_empty() {
            Self::all()
        } else {
            Self {
                include: Some(processes),
            }
        }
    }

    /// Check if a process image should be analyzed
    pub fn matches(&self, image_name: &str) -> bool {
        match &self.include {
            None => true, // No filter = analyze all
            Some(set) => set.contains(&image_name.to_ascii_lowercase()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.include.is_none()
    }

    /// Sorted image names, or `["*"]` for the wildcard
    pub fn names(&self) -> Vec<String> {
        match &self.include {
            None => vec!["*".to_string()],
            Some(set) => {
                let mut names: Vec<String> = set.iter().cloned().collect();
                names.sort();
                names
            }
        }
    }
}

impl From<Vec<String>> for ProcessFilter {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<ProcessFilter> for Vec<String> {
    fn from(filter: ProcessFilter) -> Self {
        if filter.is_wildcard() {
            Vec::new()
        } else {
            filter.names()
        }
    }
}

/// Inclusive time window in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub start: f64,
    /// Open-ended when `None`
    #[serde(default)]
    pub end: Option<f64>,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
        }
    }
}

impl TimeWindow {
    pub fn new(start: f64, end: Option<f64>) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp lies inside the window (both bounds inclusive)
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && self.end.map_or(true, |end| timestamp <= end)
    }

    /// Window length, when the end is bounded
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }
}
