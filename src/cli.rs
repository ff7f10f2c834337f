//! CLI argument parsing for idlewake

use crate::config::{AnalysisConfig, Result};
use crate::filter::{ProcessFilter, TimeWindow};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text tables (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "idlewake")]
#[command(version)]
#[command(about = "Idle-wakeup analysis of context-switch traces with pprof export", long_about = None)]
pub struct Cli {
    /// JSON-lines file of decoded context-switch samples
    #[arg(value_name = "SAMPLES")]
    pub samples: PathBuf,

    /// TOML configuration file; flags override its values
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore samples before this time (seconds, inclusive)
    #[arg(long = "time-start", value_name = "SECONDS")]
    pub time_start: Option<f64>,

    /// Ignore samples after this time (seconds, inclusive)
    #[arg(long = "time-end", value_name = "SECONDS")]
    pub time_end: Option<f64>,

    /// Comma-separated process image names to analyze (e.g., -p chrome.exe,dwm.exe; * for all)
    #[arg(short = 'p', long = "processes", value_name = "LIST")]
    pub processes: Option<String>,

    /// Attach inlined-function lines to exported locations
    #[arg(long = "inlined")]
    pub inlined: bool,

    /// Regex stripped from the start of source file paths
    #[arg(long = "strip-source-prefix", value_name = "REGEX")]
    pub strip_source_prefix: Option<String>,

    /// Append process ids to process labels
    #[arg(long = "label-pids")]
    pub label_pids: bool,

    /// Append thread ids to thread labels
    #[arg(long = "label-tids")]
    pub label_tids: bool,

    /// Do not attach thread labels to exported samples
    #[arg(long = "no-thread-labels")]
    pub no_thread_labels: bool,

    /// Split chrome.exe labels by Chrome process type
    #[arg(long = "chrome-types")]
    pub chrome_types: bool,

    /// Report format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write a gzip-compressed pprof profile to PATH
    #[arg(short = 'o', long = "profile", value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Number of threads and stacks shown in the report
    #[arg(long = "top", value_name = "N", default_value = "20")]
    pub top: usize,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Build the analysis configuration from the config file and flags
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_toml_file(path)?,
            None => AnalysisConfig::default(),
        };

        if self.time_start.is_some() || self.time_end.is_some() {
            config.time_window = TimeWindow::new(
                self.time_start.unwrap_or(config.time_window.start),
                self.time_end.or(config.time_window.end),
            );
        }
        if let Some(processes) = &self.processes {
            config.process_filter = ProcessFilter::from_list(processes);
        }
        if self.inlined {
            config.include_inlined = true;
        }
        if let Some(pattern) = &self.strip_source_prefix {
            config.source_prefix_pattern = Some(pattern.clone());
        }
        if self.label_pids {
            config.labels.process_ids = true;
        }
        if self.label_tids {
            config.labels.thread_ids = true;
        }
        if self.no_thread_labels {
            config.labels.thread_names = false;
        }
        if self.chrome_types {
            config.labels.chrome_types = true;
        }

        config.validate()?;
        Ok(config)
    }
}
