//! JSON-lines sample input
//!
//! One `ContextSwitchSample` object per line. Blank lines and `#` comments
//! are ignored so exported fixtures can be annotated by hand.

use crate::sample::ContextSwitchSample;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading samples
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read samples: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid sample on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for input operations
pub type Result<T> = std::result::Result<T, InputError>;

/// Parse one input line; `Ok(None)` for blank and comment lines
pub fn parse_sample_line(line: &str) -> serde_json::Result<Option<ContextSwitchSample>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Iterator over the samples of a JSON-lines stream
pub struct SampleReader<R> {
    lines: io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> SampleReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl SampleReader<BufReader<File>> {
    /// Open a sample file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| InputError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for SampleReader<R> {
    type Item = Result<ContextSwitchSample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;

            match parse_sample_line(&line) {
                Ok(Some(sample)) => return Some(Ok(sample)),
                Ok(None) => continue,
                Err(source) => {
                    return Some(Err(InputError::Parse {
                        line: self.line_number,
                        source,
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"timestamp": 0.5, "switch_in": {"thread_id": 1, "process_id": 2, "image_name": "a.exe"}, "switch_out_image": "Idle"}"#;

    #[test]
    fn test_reads_samples_and_skips_comments() {
        let input = format!("# header\n\n{}\n{}\n", SAMPLE, SAMPLE);
        let samples: Vec<_> = SampleReader::new(input.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, 0.5);
    }

    #[test]
    fn test_parse_error_names_line() {
        let input = format!("{}\n# ok\n{{not json\n", SAMPLE);
        let mut reader = SampleReader::new(input.as_bytes());
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, InputError::Parse { line: 3, .. }));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_sample_line() {
        assert!(parse_sample_line("   ").unwrap().is_none());
        assert!(parse_sample_line("# x").unwrap().is_none());
        assert!(parse_sample_line(SAMPLE).unwrap().is_some());
        assert!(parse_sample_line("[]").is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let err = SampleReader::open(Path::new("/nonexistent/samples.jsonl"))
            .err()
            .unwrap();
        assert!(matches!(err, InputError::Open { .. }));
    }
}
