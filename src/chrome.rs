//! Chrome process classification from command lines
//!
//! Chrome runs every process from the same `chrome.exe` image, so the image
//! name alone says nothing. The `--type=` switch (absent for the browser
//! process) and `--utility-sub-type=` tell them apart.

use serde::{Deserialize, Serialize};
use std::fmt;

const CHROME_IMAGE: &str = "chrome.exe";

/// Kind of Chrome process, or `NotChrome`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromeProcessType {
    NotChrome,
    Browser,
    Renderer,
    Gpu,
    Crashpad,
    /// Utility process, with its sub-type when one was given
    Utility(Option<String>),
    Other(String),
}

impl ChromeProcessType {
    /// Classify a process from its image name and command line
    pub fn classify(image_name: &str, command_line: Option<&str>) -> Self {
        if !image_name.eq_ignore_ascii_case(CHROME_IMAGE) {
            return ChromeProcessType::NotChrome;
        }

        let command_line = command_line.unwrap_or("");
        match switch_value(command_line, "--type=") {
            None => ChromeProcessType::Browser,
            Some("renderer") => ChromeProcessType::Renderer,
            Some("gpu-process") => ChromeProcessType::Gpu,
            Some("crashpad-handler") => ChromeProcessType::Crashpad,
            Some("utility") => ChromeProcessType::Utility(
                switch_value(command_line, "--utility-sub-type=").map(short_sub_type),
            ),
            Some(other) => ChromeProcessType::Other(other.to_string()),
        }
    }

    pub fn is_chrome(&self) -> bool {
        !matches!(self, ChromeProcessType::NotChrome)
    }
}

impl fmt::Display for ChromeProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChromeProcessType::NotChrome => f.write_str(""),
            ChromeProcessType::Browser => f.write_str("browser"),
            ChromeProcessType::Renderer => f.write_str("renderer"),
            ChromeProcessType::Gpu => f.write_str("gpu"),
            ChromeProcessType::Crashpad => f.write_str("crashpad"),
            ChromeProcessType::Utility(None) => f.write_str("utility"),
            ChromeProcessType::Utility(Some(sub)) => write!(f, "utility-{}", sub),
            ChromeProcessType::Other(kind) => f.write_str(kind),
        }
    }
}

/// Value of a `--name=value` switch, quotes stripped
fn switch_value<'a>(command_line: &'a str, switch: &str) -> Option<&'a str> {
    command_line
        .split_whitespace()
        .find_map(|arg| arg.trim_matches('"').strip_prefix(switch))
        .map(|value| value.trim_matches('"'))
}

/// `network.mojom.NetworkService` -> `network`
fn short_sub_type(sub_type: &str) -> String {
    sub_type
        .split('.')
        .next()
        .unwrap_or(sub_type)
        .to_string()
}
