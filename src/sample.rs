//! Context-switch sample model
//!
//! These are the already-decoded records handed to the analyzer by the trace
//! provider. Nothing here parses raw trace bytes or resolves symbols; every
//! field the provider could not fill is an `Option`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Thread that was switched in by a context switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchInThread {
    pub thread_id: u32,
    pub process_id: u32,
    /// Process image name (e.g., "chrome.exe")
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

/// A source line inlined into a resolved frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InlinedFrame {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// A frame the symbol provider resolved to a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedFrame {
    /// Containing image; `None` when the provider lost track of the module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub function: String,
    #[serde(default)]
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Inlined callees, innermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inlined: Vec<InlinedFrame>,
}

/// A raw frame with no symbol information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnresolvedFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub address: u64,
}

/// One frame of a call stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StackFrame {
    Resolved(ResolvedFrame),
    Unresolved(UnresolvedFrame),
}

impl StackFrame {
    /// Convenience constructor for a resolved frame without source info
    pub fn resolved(image: &str, function: &str, address: u64) -> Self {
        StackFrame::Resolved(ResolvedFrame {
            image: Some(image.to_string()),
            function: function.to_string(),
            address,
            source_file: None,
            line: None,
            inlined: Vec::new(),
        })
    }

    /// Convenience constructor for an unresolved frame
    pub fn unresolved(image: Option<&str>, address: u64) -> Self {
        StackFrame::Unresolved(UnresolvedFrame {
            image: image.map(str::to_string),
            address,
        })
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            StackFrame::Resolved(frame) => frame.image.as_deref(),
            StackFrame::Unresolved(frame) => frame.image.as_deref(),
        }
    }

    pub fn function(&self) -> Option<&str> {
        match self {
            StackFrame::Resolved(frame) => Some(frame.function.as_str()),
            StackFrame::Unresolved(_) => None,
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            StackFrame::Resolved(frame) => frame.address,
            StackFrame::Unresolved(frame) => frame.address,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self.image().unwrap_or("?");
        match self {
            StackFrame::Resolved(frame) => write!(f, "{}!{}", image, frame.function),
            StackFrame::Unresolved(frame) => write!(f, "{}!0x{:x}", image, frame.address),
        }
    }
}

/// A single decoded context switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitchSample {
    /// Seconds since trace start
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_in: Option<SwitchInThread>,
    /// Image name of the process that was switched out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_out_image: Option<String>,
    /// Processor C-state before the switch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_c_state: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waker_image: Option<String>,
    #[serde(default)]
    pub waker_in_dpc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub woken_stack: Option<Vec<StackFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waker_stack: Option<Vec<StackFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_us: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_time_us: Option<f64>,
}

impl ContextSwitchSample {
    /// Create a sample with only the fields every switch carries
    pub fn new(timestamp: f64, switch_in: SwitchInThread, switch_out_image: &str) -> Self {
        Self {
            timestamp,
            switch_in: Some(switch_in),
            switch_out_image: Some(switch_out_image.to_string()),
            previous_c_state: None,
            waker_image: None,
            waker_in_dpc: false,
            woken_stack: None,
            waker_stack: None,
            wait_time_us: None,
            ready_time_us: None,
        }
    }

    pub fn with_waker(mut self, waker_image: &str, in_dpc: bool) -> Self {
        self.waker_image = Some(waker_image.to_string());
        self.waker_in_dpc = in_dpc;
        self
    }

    pub fn with_c_state(mut self, c_state: u8) -> Self {
        self.previous_c_state = Some(c_state);
        self
    }

    pub fn with_woken_stack(mut self, frames: Vec<StackFrame>) -> Self {
        self.woken_stack = Some(frames);
        self
    }

    pub fn with_waker_stack(mut self, frames: Vec<StackFrame>) -> Self {
        self.waker_stack = Some(frames);
        self
    }
}
