//! Idle-wakeup classification
//!
//! Decides, one sample at a time, whether a context switch belongs to the
//! analyzed process set and time window, who woke the thread, and whether
//! the processor was idle before the switch.

use crate::filter::{ProcessFilter, TimeWindow};
use crate::sample::{ContextSwitchSample, StackFrame, SwitchInThread};
use std::fmt;

/// Image name the trace reports for the per-processor idle threads
pub const IDLE_PROCESS_NAME: &str = "Idle";

/// Synthetic waker name used when the readying thread was running a DPC
pub const DPC_WAKER_NAME: &str = "DPC";

/// Who made the switched-in thread runnable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waker<'a> {
    Process(&'a str),
    Dpc,
}

impl Waker<'_> {
    pub fn name(&self) -> &str {
        match self {
            Waker::Process(name) => name,
            Waker::Dpc => DPC_WAKER_NAME,
        }
    }
}

impl fmt::Display for Waker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Facts about a sample that passed the filters
#[derive(Debug, Clone, PartialEq)]
pub struct Classification<'a> {
    pub timestamp: f64,
    pub thread: &'a SwitchInThread,
    pub waker: Option<Waker<'a>>,
    /// The waker was a DPC; counts toward every DPC counter
    pub in_dpc: bool,
    /// The switched-out context was the idle thread
    pub is_idle_wakeup: bool,
    pub previous_c_state: Option<u8>,
    /// Empty when the sample carried no stack
    pub woken_stack: &'a [StackFrame],
    pub waker_stack: &'a [StackFrame],
    pub wait_time_us: Option<f64>,
    pub ready_time_us: Option<f64>,
}

/// Streaming classifier for context-switch samples
#[derive(Debug, Clone, Default)]
pub struct IdleWakeupClassifier {
    window: TimeWindow,
    processes: ProcessFilter,
}

impl IdleWakeupClassifier {
    pub fn new(window: TimeWindow, processes: ProcessFilter) -> Self {
        Self { window, processes }
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn processes(&self) -> &ProcessFilter {
        &self.processes
    }

    /// Classify one sample, or `None` to skip it
    ///
    /// Samples are skipped when the switch cannot be resolved, when they fall
    /// outside the time window, or when the switched-in process is filtered
    /// out. A skipped sample must have no side effects on the caller.
    pub fn classify<'a>(&self, sample: &'a ContextSwitchSample) -> Option<Classification<'a>> {
        let (thread, switch_out) = match (&sample.switch_in, &sample.switch_out_image) {
            (Some(thread), Some(switch_out)) => (thread, switch_out),
            _ => return None,
        };

        if !self.window.contains(sample.timestamp) {
            return None;
        }

        if !self.processes.matches(&thread.image_name) {
            return None;
        }

        let waker = match (sample.waker_in_dpc, &sample.waker_image) {
            (true, _) => Some(Waker::Dpc),
            (false, Some(image)) => Some(Waker::Process(image)),
            (false, None) => None,
        };

        Some(Classification {
            timestamp: sample.timestamp,
            thread,
            waker,
            in_dpc: sample.waker_in_dpc,
            is_idle_wakeup: switch_out == IDLE_PROCESS_NAME,
            previous_c_state: sample.previous_c_state,
            woken_stack: sample.woken_stack.as_deref().unwrap_or(&[]),
            waker_stack: sample.waker_stack.as_deref().unwrap_or(&[]),
            wait_time_us: sample.wait_time_us,
            ready_time_us: sample.ready_time_us,
        })
    }
}
