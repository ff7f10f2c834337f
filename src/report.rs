//! Idle-wakeup report
//!
//! Snapshot of the aggregation store in a serializable shape, printed either
//! as a text table or as JSON.

use crate::stats::{ratio, StackAggregate, StackRole, WakeupStore};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// One thread row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRow {
    pub thread_id: u32,
    pub process_id: u32,
    pub process: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_type: Option<String>,
    pub context_switches: u64,
    pub dpc_context_switches: u64,
    /// `None` when there is no rate to report
    pub dpc_percent: Option<f64>,
    pub wakeups_per_sec: Option<f64>,
    pub avg_wait_us: Option<f64>,
    pub avg_ready_us: Option<f64>,
    pub distinct_stacks: usize,
}

/// Count for one waker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakerRow {
    pub waker: String,
    pub count: u64,
}

/// Count for one previous C-state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CStateRow {
    pub c_state: u8,
    pub count: u64,
}

/// A frequent call stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRow {
    pub count: u64,
    pub dpc_count: u64,
    /// Innermost frame first
    pub frames: Vec<String>,
}

impl From<&StackAggregate> for StackRow {
    fn from(aggregate: &StackAggregate) -> Self {
        Self {
            count: aggregate.count,
            dpc_count: aggregate.dpc_count,
            frames: aggregate.frames().iter().map(ToString::to_string).collect(),
        }
    }
}

/// Full idle-wakeup report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeupReport {
    pub trace: String,
    pub duration_secs: Option<f64>,
    pub context_switches: u64,
    pub idle_wakeups: u64,
    pub idle_wakeups_per_sec: Option<f64>,
    pub threads: Vec<ThreadRow>,
    pub wakers: Vec<WakerRow>,
    pub c_states: Vec<CStateRow>,
    pub top_woken_stacks: Vec<StackRow>,
    pub top_waker_stacks: Vec<StackRow>,
}

impl WakeupReport {
    /// Build a report from a finished store
    ///
    /// `top` limits the thread rows and each stack list.
    pub fn from_store(
        store: &WakeupStore,
        trace: &str,
        duration_secs: Option<f64>,
        top: usize,
    ) -> Self {
        let threads = store
            .threads_by_count()
            .into_iter()
            .take(top)
            .map(|record| {
                let identity = record.identity();
                let counters = &record.counters;
                ThreadRow {
                    thread_id: record.thread_id(),
                    process_id: identity.process_id(),
                    process: identity.process_name().to_string(),
                    thread_name: identity.thread_name().map(str::to_string),
                    chrome_type: identity
                        .chrome_type()
                        .is_chrome()
                        .then(|| identity.chrome_type().to_string()),
                    context_switches: counters.context_switches,
                    dpc_context_switches: counters.dpc_context_switches,
                    dpc_percent: counters.dpc_percentage(),
                    wakeups_per_sec: counters.wakeups_per_second(duration_secs),
                    avg_wait_us: counters.average_wait_us(),
                    avg_ready_us: counters.average_ready_us(),
                    distinct_stacks: record.woken_stacks().len(),
                }
            })
            .collect();

        let top_stacks = |role: StackRole| -> Vec<StackRow> {
            store
                .top_stacks(role, top)
                .into_iter()
                .map(|(_, aggregate)| StackRow::from(aggregate))
                .collect()
        };

        Self {
            trace: trace.to_string(),
            duration_secs,
            context_switches: store.filtered_context_switches(),
            idle_wakeups: store.idle_wakeups(),
            idle_wakeups_per_sec: duration_secs
                .and_then(|secs| ratio(store.idle_wakeups() as f64, secs)),
            threads,
            wakers: store
                .waker_tally()
                .into_iter()
                .map(|(waker, count)| WakerRow {
                    waker: waker.to_string(),
                    count,
                })
                .collect(),
            c_states: store
                .c_state_tally()
                .into_iter()
                .map(|(c_state, count)| CStateRow { c_state, count })
                .collect(),
            top_woken_stacks: top_stacks(StackRole::Woken),
            top_waker_stacks: top_stacks(StackRole::Waker),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Print the report as text tables
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Idle wakeups for {}", self.trace)?;
        writeln!(
            out,
            "{} idle wakeups out of {} context switches over {} ({} wakeups/s)",
            self.idle_wakeups,
            self.context_switches,
            format_option(self.duration_secs, "s"),
            format_option(self.idle_wakeups_per_sec, ""),
        )?;

        if self.threads.is_empty() {
            writeln!(out, "\nNo idle wakeups found.")?;
            return Ok(());
        }

        writeln!(out)?;
        writeln!(
            out,
            "{:<24} {:>8} {:<24} {:>10} {:>8} {:>7} {:>10}",
            "Process", "TID", "Thread", "Wakeups", "DPC", "DPC %", "Wakeups/s"
        )?;
        writeln!(out, "{}", "─".repeat(97))?;
        for row in &self.threads {
            let process = match &row.chrome_type {
                Some(kind) => format!("{} ({})", row.process, kind),
                None => row.process.clone(),
            };
            writeln!(
                out,
                "{:<24} {:>8} {:<24} {:>10} {:>8} {:>7} {:>10}",
                truncate(&process, 24),
                row.thread_id,
                truncate(row.thread_name.as_deref().unwrap_or("-"), 24),
                row.context_switches,
                row.dpc_context_switches,
                format_option(row.dpc_percent, ""),
                format_option(row.wakeups_per_sec, ""),
            )?;
        }

        if !self.wakers.is_empty() {
            writeln!(out, "\nWakers:")?;
            for row in &self.wakers {
                writeln!(out, "  {:<32} {:>10}", row.waker, row.count)?;
            }
        }

        if !self.c_states.is_empty() {
            writeln!(out, "\nPrevious C-states:")?;
            for row in &self.c_states {
                writeln!(out, "  C{:<31} {:>10}", row.c_state, row.count)?;
            }
        }

        write_stacks(out, "Top woken stacks", &self.top_woken_stacks)?;
        write_stacks(out, "Top waker stacks", &self.top_waker_stacks)?;
        Ok(())
    }
}

fn write_stacks<W: Write>(out: &mut W, title: &str, stacks: &[StackRow]) -> io::Result<()> {
    if stacks.is_empty() {
        return Ok(());
    }
    writeln!(out, "\n{}:", title)?;
    for stack in stacks {
        writeln!(out, "  {} wakeups ({} DPC)", stack.count, stack.dpc_count)?;
        for frame in &stack.frames {
            writeln!(out, "      {}", frame)?;
        }
    }
    Ok(())
}

fn format_option(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format!("{:.1}{}", value, unit),
        None => "n/a".to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 1).collect();
        short.push('…');
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{StackFrame, SwitchInThread};

    fn store() -> WakeupStore {
        let mut store = WakeupStore::new();
        let thread = SwitchInThread {
            thread_id: 100,
            process_id: 10,
            image_name: "chrome.exe".to_string(),
            command_line: Some("chrome.exe --type=renderer".to_string()),
            thread_name: Some("CrRendererMain".to_string()),
        };
        let stack = vec![StackFrame::resolved("chrome.dll", "Run", 1)];
        store.count_filtered(Some("DPC"));
        store.record(&thread, true, &stack, &[]);
        store.count_filtered(Some("audiodg.exe"));
        store.record(&thread, false, &stack, &[]);
        store.record_c_state(2);
        store
    }

    #[test]
    fn test_report_from_store() {
        let report = WakeupReport::from_store(&store(), "a.etl", Some(4.0), 10);
        assert_eq!(report.idle_wakeups, 2);
        assert_eq!(report.idle_wakeups_per_sec, Some(0.5));
        assert_eq!(report.threads.len(), 1);
        let row = &report.threads[0];
        assert_eq!(row.chrome_type.as_deref(), Some("renderer"));
        assert_eq!(row.dpc_percent, Some(50.0));
        assert_eq!(row.distinct_stacks, 1);
        assert_eq!(report.top_woken_stacks[0].frames, vec!["chrome.dll!Run"]);
        assert!(report.top_waker_stacks.is_empty());
        assert_eq!(report.c_states, vec![CStateRow { c_state: 2, count: 1 }]);
    }

    #[test]
    fn test_report_without_duration() {
        let report = WakeupReport::from_store(&store(), "a.etl", None, 10);
        assert_eq!(report.idle_wakeups_per_sec, None);
        assert_eq!(report.threads[0].wakeups_per_sec, None);
    }

    #[test]
    fn test_text_output() {
        let report = WakeupReport::from_store(&store(), "a.etl", Some(4.0), 10);
        let mut out = Vec::new();
        report.write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 idle wakeups out of 2 context switches"));
        assert!(text.contains("chrome.exe (renderer)"));
        assert!(text.contains("CrRendererMain"));
        assert!(text.contains("audiodg.exe"));
        assert!(text.contains("chrome.dll!Run"));
    }

    #[test]
    fn test_empty_report() {
        let report = WakeupReport::from_store(&WakeupStore::new(), "a.etl", None, 10);
        let mut out = Vec::new();
        report.write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No idle wakeups found."));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn test_json_output() {
        let report = WakeupReport::from_store(&store(), "a.etl", Some(4.0), 10);
        let json = report.to_json().unwrap();
        let parsed: WakeupReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
