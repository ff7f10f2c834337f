//! Idle-wakeup aggregation store
//!
//! Per-thread records keyed by thread id, each owning its own stack
//! dictionaries, plus global stack dictionaries and tallies. Everything is
//! accumulate-only for the lifetime of one run.

use crate::chrome::ChromeProcessType;
use crate::sample::{StackFrame, SwitchInThread};
use crate::signature::CallStackSignature;
use std::collections::{BTreeMap, HashMap};

/// Counts for one distinct call stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackAggregate {
    pub count: u64,
    pub dpc_count: u64,
    /// Frames of the stack, stored when the signature was first seen
    frames: Vec<StackFrame>,
}

impl StackAggregate {
    fn new(frames: &[StackFrame]) -> Self {
        Self {
            count: 0,
            dpc_count: 0,
            frames: frames.to_vec(),
        }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }
}

/// Signature -> aggregate map
pub type StackMap = HashMap<CallStackSignature, StackAggregate>;

/// Add one occurrence of `frames` to `stacks`; empty stacks are ignored
fn add_stack(stacks: &mut StackMap, frames: &[StackFrame], in_dpc: bool) {
    let Some(signature) = CallStackSignature::from_frames(frames) else {
        return;
    };
    let entry = stacks
        .entry(signature)
        .or_insert_with(|| StackAggregate::new(frames));
    entry.count += 1;
    if in_dpc {
        entry.dpc_count += 1;
    }
}

/// Descriptive data of a thread, fixed by its first idle wakeup
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadIdentity {
    process_id: u32,
    process_name: String,
    thread_name: Option<String>,
    chrome_type: ChromeProcessType,
}

impl ThreadIdentity {
    fn from_thread(thread: &SwitchInThread) -> Self {
        Self {
            process_id: thread.process_id,
            process_name: thread.image_name.clone(),
            thread_name: thread.thread_name.clone(),
            chrome_type: ChromeProcessType::classify(
                &thread.image_name,
                thread.command_line.as_deref(),
            ),
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn chrome_type(&self) -> &ChromeProcessType {
        &self.chrome_type
    }
}

/// Mutable counters of a thread
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WakeupCounters {
    pub context_switches: u64,
    pub dpc_context_switches: u64,
    pub total_wait_us: f64,
    pub wait_samples: u64,
    pub total_ready_us: f64,
    pub ready_samples: u64,
}

impl WakeupCounters {
    /// Add optional wait/ready durations of one wakeup
    pub fn add_timing(&mut self, wait_us: Option<f64>, ready_us: Option<f64>) {
        if let Some(wait) = wait_us {
            self.total_wait_us += wait;
            self.wait_samples += 1;
        }
        if let Some(ready) = ready_us {
            self.total_ready_us += ready;
            self.ready_samples += 1;
        }
    }

    /// Share of wakeups caused by DPCs, in percent
    pub fn dpc_percentage(&self) -> Option<f64> {
        ratio(self.dpc_context_switches as f64, self.context_switches as f64)
            .map(|r| r * 100.0)
    }

    pub fn average_wait_us(&self) -> Option<f64> {
        ratio(self.total_wait_us, self.wait_samples as f64)
    }

    pub fn average_ready_us(&self) -> Option<f64> {
        ratio(self.total_ready_us, self.ready_samples as f64)
    }

    pub fn wakeups_per_second(&self, duration_secs: Option<f64>) -> Option<f64> {
        ratio(self.context_switches as f64, duration_secs?)
    }
}

/// Guarded division; `None` when the denominator is zero or not finite
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 && denominator.is_finite() {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// Everything known about one thread's idle wakeups
#[derive(Debug, Clone)]
pub struct IdleWakeupRecord {
    thread_id: u32,
    identity: ThreadIdentity,
    pub counters: WakeupCounters,
    woken_stacks: StackMap,
    waker_stacks: StackMap,
}

impl IdleWakeupRecord {
    fn new(thread: &SwitchInThread) -> Self {
        Self {
            thread_id: thread.thread_id,
            identity: ThreadIdentity::from_thread(thread),
            counters: WakeupCounters::default(),
            woken_stacks: StackMap::new(),
            waker_stacks: StackMap::new(),
        }
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn identity(&self) -> &ThreadIdentity {
        &self.identity
    }

    /// Stacks of this thread at the moment it woke up
    pub fn woken_stacks(&self) -> &StackMap {
        &self.woken_stacks
    }

    /// Stacks of the threads that readied this thread
    pub fn waker_stacks(&self) -> &StackMap {
        &self.waker_stacks
    }
}

/// Which of the two stacks of a wakeup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRole {
    Woken,
    Waker,
}

/// Aggregates idle wakeups across a whole run
#[derive(Debug, Default)]
pub struct WakeupStore {
    threads: HashMap<u32, IdleWakeupRecord>,
    woken_stacks: StackMap,
    waker_stacks: StackMap,
    waker_tally: HashMap<String, u64>,
    c_state_tally: BTreeMap<u8, u64>,
    filtered_context_switches: u64,
    idle_wakeups: u64,
    time_range: Option<(f64, f64)>,
}

impl WakeupStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a context switch that passed the filters, idle or not
    pub fn count_filtered(&mut self, waker: Option<&str>) {
        self.filtered_context_switches += 1;
        if let Some(waker) = waker {
            *self.waker_tally.entry(waker.to_string()).or_default() += 1;
        }
    }

    /// Record an idle wakeup of `thread`
    ///
    /// The thread's identity is taken from the first wakeup recorded for its
    /// thread id; later wakeups only bump counters. Returns the counters so
    /// the caller can add per-wakeup extras.
    pub fn record(
        &mut self,
        thread: &SwitchInThread,
        in_dpc: bool,
        woken_stack: &[StackFrame],
        waker_stack: &[StackFrame],
    ) -> &mut WakeupCounters {
        self.idle_wakeups += 1;
        add_stack(&mut self.woken_stacks, woken_stack, in_dpc);
        add_stack(&mut self.waker_stacks, waker_stack, in_dpc);

        let record = self
            .threads
            .entry(thread.thread_id)
            .or_insert_with(|| IdleWakeupRecord::new(thread));
        record.counters.context_switches += 1;
        if in_dpc {
            record.counters.dpc_context_switches += 1;
        }
        add_stack(&mut record.woken_stacks, woken_stack, in_dpc);
        add_stack(&mut record.waker_stacks, waker_stack, in_dpc);

        &mut record.counters
    }

    /// Widen the observed wall-clock range to include `timestamp`
    pub fn observe_timestamp(&mut self, timestamp: f64) {
        self.time_range = Some(match self.time_range {
            None => (timestamp, timestamp),
            Some((min, max)) => (min.min(timestamp), max.max(timestamp)),
        });
    }

    pub fn record_c_state(&mut self, c_state: u8) {
        *self.c_state_tally.entry(c_state).or_default() += 1;
    }

    pub fn filtered_context_switches(&self) -> u64 {
        self.filtered_context_switches
    }

    pub fn idle_wakeups(&self) -> u64 {
        self.idle_wakeups
    }

    /// First and last idle-wakeup timestamps
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.time_range
    }

    /// Length of the observed range; `None` before two distinct timestamps
    pub fn observed_duration(&self) -> Option<f64> {
        self.time_range
            .map(|(min, max)| max - min)
            .filter(|d| *d > 0.0)
    }

    pub fn thread(&self, thread_id: u32) -> Option<&IdleWakeupRecord> {
        self.threads.get(&thread_id)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Thread records, most wakeups first, ties by thread id
    pub fn threads_by_count(&self) -> Vec<&IdleWakeupRecord> {
        let mut sorted: Vec<_> = self.threads.values().collect();
        sorted.sort_by(|a, b| {
            b.counters
                .context_switches
                .cmp(&a.counters.context_switches)
                .then(a.thread_id.cmp(&b.thread_id))
        });
        sorted
    }

    /// Waker tally, largest first, ties by name
    pub fn waker_tally(&self) -> Vec<(&str, u64)> {
        let mut sorted: Vec<_> = self
            .waker_tally
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        sorted
    }

    /// C-state tally in ascending state order
    pub fn c_state_tally(&self) -> Vec<(u8, u64)> {
        self.c_state_tally.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Global stack dictionary for one role
    pub fn stacks(&self, role: StackRole) -> &StackMap {
        match role {
            StackRole::Woken => &self.woken_stacks,
            StackRole::Waker => &self.waker_stacks,
        }
    }

    /// Most frequent global stacks of one role, ties by signature
    pub fn top_stacks(
        &self,
        role: StackRole,
        limit: usize,
    ) -> Vec<(&CallStackSignature, &StackAggregate)> {
        let mut sorted: Vec<_> = self.stacks(role).iter().collect();
        sorted.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(b.0)));
        sorted.truncate(limit);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(thread_id: u32, name: &str) -> SwitchInThread {
        SwitchInThread {
            thread_id,
            process_id: 42,
            image_name: "chrome.exe".to_string(),
            command_line: Some("chrome.exe --type=renderer".to_string()),
            thread_name: Some(name.to_string()),
        }
    }

    fn stack(address: u64) -> Vec<StackFrame> {
        vec![
            StackFrame::resolved("ntoskrnl.exe", "KiSwapThread", address),
            StackFrame::resolved("chrome.dll", "MessageLoop::Run", 0x200),
        ]
    }

    #[test]
    fn test_store_new() {
        let store = WakeupStore::new();
        assert_eq!(store.idle_wakeups(), 0);
        assert_eq!(store.thread_count(), 0);
        assert!(store.time_range().is_none());
    }

    #[test]
    fn test_record_counts() {
        let mut store = WakeupStore::new();
        store.record(&thread(100, "main"), false, &stack(1), &[]);
        store.record(&thread(100, "main"), true, &stack(1), &[]);
        store.record(&thread(200, "io"), false, &[], &[]);

        let record = store.thread(100).unwrap();
        assert_eq!(record.counters.context_switches, 2);
        assert_eq!(record.counters.dpc_context_switches, 1);
        assert_eq!(store.idle_wakeups(), 3);
        assert_eq!(store.thread_count(), 2);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut store = WakeupStore::new();
        store.record(&thread(100, "first"), false, &[], &[]);
        let mut renamed = thread(100, "second");
        renamed.process_id = 7;
        store.record(&renamed, false, &[], &[]);

        let identity = store.thread(100).unwrap().identity();
        assert_eq!(identity.thread_name(), Some("first"));
        assert_eq!(identity.process_id(), 42);
        assert_eq!(identity.chrome_type(), &ChromeProcessType::Renderer);
    }

    #[test]
    fn test_stack_aggregation() {
        let mut store = WakeupStore::new();
        store.record(&thread(100, "main"), false, &stack(1), &stack(9));
        store.record(&thread(100, "main"), true, &stack(1), &[]);
        store.record(&thread(100, "main"), false, &stack(2), &[]);

        let record = store.thread(100).unwrap();
        assert_eq!(record.woken_stacks().len(), 2);
        assert_eq!(record.waker_stacks().len(), 1);

        let signature = CallStackSignature::from_frames(&stack(1)).unwrap();
        let aggregate = &record.woken_stacks()[&signature];
        assert_eq!(aggregate.count, 2);
        assert_eq!(aggregate.dpc_count, 1);
        assert_eq!(aggregate.frames(), stack(1).as_slice());
    }

    #[test]
    fn test_global_stacks_span_threads() {
        let mut store = WakeupStore::new();
        store.record(&thread(1, "a"), false, &stack(1), &[]);
        store.record(&thread(2, "b"), false, &stack(1), &[]);
        store.record(&thread(3, "c"), true, &stack(1), &[]);

        let global = store.stacks(StackRole::Woken);
        assert_eq!(global.len(), 1);
        let aggregate = global.values().next().unwrap();
        assert_eq!(aggregate.count, 3);
        assert_eq!(aggregate.dpc_count, 1);
        assert!(store.stacks(StackRole::Waker).is_empty());
    }

    #[test]
    fn test_threads_sorted_by_count_then_id() {
        let mut store = WakeupStore::new();
        for _ in 0..2 {
            store.record(&thread(30, "x"), false, &[], &[]);
            store.record(&thread(10, "y"), false, &[], &[]);
        }
        store.record(&thread(20, "z"), false, &[], &[]);
        store.record(&thread(20, "z"), false, &[], &[]);
        store.record(&thread(20, "z"), false, &[], &[]);

        let ids: Vec<u32> = store.threads_by_count().iter().map(|r| r.thread_id()).collect();
        assert_eq!(ids, vec![20, 10, 30]);
    }

    #[test]
    fn test_waker_and_c_state_tallies() {
        let mut store = WakeupStore::new();
        store.count_filtered(Some("DPC"));
        store.count_filtered(Some("audiodg.exe"));
        store.count_filtered(Some("DPC"));
        store.count_filtered(None);
        store.record_c_state(3);
        store.record_c_state(1);
        store.record_c_state(3);

        assert_eq!(store.filtered_context_switches(), 4);
        assert_eq!(store.waker_tally(), vec![("DPC", 2), ("audiodg.exe", 1)]);
        assert_eq!(store.c_state_tally(), vec![(1, 1), (3, 2)]);
    }

    #[test]
    fn test_time_range() {
        let mut store = WakeupStore::new();
        store.observe_timestamp(5.0);
        assert_eq!(store.observed_duration(), None);
        store.observe_timestamp(2.0);
        store.observe_timestamp(4.0);
        assert_eq!(store.time_range(), Some((2.0, 5.0)));
        assert_eq!(store.observed_duration(), Some(3.0));
    }

    #[test]
    fn test_rates_guard_zero_denominators() {
        let counters = WakeupCounters::default();
        assert_eq!(counters.dpc_percentage(), None);
        assert_eq!(counters.average_wait_us(), None);
        assert_eq!(counters.wakeups_per_second(Some(0.0)), None);
        assert_eq!(counters.wakeups_per_second(None), None);
    }

    #[test]
    fn test_rates() {
        let mut counters = WakeupCounters {
            context_switches: 4,
            dpc_context_switches: 1,
            ..WakeupCounters::default()
        };
        counters.add_timing(Some(10.0), None);
        counters.add_timing(Some(30.0), Some(5.0));
        assert_eq!(counters.dpc_percentage(), Some(25.0));
        assert_eq!(counters.average_wait_us(), Some(20.0));
        assert_eq!(counters.average_ready_us(), Some(5.0));
        assert_eq!(counters.wakeups_per_second(Some(2.0)), Some(2.0));
    }

    #[test]
    fn test_top_stacks() {
        let mut store = WakeupStore::new();
        store.record(&thread(1, "a"), false, &stack(1), &[]);
        store.record(&thread(1, "a"), false, &stack(2), &[]);
        store.record(&thread(1, "a"), false, &stack(2), &[]);

        let top = store.top_stacks(StackRole::Woken, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].1.count, 2);
        assert_eq!(top[0].1.frames()[0].address(), 2);
    }
}
