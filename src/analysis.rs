//! Single-pass idle-wakeup analysis
//!
//! Feeds every sample through the classifier, then into the aggregation
//! store and the profile encoder. One analyzer per trace; it is consumed by
//! [`IdleWakeupAnalyzer::finish`].

use crate::chrome::ChromeProcessType;
use crate::classifier::{Classification, IdleWakeupClassifier, Waker};
use crate::config::{AnalysisConfig, LabelOptions, Result};
use crate::intern::{sample_values, EncoderOptions, ProfileEncoder, PseudoFrame};
use crate::pprof;
use crate::sample::ContextSwitchSample;
use crate::stats::{StackRole, WakeupStore};
use tracing::{info, trace};

/// Process id used for waker-stack locations; the trace does not say which
/// process the readying thread belonged to
const WAKER_PROCESS_ID: u32 = 0;

/// Finished analysis: the report data and the exportable profile
#[derive(Debug)]
pub struct AnalysisOutput {
    pub store: WakeupStore,
    pub profile: pprof::Profile,
    /// Seconds the rates are computed over, when known
    pub duration_secs: Option<f64>,
}

/// Streaming idle-wakeup analyzer
#[derive(Debug)]
pub struct IdleWakeupAnalyzer {
    classifier: IdleWakeupClassifier,
    labels: LabelOptions,
    store: WakeupStore,
    encoder: ProfileEncoder,
    samples_seen: u64,
}

impl IdleWakeupAnalyzer {
    /// Create an analyzer; fails when the config does not validate
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let options = EncoderOptions {
            include_inlined: config.include_inlined,
            source_prefix: config.source_prefix_regex()?,
        };
        Ok(Self {
            classifier: IdleWakeupClassifier::new(
                config.time_window,
                config.process_filter.clone(),
            ),
            labels: config.labels.clone(),
            store: WakeupStore::new(),
            encoder: ProfileEncoder::new(options),
            samples_seen: 0,
        })
    }

    /// Process one sample; returns `true` when it was an idle wakeup
    pub fn process(&mut self, sample: &ContextSwitchSample) -> bool {
        self.samples_seen += 1;

        let Some(classified) = self.classifier.classify(sample) else {
            trace!(timestamp = sample.timestamp, "sample skipped");
            return false;
        };

        self.store
            .count_filtered(classified.waker.as_ref().map(Waker::name));

        if !classified.is_idle_wakeup {
            return false;
        }

        self.store.observe_timestamp(classified.timestamp);
        if let Some(c_state) = classified.previous_c_state {
            self.store.record_c_state(c_state);
        }
        self.store
            .record(
                classified.thread,
                classified.in_dpc,
                classified.woken_stack,
                classified.waker_stack,
            )
            .add_timing(classified.wait_time_us, classified.ready_time_us);

        self.encode(&classified);
        true
    }

    fn encode(&mut self, classified: &Classification<'_>) {
        let thread = classified.thread;

        let mut woken_labels = Vec::with_capacity(2);
        if self.labels.thread_names {
            woken_labels.push(PseudoFrame {
                image: &thread.image_name,
                address: Some(u64::from(thread.thread_id)),
                label: self.thread_label(classified),
            });
        }
        woken_labels.push(PseudoFrame {
            image: &thread.image_name,
            address: Some(u64::from(thread.process_id)),
            label: self.process_label(classified),
        });
        self.encoder.add_sample(
            thread.process_id,
            classified.woken_stack,
            &woken_labels,
            sample_values(StackRole::Woken, classified.in_dpc),
        );

        let waker_labels: Vec<PseudoFrame<'_>> = classified
            .waker
            .iter()
            .map(|waker| PseudoFrame {
                image: waker.name(),
                address: None,
                label: waker.name().to_string(),
            })
            .collect();
        self.encoder.add_sample(
            WAKER_PROCESS_ID,
            classified.waker_stack,
            &waker_labels,
            sample_values(StackRole::Waker, classified.in_dpc),
        );
    }

    fn thread_label(&self, classified: &Classification<'_>) -> String {
        let thread = classified.thread;
        let name = thread.thread_name.as_deref().unwrap_or("<unnamed thread>");
        if self.labels.thread_ids {
            format!("{} ({})", name, thread.thread_id)
        } else {
            name.to_string()
        }
    }

    fn process_label(&self, classified: &Classification<'_>) -> String {
        let thread = classified.thread;
        let mut label = thread.image_name.clone();
        if self.labels.chrome_types {
            let kind = ChromeProcessType::classify(
                &thread.image_name,
                thread.command_line.as_deref(),
            );
            if kind.is_chrome() {
                label = format!("{} ({})", label, kind);
            }
        }
        if self.labels.process_ids {
            label = format!("{} ({})", label, thread.process_id);
        }
        label
    }

    pub fn store(&self) -> &WakeupStore {
        &self.store
    }

    pub fn encoder(&self) -> &ProfileEncoder {
        &self.encoder
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Seconds wakeup rates are computed over
    ///
    /// The configured window when it is bounded, otherwise the observed
    /// wall-clock range of the idle wakeups.
    pub fn duration_secs(&self) -> Option<f64> {
        self.classifier
            .window()
            .duration()
            .filter(|d| *d > 0.0)
            .or_else(|| self.store.observed_duration())
    }

    /// Finish the run, annotating the profile with `trace_name`
    pub fn finish(mut self, trace_name: &str) -> AnalysisOutput {
        let duration_secs = self.duration_secs();

        self.encoder.add_comment(&format!("Trace: {}", trace_name));
        match duration_secs {
            Some(secs) => self
                .encoder
                .add_comment(&format!("Duration: {:.3} s", secs)),
            None => self.encoder.add_comment("Duration: unknown"),
        }
        self.encoder.add_comment(&format!(
            "Processes: {}",
            self.classifier.processes().names().join(",")
        ));
        self.encoder.add_comment(&format!(
            "Idle wakeups: {} of {} context switches",
            self.store.idle_wakeups(),
            self.store.filtered_context_switches()
        ));

        info!(
            samples = self.samples_seen,
            context_switches = self.store.filtered_context_switches(),
            idle_wakeups = self.store.idle_wakeups(),
            threads = self.store.thread_count(),
            profile_samples = self.encoder.sample_count(),
            dropped = self.encoder.dropped_samples(),
            "analysis finished"
        );

        let duration_nanos =
            duration_secs.map_or(0, |secs| (secs * 1e9).min(i64::MAX as f64) as i64);
        AnalysisOutput {
            store: self.store,
            profile: self.encoder.into_profile(duration_nanos),
            duration_secs,
        }
    }
}
