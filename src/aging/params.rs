//! Experiment parameters and their validation.

use std::time::Duration;

use crate::error::{DriverError, Result};

/// Immutable configuration of one aging experiment.
///
/// Constructed once from validated configuration and never mutated after the
/// experiment starts. [`AgingParameters::validate`] runs before any thread is
/// spawned; an invalid combination is a configuration error and leaves no
/// partial state behind.
#[derive(Debug, Clone)]
pub struct AgingParameters {
    /// Total mutation target as a multiple of `|V0| + |E0|`. Must be at
    /// least 1.0; the value 0 is a sentinel meaning "derive from the
    /// workload log header".
    pub aging_coefficient: f64,
    /// Soft ceiling on live vertex growth relative to the base graph.
    pub expansion_factor_vertices: f64,
    /// Soft ceiling on live edge growth relative to the base graph.
    pub expansion_factor_edges: f64,
    /// Largest weight the synthetic generator samples.
    pub max_weight: f64,
    /// Writer thread count; at least one.
    pub num_writer_threads: usize,
    /// Reader thread count; zero disables the mixed workload.
    pub num_reader_threads: usize,
    /// Operations a writer claims per scheduling round.
    pub worker_granularity: usize,
    /// Minimum wall-clock interval between `build()` calls; `None` disables
    /// periodic snapshot building.
    pub build_frequency: Option<Duration>,
    /// Recording step in `(0, 1]`; `1 / recording_step` must be integral.
    /// The experiment takes `aging_coefficient / recording_step`
    /// intermediate-throughput checkpoints.
    pub recording_step: f64,
    /// Idle wait after mutation completion, to observe steady-state memory.
    pub cooloff: Duration,
    /// Abort once a process memory sample exceeds this many bytes.
    pub memory_threshold_bytes: Option<u64>,
    /// Abort the mutation phase once it runs longer than this (cooloff
    /// excluded).
    pub timeout: Option<Duration>,
    /// Record per-operation latencies.
    pub measure_latency: bool,
    /// Free completed batches as progress advances instead of retaining them.
    pub release_memory_incrementally: bool,
    /// Preserve the input order of a replayed log instead of shuffling.
    pub is_timestamp_ordered: bool,
    /// Seed for the synthetic generator.
    pub seed: u64,
    /// Interval of the resource monitor's memory samples and heartbeat polls.
    pub monitor_interval: Duration,
    /// Consecutive unchanged heartbeat polls after which a worker counts as
    /// stalled.
    pub liveness_grace_polls: u32,
    /// Log every memory sample as it is taken.
    pub report_memory: bool,
}

impl Default for AgingParameters {
    fn default() -> Self {
        Self {
            aging_coefficient: 1.0,
            expansion_factor_vertices: 1.0,
            expansion_factor_edges: 1.0,
            max_weight: 1.0,
            num_writer_threads: 1,
            num_reader_threads: 0,
            worker_granularity: 1024,
            build_frequency: None,
            recording_step: 1.0,
            cooloff: Duration::ZERO,
            memory_threshold_bytes: None,
            timeout: None,
            measure_latency: false,
            release_memory_incrementally: true,
            is_timestamp_ordered: false,
            seed: 0x5eed_a61b,
            monitor_interval: Duration::from_secs(1),
            liveness_grace_polls: 10,
            report_memory: false,
        }
    }
}

impl AgingParameters {
    /// Checks every parameter and parameter combination.
    pub fn validate(&self) -> Result<()> {
        if self.aging_coefficient < 1.0 {
            return Err(config(format!(
                "aging coefficient must be >= 1.0, got {}",
                self.aging_coefficient
            )));
        }
        if self.expansion_factor_vertices < 1.0 {
            return Err(config(format!(
                "vertex expansion factor must be >= 1.0, got {}",
                self.expansion_factor_vertices
            )));
        }
        if self.expansion_factor_edges < 1.0 {
            return Err(config(format!(
                "edge expansion factor must be >= 1.0, got {}",
                self.expansion_factor_edges
            )));
        }
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return Err(config(format!(
                "max weight must be finite and positive, got {}",
                self.max_weight
            )));
        }
        if self.num_writer_threads == 0 {
            return Err(config("at least one writer thread is required".into()));
        }
        if self.worker_granularity == 0 {
            return Err(config("worker granularity must be at least 1".into()));
        }
        if !(self.recording_step > 0.0 && self.recording_step <= 1.0) {
            return Err(config(format!(
                "recording step must be in (0, 1], got {}",
                self.recording_step
            )));
        }
        let recordings_per_unit = 1.0 / self.recording_step;
        if (recordings_per_unit - recordings_per_unit.round()).abs() > 1e-9 {
            return Err(config(format!(
                "1 / recording_step must be integral, got recording_step = {}",
                self.recording_step
            )));
        }
        if self.monitor_interval.is_zero() {
            return Err(config("monitor interval must be positive".into()));
        }
        if self.liveness_grace_polls == 0 {
            return Err(config("liveness grace window must be at least one poll".into()));
        }
        Ok(())
    }

    /// Number of intermediate-throughput checkpoints a complete run records.
    pub fn num_recordings(&self) -> u64 {
        (self.aging_coefficient / self.recording_step).round().max(1.0) as u64
    }
}

fn config(message: String) -> DriverError {
    DriverError::Configuration(message)
}
