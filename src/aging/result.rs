//! The experiment result record.

use crate::error::Result;
use crate::latency::LatencyReport;
use crate::monitor::MemorySample;
use crate::report::ResultSink;

/// Everything one aging run produced.
///
/// Mutated exclusively by the orchestrator's owning thread — counters are
/// aggregated from per-worker accumulators at synchronization points, never
/// written concurrently — and immutable once handed to a sink.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AgingResult {
    /// Operations actually applied. Equals the configured target unless an
    /// abort flag is set, in which case it reflects a consistent prefix.
    pub num_operations_total: u64,
    /// Vertices minted beyond the initial vertex set.
    pub num_artificial_vertices: u64,
    /// Vertex count right after loading.
    pub num_vertices_initial: u64,
    /// Vertex count at the end of the run.
    pub num_vertices_final: u64,
    /// Edge count right after loading.
    pub num_edges_initial: u64,
    /// Edge count at the end of the run.
    pub num_edges_final: u64,
    /// How often the orchestrator invoked `build()`.
    pub num_build_invocations: u64,
    /// Snapshots the store reported creating; falls back to the invocation
    /// count for stores that do not keep count.
    pub num_snapshots_created: u64,
    /// Wall-clock time of the mutation phase in microseconds, cooloff
    /// excluded.
    pub completion_micros: u64,
    /// The mutation phase overran its wall-clock budget.
    pub timeout_hit: bool,
    /// A memory sample exceeded the configured threshold.
    pub memory_threshold_passed: bool,
    /// A worker heartbeat stalled past the grace window.
    pub deadlocked: bool,
    /// The stalled worker was last observed inside store code.
    pub deadlocked_in_store_code: bool,
    /// Cumulative completion time in microseconds per aging checkpoint,
    /// indexed by checkpoint; 0 marks a checkpoint never reached.
    pub intermediate_throughput: Vec<u64>,
    /// Cumulative applied-operation count at each whole second of the
    /// mutation phase.
    pub progress: Vec<u64>,
    /// Timestamped memory-footprint series from the monitor.
    pub memory_samples: Vec<MemorySample>,
    /// Latency summaries, present when latency measurement was requested.
    pub latencies: Option<LatencyReport>,
    /// Writer thread count the run used, echoed for the parameter table.
    pub num_writer_threads: usize,
    /// Reader thread count the run used.
    pub num_reader_threads: usize,
    /// Batch size the run used.
    pub worker_granularity: usize,
    /// Analytics calls that hit their per-call deadline (mixed workload).
    pub num_reader_timeouts: u64,
}

impl AgingResult {
    /// True when any abort flag is set.
    pub fn aborted(&self) -> bool {
        self.timeout_hit || self.memory_threshold_passed || self.deadlocked
    }

    /// Writes the flat parameter table and the sub-tables to `sink`.
    pub fn save(&self, sink: &mut dyn ResultSink) -> Result<()> {
        let flat: &[(&str, String)] = &[
            ("granularity", self.worker_granularity.to_string()),
            ("num_writer_threads", self.num_writer_threads.to_string()),
            ("num_reader_threads", self.num_reader_threads.to_string()),
            ("num_updates", self.num_operations_total.to_string()),
            (
                "num_artificial_vertices",
                self.num_artificial_vertices.to_string(),
            ),
            ("num_vertices_load", self.num_vertices_initial.to_string()),
            ("num_vertices_final", self.num_vertices_final.to_string()),
            ("num_edges_load", self.num_edges_initial.to_string()),
            ("num_edges_final", self.num_edges_final.to_string()),
            (
                "num_build_invocations",
                self.num_build_invocations.to_string(),
            ),
            (
                "num_snapshots_created",
                self.num_snapshots_created.to_string(),
            ),
            ("completion_time", self.completion_micros.to_string()),
            ("num_reader_timeouts", self.num_reader_timeouts.to_string()),
            ("timeout_hit", flag(self.timeout_hit)),
            ("memory_threshold_passed", flag(self.memory_threshold_passed)),
            ("deadlocked", flag(self.deadlocked)),
            (
                "deadlocked_in_store_code",
                flag(self.deadlocked_in_store_code),
            ),
        ];
        for (key, value) in flat {
            sink.parameter(key, value)?;
        }

        for (index, &micros) in self.intermediate_throughput.iter().enumerate() {
            if micros == 0 {
                continue; // checkpoint never reached
            }
            sink.throughput_entry(index as u64 + 1, micros)?;
        }
        for (second, &ops) in self.progress.iter().enumerate() {
            sink.progress_entry(second as u64 + 1, ops)?;
        }
        for sample in &self.memory_samples {
            sink.memory_entry(sample)?;
        }
        if let Some(report) = &self.latencies {
            for summary in report.summaries() {
                sink.latency_entry(summary)?;
            }
        }
        sink.flush()
    }
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}
