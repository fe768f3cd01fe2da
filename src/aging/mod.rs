//! The aging workload orchestrator.
//!
//! Owns the worker pool, the checkpoint lock, periodic snapshot building,
//! progress and throughput sampling and the overall timeout. The experiment
//! moves through `Loading -> Running -> Cooloff -> Finished`, with
//! `Aborted{reason}` reachable from `Running` or `Cooloff`. Aborts are
//! cooperative: a shared flag checked by workers between batches; nothing is
//! ever terminated forcibly, so a worker stuck inside store code leaves the
//! experiment flagged as deadlocked-in-store and the process is expected to
//! be torn down externally.

mod params;
mod result;
mod worker;

pub use params::AgingParameters;
pub use result::AgingResult;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{AbortReason, DriverError, Result};
use crate::graph::VertexId;
use crate::interface::{GraphStore, MutationInterface};
use crate::latency::{LatencyProbe, LatencyReport};
use crate::monitor::{AbortHandle, Heartbeat, MonitorOptions, MonitorShared, ResourceMonitor};
use crate::workload::{Operation, WorkloadSource};
use worker::{reader_main, writer_main, ReaderContext, ReaderStats, WriterContext};

/// Observable lifecycle of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    /// The base graph is materialized; initial counts are being recorded.
    Loading,
    /// Writer (and reader) threads are applying the workload.
    Running,
    /// Mutations are done; idling to observe steady-state memory.
    Cooloff,
    /// The run completed its target.
    Finished,
    /// The run terminated early.
    Aborted(AbortReason),
}

/// Master cadence for progress sampling, checkpoint detection and build
/// triggering.
const TICK: Duration = Duration::from_millis(20);

/// One configured aging experiment, ready to run.
///
/// The store must already hold the externally-loaded base graph; the
/// orchestrator records `|V0|, |E0|` from it at start.
pub struct AgingExperiment {
    store: Arc<dyn GraphStore>,
    source: Arc<dyn WorkloadSource>,
    params: AgingParameters,
    analytics_sources: Arc<Vec<VertexId>>,
    analytics_output: Option<PathBuf>,
}

impl AgingExperiment {
    /// Binds a store, a workload and parameters into an experiment.
    pub fn new(
        store: Arc<dyn GraphStore>,
        source: Arc<dyn WorkloadSource>,
        params: AgingParameters,
    ) -> Self {
        Self {
            store,
            source,
            params,
            analytics_sources: Arc::new(Vec::new()),
            analytics_output: None,
        }
    }

    /// Source vertices reader threads draw from for bfs/sssp. Without any,
    /// readers stick to the source-less algorithms.
    pub fn with_analytics_sources(mut self, sources: Vec<VertexId>) -> Self {
        self.analytics_sources = Arc::new(sources);
        self
    }

    /// Directory reader threads dump algorithm output listings into. Without
    /// it, results are computed and discarded.
    pub fn with_analytics_output(mut self, dir: PathBuf) -> Self {
        self.analytics_output = Some(dir);
        self
    }

    /// Runs the experiment to completion or abort.
    ///
    /// Returns `Ok` with the result record for completed *and* aborted runs
    /// (the record carries the abort flags); returns `Err` only for
    /// configuration errors and unexpected store failures.
    pub fn run(&self) -> Result<AgingResult> {
        self.params.validate()?;
        let params = &self.params;

        info!(state = ?ExperimentState::Loading, "aging experiment starting");
        let v0 = self.store.num_vertices();
        let e0 = self.store.num_edges();
        let snapshots0 = self.store.num_snapshots();
        let expected = self.source.expected_operations();
        let num_recordings = params.num_recordings() as usize;

        let abort = Arc::new(AbortHandle::new());
        let checkpoint = Arc::new(RwLock::new(()));
        let driver_bytes = Arc::new(AtomicU64::new(self.source.working_set_bytes()));
        let cooloff_flag = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let retained: Arc<Mutex<Vec<Vec<Operation>>>> = Arc::new(Mutex::new(Vec::new()));

        let writers = params.num_writer_threads;
        let readers = params.num_reader_threads;
        let mut heartbeats: Vec<Arc<Heartbeat>> = Vec::with_capacity(writers + readers);
        for _ in 0..writers + readers {
            heartbeats.push(Arc::new(Heartbeat::new()));
        }
        let counters: Vec<Arc<AtomicU64>> =
            (0..writers).map(|_| Arc::new(AtomicU64::new(0))).collect();

        let monitor = ResourceMonitor::spawn(
            MonitorOptions {
                sample_interval: params.monitor_interval,
                grace_polls: params.liveness_grace_polls,
                memory_threshold_bytes: params.memory_threshold_bytes,
                report: params.report_memory,
            },
            MonitorShared {
                abort: Arc::clone(&abort),
                heartbeats: heartbeats.clone(),
                driver_bytes: Arc::clone(&driver_bytes),
                cooloff: Arc::clone(&cooloff_flag),
                finished: Arc::clone(&finished),
            },
        )?;

        let latency_capacity = ((expected / writers.max(1) as u64) + 1).min(1 << 22) as usize;
        let started = Instant::now();
        info!(
            state = ?ExperimentState::Running,
            writers,
            readers,
            expected_operations = expected,
            "mutation phase started"
        );

        let mut writer_handles: Vec<JoinHandle<Result<LatencyProbe>>> =
            Vec::with_capacity(writers);
        for w in 0..writers {
            let ctx = WriterContext {
                worker: w,
                store: Arc::clone(&self.store),
                source: Arc::clone(&self.source),
                checkpoint: Arc::clone(&checkpoint),
                abort: Arc::clone(&abort),
                heartbeat: Arc::clone(&heartbeats[w]),
                applied: Arc::clone(&counters[w]),
                granularity: params.worker_granularity,
                measure_latency: params.measure_latency,
                latency_capacity,
                release_memory: params.release_memory_incrementally,
                retained: Arc::clone(&retained),
                driver_bytes: Arc::clone(&driver_bytes),
            };
            let handle = thread::Builder::new()
                .name(format!("patina-writer-{w}"))
                .spawn(move || writer_main(ctx))?;
            writer_handles.push(handle);
        }

        let mut reader_handles: Vec<JoinHandle<Result<ReaderStats>>> =
            Vec::with_capacity(readers);
        for r in 0..readers {
            let ctx = ReaderContext {
                reader: r,
                store: Arc::clone(&self.store),
                abort: Arc::clone(&abort),
                heartbeat: Arc::clone(&heartbeats[writers + r]),
                finished: Arc::clone(&finished),
                started,
                timeout: params.timeout,
                sources: Arc::clone(&self.analytics_sources),
                seed: params.seed,
                output_dir: self.analytics_output.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("patina-reader-{r}"))
                .spawn(move || reader_main(ctx))?;
            reader_handles.push(handle);
        }

        // Master loop: the owning thread is the only writer to the progress
        // and throughput series.
        let mut progress: Vec<u64> = Vec::new();
        let mut reported = vec![0u64; num_recordings];
        let mut next_recording = 0usize;
        let mut next_second = started + Duration::from_secs(1);
        let mut last_build = started;
        let mut builds = 0u64;
        let mut build_failure: Option<DriverError> = None;

        let threshold = |k: usize| -> u64 {
            (expected as u128 * k as u128 / num_recordings.max(1) as u128) as u64
        };

        loop {
            thread::sleep(TICK);
            let now = Instant::now();
            let total: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();

            while next_second <= now {
                progress.push(total);
                next_second += Duration::from_secs(1);
            }
            while next_recording < num_recordings && total >= threshold(next_recording + 1) {
                reported[next_recording] = started.elapsed().as_micros() as u64;
                next_recording += 1;
            }

            if let Some(frequency) = params.build_frequency {
                if now.duration_since(last_build) >= frequency {
                    // Bounded acquisition: a writer wedged inside store code
                    // never releases its shared guard, and the watchdog must
                    // still get its turn to flag the stall.
                    if let Some(guard) = checkpoint.try_write_for(Duration::from_millis(250)) {
                        match self.store.build() {
                            Ok(()) => {
                                builds += 1;
                                debug!(builds, "snapshot built");
                            }
                            Err(e) => {
                                abort.fail(format!("build failed: {e}"));
                                build_failure = Some(e);
                            }
                        }
                        drop(guard);
                        last_build = Instant::now();
                        if build_failure.is_some() {
                            break;
                        }
                    }
                }
            }

            if let Some(timeout) = params.timeout {
                if started.elapsed() > timeout && abort.request(AbortReason::Timeout) {
                    warn!(?timeout, "mutation phase overran its budget");
                }
            }

            if heartbeats[..writers].iter().all(|h| h.is_done()) {
                break;
            }
            // A deadlocked worker will never finish; waiting for it would
            // hang the owning thread too.
            if matches!(abort.reason(), Some(AbortReason::Deadlock { .. })) {
                break;
            }
        }

        let completion = started.elapsed();
        let final_total: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
        let completion_micros = completion.as_micros() as u64;

        // Close out both series at the mutation-phase boundary.
        while progress.len() < completion.as_secs() as usize {
            progress.push(final_total);
        }
        progress.truncate(completion.as_secs() as usize);
        while next_recording < num_recordings && final_total >= threshold(next_recording + 1) {
            reported[next_recording] = completion_micros;
            next_recording += 1;
        }

        if build_failure.is_none() && !abort.is_set() && !params.cooloff.is_zero() {
            info!(state = ?ExperimentState::Cooloff, cooloff = ?params.cooloff, "cooloff started");
            cooloff_flag.store(true, Ordering::Release);
            let cooloff_until = Instant::now() + params.cooloff;
            while Instant::now() < cooloff_until && !abort.is_set() {
                thread::sleep(TICK);
            }
        }

        finished.store(true, Ordering::Release);
        // After a deadlock abort, threads that never marked themselves done
        // can not be waited for; everything else is joined normally.
        let wait_stragglers = !matches!(abort.reason(), Some(AbortReason::Deadlock { .. }));
        let probes = join_writers(writer_handles, &heartbeats[..writers], wait_stragglers);
        let reader_stats = join_readers(reader_handles, &heartbeats[writers..], wait_stragglers);
        let memory_samples = monitor.stop();
        drop(retained);

        if let Some(e) = build_failure {
            return Err(e);
        }
        if let Some(message) = abort.failure() {
            return Err(DriverError::Store(message));
        }

        let mut result = AgingResult {
            num_operations_total: final_total,
            num_artificial_vertices: self.source.num_artificial_vertices(),
            num_vertices_initial: v0,
            num_vertices_final: self.store.num_vertices(),
            num_edges_initial: e0,
            num_edges_final: self.store.num_edges(),
            num_build_invocations: builds,
            num_snapshots_created: match self.store.num_snapshots() {
                count if count > snapshots0 => count - snapshots0,
                _ => builds,
            },
            completion_micros,
            intermediate_throughput: reported,
            progress,
            memory_samples,
            latencies: params
                .measure_latency
                .then(|| LatencyReport::merge(probes)),
            num_writer_threads: writers,
            num_reader_threads: readers,
            worker_granularity: params.worker_granularity,
            num_reader_timeouts: reader_stats.iter().map(|s| s.timeouts).sum(),
            ..Default::default()
        };

        match abort.reason() {
            Some(AbortReason::Timeout) => result.timeout_hit = true,
            Some(AbortReason::MemoryThreshold) => result.memory_threshold_passed = true,
            Some(AbortReason::Deadlock { in_store_code }) => {
                result.deadlocked = true;
                result.deadlocked_in_store_code = in_store_code;
            }
            None => {}
        }
        match abort.reason() {
            Some(reason) => {
                warn!(state = ?ExperimentState::Aborted(reason), applied = final_total, "experiment aborted");
            }
            None => {
                info!(
                    state = ?ExperimentState::Finished,
                    applied = final_total,
                    completion_micros,
                    "experiment finished"
                );
            }
        }
        Ok(result)
    }
}

/// Joins every writer that finished. When `wait_stragglers` is false (a
/// deadlock abort), a thread that never marked itself done is deliberately
/// left behind instead of hanging the owning thread.
fn join_writers(
    handles: Vec<JoinHandle<Result<LatencyProbe>>>,
    heartbeats: &[Arc<Heartbeat>],
    wait_stragglers: bool,
) -> Vec<LatencyProbe> {
    let mut probes = Vec::with_capacity(handles.len());
    for (handle, heartbeat) in handles.into_iter().zip(heartbeats) {
        if !heartbeat.is_done() && !wait_stragglers {
            warn!("leaving a stalled writer behind at join");
            continue;
        }
        match handle.join() {
            Ok(Ok(probe)) => probes.push(probe),
            // The error was already routed through AbortHandle::fail.
            Ok(Err(_)) => {}
            Err(_) => warn!("writer thread panicked"),
        }
    }
    probes
}

fn join_readers(
    handles: Vec<JoinHandle<Result<ReaderStats>>>,
    heartbeats: &[Arc<Heartbeat>],
    wait_stragglers: bool,
) -> Vec<ReaderStats> {
    let mut stats = Vec::with_capacity(handles.len());
    for (handle, heartbeat) in handles.into_iter().zip(heartbeats) {
        if !heartbeat.is_done() && !wait_stragglers {
            warn!("leaving a stalled reader behind at join");
            continue;
        }
        match handle.join() {
            Ok(Ok(s)) => stats.push(s),
            Ok(Err(_)) => {}
            Err(_) => warn!("reader thread panicked"),
        }
    }
    stats
}
