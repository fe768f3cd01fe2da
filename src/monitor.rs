//! Resource and liveness monitoring.
//!
//! A single background thread samples the process memory footprint and polls
//! per-worker heartbeat counters on a fixed schedule, independent of the
//! worker pool. It can request early termination through an [`AbortHandle`];
//! it never terminates a thread itself. An unresponsive worker stuck inside
//! store code leaves the experiment flagged as deadlocked-in-store and the
//! process is expected to be torn down externally.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AbortReason;

/// Cooperative termination switch shared by every thread of an experiment.
///
/// The first abort reason wins; later requests are ignored. A fatal failure
/// (an unexpected store error) uses the separate [`AbortHandle::fail`]
/// channel so the orchestrator can distinguish "aborted, best-effort result"
/// from "experiment failed".
#[derive(Debug, Default)]
pub struct AbortHandle {
    requested: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
    failure: Mutex<Option<String>>,
}

impl AbortHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an abort. Returns true if this call won the race.
    pub fn request(&self, reason: AbortReason) -> bool {
        let mut slot = self.reason.lock();
        if slot.is_none() && self.failure.lock().is_none() {
            *slot = Some(reason);
            self.requested.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Records a fatal failure and stops the experiment.
    pub fn fail(&self, message: String) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(message);
        }
        self.requested.store(true, Ordering::Release);
    }

    /// Whether any thread should stop issuing work.
    pub fn is_set(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// The winning abort reason, if any.
    pub fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock()
    }

    /// The fatal failure message, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

/// Where a worker was last observed, from the watchdog's point of view.
pub mod location {
    /// Inside generator or bookkeeping code.
    pub const DRIVER: u8 = 0;
    /// Inside a Mutation/Analytics role call.
    pub const STORE: u8 = 1;
}

/// Monotonic per-thread progress publication.
///
/// Workers bump the counter once per applied operation and flip the location
/// marker around every store call; the watchdog reads both.
#[derive(Debug, Default)]
pub struct Heartbeat {
    counter: AtomicU64,
    location: AtomicU8,
    done: AtomicBool,
}

impl Heartbeat {
    /// Creates a heartbeat at zero, located in driver code.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes one unit of progress.
    #[inline]
    pub fn beat(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the thread as being inside a store call.
    #[inline]
    pub fn enter_store(&self) {
        self.location.store(location::STORE, Ordering::Relaxed);
    }

    /// Marks the thread as back inside driver code.
    #[inline]
    pub fn leave_store(&self) {
        self.location.store(location::DRIVER, Ordering::Relaxed);
    }

    /// Marks the thread as finished; the watchdog stops tracking it.
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Whether the thread has finished.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Current `(counter, location)` pair.
    pub fn snapshot(&self) -> (u64, u8) {
        (
            self.counter.load(Ordering::Relaxed),
            self.location.load(Ordering::Relaxed),
        )
    }
}

/// One memory-footprint observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MemorySample {
    /// Sample ordinal, starting at 1.
    pub tick: u64,
    /// Whole-process resident set size in bytes.
    pub process_bytes: u64,
    /// Bytes attributed to the driver itself: retained batch buffers,
    /// generator working set, result buffers. The store's own footprint can
    /// be inferred as the difference from `process_bytes`.
    pub driver_bytes: u64,
    /// Whether the sample was taken during the cooloff phase.
    pub is_cooloff: bool,
}

/// Monitor schedule knobs.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Interval between memory samples and heartbeat polls.
    pub sample_interval: Duration,
    /// Consecutive unchanged polls after which a worker counts as stalled.
    pub grace_polls: u32,
    /// Abort once a process sample exceeds this many bytes.
    pub memory_threshold_bytes: Option<u64>,
    /// Log each memory sample as it is taken.
    pub report: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            grace_polls: 10,
            memory_threshold_bytes: None,
            report: false,
        }
    }
}

/// State the monitor shares with the orchestrator and its workers.
#[derive(Clone)]
pub struct MonitorShared {
    /// Termination switch the monitor may trip.
    pub abort: Arc<AbortHandle>,
    /// Heartbeats of all writer and reader threads.
    pub heartbeats: Vec<Arc<Heartbeat>>,
    /// Driver-attributed bytes, maintained by the workload and the workers.
    pub driver_bytes: Arc<AtomicU64>,
    /// Set while the experiment is in its cooloff phase.
    pub cooloff: Arc<AtomicBool>,
    /// Set once the experiment reached `Finished`; disables stall detection.
    pub finished: Arc<AtomicBool>,
}

/// Handle to the running monitor thread.
pub struct ResourceMonitor {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Vec<MemorySample>>,
}

impl ResourceMonitor {
    /// Spawns the monitor thread.
    pub fn spawn(options: MonitorOptions, shared: MonitorShared) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("patina-monitor".to_string())
            .spawn(move || monitor_main(options, shared, thread_stop))?;
        Ok(Self { stop, handle })
    }

    /// Stops the monitor and returns the memory series it collected.
    pub fn stop(self) -> Vec<MemorySample> {
        self.stop.store(true, Ordering::Release);
        self.handle.join().unwrap_or_default()
    }
}

fn monitor_main(
    options: MonitorOptions,
    shared: MonitorShared,
    stop: Arc<AtomicBool>,
) -> Vec<MemorySample> {
    let mut samples = Vec::new();
    let mut tick = 0u64;
    let mut previous: Vec<u64> = shared.heartbeats.iter().map(|_| 0).collect();
    let mut stalled: Vec<u32> = shared.heartbeats.iter().map(|_| 0).collect();
    let mut next_sample = Instant::now() + options.sample_interval;

    while !stop.load(Ordering::Acquire) {
        thread::sleep(SLICE.min(options.sample_interval));
        if Instant::now() < next_sample {
            continue;
        }
        next_sample += options.sample_interval;
        tick += 1;

        let sample = MemorySample {
            tick,
            process_bytes: process_resident_bytes(),
            driver_bytes: shared.driver_bytes.load(Ordering::Relaxed),
            is_cooloff: shared.cooloff.load(Ordering::Relaxed),
        };
        if options.report {
            debug!(
                tick = sample.tick,
                process_bytes = sample.process_bytes,
                driver_bytes = sample.driver_bytes,
                cooloff = sample.is_cooloff,
                "memory footprint sample"
            );
        }
        samples.push(sample);

        if let Some(threshold) = options.memory_threshold_bytes {
            if sample.process_bytes > threshold
                && shared.abort.request(AbortReason::MemoryThreshold)
            {
                warn!(
                    process_bytes = sample.process_bytes,
                    threshold, "memory threshold exceeded, aborting experiment"
                );
            }
        }

        if shared.finished.load(Ordering::Acquire) || shared.abort.is_set() {
            continue;
        }
        for (index, heartbeat) in shared.heartbeats.iter().enumerate() {
            if heartbeat.is_done() {
                stalled[index] = 0;
                continue;
            }
            let (counter, loc) = heartbeat.snapshot();
            if counter == previous[index] {
                stalled[index] += 1;
                if stalled[index] >= options.grace_polls {
                    let in_store_code = loc == location::STORE;
                    if shared
                        .abort
                        .request(AbortReason::Deadlock { in_store_code })
                    {
                        warn!(
                            worker = index,
                            in_store_code,
                            polls = stalled[index],
                            "worker heartbeat stalled, flagging deadlock"
                        );
                    }
                }
            } else {
                stalled[index] = 0;
                previous[index] = counter;
            }
        }
    }
    samples
}

const SLICE: Duration = Duration::from_millis(20);

/// Resident set size of the current process in bytes, 0 where unsupported.
pub fn process_resident_bytes() -> u64 {
    imp::resident_bytes()
}

#[cfg(unix)]
mod imp {
    pub fn resident_bytes() -> u64 {
        let statm = match std::fs::read_to_string("/proc/self/statm") {
            Ok(contents) => contents,
            Err(_) => return 0,
        };
        let pages: u64 = statm
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse().ok())
            .unwrap_or(0);
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        pages.saturating_mul(page_size.max(0) as u64)
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn resident_bytes() -> u64 {
        0
    }
}
