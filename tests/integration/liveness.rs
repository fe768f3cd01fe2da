//! Watchdog behavior under a wedged store.
//!
//! A store whose mutation calls stop returning must be detected by the
//! heartbeat watchdog: the run ends in a deadlock abort, flags the stall as
//! inside store code, and the orchestrator returns without waiting for the
//! stuck thread.

#[allow(dead_code)]
mod util;

use std::sync::Arc;
use std::time::{Duration, Instant};

use patina::aging::{AgingExperiment, AgingParameters};
use patina::workload::synthetic::SyntheticWorkload;
use util::{ring, wrap_loaded, BlockingStore};

#[test]
fn wedged_store_is_flagged_as_deadlock_in_store_code() {
    let graph = ring(32);
    let block_after = 40;
    let store = wrap_loaded(&graph, |inner| BlockingStore::new(inner, block_after));
    let params = AgingParameters {
        aging_coefficient: 50.0,
        num_writer_threads: 1,
        worker_granularity: 8,
        monitor_interval: Duration::from_millis(25),
        liveness_grace_polls: 4,
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());

    let started = Instant::now();
    let result = AgingExperiment::new(store, source, params).run().unwrap();
    let elapsed = started.elapsed();

    assert!(result.deadlocked, "watchdog must flag the stall");
    assert!(
        result.deadlocked_in_store_code,
        "the stall happened inside a store call"
    );
    assert!(!result.timeout_hit);
    assert!(!result.memory_threshold_passed);
    // The consistent prefix: everything applied before the store wedged.
    assert_eq!(result.num_operations_total, block_after);
    // Detection takes grace_polls * interval, not the whole experiment.
    assert!(
        elapsed < Duration::from_secs(30),
        "orchestrator must not wait for the stuck thread"
    );
}

#[test]
fn healthy_run_is_never_flagged() {
    let graph = ring(32);
    let store = util::loaded_store(&graph);
    let params = AgingParameters {
        aging_coefficient: 4.0,
        num_writer_threads: 2,
        monitor_interval: Duration::from_millis(25),
        liveness_grace_polls: 2,
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let result = AgingExperiment::new(store, source, params).run().unwrap();

    assert!(!result.deadlocked);
    assert!(!result.aborted());
}
