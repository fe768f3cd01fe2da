//! End-to-end aging experiment scenarios.
//!
//! These tests pin down the accounting contract: exact operation totals in
//! the degenerate configuration, expansion-factor bounds on the final graph,
//! snapshot cadence under a known build frequency, and the memory-threshold
//! abort path.

#[allow(dead_code)]
mod util;

use std::sync::Arc;
use std::time::Duration;

use patina::aging::{AgingExperiment, AgingParameters};
use patina::report::MemorySink;
use patina::workload::synthetic::SyntheticWorkload;
use patina::workload::WorkloadSource;
use util::{loaded_store, ring, wrap_loaded, ThrottledStore};

fn experiment(
    graph: &patina::graph::BaseGraph,
    store: Arc<dyn patina::interface::GraphStore>,
    params: AgingParameters,
) -> AgingExperiment {
    let source = Arc::new(SyntheticWorkload::new(graph, &params).unwrap());
    AgingExperiment::new(store, source, params)
}

/// Scenario A: coefficient 1.0 on a ring (|V0| == |E0|), one writer, no
/// readers, no builds. One delete/insert cycle per original edge, so exactly
/// 2 * |E0| operations and an unchanged final graph.
#[test]
fn degenerate_single_writer_run() {
    let graph = ring(64);
    let store = loaded_store(&graph);
    let params = AgingParameters::default();
    let result = experiment(&graph, store.clone(), params).run().unwrap();

    assert!(!result.aborted());
    assert_eq!(result.num_operations_total, 2 * 64);
    assert_eq!(result.num_vertices_initial, 64);
    assert_eq!(result.num_edges_initial, 64);
    assert_eq!(result.num_vertices_final, 64);
    assert_eq!(result.num_edges_final, 64);
    assert_eq!(result.num_artificial_vertices, 0);
    assert_eq!(result.num_build_invocations, 0);
    assert_eq!(result.num_snapshots_created, 0);
    // coefficient 1.0 at step 1.0: exactly one throughput checkpoint.
    assert_eq!(result.intermediate_throughput.len(), 1);
    assert!(result.intermediate_throughput[0] > 0);
    assert!(result.completion_micros > 0);
}

/// Expansion factors bound the final graph and a complete run fills every
/// throughput checkpoint.
#[test]
fn expansion_bounds_hold_across_writers() {
    let graph = ring(64);
    let store = loaded_store(&graph);
    let params = AgingParameters {
        aging_coefficient: 4.0,
        expansion_factor_vertices: 1.5,
        expansion_factor_edges: 1.5,
        num_writer_threads: 2,
        worker_granularity: 16,
        recording_step: 0.5,
        measure_latency: true,
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let expected = source.expected_operations();
    let result = AgingExperiment::new(store.clone(), source, params)
        .run()
        .unwrap();

    assert!(!result.aborted());
    assert_eq!(result.num_operations_total, expected);
    assert!(result.num_vertices_final >= 64);
    assert!(result.num_vertices_final <= 64 + 32);
    assert!(result.num_edges_final >= 64);
    assert!(result.num_edges_final <= 64 + 32);
    // 4.0 / 0.5 checkpoints, all reached.
    assert_eq!(result.intermediate_throughput.len(), 8);
    assert!(result.intermediate_throughput.iter().all(|&t| t > 0));
    assert!(
        result.intermediate_throughput.windows(2).all(|w| w[0] <= w[1]),
        "completion times must be monotone"
    );

    let latencies = result.latencies.as_ref().expect("latency summaries");
    let inserts = latencies.inserts.as_ref().expect("insert summary");
    let deletes = latencies.deletes.as_ref().expect("delete summary");
    assert!(inserts.count > 0);
    assert!(deletes.count > 0);
}

/// Scenario B: builds every 100 ms over a run held above half a second
/// produce at least four snapshots.
#[test]
fn periodic_builds_create_snapshots() {
    let graph = ring(32);
    // 64 ops per coefficient unit, 150 us each: coefficient 60 gives a run of
    // roughly 0.6 s of pure store time.
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(150))
    });
    let params = AgingParameters {
        aging_coefficient: 60.0,
        num_writer_threads: 1,
        worker_granularity: 32,
        build_frequency: Some(Duration::from_millis(100)),
        ..AgingParameters::default()
    };
    let result = experiment(&graph, store, params).run().unwrap();

    assert!(!result.aborted());
    assert!(
        result.completion_micros >= 500_000,
        "run too short for the scenario: {} us",
        result.completion_micros
    );
    assert!(
        result.num_snapshots_created >= 4,
        "expected at least 4 snapshots, got {}",
        result.num_snapshots_created
    );
    assert_eq!(result.num_build_invocations, result.num_snapshots_created);
}

/// Scenario C: a memory threshold below the current footprint aborts within
/// a sampling interval, leaving a consistent operation prefix.
#[test]
fn memory_threshold_aborts_early() {
    let graph = ring(64);
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(200))
    });
    let params = AgingParameters {
        aging_coefficient: 100.0,
        num_writer_threads: 1,
        worker_granularity: 16,
        memory_threshold_bytes: Some(1), // below any real process footprint
        monitor_interval: Duration::from_millis(50),
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let expected = source.expected_operations();
    let result = AgingExperiment::new(store, source, params).run().unwrap();

    assert!(result.memory_threshold_passed);
    assert!(result.aborted());
    assert!(!result.timeout_hit);
    assert!(!result.deadlocked);
    assert!(result.num_operations_total < expected);
    assert!(!result.memory_samples.is_empty());
}

/// The overall timeout aborts the mutation phase and the counters reflect a
/// prefix.
#[test]
fn overall_timeout_aborts_the_mutation_phase() {
    let graph = ring(64);
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(500))
    });
    let params = AgingParameters {
        aging_coefficient: 200.0,
        num_writer_threads: 1,
        worker_granularity: 16,
        timeout: Some(Duration::from_millis(300)),
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let expected = source.expected_operations();
    let result = AgingExperiment::new(store, source, params).run().unwrap();

    assert!(result.timeout_hit);
    assert!(result.num_operations_total < expected);
    // Aborted runs may leave checkpoints unreached; those stay zero.
    assert!(result
        .intermediate_throughput
        .iter()
        .any(|&t| t == 0));
}

/// Cooloff keeps the monitor sampling and marks its samples.
#[test]
fn cooloff_samples_are_flagged() {
    let graph = ring(16);
    let store = loaded_store(&graph);
    let params = AgingParameters {
        cooloff: Duration::from_millis(450),
        monitor_interval: Duration::from_millis(100),
        ..AgingParameters::default()
    };
    let result = experiment(&graph, store, params).run().unwrap();

    assert!(!result.aborted());
    assert!(
        result.memory_samples.iter().any(|s| s.is_cooloff),
        "expected cooloff-flagged samples"
    );
    let ticks: Vec<u64> = result.memory_samples.iter().map(|s| s.tick).collect();
    let mut sorted = ticks.clone();
    sorted.sort_unstable();
    assert_eq!(ticks, sorted, "ticks must be monotone");
}

/// Progress is recorded once per whole second of the mutation phase.
#[test]
fn progress_series_matches_elapsed_seconds() {
    let graph = ring(32);
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(400))
    });
    // ~2048 ops * 400 us ≈ 0.8 s of store time plus overhead: at least one
    // whole second of mutation phase.
    let params = AgingParameters {
        aging_coefficient: 48.0,
        num_writer_threads: 1,
        worker_granularity: 32,
        ..AgingParameters::default()
    };
    let result = experiment(&graph, store, params).run().unwrap();

    assert!(!result.aborted());
    let elapsed_secs = (result.completion_micros / 1_000_000) as usize;
    assert_eq!(result.progress.len(), elapsed_secs);
    assert!(
        result.progress.windows(2).all(|w| w[0] <= w[1]),
        "progress counts are cumulative"
    );
    if let Some(&last) = result.progress.last() {
        assert!(last <= result.num_operations_total);
    }
}

/// The result record drives a sink with the flat table and every sub-table.
#[test]
fn result_record_persists() {
    let graph = ring(32);
    let store = loaded_store(&graph);
    let params = AgingParameters {
        aging_coefficient: 2.0,
        measure_latency: true,
        ..AgingParameters::default()
    };
    let result = experiment(&graph, store, params).run().unwrap();

    let mut sink = MemorySink::default();
    result.save(&mut sink).unwrap();
    assert_eq!(
        sink.parameter_value("num_updates"),
        Some(result.num_operations_total.to_string().as_str())
    );
    assert_eq!(sink.parameter_value("timeout_hit"), Some("0"));
    assert_eq!(sink.throughput.len(), 2);
    assert!(sink.flushed);
    assert!(!sink.latency_labels.is_empty());
}
