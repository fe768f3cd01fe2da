//! Mixed read/write workload: reader threads run the analytics suite against
//! the latest snapshot while writers churn, and per-call deadline expiries
//! are tolerated, counted and never escalate into an abort.

#[allow(dead_code)]
mod util;

use std::sync::Arc;
use std::time::Duration;

use patina::aging::{AgingExperiment, AgingParameters};
use patina::workload::synthetic::SyntheticWorkload;
use patina::workload::WorkloadSource;
use util::{ring, wrap_loaded, ThrottledStore, TimingOutStore};

#[test]
fn readers_run_alongside_writers() {
    let graph = ring(64);
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(100))
    });
    let params = AgingParameters {
        aging_coefficient: 20.0,
        num_writer_threads: 2,
        num_reader_threads: 2,
        worker_granularity: 32,
        build_frequency: Some(Duration::from_millis(50)),
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let expected = source.expected_operations();

    let result = AgingExperiment::new(store, source, params)
        .with_analytics_sources(graph.vertices().to_vec())
        .run()
        .unwrap();

    assert!(!result.aborted());
    assert_eq!(result.num_operations_total, expected);
    assert_eq!(result.num_reader_timeouts, 0);
    assert!(result.num_snapshots_created >= 1);
    assert_eq!(result.num_edges_final, 64);
}

#[test]
fn reader_timeouts_do_not_abort_the_mutation_phase() {
    let graph = ring(64);
    let store = wrap_loaded(&graph, TimingOutStore::new);
    let params = AgingParameters {
        aging_coefficient: 20.0,
        num_writer_threads: 1,
        num_reader_threads: 2,
        worker_granularity: 16,
        // The overall budget also bounds each analytics call.
        timeout: Some(Duration::from_secs(120)),
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let expected = source.expected_operations();

    let result = AgingExperiment::new(store, source, params)
        .with_analytics_sources(graph.vertices().to_vec())
        .run()
        .unwrap();

    assert!(!result.aborted(), "reader timeouts must not abort");
    assert!(!result.timeout_hit);
    assert_eq!(result.num_operations_total, expected);
    assert!(
        result.num_reader_timeouts > 0,
        "every analytics call was made to expire"
    );
}

/// Analytics output listings land in the requested directory.
#[test]
fn analytics_listings_are_dumped() {
    let graph = ring(32);
    let store = wrap_loaded(&graph, |inner| {
        ThrottledStore::new(inner, Duration::from_micros(100))
    });
    let dir = tempfile::tempdir().unwrap();
    let params = AgingParameters {
        aging_coefficient: 10.0,
        num_writer_threads: 1,
        num_reader_threads: 1,
        worker_granularity: 16,
        ..AgingParameters::default()
    };
    let source = Arc::new(SyntheticWorkload::new(&graph, &params).unwrap());
    let result = AgingExperiment::new(store, source, params)
        .with_analytics_sources(graph.vertices().to_vec())
        .with_analytics_output(dir.path().to_path_buf())
        .run()
        .unwrap();

    assert!(!result.aborted());
    let listings: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(!listings.is_empty(), "expected at least one dumped listing");
    let first = listings[0].as_ref().unwrap().path();
    let contents = std::fs::read_to_string(first).unwrap();
    let line = contents.lines().next().expect("non-empty listing");
    let mut fields = line.split_whitespace();
    fields.next().unwrap().parse::<u64>().expect("vertex id");
    assert!(fields.next().is_some(), "two-column listing");
}
