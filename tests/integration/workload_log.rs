//! Workload log scenarios: fail-fast header validation, replay idempotence
//! and the command-line round trip (mklog, then run --log).

#[allow(dead_code)]
mod util;

use std::sync::Arc;

use assert_cmd::Command;
use patina::aging::{AgingExperiment, AgingParameters};
use patina::error::DriverError;
use patina::workload::log::{LogHeader, LogReader, LogReplay, LogWriter};
use patina::workload::synthetic::SyntheticWorkload;
use patina::workload::WorkloadSource;
use util::{loaded_store, ring};

/// Scenario D: a log without `aging_coeff` refuses to start before any
/// thread or store state exists.
#[test]
fn missing_header_property_fails_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.log");
    std::fs::write(
        &path,
        "ef_vertices = 1\nef_edges = 1\nmax_weight = 1\ninput_graph = g.el\n\nae 1 2 0.5\n",
    )
    .unwrap();

    let err = LogReader::open(&path).err().unwrap();
    match err {
        DriverError::Configuration(msg) => assert!(msg.contains("aging_coeff")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

/// Writes a synthetic stream to a log file and returns its path.
fn record_log(dir: &std::path::Path, graph: &patina::graph::BaseGraph) -> std::path::PathBuf {
    let params = AgingParameters {
        aging_coefficient: 3.0,
        expansion_factor_vertices: 1.5,
        expansion_factor_edges: 1.5,
        num_writer_threads: 1,
        is_timestamp_ordered: true,
        ..AgingParameters::default()
    };
    let source = SyntheticWorkload::new(graph, &params).unwrap();
    let expected = source.expected_operations();
    let path = dir.join("aging.log");
    let header = LogHeader {
        aging_coeff: 3.0,
        ef_vertices: 1.5,
        ef_edges: 1.5,
        max_weight: 1.0,
        input_graph: "ring.el".to_string(),
        num_operations: Some(expected),
    };
    let mut writer = LogWriter::create(&path, &header).unwrap();
    let mut batch = Vec::new();
    loop {
        batch.clear();
        if source.claim(0, 256, &mut batch).unwrap() == 0 {
            break;
        }
        for op in &batch {
            writer.append(op).unwrap();
        }
    }
    assert_eq!(writer.finish().unwrap(), expected);
    path
}

fn replay(path: &std::path::Path, graph: &patina::graph::BaseGraph, writers: usize) -> (u64, u64) {
    let store = loaded_store(graph);
    let reader = LogReader::open(path).unwrap();
    let params = AgingParameters {
        aging_coefficient: reader.header().aging_coeff,
        expansion_factor_vertices: reader.header().ef_vertices,
        expansion_factor_edges: reader.header().ef_edges,
        max_weight: reader.header().max_weight,
        num_writer_threads: writers,
        worker_granularity: 32,
        is_timestamp_ordered: true,
        ..AgingParameters::default()
    };
    let source = Arc::new(LogReplay::new(reader, 0));
    let result = AgingExperiment::new(store, source, params).run().unwrap();
    assert!(!result.aborted());
    (result.num_vertices_final, result.num_edges_final)
}

/// Replaying the same timestamp-ordered log against two fresh stores yields
/// identical final counts.
#[test]
fn replay_is_idempotent_across_fresh_stores() {
    let dir = tempfile::tempdir().unwrap();
    let graph = ring(48);
    let path = record_log(dir.path(), &graph);

    let first = replay(&path, &graph, 1);
    let second = replay(&path, &graph, 1);
    assert_eq!(first, second);
    // The recorded stream restores the base edge set.
    assert_eq!(first.1, 48);
}

/// A multi-writer replay applies the complete stream.
#[test]
fn multi_writer_replay_applies_everything() {
    let dir = tempfile::tempdir().unwrap();
    let graph = ring(48);
    let path = record_log(dir.path(), &graph);

    let store = loaded_store(&graph);
    let reader = LogReader::open(&path).unwrap();
    let expected = reader.header().num_operations.unwrap();
    let params = AgingParameters {
        aging_coefficient: reader.header().aging_coeff,
        expansion_factor_vertices: reader.header().ef_vertices,
        expansion_factor_edges: reader.header().ef_edges,
        num_writer_threads: 3,
        worker_granularity: 8,
        ..AgingParameters::default()
    };
    let source = Arc::new(LogReplay::new(reader, 0));
    let result = AgingExperiment::new(store, source, params).run().unwrap();

    assert!(!result.aborted());
    assert_eq!(result.num_operations_total, expected);
}

#[test]
fn cli_mklog_then_replay_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("ring.el");
    let mut lines = String::new();
    for i in 0..24u64 {
        lines.push_str(&format!("{} {}\n", i, (i + 1) % 24));
    }
    std::fs::write(&graph_path, lines).unwrap();
    let log_path = dir.path().join("aging.log");
    let db_path = dir.path().join("results.sqlite3");

    Command::cargo_bin("patina")
        .unwrap()
        .args(["mklog", "--graph"])
        .arg(&graph_path)
        .args(["--aging", "2", "--output"])
        .arg(&log_path)
        .assert()
        .success();
    assert!(log_path.exists());

    Command::cargo_bin("patina")
        .unwrap()
        .args(["run", "--graph"])
        .arg(&graph_path)
        .args(["--log"])
        .arg(&log_path)
        .args(["--writers", "2", "--output"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicates::str::contains("Aging result"));
    assert!(db_path.exists());
}

#[test]
fn cli_rejects_mismatched_log_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("ring.el");
    let mut lines = String::new();
    for i in 0..16u64 {
        lines.push_str(&format!("{} {}\n", i, (i + 1) % 16));
    }
    std::fs::write(&graph_path, lines).unwrap();
    let log_path = dir.path().join("aging.log");

    Command::cargo_bin("patina")
        .unwrap()
        .args(["mklog", "--graph"])
        .arg(&graph_path)
        .args(["--aging", "2", "--output"])
        .arg(&log_path)
        .assert()
        .success();

    Command::cargo_bin("patina")
        .unwrap()
        .args(["run", "--graph"])
        .arg(&graph_path)
        .args(["--log"])
        .arg(&log_path)
        .args(["--aging", "5"]) // contradicts the header
        .assert()
        .failure()
        .stderr(predicates::str::contains("does not match"));
}
