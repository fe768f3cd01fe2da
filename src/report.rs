//! Result persistence.
//!
//! The aggregator itself performs no I/O: [`crate::aging::AgingResult::save`]
//! drives a [`ResultSink`], which receives a flat key/value parameter table
//! plus the four sub-tables (intermediate throughput, per-second progress,
//! memory footprint, latency summaries). Two sinks ship: SQLite for queries
//! across runs and CSV for quick plotting; [`MemorySink`] collects rows in
//! memory for assertions.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::{DriverError, Result};
use crate::latency::LatencySummary;
use crate::monitor::MemorySample;

/// Receiver for one experiment's result record.
pub trait ResultSink {
    /// One entry of the flat parameter table.
    fn parameter(&mut self, key: &str, value: &str) -> Result<()>;

    /// One intermediate-throughput checkpoint (1-based index, cumulative
    /// completion microseconds).
    fn throughput_entry(&mut self, checkpoint: u64, completion_micros: u64) -> Result<()>;

    /// Cumulative applied-operation count at one whole second.
    fn progress_entry(&mut self, second: u64, num_operations: u64) -> Result<()>;

    /// One memory-footprint sample.
    fn memory_entry(&mut self, sample: &MemorySample) -> Result<()>;

    /// One latency summary row.
    fn latency_entry(&mut self, summary: &LatencySummary) -> Result<()>;

    /// Completes the record.
    fn flush(&mut self) -> Result<()>;
}

/// SQLite-backed sink; one database may accumulate several runs, each insert
/// is tagged with the run id handed out at open.
pub struct SqliteSink {
    conn: Connection,
    run_id: i64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS experiment (
    run_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS intermediate_throughput (
    run_id INTEGER NOT NULL,
    checkpoint INTEGER NOT NULL,
    completion_micros INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS progress (
    run_id INTEGER NOT NULL,
    second INTEGER NOT NULL,
    num_operations INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS memory_footprint (
    run_id INTEGER NOT NULL,
    tick INTEGER NOT NULL,
    process_bytes INTEGER NOT NULL,
    driver_bytes INTEGER NOT NULL,
    cooloff INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS latencies (
    run_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    count INTEGER NOT NULL,
    mean REAL NOT NULL,
    median REAL NOT NULL,
    stddev REAL NOT NULL,
    p90 REAL NOT NULL,
    p95 REAL NOT NULL,
    p97 REAL NOT NULL,
    p99 REAL NOT NULL
);
";

impl SqliteSink {
    /// Opens (or creates) the result database and registers a new run.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute("INSERT INTO runs DEFAULT VALUES", [])?;
        let run_id = conn.last_insert_rowid();
        Ok(Self { conn, run_id })
    }

    /// The run identifier rows of this sink are tagged with.
    pub fn run_id(&self) -> i64 {
        self.run_id
    }
}

impl ResultSink for SqliteSink {
    fn parameter(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO experiment (run_id, key, value) VALUES (?1, ?2, ?3)",
            params![self.run_id, key, value],
        )?;
        Ok(())
    }

    fn throughput_entry(&mut self, checkpoint: u64, completion_micros: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO intermediate_throughput (run_id, checkpoint, completion_micros)
             VALUES (?1, ?2, ?3)",
            params![self.run_id, checkpoint as i64, completion_micros as i64],
        )?;
        Ok(())
    }

    fn progress_entry(&mut self, second: u64, num_operations: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO progress (run_id, second, num_operations) VALUES (?1, ?2, ?3)",
            params![self.run_id, second as i64, num_operations as i64],
        )?;
        Ok(())
    }

    fn memory_entry(&mut self, sample: &MemorySample) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memory_footprint (run_id, tick, process_bytes, driver_bytes, cooloff)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.run_id,
                sample.tick as i64,
                sample.process_bytes as i64,
                sample.driver_bytes as i64,
                i64::from(sample.is_cooloff)
            ],
        )?;
        Ok(())
    }

    fn latency_entry(&mut self, summary: &LatencySummary) -> Result<()> {
        self.conn.execute(
            "INSERT INTO latencies
             (run_id, label, count, mean, median, stddev, p90, p95, p97, p99)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.run_id,
                summary.label,
                summary.count as i64,
                summary.mean,
                summary.median,
                summary.stddev,
                summary.p90,
                summary.p95,
                summary.p97,
                summary.p99
            ],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// CSV sink writing one file per table into a directory.
pub struct CsvSink {
    parameters: csv::Writer<fs::File>,
    throughput: csv::Writer<fs::File>,
    progress: csv::Writer<fs::File>,
    memory: csv::Writer<fs::File>,
    latencies: csv::Writer<fs::File>,
}

impl CsvSink {
    /// Creates the directory (if needed) and the five CSV files with their
    /// header rows.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let open = |name: &str, header: &[&str]| -> Result<csv::Writer<fs::File>> {
            let mut writer = csv::Writer::from_path(dir.join(name))
                .map_err(|e| DriverError::Persistence(e.to_string()))?;
            writer.write_record(header)?;
            Ok(writer)
        };
        Ok(Self {
            parameters: open("experiment.csv", &["key", "value"])?,
            throughput: open(
                "intermediate_throughput.csv",
                &["checkpoint", "completion_micros"],
            )?,
            progress: open("progress.csv", &["second", "num_operations"])?,
            memory: open(
                "memory_footprint.csv",
                &["tick", "process_bytes", "driver_bytes", "cooloff"],
            )?,
            latencies: open(
                "latencies.csv",
                &[
                    "label", "count", "mean", "median", "stddev", "p90", "p95", "p97", "p99",
                ],
            )?,
        })
    }
}

impl ResultSink for CsvSink {
    fn parameter(&mut self, key: &str, value: &str) -> Result<()> {
        self.parameters.write_record([key, value])?;
        Ok(())
    }

    fn throughput_entry(&mut self, checkpoint: u64, completion_micros: u64) -> Result<()> {
        self.throughput
            .write_record([checkpoint.to_string(), completion_micros.to_string()])?;
        Ok(())
    }

    fn progress_entry(&mut self, second: u64, num_operations: u64) -> Result<()> {
        self.progress
            .write_record([second.to_string(), num_operations.to_string()])?;
        Ok(())
    }

    fn memory_entry(&mut self, sample: &MemorySample) -> Result<()> {
        self.memory.write_record([
            sample.tick.to_string(),
            sample.process_bytes.to_string(),
            sample.driver_bytes.to_string(),
            u8::from(sample.is_cooloff).to_string(),
        ])?;
        Ok(())
    }

    fn latency_entry(&mut self, summary: &LatencySummary) -> Result<()> {
        self.latencies.write_record([
            summary.label.to_string(),
            summary.count.to_string(),
            summary.mean.to_string(),
            summary.median.to_string(),
            summary.stddev.to_string(),
            summary.p90.to_string(),
            summary.p95.to_string(),
            summary.p97.to_string(),
            summary.p99.to_string(),
        ])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.parameters.flush()?;
        self.throughput.flush()?;
        self.progress.flush()?;
        self.memory.flush()?;
        self.latencies.flush()?;
        Ok(())
    }
}

/// In-memory sink for tests and summaries.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Flat parameter rows in insertion order.
    pub parameters: Vec<(String, String)>,
    /// Throughput rows.
    pub throughput: Vec<(u64, u64)>,
    /// Progress rows.
    pub progress: Vec<(u64, u64)>,
    /// Memory rows.
    pub memory: Vec<MemorySample>,
    /// Labels of the latency rows received, in order.
    pub latency_labels: Vec<&'static str>,
    /// Whether `flush` ran.
    pub flushed: bool,
}

impl ResultSink for MemorySink {
    fn parameter(&mut self, key: &str, value: &str) -> Result<()> {
        self.parameters.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn throughput_entry(&mut self, checkpoint: u64, completion_micros: u64) -> Result<()> {
        self.throughput.push((checkpoint, completion_micros));
        Ok(())
    }

    fn progress_entry(&mut self, second: u64, num_operations: u64) -> Result<()> {
        self.progress.push((second, num_operations));
        Ok(())
    }

    fn memory_entry(&mut self, sample: &MemorySample) -> Result<()> {
        self.memory.push(*sample);
        Ok(())
    }

    fn latency_entry(&mut self, summary: &LatencySummary) -> Result<()> {
        self.latency_labels.push(summary.label);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

impl MemorySink {
    /// Looks up a flat parameter by key.
    pub fn parameter_value(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
