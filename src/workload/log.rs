//! Workload log files: a key/value property header followed by an ordered
//! operation stream.
//!
//! Logs decouple workload generation from execution: the same stream can be
//! replayed against different stores, which is what makes cross-store aging
//! numbers comparable. The header carries the parameters the stream was
//! generated with; explicit configuration must match them or be absent, a
//! mismatch is a configuration error rather than a silent override.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use parking_lot::Mutex;

use super::{Operation, WorkloadSource};
use crate::error::{DriverError, Result};
use crate::graph::{Edge, WeightedEdge};

const MAGIC: &str = "# patina workload log v1";

/// Properties a workload log was generated with.
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    /// Aging coefficient the stream was sized for.
    pub aging_coeff: f64,
    /// Vertex expansion factor.
    pub ef_vertices: f64,
    /// Edge expansion factor.
    pub ef_edges: f64,
    /// Largest weight the generator sampled.
    pub max_weight: f64,
    /// Path of the base graph the stream assumes is loaded.
    pub input_graph: String,
    /// Exact operation count, when the writer knew it.
    pub num_operations: Option<u64>,
}

/// Values the operator supplied explicitly, to be validated against a log
/// header. `None` means "absent from configuration": the header value wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitParams {
    /// Explicit aging coefficient, if any.
    pub aging_coefficient: Option<f64>,
    /// Explicit vertex expansion factor, if any.
    pub ef_vertices: Option<f64>,
    /// Explicit edge expansion factor, if any.
    pub ef_edges: Option<f64>,
    /// Explicit maximum weight, if any.
    pub max_weight: Option<f64>,
}

impl LogHeader {
    /// Checks every explicitly configured value against the header.
    pub fn check_explicit(&self, explicit: &ExplicitParams) -> Result<()> {
        check_match("aging_coeff", explicit.aging_coefficient, self.aging_coeff)?;
        check_match("ef_vertices", explicit.ef_vertices, self.ef_vertices)?;
        check_match("ef_edges", explicit.ef_edges, self.ef_edges)?;
        check_match("max_weight", explicit.max_weight, self.max_weight)?;
        Ok(())
    }
}

fn check_match(key: &str, explicit: Option<f64>, from_log: f64) -> Result<()> {
    if let Some(value) = explicit {
        // An aging coefficient of 0 is the "derive from log" sentinel.
        if key == "aging_coeff" && value == 0.0 {
            return Ok(());
        }
        if (value - from_log).abs() > 1e-9 {
            return Err(DriverError::Configuration(format!(
                "explicit {key} = {value} does not match the log header value {from_log}"
            )));
        }
    }
    Ok(())
}

/// Streaming writer for workload logs.
pub struct LogWriter {
    out: BufWriter<File>,
    written: u64,
}

impl LogWriter {
    /// Creates the log file and writes the property header.
    pub fn create(path: &Path, header: &LogHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{MAGIC}")?;
        writeln!(out, "aging_coeff = {}", header.aging_coeff)?;
        writeln!(out, "ef_vertices = {}", header.ef_vertices)?;
        writeln!(out, "ef_edges = {}", header.ef_edges)?;
        writeln!(out, "max_weight = {}", header.max_weight)?;
        writeln!(out, "input_graph = {}", header.input_graph)?;
        if let Some(count) = header.num_operations {
            writeln!(out, "num_operations = {count}")?;
        }
        writeln!(out)?;
        Ok(Self { out, written: 0 })
    }

    /// Appends one operation record.
    pub fn append(&mut self, op: &Operation) -> Result<()> {
        match op {
            Operation::InsertVertex(v) => writeln!(self.out, "av {v}")?,
            Operation::DeleteVertex(v) => writeln!(self.out, "dv {v}")?,
            Operation::InsertEdge(e) => {
                writeln!(self.out, "ae {} {} {}", e.source, e.destination, e.weight)?
            }
            Operation::DeleteEdge(e) => writeln!(self.out, "de {} {}", e.source, e.destination)?,
        }
        self.written += 1;
        Ok(())
    }

    /// Operations appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.written)
    }
}

/// Streaming reader for workload logs.
pub struct LogReader {
    header: LogHeader,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl LogReader {
    /// Opens the log and parses its header. Missing mandatory properties are
    /// a fatal configuration error, raised here, before any thread exists.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            DriverError::Configuration(format!(
                "cannot open workload log {}: {e}",
                path.display()
            ))
        })?;
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;

        let mut aging_coeff = None;
        let mut ef_vertices = None;
        let mut ef_edges = None;
        let mut max_weight = None;
        let mut input_graph = None;
        let mut num_operations = None;

        for line in lines.by_ref() {
            let line = line?;
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                DriverError::LogFormat(format!("line {line_no}: expected 'key = value'"))
            })?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "aging_coeff" => aging_coeff = Some(parse_f64(key, value, line_no)?),
                "ef_vertices" => ef_vertices = Some(parse_f64(key, value, line_no)?),
                "ef_edges" => ef_edges = Some(parse_f64(key, value, line_no)?),
                "max_weight" => max_weight = Some(parse_f64(key, value, line_no)?),
                "input_graph" => input_graph = Some(value.to_string()),
                "num_operations" => {
                    num_operations = Some(value.parse::<u64>().map_err(|_| {
                        DriverError::LogFormat(format!(
                            "line {line_no}: invalid num_operations '{value}'"
                        ))
                    })?)
                }
                _ => {} // unknown properties are carried by newer writers
            }
        }

        let header = LogHeader {
            aging_coeff: mandatory(aging_coeff, "aging_coeff", path)?,
            ef_vertices: mandatory(ef_vertices, "ef_vertices", path)?,
            ef_edges: mandatory(ef_edges, "ef_edges", path)?,
            max_weight: mandatory(max_weight, "max_weight", path)?,
            input_graph: mandatory(input_graph, "input_graph", path)?,
            num_operations,
        };
        Ok(Self {
            header,
            lines,
            line_no,
        })
    }

    /// The parsed property header.
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Reads the next operation, `None` at end of stream.
    pub fn next_op(&mut self) -> Result<Option<Operation>> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return parse_op(line, self.line_no).map(Some);
        }
        Ok(None)
    }
}

fn mandatory<T>(value: Option<T>, key: &str, path: &Path) -> Result<T> {
    value.ok_or_else(|| {
        DriverError::Configuration(format!(
            "workload log {} is missing the mandatory property '{key}'",
            path.display()
        ))
    })
}

fn parse_f64(key: &str, value: &str, line_no: usize) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        DriverError::LogFormat(format!("line {line_no}: invalid {key} '{value}'"))
    })
}

fn parse_op(line: &str, line_no: usize) -> Result<Operation> {
    let mut fields = line.split_whitespace();
    let tag = fields.next().unwrap_or_default();
    let mut next_u64 = |what: &str| -> Result<u64> {
        fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| DriverError::LogFormat(format!("line {line_no}: missing {what}")))
    };
    match tag {
        "av" => Ok(Operation::InsertVertex(next_u64("vertex")?)),
        "dv" => Ok(Operation::DeleteVertex(next_u64("vertex")?)),
        "ae" => {
            let source = next_u64("source")?;
            let destination = next_u64("destination")?;
            let weight = fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| {
                    DriverError::LogFormat(format!("line {line_no}: missing weight"))
                })?;
            Ok(Operation::InsertEdge(WeightedEdge::new(
                source,
                destination,
                weight,
            )))
        }
        "de" => {
            let source = next_u64("source")?;
            let destination = next_u64("destination")?;
            Ok(Operation::DeleteEdge(Edge::new(source, destination)))
        }
        other => Err(DriverError::LogFormat(format!(
            "line {line_no}: unknown operation '{other}'"
        ))),
    }
}

/// Replays a log as a [`WorkloadSource`].
///
/// The stream is shared: workers claim consecutive batches under a mutex, so
/// batch boundaries follow claim order while per-batch contents keep the
/// recorded order. With `is_timestamp_ordered` the recorded order is already
/// the externally observed timestamp order and is preserved exactly; without
/// it, reordering would be permitted but replay keeps input order anyway,
/// which trivially preserves the degree distribution.
pub struct LogReplay {
    reader: Mutex<LogReader>,
    expected: u64,
}

impl LogReplay {
    /// Wraps an open reader. `expected_fallback` is used for throughput
    /// checkpointing when the header does not carry an exact count.
    pub fn new(reader: LogReader, expected_fallback: u64) -> Self {
        let expected = reader.header().num_operations.unwrap_or(expected_fallback);
        Self {
            reader: Mutex::new(reader),
            expected,
        }
    }
}

impl WorkloadSource for LogReplay {
    fn expected_operations(&self) -> u64 {
        self.expected
    }

    fn claim(&self, _worker: usize, max_ops: usize, out: &mut Vec<Operation>) -> Result<usize> {
        let mut reader = self.reader.lock();
        let mut claimed = 0;
        while claimed < max_ops {
            match reader.next_op()? {
                Some(op) => {
                    out.push(op);
                    claimed += 1;
                }
                None => break,
            }
        }
        Ok(claimed)
    }
}
