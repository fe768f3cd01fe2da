//! External graph model: vertex identifiers, edges and the loaded base graph.
//!
//! The harness only ever speaks external 64-bit vertex identifiers. Stores may
//! keep a dense logical numbering privately; nothing here assumes density or
//! contiguity of the identifier space.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{DriverError, Result};

/// External vertex identifier, opaque to the harness.
pub type VertexId = u64;

/// An unweighted edge, used for deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Source endpoint.
    pub source: VertexId,
    /// Destination endpoint.
    pub destination: VertexId,
}

impl Edge {
    /// Creates an edge between two external vertex identifiers.
    pub fn new(source: VertexId, destination: VertexId) -> Self {
        Self { source, destination }
    }

    /// Returns the endpoints with the smaller identifier first.
    ///
    /// Undirected stores treat `(a, b)` and `(b, a)` as the same edge; the
    /// canonical form is what dedup sets key on.
    pub fn canonical(&self) -> (VertexId, VertexId) {
        if self.source <= self.destination {
            (self.source, self.destination)
        } else {
            (self.destination, self.source)
        }
    }
}

/// A weighted edge, used for insertions and weight refreshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedEdge {
    /// Source endpoint.
    pub source: VertexId,
    /// Destination endpoint.
    pub destination: VertexId,
    /// Finite edge weight.
    pub weight: f64,
}

impl WeightedEdge {
    /// Creates a weighted edge between two external vertex identifiers.
    pub fn new(source: VertexId, destination: VertexId, weight: f64) -> Self {
        Self {
            source,
            destination,
            weight,
        }
    }

    /// Drops the weight, keeping the endpoints.
    pub fn unweighted(&self) -> Edge {
        Edge::new(self.source, self.destination)
    }

    /// Returns the endpoints with the smaller identifier first.
    pub fn canonical(&self) -> (VertexId, VertexId) {
        self.unweighted().canonical()
    }
}

/// The base graph an experiment starts from, kept as plain edge and vertex
/// lists plus a degree table for weighted endpoint sampling.
#[derive(Debug, Clone, Default)]
pub struct BaseGraph {
    vertices: Vec<VertexId>,
    degrees: Vec<u64>,
    edges: Vec<WeightedEdge>,
    max_vertex_id: VertexId,
}

impl BaseGraph {
    /// Builds a graph from an explicit edge list.
    ///
    /// Edges are interpreted as undirected: reciprocal duplicates collapse to
    /// a single edge, keeping the first weight seen. Self-loops are rejected.
    pub fn from_edges(edges: impl IntoIterator<Item = WeightedEdge>) -> Result<Self> {
        let mut dedup: FxHashMap<(VertexId, VertexId), f64> = FxHashMap::default();
        for edge in edges {
            if edge.source == edge.destination {
                return Err(DriverError::Configuration(format!(
                    "self-loop on vertex {} in the input graph",
                    edge.source
                )));
            }
            if !edge.weight.is_finite() {
                return Err(DriverError::Configuration(format!(
                    "non-finite weight on edge {} -> {}",
                    edge.source, edge.destination
                )));
            }
            dedup.entry(edge.canonical()).or_insert(edge.weight);
        }

        let mut degree_map: FxHashMap<VertexId, u64> = FxHashMap::default();
        let mut edges: Vec<WeightedEdge> = dedup
            .into_iter()
            .map(|((source, destination), weight)| WeightedEdge::new(source, destination, weight))
            .collect();
        // Canonical order keeps partitioning deterministic across runs.
        edges.sort_by_key(|e| (e.source, e.destination));
        for edge in &edges {
            *degree_map.entry(edge.source).or_insert(0) += 1;
            *degree_map.entry(edge.destination).or_insert(0) += 1;
        }

        let mut vertices: Vec<VertexId> = degree_map.keys().copied().collect();
        vertices.sort_unstable();
        let degrees = vertices.iter().map(|v| degree_map[v]).collect();
        let max_vertex_id = vertices.last().copied().unwrap_or(0);

        Ok(Self {
            vertices,
            degrees,
            edges,
            max_vertex_id,
        })
    }

    /// Loads a whitespace-separated edge list: `source destination [weight]`,
    /// one edge per line. Empty lines and lines starting with `#` or `%` are
    /// skipped. A missing weight defaults to `1.0`.
    pub fn from_edge_list(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            DriverError::Configuration(format!("cannot open graph file {}: {e}", path.display()))
        })?;
        let reader = BufReader::new(file);
        let mut edges = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let source = parse_field(fields.next(), path, line_no, "source")?;
            let destination = parse_field(fields.next(), path, line_no, "destination")?;
            let weight = match fields.next() {
                Some(raw) => raw.parse::<f64>().map_err(|_| {
                    DriverError::Configuration(format!(
                        "{}:{}: invalid weight '{raw}'",
                        path.display(),
                        line_no + 1
                    ))
                })?,
                None => 1.0,
            };
            edges.push(WeightedEdge::new(source, destination, weight));
        }
        Self::from_edges(edges)
    }

    /// Number of distinct vertices.
    pub fn num_vertices(&self) -> u64 {
        self.vertices.len() as u64
    }

    /// Number of distinct undirected edges.
    pub fn num_edges(&self) -> u64 {
        self.edges.len() as u64
    }

    /// Largest external vertex identifier present in the graph.
    pub fn max_vertex_id(&self) -> VertexId {
        self.max_vertex_id
    }

    /// The sorted vertex list.
    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Degrees aligned with [`BaseGraph::vertices`].
    pub fn degrees(&self) -> &[u64] {
        &self.degrees
    }

    /// The deduplicated edge list in canonical order.
    pub fn edges(&self) -> &[WeightedEdge] {
        &self.edges
    }
}

fn parse_field(
    raw: Option<&str>,
    path: &Path,
    line_no: usize,
    what: &str,
) -> Result<VertexId> {
    let raw = raw.ok_or_else(|| {
        DriverError::Configuration(format!(
            "{}:{}: missing {what} vertex",
            path.display(),
            line_no + 1
        ))
    })?;
    raw.parse::<VertexId>().map_err(|_| {
        DriverError::Configuration(format!(
            "{}:{}: invalid {what} vertex '{raw}'",
            path.display(),
            line_no + 1
        ))
    })
}
