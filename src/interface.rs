//! Capability interface every benchmarked store implements.
//!
//! Two independent roles, composed rather than inherited: [`MutationInterface`]
//! for updates and snapshot building, [`AnalyticsInterface`] for the read-only
//! algorithm suite. A concrete store implements both and is constructed
//! through a [`StoreRegistry`] keyed by name, so the harness never names a
//! store type directly.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::deadline::Deadline;
use crate::error::{DriverError, Result};
use crate::graph::{BaseGraph, Edge, VertexId, WeightedEdge};

/// Update role of a store.
///
/// All methods may be called concurrently from multiple writer threads; the
/// store is responsible for its own internal concurrency control. The one
/// exception is [`MutationInterface::build`]: the orchestrator serializes
/// build calls through a checkpoint lock it owns itself, so implementations
/// may assume no two builds overlap.
pub trait MutationInterface: Send + Sync {
    /// Number of vertices currently live.
    fn num_vertices(&self) -> u64;

    /// Number of edges currently live.
    fn num_edges(&self) -> u64;

    /// Whether the vertex is currently present.
    fn has_vertex(&self, vertex: VertexId) -> bool;

    /// Weight of the edge if present.
    fn edge_weight(&self, source: VertexId, destination: VertexId) -> Option<f64>;

    /// Inserts a vertex. Returns false if it was already present.
    fn add_vertex(&self, vertex: VertexId) -> Result<bool>;

    /// Removes a vertex and detaches all incident edges. Returns false if the
    /// vertex was absent.
    fn remove_vertex(&self, vertex: VertexId) -> Result<bool>;

    /// Inserts an edge. Returns false if either endpoint is missing or the
    /// edge already exists.
    fn add_edge(&self, edge: WeightedEdge) -> Result<bool>;

    /// Inserts an edge, implicitly creating missing endpoints. If the edge is
    /// already present its weight is refreshed and the call returns false;
    /// workers classify that outcome as an update.
    fn add_edge_and_create_vertices(&self, edge: WeightedEdge) -> Result<bool>;

    /// Removes an edge. Returns false if it was not present.
    fn remove_edge(&self, edge: Edge) -> Result<bool>;

    /// Creates a new immutable read snapshot. Must not run concurrently with
    /// another `build`; may run concurrently with mutations depending on the
    /// store's isolation level.
    fn build(&self) -> Result<()>;

    /// Number of snapshots the store has materialized so far, if it keeps
    /// count. Stores that do not track this return 0 and the orchestrator
    /// falls back to counting its own build invocations.
    fn num_snapshots(&self) -> u64 {
        0
    }
}

/// Read-only analytics role of a store.
///
/// Every operation executes against the latest built snapshot, never against
/// in-flight mutations, and is required to poll the given [`Deadline`] at
/// loop granularity, returning [`DriverError::Timeout`] once it expires.
/// If `output` is given, the operation writes a two-column
/// `external_vertex_id value` listing, one line per vertex, in a stable order.
pub trait AnalyticsInterface: Send + Sync {
    /// Breadth-first search from `source`, reporting hop distances.
    fn bfs(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()>;

    /// PageRank for a fixed number of iterations.
    fn pagerank(
        &self,
        num_iterations: u64,
        damping_factor: f64,
        deadline: &Deadline,
        output: Option<&Path>,
    ) -> Result<()>;

    /// Weakly connected components.
    fn wcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()>;

    /// Community detection through label propagation.
    fn cdlp(&self, max_iterations: u64, deadline: &Deadline, output: Option<&Path>) -> Result<()>;

    /// Local clustering coefficient.
    fn lcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()>;

    /// Single-source shortest paths from `source`.
    fn sssp(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()>;
}

/// A store usable by the aging experiment: both roles together.
pub trait GraphStore: MutationInterface + AnalyticsInterface {}

impl<T: MutationInterface + AnalyticsInterface> GraphStore for T {}

/// Opaque per-store tuning passed through the registry.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Whether edges are directed. The bundled reference store only supports
    /// undirected graphs.
    pub directed: bool,
    /// Store-specific block size knob; 0 means the store's default.
    pub block_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            directed: false,
            block_size: 0,
        }
    }
}

type StoreFactory = Box<dyn Fn(&StoreOptions) -> Result<Arc<dyn GraphStore>> + Send + Sync>;

/// Maps store names to constructors.
#[derive(Default)]
pub struct StoreRegistry {
    factories: FxHashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&StoreOptions) -> Result<Arc<dyn GraphStore>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Constructs the store registered under `name`.
    pub fn open(&self, name: &str, options: &StoreOptions) -> Result<Arc<dyn GraphStore>> {
        match self.factories.get(name) {
            Some(factory) => factory(options),
            None => Err(DriverError::Configuration(format!(
                "unknown store '{name}', available: {}",
                self.names().join(", ")
            ))),
        }
    }

    /// Sorted names of all registered stores.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Materializes a base graph into a store before an experiment starts.
///
/// Vertices are created first, then edges; an input edge that the store
/// rejects indicates a corrupt graph file and fails the load.
pub fn load_graph(store: &dyn MutationInterface, graph: &BaseGraph) -> Result<()> {
    for &vertex in graph.vertices() {
        store.add_vertex(vertex)?;
    }
    for &edge in graph.edges() {
        if !store.add_edge(edge)? {
            return Err(DriverError::Store(format!(
                "store rejected base edge {} -> {}",
                edge.source, edge.destination
            )));
        }
    }
    Ok(())
}

/// Writes the two-column `external_vertex_id value` listing produced by
/// analytics operations.
pub fn write_scores<V, I>(path: &Path, scores: I) -> Result<()>
where
    V: Display,
    I: IntoIterator<Item = (VertexId, V)>,
{
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    for (vertex, value) in scores {
        writeln!(out, "{vertex} {value}")?;
    }
    out.flush()?;
    Ok(())
}
