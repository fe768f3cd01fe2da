//! Shared fixtures for the integration suites: ring graphs and store
//! wrappers that throttle, block or time out on purpose.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use patina::deadline::Deadline;
use patina::error::{DriverError, Result};
use patina::graph::{BaseGraph, Edge, VertexId, WeightedEdge};
use patina::interface::{load_graph, AnalyticsInterface, GraphStore, MutationInterface, StoreOptions};
use patina::stores::MemoryStore;

/// A ring with `n` vertices and `n` edges, so `|V0| == |E0|`.
pub fn ring(n: u64) -> BaseGraph {
    BaseGraph::from_edges((0..n).map(|i| WeightedEdge::new(i, (i + 1) % n, 1.0))).unwrap()
}

/// A loaded memory store holding `graph`.
pub fn loaded_store(graph: &BaseGraph) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(&StoreOptions::default()).unwrap());
    load_graph(store.as_ref(), graph).unwrap();
    store
}

/// Delegating store that sleeps inside every mutation, stretching runs to a
/// controllable wall-clock length.
pub struct ThrottledStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

impl ThrottledStore {
    pub fn new(inner: Arc<MemoryStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    fn throttle(&self) {
        std::thread::sleep(self.delay);
    }
}

impl MutationInterface for ThrottledStore {
    fn num_vertices(&self) -> u64 {
        self.inner.num_vertices()
    }
    fn num_edges(&self) -> u64 {
        self.inner.num_edges()
    }
    fn has_vertex(&self, vertex: VertexId) -> bool {
        self.inner.has_vertex(vertex)
    }
    fn edge_weight(&self, source: VertexId, destination: VertexId) -> Option<f64> {
        self.inner.edge_weight(source, destination)
    }
    fn add_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.throttle();
        self.inner.add_vertex(vertex)
    }
    fn remove_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.throttle();
        self.inner.remove_vertex(vertex)
    }
    fn add_edge(&self, edge: WeightedEdge) -> Result<bool> {
        self.throttle();
        self.inner.add_edge(edge)
    }
    fn add_edge_and_create_vertices(&self, edge: WeightedEdge) -> Result<bool> {
        self.throttle();
        self.inner.add_edge_and_create_vertices(edge)
    }
    fn remove_edge(&self, edge: Edge) -> Result<bool> {
        self.throttle();
        self.inner.remove_edge(edge)
    }
    fn build(&self) -> Result<()> {
        self.inner.build()
    }
    fn num_snapshots(&self) -> u64 {
        self.inner.num_snapshots()
    }
}

impl AnalyticsInterface for ThrottledStore {
    fn bfs(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.bfs(source, deadline, output)
    }
    fn pagerank(
        &self,
        num_iterations: u64,
        damping_factor: f64,
        deadline: &Deadline,
        output: Option<&Path>,
    ) -> Result<()> {
        self.inner
            .pagerank(num_iterations, damping_factor, deadline, output)
    }
    fn wcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.wcc(deadline, output)
    }
    fn cdlp(&self, max_iterations: u64, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.cdlp(max_iterations, deadline, output)
    }
    fn lcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.lcc(deadline, output)
    }
    fn sssp(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.sssp(source, deadline, output)
    }
}

/// Delegating store whose mutations hang forever once `block_after`
/// operations have been applied, simulating a wedged engine.
pub struct BlockingStore {
    inner: Arc<MemoryStore>,
    applied: AtomicU64,
    block_after: u64,
}

impl BlockingStore {
    pub fn new(inner: Arc<MemoryStore>, block_after: u64) -> Self {
        Self {
            inner,
            applied: AtomicU64::new(0),
            block_after,
        }
    }

    fn gate(&self) {
        if self.applied.fetch_add(1, Ordering::Relaxed) >= self.block_after {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
    }
}

impl MutationInterface for BlockingStore {
    fn num_vertices(&self) -> u64 {
        self.inner.num_vertices()
    }
    fn num_edges(&self) -> u64 {
        self.inner.num_edges()
    }
    fn has_vertex(&self, vertex: VertexId) -> bool {
        self.inner.has_vertex(vertex)
    }
    fn edge_weight(&self, source: VertexId, destination: VertexId) -> Option<f64> {
        self.inner.edge_weight(source, destination)
    }
    fn add_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.gate();
        self.inner.add_vertex(vertex)
    }
    fn remove_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.gate();
        self.inner.remove_vertex(vertex)
    }
    fn add_edge(&self, edge: WeightedEdge) -> Result<bool> {
        self.gate();
        self.inner.add_edge(edge)
    }
    fn add_edge_and_create_vertices(&self, edge: WeightedEdge) -> Result<bool> {
        self.gate();
        self.inner.add_edge_and_create_vertices(edge)
    }
    fn remove_edge(&self, edge: Edge) -> Result<bool> {
        self.gate();
        self.inner.remove_edge(edge)
    }
    fn build(&self) -> Result<()> {
        self.inner.build()
    }
    fn num_snapshots(&self) -> u64 {
        self.inner.num_snapshots()
    }
}

impl AnalyticsInterface for BlockingStore {
    fn bfs(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.bfs(source, deadline, output)
    }
    fn pagerank(
        &self,
        num_iterations: u64,
        damping_factor: f64,
        deadline: &Deadline,
        output: Option<&Path>,
    ) -> Result<()> {
        self.inner
            .pagerank(num_iterations, damping_factor, deadline, output)
    }
    fn wcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.wcc(deadline, output)
    }
    fn cdlp(&self, max_iterations: u64, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.cdlp(max_iterations, deadline, output)
    }
    fn lcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.lcc(deadline, output)
    }
    fn sssp(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        self.inner.sssp(source, deadline, output)
    }
}

/// Delegating store whose analytics calls always report a deadline expiry,
/// for checking that reader timeouts are tolerated.
pub struct TimingOutStore {
    inner: Arc<MemoryStore>,
}

impl TimingOutStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }

    fn expired(&self, deadline: &Deadline) -> DriverError {
        DriverError::Timeout {
            budget: deadline.budget(),
        }
    }
}

impl MutationInterface for TimingOutStore {
    fn num_vertices(&self) -> u64 {
        self.inner.num_vertices()
    }
    fn num_edges(&self) -> u64 {
        self.inner.num_edges()
    }
    fn has_vertex(&self, vertex: VertexId) -> bool {
        self.inner.has_vertex(vertex)
    }
    fn edge_weight(&self, source: VertexId, destination: VertexId) -> Option<f64> {
        self.inner.edge_weight(source, destination)
    }
    fn add_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.inner.add_vertex(vertex)
    }
    fn remove_vertex(&self, vertex: VertexId) -> Result<bool> {
        self.inner.remove_vertex(vertex)
    }
    fn add_edge(&self, edge: WeightedEdge) -> Result<bool> {
        self.inner.add_edge(edge)
    }
    fn add_edge_and_create_vertices(&self, edge: WeightedEdge) -> Result<bool> {
        self.inner.add_edge_and_create_vertices(edge)
    }
    fn remove_edge(&self, edge: Edge) -> Result<bool> {
        self.inner.remove_edge(edge)
    }
    fn build(&self) -> Result<()> {
        self.inner.build()
    }
    fn num_snapshots(&self) -> u64 {
        self.inner.num_snapshots()
    }
}

impl AnalyticsInterface for TimingOutStore {
    fn bfs(&self, _source: VertexId, deadline: &Deadline, _output: Option<&Path>) -> Result<()> {
        Err(self.expired(deadline))
    }
    fn pagerank(
        &self,
        _num_iterations: u64,
        _damping_factor: f64,
        deadline: &Deadline,
        _output: Option<&Path>,
    ) -> Result<()> {
        Err(self.expired(deadline))
    }
    fn wcc(&self, deadline: &Deadline, _output: Option<&Path>) -> Result<()> {
        Err(self.expired(deadline))
    }
    fn cdlp(
        &self,
        _max_iterations: u64,
        deadline: &Deadline,
        _output: Option<&Path>,
    ) -> Result<()> {
        Err(self.expired(deadline))
    }
    fn lcc(&self, deadline: &Deadline, _output: Option<&Path>) -> Result<()> {
        Err(self.expired(deadline))
    }
    fn sssp(&self, _source: VertexId, deadline: &Deadline, _output: Option<&Path>) -> Result<()> {
        Err(self.expired(deadline))
    }
}

/// Wraps a store and loads `graph` into it.
pub fn wrap_loaded<S, F>(graph: &BaseGraph, wrap: F) -> Arc<dyn GraphStore>
where
    S: GraphStore + 'static,
    F: FnOnce(Arc<MemoryStore>) -> S,
{
    let inner = loaded_store(graph);
    Arc::new(wrap(inner))
}
