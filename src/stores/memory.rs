//! Reference in-memory store adapter.
//!
//! A hash-map adjacency structure under a single reader/writer lock, with an
//! immutable dense-id snapshot materialized by `build()`. It exists so the
//! harness has a conformant store to test and calibrate against; it is not a
//! competitive engine. External identifiers are mapped to dense internal
//! indices only inside the snapshot, and that numbering never leaks out.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::analytics;
use crate::deadline::Deadline;
use crate::error::{DriverError, Result};
use crate::graph::{Edge, VertexId, WeightedEdge};
use crate::interface::{write_scores, AnalyticsInterface, MutationInterface, StoreOptions};

/// Undirected in-memory graph store.
pub struct MemoryStore {
    live: RwLock<LiveGraph>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    snapshots_built: AtomicU64,
}

#[derive(Default)]
struct LiveGraph {
    adjacency: FxHashMap<VertexId, FxHashMap<VertexId, f64>>,
    num_edges: u64,
}

impl MemoryStore {
    /// Creates an empty store. The block-size knob is accepted and ignored;
    /// directed graphs are not supported.
    pub fn new(options: &StoreOptions) -> Result<Self> {
        if options.directed {
            return Err(DriverError::Configuration(
                "the memory store supports undirected graphs only".to_string(),
            ));
        }
        Ok(Self {
            live: RwLock::new(LiveGraph::default()),
            snapshot: RwLock::new(None),
            snapshots_built: AtomicU64::new(0),
        })
    }

    /// The latest built snapshot, or an ad hoc materialization when nothing
    /// was built yet.
    pub(crate) fn current_snapshot(&self) -> Arc<Snapshot> {
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Arc::clone(snapshot);
        }
        Arc::new(Snapshot::materialize(&self.live.read()))
    }
}

impl MutationInterface for MemoryStore {
    fn num_vertices(&self) -> u64 {
        self.live.read().adjacency.len() as u64
    }

    fn num_edges(&self) -> u64 {
        self.live.read().num_edges
    }

    fn has_vertex(&self, vertex: VertexId) -> bool {
        self.live.read().adjacency.contains_key(&vertex)
    }

    fn edge_weight(&self, source: VertexId, destination: VertexId) -> Option<f64> {
        self.live
            .read()
            .adjacency
            .get(&source)
            .and_then(|neighbors| neighbors.get(&destination))
            .copied()
    }

    fn add_vertex(&self, vertex: VertexId) -> Result<bool> {
        let mut live = self.live.write();
        if live.adjacency.contains_key(&vertex) {
            return Ok(false);
        }
        live.adjacency.insert(vertex, FxHashMap::default());
        Ok(true)
    }

    fn remove_vertex(&self, vertex: VertexId) -> Result<bool> {
        let mut live = self.live.write();
        let Some(neighbors) = live.adjacency.remove(&vertex) else {
            return Ok(false);
        };
        let detached = neighbors.len() as u64;
        for neighbor in neighbors.keys() {
            if let Some(reciprocal) = live.adjacency.get_mut(neighbor) {
                reciprocal.remove(&vertex);
            }
        }
        live.num_edges -= detached;
        Ok(true)
    }

    fn add_edge(&self, edge: WeightedEdge) -> Result<bool> {
        if edge.source == edge.destination {
            return Ok(false);
        }
        let mut live = self.live.write();
        match live.adjacency.get(&edge.source) {
            // An existing edge is left untouched; only the implicit-create
            // variant refreshes weights.
            Some(neighbors) if neighbors.contains_key(&edge.destination) => return Ok(false),
            Some(_) => {}
            None => return Ok(false),
        }
        if !live.adjacency.contains_key(&edge.destination) {
            return Ok(false);
        }
        insert_undirected(&mut live, edge)
    }

    fn add_edge_and_create_vertices(&self, edge: WeightedEdge) -> Result<bool> {
        if edge.source == edge.destination {
            return Ok(false);
        }
        let mut live = self.live.write();
        live.adjacency.entry(edge.source).or_default();
        live.adjacency.entry(edge.destination).or_default();
        insert_undirected(&mut live, edge)
    }

    fn remove_edge(&self, edge: Edge) -> Result<bool> {
        let mut live = self.live.write();
        let removed = match live.adjacency.get_mut(&edge.source) {
            Some(neighbors) => neighbors.remove(&edge.destination).is_some(),
            None => false,
        };
        if removed {
            if let Some(reciprocal) = live.adjacency.get_mut(&edge.destination) {
                reciprocal.remove(&edge.source);
            }
            live.num_edges -= 1;
        }
        Ok(removed)
    }

    fn build(&self) -> Result<()> {
        let snapshot = Arc::new(Snapshot::materialize(&self.live.read()));
        *self.snapshot.write() = Some(snapshot);
        self.snapshots_built.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn num_snapshots(&self) -> u64 {
        self.snapshots_built.load(Ordering::Relaxed)
    }
}

/// Inserts or refreshes an undirected edge; endpoints must exist.
fn insert_undirected(live: &mut LiveGraph, edge: WeightedEdge) -> Result<bool> {
    let existed = live
        .adjacency
        .get_mut(&edge.source)
        .map(|n| n.insert(edge.destination, edge.weight).is_some())
        .unwrap_or(false);
    if let Some(reciprocal) = live.adjacency.get_mut(&edge.destination) {
        reciprocal.insert(edge.source, edge.weight);
    }
    if !existed {
        live.num_edges += 1;
    }
    Ok(!existed)
}

impl AnalyticsInterface for MemoryStore {
    fn bfs(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        let snapshot = self.current_snapshot();
        let distances = analytics::bfs(&snapshot, source, deadline)?;
        dump(&snapshot, output, distances)
    }

    fn pagerank(
        &self,
        num_iterations: u64,
        damping_factor: f64,
        deadline: &Deadline,
        output: Option<&Path>,
    ) -> Result<()> {
        let snapshot = self.current_snapshot();
        let scores = analytics::pagerank(&snapshot, num_iterations, damping_factor, deadline)?;
        dump(&snapshot, output, scores)
    }

    fn wcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        let snapshot = self.current_snapshot();
        let components = analytics::wcc(&snapshot, deadline)?;
        dump(&snapshot, output, components)
    }

    fn cdlp(&self, max_iterations: u64, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        let snapshot = self.current_snapshot();
        let labels = analytics::cdlp(&snapshot, max_iterations, deadline)?;
        dump(&snapshot, output, labels)
    }

    fn lcc(&self, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        let snapshot = self.current_snapshot();
        let coefficients = analytics::lcc(&snapshot, deadline)?;
        dump(&snapshot, output, coefficients)
    }

    fn sssp(&self, source: VertexId, deadline: &Deadline, output: Option<&Path>) -> Result<()> {
        let snapshot = self.current_snapshot();
        let distances = analytics::sssp(&snapshot, source, deadline)?;
        dump(&snapshot, output, distances)
    }
}

fn dump<V: std::fmt::Display>(
    snapshot: &Snapshot,
    output: Option<&Path>,
    values: Vec<V>,
) -> Result<()> {
    match output {
        Some(path) => write_scores(
            path,
            snapshot.vertex_ids().iter().copied().zip(values),
        ),
        None => Ok(()),
    }
}

/// Neighbor row keyed by dense internal index; most vertices in aged graphs
/// stay low-degree, so short rows avoid a heap allocation.
type NeighborRow = SmallVec<[(u32, f64); 4]>;

/// Immutable point-in-time read view with dense internal indices.
pub(crate) struct Snapshot {
    vertex_ids: Vec<VertexId>,
    adjacency: Vec<NeighborRow>,
    num_edges: u64,
}

impl Snapshot {
    fn materialize(live: &LiveGraph) -> Self {
        let mut vertex_ids: Vec<VertexId> = live.adjacency.keys().copied().collect();
        vertex_ids.sort_unstable();
        let index: FxHashMap<VertexId, u32> = vertex_ids
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i as u32))
            .collect();
        let mut adjacency = Vec::with_capacity(vertex_ids.len());
        for vertex in &vertex_ids {
            let mut row: NeighborRow = live.adjacency[vertex]
                .iter()
                .map(|(neighbor, &weight)| (index[neighbor], weight))
                .collect();
            row.sort_unstable_by_key(|&(idx, _)| idx);
            adjacency.push(row);
        }
        Self {
            vertex_ids,
            adjacency,
            num_edges: live.num_edges,
        }
    }

    pub(crate) fn num_vertices(&self) -> usize {
        self.vertex_ids.len()
    }

    pub(crate) fn num_edges(&self) -> u64 {
        self.num_edges
    }

    pub(crate) fn vertex_ids(&self) -> &[VertexId] {
        &self.vertex_ids
    }

    pub(crate) fn external_id(&self, idx: usize) -> VertexId {
        self.vertex_ids[idx]
    }

    pub(crate) fn index_of(&self, vertex: VertexId) -> Option<usize> {
        self.vertex_ids.binary_search(&vertex).ok()
    }

    /// Sorted `(internal index, weight)` neighbor row.
    pub(crate) fn neighbors(&self, idx: usize) -> &[(u32, f64)] {
        &self.adjacency[idx]
    }
}
