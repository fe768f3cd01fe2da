//! Mutation workload generation.
//!
//! A workload is a lazy, finite, non-restartable stream of mutation records.
//! Two sources exist: [`synthetic::SyntheticWorkload`] derives a
//! degree-respecting churn from the loaded base graph, and [`log::LogReplay`]
//! replays a pre-recorded operation log. Writer threads claim batches through
//! the shared [`WorkloadSource`] trait; the synthetic source is partitioned
//! per thread so claims never contend on a shared cursor.

pub mod log;
pub mod synthetic;

use crate::error::Result;
use crate::graph::{Edge, VertexId, WeightedEdge};

/// One mutation record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Insert a vertex.
    InsertVertex(VertexId),
    /// Remove a vertex together with its incident edges.
    DeleteVertex(VertexId),
    /// Insert an edge, implicitly creating missing endpoints. An insert that
    /// finds the edge already present refreshes the weight and is classified
    /// as an update by the worker applying it.
    InsertEdge(WeightedEdge),
    /// Remove an edge.
    DeleteEdge(Edge),
}

/// A claimable stream of mutations.
///
/// Claims are destructive: once handed out, a batch is never produced again.
/// Per-thread causal order holds for operations touching a vertex the same
/// partition created; no global order across threads is guaranteed.
pub trait WorkloadSource: Send + Sync {
    /// Upper-bound estimate of the operations this source will produce.
    /// Synthetic sources know the exact count; log replay may only estimate.
    fn expected_operations(&self) -> u64;

    /// Moves up to `max_ops` operations into `out`, returning how many were
    /// claimed. Zero means the stream is exhausted for this worker.
    fn claim(&self, worker: usize, max_ops: usize, out: &mut Vec<Operation>) -> Result<usize>;

    /// Artificial vertices minted so far, beyond the initial vertex set.
    fn num_artificial_vertices(&self) -> u64 {
        0
    }

    /// Rough size of the generator's working set, attributed to the driver in
    /// memory-footprint samples.
    fn working_set_bytes(&self) -> u64 {
        0
    }
}
