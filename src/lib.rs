//! Patina subjects graph storage engines to a long-running, mixed
//! read/write "aging" workload while measuring throughput, tail latency,
//! memory growth and liveness.
//!
//! The harness is storage-agnostic: it drives any engine implementing the two
//! capability roles in [`interface`] and never touches a store's internal
//! representation. The center of gravity is [`aging::AgingExperiment`], which
//! generates a deterministic or pseudo-random mutation stream, fans it out
//! across concurrent writer (and optionally reader) threads, coordinates
//! periodic snapshot builds behind a checkpoint lock, enforces wall-clock and
//! memory budgets, detects stalled execution and aggregates the
//! multi-dimensional [`aging::AgingResult`] record.

#![warn(missing_docs)]

pub mod aging;
pub mod deadline;
pub mod error;
pub mod graph;
pub mod interface;
pub mod latency;
pub mod monitor;
pub mod report;
pub mod stores;
pub mod workload;

pub use aging::{AgingExperiment, AgingParameters, AgingResult, ExperimentState};
pub use deadline::Deadline;
pub use error::{AbortReason, DriverError, Result};
pub use graph::{BaseGraph, Edge, VertexId, WeightedEdge};
pub use interface::{
    load_graph, AnalyticsInterface, GraphStore, MutationInterface, StoreOptions, StoreRegistry,
};
