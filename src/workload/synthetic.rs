//! Degree-respecting synthetic workload.
//!
//! The generator turns the loaded base graph into a finite churn stream:
//! original edges cycle through delete/re-insert, expansion edges (sampled
//! from the base degree distribution) cycle through insert/delete, and the
//! live edge count oscillates inside `[|E0|, |E0| * ef_edges]`. Artificial
//! vertices are minted only when the edge expansion factor needs more
//! distinct endpoints than the base graph offers, and are never deleted
//! independently of their incident edges.
//!
//! The working set is partitioned so each writer thread owns a disjoint
//! vertex range: an edge belongs to the partition owning its smaller
//! endpoint, and expansion candidates draw both endpoints from the owning
//! partition's range. Claims therefore never contend across threads, and no
//! two partitions can ever generate the same edge.
//!
//! Each partition tracks its restoration debt (deleted originals plus live
//! expansion edges) and spends exactly that many trailing operations undoing
//! it, so an uninterrupted stream returns the graph to the base edge set.

use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rustc_hash::FxHashSet;

use super::{Operation, WorkloadSource};
use crate::aging::AgingParameters;
use crate::error::{DriverError, Result};
use crate::graph::{BaseGraph, Edge, VertexId, WeightedEdge};

/// Fraction of churn operations spent refreshing the weight of a live edge.
const UPDATE_FRACTION: f64 = 0.125;

/// Sampling attempts before the generator reaches for an artificial vertex.
const GROW_ATTEMPTS: usize = 8;

/// Deterministic, partitioned synthetic mutation stream.
pub struct SyntheticWorkload {
    partitions: Vec<Mutex<Partition>>,
    total_operations: u64,
    artificial: Arc<AtomicU64>,
    working_set_bytes: u64,
}

impl SyntheticWorkload {
    /// Builds the stream for `graph` under `params`. The operation target is
    /// `aging_coefficient * (|V0| + |E0|)`, rounded down to whole
    /// insert/delete pairs and split across `num_writer_threads` partitions
    /// proportionally to their working-set capacity.
    pub fn new(graph: &BaseGraph, params: &AgingParameters) -> Result<Self> {
        let v0 = graph.num_vertices();
        let e0 = graph.num_edges();
        if e0 == 0 {
            return Err(DriverError::Configuration(
                "synthetic workload requires a base graph with at least one edge".to_string(),
            ));
        }

        let threads = params.num_writer_threads.max(1);
        let target = (params.aging_coefficient * (v0 + e0) as f64).floor() as u64;
        let pairs = target / 2;

        let max_extra_total = (e0 as f64 * (params.expansion_factor_edges - 1.0)).floor() as u64;
        let artificial_cap_total =
            (v0 as f64 * (params.expansion_factor_vertices - 1.0)).floor() as u64;

        // Contiguous vertex slices; an edge is owned by the partition of its
        // smaller endpoint.
        let vertices = graph.vertices();
        let degrees = graph.degrees();
        let mut slice_bounds = Vec::with_capacity(threads + 1);
        for p in 0..=threads {
            slice_bounds.push(vertices.len() * p / threads);
        }
        let partition_of = |vertex: VertexId| -> usize {
            let pos = vertices.partition_point(|&v| v < vertex);
            match slice_bounds.iter().rposition(|&b| b <= pos) {
                Some(p) => p.min(threads - 1),
                None => 0,
            }
        };

        let mut originals: Vec<Vec<OriginalSlot>> = vec![Vec::new(); threads];
        for &edge in graph.edges() {
            let (lo, hi) = edge.canonical();
            originals[partition_of(lo)].push(OriginalSlot {
                edge: WeightedEdge::new(lo, hi, edge.weight),
                live: true,
            });
        }

        let extra_shares = distribute(max_extra_total, &vec![1u64; threads]);
        let artificial_shares = distribute(artificial_cap_total, &vec![1u64; threads]);
        // A partition with an empty vertex slice cannot sample endpoints and
        // gets no share of the operation budget.
        let weights: Vec<u64> = originals
            .iter()
            .enumerate()
            .map(|(p, o)| {
                if slice_bounds[p] == slice_bounds[p + 1] {
                    0
                } else {
                    o.len() as u64 + extra_shares[p]
                }
            })
            .collect();
        let pair_shares = distribute(pairs, &weights);
        let total_operations = pair_shares.iter().sum::<u64>() * 2;

        let artificial = Arc::new(AtomicU64::new(0));
        let mut next_artificial_base = graph.max_vertex_id() + 1;
        let mut partitions = Vec::with_capacity(threads);
        let mut working_set_bytes = 0u64;
        for (p, slots) in originals.into_iter().enumerate() {
            let (start, end) = (slice_bounds[p], slice_bounds[p + 1]);
            let slice: Vec<VertexId> = vertices[start..end].to_vec();
            let mut cumulative = Vec::with_capacity(slice.len());
            let mut total_degree = 0u64;
            for &d in &degrees[start..end] {
                total_degree += d;
                cumulative.push(total_degree);
            }
            let base_present: FxHashSet<(VertexId, VertexId)> =
                slots.iter().map(|s| s.edge.canonical()).collect();

            working_set_bytes += (slots.len() * size_of::<OriginalSlot>()
                + slice.len() * (size_of::<VertexId>() + size_of::<u64>()))
                as u64;

            // Artificial ids are allocated from disjoint per-partition ranges
            // above every base identifier. Each operation mints at most one
            // vertex, so this range can never be overrun.
            let artificial_range = artificial_shares[p].max(1) * 2 + pair_shares[p] * 2;
            let partition = Partition {
                rng: ChaCha12Rng::seed_from_u64(params.seed.wrapping_add(p as u64)),
                originals: slots,
                cursor: 0,
                dead: Vec::new(),
                expansions: Vec::new(),
                expansion_present: FxHashSet::default(),
                base_present,
                slice,
                cumulative,
                total_degree,
                max_extra: extra_shares[p],
                artificial_cap: artificial_shares[p],
                artificial_minted: Vec::new(),
                next_artificial: next_artificial_base,
                max_weight: params.max_weight,
                remaining: pair_shares[p] * 2,
                artificial_total: Arc::clone(&artificial),
            };
            next_artificial_base += artificial_range;
            partitions.push(Mutex::new(partition));
        }

        Ok(Self {
            partitions,
            total_operations,
            artificial,
            working_set_bytes,
        })
    }
}

impl WorkloadSource for SyntheticWorkload {
    fn expected_operations(&self) -> u64 {
        self.total_operations
    }

    fn claim(&self, worker: usize, max_ops: usize, out: &mut Vec<Operation>) -> Result<usize> {
        let Some(partition) = self.partitions.get(worker % self.partitions.len()) else {
            return Ok(0);
        };
        let mut partition = partition.lock();
        let mut claimed = 0;
        while claimed < max_ops {
            match partition.step() {
                Some(op) => {
                    out.push(op);
                    claimed += 1;
                }
                None => break,
            }
        }
        Ok(claimed)
    }

    fn num_artificial_vertices(&self) -> u64 {
        self.artificial.load(Ordering::Relaxed)
    }

    fn working_set_bytes(&self) -> u64 {
        self.working_set_bytes
    }
}

#[derive(Debug, Clone)]
struct OriginalSlot {
    edge: WeightedEdge,
    live: bool,
}

struct Partition {
    rng: ChaCha12Rng,
    originals: Vec<OriginalSlot>,
    cursor: usize,
    dead: Vec<u32>,
    expansions: Vec<WeightedEdge>,
    expansion_present: FxHashSet<(VertexId, VertexId)>,
    base_present: FxHashSet<(VertexId, VertexId)>,
    slice: Vec<VertexId>,
    cumulative: Vec<u64>,
    total_degree: u64,
    max_extra: u64,
    artificial_cap: u64,
    artificial_minted: Vec<VertexId>,
    next_artificial: VertexId,
    max_weight: f64,
    remaining: u64,
    artificial_total: Arc<AtomicU64>,
}

impl Partition {
    fn step(&mut self) -> Option<Operation> {
        if self.remaining == 0 {
            return None;
        }
        let debt = (self.dead.len() + self.expansions.len()) as u64;
        let op = if self.remaining <= debt {
            self.restore()
        } else if self.remaining == debt + 1 {
            // One surplus operation left: it must not raise the debt, or the
            // stream would end away from the base edge set.
            if debt > 0 {
                self.restore()
            } else {
                self.neutral()
            }
        } else {
            self.churn()
        };
        self.remaining -= 1;
        Some(op)
    }

    fn churn(&mut self) -> Operation {
        if self.max_extra == 0 {
            // Degenerate expansion factor: strict delete/re-insert cycles
            // walking the original edges in order.
            return if self.dead.is_empty() {
                self.kill()
            } else {
                self.revive()
            };
        }
        let roll = self.rng.gen::<f64>();
        if roll < UPDATE_FRACTION && self.has_live_original() {
            return self.refresh();
        }
        let headroom =
            (self.max_extra - self.expansions.len() as u64) as f64 / self.max_extra as f64;
        if self.rng.gen::<f64>() < headroom {
            self.grow()
        } else {
            self.shrink_or_cycle()
        }
    }

    fn restore(&mut self) -> Operation {
        if let Some(edge) = self.expansions.pop() {
            self.expansion_present.remove(&edge.canonical());
            Operation::DeleteEdge(edge.unweighted())
        } else {
            self.revive()
        }
    }

    /// Debt-neutral filler: refresh a live edge, or mint a vertex when the
    /// partition has no originals at all.
    fn neutral(&mut self) -> Operation {
        if self.has_live_original() {
            self.refresh()
        } else {
            Operation::InsertVertex(self.mint_artificial())
        }
    }

    fn has_live_original(&self) -> bool {
        self.dead.len() < self.originals.len()
    }

    fn kill(&mut self) -> Operation {
        debug_assert!(self.has_live_original());
        loop {
            let idx = self.cursor % self.originals.len();
            self.cursor = self.cursor.wrapping_add(1);
            if self.originals[idx].live {
                self.originals[idx].live = false;
                self.dead.push(idx as u32);
                return Operation::DeleteEdge(self.originals[idx].edge.unweighted());
            }
        }
    }

    fn revive(&mut self) -> Operation {
        let Some(idx) = self.dead.pop() else {
            // Callers only revive with outstanding debt; keep the stream
            // total regardless.
            return Operation::InsertVertex(self.mint_artificial());
        };
        let idx = idx as usize;
        let weight = self.fresh_weight();
        self.originals[idx].live = true;
        self.originals[idx].edge.weight = weight;
        Operation::InsertEdge(self.originals[idx].edge)
    }

    fn refresh(&mut self) -> Operation {
        let len = self.originals.len();
        let mut idx = self.rng.gen_range(0..len);
        while !self.originals[idx].live {
            idx = (idx + 1) % len;
        }
        let weight = self.fresh_weight();
        self.originals[idx].edge.weight = weight;
        Operation::InsertEdge(self.originals[idx].edge)
    }

    fn shrink_or_cycle(&mut self) -> Operation {
        if let Some(edge) = self.expansions.pop() {
            self.expansion_present.remove(&edge.canonical());
            return Operation::DeleteEdge(edge.unweighted());
        }
        self.cycle()
    }

    fn cycle(&mut self) -> Operation {
        if !self.dead.is_empty() {
            self.revive()
        } else if !self.originals.is_empty() {
            self.kill()
        } else {
            // A partition with no originals and a saturated expansion set has
            // nothing edge-shaped left to do; fall back to vertex filler.
            Operation::InsertVertex(self.mint_artificial())
        }
    }

    fn grow(&mut self) -> Operation {
        for _ in 0..GROW_ATTEMPTS {
            let u = self.sample_vertex();
            let v = self.sample_vertex();
            if u == v {
                continue;
            }
            let candidate = Edge::new(u, v).canonical();
            if self.base_present.contains(&candidate)
                || self.expansion_present.contains(&candidate)
            {
                continue;
            }
            return self.push_expansion(candidate.0, candidate.1);
        }
        // The slice is saturated: pair a sampled endpoint with an artificial
        // vertex instead.
        if (self.artificial_minted.len() as u64) < self.artificial_cap {
            let u = self.sample_vertex();
            let v = self.mint_artificial();
            return self.push_expansion(u, v);
        }
        if !self.artificial_minted.is_empty() {
            let u = self.sample_vertex();
            let v = self.artificial_minted
                [self.rng.gen_range(0..self.artificial_minted.len())];
            let candidate = Edge::new(u, v).canonical();
            if !self.expansion_present.contains(&candidate) {
                return self.push_expansion(candidate.0, candidate.1);
            }
        }
        self.cycle()
    }

    fn push_expansion(&mut self, lo: VertexId, hi: VertexId) -> Operation {
        let edge = WeightedEdge::new(lo, hi, self.fresh_weight());
        self.expansion_present.insert((lo, hi));
        self.expansions.push(edge);
        Operation::InsertEdge(edge)
    }

    fn mint_artificial(&mut self) -> VertexId {
        let id = self.next_artificial;
        self.next_artificial += 1;
        self.artificial_minted.push(id);
        self.artificial_total.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn sample_vertex(&mut self) -> VertexId {
        debug_assert!(self.total_degree > 0);
        let r = self.rng.gen_range(0..self.total_degree);
        let idx = self.cumulative.partition_point(|&c| c <= r);
        self.slice[idx.min(self.slice.len() - 1)]
    }

    fn fresh_weight(&mut self) -> f64 {
        // (0, max_weight]
        self.max_weight * (1.0 - self.rng.gen::<f64>())
    }
}

/// Largest-share proportional split of `total` across `weights`.
fn distribute(total: u64, weights: &[u64]) -> Vec<u64> {
    let sum: u128 = weights.iter().map(|&w| w as u128).sum();
    if sum == 0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u64> = weights
        .iter()
        .map(|&w| (total as u128 * w as u128 / sum) as u64)
        .collect();
    let mut leftover = total - shares.iter().sum::<u64>();
    let mut i = 0;
    while leftover > 0 {
        let idx = i % weights.len();
        if weights[idx] > 0 {
            shares[idx] += 1;
            leftover -= 1;
        }
        i += 1;
    }
    shares
}
