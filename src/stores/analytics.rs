//! Snapshot algorithms for the reference store.
//!
//! Every loop polls its deadline at bounded granularity: per BFS frontier,
//! per PageRank/CDLP iteration, and per fixed vertex stride inside O(V) and
//! O(V * d^2) scans. A missing source vertex is not an error; the snapshot
//! may simply predate the vertex, so the result is "everything unreachable".

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use super::memory::Snapshot;
use crate::deadline::Deadline;
use crate::error::Result;
use crate::graph::VertexId;

/// Vertices processed between deadline polls in linear scans.
const POLL_STRIDE: usize = 1024;

/// Vertices processed between deadline polls in the triangle-counting scan.
const LCC_POLL_STRIDE: usize = 64;

/// Hop distances from `source`; `-1` marks unreachable vertices.
pub(crate) fn bfs(snapshot: &Snapshot, source: VertexId, deadline: &Deadline) -> Result<Vec<i64>> {
    let n = snapshot.num_vertices();
    let mut distances = vec![-1i64; n];
    let Some(root) = snapshot.index_of(source) else {
        return Ok(distances);
    };
    distances[root] = 0;
    let mut frontier = vec![root as u32];
    let mut depth = 0i64;
    while !frontier.is_empty() {
        deadline.check()?;
        depth += 1;
        let mut next = Vec::new();
        for &v in &frontier {
            for &(u, _) in snapshot.neighbors(v as usize) {
                if distances[u as usize] < 0 {
                    distances[u as usize] = depth;
                    next.push(u);
                }
            }
        }
        frontier = next;
    }
    Ok(distances)
}

/// PageRank with uniform teleport and dangling-mass redistribution.
pub(crate) fn pagerank(
    snapshot: &Snapshot,
    num_iterations: u64,
    damping_factor: f64,
    deadline: &Deadline,
) -> Result<Vec<f64>> {
    let n = snapshot.num_vertices();
    if n == 0 {
        return Ok(Vec::new());
    }
    let inverse_n = 1.0 / n as f64;
    let mut scores = vec![inverse_n; n];
    let mut next = vec![0.0f64; n];
    for _ in 0..num_iterations {
        deadline.check()?;
        let mut dangling = 0.0;
        for v in 0..n {
            if snapshot.neighbors(v).is_empty() {
                dangling += scores[v];
            }
        }
        let base = (1.0 - damping_factor) * inverse_n + damping_factor * dangling * inverse_n;
        for v in 0..n {
            let mut incoming = 0.0;
            for &(u, _) in snapshot.neighbors(v) {
                incoming += scores[u as usize] / snapshot.neighbors(u as usize).len() as f64;
            }
            next[v] = base + damping_factor * incoming;
        }
        std::mem::swap(&mut scores, &mut next);
    }
    Ok(scores)
}

/// Weakly connected components, labeled by the smallest external identifier
/// in each component.
pub(crate) fn wcc(snapshot: &Snapshot, deadline: &Deadline) -> Result<Vec<u64>> {
    let n = snapshot.num_vertices();
    let mut labels = vec![0u64; n];
    let mut visited = vec![false; n];
    let mut processed = 0usize;
    for root in 0..n {
        if visited[root] {
            continue;
        }
        // Roots are scanned in ascending identifier order, so the flood root
        // is the smallest identifier of its component.
        let label = snapshot.external_id(root);
        let mut stack = vec![root as u32];
        visited[root] = true;
        while let Some(v) = stack.pop() {
            labels[v as usize] = label;
            processed += 1;
            if processed % POLL_STRIDE == 0 {
                deadline.check()?;
            }
            for &(u, _) in snapshot.neighbors(v as usize) {
                if !visited[u as usize] {
                    visited[u as usize] = true;
                    stack.push(u);
                }
            }
        }
    }
    Ok(labels)
}

/// Community detection through synchronous label propagation. Labels start as
/// external identifiers; each round a vertex adopts its most frequent
/// neighbor label, ties resolved toward the smaller label.
pub(crate) fn cdlp(
    snapshot: &Snapshot,
    max_iterations: u64,
    deadline: &Deadline,
) -> Result<Vec<u64>> {
    let n = snapshot.num_vertices();
    let mut labels: Vec<u64> = (0..n).map(|v| snapshot.external_id(v)).collect();
    let mut counts: FxHashMap<u64, u32> = FxHashMap::default();
    for _ in 0..max_iterations {
        deadline.check()?;
        let mut next = labels.clone();
        let mut changed = false;
        for v in 0..n {
            let neighbors = snapshot.neighbors(v);
            if neighbors.is_empty() {
                continue;
            }
            counts.clear();
            for &(u, _) in neighbors {
                *counts.entry(labels[u as usize]).or_insert(0) += 1;
            }
            let mut best = labels[v];
            let mut best_count = 0u32;
            for (&label, &count) in &counts {
                if count > best_count || (count == best_count && label < best) {
                    best = label;
                    best_count = count;
                }
            }
            if best != next[v] {
                next[v] = best;
                changed = true;
            }
        }
        labels = next;
        if !changed {
            break;
        }
    }
    Ok(labels)
}

/// Local clustering coefficient per vertex.
pub(crate) fn lcc(snapshot: &Snapshot, deadline: &Deadline) -> Result<Vec<f64>> {
    let n = snapshot.num_vertices();
    let mut coefficients = vec![0.0f64; n];
    for v in 0..n {
        if v % LCC_POLL_STRIDE == 0 {
            deadline.check()?;
        }
        let neighbors = snapshot.neighbors(v);
        let degree = neighbors.len();
        if degree < 2 {
            continue;
        }
        let mut closed = 0u64;
        for &(u, _) in neighbors {
            closed += sorted_intersection(neighbors, snapshot.neighbors(u as usize));
        }
        coefficients[v] = closed as f64 / (degree * (degree - 1)) as f64;
    }
    Ok(coefficients)
}

/// Size of the intersection of two neighbor rows sorted by internal index.
fn sorted_intersection(a: &[(u32, f64)], b: &[(u32, f64)]) -> u64 {
    let (mut i, mut j, mut common) = (0usize, 0usize, 0u64);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            CmpOrdering::Less => i += 1,
            CmpOrdering::Greater => j += 1,
            CmpOrdering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    common
}

/// Weighted shortest-path distances from `source`; unreachable vertices get
/// `f64::INFINITY`.
pub(crate) fn sssp(snapshot: &Snapshot, source: VertexId, deadline: &Deadline) -> Result<Vec<f64>> {
    let n = snapshot.num_vertices();
    let mut distances = vec![f64::INFINITY; n];
    let Some(root) = snapshot.index_of(source) else {
        return Ok(distances);
    };
    distances[root] = 0.0;
    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        distance: 0.0,
        vertex: root as u32,
    });
    let mut pops = 0usize;
    while let Some(entry) = heap.pop() {
        pops += 1;
        if pops % POLL_STRIDE == 0 {
            deadline.check()?;
        }
        if entry.distance > distances[entry.vertex as usize] {
            continue; // stale queue entry
        }
        for &(u, weight) in snapshot.neighbors(entry.vertex as usize) {
            let candidate = entry.distance + weight;
            if candidate < distances[u as usize] {
                distances[u as usize] = candidate;
                heap.push(HeapEntry {
                    distance: candidate,
                    vertex: u,
                });
            }
        }
    }
    Ok(distances)
}

/// Min-heap entry ordered by distance.
struct HeapEntry {
    distance: f64,
    vertex: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.vertex == other.vertex
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order: BinaryHeap is a max-heap.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}
