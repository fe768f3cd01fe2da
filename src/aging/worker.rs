//! Writer and reader thread bodies.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::error::{DriverError, Result};
use crate::graph::VertexId;
use crate::interface::{AnalyticsInterface, GraphStore, MutationInterface};
use crate::latency::{LatencyProbe, OpClass};
use crate::monitor::{AbortHandle, Heartbeat};
use crate::workload::{Operation, WorkloadSource};

/// Everything a writer thread needs, shared or owned.
pub(crate) struct WriterContext {
    pub worker: usize,
    pub store: Arc<dyn GraphStore>,
    pub source: Arc<dyn WorkloadSource>,
    pub checkpoint: Arc<RwLock<()>>,
    pub abort: Arc<AbortHandle>,
    pub heartbeat: Arc<Heartbeat>,
    pub applied: Arc<AtomicU64>,
    pub granularity: usize,
    pub measure_latency: bool,
    pub latency_capacity: usize,
    pub release_memory: bool,
    pub retained: Arc<Mutex<Vec<Vec<Operation>>>>,
    pub driver_bytes: Arc<AtomicU64>,
}

/// Applies claimed batches until the stream is exhausted or an abort is
/// requested. Batch claims happen under the shared checkpoint guard, so an
/// in-progress exclusive `build()` pauses new claims as well as application.
pub(crate) fn writer_main(ctx: WriterContext) -> Result<LatencyProbe> {
    let mut probe = LatencyProbe::new(ctx.measure_latency, ctx.latency_capacity);
    let mut batch: Vec<Operation> = Vec::with_capacity(ctx.granularity);
    let outcome = loop {
        if ctx.abort.is_set() {
            break Ok(());
        }
        batch.clear();
        let shared = ctx.checkpoint.read();
        let claimed = match ctx.source.claim(ctx.worker, ctx.granularity, &mut batch) {
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if claimed == 0 {
            break Ok(());
        }
        if let Err(e) = apply_batch(&ctx, &batch, &mut probe) {
            break Err(e);
        }
        drop(shared);
        if !ctx.release_memory {
            // Retaining completed batches is what makes the driver-attributed
            // footprint grow with progress; used to exercise the memory
            // accounting path.
            ctx.driver_bytes.fetch_add(
                (batch.capacity() * std::mem::size_of::<Operation>()) as u64,
                Ordering::Relaxed,
            );
            ctx.retained
                .lock()
                .push(std::mem::replace(&mut batch, Vec::with_capacity(ctx.granularity)));
        }
    };
    ctx.heartbeat.mark_done();
    match outcome {
        Ok(()) => Ok(probe),
        Err(e) => {
            let message = format!("writer {} failed: {e}", ctx.worker);
            ctx.abort.fail(message.clone());
            Err(DriverError::Store(message))
        }
    }
}

fn apply_batch(
    ctx: &WriterContext,
    batch: &[Operation],
    probe: &mut LatencyProbe,
) -> Result<()> {
    for op in batch {
        ctx.heartbeat.enter_store();
        let started = ctx.measure_latency.then(Instant::now);
        let class = apply_one(ctx.store.as_ref(), op)?;
        ctx.heartbeat.leave_store();
        if let Some(started) = started {
            probe.record(class, started.elapsed().as_nanos() as u64);
        }
        ctx.applied.fetch_add(1, Ordering::Relaxed);
        ctx.heartbeat.beat();
    }
    Ok(())
}

/// Applies one operation and classifies the outcome.
///
/// An edge insert that finds both endpoints gone, or the edge already
/// present, is a silent no-op from the stream's point of view: the generator
/// only guarantees per-thread causal order, so a concurrently removed
/// endpoint is expected, not an error.
fn apply_one(store: &dyn GraphStore, op: &Operation) -> Result<OpClass> {
    match op {
        Operation::InsertVertex(v) => {
            store.add_vertex(*v)?;
            Ok(OpClass::Insert)
        }
        Operation::DeleteVertex(v) => {
            store.remove_vertex(*v)?;
            Ok(OpClass::Delete)
        }
        Operation::InsertEdge(e) => {
            let inserted = store.add_edge_and_create_vertices(*e)?;
            Ok(if inserted {
                OpClass::Insert
            } else {
                OpClass::Update
            })
        }
        Operation::DeleteEdge(e) => {
            store.remove_edge(*e)?;
            Ok(OpClass::Delete)
        }
    }
}

/// Everything a reader thread needs.
pub(crate) struct ReaderContext {
    pub reader: usize,
    pub store: Arc<dyn GraphStore>,
    pub abort: Arc<AbortHandle>,
    pub heartbeat: Arc<Heartbeat>,
    pub finished: Arc<AtomicBool>,
    pub started: Instant,
    pub timeout: Option<Duration>,
    pub sources: Arc<Vec<VertexId>>,
    pub seed: u64,
    pub output_dir: Option<PathBuf>,
}

/// Analytics budget when the experiment itself has no overall timeout.
const UNBOUNDED_ANALYTICS_BUDGET: Duration = Duration::from_secs(3600);

/// Stats a reader thread hands back at join.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReaderStats {
    pub completed: u64,
    pub timeouts: u64,
}

/// Continuously runs the analytics suite against the latest snapshot until
/// the experiment finishes. Per-call deadlines are the remaining overall
/// budget; a timed-out call is logged and counted, never escalated.
pub(crate) fn reader_main(ctx: ReaderContext) -> Result<ReaderStats> {
    let mut stats = ReaderStats::default();
    let mut rng = ChaCha12Rng::seed_from_u64(ctx.seed ^ ((ctx.reader as u64) << 32));
    let mut round = 0usize;
    let outcome = loop {
        if ctx.finished.load(Ordering::Acquire) || ctx.abort.is_set() {
            break Ok(());
        }
        let budget = match ctx.timeout {
            Some(timeout) => {
                let remaining = timeout.saturating_sub(ctx.started.elapsed());
                if remaining.is_zero() {
                    break Ok(()); // overall timeout is imminent
                }
                remaining
            }
            None => UNBOUNDED_ANALYTICS_BUDGET,
        };
        let deadline = Deadline::new(budget);

        ctx.heartbeat.enter_store();
        let result = run_one(&ctx, round, &deadline, &mut rng);
        ctx.heartbeat.leave_store();
        ctx.heartbeat.beat();
        round += 1;

        match result {
            Ok(()) => stats.completed += 1,
            Err(DriverError::Timeout { budget }) => {
                stats.timeouts += 1;
                warn!(
                    reader = ctx.reader,
                    ?budget,
                    "analytics call exceeded its deadline"
                );
            }
            Err(e) => break Err(e),
        }
    };
    ctx.heartbeat.mark_done();
    match outcome {
        Ok(()) => {
            debug!(
                reader = ctx.reader,
                completed = stats.completed,
                timeouts = stats.timeouts,
                "reader finished"
            );
            Ok(stats)
        }
        Err(e) => {
            let message = format!("reader {} failed: {e}", ctx.reader);
            ctx.abort.fail(message.clone());
            Err(DriverError::Store(message))
        }
    }
}

fn run_one(
    ctx: &ReaderContext,
    round: usize,
    deadline: &Deadline,
    rng: &mut ChaCha12Rng,
) -> Result<()> {
    let store = ctx.store.as_ref();
    let output = ctx
        .output_dir
        .as_ref()
        .map(|dir| dir.join(format!("reader{}_round{round}.txt", ctx.reader)));
    let output = output.as_deref();
    let mut source = || ctx.sources[rng.gen_range(0..ctx.sources.len())];

    // Source-less suite when no source vertices were configured.
    let suite: &[usize] = if ctx.sources.is_empty() {
        &[1, 2, 3, 4]
    } else {
        &[0, 1, 2, 3, 4, 5]
    };
    match suite[round % suite.len()] {
        0 => store.bfs(source(), deadline, output),
        1 => store.pagerank(10, 0.85, deadline, output),
        2 => store.wcc(deadline, output),
        3 => store.cdlp(10, deadline, output),
        4 => store.lcc(deadline, output),
        _ => store.sssp(source(), deadline, output),
    }
}
