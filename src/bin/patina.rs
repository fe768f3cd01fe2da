//! Aging benchmark CLI.
//!
//! ```bash
//! # Synthetic aging run against the bundled in-memory store
//! patina run --graph graph.el --aging 10 --writers 8 --build-frequency-ms 1000 \
//!     --latency --output results.sqlite3
//!
//! # Precompute a workload log, then replay it
//! patina mklog --graph graph.el --aging 10 --ef-edges 1.3 --output aging.log
//! patina run --graph graph.el --log aging.log --writers 8
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use patina::aging::{AgingExperiment, AgingParameters, AgingResult};
use patina::error::Result;
use patina::graph::BaseGraph;
use patina::interface::{MutationInterface, StoreOptions};
use patina::report::{CsvSink, SqliteSink};
use patina::stores::builtin_registry;
use patina::workload::log::{ExplicitParams, LogReader, LogReplay, LogWriter};
use patina::workload::synthetic::SyntheticWorkload;
use patina::workload::WorkloadSource;

#[derive(Parser)]
#[command(
    name = "patina",
    version,
    about = "Aging benchmark harness for graph storage engines"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an aging experiment against a store
    Run(RunArgs),
    /// Precompute a workload log for later replay
    Mklog(MklogArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Base graph edge list (source destination [weight] per line)
    #[arg(long)]
    graph: PathBuf,

    /// Store to benchmark
    #[arg(long, default_value = "memory")]
    store: String,

    /// Replay this workload log instead of generating synthetically
    #[arg(long)]
    log: Option<PathBuf>,

    /// Aging coefficient: mutation target as a multiple of |V0| + |E0|
    #[arg(long)]
    aging: Option<f64>,

    /// Vertex expansion factor
    #[arg(long)]
    ef_vertices: Option<f64>,

    /// Edge expansion factor
    #[arg(long)]
    ef_edges: Option<f64>,

    /// Largest sampled edge weight
    #[arg(long)]
    max_weight: Option<f64>,

    /// Writer threads
    #[arg(long, short = 'w', default_value_t = 1)]
    writers: usize,

    /// Reader threads (mixed workload)
    #[arg(long, short = 'r', default_value_t = 0)]
    readers: usize,

    /// Operations a writer claims per scheduling round
    #[arg(long, default_value_t = 1024)]
    granularity: usize,

    /// Milliseconds between snapshot builds; 0 disables
    #[arg(long, default_value_t = 0)]
    build_frequency_ms: u64,

    /// Recording step in (0, 1]; 1/step intermediate checkpoints per
    /// coefficient unit
    #[arg(long, default_value_t = 1.0)]
    step: f64,

    /// Idle seconds after mutation completion
    #[arg(long, default_value_t = 0)]
    cooloff_secs: u64,

    /// Abort once process memory exceeds this many bytes
    #[arg(long)]
    memory_threshold: Option<u64>,

    /// Abort the mutation phase after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Record per-operation latencies
    #[arg(long)]
    latency: bool,

    /// Retain completed batches instead of freeing them as progress advances
    #[arg(long)]
    retain_memory: bool,

    /// Preserve log order exactly (timestamp-ordered input)
    #[arg(long)]
    timestamp_ordered: bool,

    /// Generator seed
    #[arg(long, default_value_t = 0x5eed_a61b)]
    seed: u64,

    /// Store-specific block size knob, passed through opaquely
    #[arg(long, default_value_t = 0)]
    block_size: usize,

    /// SQLite database collecting result records
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for CSV exports of the result record
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Directory for analytics output listings (mixed workload)
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Log every memory sample
    #[arg(long)]
    report_memory: bool,

    /// Print the full result record as JSON instead of the summary table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MklogArgs {
    /// Base graph edge list
    #[arg(long)]
    graph: PathBuf,

    /// Log file to write
    #[arg(long)]
    output: PathBuf,

    /// Aging coefficient
    #[arg(long, default_value_t = 1.0)]
    aging: f64,

    /// Vertex expansion factor
    #[arg(long, default_value_t = 1.0)]
    ef_vertices: f64,

    /// Edge expansion factor
    #[arg(long, default_value_t = 1.0)]
    ef_edges: f64,

    /// Largest sampled edge weight
    #[arg(long, default_value_t = 1.0)]
    max_weight: f64,

    /// Generator seed
    #[arg(long, default_value_t = 0x5eed_a61b)]
    seed: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run_experiment(args),
        Command::Mklog(args) => make_log(args),
    };
    if let Err(err) = outcome {
        eprintln!("patina: {err}");
        std::process::exit(1);
    }
}

fn run_experiment(args: RunArgs) -> Result<()> {
    let graph = BaseGraph::from_edge_list(&args.graph)?;
    println!(
        "Loaded {}: {} vertices, {} edges",
        args.graph.display(),
        graph.num_vertices(),
        graph.num_edges()
    );

    let registry = builtin_registry();
    let store = registry.open(
        &args.store,
        &StoreOptions {
            directed: false,
            block_size: args.block_size,
        },
    )?;
    materialize(store.as_ref(), &graph)?;

    let mut params = AgingParameters {
        aging_coefficient: args.aging.unwrap_or(1.0),
        expansion_factor_vertices: args.ef_vertices.unwrap_or(1.0),
        expansion_factor_edges: args.ef_edges.unwrap_or(1.0),
        max_weight: args.max_weight.unwrap_or(1.0),
        num_writer_threads: args.writers,
        num_reader_threads: args.readers,
        worker_granularity: args.granularity,
        build_frequency: (args.build_frequency_ms > 0)
            .then(|| Duration::from_millis(args.build_frequency_ms)),
        recording_step: args.step,
        cooloff: Duration::from_secs(args.cooloff_secs),
        memory_threshold_bytes: args.memory_threshold,
        timeout: args.timeout_secs.map(Duration::from_secs),
        measure_latency: args.latency,
        release_memory_incrementally: !args.retain_memory,
        is_timestamp_ordered: args.timestamp_ordered,
        seed: args.seed,
        report_memory: args.report_memory,
        ..AgingParameters::default()
    };

    let source: Arc<dyn WorkloadSource> = match &args.log {
        Some(path) => {
            let reader = LogReader::open(path)?;
            let explicit = ExplicitParams {
                aging_coefficient: args.aging,
                ef_vertices: args.ef_vertices,
                ef_edges: args.ef_edges,
                max_weight: args.max_weight,
            };
            reader.header().check_explicit(&explicit)?;
            params.aging_coefficient = reader.header().aging_coeff;
            params.expansion_factor_vertices = reader.header().ef_vertices;
            params.expansion_factor_edges = reader.header().ef_edges;
            params.max_weight = reader.header().max_weight;
            let estimate = (params.aging_coefficient
                * (graph.num_vertices() + graph.num_edges()) as f64) as u64;
            Arc::new(LogReplay::new(reader, estimate))
        }
        None => Arc::new(SyntheticWorkload::new(&graph, &params)?),
    };

    let mut experiment = AgingExperiment::new(store, source, params);
    if args.readers > 0 {
        experiment =
            experiment.with_analytics_sources(graph.vertices().iter().take(64).copied().collect());
        if let Some(dump) = &args.dump {
            std::fs::create_dir_all(dump)?;
            experiment = experiment.with_analytics_output(dump.clone());
        }
    }

    let result = experiment.run()?;
    if args.json {
        let rendered = serde_json::to_string_pretty(&result)
            .map_err(|e| patina::DriverError::Persistence(e.to_string()))?;
        println!("{rendered}");
    } else {
        print_summary(&result);
    }

    if let Some(path) = &args.output {
        let mut sink = SqliteSink::open(path)?;
        result.save(&mut sink)?;
        println!("Result saved to {} (run {})", path.display(), sink.run_id());
    }
    if let Some(dir) = &args.csv {
        let mut sink = CsvSink::create(dir)?;
        result.save(&mut sink)?;
        println!("CSV exported to {}", dir.display());
    }
    Ok(())
}

fn materialize(store: &dyn patina::interface::GraphStore, graph: &BaseGraph) -> Result<()> {
    let bar = ProgressBar::new(graph.num_vertices() + graph.num_edges());
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("loading");
    for &vertex in graph.vertices() {
        store.add_vertex(vertex)?;
        bar.inc(1);
    }
    for &edge in graph.edges() {
        store.add_edge(edge)?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(())
}

fn print_summary(result: &AgingResult) {
    let seconds = result.completion_micros as f64 / 1_000_000.0;
    println!("\n=== Aging result ===");
    println!("Operations applied:   {}", result.num_operations_total);
    println!("Completion time:      {seconds:.2} s");
    if seconds > 0.0 {
        println!(
            "Throughput:           {:.0} ops/s",
            result.num_operations_total as f64 / seconds
        );
    }
    println!(
        "Vertices:             {} -> {} ({} artificial)",
        result.num_vertices_initial, result.num_vertices_final, result.num_artificial_vertices
    );
    println!(
        "Edges:                {} -> {}",
        result.num_edges_initial, result.num_edges_final
    );
    println!(
        "Builds / snapshots:   {} / {}",
        result.num_build_invocations, result.num_snapshots_created
    );
    if result.num_reader_timeouts > 0 {
        println!("Reader timeouts:      {}", result.num_reader_timeouts);
    }
    if result.aborted() {
        println!(
            "ABORTED: timeout={} memory={} deadlocked={} (in store code: {})",
            result.timeout_hit,
            result.memory_threshold_passed,
            result.deadlocked,
            result.deadlocked_in_store_code
        );
    }
    if let Some(latencies) = &result.latencies {
        println!("\n--- Latencies (µs) ---");
        for s in latencies.summaries() {
            println!(
                "{:<8} n={:<9} mean {:>8.1}  median {:>8.1}  p90 {:>8.1}  p95 {:>8.1}  p97 {:>8.1}  p99 {:>8.1}",
                s.label,
                s.count,
                s.mean / 1_000.0,
                s.median / 1_000.0,
                s.p90 / 1_000.0,
                s.p95 / 1_000.0,
                s.p97 / 1_000.0,
                s.p99 / 1_000.0
            );
        }
    }
}

fn make_log(args: MklogArgs) -> Result<()> {
    let graph = BaseGraph::from_edge_list(&args.graph)?;
    let params = AgingParameters {
        aging_coefficient: args.aging,
        expansion_factor_vertices: args.ef_vertices,
        expansion_factor_edges: args.ef_edges,
        max_weight: args.max_weight,
        num_writer_threads: 1, // a single partition keeps the log totally ordered
        seed: args.seed,
        ..AgingParameters::default()
    };
    params.validate()?;
    let source = SyntheticWorkload::new(&graph, &params)?;
    let expected = source.expected_operations();

    let header = patina::workload::log::LogHeader {
        aging_coeff: args.aging,
        ef_vertices: args.ef_vertices,
        ef_edges: args.ef_edges,
        max_weight: args.max_weight,
        input_graph: args.graph.display().to_string(),
        num_operations: Some(expected),
    };
    let mut writer = LogWriter::create(&args.output, &header)?;

    let bar = ProgressBar::new(expected);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("generating");
    let mut batch = Vec::with_capacity(4096);
    loop {
        batch.clear();
        let claimed = source.claim(0, 4096, &mut batch)?;
        if claimed == 0 {
            break;
        }
        for op in &batch {
            writer.append(op)?;
        }
        bar.inc(claimed as u64);
    }
    bar.finish_and_clear();
    let written = writer.finish()?;
    println!(
        "Wrote {written} operations to {} ({} artificial vertices)",
        args.output.display(),
        source.num_artificial_vertices()
    );
    Ok(())
}
