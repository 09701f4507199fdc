//! Shardwalk CLI: preprocess an edge list and run a vertex program over it

use anyhow::{bail, Context as _};
use clap::Parser;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use shardwalk::engine::{Engine, EngineConfig, RunSummary};
use shardwalk::preprocess::{PreprocessOutcome, Preprocessor};
use shardwalk::{CachePolicy, VertexId};
use shardwalk_programs::{component_summary, load_vertex_values, ComponentSize, ConnectedComponents, ShortestDistance};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardwalk", version, about = "Out-of-core vertex-centric graph computation")]
struct Cli {
    /// Edge list: `src dst` or `src dst value` per line
    input: PathBuf,

    /// YAML file with engine settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum iterations
    #[arg(long)]
    iterations: Option<u32>,

    /// Edge payload cache budget in bytes (0 disables the cache)
    #[arg(long)]
    cache_bytes: Option<u64>,

    /// Cache eviction policy: LRU or Indegree
    #[arg(long)]
    cache_policy: Option<String>,

    /// Directory holding the preprocessed folders
    #[arg(long)]
    data_root: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "cc")]
    program: Program,

    /// Source vertex of `--program sd`
    #[arg(long, required_if_eq("program", "sd"))]
    from: Option<VertexId>,

    /// Target vertex of `--program sd`
    #[arg(long, required_if_eq("program", "sd"))]
    to: Option<VertexId>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Program {
    /// Connected components
    Cc,
    /// Shortest hop distance between --from and --to
    Sd,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct Report {
    input: PathBuf,
    reused_shards: bool,
    iterations: u32,
    intervals: usize,
    elapsed_ms: u128,
    cache_hits: u64,
    cache_lookups: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<Vec<ComponentSize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<Option<u32>>,
}

/// Components listed in the table output
const LISTED_COMPONENTS: usize = 10;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path).with_context(|| format!("loading config {:?}", path))?,
        None => EngineConfig::default(),
    };
    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(bytes) = cli.cache_bytes {
        config.cache_bytes = bytes;
    }
    if let Some(policy) = &cli.cache_policy {
        config.cache_policy = policy.parse::<CachePolicy>()?;
    }
    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if !cli.input.is_file() {
        bail!("input {:?} is not a file", cli.input);
    }
    let config = load_config(cli)?;
    let layout = config.layout_for(&cli.input);

    let outcome = Preprocessor::new(&layout, config.preprocess_config()).run(&cli.input)?;
    info!("{} intervals, {} edges", outcome.info().intervals, outcome.info().edges);

    let mut engine = Engine::open(&layout, config)?;
    let (summary, components, distance) = match cli.program {
        Program::Cc => {
            let summary = engine.run(&mut ConnectedComponents::new())?;
            let values = load_vertex_values(&layout)?;
            (summary, Some(component_summary(&values)), None)
        }
        Program::Sd => {
            let (Some(from), Some(to)) = (cli.from, cli.to) else {
                bail!("--program sd needs --from and --to");
            };
            let vertices = engine.meta().vertex_count();
            if from >= vertices || to >= vertices {
                bail!("vertices {} and {} must be below {}", from, to, vertices);
            }
            let mut program = ShortestDistance::new(from, to);
            let summary = engine.run(&mut program)?;
            (summary, None, Some(program.distance()))
        }
    };

    let report = build_report(&cli.input, outcome, summary, components, distance);
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_table(&report, cli),
    }
    Ok(())
}

fn build_report(
    input: &Path,
    outcome: PreprocessOutcome,
    summary: RunSummary,
    components: Option<Vec<ComponentSize>>,
    distance: Option<Option<u32>>,
) -> Report {
    Report {
        input: input.to_path_buf(),
        reused_shards: matches!(outcome, PreprocessOutcome::Reused(_)),
        iterations: summary.iterations,
        intervals: summary.intervals,
        elapsed_ms: summary.elapsed.as_millis(),
        cache_hits: summary.cache.hits,
        cache_lookups: summary.cache.lookups,
        components,
        distance,
    }
}

fn print_table(report: &Report, cli: &Cli) {
    println!(
        "{} iteration(s) over {} interval(s) in {} ms; cache {}/{} hits{}",
        report.iterations,
        report.intervals,
        report.elapsed_ms,
        report.cache_hits,
        report.cache_lookups,
        if report.reused_shards { " (shards reused)" } else { "" }
    );

    if let Some(components) = &report.components {
        println!("Number of different connected components: {}", components.len());
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Label", "Vertices"]);
        for component in components.iter().take(LISTED_COMPONENTS) {
            table.add_row(vec![component.label.to_string(), component.size.to_string()]);
        }
        println!("{}", table);
    }

    if let Some(distance) = report.distance {
        let (from, to) = (cli.from.unwrap_or_default(), cli.to.unwrap_or_default());
        match distance {
            Some(hops) => println!("Shortest path between {} and {} is {} hop(s)", from, to, hops),
            None => println!("There is no path between {} and {}", from, to),
        }
    }
}
