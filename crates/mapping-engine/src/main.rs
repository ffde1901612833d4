//! System Mapper CLI
//!
//! Collects a cloud account inventory and maps it into a resource graph.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use sysmap_core::collector::{collect_inventory, CommandCollector};
use sysmap_core::config::{Backend, MapperConfig};
use sysmap_core::logging::init_logging;
use sysmap_core::persistence::GraphSnapshot;
use sysmap_core::{GraphPopulator, GraphShape, GraphStore, ImportSummary, Inventory, MemoryGraph, RdfGraph};

#[derive(Parser)]
#[command(name = "sysmap")]
#[command(author = "System Mapper Team")]
#[command(version)]
#[command(about = "Maps a cloud account inventory into a typed resource graph", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import an inventory into the graph
    Import {
        /// Inventory file produced by `collect`
        #[arg(short, long, value_name = "FILE", conflicts_with = "collect")]
        inventory: Option<PathBuf>,

        /// Query the provider instead of reading a file
        #[arg(long)]
        collect: bool,

        /// Clear the store before importing
        #[arg(long)]
        reset: bool,

        /// Store backend (memory, rdf)
        #[arg(short, long)]
        backend: Option<Backend>,

        /// Save the resulting in-memory graph to this file
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,

        /// Write the inventory used for the run to this file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// Query the provider and write the inventory to a file
    Collect {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Show label and relationship counts of a saved graph
    Summary {
        #[arg(short, long, value_name = "FILE")]
        snapshot: PathBuf,
    },

    /// Run a SPARQL query against the on-disk store
    Sparql { query: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MapperConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Import {
            inventory,
            collect,
            reset,
            backend,
            snapshot,
            export,
        } => {
            let inventory = match (inventory, collect) {
                (Some(path), _) => Inventory::load(&path)?,
                (None, true) => collect_inventory(&mut CommandCollector::new(config.collector.clone())),
                (None, false) => bail!("Either --inventory or --collect is required"),
            };
            if let Some(path) = export.or_else(|| config.run.export_path.clone()) {
                inventory.save(&path)?;
            }

            let reset = reset || config.run.reset;
            let summary = match backend.unwrap_or(config.store.backend) {
                Backend::Memory => {
                    let (summary, graph) = populate(MemoryGraph::new(), &config, &inventory, reset)?;
                    if let Some(path) = snapshot.or_else(|| config.run.snapshot_path.clone()) {
                        graph
                            .snapshot()
                            .save_to_file(&path)
                            .with_context(|| format!("Failed to save snapshot: {}", path.display()))?;
                    }
                    summary
                }
                Backend::Rdf => {
                    if snapshot.is_some() {
                        tracing::warn!("Snapshots are only taken of the memory backend, ignoring --snapshot");
                    }
                    let (summary, _) = populate(open_rdf(&config.store.storage_path)?, &config, &inventory, reset)?;
                    summary
                }
            };
            print_summary(cli.format, &summary)?;
        }
        Commands::Collect { output } => {
            let inventory = collect_inventory(&mut CommandCollector::new(config.collector.clone()));
            inventory.save(&output)?;
            if cli.format == OutputFormat::Text {
                println!("Collected {} records into {}", inventory.total_records(), output.display());
            }
        }
        Commands::Summary { snapshot } => {
            let snapshot = GraphSnapshot::load_from_file(&snapshot)
                .with_context(|| format!("Failed to load snapshot: {}", snapshot.display()))?;
            let taken_at = snapshot.taken_at.clone();
            let graph = MemoryGraph::from_snapshot(snapshot)?;
            let shape = GraphShape::capture(&graph)?;
            match cli.format {
                OutputFormat::Json => {
                    let out = json!({
                        "taken_at": taken_at,
                        "labels": shape.label_counts(),
                        "relations": shape.relation_counts(),
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Text => {
                    println!("Snapshot taken at {}", taken_at);
                    println!("\nNodes:");
                    for (label, count) in shape.label_counts() {
                        println!("  {:<24} {:>8}", label, count);
                    }
                    println!("\nRelationships:");
                    for (relation, count) in shape.relation_counts() {
                        println!("  {:<24} {:>8}", relation, count);
                    }
                }
            }
        }
        Commands::Sparql { query } => {
            let graph = open_rdf(&config.store.storage_path)?;
            println!("{}", graph.query_sparql(&query)?);
        }
    }

    Ok(())
}

fn populate<S: GraphStore>(
    store: S,
    config: &MapperConfig,
    inventory: &Inventory,
    reset: bool,
) -> Result<(ImportSummary, S)> {
    let mut populator = GraphPopulator::new(store, config);
    if reset {
        populator.clear()?;
    }
    let summary = populator.import(inventory)?;
    Ok((summary, populator.into_store()))
}

#[cfg(feature = "rocksdb")]
fn open_rdf(path: &Path) -> Result<RdfGraph> {
    RdfGraph::open(path).with_context(|| format!("Failed to open graph store: {}", path.display()))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rdf(path: &Path) -> Result<RdfGraph> {
    tracing::warn!(path = %path.display(), "Built without rocksdb, using a volatile RDF store");
    Ok(RdfGraph::in_memory()?)
}

fn print_summary(format: OutputFormat, summary: &ImportSummary) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Run {} ({} - {})", summary.run_id, summary.started_at, summary.finished_at);
    println!(
        "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10} {:>8}",
        "KIND", "RECORDS", "NODES", "EDGES", "SKIPPED", "MALFORMED", "FAILED"
    );
    let rows = summary
        .kinds
        .iter()
        .map(|r| (r.kind.to_string(), r.counts))
        .chain(std::iter::once(("total".to_string(), summary.totals())));
    for (kind, c) in rows {
        println!(
            "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10} {:>8}",
            kind,
            c.records,
            c.nodes_created,
            c.edges_created,
            c.skipped_relations,
            c.malformed_records,
            c.store_failures
        );
    }
    Ok(())
}
