use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use depscope::core::project::to_slash;
use depscope::core::types::FileId;
use depscope::core::AnalysisCoordinator;
use depscope::AnalysisConfig;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "depscope",
    version,
    about = "Incremental import graph, cycle and doc-link analysis"
)]
struct Cli {
    /// Project root to analyze
    #[arg(value_name = "PATH", default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to <root>/depscope.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long)]
    no_cache: bool,

    /// Do not look up bare module names in node_modules
    #[arg(long)]
    no_node_modules: bool,

    /// Stop discovery after this many files
    #[arg(long, value_name = "N")]
    max_files: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::load_or_default(&cli.root)?,
    };
    if cli.no_cache {
        config.cache_file = None;
    }
    if cli.no_node_modules {
        config.resolve_node_modules = false;
    }
    if cli.max_files.is_some() {
        config.max_files = cli.max_files;
    }

    info!(
        "depscope v{} analyzing {}",
        env!("CARGO_PKG_VERSION"),
        config.root.display()
    );

    let mut coordinator = AnalysisCoordinator::new(config).await?;
    let report = coordinator.analyze().await?;
    let store = coordinator.store();

    let name = |id: FileId| {
        store
            .file(id)
            .map(|record| to_slash(&record.project_relative_path))
            .unwrap_or_else(|| id.to_string())
    };

    let graph: BTreeMap<String, serde_json::Value> = report
        .graph
        .to_adjacency()
        .into_iter()
        .map(|(id, node)| {
            let forward: Vec<String> = node.forward_edges.into_iter().map(name).collect();
            let reverse: Vec<String> = node.reverse_edges.into_iter().map(name).collect();
            (name(id), json!({ "imports": forward, "importedBy": reverse }))
        })
        .collect();

    let cycles: Vec<serde_json::Value> = report
        .cycles
        .iter()
        .map(|cycle| {
            let path: Vec<String> = cycle
                .cycle_path
                .iter()
                .map(|record| to_slash(&record.project_relative_path))
                .collect();
            json!({ "path": path, "severity": cycle.severity, "length": cycle.length })
        })
        .collect();

    let links: Vec<serde_json::Value> = report
        .document_links
        .iter()
        .map(|link| {
            json!({
                "document": name(link.document_file_id),
                "code": name(link.code_file_id),
                "kind": link.link_kind,
                "context": link.context,
            })
        })
        .collect();

    let strengths: BTreeMap<String, f64> = report
        .link_strengths
        .iter()
        .map(|(id, score)| (name(*id), *score))
        .collect();

    let output = json!({
        "statistics": report.statistics,
        "graph": graph,
        "cycles": cycles,
        "documentLinks": links,
        "linkStrength": strengths,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
