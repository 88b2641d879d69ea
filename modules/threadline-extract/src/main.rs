use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use threadline_common::{FileConfig, Neo4jConfig, OutputKind, Subject};
use threadline_extract::output::{CsvRecordWriter, OutputWriter};
use threadline_extract::{run_extraction, ReplyGraph, RunSettings};
use threadline_graph::{migrate::migrate, ConversationWriter, GraphClient, ReplyGraphReader};

#[derive(Parser)]
#[command(name = "threadline", about = "Extract subject conversations from a reply graph")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/threadline.toml")]
    config: PathBuf,

    /// Override extraction.workers
    #[arg(long)]
    workers: Option<usize>,

    /// Only extract these subject ids (repeatable)
    #[arg(long = "subject")]
    subjects: Vec<String>,

    /// Override output.dir
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip schema migrations at start-up
    #[arg(long)]
    skip_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("threadline=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!(config = %cli.config.display(), "Loading config");
    let mut config = FileConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let neo4j = Neo4jConfig::from_env()?;
    neo4j.log_redacted();

    let client = GraphClient::from_config(&neo4j)
        .await
        .context("Failed to connect to Neo4j")?;

    if cli.skip_migrate {
        info!("Skipping schema migrations");
    } else {
        migrate(&client).await.context("Schema migration failed")?;
    }

    let settings = RunSettings::from(&config);
    let writer = match config.output.kind {
        OutputKind::Csv => OutputWriter::Csv(CsvRecordWriter::create(&config.output.dir)?),
        OutputKind::Graph => {
            info!(run_id = %settings.run_id, "Writing conversations to the graph");
            OutputWriter::Graph(ConversationWriter::new(
                client.clone(),
                settings.run_id.to_string(),
            ))
        }
    };

    let graph: Arc<dyn ReplyGraph> = Arc::new(ReplyGraphReader::new(client));

    let report = tokio::select! {
        report = run_extraction(graph, writer, config.subjects.clone(), settings) => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; conversations persisted so far are kept");
            bail!("extraction interrupted");
        }
    };

    info!("Extraction complete.\n{report}");
    Ok(())
}

/// Fold CLI flags into the file config. `--subject` narrows the run to the
/// given ids, keeping configured names where the id is known.
fn apply_overrides(config: &mut FileConfig, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.extraction.workers = workers;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if !cli.subjects.is_empty() {
        config.subjects = cli
            .subjects
            .iter()
            .map(|id| {
                config
                    .subjects
                    .iter()
                    .find(|s| &s.id == id)
                    .cloned()
                    .unwrap_or_else(|| Subject::new(id.as_str()))
            })
            .collect();
    }
}
