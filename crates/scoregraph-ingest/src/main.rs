//! CLI entry point for scoregraph-import.
//!
//! Loads a score tree from JSON, derives its moments and writes it into
//! Neo4j. Also exposes the store's catalog and maintenance calls. Results are
//! written to stdout as JSON.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use scoregraph_core::config::Settings;
use scoregraph_core::ScoreTree;
use scoregraph_graph::{GraphClient, GraphConfig, GraphStore};
use scoregraph_ingest::{add_moments, ingest_score, CallbackRegistry};

#[derive(Parser)]
#[command(name = "scoregraph-import")]
#[command(about = "Import music scores into a Neo4j property graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: scoregraph).
    #[arg(short, long, default_value = "scoregraph", global = true)]
    config: String,

    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Import a score tree stored as JSON.
    Import {
        /// Path to the score tree file.
        path: String,
        /// Do not derive moments before importing.
        #[arg(long)]
        no_moments: bool,
        /// Add moments even if the tree already has some.
        #[arg(long, conflicts_with = "no_moments")]
        force_moments: bool,
    },
    /// Delete every vertex and edge in the store.
    Wipe {
        /// Vertices deleted per statement.
        #[arg(long, default_value_t = 10_000)]
        batch_size: usize,
    },
    /// List stored scores with their titles and contributors.
    Scores {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Count vertices and edges in the store.
    Stats,
    /// List the vertex types in the store.
    NodeTypes,
    /// List the property names of a vertex type, with their distinct values.
    NodeProperties {
        /// Vertex type, e.g. Note.
        node_type: String,
    },
    /// List relationship types with the vertex types they connect.
    RelationshipTypes,
    /// List the property names of a relationship type, with their distinct values.
    RelationshipProperties {
        /// Relationship type, e.g. NoteToNote.
        rel_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let settings = Settings::load(&cli.config)?;
    let graph = GraphClient::connect(&GraphConfig::from(&settings)).await?;

    match cli.command {
        Command::Import {
            ref path,
            no_moments,
            force_moments,
        } => {
            let text = std::fs::read_to_string(path)?;
            let mut tree = ScoreTree::from_json(&text)?;
            if !no_moments {
                let added = add_moments(&mut tree, force_moments)?;
                tracing::info!(moments = added, "Derived moments");
            }
            let registry = CallbackRegistry::with_defaults();
            let summary = ingest_score(&graph, &tree, &registry, &settings.staging).await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Command::Wipe { batch_size } => {
            let deleted = graph.wipe_database(batch_size).await?;
            println!("{}", serde_json::json!({ "deleted": deleted }));
        }
        Command::Scores { skip, limit } => {
            let scores = graph.list_scores(skip, limit).await?;
            println!("{}", serde_json::to_string(&scores)?);
        }
        Command::Stats => {
            let vertices = graph.count_vertices().await?;
            let edges = graph.count_edges().await?;
            println!(
                "{}",
                serde_json::json!({ "vertices": vertices, "edges": edges })
            );
        }
        Command::NodeTypes => {
            let types = graph.list_node_types().await?;
            println!("{}", serde_json::to_string(&types)?);
        }
        Command::NodeProperties { ref node_type } => {
            let props = graph.list_node_properties(node_type).await?;
            println!("{}", serde_json::to_string(&props)?);
        }
        Command::RelationshipTypes => {
            let types = graph.list_relationship_types().await?;
            println!("{}", serde_json::to_string(&types)?);
        }
        Command::RelationshipProperties { ref rel_type } => {
            let props = graph.list_relationship_properties(rel_type).await?;
            println!("{}", serde_json::to_string(&props)?);
        }
    }

    Ok(())
}
