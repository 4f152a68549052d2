//! CLI entry point for scoregraph-query.
//!
//! Compiles a JSON query document into a Cypher pattern, runs it, and
//! optionally rebuilds the score fragment around the matched notes. Results
//! are written to stdout as JSON.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use scoregraph_core::config::Settings;
use scoregraph_graph::{GraphClient, GraphConfig, QuerySpec};
use scoregraph_rebuild::rebuild_query;

#[derive(Parser)]
#[command(name = "scoregraph-query")]
#[command(about = "Query a score graph and rebuild the matched fragments")]
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
    /// Print the Cypher a query document compiles to. No connection is made.
    Compile {
        /// Path to the query document.
        path: String,
    },
    /// Run a query document and print the matched rows.
    Run {
        path: String,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Run a query document and print the score tree rebuilt around its hits.
    Rebuild {
        path: String,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// Also pull in ornaments, beams, spanners and other attached objects.
        #[arg(long)]
        full: bool,
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

    match cli.command {
        Command::Compile { ref path } => {
            let spec = QuerySpec::from_json(&std::fs::read_to_string(path)?)?;
            let mut query = spec.into_builder()?;
            let compiled = query.builder.compile()?;
            println!(
                "{}",
                serde_json::json!({
                    "text": compiled.text,
                    "columns": compiled.columns,
                    "leafColumns": query.leaf_columns,
                })
            );
        }
        Command::Run {
            ref path,
            skip,
            limit,
        } => {
            let spec = QuerySpec::from_json(&std::fs::read_to_string(path)?)?;
            let mut query = spec.into_builder()?;
            let graph = GraphClient::connect(&GraphConfig::from(&settings)).await?;
            let rows = query.builder.execute(&graph, skip, limit).await?;
            println!("{}", serde_json::to_string(&rows)?);
        }
        Command::Rebuild {
            ref path,
            skip,
            limit,
            full,
        } => {
            let spec = QuerySpec::from_json(&std::fs::read_to_string(path)?)?;
            let mut query = spec.into_builder()?;
            let graph = GraphClient::connect(&GraphConfig::from(&settings)).await?;
            let tree = rebuild_query(&graph, &mut query, skip, limit, full, &settings.rebuild).await?;
            println!("{}", serde_json::to_string(&tree)?);
        }
    }

    Ok(())
}
