//! scoregraph-ingest: score tree → property graph.
//!
//! An [`Extractor`] walks the score tree, lets the registered callbacks shape
//! each vertex, and stages the result. [`ingest_score`] then commits the
//! staged vertices and, once every vertex has a remote identity, the edges.

pub mod callbacks;
pub mod error;
pub mod extractor;
pub mod moments;
pub mod summary;

pub use callbacks::{CallbackRegistry, Flow, Visit};
pub use error::{IngestError, Result};
pub use extractor::{ExtractCounts, Extractor};
pub use moments::{add_moments, build_moments, MomentSlice};
pub use summary::ImportSummary;

use chrono::Utc;

use scoregraph_core::config::StagingSettings;
use scoregraph_core::ScoreTree;
use scoregraph_graph::{GraphStore, StagingStore};

/// Extract `tree` and commit it to `store`.
///
/// Nothing is sent when extraction fails. Batches already committed before a
/// later batch fails stay in the store.
pub async fn ingest_score<S: GraphStore + ?Sized>(
    store: &S,
    tree: &ScoreTree,
    registry: &CallbackRegistry,
    settings: &StagingSettings,
) -> Result<ImportSummary> {
    let started_at = Utc::now();
    let mut staging = StagingStore::from_settings(settings);
    let counts = Extractor::new(tree, registry, &mut staging).extract(tree.root())?;

    let vertices = staging.vertices()?.to_vec();
    let edges = staging.edges()?.to_vec();
    let content_hash = summary::content_digest(&vertices, &edges)?;

    let refs = staging
        .commit_vertices(store, settings.vertex_batch_size)
        .await?;
    let committed_edges = staging
        .commit_edges(store, settings.edge_batch_size)
        .await?;

    let summary = ImportSummary {
        score_root: refs.get(&tree.root()).copied(),
        vertices: refs.len(),
        edges: committed_edges,
        content_hash,
        started_at,
        finished_at: Utc::now(),
    };
    tracing::info!(
        vertices = summary.vertices,
        edges = summary.edges,
        staged_vertices = counts.vertices,
        hash = %summary.content_hash,
        "Score imported"
    );
    Ok(summary)
}
