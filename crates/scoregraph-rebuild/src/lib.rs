//! scoregraph-rebuild: query results → score tree.
//!
//! A [`Reconstructor`] widens the leaves a pattern matched into a coherent
//! fragment of the stored score through a [`SubgraphSource`], then rebuilds
//! it as a typed tree with the registered construction callbacks.

pub mod construct;
pub mod error;
pub mod reconstructor;
pub mod source;
pub mod working_set;

pub use construct::{ConstructRegistry, Construction, Outcome, RebuildState};
pub use error::{RebuildError, Result};
pub use reconstructor::{matched_leaves, rebuild_tree, Reconstructor};
pub use source::{StoreSource, Subgraph, SubgraphSource};
pub use working_set::WorkingSet;

use scoregraph_core::config::RebuildSettings;
use scoregraph_core::ScoreTree;
use scoregraph_graph::query::PreparedQuery;
use scoregraph_graph::GraphStore;

/// Run one page of a prepared query and rebuild the score around its leaves.
pub async fn rebuild_query<S: GraphStore + ?Sized>(
    store: &S,
    query: &mut PreparedQuery,
    skip: u32,
    limit: u32,
    full: bool,
    settings: &RebuildSettings,
) -> Result<ScoreTree> {
    let rows = query.builder.execute(store, skip, limit).await?;
    let (leaves, names) = matched_leaves(&rows, &query.leaf_columns);
    if leaves.is_empty() {
        return Err(RebuildError::usage(
            "the query matched no Note or Rest to rebuild around",
        ));
    }
    tracing::info!(rows = rows.rows.len(), leaves = leaves.len(), "Query matched");

    let source = StoreSource::new(store);
    let registry = ConstructRegistry::with_defaults();
    Reconstructor::new(&source, &registry, settings)
        .reconstruct(&leaves, &names, full)
        .await
}
