//! Error types for the scoregraph-rebuild crate.

use thiserror::Error;

use scoregraph_core::ScoregraphError;
use scoregraph_graph::GraphError;

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error(transparent)]
    Core(#[from] ScoregraphError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

}

impl RebuildError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Core(ScoregraphError::data(msg))
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Core(ScoregraphError::usage(msg))
    }
}

pub type Result<T> = std::result::Result<T, RebuildError>;
