//! Error types for the scoregraph-ingest crate.

use thiserror::Error;

use scoregraph_core::ScoregraphError;
use scoregraph_graph::GraphError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Core(#[from] ScoregraphError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Core(ScoregraphError::data(msg))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
