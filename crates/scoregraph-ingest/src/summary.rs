//! Import summaries and their content digest.
//!
//! The digest covers the staged vertices and edges as they were extracted, so
//! two imports of the same tree produce the same hash regardless of which
//! remote identities the store handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scoregraph_core::vertex::{EdgeRecord, StagingRecord};
use scoregraph_core::{Properties, RemoteRef};

use crate::error::Result;

/// Outcome of one [`crate::ingest_score`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Remote identity of the score's root vertex.
    pub score_root: Option<RemoteRef>,
    pub vertices: usize,
    pub edges: usize,
    /// BLAKE3 hex digest of the staged content.
    pub content_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HashableVertex<'a> {
    key: usize,
    parent_key: Option<usize>,
    vertex: &'a Properties,
}

#[derive(Serialize)]
struct HashableEdge<'a> {
    start: usize,
    rel_type: &'a str,
    end: usize,
    properties: &'a Properties,
}

#[derive(Serialize)]
struct HashableImport<'a> {
    vertices: Vec<HashableVertex<'a>>,
    edges: Vec<HashableEdge<'a>>,
}

/// Digest of staged vertices and edges, in staging order.
pub fn content_digest(vertices: &[StagingRecord], edges: &[EdgeRecord]) -> Result<String> {
    let hashable = HashableImport {
        vertices: vertices
            .iter()
            .map(|r| HashableVertex {
                key: r.key.0,
                parent_key: r.parent_key.map(|k| k.0),
                vertex: &r.vertex,
            })
            .collect(),
        edges: edges
            .iter()
            .map(|e| HashableEdge {
                start: e.start.0,
                rel_type: &e.rel_type,
                end: e.end.0,
                properties: &e.properties,
            })
            .collect(),
    };

    let json = serde_json::to_vec(&hashable).map_err(scoregraph_core::ScoregraphError::from)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
