//! Write operations for the score graph.
//!
//! Batch creates MERGE on `(importBatch, batchIndex)` so a batch that is
//! retried after a lost response does not create a second copy. The `type`
//! property of every vertex doubles as its label.

use uuid::Uuid;

use scoregraph_core::properties::stored_bag;
use scoregraph_core::{EdgeSpec, Properties, RemoteRef};

use crate::client::{GraphClient, GraphError};
use crate::store::{ParamValue, Statement};

/// Property naming the batch a vertex or edge was created in.
pub const BATCH_KEY: &str = "importBatch";
/// Property holding the position inside that batch.
pub const BATCH_INDEX: &str = "batchIndex";

impl GraphClient {
    // ── Batch Creates ────────────────────────────────────────────

    /// Create vertices, returning their refs in request order.
    pub async fn create_vertex_batch(
        &self,
        batch: &[Properties],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let rows = batch
            .iter()
            .map(|props| ser(&stored_bag(props)))
            .collect::<Result<Vec<_>, _>>()?;

        let stmt = Statement::new(
            "create_vertices",
            "UNWIND range(0, size($rows) - 1) AS i
             MERGE (n:ScoreGraphVertex {importBatch: $batch, batchIndex: i})
             ON CREATE SET n += apoc.convert.fromJsonMap($rows[i])
             WITH i, n
             CALL apoc.create.addLabels(n, [n.type]) YIELD node
             RETURN i, id(node) AS ref
             ORDER BY i",
        )
        .param("rows", ParamValue::TextList(rows))
        .param("batch", ParamValue::Text(batch_key.to_string()));

        let refs = self.indexed_refs(&stmt).await?;
        tracing::debug!(batch = %batch_key, count = refs.len(), "Created vertex batch");
        Ok(refs)
    }

    /// Create edges between already committed vertices, returning refs in request order.
    pub async fn create_edge_batch(
        &self,
        batch: &[EdgeSpec],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let props = batch
            .iter()
            .map(|e| ser(&stored_bag(&e.properties)))
            .collect::<Result<Vec<_>, _>>()?;

        let stmt = Statement::new(
            "create_edges",
            "UNWIND range(0, size($starts) - 1) AS i
             MATCH (a) WHERE id(a) = $starts[i]
             MATCH (b) WHERE id(b) = $ends[i]
             CALL apoc.merge.relationship(
               a, $types[i], {importBatch: $batch, batchIndex: i},
               apoc.convert.fromJsonMap($props[i]), b, {}
             ) YIELD rel
             RETURN i, id(rel) AS ref
             ORDER BY i",
        )
        .param(
            "starts",
            ParamValue::IntList(batch.iter().map(|e| e.start.0).collect()),
        )
        .param(
            "ends",
            ParamValue::IntList(batch.iter().map(|e| e.end.0).collect()),
        )
        .param(
            "types",
            ParamValue::TextList(batch.iter().map(|e| e.rel_type.clone()).collect()),
        )
        .param("props", ParamValue::TextList(props))
        .param("batch", ParamValue::Text(batch_key.to_string()));

        let refs = self.indexed_refs(&stmt).await?;
        tracing::debug!(batch = %batch_key, count = refs.len(), "Created edge batch");
        Ok(refs)
    }

    async fn indexed_refs(&self, stmt: &Statement) -> Result<Vec<RemoteRef>, GraphError> {
        let rows = self.query_rows(stmt).await?;
        let mut refs = Vec::with_capacity(rows.len());
        for (expected, row) in rows.iter().enumerate() {
            let i: i64 = row
                .get("i")
                .map_err(|e| GraphError::Serialization(format!("Missing batch index: {e}")))?;
            if i != expected as i64 {
                return Err(GraphError::Consistency(format!(
                    "batch response out of order: got index {i} at position {expected}"
                )));
            }
            let id: i64 = row
                .get("ref")
                .map_err(|e| GraphError::Serialization(format!("Missing created ref: {e}")))?;
            refs.push(RemoteRef(id));
        }
        Ok(refs)
    }

    // ── Deletes ──────────────────────────────────────────────────

    /// Detach-delete vertices by ref.
    pub async fn delete_vertices(&self, refs: &[RemoteRef]) -> Result<u64, GraphError> {
        if refs.is_empty() {
            return Ok(0);
        }
        let stmt = Statement::new(
            "delete_batch",
            "UNWIND $ids AS i
             MATCH (n) WHERE id(n) = i
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param(
            "ids",
            ParamValue::IntList(refs.iter().map(|r| r.0).collect()),
        );
        self.count_statement(&stmt).await
    }

    /// Remove every vertex and edge, `batch_size` vertices at a time.
    pub async fn wipe_database(&self, batch_size: usize) -> Result<u64, GraphError> {
        let stmt = Statement::new(
            "wipe_database",
            "MATCH (n)
             WITH n LIMIT $limit
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("limit", ParamValue::Int(batch_size.max(1) as i64));

        let mut total = 0;
        loop {
            let deleted = self.count_statement(&stmt).await?;
            total += deleted;
            if deleted == 0 {
                break;
            }
            tracing::debug!(deleted, total, "Wiped vertex batch");
        }
        tracing::info!(total, "Database wiped");
        Ok(total)
    }
}

fn ser(props: &Properties) -> Result<String, GraphError> {
    serde_json::to_string(props).map_err(|e| GraphError::Serialization(e.to_string()))
}
