//! Read operations: pattern execution, entity lookups, and the store catalog.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use scoregraph_core::vertex::RelationshipType;
use scoregraph_core::{EdgeData, Properties, RemoteRef, VertexData};

use crate::client::{GraphClient, GraphError};
use crate::mutations::{BATCH_INDEX, BATCH_KEY};
use crate::store::{Cell, ParamValue, QueryRows, Statement};

/// A score known to the store, with its metadata when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub id: RemoteRef,
    pub title: Option<String>,
    pub movement_name: Option<String>,
    pub contributors: Vec<String>,
}

/// A property name together with the distinct values seen for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValues {
    pub name: String,
    pub values: Vec<String>,
}

impl GraphClient {
    // ── Pattern Execution ────────────────────────────────────────

    /// Run compiled pattern text and read the named columns of every row.
    pub async fn execute_pattern(
        &self,
        text: &str,
        params: &[(String, ParamValue)],
        columns: &[String],
    ) -> Result<QueryRows, GraphError> {
        let mut stmt = Statement::new("pattern", text);
        stmt.params = params.to_vec();

        let rows = self.query_rows(&stmt).await?;
        let mut out = QueryRows {
            columns: columns.to_vec(),
            rows: Vec::with_capacity(rows.len()),
        };
        for row in &rows {
            out.rows
                .push(columns.iter().map(|c| cell_from_row(row, c)).collect());
        }
        tracing::debug!(rows = out.rows.len(), "Pattern executed");
        Ok(out)
    }

    // ── Entity Lookups ───────────────────────────────────────────

    /// Property bags of the given vertices, in request order.
    pub async fn fetch_vertices(&self, refs: &[RemoteRef]) -> Result<Vec<VertexData>, GraphError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = Statement::new(
            "fetch_vertices",
            "UNWIND range(0, size($ids) - 1) AS i
             MATCH (n) WHERE id(n) = $ids[i]
             RETURN i, id(n) AS id, apoc.convert.toJson(properties(n)) AS props
             ORDER BY i",
        )
        .param("ids", ParamValue::IntList(refs.iter().map(|r| r.0).collect()));

        let rows = self.query_rows(&stmt).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .get("id")
                .map_err(|e| GraphError::Serialization(format!("Failed to read vertex id: {e}")))?;
            let props: String = row.get("props").map_err(|e| {
                GraphError::Serialization(format!("Failed to read vertex properties: {e}"))
            })?;
            results.push(VertexData {
                id: RemoteRef(id),
                properties: parse_props(&props)?,
            });
        }
        Ok(results)
    }

    /// Edge records of the given edges, in request order.
    pub async fn fetch_edges(&self, refs: &[RemoteRef]) -> Result<Vec<EdgeData>, GraphError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = Statement::new(
            "fetch_edges",
            "UNWIND range(0, size($ids) - 1) AS i
             MATCH ()-[r]->() WHERE id(r) = $ids[i]
             RETURN i, id(r) AS id, id(startNode(r)) AS start_id, id(endNode(r)) AS end_id,
                    type(r) AS rel_type, apoc.convert.toJson(properties(r)) AS props
             ORDER BY i",
        )
        .param("ids", ParamValue::IntList(refs.iter().map(|r| r.0).collect()));

        let rows = self.query_rows(&stmt).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |key: &str| -> Result<i64, GraphError> {
                row.get::<i64>(key)
                    .map_err(|e| GraphError::Serialization(format!("Failed to read {key}: {e}")))
            };
            let rel_type: String = row.get("rel_type").map_err(|e| {
                GraphError::Serialization(format!("Failed to read relationship type: {e}"))
            })?;
            let props: String = row.get("props").unwrap_or_else(|_| "{}".to_string());
            results.push(EdgeData {
                id: RemoteRef(read("id")?),
                start: RemoteRef(read("start_id")?),
                end: RemoteRef(read("end_id")?),
                rel_type,
                properties: parse_props(&props)?,
            });
        }
        Ok(results)
    }

    // ── Counts ───────────────────────────────────────────────────

    pub(crate) async fn count(&self, cypher: &'static str) -> Result<u64, GraphError> {
        self.count_statement(&Statement::new("count", cypher)).await
    }

    pub(crate) async fn count_statement(&self, stmt: &Statement) -> Result<u64, GraphError> {
        match self.query_one(stmt).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0).max(0) as u64),
            None => Ok(0),
        }
    }

    // ── Catalog ──────────────────────────────────────────────────

    /// Distinct `(start type, relationship type, end type)` triples.
    pub async fn list_relationship_types(&self) -> Result<Vec<RelationshipType>, GraphError> {
        let stmt = Statement::new(
            "relationship_types",
            "MATCH (a)-[r]->(b)
             RETURN DISTINCT a.type AS start_type, type(r) AS rel_type, b.type AS end_type
             ORDER BY rel_type, start_type, end_type",
        );
        let rows = self.query_rows(&stmt).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(RelationshipType {
                start: row.get("start_type").unwrap_or_default(),
                rel_type: row.get("rel_type").unwrap_or_default(),
                end: row.get("end_type").unwrap_or_default(),
            });
        }
        Ok(results)
    }

    /// Every vertex type present in the store.
    pub async fn list_node_types(&self) -> Result<Vec<String>, GraphError> {
        let stmt = Statement::new(
            "node_types",
            "MATCH (n) WHERE n.type IS NOT NULL
             RETURN DISTINCT n.type AS node_type
             ORDER BY node_type",
        );
        let rows = self.query_rows(&stmt).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<String>("node_type").ok())
            .collect())
    }

    /// Property names of one vertex type with the distinct values each takes.
    pub async fn list_node_properties(
        &self,
        node_type: &str,
    ) -> Result<Vec<PropertyValues>, GraphError> {
        let stmt = Statement::new(
            "node_properties",
            "MATCH (n) WHERE n.type = $type
             UNWIND keys(n) AS k
             WITH k, n[k] AS v
             WHERE NOT k IN $hidden
             RETURN k AS name, collect(DISTINCT toString(v)) AS vals
             ORDER BY name",
        )
        .param("type", ParamValue::Text(node_type.to_string()))
        .param("hidden", hidden_keys());
        self.property_values(&stmt).await
    }

    /// Property names of one relationship type with the distinct values each takes.
    pub async fn list_relationship_properties(
        &self,
        rel_type: &str,
    ) -> Result<Vec<PropertyValues>, GraphError> {
        let stmt = Statement::new(
            "relationship_properties",
            "MATCH ()-[r]->() WHERE type(r) = $type
             UNWIND keys(r) AS k
             WITH k, r[k] AS v
             WHERE NOT k IN $hidden
             RETURN k AS name, collect(DISTINCT toString(v)) AS vals
             ORDER BY name",
        )
        .param("type", ParamValue::Text(rel_type.to_string()))
        .param("hidden", hidden_keys());
        self.property_values(&stmt).await
    }

    async fn property_values(&self, stmt: &Statement) -> Result<Vec<PropertyValues>, GraphError> {
        let rows = self.query_rows(stmt).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values: Vec<String> = row.get("vals").unwrap_or_default();
            values.sort();
            results.push(PropertyValues {
                name: row.get("name").unwrap_or_default(),
                values,
            });
        }
        Ok(results)
    }

    /// Scores in the store with their metadata title and contributor names.
    pub async fn list_scores(&self, skip: u32, limit: u32) -> Result<Vec<ScoreSummary>, GraphError> {
        let stmt = Statement::new(
            "list_scores",
            "MATCH (s:Score)
             OPTIONAL MATCH (m:Metadata)-[:MetadataInScore]->(s)
             OPTIONAL MATCH (c:Contributor)-[:ContributorInMetadata]->(m)
             RETURN id(s) AS id, m.title AS title, m.movementName AS movement,
                    collect(c.names) AS names
             ORDER BY id
             SKIP $skip LIMIT $limit",
        )
        .param("skip", ParamValue::Int(skip as i64))
        .param("limit", ParamValue::Int(limit as i64));

        let rows = self.query_rows(&stmt).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .get("id")
                .map_err(|e| GraphError::Serialization(format!("Failed to read score id: {e}")))?;
            results.push(ScoreSummary {
                id: RemoteRef(id),
                title: row.get("title").ok(),
                movement_name: row.get("movement").ok(),
                contributors: row.get("names").unwrap_or_default(),
            });
        }
        Ok(results)
    }
}

fn hidden_keys() -> ParamValue {
    ParamValue::TextList(vec![
        "type".to_string(),
        BATCH_KEY.to_string(),
        BATCH_INDEX.to_string(),
    ])
}

/// Parse a property map read back as JSON text, dropping bookkeeping keys.
fn parse_props(text: &str) -> Result<Properties, GraphError> {
    let mut props: Properties = serde_json::from_str(text)
        .map_err(|e| GraphError::Serialization(format!("Invalid property map: {e}")))?;
    props.remove(BATCH_KEY);
    props.remove(BATCH_INDEX);
    Ok(props)
}

/// Convert one column of a row into a [`Cell`], whatever the column holds.
fn cell_from_row(row: &neo4rs::Row, column: &str) -> Cell {
    if let Ok(node) = row.get::<neo4rs::Node>(column) {
        return Cell::Vertex {
            id: RemoteRef(node.id()),
            vertex_type: node.get::<String>("type").ok(),
        };
    }
    if let Ok(rel) = row.get::<neo4rs::Relation>(column) {
        return Cell::Edge {
            id: RemoteRef(rel.id()),
            rel_type: rel.get::<String>("type").ok(),
        };
    }
    let value = if let Ok(i) = row.get::<i64>(column) {
        json!(i)
    } else if let Ok(f) = row.get::<f64>(column) {
        scoregraph_core::properties::float(f)
    } else if let Ok(b) = row.get::<bool>(column) {
        json!(b)
    } else if let Ok(s) = row.get::<String>(column) {
        json!(s)
    } else {
        Value::Null
    };
    Cell::Value { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_props_drops_batch_keys() {
        let props = parse_props(
            r#"{"type":"Note","pitch":"C4","importBatch":"b","batchIndex":3}"#,
        )
        .unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props["pitch"], "C4");
    }

    #[test]
    fn test_parse_props_rejects_garbage() {
        assert!(matches!(
            parse_props("not json"),
            Err(GraphError::Serialization(_))
        ));
    }
}
