//! Local staging of vertices and edges ahead of a remote commit.
//!
//! Writes are queued and applied on [`StagingStore::flush`], which also runs
//! before every read and automatically once the queue grows past the
//! threshold. Records are keyed by the source node's arena index, so two
//! nodes with equal content still get two vertices.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use scoregraph_core::config::StagingSettings;
use scoregraph_core::vertex::{EdgeRecord, StagingRecord, TYPE_KEY};
use scoregraph_core::{EdgeSpec, NodeId, Properties, RemoteRef};

use crate::client::GraphError;
use crate::store::GraphStore;

pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

#[derive(Debug, Clone)]
enum PendingWrite {
    Insert {
        key: NodeId,
        parent_key: Option<NodeId>,
        vertex: Properties,
    },
    Update {
        key: NodeId,
        field: String,
        value: Value,
    },
    Edge(EdgeRecord),
}

#[derive(Debug)]
pub struct StagingStore {
    records: Vec<StagingRecord>,
    index: HashMap<NodeId, usize>,
    edges: Vec<EdgeRecord>,
    pending: Vec<PendingWrite>,
    committed: HashMap<NodeId, RemoteRef>,
    flush_threshold: usize,
}

impl Default for StagingStore {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl StagingStore {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            pending: Vec::new(),
            committed: HashMap::new(),
            flush_threshold,
        }
    }

    pub fn from_settings(settings: &StagingSettings) -> Self {
        Self::new(settings.flush_threshold)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Stage a vertex. A key that is already staged gets the new properties merged in.
    pub fn add_vertex(
        &mut self,
        key: NodeId,
        parent_key: Option<NodeId>,
        vertex: Properties,
    ) -> Result<StagingRecord, GraphError> {
        let record = StagingRecord {
            key,
            parent_key,
            vertex: vertex.clone(),
            remote_ref: None,
        };
        self.enqueue(PendingWrite::Insert {
            key,
            parent_key,
            vertex,
        })?;
        Ok(record)
    }

    /// Queue an overwrite of one field of a staged vertex.
    ///
    /// The key must already be staged or queued for insertion; otherwise
    /// nothing is queued and a consistency error is returned.
    pub fn update_vertex(
        &mut self,
        key: NodeId,
        field: impl Into<String>,
        value: Value,
    ) -> Result<(), GraphError> {
        let field = field.into();
        if !self.is_known(key) {
            return Err(GraphError::Consistency(format!(
                "update of field '{field}' on unstaged vertex {key}"
            )));
        }
        self.enqueue(PendingWrite::Update { key, field, value })
    }

    fn is_known(&self, key: NodeId) -> bool {
        self.index.contains_key(&key)
            || self
                .pending
                .iter()
                .any(|w| matches!(w, PendingWrite::Insert { key: k, .. } if *k == key))
    }

    /// Stage an edge. The relationship type is also recorded in its property bag.
    pub fn add_edge(
        &mut self,
        start: impl Into<NodeId>,
        rel_type: impl Into<String>,
        end: impl Into<NodeId>,
        properties: Option<Properties>,
    ) -> Result<EdgeRecord, GraphError> {
        let rel_type = rel_type.into();
        let mut properties = properties.unwrap_or_default();
        properties.insert(TYPE_KEY.to_string(), Value::String(rel_type.clone()));
        let record = EdgeRecord {
            start: start.into(),
            rel_type,
            end: end.into(),
            properties,
            remote_ref: None,
        };
        self.enqueue(PendingWrite::Edge(record.clone()))?;
        Ok(record)
    }

    fn enqueue(&mut self, write: PendingWrite) -> Result<(), GraphError> {
        self.pending.push(write);
        if self.pending.len() > self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Apply every queued write in order.
    pub fn flush(&mut self) -> Result<(), GraphError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.pending).into_iter();
        let count = pending.len();
        while let Some(write) = pending.next() {
            match write {
                PendingWrite::Insert {
                    key,
                    parent_key,
                    vertex,
                } => match self.index.get(&key) {
                    Some(&i) => {
                        let record = &mut self.records[i];
                        record.vertex.extend(vertex);
                        if parent_key.is_some() {
                            record.parent_key = parent_key;
                        }
                    }
                    None => {
                        self.index.insert(key, self.records.len());
                        self.records.push(StagingRecord {
                            key,
                            parent_key,
                            vertex,
                            remote_ref: None,
                        });
                    }
                },
                PendingWrite::Update { key, field, value } => match self.index.get(&key) {
                    Some(&i) => {
                        self.records[i].vertex.insert(field, value);
                    }
                    None => {
                        // Keep the unapplied tail queued.
                        self.pending = pending.collect();
                        return Err(GraphError::Consistency(format!(
                            "update of field '{field}' on unstaged vertex {key}"
                        )));
                    }
                },
                PendingWrite::Edge(edge) => self.edges.push(edge),
            }
        }
        tracing::debug!(writes = count, vertices = self.records.len(), "Staging flushed");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Staged vertices in insertion order.
    pub fn vertices(&mut self) -> Result<&[StagingRecord], GraphError> {
        self.flush()?;
        Ok(&self.records)
    }

    pub fn edges(&mut self) -> Result<&[EdgeRecord], GraphError> {
        self.flush()?;
        Ok(&self.edges)
    }

    pub fn record(&mut self, key: NodeId) -> Result<Option<&StagingRecord>, GraphError> {
        self.flush()?;
        Ok(self.index.get(&key).map(|&i| &self.records[i]))
    }

    /// Remote refs of every committed vertex, by staging key.
    pub fn committed(&self) -> &HashMap<NodeId, RemoteRef> {
        &self.committed
    }

    // ── Commit ───────────────────────────────────────────────────

    /// Create every uncommitted vertex remotely, `batch_size` at a time.
    pub async fn commit_vertices<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        batch_size: usize,
    ) -> Result<HashMap<NodeId, RemoteRef>, GraphError> {
        self.flush()?;
        let todo: Vec<usize> = (0..self.records.len())
            .filter(|&i| self.records[i].remote_ref.is_none())
            .collect();

        for chunk in todo.chunks(batch_size.max(1)) {
            let batch: Vec<Properties> = chunk
                .iter()
                .map(|&i| self.records[i].vertex.clone())
                .collect();
            let batch_key = Uuid::new_v4();
            let refs = store.create_vertices(&batch, batch_key).await?;
            if refs.len() != chunk.len() {
                return Err(GraphError::Consistency(format!(
                    "vertex batch {batch_key}: sent {} vertices, store answered with {} refs",
                    chunk.len(),
                    refs.len()
                )));
            }
            for (&i, remote) in chunk.iter().zip(refs) {
                let record = &mut self.records[i];
                record.remote_ref = Some(remote);
                self.committed.insert(record.key, remote);
            }
        }

        tracing::info!(vertices = todo.len(), "Committed staged vertices");
        Ok(self.committed.clone())
    }

    /// Create every uncommitted edge remotely. All endpoints must already be committed.
    pub async fn commit_edges<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        batch_size: usize,
    ) -> Result<usize, GraphError> {
        self.flush()?;
        let mut todo = Vec::new();
        let mut specs = Vec::new();
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.remote_ref.is_some() {
                continue;
            }
            let resolve = |key: NodeId| {
                self.committed.get(&key).copied().ok_or_else(|| {
                    GraphError::Consistency(format!(
                        "{} edge references vertex {key}, which was never committed",
                        edge.rel_type
                    ))
                })
            };
            specs.push(EdgeSpec {
                start: resolve(edge.start)?,
                rel_type: edge.rel_type.clone(),
                end: resolve(edge.end)?,
                properties: edge.properties.clone(),
            });
            todo.push(i);
        }

        let size = batch_size.max(1);
        for (chunk, batch) in todo.chunks(size).zip(specs.chunks(size)) {
            let batch_key = Uuid::new_v4();
            let refs = store.create_edges(batch, batch_key).await?;
            if refs.len() != batch.len() {
                return Err(GraphError::Consistency(format!(
                    "edge batch {batch_key}: sent {} edges, store answered with {} refs",
                    batch.len(),
                    refs.len()
                )));
            }
            for (&i, remote) in chunk.iter().zip(refs) {
                self.edges[i].remote_ref = Some(remote);
            }
        }

        tracing::info!(edges = todo.len(), "Committed staged edges");
        Ok(todo.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use scoregraph_core::vertex::RelationshipType;
    use scoregraph_core::{EdgeData, VertexData};
    use serde_json::json;

    use crate::store::{ParamValue, QueryRows};

    #[derive(Default)]
    struct MemoryStore {
        vertices: Mutex<Vec<Properties>>,
        edges: Mutex<Vec<EdgeSpec>>,
        drop_last: bool,
    }

    #[async_trait]
    impl GraphStore for MemoryStore {
        async fn create_vertices(
            &self,
            batch: &[Properties],
            _batch_key: Uuid,
        ) -> Result<Vec<RemoteRef>, GraphError> {
            let mut vertices = self.vertices.lock().unwrap();
            let mut refs = Vec::new();
            for props in batch {
                refs.push(RemoteRef(vertices.len() as i64));
                vertices.push(props.clone());
            }
            if self.drop_last {
                refs.pop();
            }
            Ok(refs)
        }

        async fn create_edges(
            &self,
            batch: &[EdgeSpec],
            _batch_key: Uuid,
        ) -> Result<Vec<RemoteRef>, GraphError> {
            let mut edges = self.edges.lock().unwrap();
            let mut refs = Vec::new();
            for spec in batch {
                refs.push(RemoteRef(1000 + edges.len() as i64));
                edges.push(spec.clone());
            }
            Ok(refs)
        }

        async fn execute(
            &self,
            _text: &str,
            _params: &[(String, ParamValue)],
            columns: &[String],
        ) -> Result<QueryRows, GraphError> {
            Ok(QueryRows {
                columns: columns.to_vec(),
                rows: Vec::new(),
            })
        }

        async fn delete_batch(&self, _refs: &[RemoteRef]) -> Result<u64, GraphError> {
            Ok(0)
        }

        async fn count_vertices(&self) -> Result<u64, GraphError> {
            Ok(self.vertices.lock().unwrap().len() as u64)
        }

        async fn count_edges(&self) -> Result<u64, GraphError> {
            Ok(self.edges.lock().unwrap().len() as u64)
        }

        async fn relationship_type_catalog(&self) -> Result<Vec<RelationshipType>, GraphError> {
            Ok(Vec::new())
        }

        async fn vertex_properties(
            &self,
            _refs: &[RemoteRef],
        ) -> Result<Vec<VertexData>, GraphError> {
            Ok(Vec::new())
        }

        async fn edge_records(&self, _refs: &[RemoteRef]) -> Result<Vec<EdgeData>, GraphError> {
            Ok(Vec::new())
        }
    }

    fn bag(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_duplicate_key_merges() {
        let mut staging = StagingStore::default();
        staging
            .add_vertex(NodeId(1), None, bag(json!({"type": "Note", "offset": 0.0})))
            .unwrap();
        staging
            .add_vertex(NodeId(1), Some(NodeId(0)), bag(json!({"pitch": "C4"})))
            .unwrap();

        let vertices = staging.vertices().unwrap();
        assert_eq!(vertices.len(), 1);
        assert_eq!(vertices[0].vertex["pitch"], "C4");
        assert_eq!(vertices[0].vertex["type"], "Note");
        assert_eq!(vertices[0].parent_key, Some(NodeId(0)));
    }

    #[test]
    fn test_equal_content_distinct_keys() {
        let mut staging = StagingStore::default();
        let props = bag(json!({"type": "Rest"}));
        staging.add_vertex(NodeId(3), None, props.clone()).unwrap();
        staging.add_vertex(NodeId(4), None, props).unwrap();
        assert_eq!(staging.vertices().unwrap().len(), 2);
    }

    #[test]
    fn test_update_applies_after_insert() {
        let mut staging = StagingStore::default();
        staging
            .add_vertex(NodeId(2), None, bag(json!({"type": "Note"})))
            .unwrap();
        staging
            .update_vertex(NodeId(2), "midi", json!(60))
            .unwrap();
        let record = staging.record(NodeId(2)).unwrap().unwrap();
        assert_eq!(record.vertex["midi"], 60);
    }

    #[test]
    fn test_update_unknown_key_is_consistency_error() {
        let mut staging = StagingStore::default();
        let err = staging.update_vertex(NodeId(9), "midi", json!(60)).unwrap_err();
        assert!(matches!(err, GraphError::Consistency(_)));
        assert_eq!(staging.pending_len(), 0);
    }

    #[test]
    fn test_rejected_update_keeps_later_writes() {
        let mut staging = StagingStore::default();
        assert!(staging.update_vertex(NodeId(9), "midi", json!(60)).is_err());
        staging
            .add_vertex(NodeId(1), None, bag(json!({"type": "Note"})))
            .unwrap();

        assert_eq!(staging.vertices().unwrap().len(), 1);
        assert_eq!(staging.vertices().unwrap()[0].key, NodeId(1));
    }

    #[test]
    fn test_update_of_queued_insert_is_accepted() {
        let mut staging = StagingStore::default();
        staging
            .add_vertex(NodeId(5), None, bag(json!({"type": "Note"})))
            .unwrap();
        assert_eq!(staging.pending_len(), 1);
        staging.update_vertex(NodeId(5), "voice", json!(2)).unwrap();
        assert_eq!(staging.record(NodeId(5)).unwrap().unwrap().vertex["voice"], 2);
    }

    #[test]
    fn test_flush_threshold_triggers() {
        let mut staging = StagingStore::new(2);
        for i in 0..3 {
            staging
                .add_vertex(NodeId(i), None, bag(json!({"type": "Rest"})))
                .unwrap();
        }
        assert_eq!(staging.pending_len(), 0);
        staging.flush().unwrap();
        assert_eq!(staging.pending_len(), 0);
    }

    #[test]
    fn test_add_edge_records_type() {
        let mut staging = StagingStore::default();
        let note = staging
            .add_vertex(NodeId(1), None, bag(json!({"type": "Note"})))
            .unwrap();
        let edge = staging
            .add_edge(&note, "NoteInMeasure", NodeId(0), None)
            .unwrap();
        assert_eq!(edge.start, NodeId(1));
        assert_eq!(edge.properties["type"], "NoteInMeasure");
        assert_eq!(staging.edges().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_vertices_then_edges() {
        let store = MemoryStore::default();
        let mut staging = StagingStore::default();
        for i in 0..5 {
            staging
                .add_vertex(NodeId(i), None, bag(json!({"type": "Note", "n": i})))
                .unwrap();
        }
        staging
            .add_edge(NodeId(1), "NoteToNote", NodeId(2), None)
            .unwrap();

        let refs = staging.commit_vertices(&store, 2).await.unwrap();
        assert_eq!(refs.len(), 5);
        assert_eq!(refs[&NodeId(3)], RemoteRef(3));

        let created = staging.commit_edges(&store, 2).await.unwrap();
        assert_eq!(created, 1);
        let edges = store.edges.lock().unwrap();
        assert_eq!(edges[0].start, RemoteRef(1));
        assert_eq!(edges[0].end, RemoteRef(2));

        // A second commit sends nothing new.
        drop(edges);
        staging.commit_vertices(&store, 2).await.unwrap();
        assert_eq!(store.vertices.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_commit_edges_before_vertices_fails() {
        let store = MemoryStore::default();
        let mut staging = StagingStore::default();
        staging
            .add_vertex(NodeId(0), None, bag(json!({"type": "Note"})))
            .unwrap();
        staging
            .add_edge(NodeId(0), "NoteToNote", NodeId(0), None)
            .unwrap();

        let err = staging.commit_edges(&store, 10).await.unwrap_err();
        assert!(matches!(err, GraphError::Consistency(_)));
        assert!(store.edges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_batch_response_is_consistency_error() {
        let store = MemoryStore {
            drop_last: true,
            ..Default::default()
        };
        let mut staging = StagingStore::default();
        staging
            .add_vertex(NodeId(0), None, bag(json!({"type": "Note"})))
            .unwrap();
        let err = staging.commit_vertices(&store, 10).await.unwrap_err();
        assert!(matches!(err, GraphError::Consistency(_)));
    }
}
