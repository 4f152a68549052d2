//! Pattern compiler.
//!
//! Clause order is fixed: anchor match, required matches, early filters,
//! optional matches with their late filters, return, then ordering and paging.
//! The compiled text is cached until the builder is mutated.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use scoregraph_core::properties::bool_text;
use scoregraph_core::{EdgeData, VertexData};

use super::entity::{
    is_identifier, ComparisonOp, EntityRef, Filter, NodeRef, NodeSpec, Operand, Property, RelRef,
    RelSpec,
};
use crate::client::GraphError;
use crate::store::{EntityHandle, GraphStore, ParamValue, QueryRows};

#[derive(Debug, Clone)]
struct NodeEntry {
    name: String,
    node_type: Option<String>,
    id: Option<i64>,
}

#[derive(Debug, Clone)]
struct RelEntry {
    name: String,
    rel_type: Option<String>,
    start: NodeRef,
    end: NodeRef,
    optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Node(NodeRef),
    Rel(RelRef),
}

/// Query text plus the column names a row will carry.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPattern {
    pub text: String,
    pub columns: Vec<String>,
}

/// Vertex and edge data for a set of result handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultProperties {
    pub vertices: Vec<VertexData>,
    pub edges: Vec<EdgeData>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    nodes: Vec<NodeEntry>,
    rels: Vec<RelEntry>,
    filters: Vec<Filter>,
    returns: Vec<Property>,
    anchor: Option<Anchor>,
    names: HashSet<String>,
    counter: u32,
    compiled: Option<CompiledPattern>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Entities ─────────────────────────────────────────────────

    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeRef, GraphError> {
        let fallback = spec.node_type.as_deref().unwrap_or("Node").to_string();
        let name = self.claim_name(spec.name, &fallback)?;
        self.nodes.push(NodeEntry {
            name,
            node_type: spec.node_type,
            id: spec.id,
        });
        self.compiled = None;
        Ok(NodeRef(self.nodes.len() - 1))
    }

    pub fn add_relationship(&mut self, spec: RelSpec) -> Result<RelRef, GraphError> {
        let start = match spec.start {
            Some(n) => self.check_node(n)?,
            None => self.add_node(NodeSpec::any())?,
        };
        let end = match spec.end {
            Some(n) => self.check_node(n)?,
            None => self.add_node(NodeSpec::any())?,
        };
        let fallback = spec.rel_type.as_deref().unwrap_or("Rel").to_string();
        let name = self.claim_name(spec.name, &fallback)?;
        self.rels.push(RelEntry {
            name,
            rel_type: spec.rel_type,
            start,
            end,
            optional: spec.optional,
        });
        self.compiled = None;
        Ok(RelRef(self.rels.len() - 1))
    }

    pub fn rel_start(&self, rel: RelRef) -> Option<NodeRef> {
        self.rels.get(rel.0).map(|r| r.start)
    }

    pub fn rel_end(&self, rel: RelRef) -> Option<NodeRef> {
        self.rels.get(rel.0).map(|r| r.end)
    }

    /// Make `node` the anchor, replacing any previous anchor.
    pub fn set_start_node(&mut self, node: NodeRef) -> Result<(), GraphError> {
        self.check_node(node)?;
        self.anchor = Some(Anchor::Node(node));
        self.compiled = None;
        Ok(())
    }

    /// Make `rel` the anchor, replacing any previous anchor.
    pub fn set_start_relationship(&mut self, rel: RelRef) -> Result<(), GraphError> {
        let entry = self
            .rels
            .get_mut(rel.0)
            .ok_or_else(|| GraphError::Usage(format!("unknown relationship {}", rel.0)))?;
        entry.optional = false;
        self.anchor = Some(Anchor::Rel(rel));
        self.compiled = None;
        Ok(())
    }

    pub fn add_comparison_filter(
        &mut self,
        pre: impl Into<Operand>,
        op: ComparisonOp,
        post: impl Into<Operand>,
    ) -> Result<(), GraphError> {
        let filter = Filter::Comparison {
            pre: pre.into(),
            op,
            post: post.into(),
        };
        if let Filter::Comparison { pre, post, .. } = &filter {
            for operand in [pre, post] {
                if let Operand::Property(p) = operand {
                    self.check_entity(p.owner)?;
                }
            }
        }
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
            self.compiled = None;
        }
        Ok(())
    }

    /// Add a filter written directly in Cypher, referring to entities by name.
    pub fn add_raw_filter(&mut self, text: impl Into<String>) {
        let filter = Filter::Raw(text.into());
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
            self.compiled = None;
        }
    }

    pub fn add_returns(
        &mut self,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<(), GraphError> {
        for property in properties {
            self.check_entity(property.owner)?;
            if !self.returns.contains(&property) {
                self.returns.push(property);
            }
        }
        self.compiled = None;
        Ok(())
    }

    /// The entity bound to `name`, if any.
    pub fn find(&self, name: &str) -> Option<EntityRef> {
        if let Some(i) = self.nodes.iter().position(|n| n.name == name) {
            return Some(EntityRef::Node(NodeRef(i)));
        }
        self.rels
            .iter()
            .position(|r| r.name == name)
            .map(|i| EntityRef::Rel(RelRef(i)))
    }

    pub fn name_of(&self, entity: EntityRef) -> Option<&str> {
        match entity {
            EntityRef::Node(n) => self.nodes.get(n.0).map(|e| e.name.as_str()),
            EntityRef::Rel(r) => self.rels.get(r.0).map(|e| e.name.as_str()),
        }
    }

    pub fn node_type(&self, node: NodeRef) -> Option<&str> {
        self.nodes.get(node.0).and_then(|n| n.node_type.as_deref())
    }

    fn claim_name(&mut self, explicit: Option<String>, fallback: &str) -> Result<String, GraphError> {
        if let Some(name) = explicit {
            if !is_identifier(&name) {
                return Err(GraphError::Usage(format!(
                    "'{name}' is not a valid entity name"
                )));
            }
            if !self.names.insert(name.clone()) {
                return Err(GraphError::Usage(format!(
                    "entity name '{name}' is already used in this query"
                )));
            }
            return Ok(name);
        }
        let base: String = fallback
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let base = if is_identifier(&base) { base } else { "Node".to_string() };
        loop {
            self.counter += 1;
            let name = format!("{base}{:04}", self.counter);
            if self.names.insert(name.clone()) {
                return Ok(name);
            }
        }
    }

    fn check_node(&self, node: NodeRef) -> Result<NodeRef, GraphError> {
        if node.0 < self.nodes.len() {
            Ok(node)
        } else {
            Err(GraphError::Usage(format!("unknown node {}", node.0)))
        }
    }

    fn check_entity(&self, entity: EntityRef) -> Result<(), GraphError> {
        match entity {
            EntityRef::Node(n) => self.check_node(n).map(|_| ()),
            EntityRef::Rel(r) if r.0 < self.rels.len() => Ok(()),
            EntityRef::Rel(r) => Err(GraphError::Usage(format!("unknown relationship {}", r.0))),
        }
    }

    // ── Compilation ──────────────────────────────────────────────

    /// Compile the pattern, reusing the cached text when nothing changed.
    pub fn compile(&mut self) -> Result<&CompiledPattern, GraphError> {
        if self.compiled.is_none() {
            let compiled = self.render()?;
            tracing::debug!(columns = compiled.columns.len(), "Compiled pattern");
            self.compiled = Some(compiled);
        }
        self.compiled
            .as_ref()
            .ok_or_else(|| GraphError::QueryCompilation("pattern cache is empty".to_string()))
    }

    fn render(&self) -> Result<CompiledPattern, GraphError> {
        let anchor = self.anchor.ok_or_else(|| {
            GraphError::QueryCompilation("no start node or start relationship set".to_string())
        })?;
        let optional_nodes = self.optional_nodes(anchor);
        let mut bound = HashSet::new();
        let mut clauses = Vec::new();
        let mut early = Vec::new();
        let mut late = Vec::new();

        // Anchor
        match anchor {
            Anchor::Node(n) => {
                let node = &self.nodes[n.0];
                clauses.push(format!("MATCH {}", self.node_pattern(n, &mut bound)));
                if let Some(id) = node.id {
                    early.push(format!("id({}) = {id}", node.name));
                }
            }
            Anchor::Rel(r) => {
                clauses.push(format!("MATCH {}", self.rel_pattern(r, &mut bound)));
            }
        }

        // Pinned ids of every other node
        for (i, node) in self.nodes.iter().enumerate() {
            if anchor == Anchor::Node(NodeRef(i)) {
                continue;
            }
            if let Some(id) = node.id {
                let text = format!("id({}) = {id}", node.name);
                if optional_nodes.contains(&i) {
                    late.push(text);
                } else {
                    early.push(text);
                }
            }
        }

        // Required patterns
        let mut required = Vec::new();
        for (i, rel) in self.rels.iter().enumerate() {
            if rel.optional || anchor == Anchor::Rel(RelRef(i)) {
                continue;
            }
            required.push(self.rel_pattern(RelRef(i), &mut bound));
        }
        for i in 0..self.nodes.len() {
            if !bound.contains(&i) && !optional_nodes.contains(&i) {
                required.push(self.node_pattern(NodeRef(i), &mut bound));
            }
        }
        if !required.is_empty() {
            clauses.push(format!("MATCH {}", required.join(", ")));
        }

        // Filters
        let optional_names: Vec<&str> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| optional_nodes.contains(i))
            .map(|(_, n)| n.name.as_str())
            .chain(
                self.rels
                    .iter()
                    .filter(|r| r.optional)
                    .map(|r| r.name.as_str()),
            )
            .collect();
        for filter in &self.filters {
            let (text, is_late) = match filter {
                Filter::Comparison { pre, op, post } => {
                    let touches_optional = [pre, post].iter().any(|operand| match operand {
                        Operand::Property(p) => self.is_optional(p.owner, &optional_nodes),
                        Operand::Literal(_) => false,
                    });
                    (
                        format!("{} {} {}", self.operand(pre), op.cypher(), self.operand(post)),
                        touches_optional,
                    )
                }
                Filter::Raw(text) => (
                    text.clone(),
                    optional_names.iter().any(|name| mentions(text, name)),
                ),
            };
            if is_late {
                late.push(text);
            } else {
                early.push(text);
            }
        }
        if !early.is_empty() {
            clauses.push(format!("WHERE {}", early.join(" AND ")));
        }

        // Optional patterns
        for (i, rel) in self.rels.iter().enumerate() {
            if rel.optional && anchor != Anchor::Rel(RelRef(i)) {
                clauses.push(format!(
                    "OPTIONAL MATCH {}",
                    self.rel_pattern(RelRef(i), &mut bound)
                ));
            }
        }
        if !late.is_empty() {
            clauses.push(format!("WITH * WHERE {}", late.join(" AND ")));
        }

        // Return
        let columns: Vec<String> = if self.returns.is_empty() {
            let names: BTreeSet<String> = self
                .nodes
                .iter()
                .map(|n| n.name.clone())
                .chain(self.rels.iter().map(|r| r.name.clone()))
                .collect();
            clauses.push("RETURN *".to_string());
            names.into_iter().collect()
        } else {
            let projections: Vec<String> =
                self.returns.iter().map(|p| self.projection(p)).collect();
            clauses.push(format!("RETURN {}", projections.join(", ")));
            projections
        };

        let anchor_name = match anchor {
            Anchor::Node(n) => &self.nodes[n.0].name,
            Anchor::Rel(r) => &self.rels[r.0].name,
        };
        clauses.push(format!("ORDER BY id({anchor_name})"));
        clauses.push("SKIP $skip LIMIT $limit".to_string());

        Ok(CompiledPattern {
            text: clauses.join("\n"),
            columns,
        })
    }

    /// Nodes reached only through optional relationships.
    fn optional_nodes(&self, anchor: Anchor) -> HashSet<usize> {
        let mut required = HashSet::new();
        let mut optional = HashSet::new();
        match anchor {
            Anchor::Node(n) => {
                required.insert(n.0);
            }
            Anchor::Rel(r) => {
                required.insert(self.rels[r.0].start.0);
                required.insert(self.rels[r.0].end.0);
            }
        }
        for (i, rel) in self.rels.iter().enumerate() {
            let set = if rel.optional && anchor != Anchor::Rel(RelRef(i)) {
                &mut optional
            } else {
                &mut required
            };
            set.insert(rel.start.0);
            set.insert(rel.end.0);
        }
        optional.retain(|i| !required.contains(i));
        optional
    }

    fn is_optional(&self, entity: EntityRef, optional_nodes: &HashSet<usize>) -> bool {
        match entity {
            EntityRef::Node(n) => optional_nodes.contains(&n.0),
            EntityRef::Rel(r) => self.rels.get(r.0).is_some_and(|r| r.optional),
        }
    }

    /// `(name:Type)` the first time a node appears, `(name)` afterwards.
    fn node_pattern(&self, node: NodeRef, bound: &mut HashSet<usize>) -> String {
        let entry = &self.nodes[node.0];
        match &entry.node_type {
            Some(t) if bound.insert(node.0) => format!("({}:{})", entry.name, quote_name(t)),
            _ => {
                bound.insert(node.0);
                format!("({})", entry.name)
            }
        }
    }

    fn rel_pattern(&self, rel: RelRef, bound: &mut HashSet<usize>) -> String {
        let entry = &self.rels[rel.0];
        let start = self.node_pattern(entry.start, bound);
        let end = self.node_pattern(entry.end, bound);
        match &entry.rel_type {
            Some(t) => format!("{start}-[{}:{}]->{end}", entry.name, quote_name(t)),
            None => format!("{start}-[{}]->{end}", entry.name),
        }
    }

    fn owner_name(&self, entity: EntityRef) -> &str {
        self.name_of(entity).unwrap_or("_")
    }

    fn projection(&self, property: &Property) -> String {
        let owner = self.owner_name(property.owner);
        if property.is_id() {
            format!("id({owner})")
        } else {
            format!("{owner}.{}", quote_name(&property.name))
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Property(p) => self.projection(p),
            Operand::Literal(v) => literal(v),
        }
    }

    // ── Execution ────────────────────────────────────────────────

    /// Compile if needed and run one page of the pattern.
    pub async fn execute<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        skip: u32,
        limit: u32,
    ) -> Result<QueryRows, GraphError> {
        let compiled = self.compile()?.clone();
        let params = vec![
            ("skip".to_string(), ParamValue::Int(skip as i64)),
            ("limit".to_string(), ParamValue::Int(limit as i64)),
        ];
        let rows = store
            .execute(&compiled.text, &params, &compiled.columns)
            .await?;
        tracing::debug!(skip, limit, rows = rows.rows.len(), "Pattern page fetched");
        Ok(rows)
    }

    /// Full property bags for the vertices and edges behind `handles`.
    pub async fn get_result_properties<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        handles: &[EntityHandle],
    ) -> Result<ResultProperties, GraphError> {
        let mut vertex_refs = Vec::new();
        let mut edge_refs = Vec::new();
        for handle in handles {
            match handle {
                EntityHandle::Vertex(r) => vertex_refs.push(*r),
                EntityHandle::Edge(r) => edge_refs.push(*r),
            }
        }
        Ok(ResultProperties {
            vertices: store.vertex_properties(&vertex_refs).await?,
            edges: store.edge_records(&edge_refs).await?,
        })
    }
}

/// Backtick-quote a label or key that is not a plain identifier.
fn quote_name(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Render a literal in the stored value form.
fn literal(value: &Value) -> String {
    match value {
        Value::Null => quote_text("None"),
        Value::Bool(b) => quote_text(bool_text(*b)),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s),
        Value::Array(_) | Value::Object(_) => quote_text(&value.to_string()),
    }
}

/// Whether raw filter text uses `name` as a variable.
fn mentions(text: &str, name: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_in_measure() -> (QueryBuilder, NodeRef, NodeRef, RelRef) {
        let mut q = QueryBuilder::new();
        let note = q.add_node(NodeSpec::typed("Note").named("n")).unwrap();
        let measure = q.add_node(NodeSpec::typed("Measure").named("m")).unwrap();
        let rel = q
            .add_relationship(RelSpec::typed("NoteInMeasure").start(note).end(measure).named("r"))
            .unwrap();
        (q, note, measure, rel)
    }

    #[test]
    fn test_compile_without_anchor_fails() {
        let (mut q, _, _, _) = note_in_measure();
        assert!(matches!(q.compile(), Err(GraphError::QueryCompilation(_))));
    }

    #[test]
    fn test_clause_order_with_node_anchor() {
        let (mut q, note, measure, _) = note_in_measure();
        q.set_start_node(measure).unwrap();
        q.add_comparison_filter(Property::new(note, "pitch"), ComparisonOp::Eq, json!("C4"))
            .unwrap();
        q.add_returns([Property::new(note, "pitch"), Property::id(measure)])
            .unwrap();

        let compiled = q.compile().unwrap();
        assert_eq!(
            compiled.text,
            "MATCH (m:Measure)\n\
             MATCH (n:Note)-[r:NoteInMeasure]->(m)\n\
             WHERE n.pitch = 'C4'\n\
             RETURN n.pitch, id(m)\n\
             ORDER BY id(m)\n\
             SKIP $skip LIMIT $limit"
        );
        assert_eq!(compiled.columns, vec!["n.pitch", "id(m)"]);
    }

    #[test]
    fn test_pinned_anchor_shares_where_with_filters() {
        let mut q = QueryBuilder::new();
        let note = q.add_node(NodeSpec::typed("Note").named("n").with_id(42)).unwrap();
        q.set_start_node(note).unwrap();
        q.add_comparison_filter(Property::new(note, "midi"), ComparisonOp::Ge, json!(60))
            .unwrap();

        let text = q.compile().unwrap().text.clone();
        assert_eq!(text.matches("WHERE").count(), 1);
        assert_eq!(
            text,
            "MATCH (n:Note)\n\
             WHERE id(n) = 42 AND n.midi >= 60\n\
             RETURN *\n\
             ORDER BY id(n)\n\
             SKIP $skip LIMIT $limit"
        );
    }

    #[test]
    fn test_pinned_anchor_where_follows_required_match() {
        let (mut q, note, measure, _) = note_in_measure();
        let pinned = q.add_node(NodeSpec::typed("Part").named("p").with_id(7)).unwrap();
        q.add_relationship(RelSpec::typed("MeasureInPart").start(measure).end(pinned))
            .unwrap();
        q.set_start_node(pinned).unwrap();
        q.add_comparison_filter(Property::new(note, "pitch"), ComparisonOp::Eq, json!("A4"))
            .unwrap();

        let text = q.compile().unwrap().text.clone();
        assert_eq!(text.matches("WHERE").count(), 1);
        assert!(text.contains("WHERE id(p) = 7 AND n.pitch = 'A4'"));
    }

    #[test]
    fn test_anchor_with_id_and_optional_filter() {
        let mut q = QueryBuilder::new();
        let note = q.add_node(NodeSpec::any().with_id(42).named("n")).unwrap();
        q.set_start_node(note).unwrap();
        let rel = q
            .add_relationship(RelSpec::typed("ExpressionInNote").end(note).optional())
            .unwrap();
        let ornament = q.rel_start(rel).unwrap();
        q.add_comparison_filter(Property::new(ornament, "name"), ComparisonOp::Ne, json!("Trill"))
            .unwrap();

        let text = q.compile().unwrap().text.clone();
        assert_eq!(
            text,
            "MATCH (n)\n\
             WHERE id(n) = 42\n\
             OPTIONAL MATCH (Node0001)-[ExpressionInNote0002:ExpressionInNote]->(n)\n\
             WITH * WHERE Node0001.name <> 'Trill'\n\
             RETURN *\n\
             ORDER BY id(n)\n\
             SKIP $skip LIMIT $limit"
        );
        assert_eq!(
            q.compile().unwrap().columns,
            vec!["ExpressionInNote0002", "Node0001", "n"]
        );
    }

    #[test]
    fn test_relationship_anchor_and_literals() {
        let (mut q, note, _, rel) = note_in_measure();
        q.set_start_relationship(rel).unwrap();
        q.add_comparison_filter(Property::new(note, "isGrace"), ComparisonOp::Eq, json!(false))
            .unwrap();
        q.add_comparison_filter(Property::new(note, "midi"), ComparisonOp::Ge, json!(60))
            .unwrap();
        q.add_raw_filter("n.pitch STARTS WITH 'C'");

        let text = &q.compile().unwrap().text;
        assert!(text.starts_with("MATCH (n:Note)-[r:NoteInMeasure]->(m:Measure)\n"));
        assert!(text.contains(
            "WHERE n.isGrace = 'False' AND n.midi >= 60 AND n.pitch STARTS WITH 'C'"
        ));
        assert!(text.contains("ORDER BY id(r)"));
    }

    #[test]
    fn test_compile_is_cached_until_mutation() {
        let (mut q, note, measure, _) = note_in_measure();
        q.set_start_node(note).unwrap();
        let first = q.compile().unwrap().clone();
        assert_eq!(q.compile().unwrap(), &first);

        q.set_start_node(measure).unwrap();
        let second = q.compile().unwrap().clone();
        assert_ne!(second, first);
        assert!(second.text.ends_with("ORDER BY id(m)\nSKIP $skip LIMIT $limit"));
    }

    #[test]
    fn test_duplicate_filters_collapse() {
        let (mut q, note, _, _) = note_in_measure();
        q.set_start_node(note).unwrap();
        for _ in 0..2 {
            q.add_comparison_filter(Property::new(note, "voice"), ComparisonOp::Eq, json!(1))
                .unwrap();
        }
        let text = &q.compile().unwrap().text;
        assert_eq!(text.matches("n.voice = 1").count(), 1);
    }

    #[test]
    fn test_name_errors() {
        let mut q = QueryBuilder::new();
        q.add_node(NodeSpec::typed("Note").named("n")).unwrap();
        assert!(matches!(
            q.add_node(NodeSpec::typed("Rest").named("n")),
            Err(GraphError::Usage(_))
        ));
        assert!(matches!(
            q.add_node(NodeSpec::any().named("not valid")),
            Err(GraphError::Usage(_))
        ));
        let auto = q.add_node(NodeSpec::typed("Measure")).unwrap();
        assert_eq!(q.name_of(auto.into()), Some("Measure0001"));
        assert_eq!(q.find("n"), Some(EntityRef::Node(NodeRef(0))));
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(literal(&json!("it's")), "'it\\'s'");
        assert_eq!(literal(&json!(true)), "'True'");
        assert_eq!(literal(&json!(1.5)), "1.5");
        assert_eq!(literal(&Value::Null), "'None'");
    }
}
