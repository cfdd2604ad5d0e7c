//! Raw graph records as delivered by the backend, and the derived
//! node/edge primitives handed to the renderer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names a document's horizontal position may arrive under, in
/// priority order. The first non-null one wins.
const X_ALIASES: [&str; 3] = ["spatial_x", "spatialX", "x"];
const Y_ALIASES: [&str; 3] = ["spatial_y", "spatialY", "y"];

/// Field names a document's memory list may arrive under.
const MEMORY_ALIASES: [&str; 2] = ["memoryEntries", "memory_entries"];

// ── Raw records ──────────────────────────────────────────────────────────────

/// One saved item anchored in the graph.
///
/// Position aliases are resolved while decoding, so `x`/`y` are always the
/// raw (unscaled) coordinates. Everything the loader does not interpret
/// (title, summary, timestamps …) is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDocument")]
pub struct Document {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "memoryEntries")]
    pub memory_entries: Vec<MemoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Document at the given raw position with no memories and no metadata.
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            memory_entries: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_memories<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.memory_entries = ids.into_iter().map(MemoryEntry::new).collect();
        self
    }

    /// Title from the metadata bag, if the backend sent one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
struct RawDocument {
    id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<RawDocument> for Document {
    type Error = String;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        let RawDocument { id, mut fields } = raw;
        let x = take_coordinate(&mut fields, &X_ALIASES);
        let y = take_coordinate(&mut fields, &Y_ALIASES);

        let memories = take_first(&mut fields, &MEMORY_ALIASES);
        let memory_entries = match memories {
            None => Vec::new(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| format!("document {id}: invalid memoryEntries: {e}"))?,
        };

        Ok(Self { id, x, y, memory_entries, extra: fields })
    }
}

/// Remove every alias from `fields` and return the first non-null value.
fn take_first(fields: &mut Map<String, Value>, aliases: &[&str]) -> Option<Value> {
    let mut picked = None;
    for alias in aliases {
        if let Some(value) = fields.remove(*alias) {
            if picked.is_none() && !value.is_null() {
                picked = Some(value);
            }
        }
    }
    picked
}

fn take_coordinate(fields: &mut Map<String, Value>, aliases: &[&str]) -> f64 {
    take_first(fields, aliases).map_or(0.0, |v| coerce_number(&v))
}

/// Loose numeric coercion. Anything that does not yield a finite number
/// becomes `0`.
pub(crate) fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { 0.0 } else { s.parse::<f64>().unwrap_or(f64::NAN) }
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::Array(_) | Value::Object(_) => f64::NAN,
    };
    if n.is_finite() { n } else { 0.0 }
}

/// A fragment derived from exactly one [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemoryEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), extra: Map::new() }
    }
}

/// Undirected relationship between two documents.
///
/// `similarity` is stored as received: either `[0,1]` or `[0,1000]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source: String,
    pub target: String,
    pub similarity: f64,
}

impl SimilarityEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, similarity: f64) -> Self {
        Self { source: source.into(), target: target.into(), similarity }
    }

    /// Order-independent identity of the pair.
    pub fn pair_key(&self) -> (&str, &str) {
        if self.source <= self.target {
            (&self.source, &self.target)
        } else {
            (&self.target, &self.source)
        }
    }
}

/// Rectangular region of the graph's (unscaled-by-renderer) world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl ViewportBounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// Square of side `size` centred on the origin.
    pub fn centered(size: f64) -> Self {
        let half = size / 2.0;
        Self::new(-half, half, -half, half)
    }

    /// All four edges are finite numbers. Non-finite bounds must never be
    /// sent to the backend.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.max_x.is_finite()
            && self.min_y.is_finite()
            && self.max_y.is_finite()
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

// ── Derived primitives ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Memory,
}

/// A positioned, styled node ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: String,
    /// Owning document for memory nodes. Lookup only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_document_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "doc-doc")]
    DocDoc,
    #[serde(rename = "doc-memory")]
    DocMemory,
}

/// A styled edge ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Normalised to `[0,1]`.
    pub similarity: f64,
    pub color: String,
    pub opacity: f64,
    pub thickness: f64,
    #[serde(rename = "edgeType")]
    pub kind: EdgeKind,
}

/// The `{nodes, edges}` contract consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Document).count()
    }

    /// Append nodes and edges whose ids are not already present.
    /// Returns how many nodes and edges were added.
    pub fn absorb(&mut self, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> (usize, usize) {
        let mut node_ids: HashSet<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let before_nodes = self.nodes.len();
        for node in nodes {
            if node_ids.insert(node.id.clone()) {
                self.nodes.push(node);
            }
        }

        let mut edge_ids: HashSet<String> = self.edges.iter().map(|e| e.id.clone()).collect();
        let before_edges = self.edges.len();
        for edge in edges {
            if edge_ids.insert(edge.id.clone()) {
                self.edges.push(edge);
            }
        }

        (self.nodes.len() - before_nodes, self.edges.len() - before_edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_prefers_snake_case_alias() {
        let doc: Document = serde_json::from_value(json!({
            "id": "d1",
            "spatial_x": 1.5,
            "spatialX": 99,
            "x": 42,
            "spatialY": "-2",
            "title": "Hello"
        }))
        .unwrap();
        assert_eq!(doc.x, 1.5);
        assert_eq!(doc.y, -2.0);
        assert_eq!(doc.title(), Some("Hello"));
        // legacy aliases do not leak into the metadata bag
        assert!(!doc.extra.contains_key("spatialX"));
        assert!(!doc.extra.contains_key("x"));
    }

    #[test]
    fn null_alias_falls_through_to_next() {
        let doc: Document = serde_json::from_value(json!({
            "id": "d1", "spatial_x": null, "x": 3
        }))
        .unwrap();
        assert_eq!(doc.x, 3.0);
        assert_eq!(doc.y, 0.0);
    }

    #[test]
    fn unparseable_coordinates_become_zero() {
        let doc: Document = serde_json::from_value(json!({
            "id": "d1", "x": "north", "y": {"nested": true}
        }))
        .unwrap();
        assert_eq!((doc.x, doc.y), (0.0, 0.0));
    }

    #[test]
    fn memory_entries_default_to_empty() {
        let doc: Document = serde_json::from_value(json!({ "id": "d1" })).unwrap();
        assert!(doc.memory_entries.is_empty());

        let doc: Document =
            serde_json::from_value(json!({ "id": "d1", "memoryEntries": null })).unwrap();
        assert!(doc.memory_entries.is_empty());
    }

    #[test]
    fn memory_entries_keep_their_metadata() {
        let doc: Document = serde_json::from_value(json!({
            "id": "d1",
            "memory_entries": [{ "id": "m1", "memory": "likes tea" }]
        }))
        .unwrap();
        assert_eq!(doc.memory_entries.len(), 1);
        assert_eq!(doc.memory_entries[0].extra["memory"], "likes tea");
    }

    #[test]
    fn malformed_memory_list_is_an_error() {
        let res: Result<Document, _> =
            serde_json::from_value(json!({ "id": "d1", "memoryEntries": "nope" }));
        assert!(res.is_err());
    }

    #[test]
    fn document_serializes_normalized_position() {
        let doc = Document::new("d1", 2.0, 3.0).with_memories(["m1"]);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["x"], 2.0);
        assert_eq!(value["memoryEntries"][0]["id"], "m1");
        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn bounds_finiteness() {
        assert!(ViewportBounds::centered(2000.0).is_finite());
        assert!(!ViewportBounds::new(f64::NAN, 1.0, 0.0, 1.0).is_finite());
        assert!(!ViewportBounds::new(0.0, 1.0, 0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn bounds_use_camel_case_on_the_wire() {
        let value = serde_json::to_value(ViewportBounds::centered(2.0)).unwrap();
        assert_eq!(value, json!({ "minX": -1.0, "maxX": 1.0, "minY": -1.0, "maxY": 1.0 }));
    }

    #[test]
    fn edge_pair_key_is_order_independent() {
        let a = SimilarityEdge::new("b", "a", 0.5);
        let b = SimilarityEdge::new("a", "b", 0.9);
        assert_eq!(a.pair_key(), b.pair_key());
    }

    #[test]
    fn absorb_skips_known_ids() {
        let node = |id: &str| GraphNode {
            id: id.into(),
            kind: NodeKind::Document,
            x: 0.0,
            y: 0.0,
            size: 1.0,
            color: "#000".into(),
            parent_document_id: None,
        };
        let mut snap = GraphSnapshot::default();
        assert_eq!(snap.absorb(vec![node("a"), node("b")], vec![]), (2, 0));
        assert_eq!(snap.absorb(vec![node("b"), node("c")], vec![]), (1, 0));
        let ids: Vec<_> = snap.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
