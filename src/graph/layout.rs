//! Layout engine: a pure transformation from raw documents and similarity
//! edges into positioned, styled nodes and edges.
//!
//! Every function here is deterministic: the same input always yields the
//! same output, independent of call order or prior calls. Memory entries are
//! placed on a fixed circle around their document (closed form, no physics).

use std::f64::consts::{FRAC_PI_2, TAU};

use super::store::GraphStore;
use super::types::{
    Document, EdgeKind, GraphEdge, GraphNode, GraphSnapshot, NodeKind, SimilarityEdge,
};

/// Raw backend coordinates cluster tightly; spread them out.
pub const COORDINATE_SCALE: f64 = 15.0;
/// Distance of memory nodes from their document.
pub const MEMORY_ORBIT_RADIUS: f64 = 80.0;

pub const DOCUMENT_NODE_SIZE: f64 = 58.0;
pub const MEMORY_NODE_SIZE: f64 = 40.0;
pub const DOCUMENT_COLOR: &str = "#4f8cff";
pub const MEMORY_COLOR: &str = "#a78bfa";

const OWNERSHIP_EDGE_COLOR: &str = "rgba(167, 139, 250, 0.4)";
const OWNERSHIP_EDGE_OPACITY: f64 = 0.4;
const OWNERSHIP_EDGE_THICKNESS: f64 = 1.0;

// ── Visual encoding ──────────────────────────────────────────────────────────

/// Similarity above 1 is on the integer `[0,1000]` scale.
pub fn normalize_similarity(similarity: f64) -> f64 {
    if similarity > 1.0 { similarity / 1000.0 } else { similarity }
}

pub fn edge_opacity(similarity: f64) -> f64 {
    0.2 + normalize_similarity(similarity) * 0.6
}

pub fn edge_thickness(similarity: f64) -> f64 {
    0.5 + normalize_similarity(similarity) * 2.0
}

/// Fixed hue, alpha from [`edge_opacity`].
pub fn edge_color(similarity: f64) -> String {
    format!("rgba(100, 149, 237, {})", edge_opacity(similarity))
}

// ── Placement ────────────────────────────────────────────────────────────────

pub fn scaled_position(doc: &Document) -> (f64, f64) {
    (doc.x * COORDINATE_SCALE, doc.y * COORDINATE_SCALE)
}

/// Position of memory `index` of `count` around `center`. Entry 0 sits
/// straight above the centre; the rest follow clockwise in screen space
/// (y grows downward).
pub fn orbit_position(center: (f64, f64), index: usize, count: usize) -> (f64, f64) {
    let angle = TAU * index as f64 / count as f64 - FRAC_PI_2;
    (
        center.0 + angle.cos() * MEMORY_ORBIT_RADIUS,
        center.1 + angle.sin() * MEMORY_ORBIT_RADIUS,
    )
}

/// One document node per document, followed by its orbiting memory nodes.
pub fn document_nodes<'a, I>(docs: I) -> Vec<GraphNode>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut nodes = Vec::new();
    for doc in docs {
        let center = scaled_position(doc);
        nodes.push(GraphNode {
            id: doc.id.clone(),
            kind: NodeKind::Document,
            x: center.0,
            y: center.1,
            size: DOCUMENT_NODE_SIZE,
            color: DOCUMENT_COLOR.to_string(),
            parent_document_id: None,
        });

        let count = doc.memory_entries.len();
        for (i, memory) in doc.memory_entries.iter().enumerate() {
            let (x, y) = orbit_position(center, i, count);
            nodes.push(GraphNode {
                id: memory.id.clone(),
                kind: NodeKind::Memory,
                x,
                y,
                size: MEMORY_NODE_SIZE,
                color: MEMORY_COLOR.to_string(),
                parent_document_id: Some(doc.id.clone()),
            });
        }
    }
    nodes
}

/// Styled doc-doc edges for every raw edge whose endpoints both pass `admit`.
pub fn similarity_edges<'a, I, F>(edges: I, admit: F) -> Vec<GraphEdge>
where
    I: IntoIterator<Item = &'a SimilarityEdge>,
    F: Fn(&str) -> bool,
{
    edges
        .into_iter()
        .filter(|e| admit(&e.source) && admit(&e.target))
        .map(|e| GraphEdge {
            id: format!("edge-{}-{}", e.source, e.target),
            source: e.source.clone(),
            target: e.target.clone(),
            similarity: normalize_similarity(e.similarity),
            color: edge_color(e.similarity),
            opacity: edge_opacity(e.similarity),
            thickness: edge_thickness(e.similarity),
            kind: EdgeKind::DocDoc,
        })
        .collect()
}

/// Structural document → memory edges. Fixed style, not data driven.
pub fn ownership_edges<'a, I>(docs: I) -> Vec<GraphEdge>
where
    I: IntoIterator<Item = &'a Document>,
{
    docs.into_iter()
        .flat_map(|doc| {
            doc.memory_entries.iter().map(move |memory| GraphEdge {
                id: format!("edge-{}-{}", doc.id, memory.id),
                source: doc.id.clone(),
                target: memory.id.clone(),
                similarity: 1.0,
                color: OWNERSHIP_EDGE_COLOR.to_string(),
                opacity: OWNERSHIP_EDGE_OPACITY,
                thickness: OWNERSHIP_EDGE_THICKNESS,
                kind: EdgeKind::DocMemory,
            })
        })
        .collect()
}

/// Derive the renderable graph from the store. Doc-doc edges are admitted
/// only when both endpoints are loaded.
pub fn viewport_graph(store: &GraphStore) -> GraphSnapshot {
    let docs = store.documents();
    let mut edges = similarity_edges(store.edges(), |id| store.contains(id));
    edges.extend(ownership_edges(docs));
    GraphSnapshot { nodes: document_nodes(docs), edges }
}

/// Derive one streamed batch. Batch edges may point at documents from
/// earlier or later batches, so nothing is filtered.
pub fn batch_graph(docs: &[Document], raw_edges: &[SimilarityEdge]) -> GraphSnapshot {
    let mut edges = similarity_edges(raw_edges, |_| true);
    edges.extend(ownership_edges(docs));
    GraphSnapshot { nodes: document_nodes(docs), edges }
}
