//! Graph state store — the deduplicated set of documents and raw similarity
//! edges seen so far in one graph session.
//!
//! Merge semantics only: no I/O, no layout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{Document, GraphNode, NodeKind, SimilarityEdge};

/// Store handle shared between the viewport coordinator and the timeline
/// streamer of a single session. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<GraphStore>>);

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the store. A poisoned lock is recovered: every mutation leaves
    /// the store consistent, so the data is still valid.
    pub fn lock(&self) -> MutexGuard<'_, GraphStore> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct GraphStore {
    /// Documents in first-seen order; replacing keeps the original slot.
    documents: Vec<Document>,
    index: HashMap<String, usize>,
    edges: Vec<SimilarityEdge>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace each document by id. Last write wins; ids not in
    /// `docs` are untouched. Returns how many ids were new.
    pub fn upsert_documents<I>(&mut self, docs: I) -> usize
    where
        I: IntoIterator<Item = Document>,
    {
        let mut inserted = 0;
        for doc in docs {
            match self.index.get(&doc.id) {
                Some(&slot) => self.documents[slot] = doc,
                None => {
                    self.index.insert(doc.id.clone(), self.documents.len());
                    self.documents.push(doc);
                    inserted += 1;
                }
            }
        }
        inserted
    }

    /// Replace the whole edge set (viewport responses are complete answers
    /// for their region).
    pub fn set_edges(&mut self, edges: Vec<SimilarityEdge>) {
        self.edges = edges;
    }

    /// Accumulate edges (timeline batches are disjoint slices of one answer).
    /// An edge for an already-known pair, in either direction, replaces it.
    /// Returns how many pairs were new.
    pub fn merge_edges<I>(&mut self, edges: I) -> usize
    where
        I: IntoIterator<Item = SimilarityEdge>,
    {
        let mut slots: HashMap<(String, String), usize> = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let (a, b) = e.pair_key();
                ((a.to_string(), b.to_string()), i)
            })
            .collect();

        let mut added = 0;
        for edge in edges {
            let (a, b) = edge.pair_key();
            let key = (a.to_string(), b.to_string());
            match slots.get(&key) {
                Some(&slot) => self.edges[slot] = edge,
                None => {
                    slots.insert(key, self.edges.len());
                    self.edges.push(edge);
                    added += 1;
                }
            }
        }
        added
    }

    /// Drop everything. Callers cancel outstanding fetches/streams first.
    pub fn reset(&mut self) {
        self.documents.clear();
        self.index.clear();
        self.edges.clear();
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn edges(&self) -> &[SimilarityEdge] {
        &self.edges
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.index.get(id).map(|&slot| &self.documents[slot])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Resolve a derived node back to the document that owns it.
    pub fn document_for_node(&self, node: &GraphNode) -> Option<&Document> {
        match node.kind {
            NodeKind::Document => self.document(&node.id),
            NodeKind::Memory => node.parent_document_id.as_deref().and_then(|id| self.document(id)),
        }
    }
}
