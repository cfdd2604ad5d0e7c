//! Graph model: raw records, the session store, and the layout engine that
//! turns them into renderable primitives.

pub mod geometry;
pub mod layout;
pub mod store;
pub mod types;

pub use store::{GraphStore, SharedStore};
pub use types::{
    Document, EdgeKind, GraphEdge, GraphNode, GraphSnapshot, MemoryEntry, NodeKind,
    SimilarityEdge, ViewportBounds,
};
