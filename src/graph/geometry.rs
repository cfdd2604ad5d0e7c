//! Screen/world conversions used to decide which viewport to fetch.

use super::types::{GraphNode, NodeKind, ViewportBounds};

/// Half-extent used when the container has not been measured yet.
const UNMEASURED_HALF_EXTENT: f64 = 1000.0;

/// World-space rectangle visible through a `width`×`height` container panned
/// by `(pan_x, pan_y)` screen pixels at `zoom`.
///
/// A zero-sized container yields a fixed ±1000 square. A zero or non-finite
/// zoom produces non-finite bounds, which the fetch coordinator rejects.
pub fn world_viewport(pan_x: f64, pan_y: f64, zoom: f64, width: f64, height: f64) -> ViewportBounds {
    if width == 0.0 || height == 0.0 {
        return ViewportBounds::centered(UNMEASURED_HALF_EXTENT * 2.0);
    }
    ViewportBounds {
        min_x: -pan_x / zoom,
        max_x: (width - pan_x) / zoom,
        min_y: -pan_y / zoom,
        max_y: (height - pan_y) / zoom,
    }
}

/// Bounding box of the document nodes, or of every node when there are no
/// documents. `None` for an empty slice.
pub fn content_bounds(nodes: &[GraphNode]) -> Option<ViewportBounds> {
    let has_documents = nodes.iter().any(|n| n.kind == NodeKind::Document);
    nodes
        .iter()
        .filter(|n| !has_documents || n.kind == NodeKind::Document)
        .fold(None, |acc: Option<ViewportBounds>, n| {
            Some(match acc {
                None => ViewportBounds::new(n.x, n.x, n.y, n.y),
                Some(b) => ViewportBounds {
                    min_x: b.min_x.min(n.x),
                    max_x: b.max_x.max(n.x),
                    min_y: b.min_y.min(n.y),
                    max_y: b.max_y.max(n.y),
                },
            })
        })
}
