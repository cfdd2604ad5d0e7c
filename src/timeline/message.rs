//! Timeline wire messages — one JSON object per line, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::graph::{Document, SimilarityEdge};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineMessage {
    Batch(TimelineBatch),
    #[serde(rename_all = "camelCase")]
    Complete {
        #[serde(default)]
        total_documents: u64,
        #[serde(default)]
        total_edges: u64,
    },
}

/// One slice of the filtered corpus.
///
/// `has_more` is informational: completion is driven by the terminal
/// `complete` message only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBatch {
    #[serde(default)]
    pub batch_index: u64,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub edges: Vec<SimilarityEdge>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub total_streamed: u64,
}

impl TimelineMessage {
    /// Decode one line. Blank lines yield `Ok(None)`.
    pub fn decode(line: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(line).map(Some)
    }

    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::Complete { .. } => "complete",
        }
    }

    /// Encode as one newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
