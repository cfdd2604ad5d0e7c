//! Newline framing over an arbitrarily chunked byte stream.
//!
//! Chunk boundaries carry no meaning: a message may be split anywhere,
//! including inside a multi-byte UTF-8 sequence. Bytes are buffered until a
//! `\n` arrives, and only complete lines are decoded.

use tracing::{debug, warn};

use super::message::TimelineMessage;

/// Splits a byte stream into lines, carrying partial lines across pushes.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(&rest[..pos]);
            lines.push(line);
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes received after the last `\n`.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Take the unterminated tail once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let tail = std::mem::take(&mut self.pending);
        if tail.iter().all(u8::is_ascii_whitespace) { None } else { Some(tail) }
    }
}

/// Framer plus per-line decoding with isolation: a bad line is logged and
/// skipped, never fatal.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    framer: LineFramer,
    malformed: usize,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; return the messages completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TimelineMessage> {
        self.framer
            .push(chunk)
            .into_iter()
            .filter_map(|line| match TimelineMessage::decode(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    self.malformed += 1;
                    warn!(bytes = line.len(), error = %e, "skipping malformed timeline line");
                    None
                }
            })
            .collect()
    }

    /// Attempt the trailing fragment once. A fragment that still does not
    /// parse is discarded without counting as malformed.
    pub fn finish(&mut self) -> Option<TimelineMessage> {
        let tail = self.framer.finish()?;
        match TimelineMessage::decode(&tail) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(bytes = tail.len(), error = %e, "discarding incomplete trailing fragment");
                None
            }
        }
    }

    /// Lines skipped because they failed to decode.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = concat!(
        r#"{"type":"batch","batchIndex":0,"documents":[{"id":"café","x":1}],"edges":[],"hasMore":true,"totalStreamed":1}"#,
        "\n",
        r#"{"type":"complete","totalDocuments":1,"totalEdges":0}"#,
        "\n",
    );

    fn decode_all(chunks: &[&[u8]]) -> Vec<TimelineMessage> {
        let mut decoder = MessageDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn lines_split_on_newline_only() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"ab").is_empty());
        assert_eq!(framer.push(b"c\nde\nf"), vec![b"abc".to_vec(), b"de".to_vec()]);
        assert_eq!(framer.pending(), b"f");
        assert_eq!(framer.finish(), Some(b"f".to_vec()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn any_split_point_yields_the_same_messages() {
        let bytes = BODY.as_bytes();
        let whole = decode_all(&[bytes]);
        assert_eq!(whole.len(), 2);
        // includes offsets inside the multi-byte 'é'
        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), whole, "split at byte {split}");
        }
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let bytes = BODY.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), decode_all(&[bytes]));
    }

    #[test]
    fn malformed_line_does_not_stop_decoding() {
        let mut decoder = MessageDecoder::new();
        let msgs = decoder.feed(b"{\"type\":\"batch\",\nnot json\n{\"type\":\"complete\",\"totalDocuments\":3,\"totalEdges\":1}\n");
        assert_eq!(msgs, vec![TimelineMessage::Complete { total_documents: 3, total_edges: 1 }]);
        assert_eq!(decoder.malformed(), 2);
    }

    #[test]
    fn unterminated_complete_is_recovered() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.feed(br#"{"type":"complete","totalDocuments":5,"totalEdges":2}"#).is_empty());
        assert_eq!(
            decoder.finish(),
            Some(TimelineMessage::Complete { total_documents: 5, total_edges: 2 })
        );
    }

    #[test]
    fn truncated_tail_is_discarded_silently() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(br#"{"type":"batch","documents":[{"id""#);
        assert_eq!(decoder.finish(), None);
        assert_eq!(decoder.malformed(), 0);
    }
}
