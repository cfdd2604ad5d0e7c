//! Integration tests for timeline streaming: framing, pacing, completion and
//! cancellation, driven through the fixture backend.
//!
//! Run with:
//!   cargo test --test test_timeline

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use graph_loader::backend::{BackendError, FixtureBackend};
use graph_loader::graph::{Document, GraphEdge, GraphNode, NodeKind, SharedStore, SimilarityEdge};
use graph_loader::timeline::{
    StreamOutcome, TimelineBatch, TimelineConsumer, TimelineEvent, TimelineMessage, TimelineProgress,
    TimelineStreamer,
};

const DELAY: Duration = Duration::from_millis(400);

// ── helpers ──────────────────────────────────────────────────────────────────

fn batch(index: u64, ids: &[&str], edges: Vec<SimilarityEdge>, total: u64) -> TimelineMessage {
    TimelineMessage::Batch(TimelineBatch {
        batch_index: index,
        documents: ids
            .iter()
            .enumerate()
            .map(|(i, id)| Document::new(*id, i as f64, index as f64).with_memories([format!("{id}-m")]))
            .collect(),
        edges,
        has_more: true,
        total_streamed: total,
    })
}

fn body(messages: &[TimelineMessage]) -> String {
    messages.iter().map(|m| m.to_line().unwrap()).collect()
}

/// Three batches of two documents each, then completion.
fn three_batches() -> String {
    body(&[
        batch(0, &["a", "b"], vec![SimilarityEdge::new("a", "b", 900.0)], 2),
        batch(1, &["c", "d"], vec![SimilarityEdge::new("c", "a", 0.5)], 4),
        batch(2, &["e", "f"], vec![], 6),
        TimelineMessage::Complete { total_documents: 6, total_edges: 2 },
    ])
}

fn streamer(fixture: &FixtureBackend, delay: Duration) -> (TimelineStreamer, SharedStore) {
    let store = SharedStore::new();
    (TimelineStreamer::new(fixture.clone().into(), store.clone(), 2, delay), store)
}

fn drain_events(rx: &mut mpsc::UnboundedReceiver<TimelineEvent>) -> Vec<TimelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn batch_count(events: &[TimelineEvent]) -> usize {
    events.iter().filter(|e| matches!(e, TimelineEvent::Batch { .. })).count()
}

/// Records each delivery with the (paused-clock) time it happened at.
struct Recorder {
    started: Instant,
    log: Mutex<Vec<(String, Duration)>>,
}

impl Recorder {
    fn new() -> Self {
        Self { started: Instant::now(), log: Mutex::new(Vec::new()) }
    }

    fn log(&self) -> Vec<(String, Duration)> {
        self.log.lock().unwrap().clone()
    }
}

impl TimelineConsumer for Recorder {
    fn on_batch(&self, nodes: Vec<GraphNode>, _edges: Vec<GraphEdge>) {
        let first_doc = nodes.iter().find(|n| n.kind == NodeKind::Document).map(|n| n.id.clone());
        self.log.lock().unwrap().push((format!("batch:{}", first_doc.unwrap_or_default()), self.started.elapsed()));
    }

    fn on_complete(&self, total_documents: u64, _total_edges: u64) {
        self.log.lock().unwrap().push((format!("complete:{total_documents}"), self.started.elapsed()));
    }
}

// ── framing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chunking_does_not_change_what_is_delivered() {
    let full = three_batches();
    let mut reference: Option<Vec<TimelineEvent>> = None;

    for chunk_size in [1, 2, 7, 33, 128, full.len()] {
        let fixture = FixtureBackend::new().with_timeline_body(&full, chunk_size);
        let (s, store) = streamer(&fixture, Duration::ZERO);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = s.start(&[], &tx).await;
        assert_eq!(outcome, StreamOutcome::Completed { total_documents: 6, total_edges: 2 }, "chunk size {chunk_size}");
        assert_eq!(store.lock().len(), 6);

        let events = drain_events(&mut rx);
        match &reference {
            Some(expected) => assert_eq!(&events, expected, "chunk size {chunk_size}"),
            None => reference = Some(events),
        }
    }
}

#[tokio::test]
async fn malformed_line_is_skipped_and_stream_continues() {
    let good = three_batches();
    let mut lines: Vec<&str> = good.lines().collect();
    lines.insert(1, r#"{"type":"batch","documents":[{"id":"broken""#);
    lines.insert(3, "<html>502 Bad Gateway</html>");
    let corrupted = lines.join("\n") + "\n";

    let fixture = FixtureBackend::new().with_timeline_body(&corrupted, 16);
    let (s, store) = streamer(&fixture, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = s.start(&[], &tx).await;
    assert!(matches!(outcome, StreamOutcome::Completed { .. }));
    assert_eq!(batch_count(&drain_events(&mut rx)), 3);
    assert!(!store.lock().contains("broken"));
}

#[tokio::test]
async fn unterminated_complete_still_completes() {
    let full = three_batches();
    let fixture = FixtureBackend::new().with_timeline_body(full.trim_end(), 50);
    let (s, _store) = streamer(&fixture, Duration::ZERO);
    let (tx, _rx) = mpsc::unbounded_channel();

    assert_eq!(s.start(&[], &tx).await, StreamOutcome::Completed { total_documents: 6, total_edges: 2 });
}

#[tokio::test]
async fn body_without_complete_ends_without_completion() {
    let partial = body(&[batch(0, &["a"], vec![], 1)]);
    let fixture = FixtureBackend::new().with_timeline_body(&partial, 8);
    let (s, _store) = streamer(&fixture, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    assert_eq!(s.start(&[], &tx).await, StreamOutcome::Ended);
    let events = drain_events(&mut rx);
    assert_eq!(batch_count(&events), 1);
    assert!(!events.iter().any(|e| matches!(e, TimelineEvent::Complete { .. })));
    assert_eq!(s.progress(), TimelineProgress { streamed: 1, total: None });
}

#[tokio::test(start_paused = true)]
async fn only_the_first_complete_counts() {
    let messages = body(&[
        batch(0, &["a"], vec![], 1),
        TimelineMessage::Complete { total_documents: 1, total_edges: 0 },
        batch(1, &["late"], vec![], 2),
        TimelineMessage::Complete { total_documents: 2, total_edges: 0 },
    ]);
    let fixture = FixtureBackend::new().with_timeline_body(&messages, 16);
    let (s, store) = streamer(&fixture, DELAY);
    let recorder = Recorder::new();

    let outcome = s.start(&[], &recorder).await;
    assert_eq!(outcome, StreamOutcome::Completed { total_documents: 1, total_edges: 0 });

    let labels: Vec<_> = recorder.log().into_iter().map(|(label, _)| label).collect();
    assert_eq!(labels, ["batch:a", "complete:1"]);
    assert!(!store.lock().contains("late"));
    assert_eq!(s.progress(), TimelineProgress { streamed: 1, total: Some(1) });
}

// ── pacing ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn batches_are_paced_in_order_and_complete_comes_last() {
    let fixture = FixtureBackend::new().with_timeline_body(&three_batches(), 4096);
    let (s, _store) = streamer(&fixture, DELAY);
    let recorder = Recorder::new();

    let outcome = s.start(&["work".to_string()], &recorder).await;
    assert!(matches!(outcome, StreamOutcome::Completed { .. }));

    let log = recorder.log();
    let labels: Vec<&str> = log.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, ["batch:a", "batch:c", "batch:e", "complete:6"]);
    for pair in log[..3].windows(2) {
        assert!(pair[1].1 - pair[0].1 >= DELAY, "batches closer than the pacing delay: {log:?}");
    }
    assert!(log[3].1 >= log[2].1);
    assert!(log[3].1 >= DELAY * 2);

    let requests = fixture.timeline_requests();
    let req = &requests[0];
    assert_eq!(req.container_tags, ["work"]);
    assert_eq!(req.batch_size, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_network_is_not_delayed_further() {
    // batches arrive 1s apart, well past the pacing delay
    let fixture = FixtureBackend::new()
        .with_timeline_chunks(three_batches().lines().map(|l| format!("{l}\n").into_bytes()).collect())
        .with_chunk_delay(Duration::from_secs(1));
    let (s, _store) = streamer(&fixture, DELAY);
    let recorder = Recorder::new();

    s.start(&[], &recorder).await;
    let log = recorder.log();
    assert_eq!(log.len(), 4);
    assert!(log[0].1 >= Duration::from_secs(1));
    for pair in log[..3].windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_secs(1) + DELAY, "{log:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn progress_follows_delivered_batches() {
    let fixture = FixtureBackend::new().with_timeline_body(&three_batches(), 4096);
    let (s, store) = streamer(&fixture, DELAY);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (outcome, mid) = tokio::join!(s.start(&[], &tx), async {
        rx.recv().await;
        rx.recv().await;
        (s.progress(), store.lock().len(), s.is_streaming())
    });

    assert_eq!(mid, (TimelineProgress { streamed: 4, total: None }, 4, true));
    assert!(matches!(outcome, StreamOutcome::Completed { .. }));
    assert_eq!(s.progress(), TimelineProgress { streamed: 6, total: Some(6) });
    assert!(!s.is_streaming());
}

// ── cancellation ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_prevents_any_further_delivery() {
    // the whole body arrives in one chunk, so later batches are already queued
    let fixture = FixtureBackend::new().with_timeline_body(&three_batches(), 4096);
    let (s, store) = streamer(&fixture, DELAY);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (outcome, stopped) = tokio::join!(s.start(&[], &tx), async {
        rx.recv().await;
        assert!(s.pending_batches() > 0);
        s.stop()
    });

    assert!(stopped);
    assert_eq!(outcome, StreamOutcome::Aborted);
    tokio::time::sleep(DELAY * 4).await;
    assert!(drain_events(&mut rx).is_empty());
    assert!(!s.is_streaming());
    assert_eq!(s.pending_batches(), 0);
    assert_eq!(s.last_error(), None);

    let store = store.lock();
    assert_eq!(store.len(), 2);
    assert!(store.contains("a") && !store.contains("c"));
}

#[tokio::test(start_paused = true)]
async fn new_stream_replaces_the_running_one() {
    let fixture = FixtureBackend::new().with_timeline_body(&three_batches(), 4096);
    let (s, _store) = streamer(&fixture, DELAY);
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    let (first, second) = tokio::join!(s.start(&[], &tx_a), async {
        rx_a.recv().await;
        s.start(&["next".to_string()], &tx_b).await
    });

    assert_eq!(first, StreamOutcome::Aborted);
    assert!(matches!(second, StreamOutcome::Completed { total_documents: 6, .. }));
    assert!(drain_events(&mut rx_a).is_empty());
    assert_eq!(batch_count(&drain_events(&mut rx_b)), 3);
    assert_eq!(fixture.timeline_calls(), 2);
    assert!(!s.is_streaming());
}

// ── failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_failure_reports_without_consumer_calls() {
    let fixture = FixtureBackend::new()
        .with_timeline_open_error(BackendError::Status { status: 401, message: "unauthorized".into() });
    let (s, store) = streamer(&fixture, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = s.start(&[], &tx).await;
    assert_eq!(outcome, StreamOutcome::Failed(BackendError::Status { status: 401, message: "unauthorized".into() }));
    assert_eq!(s.last_error(), Some(BackendError::Status { status: 401, message: "unauthorized".into() }));
    assert!(drain_events(&mut rx).is_empty());
    assert!(store.lock().is_empty());
    assert!(!s.is_streaming());
}

#[tokio::test]
async fn broken_body_keeps_what_arrived() {
    let partial = body(&[batch(0, &["a"], vec![], 1), batch(1, &["b"], vec![], 2)]);
    let fixture = FixtureBackend::new()
        .with_timeline_body(&partial, 10)
        .with_timeline_body_error(BackendError::Transport("connection reset".into()));
    let (s, store) = streamer(&fixture, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = s.start(&[], &tx).await;
    assert!(matches!(outcome, StreamOutcome::Failed(BackendError::Transport(_))));
    assert_eq!(batch_count(&drain_events(&mut rx)), 2);
    assert_eq!(store.lock().len(), 2);
    assert!(s.last_error().is_some());
}
