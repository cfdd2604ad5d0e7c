//! Timeline streaming — load the whole filtered corpus as a paced sequence
//! of batches.
//!
//! One long-lived request returns newline-delimited JSON. The reader frames
//! and decodes it as bytes arrive and queues each message on a
//! [`BatchPacer`]; the drain loop merges each batch into the session store
//! and hands its derived nodes/edges to a [`TimelineConsumer`] at a bounded
//! rate.
//!
//! # Module layout
//!
//! - **framing** — `LineFramer` / `MessageDecoder`: newline framing with
//!   per-line error isolation.
//! - **message** — `TimelineMessage` wire types.
//! - **pacing** — `BatchPacer`: ordered queue with a single drain loop.

pub mod framing;
pub mod message;
pub mod pacing;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::{BackendError, GraphBackend, TimelineRequest};
use crate::graph::layout;
use crate::graph::{GraphEdge, GraphNode, SharedStore};

pub use framing::{LineFramer, MessageDecoder};
pub use message::{TimelineBatch, TimelineMessage};
pub use pacing::BatchPacer;

// ── Consumer contract ─────────────────────────────────────────────────────────

/// Receiver of paced batches. Called from the drain loop, one call at a time.
pub trait TimelineConsumer: Send + Sync {
    fn on_batch(&self, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>);

    /// Called at most once per stream, after every batch has been delivered.
    /// No `on_batch` follows it.
    fn on_complete(&self, total_documents: u64, total_edges: u64);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    Batch { nodes: Vec<GraphNode>, edges: Vec<GraphEdge> },
    Complete { total_documents: u64, total_edges: u64 },
}

/// Forward deliveries as events. A closed receiver is ignored.
impl TimelineConsumer for mpsc::UnboundedSender<TimelineEvent> {
    fn on_batch(&self, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) {
        let _ = self.send(TimelineEvent::Batch { nodes, edges });
    }

    fn on_complete(&self, total_documents: u64, total_edges: u64) {
        let _ = self.send(TimelineEvent::Complete { total_documents, total_edges });
    }
}

// ── Observables ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineProgress {
    /// Running total reported by the last delivered batch.
    pub streamed: u64,
    /// Known once the stream completes.
    pub total: Option<u64>,
}

/// How a call to [`TimelineStreamer::start`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The `complete` message was delivered after the last batch.
    Completed { total_documents: u64, total_edges: u64 },
    /// The body ended without a `complete` message.
    Ended,
    /// Stopped by `stop()` or by a newer stream.
    Aborted,
    Failed(BackendError),
}

// ── Streamer ──────────────────────────────────────────────────────────────────

pub struct TimelineStreamer {
    backend: GraphBackend,
    store: SharedStore,
    batch_size: u32,
    delay: Duration,
    state: Mutex<StreamState>,
}

#[derive(Default)]
struct StreamState {
    generation: u64,
    active: Option<ActiveStream>,
    progress: TimelineProgress,
    last_error: Option<BackendError>,
}

struct ActiveStream {
    generation: u64,
    cancel: CancellationToken,
    pacer: Arc<BatchPacer>,
}

enum ReadEnd {
    Ended,
    Aborted,
    Failed(BackendError),
}

impl TimelineStreamer {
    pub fn new(backend: GraphBackend, store: SharedStore, batch_size: u32, delay: Duration) -> Self {
        Self { backend, store, batch_size, delay, state: Mutex::new(StreamState::default()) }
    }

    pub fn is_streaming(&self) -> bool {
        self.state().active.is_some()
    }

    pub fn progress(&self) -> TimelineProgress {
        self.state().progress
    }

    pub fn last_error(&self) -> Option<BackendError> {
        self.state().last_error.clone()
    }

    /// Batches decoded but not yet delivered.
    pub fn pending_batches(&self) -> usize {
        self.state().active.as_ref().map_or(0, |a| a.pacer.pending())
    }

    /// Abort the running stream, if any: the network read unwinds, queued
    /// batches are dropped and no further consumer call is made. Returns
    /// whether a stream was running.
    pub fn stop(&self) -> bool {
        let Some(active) = self.state().active.take() else {
            return false;
        };
        active.cancel.cancel();
        let dropped = active.pacer.clear();
        info!(dropped, "timeline stream stopped");
        true
    }

    /// Stream the corpus matching `container_tags` into the store, delivering
    /// each batch to `consumer`. Any stream already running is stopped first.
    ///
    /// Resolves once the stream has finished, failed or been stopped.
    pub async fn start(&self, container_tags: &[String], consumer: &dyn TimelineConsumer) -> StreamOutcome {
        self.stop();

        let cancel = CancellationToken::new();
        let pacer = Arc::new(BatchPacer::new(self.delay));
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.active = Some(ActiveStream {
                generation: state.generation,
                cancel: cancel.clone(),
                pacer: pacer.clone(),
            });
            state.progress = TimelineProgress::default();
            state.last_error = None;
            state.generation
        };

        let stream_id = Uuid::new_v4();
        let request = TimelineRequest { container_tags: container_tags.to_vec(), batch_size: self.batch_size };
        info!(%stream_id, backend = self.backend.name(), batch_size = self.batch_size, "timeline stream started");

        let mut completed = None;
        let (read_end, _) = tokio::join!(
            self.read(&request, &pacer, &cancel),
            pacer.drain(&cancel, |message| {
                if let Some(totals) = self.deliver(message, consumer) {
                    completed = Some(totals);
                }
            }),
        );

        let outcome = if cancel.is_cancelled() {
            StreamOutcome::Aborted
        } else if let Some((total_documents, total_edges)) = completed {
            StreamOutcome::Completed { total_documents, total_edges }
        } else {
            match read_end {
                ReadEnd::Failed(e) => StreamOutcome::Failed(e),
                ReadEnd::Ended | ReadEnd::Aborted => StreamOutcome::Ended,
            }
        };

        let mut state = self.state();
        if state.active.as_ref().is_some_and(|a| a.generation == generation) {
            state.active = None;
        }
        match &outcome {
            StreamOutcome::Completed { total_documents, total_edges } => {
                info!(%stream_id, total_documents, total_edges, "timeline stream complete");
            }
            StreamOutcome::Ended => info!(%stream_id, "timeline stream ended without completion"),
            StreamOutcome::Aborted => info!(%stream_id, "timeline stream aborted"),
            StreamOutcome::Failed(e) => {
                error!(%stream_id, error = %e, "timeline stream failed");
                // a newer stream owns the error slot once it has started
                if state.generation == generation {
                    state.last_error = Some(e.clone());
                }
            }
        }
        outcome
    }

    /// Read the body, framing and decoding it into the pacer. Always closes
    /// the pacer so the drain loop can finish.
    async fn read(&self, request: &TimelineRequest, pacer: &BatchPacer, cancel: &CancellationToken) -> ReadEnd {
        let end = self.read_body(request, pacer, cancel).await;
        pacer.close();
        end
    }

    async fn read_body(&self, request: &TimelineRequest, pacer: &BatchPacer, cancel: &CancellationToken) -> ReadEnd {
        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadEnd::Aborted,
            opened = self.backend.open_timeline(request) => match opened {
                Ok(body) => body,
                Err(e) => return ReadEnd::Failed(e),
            },
        };

        let mut decoder = MessageDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReadEnd::Aborted,
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for message in decoder.feed(&bytes) {
                        pacer.push(message);
                    }
                }
                Some(Err(e)) => return ReadEnd::Failed(e),
                None => break,
            }
        }

        if let Some(message) = decoder.finish() {
            pacer.push(message);
        }
        debug!(malformed = decoder.malformed(), "timeline body finished");
        ReadEnd::Ended
    }

    /// Apply one paced message. Returns the totals for a `complete` message.
    fn deliver(&self, message: TimelineMessage, consumer: &dyn TimelineConsumer) -> Option<(u64, u64)> {
        match message {
            TimelineMessage::Batch(batch) => {
                let snapshot = layout::batch_graph(&batch.documents, &batch.edges);
                let added = {
                    let mut store = self.store.lock();
                    let added = store.upsert_documents(batch.documents);
                    store.merge_edges(batch.edges);
                    added
                };
                self.state().progress.streamed = batch.total_streamed;
                debug!(
                    batch = batch.batch_index,
                    nodes = snapshot.nodes.len(),
                    edges = snapshot.edges.len(),
                    new_documents = added,
                    "timeline batch delivered"
                );
                consumer.on_batch(snapshot.nodes, snapshot.edges);
                None
            }
            TimelineMessage::Complete { total_documents, total_edges } => {
                self.state().progress = TimelineProgress { streamed: total_documents, total: Some(total_documents) };
                consumer.on_complete(total_documents, total_edges);
                Some((total_documents, total_edges))
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TimelineStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}
