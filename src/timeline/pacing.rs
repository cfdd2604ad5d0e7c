//! Paced delivery of decoded timeline messages.
//!
//! The reader pushes messages as they decode; a single drain loop hands them
//! to the consumer in arrival order, keeping at least `delay` between two
//! batch deliveries. The completion marker rides the same queue, so it is
//! never delivered before a batch that was decoded ahead of it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::message::TimelineMessage;

#[derive(Debug)]
pub struct BatchPacer {
    queue: Mutex<VecDeque<TimelineMessage>>,
    notify: Notify,
    closed: AtomicBool,
    draining: AtomicBool,
    delay: Duration,
}

impl BatchPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Enqueue a message and wake the drain loop.
    pub fn push(&self, message: TimelineMessage) {
        self.lock().push_back(message);
        self.notify.notify_one();
    }

    /// No more messages will be pushed; the drain loop exits once empty.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Drop everything still queued. Returns how many messages were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Deliver queued messages until the pacer is closed and empty, or until
    /// `cancel` fires. Returns `false` without delivering anything if another
    /// drain loop is already running.
    ///
    /// Cancellation is checked immediately before every delivery, so nothing
    /// reaches `deliver` after `cancel` has fired. The first completion marker
    /// is the last thing delivered; anything queued behind it is dropped.
    pub async fn drain<F>(&self, cancel: &CancellationToken, mut deliver: F) -> bool
    where
        F: FnMut(TimelineMessage),
    {
        if self.draining.swap(true, Ordering::SeqCst) {
            return false;
        }

        let mut last_batch: Option<Instant> = None;
        let mut completed = false;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = self.lock().pop_front();
            match next {
                Some(message) if completed => {
                    warn!(kind = message.kind(), "timeline message after completion dropped");
                }
                Some(message @ TimelineMessage::Batch(_)) => {
                    if let Some(prev) = last_batch {
                        let due = prev + self.delay;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep_until(due) => {}
                        }
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    deliver(message);
                    last_batch = Some(Instant::now());
                }
                Some(message) => {
                    deliver(message);
                    completed = true;
                }
                None => {
                    if self.closed.load(Ordering::SeqCst) {
                        // close() may race the empty check above
                        if self.lock().is_empty() {
                            break;
                        }
                        continue;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }

        self.draining.store(false, Ordering::SeqCst);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TimelineMessage>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
