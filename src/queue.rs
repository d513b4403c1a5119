//! Ordered speech queue.
//!
//! Chunks must be spoken strictly in arrival order, one at a time —
//! synthesis is network I/O with variable latency, so ordering cannot be
//! left to task scheduling. The queue is a plain FIFO; the single consumer
//! (the coordinator's speech stage) awaits each chunk's full playback
//! before popping the next, which is what enforces the one-in-flight
//! invariant.

use crate::pipeline::messages::SpeakableChunk;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// FIFO of chunks awaiting synthesis and playback.
#[derive(Debug, Default)]
pub struct SpeechQueue {
    inner: Mutex<VecDeque<SpeakableChunk>>,
    notify: Notify,
}

impl SpeechQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the tail. Never blocks.
    pub fn push(&self, chunk: SpeakableChunk) {
        self.lock().push_back(chunk);
        self.notify.notify_one();
    }

    /// Pop the head chunk, waiting until one is available.
    ///
    /// Intended for a single consumer; the stored-permit semantics of
    /// [`Notify`] make the check-then-wait loop race-free for one waiter.
    pub async fn pop(&self) -> SpeakableChunk {
        loop {
            if let Some(chunk) = self.lock().pop_front() {
                return chunk;
            }
            self.notify.notified().await;
        }
    }

    /// Drop every queued chunk (interruption).
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of queued chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SpeakableChunk>> {
        // Chunks are plain data; a poisoned lock only means a panicked
        // pusher, and the queue contents are still coherent.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
