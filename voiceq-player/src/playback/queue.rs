//! Per-session playback queue
//!
//! FIFO of pending items plus a live now-playing slot, shared between many
//! producers (command handlers) and the single consumer (the playback loop).
//! All state sits behind one lock so snapshots never observe a torn queue.

use crate::playback::item::PlayableItem;
use std::collections::VecDeque;
use tokio::sync::{Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<PlayableItem>,
    now_playing: Option<PlayableItem>,
}

/// Ordered, thread-safe queue with a blocking dequeue for the single consumer
pub struct SessionQueue {
    inner: RwLock<QueueInner>,
    /// Wakes the consumer when an item arrives
    available: Notify,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(QueueInner::default()),
            available: Notify::new(),
        }
    }

    /// Append an item; visible to snapshots immediately
    pub async fn enqueue(&self, item: PlayableItem) {
        {
            let mut inner = self.inner.write().await;
            inner.pending.push_back(item);
        }
        self.available.notify_one();
    }

    /// Re-insert an item at the head, preserving FIFO order for the rest
    pub async fn requeue(&self, item: PlayableItem) {
        {
            let mut inner = self.inner.write().await;
            inner.pending.push_front(item);
        }
        self.available.notify_one();
    }

    /// Remove and return the head item, suspending until one is available.
    ///
    /// Single-consumer contract: only the session's playback loop calls this.
    pub async fn dequeue(&self) -> PlayableItem {
        loop {
            // Register interest before checking, so a notify between the
            // check and the await is not lost.
            let notified = self.available.notified();
            if let Some(item) = self.inner.write().await.pending.pop_front() {
                return item;
            }
            notified.await;
        }
    }

    /// Mark an item as actively streaming. Also strips any pending entry
    /// with the same id, so a now-playing item never shows up twice in a
    /// snapshot.
    pub async fn set_now_playing(&self, item: PlayableItem) {
        let mut inner = self.inner.write().await;
        inner.pending.retain(|p| p.id != item.id);
        inner.now_playing = Some(item);
    }

    /// Clear the now-playing slot (stream ended, errored, or was skipped)
    pub async fn clear_now_playing(&self) {
        self.inner.write().await.now_playing = None;
    }

    /// Currently streaming item, if any
    pub async fn now_playing(&self) -> Option<PlayableItem> {
        self.inner.read().await.now_playing.clone()
    }

    /// Point-in-time copy for display: now-playing first, then pending in
    /// enqueue order
    pub async fn snapshot(&self) -> Vec<PlayableItem> {
        let inner = self.inner.read().await;
        inner
            .now_playing
            .iter()
            .chain(inner.pending.iter())
            .cloned()
            .collect()
    }

    /// Drain all pending items without playing them. The now-playing slot is
    /// untouched; an active stream must be stopped separately. Returns the
    /// drained items so the caller can release their temporary resources.
    pub async fn clear(&self) -> Vec<PlayableItem> {
        let mut inner = self.inner.write().await;
        let drained: Vec<PlayableItem> = inner.pending.drain(..).collect();
        if !drained.is_empty() {
            debug!("Drained {} pending items", drained.len());
        }
        drained
    }

    /// True when a pending entry with this id exists
    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.pending.iter().any(|p| p.id == id)
    }

    /// Number of pending items (excludes now-playing)
    pub async fn len(&self) -> usize {
        self.inner.read().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.pending.is_empty()
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}
