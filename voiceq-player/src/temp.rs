//! Temporary file ownership and cleanup
//!
//! Downloaded payloads and saved attachments live in the private temp dir
//! for exactly one playback attempt. The tracker maps item id -> path;
//! removing the map entry is the exactly-once gate, so racing cleanup paths
//! (loop terminal handling, the armed watcher, queue drains) can all call
//! `release` safely. A deletion failure is a leak, not a fault: it is
//! logged and swallowed.

use crate::playback::{PlayableItem, StreamDone};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tracks temporary files by owning item id
pub struct TempFileTracker {
    files: Mutex<HashMap<Uuid, PathBuf>>,
}

impl TempFileTracker {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Record a temporary file owned by the given item
    pub async fn register(&self, item_id: Uuid, path: PathBuf) {
        debug!("Tracking temp file {} for item {}", path.display(), item_id);
        self.files.lock().await.insert(item_id, path);
    }

    /// Delete the item's temporary file, if one is tracked. Exactly one
    /// caller observes the tracked path; the rest are no-ops.
    pub async fn release(&self, item: &PlayableItem) {
        self.release_id(item.id).await;
    }

    /// As `release`, keyed directly by item id
    pub async fn release_id(&self, item_id: Uuid) {
        let path = self.files.lock().await.remove(&item_id);
        if let Some(path) = path {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed temp file {}", path.display()),
                Err(e) => warn!("Could not remove temp file {}: {}", path.display(), e),
            }
        }
    }

    /// Arm a one-shot cleanup bound to the stream's terminal signal
    pub fn release_after(self: &Arc<Self>, item_id: Uuid, done: StreamDone) {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            done.wait().await;
            tracker.release_id(item_id).await;
        });
    }

    /// Number of currently tracked files
    pub async fn tracked(&self) -> usize {
        self.files.lock().await.len()
    }
}

impl Default for TempFileTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::StreamOutcome;
    use std::time::Duration;

    async fn make_temp_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, b"pcm").await.unwrap();
        path
    }

    #[tokio::test]
    async fn release_deletes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_temp_file(&dir, "a.m4a").await;
        let item = PlayableItem::local(path.clone(), true);

        let tracker = TempFileTracker::new();
        tracker.register(item.id, path.clone()).await;

        tracker.release(&item).await;
        assert!(!path.exists());
        assert_eq!(tracker.tracked().await, 0);

        // Second release finds nothing to delete and does not fail
        tracker.release(&item).await;
    }

    #[tokio::test]
    async fn release_of_untracked_item_is_noop() {
        let tracker = TempFileTracker::new();
        let item = PlayableItem::local(PathBuf::from("/nowhere.mp3"), false);
        tracker.release(&item).await;
    }

    #[tokio::test]
    async fn deletion_failure_is_swallowed() {
        let tracker = TempFileTracker::new();
        let item = PlayableItem::local(PathBuf::from("/no/such/dir/file.mp3"), true);
        tracker.register(item.id, PathBuf::from("/no/such/dir/file.mp3")).await;
        // Missing file: logged, not propagated
        tracker.release(&item).await;
        assert_eq!(tracker.tracked().await, 0);
    }

    #[tokio::test]
    async fn armed_cleanup_fires_on_terminal_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_temp_file(&dir, "b.m4a").await;
        let item = PlayableItem::local(path.clone(), true);

        let tracker = Arc::new(TempFileTracker::new());
        tracker.register(item.id, path.clone()).await;

        let done = StreamDone::new();
        tracker.release_after(item.id, done.clone());

        // Not deleted while the stream is live
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(path.exists());

        done.fire(StreamOutcome::Completed);
        tokio::time::timeout(Duration::from_secs(1), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("file should be removed after terminal signal");
    }
}
