//! Playable queue items

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File extensions the external decode process is expected to handle
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg", "opus", "aac"];

/// Title used when the lookup service yields none
pub const UNTITLED: &str = "Untitled";

/// Where an item's audio payload comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum SourceKind {
    /// Remote media, fetched when the item reaches the head of the queue.
    /// The locator is a webpage URL, a direct media URL, or a search query
    /// already accepted by the lookup service.
    Remote { locator: String },

    /// Local audio file, streamed directly
    LocalFile { path: PathBuf },
}

/// One entry of a session's playback queue. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PlayableItem {
    /// Unique identity, assigned at creation. Two items with identical
    /// titles are still distinguishable.
    pub id: Uuid,

    /// Display name
    pub title: String,

    /// Payload source
    pub source: SourceKind,

    /// Reported duration in seconds, when the lookup service knows it
    pub duration_secs: Option<u64>,

    /// True when the backing file was created by voiceq itself (saved
    /// attachment) and must be deleted after playback or abandonment
    pub is_temporary: bool,

    /// Set once the item has been re-inserted after an abandonment, so the
    /// requeue-once policy never loops
    #[serde(skip)]
    pub requeued: bool,
}

impl PlayableItem {
    /// Remote item resolved from a query or URL
    pub fn remote(title: impl Into<String>, locator: impl Into<String>, duration_secs: Option<u64>) -> Self {
        let title = title.into();
        Self {
            id: Uuid::new_v4(),
            title: if title.is_empty() { UNTITLED.to_string() } else { title },
            source: SourceKind::Remote { locator: locator.into() },
            duration_secs,
            is_temporary: false,
            requeued: false,
        }
    }

    /// Local file item. `temporary` marks files voiceq created itself.
    pub fn local(path: PathBuf, temporary: bool) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        Self {
            id: Uuid::new_v4(),
            title,
            source: SourceKind::LocalFile { path },
            duration_secs: None,
            is_temporary: temporary,
            requeued: false,
        }
    }

    /// Copy of this item marked as already requeued
    pub fn mark_requeued(&self) -> Self {
        let mut item = self.clone();
        item.requeued = true;
        item
    }

    /// Local path of the payload, if the item is file-backed
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            SourceKind::LocalFile { path } => Some(path),
            SourceKind::Remote { .. } => None,
        }
    }

    /// Remote locator, if the item needs a fetch
    pub fn locator(&self) -> Option<&str> {
        match &self.source {
            SourceKind::Remote { locator } => Some(locator),
            SourceKind::LocalFile { .. } => None,
        }
    }
}

/// True when the extension names an accepted audio container
pub fn is_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
