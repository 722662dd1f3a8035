//! Turns user input into playable items
//!
//! Classification order: existing local file path, supplied attachment,
//! otherwise a remote query handed to the metadata lookup service. Local
//! classification never touches the network.

use crate::playback::item::{is_accepted_extension, PlayableItem};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use voiceq_common::{Error, Result};

/// What the lookup service resolved a query into
#[derive(Debug, Clone)]
pub struct Resolution {
    pub title: String,
    /// Webpage URL, preferred as the fetch locator when present
    pub webpage_url: Option<String>,
    /// Direct media URL
    pub direct_url: Option<String>,
    pub duration_secs: Option<u64>,
}

impl Resolution {
    /// Locator handed to the fetcher: webpage URL over direct media URL
    pub fn locator(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.direct_url.as_deref())
    }
}

/// Metadata/lookup service boundary: query or URL in, title + locator out
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Resolution>;
}

/// A user playback request
#[derive(Debug, Clone)]
pub enum PlayRequest {
    /// Free text: local path, URL, or search query
    Query(String),
    /// An already-fetched attachment
    Attachment { filename: String, data: Vec<u8> },
}

/// Resolves play requests into queue items
pub struct SourceResolver {
    lookup: std::sync::Arc<dyn MetadataLookup>,
    temp_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(lookup: std::sync::Arc<dyn MetadataLookup>, temp_dir: PathBuf) -> Self {
        Self { lookup, temp_dir }
    }

    /// Resolve a request into an item ready for the queue.
    ///
    /// Existing files with unaccepted extensions are rejected here and never
    /// enter the queue. Attachments are saved under the private temp dir and
    /// come back marked temporary.
    pub async fn resolve(&self, request: PlayRequest) -> Result<PlayableItem> {
        match request {
            PlayRequest::Query(raw) => {
                let query = raw.trim();
                let path = Path::new(query);
                if path.is_file() {
                    if !is_accepted_extension(path) {
                        return Err(Error::UnsupportedFormat(query.to_string()));
                    }
                    debug!("Resolved local file: {}", query);
                    return Ok(PlayableItem::local(path.to_path_buf(), false));
                }

                let resolution = self.lookup.resolve(query).await?;
                let locator = resolution
                    .locator()
                    .ok_or_else(|| {
                        Error::ResolutionFailed(format!("no playable URL for '{}'", query))
                    })?
                    .to_string();
                debug!("Resolved '{}' -> {}", query, locator);
                Ok(PlayableItem::remote(
                    resolution.title,
                    locator,
                    resolution.duration_secs,
                ))
            }
            PlayRequest::Attachment { filename, data } => {
                self.save_attachment(&filename, &data).await
            }
        }
    }

    /// Save attachment bytes to a private temp file and wrap them as a
    /// temporary local item
    async fn save_attachment(&self, filename: &str, data: &[u8]) -> Result<PlayableItem> {
        let source = Path::new(filename);
        if !is_accepted_extension(source) {
            return Err(Error::UnsupportedFormat(filename.to_string()));
        }
        // Extension is validated above
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3")
            .to_ascii_lowercase();

        let dest = self
            .temp_dir
            .join(format!("voiceq-{}.{}", Uuid::new_v4().simple(), ext));
        tokio::fs::write(&dest, data).await?;
        debug!("Saved attachment {} -> {}", filename, dest.display());

        let mut item = PlayableItem::local(dest, true);
        // Display the attachment's own name, not the temp file name
        if let Some(stem) = source.file_stem().and_then(|s| s.to_str()) {
            item.title = stem.to_string();
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SourceKind;
    use std::sync::Arc;

    struct FixedLookup(Result<Resolution>);

    #[async_trait]
    impl MetadataLookup for FixedLookup {
        async fn resolve(&self, _query: &str) -> Result<Resolution> {
            match &self.0 {
                Ok(r) => Ok(r.clone()),
                Err(_) => Err(Error::ResolutionFailed("video unavailable".to_string())),
            }
        }
    }

    fn resolver_with(lookup: FixedLookup, temp: &tempfile::TempDir) -> SourceResolver {
        SourceResolver::new(Arc::new(lookup), temp.path().to_path_buf())
    }

    fn ok_resolution() -> Resolution {
        Resolution {
            title: "Some Song".to_string(),
            webpage_url: Some("https://example.com/watch?v=1".to_string()),
            direct_url: Some("https://cdn.example.com/a.m4a".to_string()),
            duration_secs: Some(213),
        }
    }

    #[tokio::test]
    async fn existing_audio_file_resolves_locally() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("track.mp3");
        tokio::fs::write(&file, b"x").await.unwrap();

        let resolver = resolver_with(
            FixedLookup(Err(Error::Internal("lookup must not be called".to_string()))),
            &temp,
        );
        let item = resolver
            .resolve(PlayRequest::Query(file.to_string_lossy().into_owned()))
            .await
            .unwrap();

        assert!(!item.is_temporary);
        assert!(matches!(item.source, SourceKind::LocalFile { .. }));
        assert_eq!(item.title, "track");
    }

    #[tokio::test]
    async fn existing_file_with_bad_extension_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("video.mkv");
        tokio::fs::write(&file, b"x").await.unwrap();

        let resolver = resolver_with(FixedLookup(Ok(ok_resolution())), &temp);
        let err = resolver
            .resolve(PlayRequest::Query(file.to_string_lossy().into_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn non_path_query_goes_through_lookup() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = resolver_with(FixedLookup(Ok(ok_resolution())), &temp);

        let item = resolver
            .resolve(PlayRequest::Query("  some song title  ".to_string()))
            .await
            .unwrap();

        assert_eq!(item.title, "Some Song");
        assert_eq!(item.duration_secs, Some(213));
        assert_eq!(item.locator(), Some("https://example.com/watch?v=1"));
    }

    #[tokio::test]
    async fn lookup_failure_surfaces_with_cause() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = resolver_with(
            FixedLookup(Err(Error::ResolutionFailed(String::new()))),
            &temp,
        );

        let err = resolver
            .resolve(PlayRequest::Query("dead link".to_string()))
            .await
            .unwrap_err();
        match err {
            Error::ResolutionFailed(cause) => assert!(cause.contains("unavailable")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn attachment_saves_as_temporary() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = resolver_with(FixedLookup(Ok(ok_resolution())), &temp);

        let item = resolver
            .resolve(PlayRequest::Attachment {
                filename: "My Demo.ogg".to_string(),
                data: vec![1, 2, 3],
            })
            .await
            .unwrap();

        assert!(item.is_temporary);
        assert_eq!(item.title, "My Demo");
        let path = item.local_path().unwrap();
        assert!(path.starts_with(temp.path()));
        assert_eq!(path.extension().unwrap(), "ogg");
        assert_eq!(tokio::fs::read(path).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn attachment_with_bad_extension_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = resolver_with(FixedLookup(Ok(ok_resolution())), &temp);

        let err = resolver
            .resolve(PlayRequest::Attachment {
                filename: "clip.mov".to_string(),
                data: vec![0],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        // Nothing was written
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
