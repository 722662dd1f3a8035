//! Remote payload download
//!
//! Fetching happens only when an item reaches the head of its queue.
//! Locators that point straight at an audio file are streamed to disk over
//! HTTP; webpage URLs and anything else go through yt-dlp, preferring
//! containers the decode process handles most reliably.

use crate::playback::item::{is_accepted_extension, PlayableItem};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;
use voiceq_common::{Error, Result};

/// Container preference for yt-dlp downloads
const FORMAT_PREFERENCE: &str = "ba[ext=m4a]/ba[ext=webm]/ba/b";

/// Downloads a remote item's payload into the temp dir
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the payload and return the temporary file path
    async fn fetch(&self, item: &PlayableItem, dest_dir: &Path) -> Result<PathBuf>;
}

/// Production fetcher: direct HTTP for plain audio URLs, yt-dlp otherwise
pub struct YtDlpFetcher {
    executable: PathBuf,
    http: reqwest::Client,
}

impl YtDlpFetcher {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            http: reqwest::Client::new(),
        }
    }

    async fn download_direct(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("Direct download {} -> {}", url, dest.display());
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::FetchFailed(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::FetchFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn download_via_ytdlp(&self, locator: &str, dest_dir: &Path) -> Result<PathBuf> {
        let template = dest_dir.join(format!("voiceq-{}.%(ext)s", Uuid::new_v4().simple()));
        debug!("yt-dlp download {} -> {}", locator, template.display());

        let output = Command::new(&self.executable)
            .arg("-f")
            .arg(FORMAT_PREFERENCE)
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("-o")
            .arg(&template)
            .arg("--no-simulate")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--")
            .arg(locator)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::FetchFailed(format!("{}: {}", self.executable.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::FetchFailed(
                stderr.lines().last().unwrap_or("download tool failed").to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| Error::FetchFailed("download tool reported no file".to_string()))?;

        if !path.is_file() {
            return Err(Error::FetchFailed(format!(
                "downloaded file missing: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, item: &PlayableItem, dest_dir: &Path) -> Result<PathBuf> {
        let locator = item
            .locator()
            .ok_or_else(|| Error::FetchFailed("item has no remote locator".to_string()))?;

        match direct_audio_extension(locator) {
            Some(ext) => {
                let dest = dest_dir.join(format!("voiceq-{}.{}", Uuid::new_v4().simple(), ext));
                self.download_direct(locator, &dest).await?;
                Ok(dest)
            }
            None => self.download_via_ytdlp(locator, dest_dir).await,
        }
    }
}

/// Extension of a URL whose path names an audio file directly, ignoring the
/// query string
fn direct_audio_extension(url: &str) -> Option<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return None;
    }
    let path_part = url.split(['?', '#']).next()?;
    let path = Path::new(path_part);
    if is_accepted_extension(path) {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    } else {
        None
    }
}
