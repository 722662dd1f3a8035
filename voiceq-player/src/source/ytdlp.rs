//! yt-dlp backed metadata lookup
//!
//! Spawns `yt-dlp -J` and parses the JSON info dump. Free text queries fall
//! through to a single-result search via `--default-search ytsearch1`, so
//! callers can pass URLs and titles interchangeably.

use crate::source::resolver::{MetadataLookup, Resolution};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use voiceq_common::{Error, Result};

use crate::playback::item::UNTITLED;

/// Lookup implementation shelling out to yt-dlp
pub struct YtDlpLookup {
    executable: PathBuf,
}

impl YtDlpLookup {
    pub fn new(executable: PathBuf) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl MetadataLookup for YtDlpLookup {
    async fn resolve(&self, query: &str) -> Result<Resolution> {
        debug!("Resolving query: {}", query);

        let output = Command::new(&self.executable)
            .arg("-J")
            .arg("--no-playlist")
            .arg("--default-search")
            .arg("ytsearch1")
            .arg("--no-warnings")
            .arg("--")
            .arg(query)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::ResolutionFailed(format!("{}: {}", self.executable.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ResolutionFailed(
                stderr.lines().last().unwrap_or("lookup tool failed").to_string(),
            ));
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::ResolutionFailed(format!("bad info dump: {}", e)))?;
        parse_info(&info)
    }
}

/// Extract a resolution from an info dump, descending into the first entry
/// of a search result
fn parse_info(info: &Value) -> Result<Resolution> {
    let entry = match info.get("entries").and_then(Value::as_array) {
        Some(entries) => entries
            .first()
            .ok_or_else(|| Error::ResolutionFailed("no search results".to_string()))?,
        None => info,
    };

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(UNTITLED)
        .to_string();
    let webpage_url = entry
        .get("webpage_url")
        .and_then(Value::as_str)
        .map(str::to_string);
    let direct_url = pick_audio_url(entry);
    let duration_secs = entry.get("duration").and_then(Value::as_u64);

    if webpage_url.is_none() && direct_url.is_none() {
        return Err(Error::ResolutionFailed(format!("no playable URL for '{}'", title)));
    }

    Ok(Resolution {
        title,
        webpage_url,
        direct_url,
        duration_secs,
    })
}

/// Best direct audio URL from an info dump. Prefers the entry's own URL,
/// then audio-only requested formats, then the last video-free format.
fn pick_audio_url(entry: &Value) -> Option<String> {
    if let Some(url) = entry.get("url").and_then(Value::as_str) {
        return Some(url.to_string());
    }

    if let Some(requested) = entry.get("requested_formats").and_then(Value::as_array) {
        for format in requested {
            let has_url = format.get("url").and_then(Value::as_str);
            let video_free = format.get("vcodec").and_then(Value::as_str) == Some("none");
            let has_audio = format
                .get("acodec")
                .and_then(Value::as_str)
                .map(|a| a != "none")
                .unwrap_or(false);
            if let Some(url) = has_url {
                if video_free || has_audio {
                    return Some(url.to_string());
                }
            }
        }
        if let Some(url) = requested.first().and_then(|f| f.get("url")).and_then(Value::as_str) {
            return Some(url.to_string());
        }
    }

    if let Some(formats) = entry.get("formats").and_then(Value::as_array) {
        for format in formats.iter().rev() {
            let vcodec = format.get("vcodec").and_then(Value::as_str);
            let video_free = matches!(vcodec, Some("none") | None);
            if let Some(url) = format.get("url").and_then(Value::as_str) {
                if video_free {
                    return Some(url.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_video_dump() {
        let info = json!({
            "title": "A Song",
            "webpage_url": "https://example.com/watch?v=1",
            "url": "https://cdn.example.com/a.m4a",
            "duration": 213,
        });
        let res = parse_info(&info).unwrap();
        assert_eq!(res.title, "A Song");
        assert_eq!(res.webpage_url.as_deref(), Some("https://example.com/watch?v=1"));
        assert_eq!(res.direct_url.as_deref(), Some("https://cdn.example.com/a.m4a"));
        assert_eq!(res.duration_secs, Some(213));
    }

    #[test]
    fn search_dump_takes_first_entry() {
        let info = json!({
            "entries": [
                { "title": "First", "webpage_url": "https://example.com/1" },
                { "title": "Second", "webpage_url": "https://example.com/2" },
            ]
        });
        let res = parse_info(&info).unwrap();
        assert_eq!(res.title, "First");
    }

    #[test]
    fn empty_search_is_resolution_failure() {
        let info = json!({ "entries": [] });
        assert!(matches!(parse_info(&info), Err(Error::ResolutionFailed(_))));
    }

    #[test]
    fn audio_only_requested_format_preferred() {
        let entry = json!({
            "requested_formats": [
                { "url": "https://cdn.example.com/video", "vcodec": "h264", "acodec": "none" },
                { "url": "https://cdn.example.com/audio", "vcodec": "none", "acodec": "opus" },
            ]
        });
        assert_eq!(pick_audio_url(&entry).as_deref(), Some("https://cdn.example.com/audio"));
    }

    #[test]
    fn falls_back_to_last_video_free_format() {
        let entry = json!({
            "formats": [
                { "url": "https://cdn.example.com/low", "vcodec": "none" },
                { "url": "https://cdn.example.com/vid", "vcodec": "h264" },
                { "url": "https://cdn.example.com/high", "vcodec": "none" },
            ]
        });
        assert_eq!(pick_audio_url(&entry).as_deref(), Some("https://cdn.example.com/high"));
    }

    #[test]
    fn missing_title_uses_placeholder() {
        let info = json!({ "webpage_url": "https://example.com/watch?v=2" });
        let res = parse_info(&info).unwrap();
        assert_eq!(res.title, UNTITLED);
    }
}
