//! Configuration loading and external tool resolution
//!
//! Values resolve in priority order: explicit value in the loaded file is
//! overridden by environment variables; compiled defaults fill the rest.
//! The config file is searched at `$VOICEQ_CONFIG`, then the platform config
//! directory (`voiceq/config.toml`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Runtime configuration for the playback service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Explicit path to the ffmpeg executable. When unset, ffmpeg is located
    /// via PATH search and known install locations.
    pub ffmpeg_path: Option<PathBuf>,

    /// Explicit path to the yt-dlp executable. Defaults to "yt-dlp" on PATH.
    pub ytdlp_path: Option<PathBuf>,

    /// Output gain applied to every stream (0.0-1.0)
    pub volume: f32,

    /// Upper bound for a voice connection attempt, in seconds
    pub connect_timeout_secs: u64,

    /// Settle delay after a successful connect before re-verification, in ms
    pub settle_delay_ms: u64,

    /// Directory for downloaded payloads and saved attachments.
    /// Defaults to the OS temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Idle window after which a session with no queue activity and no
    /// connection is evicted, in seconds
    pub idle_timeout_secs: u64,

    /// Interval between idle-eviction sweeps, in seconds
    pub sweep_interval_secs: u64,

    /// Re-insert an abandoned item at the queue head once instead of
    /// dropping it (covers transient connection gaps)
    pub requeue_once: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ytdlp_path: None,
            volume: 0.7,
            connect_timeout_secs: 60,
            settle_delay_ms: 750,
            temp_dir: None,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
            requeue_once: false,
        }
    }
}

impl PlayerConfig {
    /// Load configuration: config file (if present), then environment
    /// variable overrides, then defaults.
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                toml::from_str::<PlayerConfig>(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => PlayerConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("VOICEQ_FFMPEG") {
            if !path.trim().is_empty() {
                self.ffmpeg_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(path) = std::env::var("VOICEQ_YTDLP") {
            if !path.trim().is_empty() {
                self.ytdlp_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(dir) = std::env::var("VOICEQ_TEMP_DIR") {
            if !dir.trim().is_empty() {
                self.temp_dir = Some(PathBuf::from(dir.trim()));
            }
        }
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "volume must be within 0.0-1.0, got {}",
                self.volume
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config("connect_timeout_secs must be nonzero".to_string()));
        }
        Ok(())
    }

    /// Resolved path of the ffmpeg executable.
    ///
    /// An explicit override is used even if the file does not exist (the
    /// error then surfaces at stream construction, where it is visible to
    /// the operator). Otherwise PATH is searched, then known install
    /// locations, finally falling back to the bare command name.
    pub fn ffmpeg(&self) -> PathBuf {
        if let Some(ref path) = self.ffmpeg_path {
            return path.clone();
        }
        if let Some(found) = search_path("ffmpeg") {
            return found;
        }
        for candidate in known_ffmpeg_locations() {
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from("ffmpeg")
    }

    /// Resolved path of the yt-dlp executable
    pub fn ytdlp(&self) -> PathBuf {
        if let Some(ref path) = self.ytdlp_path {
            return path.clone();
        }
        search_path("yt-dlp").unwrap_or_else(|| PathBuf::from("yt-dlp"))
    }

    /// Directory for temporary payloads
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Connection attempt upper bound
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Post-connect settle delay
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Idle window before eviction
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Interval between eviction sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Locate the config file: $VOICEQ_CONFIG, then the platform config dir
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VOICEQ_CONFIG") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }
    let user_config = dirs::config_dir().map(|d| d.join("voiceq").join("config.toml"))?;
    if user_config.is_file() {
        return Some(user_config);
    }
    None
}

/// Search the PATH environment variable for an executable
fn search_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let exe = if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(&exe);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Known ffmpeg install locations per platform, checked after PATH
fn known_ffmpeg_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        let mut candidates = Vec::new();
        if let Ok(programs) = std::env::var("ProgramFiles") {
            candidates.push(Path::new(&programs).join("ffmpeg").join("bin").join("ffmpeg.exe"));
        }
        if let Ok(programs) = std::env::var("ProgramFiles(x86)") {
            candidates.push(Path::new(&programs).join("ffmpeg").join("bin").join("ffmpeg.exe"));
        }
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            let local = Path::new(&local);
            candidates.push(local.join("Microsoft").join("WinGet").join("Links").join("ffmpeg.exe"));
            candidates.push(local.join("Programs").join("ffmpeg").join("bin").join("ffmpeg.exe"));
        }
        candidates
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.volume, 0.7);
        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = PlayerConfig {
            volume: 1.5,
            ..PlayerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_ffmpeg_override_wins_even_when_missing() {
        let config = PlayerConfig {
            ffmpeg_path: Some(PathBuf::from("/no/such/ffmpeg")),
            ..PlayerConfig::default()
        };
        assert_eq!(config.ffmpeg(), PathBuf::from("/no/such/ffmpeg"));
    }

    #[test]
    fn temp_dir_falls_back_to_os_default() {
        let config = PlayerConfig::default();
        assert_eq!(config.temp_dir(), std::env::temp_dir());

        let explicit = PlayerConfig {
            temp_dir: Some(PathBuf::from("/tmp/voiceq-test")),
            ..PlayerConfig::default()
        };
        assert_eq!(explicit.temp_dir(), PathBuf::from("/tmp/voiceq-test"));
    }

    #[test]
    fn parses_partial_toml() {
        let config: PlayerConfig =
            toml::from_str("volume = 0.5\nrequeue_once = true").unwrap();
        assert_eq!(config.volume, 0.5);
        assert!(config.requeue_once);
        assert_eq!(config.connect_timeout_secs, 60);
    }
}
