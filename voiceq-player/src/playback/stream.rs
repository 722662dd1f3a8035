//! Audio stream construction via the external decode process
//!
//! ffmpeg decodes the resolved file and writes interleaved 16-bit PCM to a
//! pipe; the transport sink consumes the pipe as an opaque byte stream. Its
//! stderr is drained into the operator log so decode failures are visible.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use voiceq_common::{Error, Result};

/// Sample rate expected by the voice transport
const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// Stereo output
const OUTPUT_CHANNELS: u32 = 2;

/// An open audio byte stream with a fixed output gain.
///
/// When backed by a decode process, the child handle is kept so the process
/// is reaped (and killed on drop) together with the stream.
pub struct AudioStream {
    /// Raw PCM byte stream
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Output gain (0.0-1.0) the sink applies while streaming
    pub volume: f32,
    _child: Option<Child>,
}

impl AudioStream {
    /// Stream over an arbitrary reader (used by transport implementations
    /// and tests; no child process attached)
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, volume: f32) -> Self {
        Self {
            reader: Box::new(reader),
            volume,
            _child: None,
        }
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("volume", &self.volume)
            .field("child", &self._child.is_some())
            .finish()
    }
}

/// Constructs a stream for a resolved local file.
///
/// A trait so the playback loop can be exercised without ffmpeg installed.
pub trait StreamFactory: Send + Sync {
    fn open(&self, input: &Path) -> Result<AudioStream>;
}

/// ffmpeg-backed stream factory
pub struct FfmpegStream {
    executable: PathBuf,
    volume: f32,
}

impl FfmpegStream {
    pub fn new(executable: PathBuf, volume: f32) -> Self {
        Self { executable, volume }
    }
}

impl StreamFactory for FfmpegStream {
    fn open(&self, input: &Path) -> Result<AudioStream> {
        debug!("Starting decode: {} -> pcm", input.display());

        let mut child = Command::new(&self.executable)
            .arg("-nostdin")
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .arg("-f")
            .arg("s16le")
            .arg("-ar")
            .arg(OUTPUT_SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(OUTPUT_CHANNELS.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::StreamConstruction(format!("{}: {}", self.executable.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::StreamConstruction("decode process has no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Ok(AudioStream {
            reader: Box::new(stdout),
            volume: self.volume,
            _child: Some(child),
        })
    }
}

/// Drain decode-process stderr into the operator log
async fn forward_stderr(stderr: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "voiceq::ffmpeg", "{}", line),
            Ok(None) => break,
            Err(e) => {
                warn!(target: "voiceq::ffmpeg", "stderr read failed: {}", e);
                break;
            }
        }
    }
}
