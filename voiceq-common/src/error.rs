//! Common error types for voiceq

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for voiceq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the voiceq components
///
/// Connection and resolution errors surface synchronously to the caller of a
/// session operation. Fetch and stream errors are absorbed inside the
/// playback loop (logged, resources released, loop continues).
#[derive(Error, Debug)]
pub enum Error {
    /// Requester is not present in any reachable voice channel
    #[error("Requester is not in a voice channel")]
    NotInVoiceChannel,

    /// Voice connection attempt exceeded the configured timeout
    #[error("Voice connection timed out")]
    ConnectTimeout,

    /// Voice connection dropped during the post-connect settle check
    #[error("Voice connection did not stabilize")]
    ConnectUnstable,

    /// Any other transport-layer connection failure
    #[error("Voice connection failed: {0}")]
    ConnectFailed(String),

    /// Metadata lookup for a query or URL failed
    #[error("Could not resolve source: {0}")]
    ResolutionFailed(String),

    /// Download of a remote payload failed
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// The external decode process could not be started
    #[error("Could not construct audio stream: {0}")]
    StreamConstruction(String),

    /// The stream terminated with an error after starting
    #[error("Stream error: {0}")]
    StreamRuntime(String),

    /// File extension is not an accepted audio format
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Local file path does not reference an existing file
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}
