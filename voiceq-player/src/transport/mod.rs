//! Voice transport boundary
//!
//! The remote voice system is an external collaborator; the playback core
//! only sees the [`VoiceGateway`] trait. One gateway exists per session and
//! is owned exclusively by that session's playback loop while streaming.

pub mod connection;

pub use connection::{ConnectionManager, ConnectionState};

use crate::playback::{AudioStream, StreamDone};
use async_trait::async_trait;
use thiserror::Error;
use voiceq_common::{ChannelId, UserId};

/// Transport-layer failures, wrapped into the common taxonomy by callers
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport already holds a connection for this session. Races
    /// between concurrent ensure calls surface this; it is not a failure.
    #[error("already connected")]
    AlreadyConnected,

    /// Not connected, so the operation has no target
    #[error("not connected")]
    NotConnected,

    /// The named channel cannot be joined (gone, full, no permission)
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Any other gateway failure
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Open real-time audio channel into the remote voice system.
///
/// Contract for implementations:
/// - `play` takes ownership of the stream and MUST fire `done` exactly once
///   when the stream terminates, whatever the cause.
/// - `stop` MUST terminate any active stream and fire its `done` with
///   [`crate::playback::StreamOutcome::Stopped`]; it is a no-op when idle.
/// - `disconnect(force)` must succeed even when only a partial connection
///   exists.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Channel the given user is currently present in, if reachable
    async fn user_channel(&self, user: UserId) -> Option<ChannelId>;

    /// Channel this gateway is connected to
    async fn current_channel(&self) -> Option<ChannelId>;

    async fn connect(&self, channel: ChannelId) -> Result<(), TransportError>;

    async fn move_to(&self, channel: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&self, force: bool) -> Result<(), TransportError>;

    async fn is_connected(&self) -> bool;

    /// Start streaming. `done` is the stream's terminal signal.
    async fn play(&self, stream: AudioStream, done: StreamDone) -> Result<(), TransportError>;

    /// Stop the current stream, triggering its terminal signal
    async fn stop(&self);

    async fn pause(&self);

    async fn resume(&self);

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;
}
