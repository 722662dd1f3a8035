//! Event types for the voiceq session event system
//!
//! Each session carries a broadcast channel of `SessionEvent`. Subscribers
//! (diagnostics, front ends) observe playback progress without touching the
//! playback loop itself.

use crate::ids::{ChannelId, SessionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// An item transitioned from queued to actively streaming
    TrackStarted {
        session_id: SessionId,
        item_id: Uuid,
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current stream terminated (naturally or via stop/skip)
    TrackFinished {
        session_id: SessionId,
        item_id: Uuid,
        /// False when the stream was stopped or errored before its end
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item was dropped before streaming (dead link, broken file,
    /// missing connection)
    TrackAborted {
        session_id: SessionId,
        item_id: Uuid,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item was appended to the pending queue
    TrackEnqueued {
        session_id: SessionId,
        item_id: Uuid,
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pending queue was drained by a stop command
    QueueCleared {
        session_id: SessionId,
        dropped: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Voice connection established or moved
    Connected {
        session_id: SessionId,
        channel_id: ChannelId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Voice connection closed
    Disconnected {
        session_id: SessionId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session state removed by the idle sweep
    SessionEvicted {
        session_id: SessionId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::TrackStarted { session_id, .. }
            | SessionEvent::TrackFinished { session_id, .. }
            | SessionEvent::TrackAborted { session_id, .. }
            | SessionEvent::TrackEnqueued { session_id, .. }
            | SessionEvent::QueueCleared { session_id, .. }
            | SessionEvent::Connected { session_id, .. }
            | SessionEvent::Disconnected { session_id, .. }
            | SessionEvent::SessionEvicted { session_id, .. } => *session_id,
        }
    }
}
