//! # voiceq Player Library
//!
//! Per-session queued voice playback: the queue data structure, the single
//! consumer loop that drains it, download-then-stream sequencing, voice
//! connection lifecycle, and temporary-resource cleanup.
//!
//! The chat front end, the metadata lookup service and the voice transport
//! are external collaborators, present here only as trait boundaries
//! ([`source::MetadataLookup`], [`transport::VoiceGateway`]).

pub mod playback;
pub mod session;
pub mod source;
pub mod temp;
pub mod transport;

pub use voiceq_common::{ChannelId, Error, PlayerConfig, Result, SessionId, UserId};
