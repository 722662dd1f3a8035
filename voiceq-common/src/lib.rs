//! # voiceq Common Library
//!
//! Shared code for the voiceq workspace:
//! - Error taxonomy (`Error` enum used across all components)
//! - Session/channel/user identifiers
//! - Event types (`SessionEvent` enum)
//! - Configuration loading and tool resolution

pub mod config;
pub mod error;
pub mod events;
pub mod ids;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use ids::{ChannelId, SessionId, UserId};
