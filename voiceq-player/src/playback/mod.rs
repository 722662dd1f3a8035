//! Per-session playback pipeline: queue, consumer loop, stream construction

pub mod engine;
pub mod item;
pub mod queue;
pub mod signal;
pub mod stream;

pub use engine::PlaybackEngine;
pub use item::{PlayableItem, SourceKind, ACCEPTED_EXTENSIONS};
pub use queue::SessionQueue;
pub use signal::{StreamDone, StreamOutcome};
pub use stream::{AudioStream, FfmpegStream, StreamFactory};
