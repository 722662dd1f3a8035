//! Source resolution and remote payload fetching

pub mod fetcher;
pub mod resolver;
pub mod ytdlp;

pub use fetcher::{MediaFetcher, YtDlpFetcher};
pub use resolver::{MetadataLookup, PlayRequest, Resolution, SourceResolver};
pub use ytdlp::YtDlpLookup;
