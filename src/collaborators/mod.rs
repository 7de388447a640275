//! External collaborators the analysis core consumes.
//!
//! Each trait is a single best-effort attempt. Implementations log their own
//! failures and hand the core `None` or an empty string, never an error.

pub mod frames;
pub mod link;
pub mod speech;

use crate::document::MediaRef;

pub use frames::ThumbnailFrames;
pub use link::HttpLinkFetcher;
pub use speech::{SidecarRecognizer, UnavailableRecognizer};

/// Local speech-to-text used when the remote transcript is unusable.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;
    /// Transcript text, or `None` when recognition is unavailable or produced nothing.
    async fn transcribe(&self, audio: &[u8]) -> Option<String>;
}

/// Produces one representative still image for a video medium.
#[async_trait::async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(&self, video: &MediaRef) -> Option<Vec<u8>>;
}

/// Fetches readable page text for a shared link.
#[async_trait::async_trait]
pub trait LinkFetcher: Send + Sync {
    /// Page text, empty on any failure.
    async fn fetch(&self, url: &str) -> String;
}
