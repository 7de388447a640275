//! Video frame extraction backed by poster frames captured at upload time.

use super::FrameExtractor;
use crate::document::{MediaKind, MediaRef};
use crate::media_store::MediaStore;
use tracing::debug;

pub struct ThumbnailFrames {
    store: MediaStore,
}

impl ThumbnailFrames {
    pub fn new(store: MediaStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl FrameExtractor for ThumbnailFrames {
    async fn extract_frame(&self, video: &MediaRef) -> Option<Vec<u8>> {
        if video.kind != MediaKind::Video {
            return None;
        }
        let Some(thumbnail_ref) = video.thumbnail_ref.as_deref() else {
            debug!("ThumbnailFrames: {} has no poster frame", video.content_ref);
            return None;
        };
        self.store.get(thumbnail_ref).map(|data| data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_comes_from_thumbnail() {
        let store = MediaStore::new();
        let video_ref = store.put(b"mp4".to_vec());
        let thumb_ref = store.put(b"jpeg frame".to_vec());
        let frames = ThumbnailFrames::new(store);

        let video = MediaRef::new(MediaKind::Video, &video_ref).with_thumbnail(&thumb_ref);
        assert_eq!(frames.extract_frame(&video).await, Some(b"jpeg frame".to_vec()));

        let bare = MediaRef::new(MediaKind::Video, &video_ref);
        assert_eq!(frames.extract_frame(&bare).await, None);
    }

    #[tokio::test]
    async fn test_missing_thumbnail_bytes() {
        let frames = ThumbnailFrames::new(MediaStore::new());
        let video = MediaRef::new(MediaKind::Video, "media://v").with_thumbnail("media://gone");
        assert_eq!(frames.extract_frame(&video).await, None);
    }
}
