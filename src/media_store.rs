//! In-memory media store.
//!
//! Holds raw bytes of captured media. Refs are content-addressed:
//! `media://{sha256-hex}`, so the same upload twice shares one entry.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const REF_PREFIX: &str = "media://";

#[derive(Debug, Clone, Default)]
pub struct MediaStore {
    inner: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes, returns the media ref.
    pub fn put(&self, data: Vec<u8>) -> String {
        let digest = format!("{:x}", Sha256::digest(&data));
        let size = data.len();
        self.inner
            .write()
            .unwrap()
            .entry(digest.clone())
            .or_insert_with(|| Arc::new(data));
        tracing::debug!("MediaStore: stored {} ({} bytes)", digest, size);
        format!("{}{}", REF_PREFIX, digest)
    }

    /// Resolve a ref to its bytes. Unknown or malformed refs resolve to `None`.
    pub fn get(&self, media_ref: &str) -> Option<Arc<Vec<u8>>> {
        let key = media_ref.strip_prefix(REF_PREFIX)?;
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Drop a medium, e.g. when its draft is discarded. Returns true if it existed.
    pub fn remove(&self, media_ref: &str) -> bool {
        match media_ref.strip_prefix(REF_PREFIX) {
            Some(key) => self.inner.write().unwrap().remove(key).is_some(),
            None => false,
        }
    }
}
