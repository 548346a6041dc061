//! In-memory cache of prepared slot images.
//!
//! Filtering and resampling a photo is the expensive part of a render, and
//! the edit loop re-renders the preview after every keystroke. Most of those
//! renders change only text or the frame, so the prepared slot images are
//! identical to the previous render's. This cache lets the compositor skip
//! that work.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, never by slot index. Reordering a final
//! selection or duplicating an image into two slots does not miss.
//!
//! - **`source_hash`**: SHA-256 of the image dimensions and raw pixels.
//! - **`params_hash`**: SHA-256 of the filter kind, intensity and the target
//!   pixel size of the slot.
//!
//! ## Bounds
//!
//! Entries are evicted oldest-first once the configured capacity is reached.
//! The cache lives only as long as the process; nothing is written to disk.

use crate::types::FilterSpec;
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of prepared images kept (two renders' worth of slots).
pub const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Entries {
    images: HashMap<String, Arc<RgbaImage>>,
    order: VecDeque<String>,
    stats: CacheStats,
}

/// Thread-safe content-addressed store of filtered, resampled images.
#[derive(Debug)]
pub struct FilterCache {
    capacity: usize,
    inner: Mutex<Entries>,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FilterCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock leaves only a stale map behind.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a prepared image, counting the hit or miss.
    pub fn get(&self, source_hash: &str, params_hash: &str) -> Option<Arc<RgbaImage>> {
        let key = content_key(source_hash, params_hash);
        let mut entries = self.lock();
        match entries.images.get(&key).cloned() {
            Some(image) => {
                entries.stats.hit();
                Some(image)
            }
            None => {
                entries.stats.miss();
                None
            }
        }
    }

    pub fn insert(&self, source_hash: &str, params_hash: &str, image: Arc<RgbaImage>) {
        let key = content_key(source_hash, params_hash);
        let mut entries = self.lock();
        if entries.images.insert(key.clone(), image).is_none() {
            entries.order.push_back(key);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.images.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.images.clear();
        entries.order.clear();
    }

    /// Snapshot of hit/miss counters since creation.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

/// SHA-256 of an image's dimensions and pixels, as a hex string.
pub fn hash_image(image: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of everything that shapes a prepared slot image.
pub fn hash_slot_params(spec: FilterSpec, width: u32, height: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"slot\0");
    hasher.update(spec.kind.id().as_bytes());
    hasher.update(b"\0");
    hasher.update([spec.intensity]);
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} filtered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} filtered", self.misses)
        }
    }
}
