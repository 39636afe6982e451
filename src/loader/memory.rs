//! In-memory cache backend for loader chains.

use super::{LoaderResult, TileLoader};
use crate::core::tile::TileInfo;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_CAPACITY: usize = 512;

/// LRU byte cache that answers `Ok` on a hit and `Noop` on a miss, so a
/// chain `[MemoryCacheLoader, HttpTileLoader]` falls through to the network
/// exactly for uncached tiles.
///
/// The cache is filled explicitly (prefill for offline regions, or by an
/// application observing successful loads); the source itself never writes
/// to it.
pub struct MemoryCacheLoader {
    cache: Mutex<LruCache<String, Arc<Vec<u8>>>>,
}

impl MemoryCacheLoader {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).expect("non-zero default"));
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    pub fn insert(&self, url: impl Into<String>, data: Vec<u8>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(url.into(), Arc::new(data));
    }

    pub fn contains(&self, url: &str) -> bool {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.contains(url)
    }

    pub fn len(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheLoader {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl TileLoader for MemoryCacheLoader {
    type Data = Vec<u8>;

    async fn load(&self, _tile: &TileInfo, url: &str) -> LoaderResult<Vec<u8>> {
        let hit = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.get(url).cloned()
        };
        match hit {
            Some(data) => LoaderResult::ok(data.as_ref().clone()),
            None => LoaderResult::noop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coord::RectBounds;
    use crate::loader::LoaderStatus;

    fn tile() -> TileInfo {
        TileInfo::new(RectBounds::from_coords(0.0, 0.0, 1.0, 1.0), 0, 0, 0, 0, 1.0)
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let loader = MemoryCacheLoader::new(4);
        loader.insert("a", vec![1, 2, 3]);

        let hit = loader.load(&tile(), "a").await;
        assert_eq!(hit.status, LoaderStatus::Ok);
        assert_eq!(hit.data, Some(vec![1, 2, 3]));

        let miss = loader.load(&tile(), "b").await;
        assert_eq!(miss.status, LoaderStatus::Noop);
    }

    #[tokio::test]
    async fn test_eviction() {
        let loader = MemoryCacheLoader::new(2);
        loader.insert("a", vec![1]);
        loader.insert("b", vec![2]);
        loader.insert("c", vec![3]);
        assert_eq!(loader.len(), 2);
        assert!(!loader.contains("a"));
        assert_eq!(loader.load(&tile(), "a").await.status, LoaderStatus::Noop);
    }
}
