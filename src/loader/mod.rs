//! The ranked loader chain.
//!
//! A source holds an ordered list of [`TileLoader`] backends. Each backend
//! answers with a [`LoaderStatus`]: `Ok` completes the load, `Noop` hands
//! the tile to the next backend in the chain, 400/404 fail it permanently,
//! and everything else is retried with exponential backoff.

pub mod http;
pub mod memory;

use crate::core::tile::TileInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome classification of a single load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoaderStatus {
    Ok,
    /// "I don't handle this tile" — the source tries the next loader
    Noop,
    Error400,
    Error404,
    ErrorTimeout,
    ErrorNetwork,
    ErrorOther,
}

impl LoaderStatus {
    /// Permanent failures are never retried until a forced reload
    pub fn is_permanent(&self) -> bool {
        matches!(self, LoaderStatus::Error400 | LoaderStatus::Error404)
    }
}

/// Result of one load attempt; `data` is present exactly when `status` is
/// [`LoaderStatus::Ok`]
#[derive(Debug, Clone)]
pub struct LoaderResult<D> {
    pub status: LoaderStatus,
    pub error_code: Option<String>,
    pub data: Option<D>,
}

impl<D> LoaderResult<D> {
    pub fn ok(data: D) -> Self {
        Self {
            status: LoaderStatus::Ok,
            error_code: None,
            data: Some(data),
        }
    }

    pub fn noop() -> Self {
        Self {
            status: LoaderStatus::Noop,
            error_code: None,
            data: None,
        }
    }

    pub fn error(status: LoaderStatus) -> Self {
        Self {
            status,
            error_code: None,
            data: None,
        }
    }

    pub fn error_with_code(status: LoaderStatus, code: impl Into<String>) -> Self {
        Self {
            status,
            error_code: Some(code.into()),
            data: None,
        }
    }
}

/// One backend of the loader chain.
///
/// Implementations must be cancellation-tolerant: after [`TileLoader::cancel`]
/// the pending `load` future may still resolve (typically with
/// [`LoaderStatus::ErrorOther`]); the source discards the late result.
#[async_trait]
pub trait TileLoader: Send + Sync {
    type Data: Send + 'static;

    async fn load(&self, tile: &TileInfo, url: &str) -> LoaderResult<Self::Data>;

    /// Aborts an in-flight load for `url`, if any. Callers never block on
    /// the cancelled future.
    fn cancel(&self, _url: &str) {}
}

/// Conversion from the loader's raw payload to the per-tile render payload
pub type PostProcessFn<D, R> = Arc<dyn Fn(D, &TileInfo) -> R + Send + Sync>;

/// Where the post-loading conversion runs.
///
/// `Inline` conversions are cheap and run on the loader's completion path;
/// `Compute` conversions (e.g. geometry tessellation) are staged on the
/// computation executor, and their result is discarded if the tile left
/// visibility in the meantime.
pub enum PostProcess<D, R> {
    Inline(PostProcessFn<D, R>),
    Compute(PostProcessFn<D, R>),
}

impl<D, R> Clone for PostProcess<D, R> {
    fn clone(&self) -> Self {
        match self {
            PostProcess::Inline(f) => PostProcess::Inline(Arc::clone(f)),
            PostProcess::Compute(f) => PostProcess::Compute(Arc::clone(f)),
        }
    }
}

impl<D, R> PostProcess<D, R> {
    pub fn convert(&self) -> &PostProcessFn<D, R> {
        match self {
            PostProcess::Inline(f) | PostProcess::Compute(f) => f,
        }
    }

    pub fn is_expensive(&self) -> bool {
        matches!(self, PostProcess::Compute(_))
    }
}

impl<D: Send + 'static> PostProcess<D, D> {
    /// Hands the raw payload through unchanged
    pub fn passthrough() -> Self {
        PostProcess::Inline(Arc::new(|data, _| data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let ok = LoaderResult::ok(vec![1u8, 2]);
        assert_eq!(ok.status, LoaderStatus::Ok);
        assert_eq!(ok.data, Some(vec![1, 2]));

        let noop = LoaderResult::<Vec<u8>>::noop();
        assert_eq!(noop.status, LoaderStatus::Noop);
        assert!(noop.data.is_none());

        let err = LoaderResult::<Vec<u8>>::error_with_code(LoaderStatus::ErrorTimeout, "t/30s");
        assert_eq!(err.error_code.as_deref(), Some("t/30s"));
    }

    #[test]
    fn test_permanence() {
        assert!(LoaderStatus::Error404.is_permanent());
        assert!(LoaderStatus::Error400.is_permanent());
        assert!(!LoaderStatus::ErrorNetwork.is_permanent());
        assert!(!LoaderStatus::Noop.is_permanent());
    }

    #[test]
    fn test_passthrough_post_process() {
        let post = PostProcess::<Vec<u8>, Vec<u8>>::passthrough();
        assert!(!post.is_expensive());
        let tile = crate::core::tile::TileInfo::new(
            crate::core::coord::RectBounds::from_coords(0.0, 0.0, 1.0, 1.0),
            0,
            0,
            0,
            0,
            1.0,
        );
        assert_eq!(post.convert()(vec![9], &tile), vec![9]);
    }
}
