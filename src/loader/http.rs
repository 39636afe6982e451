//! HTTP loader backend on a shared reqwest client.

use super::{LoaderResult, LoaderStatus, TileLoader};
use crate::core::tile::TileInfo;
use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use std::sync::{Mutex, PoisonError};

/// Shared async HTTP client optimized for tile fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("tileflow/0.1 (+https://github.com/tileflow/tileflow)")
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build reqwest async client")
});

/// Maps a transport outcome onto the loader status taxonomy
fn status_for_http(status: reqwest::StatusCode) -> LoaderStatus {
    match status.as_u16() {
        200..=299 => LoaderStatus::Ok,
        400 => LoaderStatus::Error400,
        404 => LoaderStatus::Error404,
        408 | 504 => LoaderStatus::ErrorTimeout,
        _ => LoaderStatus::ErrorOther,
    }
}

fn status_for_transport(error: &reqwest::Error) -> LoaderStatus {
    if error.is_timeout() {
        LoaderStatus::ErrorTimeout
    } else if error.is_connect() || error.is_request() {
        LoaderStatus::ErrorNetwork
    } else {
        LoaderStatus::ErrorOther
    }
}

/// Fetches tiles over HTTP; the last link of most loader chains.
///
/// In-flight requests are tracked per URL so a pan can abort loads for tiles
/// that left the viewport. An aborted load resolves with
/// [`LoaderStatus::ErrorOther`] and is discarded by the source.
pub struct HttpTileLoader {
    in_flight: Mutex<FxHashMap<String, AbortHandle>>,
}

impl HttpTileLoader {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(FxHashMap::default()),
        }
    }

    fn track(&self, url: &str, handle: AbortHandle) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(url.to_string(), handle);
    }

    fn untrack(&self, url: &str) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(url);
    }

    async fn fetch(url: &str) -> LoaderResult<Vec<u8>> {
        let started = instant::Instant::now();
        let response = match HTTP_CLIENT.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                log::debug!("request for {} failed: {}", url, error);
                return LoaderResult::error_with_code(
                    status_for_transport(&error),
                    error.to_string(),
                );
            }
        };

        let status = status_for_http(response.status());
        if status != LoaderStatus::Ok {
            log::debug!("load of {} answered HTTP {}", url, response.status());
            return LoaderResult::error_with_code(status, response.status().to_string());
        }

        match response.bytes().await {
            Ok(bytes) => {
                log::debug!(
                    "loaded {} ({} bytes in {:?})",
                    url,
                    bytes.len(),
                    started.elapsed()
                );
                LoaderResult::ok(bytes.to_vec())
            }
            Err(error) => LoaderResult::error_with_code(
                status_for_transport(&error),
                format!("failed to read body: {}", error),
            ),
        }
    }
}

impl Default for HttpTileLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileLoader for HttpTileLoader {
    type Data = Vec<u8>;

    async fn load(&self, _tile: &TileInfo, url: &str) -> LoaderResult<Vec<u8>> {
        let (handle, registration) = AbortHandle::new_pair();
        self.track(url, handle);
        let result = Abortable::new(Self::fetch(url), registration).await;
        self.untrack(url);
        match result {
            Ok(result) => result,
            Err(_aborted) => {
                LoaderResult::error_with_code(LoaderStatus::ErrorOther, "cancelled")
            }
        }
    }

    fn cancel(&self, url: &str) {
        let handle = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            in_flight.remove(url)
        };
        if let Some(handle) = handle {
            log::debug!("cancelling load of {}", url);
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            status_for_http(reqwest::StatusCode::OK),
            LoaderStatus::Ok
        );
        assert_eq!(
            status_for_http(reqwest::StatusCode::BAD_REQUEST),
            LoaderStatus::Error400
        );
        assert_eq!(
            status_for_http(reqwest::StatusCode::NOT_FOUND),
            LoaderStatus::Error404
        );
        assert_eq!(
            status_for_http(reqwest::StatusCode::GATEWAY_TIMEOUT),
            LoaderStatus::ErrorTimeout
        );
        assert_eq!(
            status_for_http(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            LoaderStatus::ErrorOther
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_load() {
        let loader = std::sync::Arc::new(HttpTileLoader::new());
        let tile = TileInfo::new(
            crate::core::coord::RectBounds::from_coords(0.0, 0.0, 1.0, 1.0),
            0,
            0,
            0,
            0,
            1.0,
        );
        // unroutable address, the request would hang until the transport
        // timeout without the abort
        let url = "http://192.0.2.1:81/0/0/0.png";
        let task = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(&tile, url).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        loader.cancel(url);
        let result = task.await.unwrap();
        assert_ne!(result.status, LoaderStatus::Ok);
    }
}
