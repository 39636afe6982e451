//! Layer error reporting.
//!
//! The source reports every permanent and transient load failure to an
//! injected [`ErrorManager`] so an application can surface "tile missing"
//! art or a retry indicator. The core itself never raises these as crate
//! errors; load failures drive the retry state machine instead.

use crate::core::coord::RectBounds;
use crate::loader::LoaderStatus;

/// A load failure attributed to a concrete tile of a concrete layer
#[derive(Debug, Clone, PartialEq)]
pub struct TiledLayerError {
    pub status: LoaderStatus,
    pub error_code: Option<String>,
    pub layer_name: String,
    pub url: String,
    /// Whether the source keeps retrying this tile on its own
    pub is_recoverable: bool,
    pub bounds: RectBounds,
}

/// Receiver for per-tile load failures.
///
/// Errors are keyed by tile URL: the source calls [`ErrorManager::remove_error`]
/// once a tile loads successfully or leaves visibility.
pub trait ErrorManager: Send + Sync {
    fn add_tiled_layer_error(&self, error: &TiledLayerError);

    fn remove_error(&self, url: &str);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records every reported error for assertions
    #[derive(Default)]
    pub struct RecordingErrorManager {
        pub added: Mutex<Vec<TiledLayerError>>,
        pub removed: Mutex<Vec<String>>,
    }

    impl ErrorManager for RecordingErrorManager {
        fn add_tiled_layer_error(&self, error: &TiledLayerError) {
            if let Ok(mut added) = self.added.lock() {
                added.push(error.clone());
            }
        }

        fn remove_error(&self, url: &str) {
            if let Ok(mut removed) = self.removed.lock() {
                removed.push(url.to_string());
            }
        }
    }
}
