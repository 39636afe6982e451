//! # Tileflow
//!
//! The tiled source engine of a map renderer: decides which tiles are
//! visible for a given camera, loads them concurrently through a ranked
//! loader chain with exponential backoff, computes tile-mask geometry so
//! finer tiles cover coarser ones exactly, and drives per-tile readiness.
//!
//! The heart of the crate is [`source::TileSource`], a logically
//! single-threaded actor: all mutation flows through its mailbox
//! ([`runtime::mailbox`]), loads run on a partitioned scheduler
//! ([`runtime::Scheduler`]), and consumers observe immutable snapshots.
//!
//! Shader programs, camera math, vector-feature decoding and platform
//! windowing live above or beside this crate and communicate through the
//! interfaces in [`config`], [`loader`] and [`source`].

pub mod config;
pub mod core;
pub mod error;
pub mod loader;
pub mod mask;
pub mod prelude;
pub mod ready;
pub mod runtime;
pub mod select;
pub mod source;

// Re-export public API
pub use crate::core::{
    coord::{Point, QuadBounds, RectBounds},
    tile::{TileInfo, TileState, VersionedTileInfo},
    zoom::{ZoomInfo, ZoomLevel, ZoomLevelTable},
};

pub use crate::config::{LayerConfig, TemplateLayerConfig};

pub use crate::loader::{LoaderResult, LoaderStatus, TileLoader};

pub use crate::source::{LayerReadyState, RenderTile, TileSource, TileSourceListener};

pub use crate::ready::ReadyAggregator;

pub use crate::runtime::{ExecutionEnvironment, Scheduler};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileFlowError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TileFlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid layer config: {0}")]
    Config(String),

    #[error("Loader error: {0}")]
    Loader(String),
}

/// Error type alias for convenience
pub type Error = TileFlowError;
