//! Prelude module for common tileflow types and traits
//!
//! Re-exports the most commonly used types, traits, and functions for easy
//! importing with `use tileflow::prelude::*;`

// Core types
pub use crate::core::{
    coord::{Point, QuadBounds, RectBounds},
    tile::{PrioritizedTileInfo, TileInfo, TileState, VersionedTileInfo, VisibleTilesLayer},
    zoom::{ZoomInfo, ZoomLevel, ZoomLevelTable},
};

// Layer configuration
pub use crate::config::{LayerConfig, LayerDescriptor, TemplateLayerConfig};

// Loader chain
pub use crate::loader::{
    http::HttpTileLoader, memory::MemoryCacheLoader, LoaderResult, LoaderStatus, PostProcess,
    TileLoader,
};

// Visibility selection
pub use crate::select::{
    planar::{select_visible_tiles, PlanarOutcome, PlanarSelectorParams, TilePyramid},
    spherical::{CameraPose, SphericalSelection},
};

// The source and its collaborators
pub use crate::source::{
    raster::{RasterData, RasterRenderTile, RasterTileSource},
    LayerReadyState, RenderTile, TileSource, TileSourceListener, TileWrapper,
};

// Readiness aggregation
pub use crate::ready::{ReadyAggregator, TileReadySink};

// Error reporting
pub use crate::error::{ErrorManager, TiledLayerError};

// Runtime abstraction
pub use crate::runtime::{
    mailbox::{Actor, Duplication, WeakActor},
    ExecutionEnvironment, Scheduler,
};

// Result and Error types
pub use crate::{Error as TileFlowError, Result};

// Common standard library re-exports
pub use std::{sync::Arc, time::Duration};

// Use FxHashMap and FxHashSet for better performance
pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
