//! Raster tile source: the byte-payload specialization of the generic
//! source, as used for image tile layers.

use super::{RenderTile, TileSource, TileSourceListener};
use crate::config::LayerConfig;
use crate::loader::{PostProcess, TileLoader};
use crate::runtime::mailbox::Actor;
use crate::runtime::Scheduler;
use std::sync::Arc;

/// Decoded raster payload shared across snapshots without copying
pub type RasterData = Arc<Vec<u8>>;

/// A source whose loader chain yields raw image bytes
pub type RasterTileSource = TileSource<Vec<u8>, RasterData>;

/// Snapshot entry carried by raster update notifications
pub type RasterRenderTile = RenderTile<RasterData>;

impl TileSource<Vec<u8>, RasterData> {
    /// Spawns a raster source; the raw bytes are wrapped cheaply on the
    /// loader's completion path, no compute staging needed
    pub fn spawn_raster(
        scheduler: Scheduler,
        layer_config: Arc<dyn LayerConfig>,
        loaders: Vec<Arc<dyn TileLoader<Data = Vec<u8>>>>,
        listener: Arc<dyn TileSourceListener<RasterData>>,
        screen_density_ppi: f32,
    ) -> Actor<Self> {
        TileSource::spawn(
            scheduler,
            layer_config,
            loaders,
            PostProcess::Inline(Arc::new(|data, _| Arc::new(data))),
            listener,
            screen_density_ppi,
        )
    }
}
