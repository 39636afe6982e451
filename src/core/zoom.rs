use crate::core::coord::RectBounds;
use serde::{Deserialize, Serialize};

/// Web Mercator (EPSG:3857) world extent in meters
const WEB_MERCATOR_HALF_WORLD: f64 = 20_037_508.342_789_244;

/// Scale denominator of Web Mercator zoom 0 at 0.28mm/pixel
const WEB_MERCATOR_BASE_ZOOM: f64 = 559_082_264.028_717;

/// Describes one zoom level of a layer's tile pyramid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLevel {
    pub zoom_identifier: i32,
    /// Physical zoom (scale denominator); larger means coarser
    pub zoom: f64,
    /// Width of one tile in layer units
    pub tile_width_layer_units: f64,
    pub num_tiles_x: i32,
    pub num_tiles_y: i32,
    pub num_tiles_t: i32,
    /// Extent covered by the level's tile grid
    pub bounds: RectBounds,
}

impl ZoomLevel {
    /// Builds the standard Web Mercator level for a zoom identifier
    pub fn web_mercator(zoom_identifier: i32) -> Self {
        let num_tiles = 1i32 << zoom_identifier.clamp(0, 30);
        let world = 2.0 * WEB_MERCATOR_HALF_WORLD;
        Self {
            zoom_identifier,
            zoom: WEB_MERCATOR_BASE_ZOOM / f64::from(num_tiles),
            tile_width_layer_units: world / f64::from(num_tiles),
            num_tiles_x: num_tiles,
            num_tiles_y: num_tiles,
            num_tiles_t: 1,
            bounds: RectBounds::from_coords(
                -WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
                WEB_MERCATOR_HALF_WORLD,
                -WEB_MERCATOR_HALF_WORLD,
            ),
        }
    }
}

/// Immutable per-layer table of zoom levels, sorted by decreasing physical
/// zoom (coarsest first). Constructed once from the layer config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoomLevelTable {
    levels: Vec<ZoomLevel>,
}

impl ZoomLevelTable {
    pub fn new(mut levels: Vec<ZoomLevel>) -> Self {
        levels.sort_by(|a, b| b.zoom.total_cmp(&a.zoom));
        Self { levels }
    }

    pub fn empty() -> Self {
        Self { levels: Vec::new() }
    }

    /// Builds a Web Mercator table covering `min_ident..=max_ident`
    pub fn web_mercator(min_ident: i32, max_ident: i32) -> Self {
        Self::new(
            (min_ident..=max_ident)
                .map(ZoomLevel::web_mercator)
                .collect(),
        )
    }

    /// Levels sorted coarsest first
    pub fn levels(&self) -> &[ZoomLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ZoomLevel> {
        self.levels.get(index)
    }

    /// Looks a level up by its zoom identifier
    pub fn by_identifier(&self, zoom_identifier: i32) -> Option<&ZoomLevel> {
        self.levels
            .iter()
            .find(|l| l.zoom_identifier == zoom_identifier)
    }

    /// Converts camera-supplied bounds into the layer's coordinate system.
    ///
    /// The engine operates on one coordinate system per layer; cameras are
    /// expected to deliver rectangles in layer units already, so this is the
    /// identity. Configs bridging differing systems override the conversion
    /// at the camera boundary instead.
    pub fn convert_bounds_to_layer_system(&self, bounds: RectBounds) -> RectBounds {
        bounds
    }
}

/// Per-layer zoom behavior options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomInfo {
    /// Screen-unit scaling applied to the level choice, typically 0.5-2.0
    pub zoom_level_scale_factor: f64,
    /// How many coarser layers are kept alongside the target level, 0-3
    pub num_draw_previous_layers: i32,
    /// Multiply the scale by ppi / 90 so physical tile size stays constant
    pub adapt_scale_to_screen: bool,
    /// Render the coarsest level even when zoomed out past it
    pub underzoom: bool,
    /// Render the finest level even when zoomed in past it
    pub overzoom: bool,
    /// Clip each tile's mask against finer visible tiles and the viewport
    pub mask_tile: bool,
}

impl Default for ZoomInfo {
    fn default() -> Self {
        Self {
            zoom_level_scale_factor: 1.0,
            num_draw_previous_layers: 1,
            adapt_scale_to_screen: false,
            underzoom: true,
            overzoom: true,
            mask_tile: false,
        }
    }
}
