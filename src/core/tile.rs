use crate::core::coord::RectBounds;
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a tile within a layer's pyramid and carries its geometry.
///
/// Identity (equality, ordering, hashing) is defined by
/// `(zoom_identifier, x, y, t)` alone; `bounds`, `zoom` and
/// `tessellation_factor` are derived payload and do not participate.
#[derive(Debug, Clone, Copy)]
pub struct TileInfo {
    pub bounds: RectBounds,
    pub x: i32,
    pub y: i32,
    /// Application-defined time/layer axis, usually 0
    pub t: i32,
    pub zoom_identifier: i32,
    /// Physical zoom of the tile's level
    pub zoom: f64,
    /// 3D rendering hint, 0-4; coarser tiles get subdivided more
    pub tessellation_factor: u8,
}

impl TileInfo {
    pub fn new(bounds: RectBounds, x: i32, y: i32, t: i32, zoom_identifier: i32, zoom: f64) -> Self {
        Self {
            bounds,
            x,
            y,
            t,
            zoom_identifier,
            zoom,
            tessellation_factor: 0,
        }
    }

    fn identity(&self) -> (i32, i32, i32, i32) {
        (self.zoom_identifier, self.x, self.y, self.t)
    }
}

impl PartialEq for TileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for TileInfo {}

impl Hash for TileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for TileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TileInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for TileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.zoom_identifier, self.x, self.y, self.t)
    }
}

/// A tile plus the version of its decoded content.
///
/// The version increments on every successful reload of the same tile, so
/// downstream GPU caches can invalidate derived objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedTileInfo {
    pub tile: TileInfo,
    pub version: u64,
}

impl VersionedTileInfo {
    pub fn new(tile: TileInfo, version: u64) -> Self {
        Self { tile, version }
    }
}

impl Hash for VersionedTileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for VersionedTileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionedTileInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tile.cmp(&other.tile)
    }
}

impl fmt::Display for VersionedTileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tile, self.version)
    }
}

/// A tile with its load priority; lower priority values load earlier.
///
/// Equality and hashing ignore the priority so a set of prioritized tiles
/// dedupes by tile identity.
#[derive(Debug, Clone, Copy)]
pub struct PrioritizedTileInfo {
    pub tile: TileInfo,
    pub priority: i32,
}

impl PrioritizedTileInfo {
    pub fn new(tile: TileInfo, priority: i32) -> Self {
        Self { tile, priority }
    }
}

impl PartialEq for PrioritizedTileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.tile == other.tile
    }
}

impl Eq for PrioritizedTileInfo {}

impl Hash for PrioritizedTileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile.hash(state);
    }
}

impl PartialOrd for PrioritizedTileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTileInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.tile.cmp(&other.tile))
    }
}

/// Render state of a tile held by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileState {
    /// Loaded but not yet uploaded to the GPU; not rendered
    InSetup,
    /// Drawn this frame
    Visible,
    /// Fully covered by finer visible tiles; retained for zoom-out
    Cached,
    /// Still drawn while a fresher version of the same tile loads
    OutdatedVisible,
}

/// One zoom level's worth of a visible-tile pyramid.
///
/// `target_zoom_level_offset` is 0 for the camera's target level, negative
/// for coarser levels and positive for finer ones.
#[derive(Debug, Clone)]
pub struct VisibleTilesLayer {
    pub tiles: FxHashSet<PrioritizedTileInfo>,
    pub target_zoom_level_offset: i32,
}

impl VisibleTilesLayer {
    pub fn new(target_zoom_level_offset: i32) -> Self {
        Self {
            tiles: FxHashSet::default(),
            target_zoom_level_offset,
        }
    }

    pub fn with_tiles(
        tiles: impl IntoIterator<Item = PrioritizedTileInfo>,
        target_zoom_level_offset: i32,
    ) -> Self {
        Self {
            tiles: tiles.into_iter().collect(),
            target_zoom_level_offset,
        }
    }
}
