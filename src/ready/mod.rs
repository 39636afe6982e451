//! Readiness aggregation across the managers sharing one tile source.
//!
//! A raster layer has a single consumer per tile; a vector layer fans each
//! tile out to several managers (fills, lines, symbols, ...). The aggregator
//! counts, per tile, how many managers have processed it and how many of
//! their sub-objects are still pending, and signals the source exactly once,
//! when every manager is done and nothing is outstanding.

use crate::core::tile::VersionedTileInfo;
use crate::runtime::mailbox::{Actor, WeakActor};
use crate::source::TileSource;
use fxhash::FxHashMap;

/// Receiver of the aggregated "tile is fully ready" signal.
///
/// Implemented for weak source actors so the aggregator posts through the
/// source's mailbox and never mutates it directly.
pub trait TileReadySink: Send + Sync {
    fn set_tile_ready(&self, tile: VersionedTileInfo);
}

impl<D, R> TileReadySink for WeakActor<TileSource<D, R>>
where
    D: Send + 'static,
    R: Clone + Send + 'static,
{
    fn set_tile_ready(&self, tile: VersionedTileInfo) {
        self.message("set_tile_ready", move |source| {
            source.set_tile_ready(&tile);
        });
    }
}

/// Per-source readiness bookkeeping; runs as its own actor
pub struct ReadyAggregator {
    sink: Box<dyn TileReadySink>,
    manager_count: usize,
    tile_data_process_count: FxHashMap<VersionedTileInfo, usize>,
    tile_not_ready_count: FxHashMap<VersionedTileInfo, usize>,
}

impl ReadyAggregator {
    pub fn new(sink: Box<dyn TileReadySink>) -> Self {
        Self {
            sink,
            manager_count: 0,
            tile_data_process_count: FxHashMap::default(),
            tile_not_ready_count: FxHashMap::default(),
        }
    }

    /// Registers one more manager and returns its index
    pub fn register_manager(&mut self) -> usize {
        self.manager_count += 1;
        self.manager_count - 1
    }

    pub fn manager_count(&self) -> usize {
        self.manager_count
    }

    /// A manager finished processing a tile's data; `not_ready_count` is the
    /// number of its sub-objects still awaiting GPU setup
    pub fn did_process_data(
        &mut self,
        _manager_index: usize,
        tile: VersionedTileInfo,
        not_ready_count: usize,
    ) {
        match self.tile_data_process_count.get_mut(&tile) {
            Some(processed) => {
                *processed += 1;
                if *processed == self.manager_count
                    && not_ready_count == 0
                    && !self.tile_not_ready_count.contains_key(&tile)
                {
                    self.tile_data_process_count.remove(&tile);
                    self.sink.set_tile_ready(tile);
                }
            }
            None if self.manager_count == 1 && not_ready_count == 0 => {
                self.sink.set_tile_ready(tile);
            }
            None => {
                self.tile_data_process_count.insert(tile, 1);
            }
        }

        if not_ready_count != 0 {
            *self.tile_not_ready_count.entry(tile).or_insert(0) += not_ready_count;
        }
    }

    /// A manager reports `ready_count` of its previously pending sub-objects
    /// as ready
    pub fn set_ready(
        &mut self,
        _manager_index: usize,
        tile: VersionedTileInfo,
        ready_count: usize,
    ) {
        let drained = match self.tile_not_ready_count.get_mut(&tile) {
            Some(pending) => {
                *pending = pending.saturating_sub(ready_count);
                *pending == 0
            }
            None => return,
        };
        if !drained {
            return;
        }
        self.tile_not_ready_count.remove(&tile);

        if self.tile_data_process_count.get(&tile) == Some(&self.manager_count) {
            self.tile_data_process_count.remove(&tile);
            self.sink.set_tile_ready(tile);
        }
    }

    /// Drops all tracking for retired tiles
    pub fn remove(&mut self, tiles: &[VersionedTileInfo]) {
        for tile in tiles {
            self.tile_data_process_count.remove(tile);
            self.tile_not_ready_count.remove(tile);
        }
    }
}

/// Message-based surface of a spawned aggregator
impl Actor<ReadyAggregator> {
    pub fn did_process_data(
        &self,
        manager_index: usize,
        tile: VersionedTileInfo,
        not_ready_count: usize,
    ) {
        self.message("did_process_data", move |aggregator| {
            aggregator.did_process_data(manager_index, tile, not_ready_count);
        });
    }

    pub fn set_ready(&self, manager_index: usize, tile: VersionedTileInfo, ready_count: usize) {
        self.message("set_ready", move |aggregator| {
            aggregator.set_ready(manager_index, tile, ready_count);
        });
    }

    pub fn remove(&self, tiles: Vec<VersionedTileInfo>) {
        self.message("remove", move |aggregator| {
            aggregator.remove(&tiles);
        });
    }
}
