//! The tiled map source: the actor that owns all per-layer tile state.
//!
//! Camera updates arrive through the source's mailbox, get turned into a
//! visible-tile pyramid by the selectors, and are diffed against the current
//! tile set: new tiles start loading through the ranked loader chain, stale
//! ones are cancelled and retired, masks are recomputed and listeners are
//! notified with an immutable snapshot. Load failures feed an exponential
//! backoff ledger; permanent failures are parked until a forced reload.
//!
//! All state below is owned exclusively by the actor. External readers get
//! copies through `converse`; nothing here is shared mutable.

pub mod raster;

use crate::config::LayerConfig;
use crate::core::coord::{QuadBounds, RectBounds};
use crate::core::tile::{
    PrioritizedTileInfo, TileInfo, TileState, VersionedTileInfo, VisibleTilesLayer,
};
use crate::core::zoom::{ZoomInfo, ZoomLevel};
use crate::error::{ErrorManager, TiledLayerError};
use crate::loader::{LoaderStatus, PostProcess, TileLoader};
use crate::mask;
use crate::runtime::mailbox::{Actor, Duplication, WeakActor};
use crate::runtime::{self, ExecutionEnvironment, Scheduler};
use crate::select::planar::{self, PlanarOutcome, PlanarSelectorParams};
use crate::select::spherical::{self, CameraPose};
use fxhash::{FxHashMap, FxHashSet};
use geo_types::{MultiPolygon, Polygon};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Initial retry delay after a transient load failure
pub const MIN_WAIT_MILLIS: i64 = 1000;

/// Retry delays double per failure up to this cap
pub const MAX_WAIT_MILLIS: i64 = 32000;

const INVALID_HASH: u64 = u64::MAX;

/// Aggregated readiness summary for offscreen rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerReadyState {
    Ready,
    NotReady,
    Error,
}

/// Backoff ledger entry for one (loader, tile) pair
#[derive(Debug, Clone, Copy)]
pub struct ErrorInfo {
    /// Wall-clock millis of the last attempt
    pub last_load_millis: i64,
    /// Current retry delay in millis
    pub delay_millis: i64,
}

/// Per-tile runtime state owned by the source
pub struct TileWrapper<R> {
    pub payload: R,
    /// The part of the tile actually drawn; empty until the first mask pass
    pub masks: MultiPolygon<f64>,
    /// Untouched bounds polygon, cached for clipping
    pub tile_bounds: Polygon<f64>,
    pub state: TileState,
    pub tessellation_factor: u8,
    pub version: u64,
}

impl<R> TileWrapper<R> {
    pub fn new(payload: R, bounds: &RectBounds, tessellation_factor: u8, version: u64) -> Self {
        Self {
            payload,
            masks: MultiPolygon::new(vec![]),
            tile_bounds: mask::polygon_from_rect(bounds),
            state: TileState::InSetup,
            tessellation_factor,
            version,
        }
    }
}

/// Immutable per-tile snapshot handed to listeners
#[derive(Clone)]
pub struct RenderTile<R> {
    pub tile: VersionedTileInfo,
    pub payload: R,
    pub masks: MultiPolygon<f64>,
    pub state: TileState,
    pub tessellation_factor: u8,
}

/// Consumer of tile-set updates, called after every mask recomputation
pub trait TileSourceListener<R>: Send + Sync {
    fn on_tiles_updated(&self, layer_name: &str, tiles: Vec<RenderTile<R>>);
}

/// The tile source actor state.
///
/// `D` is the loader chain's raw payload, `R` the post-processed per-tile
/// payload handed to listeners.
pub struct TileSource<D, R>
where
    D: Send + 'static,
    R: Clone + Send + 'static,
{
    layer_config: Arc<dyn LayerConfig>,
    layer_name: String,
    zoom_levels: Vec<ZoomLevel>,
    zoom_info: ZoomInfo,
    loaders: Vec<Arc<dyn TileLoader<Data = D>>>,
    post_process: PostProcess<D, R>,
    listener: Arc<dyn TileSourceListener<R>>,
    scheduler: Scheduler,
    error_manager: Option<Arc<dyn ErrorManager>>,
    self_actor: WeakActor<Self>,
    screen_density_ppi: f32,
    paused: bool,

    min_zoom_level_identifier: Option<i32>,
    max_zoom_level_identifier: Option<i32>,

    current_tiles: BTreeMap<TileInfo, TileWrapper<R>>,
    outdated_tiles: BTreeMap<TileInfo, TileWrapper<R>>,
    current_visible_tiles: FxHashSet<TileInfo>,
    current_pyramid: Vec<VisibleTilesLayer>,
    current_keep_zoom_level_offset: i32,
    current_zoom_level_identifier: i32,
    current_view_bounds: QuadBounds,

    currently_loading: FxHashMap<TileInfo, usize>,
    ready_tiles: FxHashSet<TileInfo>,
    error_tiles: FxHashMap<usize, BTreeMap<TileInfo, ErrorInfo>>,
    not_found_tiles: FxHashSet<TileInfo>,
    next_delay_task_execution: Option<i64>,
    last_visible_tiles_hash: u64,
}

impl<D, R> TileSource<D, R>
where
    D: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Creates the source and wraps it into its mailbox actor
    pub fn spawn(
        scheduler: Scheduler,
        layer_config: Arc<dyn LayerConfig>,
        loaders: Vec<Arc<dyn TileLoader<Data = D>>>,
        post_process: PostProcess<D, R>,
        listener: Arc<dyn TileSourceListener<R>>,
        screen_density_ppi: f32,
    ) -> Actor<Self> {
        let layer_name = layer_config.layer_name();
        let zoom_levels = layer_config.zoom_levels().levels().to_vec();
        let zoom_info = layer_config.zoom_info();
        let source = Self {
            layer_config,
            layer_name,
            zoom_levels,
            zoom_info,
            loaders,
            post_process,
            listener,
            scheduler: scheduler.clone(),
            error_manager: None,
            self_actor: WeakActor::empty(),
            screen_density_ppi,
            paused: false,
            min_zoom_level_identifier: None,
            max_zoom_level_identifier: None,
            current_tiles: BTreeMap::new(),
            outdated_tiles: BTreeMap::new(),
            current_visible_tiles: FxHashSet::default(),
            current_pyramid: Vec::new(),
            current_keep_zoom_level_offset: 0,
            current_zoom_level_identifier: 0,
            current_view_bounds: QuadBounds::default(),
            currently_loading: FxHashMap::default(),
            ready_tiles: FxHashSet::default(),
            error_tiles: FxHashMap::default(),
            not_found_tiles: FxHashSet::default(),
            next_delay_task_execution: None,
            last_visible_tiles_hash: INVALID_HASH,
        };
        let actor = Actor::new(scheduler, source);
        let weak = actor.downgrade();
        actor.sync_access(move |source| source.self_actor = weak);
        actor
    }

    fn tile_url(&self, tile: &TileInfo) -> String {
        self.layer_config
            .tile_url(tile.x, tile.y, tile.t, tile.zoom_identifier)
    }

    pub fn is_tile_visible(&self, tile: &TileInfo) -> bool {
        self.current_visible_tiles.contains(tile)
    }

    pub fn current_view_bounds(&self) -> QuadBounds {
        self.current_view_bounds
    }

    pub fn set_min_zoom_level_identifier(&mut self, value: Option<i32>) {
        self.min_zoom_level_identifier = value;
    }

    pub fn set_max_zoom_level_identifier(&mut self, value: Option<i32>) {
        self.max_zoom_level_identifier = value;
    }

    pub fn min_zoom_level_identifier(&self) -> Option<i32> {
        self.min_zoom_level_identifier
    }

    pub fn max_zoom_level_identifier(&self) -> Option<i32> {
        self.max_zoom_level_identifier
    }

    pub fn set_error_manager(&mut self, error_manager: Arc<dyn ErrorManager>) {
        self.error_manager = Some(error_manager);
    }

    /// Planar camera entry: recompute the pyramid for a new visible
    /// rectangle and diff it against the current tile set
    pub fn on_visible_bounds_changed(&mut self, visible_bounds: &RectBounds, cur_t: i32, zoom: f64) {
        if self.paused {
            return;
        }

        let params = PlanarSelectorParams {
            levels: &self.zoom_levels,
            zoom_info: &self.zoom_info,
            screen_density_ppi: self.screen_density_ppi,
            min_zoom_level_identifier: self.min_zoom_level_identifier,
            max_zoom_level_identifier: self.max_zoom_level_identifier,
            layer_bounds: self.layer_config.bounds(),
        };

        match planar::select_visible_tiles(&params, visible_bounds, cur_t, zoom) {
            PlanarOutcome::RejectUnderzoom => {
                if self.last_visible_tiles_hash != 0 {
                    self.last_visible_tiles_hash = 0;
                    self.on_visible_tiles_changed(Vec::new(), false, 0);
                }
            }
            PlanarOutcome::RejectOverzoom => {
                self.on_visible_tiles_changed(Vec::new(), false, 0);
            }
            PlanarOutcome::Pyramid(pyramid) => {
                self.current_zoom_level_identifier = pyramid.target_zoom_identifier;
                // masks are clipped against the rectangle that produced the
                // pyramid, so the bounds update must come first
                self.current_view_bounds = QuadBounds::from_rect(visible_bounds);
                if self.last_visible_tiles_hash != pyramid.hash {
                    self.last_visible_tiles_hash = pyramid.hash;
                    self.on_visible_tiles_changed(
                        pyramid.layers,
                        false,
                        pyramid.keep_zoom_level_offset,
                    );
                }
            }
        }
    }

    /// Spherical camera entry: refine the globe BFS and diff the result
    pub fn on_camera_change(&mut self, pose: &CameraPose) {
        if self.paused {
            return;
        }
        if pose.width <= 0.0 || pose.height <= 0.0 {
            return;
        }

        let selection =
            match spherical::select_visible_tiles(&self.zoom_levels, &self.zoom_info, pose) {
                Some(selection) => selection,
                None => return,
            };

        self.current_zoom_level_identifier = selection.target_zoom_identifier;
        // the globe view clips against the whole layer extent
        if let Some(coarsest) = self.zoom_levels.first() {
            self.current_view_bounds = QuadBounds::from_rect(&coarsest.bounds);
        }
        self.on_visible_tiles_changed(selection.layers, true, 0);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Applies a new pyramid: updates the visible set, starts and cancels
    /// loads, retires stale tiles, purges error entries, recomputes masks
    /// and notifies listeners.
    fn on_visible_tiles_changed(
        &mut self,
        pyramid: Vec<VisibleTilesLayer>,
        enforce_multiple_levels: bool,
        keep_zoom_level_offset: i32,
    ) {
        self.current_visible_tiles.clear();

        // every tile of the target band plus the pinned keep level loads
        let mut to_add: Vec<PrioritizedTileInfo> = Vec::new();
        for layer in &pyramid {
            let offset = layer.target_zoom_level_offset;
            let drawn_band = offset <= 0 && offset >= -self.zoom_info.num_draw_previous_layers;
            if drawn_band || offset == keep_zoom_level_offset {
                for prioritized in &layer.tiles {
                    self.current_visible_tiles.insert(prioritized.tile);
                    if !self.current_tiles.contains_key(&prioritized.tile)
                        && !self.currently_loading.contains_key(&prioritized.tile)
                        && !self.not_found_tiles.contains(&prioritized.tile)
                    {
                        to_add.push(*prioritized);
                    }
                }
            }
        }

        self.current_pyramid = pyramid;
        self.current_keep_zoom_level_offset = keep_zoom_level_offset;

        // tiles from coarser levels stay resident until the finer cover has
        // loaded; only tiles absent from the whole pyramid retire directly
        let current_zoom = self.current_zoom_level_identifier;
        let only_current = !self.zoom_info.mask_tile && self.zoom_info.num_draw_previous_layers == 0;
        let mut to_remove: Vec<TileInfo> = Vec::new();
        for (info, wrapper) in self.current_tiles.iter_mut() {
            let considered = (!only_current && info.zoom_identifier <= current_zoom)
                || (only_current && info.zoom_identifier == current_zoom)
                || info.zoom_identifier == current_zoom + keep_zoom_level_offset
                || enforce_multiple_levels;
            let mut found = false;
            if considered {
                let probe = PrioritizedTileInfo::new(*info, 0);
                for layer in &self.current_pyramid {
                    if let Some(visible) = layer.tiles.get(&probe) {
                        wrapper.tessellation_factor = visible.tile.tessellation_factor;
                        found = true;
                        break;
                    }
                }
            }
            if !found {
                to_remove.push(*info);
            }
        }
        for removed in &to_remove {
            self.current_tiles.remove(removed);
            self.currently_loading.remove(removed);
            self.ready_tiles.remove(removed);
            if let Some(manager) = &self.error_manager {
                manager.remove_error(&self.layer_config.tile_url(
                    removed.x,
                    removed.y,
                    removed.t,
                    removed.zoom_identifier,
                ));
            }
        }

        // in-flight loads for tiles that left the acceptable zoom band are
        // aborted; their late results will be discarded
        let loading: Vec<(TileInfo, usize)> = self
            .currently_loading
            .iter()
            .map(|(tile, index)| (*tile, *index))
            .collect();
        for (tile, loader_index) in loading {
            let mut found = false;
            if tile.zoom_identifier <= current_zoom {
                let probe = PrioritizedTileInfo::new(tile, 0);
                found = self
                    .current_pyramid
                    .iter()
                    .any(|layer| layer.tiles.contains(&probe));
            }
            if !found {
                if let Some(loader) = self.loaders.get(loader_index) {
                    loader.cancel(&self.layer_config.tile_url(
                        tile.x,
                        tile.y,
                        tile.t,
                        tile.zoom_identifier,
                    ));
                }
                self.currently_loading.remove(&tile);
            }
        }

        // error entries for tiles in no pyramid layer are dropped
        {
            let pyramid = &self.current_pyramid;
            let layer_config = &self.layer_config;
            let error_manager = &self.error_manager;
            for errors in self.error_tiles.values_mut() {
                errors.retain(|tile, _| {
                    let probe = PrioritizedTileInfo::new(*tile, 0);
                    let keep = pyramid.iter().any(|layer| layer.tiles.contains(&probe));
                    if !keep {
                        if let Some(manager) = error_manager {
                            manager.remove_error(&layer_config.tile_url(
                                tile.x,
                                tile.y,
                                tile.t,
                                tile.zoom_identifier,
                            ));
                        }
                    }
                    keep
                });
            }
        }

        to_add.sort();
        for prioritized in &to_add {
            self.perform_loading_task(prioritized.tile, 0);
        }

        // removals alone can change coverage, so masks always recompute
        self.update_tile_masks();
        self.notify_tiles_updated();
    }

    /// Kicks off the load of one tile on one loader of the chain
    fn perform_loading_task(&mut self, tile: TileInfo, loader_index: usize) {
        if self.currently_loading.contains_key(&tile) {
            return;
        }
        if !self.current_visible_tiles.contains(&tile) {
            if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
                errors.remove(&tile);
            }
            return;
        }
        if loader_index >= self.loaders.len() {
            // no loader in the chain handles this tile
            log::debug!("loader chain exhausted for tile {}", tile);
            self.not_found_tiles.insert(tile);
            return;
        }

        self.currently_loading.insert(tile, loader_index);
        self.ready_tiles.remove(&tile);

        let loader = Arc::clone(&self.loaders[loader_index]);
        let url = self.tile_url(&tile);
        let weak = self.self_actor.clone();
        let post_process = self.post_process.clone();
        let scheduler = self.scheduler.clone();

        self.scheduler.spawn(ExecutionEnvironment::Io, async move {
            let result = loader.load(&tile, &url).await;
            match result.status {
                LoaderStatus::Ok => {
                    let data = match result.data {
                        Some(data) => data,
                        None => {
                            weak.message("did_fail_to_load", move |source| {
                                source.did_fail_to_load(
                                    tile,
                                    loader_index,
                                    LoaderStatus::ErrorOther,
                                    Some("loader returned OK without data".to_string()),
                                );
                            });
                            return;
                        }
                    };
                    match post_process {
                        PostProcess::Inline(convert) => {
                            let payload = convert(data, &tile);
                            weak.message("did_load", move |source| {
                                source.did_load(tile, loader_index, payload);
                            });
                        }
                        PostProcess::Compute(convert) => {
                            // the conversion is expensive; stage it on the
                            // computation executor and drop the result if
                            // the tile left visibility meanwhile
                            let weak = weak.clone();
                            scheduler.spawn(ExecutionEnvironment::Computation, async move {
                                let visible = weak
                                    .sync_access(|source| source.is_tile_visible(&tile))
                                    .unwrap_or(false);
                                if visible {
                                    let payload = convert(data, &tile);
                                    weak.message("did_load", move |source| {
                                        source.did_load(tile, loader_index, payload);
                                    });
                                } else {
                                    weak.message("did_fail_to_load", move |source| {
                                        source.did_fail_to_load(
                                            tile,
                                            loader_index,
                                            LoaderStatus::ErrorOther,
                                            None,
                                        );
                                    });
                                }
                            });
                        }
                    }
                }
                status => {
                    let error_code = result.error_code;
                    weak.message("did_fail_to_load", move |source| {
                        source.did_fail_to_load(tile, loader_index, status, error_code);
                    });
                }
            }
        });
    }

    /// Completion of a load: installs the wrapper and refreshes masks
    pub fn did_load(&mut self, tile: TileInfo, loader_index: usize, payload: R) {
        self.currently_loading.remove(&tile);
        if !self.current_visible_tiles.contains(&tile) {
            if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
                errors.remove(&tile);
            }
            return;
        }

        let url = self.tile_url(&tile);
        if let Some(manager) = &self.error_manager {
            manager.remove_error(&url);
        }

        let previous_version = self
            .current_tiles
            .get(&tile)
            .or_else(|| self.outdated_tiles.get(&tile))
            .map(|wrapper| wrapper.version);
        let version = previous_version.map_or(0, |v| v + 1);

        self.current_tiles.insert(
            tile,
            TileWrapper::new(payload, &tile.bounds, tile.tessellation_factor, version),
        );
        if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
            errors.remove(&tile);
        }

        self.update_tile_masks();
        self.notify_tiles_updated();
    }

    /// Failure of a load: chain fallthrough, permanent parking or backoff
    pub fn did_fail_to_load(
        &mut self,
        tile: TileInfo,
        loader_index: usize,
        status: LoaderStatus,
        error_code: Option<String>,
    ) {
        self.currently_loading.remove(&tile);
        if !self.current_visible_tiles.contains(&tile) {
            if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
                errors.remove(&tile);
            }
            return;
        }

        match status {
            LoaderStatus::Ok => {
                log::error!("did_fail_to_load called with OK status for tile {}", tile);
            }
            LoaderStatus::Noop => {
                if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
                    errors.remove(&tile);
                }
                self.perform_loading_task(tile, loader_index + 1);
            }
            LoaderStatus::Error400 | LoaderStatus::Error404 => {
                self.not_found_tiles.insert(tile);
                if let Some(errors) = self.error_tiles.get_mut(&loader_index) {
                    errors.remove(&tile);
                }
                if let Some(manager) = &self.error_manager {
                    manager.add_tiled_layer_error(&TiledLayerError {
                        status,
                        error_code,
                        layer_name: self.layer_name.clone(),
                        url: self.tile_url(&tile),
                        is_recoverable: false,
                        bounds: tile.bounds,
                    });
                }
            }
            LoaderStatus::ErrorTimeout | LoaderStatus::ErrorNetwork | LoaderStatus::ErrorOther => {
                let now = runtime::current_time_millis();
                let errors = self.error_tiles.entry(loader_index).or_default();
                let delay = match errors.get_mut(&tile) {
                    Some(info) => {
                        info.last_load_millis = now;
                        info.delay_millis = (2 * info.delay_millis).min(MAX_WAIT_MILLIS);
                        info.delay_millis
                    }
                    None => {
                        errors.insert(
                            tile,
                            ErrorInfo {
                                last_load_millis: now,
                                delay_millis: MIN_WAIT_MILLIS,
                            },
                        );
                        MIN_WAIT_MILLIS
                    }
                };

                if let Some(manager) = &self.error_manager {
                    manager.add_tiled_layer_error(&TiledLayerError {
                        status,
                        error_code,
                        layer_name: self.layer_name.clone(),
                        url: self.tile_url(&tile),
                        is_recoverable: true,
                        bounds: tile.bounds,
                    });
                }

                let due = now + delay;
                if self.next_delay_task_execution.map_or(true, |next| next > due) {
                    self.next_delay_task_execution = Some(due);
                    let weak = self.self_actor.clone();
                    self.scheduler.spawn_after(
                        Duration::from_millis(delay.max(0) as u64),
                        ExecutionEnvironment::Io,
                        async move {
                            weak.message("perform_delayed_tasks", |source| {
                                source.perform_delayed_tasks();
                            });
                        },
                    );
                }
            }
        }

        self.update_tile_masks();
        self.notify_tiles_updated();
    }

    /// Retries every errored tile whose backoff deadline has been reached
    /// and re-arms the timer for the remainder
    pub fn perform_delayed_tasks(&mut self) {
        self.next_delay_task_execution = None;

        let now = runtime::current_time_millis();
        let mut min_delay = i64::MAX;
        let mut to_load: Vec<(usize, TileInfo)> = Vec::new();

        for (loader_index, errors) in &self.error_tiles {
            for (tile, info) in errors {
                if info.last_load_millis + info.delay_millis >= now {
                    to_load.push((*loader_index, *tile));
                } else {
                    min_delay = min_delay.min(info.delay_millis);
                }
            }
        }

        for (loader_index, tile) in to_load {
            self.perform_loading_task(tile, loader_index);
        }

        if min_delay != i64::MAX {
            self.next_delay_task_execution = Some(now + min_delay);
            let weak = self.self_actor.clone();
            self.scheduler.spawn_after(
                Duration::from_millis(min_delay.max(0) as u64),
                ExecutionEnvironment::Io,
                async move {
                    weak.message("perform_delayed_tasks", |source| {
                        source.perform_delayed_tasks();
                    });
                },
            );
        }
    }

    /// Downstream managers signal that a tile is fully processed
    pub fn set_tile_ready(&mut self, tile: &VersionedTileInfo) {
        if self.ready_tiles.contains(&tile.tile) {
            return;
        }
        if !self.current_tiles.contains_key(&tile.tile) {
            return;
        }
        self.ready_tiles.insert(tile.tile);
        self.outdated_tiles.remove(&tile.tile);

        self.update_tile_masks();
        self.notify_tiles_updated();
    }

    pub fn set_tiles_ready(&mut self, tiles: &[VersionedTileInfo]) {
        let mut needs_update = false;
        for tile in tiles {
            if self.ready_tiles.contains(&tile.tile)
                && !self.outdated_tiles.contains_key(&tile.tile)
            {
                continue;
            }
            if let Some(wrapper) = self.current_tiles.get_mut(&tile.tile) {
                if !self.zoom_info.mask_tile {
                    wrapper.state = TileState::Visible;
                }
                self.ready_tiles.insert(tile.tile);
                self.outdated_tiles.remove(&tile.tile);
                needs_update = true;
            }
        }
        if !needs_update {
            return;
        }

        self.update_tile_masks();
        self.notify_tiles_updated();
    }

    /// Retries every errored tile immediately, ignoring backoff, and gives
    /// permanently missing tiles one fresh attempt
    pub fn force_reload(&mut self) {
        let mut to_load: Vec<(usize, TileInfo)> = Vec::new();
        for (loader_index, errors) in self.error_tiles.iter_mut() {
            for (tile, info) in errors.iter_mut() {
                info.delay_millis = 1;
                to_load.push((*loader_index, *tile));
            }
        }
        let not_found: Vec<TileInfo> = self
            .not_found_tiles
            .iter()
            .filter(|tile| self.current_visible_tiles.contains(*tile))
            .copied()
            .collect();
        for tile in not_found {
            self.not_found_tiles.remove(&tile);
            to_load.push((0, tile));
        }
        for (loader_index, tile) in to_load {
            self.perform_loading_task(tile, loader_index);
        }
    }

    /// Drops all live tile state and replays the last pyramid. Retired
    /// wrappers stay visible as [`TileState::OutdatedVisible`] until their
    /// replacements are ready.
    pub fn reload_tiles(&mut self) {
        self.outdated_tiles = std::mem::take(&mut self.current_tiles);
        self.ready_tiles.clear();

        let loading: Vec<(TileInfo, usize)> = self
            .currently_loading
            .drain()
            .collect();
        for (tile, loader_index) in loading {
            if let Some(loader) = self.loaders.get(loader_index) {
                loader.cancel(&self.layer_config.tile_url(
                    tile.x,
                    tile.y,
                    tile.t,
                    tile.zoom_identifier,
                ));
            }
        }
        self.error_tiles.clear();

        self.last_visible_tiles_hash = INVALID_HASH;
        let pyramid = self.current_pyramid.clone();
        let keep_offset = self.current_keep_zoom_level_offset;
        self.on_visible_tiles_changed(pyramid, false, keep_offset);
    }

    /// Pure summary for offscreen capture polling
    pub fn is_ready_to_render_offscreen(&self) -> LayerReadyState {
        if !self.not_found_tiles.is_empty() {
            return LayerReadyState::Error;
        }
        if self.error_tiles.values().any(|errors| !errors.is_empty()) {
            return LayerReadyState::Error;
        }
        if !self.currently_loading.is_empty() {
            return LayerReadyState::NotReady;
        }
        for visible in &self.current_visible_tiles {
            if !self.current_tiles.contains_key(visible) {
                return LayerReadyState::NotReady;
            }
            if !self.ready_tiles.contains(visible) {
                return LayerReadyState::NotReady;
            }
        }
        LayerReadyState::Ready
    }

    fn update_tile_masks(&mut self) {
        mask::update_tile_masks(
            &mut self.current_tiles,
            &self.ready_tiles,
            self.current_zoom_level_identifier,
            &self.current_view_bounds,
            self.zoom_info.mask_tile,
        );
    }

    /// Builds the immutable listener snapshot: current tiles plus retired
    /// wrappers that still cover the screen during a reload
    pub fn render_tiles(&self) -> Vec<RenderTile<R>> {
        let mut tiles: Vec<RenderTile<R>> = self
            .current_tiles
            .iter()
            .map(|(info, wrapper)| RenderTile {
                tile: VersionedTileInfo::new(*info, wrapper.version),
                payload: wrapper.payload.clone(),
                masks: wrapper.masks.clone(),
                state: wrapper.state,
                tessellation_factor: wrapper.tessellation_factor,
            })
            .collect();
        for (info, wrapper) in &self.outdated_tiles {
            if !self.ready_tiles.contains(info) {
                tiles.push(RenderTile {
                    tile: VersionedTileInfo::new(*info, wrapper.version),
                    payload: wrapper.payload.clone(),
                    masks: wrapper.masks.clone(),
                    state: TileState::OutdatedVisible,
                    tessellation_factor: wrapper.tessellation_factor,
                });
            }
        }
        tiles
    }

    fn notify_tiles_updated(&self) {
        self.listener
            .on_tiles_updated(&self.layer_name, self.render_tiles());
    }
}

/// Message-based surface of a spawned tile source; the only legal way to
/// drive one.
impl<D, R> Actor<TileSource<D, R>>
where
    D: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn on_visible_bounds_changed(&self, visible_bounds: RectBounds, cur_t: i32, zoom: f64) {
        self.message_with(
            Duplication::ReplaceNewest,
            ExecutionEnvironment::Computation,
            "on_visible_bounds_changed",
            move |source| source.on_visible_bounds_changed(&visible_bounds, cur_t, zoom),
        );
    }

    pub fn on_camera_change(&self, pose: CameraPose) {
        self.message_with(
            Duplication::ReplaceNewest,
            ExecutionEnvironment::Computation,
            "on_camera_change",
            move |source| source.on_camera_change(&pose),
        );
    }

    pub fn pause(&self) {
        self.message("pause", |source| source.pause());
    }

    pub fn resume(&self) {
        self.message("resume", |source| source.resume());
    }

    pub fn set_min_zoom_level_identifier(&self, value: Option<i32>) {
        self.message("set_min_zoom_level_identifier", move |source| {
            source.set_min_zoom_level_identifier(value);
        });
    }

    pub fn set_max_zoom_level_identifier(&self, value: Option<i32>) {
        self.message("set_max_zoom_level_identifier", move |source| {
            source.set_max_zoom_level_identifier(value);
        });
    }

    pub fn set_error_manager(&self, error_manager: Arc<dyn ErrorManager>) {
        self.message("set_error_manager", move |source| {
            source.set_error_manager(error_manager);
        });
    }

    pub fn force_reload(&self) {
        self.message("force_reload", |source| source.force_reload());
    }

    pub fn reload_tiles(&self) {
        self.message("reload_tiles", |source| source.reload_tiles());
    }

    pub fn set_tile_ready(&self, tile: VersionedTileInfo) {
        self.message("set_tile_ready", move |source| {
            source.set_tile_ready(&tile);
        });
    }

    pub fn set_tiles_ready(&self, tiles: Vec<VersionedTileInfo>) {
        self.message("set_tiles_ready", move |source| {
            source.set_tiles_ready(&tiles);
        });
    }

    pub async fn is_ready_to_render_offscreen(&self) -> LayerReadyState {
        self.converse("is_ready_to_render_offscreen", |source| {
            source.is_ready_to_render_offscreen()
        })
        .await
        .unwrap_or(LayerReadyState::NotReady)
    }

    /// Copy of the current render snapshot
    pub async fn current_tiles(&self) -> Vec<RenderTile<R>> {
        self.converse("current_tiles", |source| source.render_tiles())
            .await
            .unwrap_or_default()
    }

    pub async fn current_view_bounds(&self) -> QuadBounds {
        self.converse("current_view_bounds", |source| source.current_view_bounds())
            .await
            .unwrap_or_default()
    }
}
