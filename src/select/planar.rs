//! 2D visibility selection: a rectangular sweep over the zoom-level table.
//!
//! Given the camera's visible rectangle and physical zoom, produces a
//! pyramid of [`VisibleTilesLayer`]s from the coarsest level down to two
//! levels past the target, each tile carrying a load priority derived from
//! its distance to the viewport centre, its zoom distance from the target
//! level and its distance along the t axis.

use crate::core::coord::RectBounds;
use crate::core::tile::{PrioritizedTileInfo, TileInfo, VisibleTilesLayer};
use crate::core::zoom::{ZoomInfo, ZoomLevel};

/// Padding applied to the visible rectangle, as a fraction of its shorter
/// dimension, to hide pop-in at the viewport edges
const VIEWBOUNDS_PADDING_MIN_DIM_PC: f64 = 0.15;

/// Zoom-identifier distance from the finest examined level at which a coarse
/// layer is pinned through zoom transitions
const ALWAYS_KEEP_LEVEL_TARGET_ZOOM_OFFSET: i32 = -8;

/// Reference pixel pitch: a screen pixel is assumed to be 0.28mm
/// (https://gis.stackexchange.com/a/315989)
const REFERENCE_PPI: f64 = 0.0254 / 0.00028;

const DISTANCE_WEIGHT: f64 = 100.0;

/// Inputs that stay fixed across camera updates
pub struct PlanarSelectorParams<'a> {
    /// Zoom levels sorted coarsest first
    pub levels: &'a [ZoomLevel],
    pub zoom_info: &'a ZoomInfo,
    pub screen_density_ppi: f32,
    pub min_zoom_level_identifier: Option<i32>,
    pub max_zoom_level_identifier: Option<i32>,
    /// Optional restriction of the layer to a sub-extent
    pub layer_bounds: Option<RectBounds>,
}

/// A selected pyramid plus the bookkeeping the source needs to apply it
#[derive(Debug, Clone)]
pub struct TilePyramid {
    pub layers: Vec<VisibleTilesLayer>,
    pub keep_zoom_level_offset: i32,
    pub target_zoom_identifier: i32,
    /// Cheap fingerprint of the per-level tile ranges; identical consecutive
    /// results are dropped by the source
    pub hash: u64,
}

/// Outcome of a planar selection run
#[derive(Debug, Clone)]
pub enum PlanarOutcome {
    /// Camera is zoomed out past the coarsest level and underzoom is off;
    /// the pyramid clears once (deduped through the zero hash)
    RejectUnderzoom,
    /// Camera is zoomed in past the finest level and overzoom is off; the
    /// pyramid clears unconditionally
    RejectOverzoom,
    Pyramid(TilePyramid),
}

/// Boost-style hash combiner
fn hash_combine(seed: &mut u64, value: u64) {
    *seed ^= value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// Maps a coordinate onto an axis that increases with tile indices
fn to_axis(value: f64, ascending: bool) -> f64 {
    if ascending {
        value
    } else {
        -value
    }
}

pub fn select_visible_tiles(
    params: &PlanarSelectorParams,
    visible_bounds: &RectBounds,
    cur_t: i32,
    zoom: f64,
) -> PlanarOutcome {
    let levels = params.levels;
    let zoom_info = params.zoom_info;

    let screen_scale_factor = if zoom_info.adapt_scale_to_screen {
        f64::from(params.screen_density_ppi) / REFERENCE_PPI
    } else {
        1.0
    };
    let scale = zoom_info.zoom_level_scale_factor * screen_scale_factor;

    // A pyramid whose coarsest level is identifier 0 always underzooms: a
    // one-tile world level has nothing coarser to fall back to.
    if !zoom_info.underzoom
        && levels.first().map_or(true, |l| l.zoom * scale < zoom)
        && levels.first().map_or(true, |l| l.zoom_identifier != 0)
    {
        return PlanarOutcome::RejectUnderzoom;
    }

    if levels.is_empty() {
        return PlanarOutcome::RejectOverzoom;
    }

    let mut target_zoom_layer: i32 = -1;
    for (i, level) in levels.iter().enumerate() {
        if scale * level.zoom < zoom {
            target_zoom_layer = (i as i32 - 1).max(0);
            break;
        }
    }
    if target_zoom_layer < 0 {
        if !zoom_info.overzoom {
            return PlanarOutcome::RejectOverzoom;
        }
        target_zoom_layer = levels.len() as i32 - 1;
    }
    let target_zoom_layer = target_zoom_layer as usize;
    let target_zoom_identifier = levels[target_zoom_layer].zoom_identifier;

    let start_zoom_layer = 0usize;
    let end_zoom_layer = (levels.len() - 1).min(target_zoom_layer + 2);
    let keep_zoom_level_offset = levels[start_zoom_layer].zoom_identifier.max(
        levels[end_zoom_layer].zoom_identifier + ALWAYS_KEEP_LEVEL_TARGET_ZOOM_OFFSET,
    ) - target_zoom_identifier;

    let zoom_level_weight = 1000.0 * f64::from(levels[0].num_tiles_t);
    let t_distance_weight = 1000.0 * f64::from(levels[0].num_tiles_t);

    let center_visible_x = visible_bounds.top_left.x + 0.5 * visible_bounds.width();
    let center_visible_y = visible_bounds.top_left.y + 0.5 * visible_bounds.height();

    let mut visible_width = visible_bounds.width();
    let mut visible_height = -visible_bounds.height();
    let padding = VIEWBOUNDS_PADDING_MIN_DIM_PC * visible_width.abs().min(visible_height.abs());

    let sign_width = visible_width.signum();
    let visible_left = visible_bounds.top_left.x - sign_width * padding;
    let visible_right = visible_bounds.bottom_right.x + sign_width * padding;
    visible_width = visible_width.abs() + 2.0 * padding;

    let sign_height = visible_height.signum();
    let visible_top = visible_bounds.top_left.y + sign_height * padding;
    let visible_bottom = visible_bounds.bottom_right.y - sign_height * padding;
    visible_height = visible_height.abs() + 2.0 * padding;

    let mut hash = target_zoom_identifier as u64;
    let mut layers = Vec::new();

    for i in start_zoom_layer..=end_zoom_layer {
        let level = &levels[i];

        // A single-level pyramid (identifier 0, e.g. a GeoJSON point layer)
        // ignores the identifier filters; restricting it would leave nothing.
        if !(start_zoom_layer == 0 && end_zoom_layer == 0) {
            if let Some(min) = params.min_zoom_level_identifier {
                if level.zoom_identifier < min {
                    continue;
                }
            }
            if let Some(max) = params.max_zoom_level_identifier {
                if level.zoom_identifier > max {
                    continue;
                }
            }
        }

        let bounds_ratio = ((level.bounds.bottom_right.y - level.bounds.top_left.y)
            / (level.bounds.bottom_right.x - level.bounds.top_left.x))
            .abs();
        let tile_width = level.tile_width_layer_units;
        let tile_height = level.tile_width_layer_units * bounds_ratio;
        let zoom_distance_factor = (level.zoom_identifier - target_zoom_identifier).abs();

        let left_to_right = level.bounds.is_left_to_right();
        let top_to_bottom = level.bounds.is_top_to_bottom();
        let tile_width_adj = if left_to_right { tile_width } else { -tile_width };
        let tile_height_adj = if top_to_bottom { tile_height } else { -tile_height };

        let bounds_left = level.bounds.top_left.x;
        let bounds_top = level.bounds.top_left.y;

        let span_x = |value: f64| {
            if left_to_right {
                value - bounds_left
            } else {
                bounds_left - value
            }
        };
        let span_y = |value: f64| {
            if top_to_bottom {
                value - bounds_top
            } else {
                bounds_top - value
            }
        };

        let mut start_tile_left = (span_x(visible_left).max(0.0) / tile_width).floor() as i32;
        let mut max_tile_left = (span_x(visible_right).max(0.0) / tile_width).floor() as i32;
        let mut start_tile_top = (span_y(visible_top).max(0.0) / tile_height).floor() as i32;
        let mut max_tile_top = (span_y(visible_bottom).max(0.0) / tile_height).floor() as i32;

        if let Some(available) = &params.layer_bounds {
            let origin_x = to_axis(level.bounds.top_left.x, left_to_right);
            let origin_y = to_axis(level.bounds.top_left.y, top_to_bottom);
            let ax_a = to_axis(available.top_left.x, left_to_right);
            let ax_b = to_axis(available.bottom_right.x, left_to_right);
            let ay_a = to_axis(available.top_left.y, top_to_bottom);
            let ay_b = to_axis(available.bottom_right.y, top_to_bottom);

            let min_left = (((ax_a.min(ax_b) - origin_x) / tile_width).floor() as i32).max(0);
            let max_left =
                (((ax_a.max(ax_b) - origin_x) / tile_width).floor() as i32).min(level.num_tiles_x);
            let min_top = (((ay_a.min(ay_b) - origin_y) / tile_height).floor() as i32).max(0);
            let max_top =
                (((ay_a.max(ay_b) - origin_y) / tile_height).floor() as i32).min(level.num_tiles_y);

            start_tile_left = start_tile_left.max(min_left);
            max_tile_left = max_tile_left.min(max_left);
            start_tile_top = start_tile_top.max(min_top);
            max_tile_top = max_tile_top.min(max_top);
        }

        let max_dis_center_x = visible_width * 0.5 + tile_width;
        let max_dis_center_y = visible_height * 0.5 + tile_height;
        let max_dis_center =
            (max_dis_center_x * max_dis_center_x + max_dis_center_y * max_dis_center_y).sqrt();

        hash_combine(&mut hash, i as u64);
        hash_combine(&mut hash, start_tile_left as u64);
        hash_combine(&mut hash, max_tile_left as u64);
        hash_combine(&mut hash, start_tile_top as u64);
        hash_combine(&mut hash, max_tile_top as u64);
        hash_combine(&mut hash, level.num_tiles_t as u64);

        let mut layer = VisibleTilesLayer::new(i as i32 - target_zoom_layer as i32);

        if (0..level.num_tiles_t).contains(&cur_t) {
            let t = cur_t;
            let mut x = start_tile_left;
            while x <= max_tile_left && x < level.num_tiles_x {
                let mut y = start_tile_top;
                while y <= max_tile_top && y < level.num_tiles_y {
                    let top_left_x = f64::from(x) * tile_width_adj + bounds_left;
                    let top_left_y = f64::from(y) * tile_height_adj + bounds_top;
                    let rect = RectBounds::from_coords(
                        top_left_x,
                        top_left_y,
                        top_left_x + tile_width_adj,
                        top_left_y + tile_height_adj,
                    );

                    let tile_center_x = top_left_x + 0.5 * tile_width_adj;
                    let tile_center_y = top_left_y + 0.5 * tile_height_adj;
                    let tile_center_dis = ((tile_center_x - center_visible_x).powi(2)
                        + (tile_center_y - center_visible_y).powi(2))
                    .sqrt();

                    let distance_factor = (tile_center_dis / max_dis_center) * DISTANCE_WEIGHT;
                    let zoom_level_factor = f64::from(zoom_distance_factor) * zoom_level_weight;
                    let t_distance_factor = f64::from((t - cur_t).abs()) * t_distance_weight;
                    let priority =
                        (distance_factor + zoom_level_factor + t_distance_factor).ceil() as i32;

                    layer.tiles.insert(PrioritizedTileInfo::new(
                        TileInfo::new(rect, x, y, t, level.zoom_identifier, level.zoom),
                        priority,
                    ));
                    y += 1;
                }
                x += 1;
            }
        }

        layers.push(layer);
    }

    PlanarOutcome::Pyramid(TilePyramid {
        layers,
        keep_zoom_level_offset,
        target_zoom_identifier,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::zoom::ZoomLevelTable;

    /// The three-level test pyramid over (0,0)-(10,10): 1x1 at zoom 100,
    /// 2x2 at zoom 50, 4x4 at zoom 25
    fn table() -> ZoomLevelTable {
        let bounds = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        ZoomLevelTable::new(
            (0..3)
                .map(|ident| ZoomLevel {
                    zoom_identifier: ident,
                    zoom: 100.0 / f64::from(1 << ident),
                    tile_width_layer_units: 10.0 / f64::from(1 << ident),
                    num_tiles_x: 1 << ident,
                    num_tiles_y: 1 << ident,
                    num_tiles_t: 1,
                    bounds,
                })
                .collect(),
        )
    }

    fn zoom_info() -> ZoomInfo {
        ZoomInfo {
            adapt_scale_to_screen: true,
            num_draw_previous_layers: 0,
            ..ZoomInfo::default()
        }
    }

    fn params<'a>(levels: &'a [ZoomLevel], zoom_info: &'a ZoomInfo) -> PlanarSelectorParams<'a> {
        PlanarSelectorParams {
            levels,
            zoom_info,
            screen_density_ppi: 90.0,
            min_zoom_level_identifier: None,
            max_zoom_level_identifier: None,
            layer_bounds: None,
        }
    }

    fn pyramid(outcome: PlanarOutcome) -> TilePyramid {
        match outcome {
            PlanarOutcome::Pyramid(p) => p,
            other => panic!("expected pyramid, got {:?}", other),
        }
    }

    fn layer_at<'a>(pyramid: &'a TilePyramid, offset: i32) -> &'a VisibleTilesLayer {
        pyramid
            .layers
            .iter()
            .find(|l| l.target_zoom_level_offset == offset)
            .expect("layer missing")
    }

    #[test]
    fn test_cold_start_selects_target_level_one() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let result = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            30.0,
        ));

        assert_eq!(result.target_zoom_identifier, 1);
        // identifiers 0 (keep candidate), 1 (target) and 2 are examined
        assert_eq!(result.layers.len(), 3);

        let target = layer_at(&result, 0);
        assert_eq!(target.tiles.len(), 4);
        let mut keys: Vec<(i32, i32)> = target.tiles.iter().map(|t| (t.tile.x, t.tile.y)).collect();
        keys.sort();
        assert_eq!(keys, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        // with only three levels the keep layer collapses onto identifier 0
        assert_eq!(result.keep_zoom_level_offset, -1);
        assert_eq!(layer_at(&result, -1).tiles.len(), 1);
    }

    #[test]
    fn test_tile_bounds_and_priority_ordering() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let result = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            30.0,
        ));

        let target = layer_at(&result, 0);
        let origin = target
            .tiles
            .iter()
            .find(|t| t.tile.x == 0 && t.tile.y == 0)
            .unwrap();
        assert_eq!(origin.tile.bounds, RectBounds::from_coords(0.0, 0.0, 5.0, 5.0));

        // equidistant target tiles share a priority; coarser keep tiles sort
        // behind them through the zoom-distance weight
        let keep = layer_at(&result, -1).tiles.iter().next().unwrap();
        assert!(keep.priority > origin.priority);
    }

    #[test]
    fn test_hash_is_stable_for_identical_input() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let a = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            30.0,
        ));
        let b = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            30.0,
        ));
        assert_eq!(a.hash, b.hash);

        // a pan that shifts the tile ranges must change the fingerprint
        let moved = RectBounds::from_coords(5.0, 5.0, 15.0, 15.0);
        let c = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &moved,
            0,
            30.0,
        ));
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_padding_pulls_in_edge_tiles() {
        let table = table();
        let info = zoom_info();
        // the raw viewport stays inside tile (0,0) of identifier 2, but the
        // 15% padding crosses the tile boundary at 2.5 and pulls in the
        // three neighbors
        let visible = RectBounds::from_coords(2.4, 2.4, 2.49, 2.49);
        let result = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            9.0,
        ));
        assert_eq!(result.target_zoom_identifier, 2);
        let target = layer_at(&result, 0);
        assert_eq!(target.tiles.len(), 4);
    }

    #[test]
    fn test_underzoom_rejected_when_disabled() {
        let bounds = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        // coarsest identifier is 1, so the identifier-0 escape hatch is off
        let table = ZoomLevelTable::new(
            (1..3)
                .map(|ident| ZoomLevel {
                    zoom_identifier: ident,
                    zoom: 100.0 / f64::from(1 << ident),
                    tile_width_layer_units: 10.0 / f64::from(1 << ident),
                    num_tiles_x: 1 << ident,
                    num_tiles_y: 1 << ident,
                    num_tiles_t: 1,
                    bounds,
                })
                .collect(),
        );
        let info = ZoomInfo {
            underzoom: false,
            ..zoom_info()
        };
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let outcome =
            select_visible_tiles(&params(table.levels(), &info), &visible, 0, 500.0);
        assert!(matches!(outcome, PlanarOutcome::RejectUnderzoom));
    }

    #[test]
    fn test_overzoom_disabled_clears_pyramid() {
        let table = table();
        let info = ZoomInfo {
            overzoom: false,
            ..zoom_info()
        };
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let outcome = select_visible_tiles(&params(table.levels(), &info), &visible, 0, 1.0);
        assert!(matches!(outcome, PlanarOutcome::RejectOverzoom));
    }

    #[test]
    fn test_overzoom_enabled_uses_finest_level() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let result = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            0,
            1.0,
        ));
        assert_eq!(result.target_zoom_identifier, 2);
    }

    #[test]
    fn test_identifier_filters() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let mut p = params(table.levels(), &info);
        p.min_zoom_level_identifier = Some(1);
        p.max_zoom_level_identifier = Some(1);
        let result = pyramid(select_visible_tiles(&p, &visible, 0, 30.0));
        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.layers[0].target_zoom_level_offset, 0);
    }

    #[test]
    fn test_layer_bounds_restrict_tile_range() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let mut p = params(table.levels(), &info);
        // only the left half of the world is available
        p.layer_bounds = Some(RectBounds::from_coords(0.0, 0.0, 5.0, 10.0));
        let result = pyramid(select_visible_tiles(&p, &visible, 0, 30.0));
        let target = layer_at(&result, 0);
        assert!(target.tiles.iter().all(|t| t.tile.x == 0));
    }

    #[test]
    fn test_layer_bounds_restrict_web_mercator_table() {
        // real layers built from ZoomLevel::web_mercator run top-to-bottom
        // descending in y; the clamp has to resolve indices there too
        let table = ZoomLevelTable::web_mercator(0, 3);
        let info = zoom_info();
        let world = table.levels()[0].bounds;
        assert!(!world.is_top_to_bottom());

        // 100M sits between the scaled zooms of identifiers 2 and 3
        let unrestricted = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &world,
            0,
            100_000_000.0,
        ));
        assert_eq!(unrestricted.target_zoom_identifier, 2);
        assert_eq!(layer_at(&unrestricted, 0).tiles.len(), 16);

        // north-west quadrant only
        let mut p = params(table.levels(), &info);
        p.layer_bounds = Some(RectBounds::from_coords(
            world.top_left.x,
            world.top_left.y,
            0.0,
            0.0,
        ));
        let result = pyramid(select_visible_tiles(&p, &world, 0, 100_000_000.0));
        let target = layer_at(&result, 0);

        // rows and columns lying entirely in the south-east are clamped away
        assert!(!target.tiles.is_empty());
        assert!(target.tiles.iter().all(|t| t.tile.x <= 2 && t.tile.y <= 2));
        assert!(target.tiles.iter().any(|t| t.tile.x == 0 && t.tile.y == 0));
    }

    #[test]
    fn test_out_of_range_t_emits_no_tiles() {
        let table = table();
        let info = zoom_info();
        let visible = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let result = pyramid(select_visible_tiles(
            &params(table.levels(), &info),
            &visible,
            3,
            30.0,
        ));
        assert!(result.layers.iter().all(|l| l.tiles.is_empty()));
    }
}
