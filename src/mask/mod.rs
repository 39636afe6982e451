//! Tile mask geometry.
//!
//! With masking enabled, every visible tile carries a polygon equal to its
//! bounds minus the union of all finer visible tiles, clipped against the
//! view quadrilateral. Drawing the masks of all visible tiles then covers
//! the viewport exactly once: no seams, no double-drawn pixels. Tiles whose
//! mask comes out empty are fully covered by finer data and demote to
//! [`TileState::Cached`].
//!
//! A clipping failure on degenerate input is treated as an empty polygon;
//! the affected tile caches instead of rendering garbage.

use crate::core::coord::{QuadBounds, RectBounds};
use crate::core::tile::{TileInfo, TileState};
use crate::source::TileWrapper;
use fxhash::FxHashSet;
use geo::BooleanOps;
use geo_types::{LineString, MultiPolygon, Polygon};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Builds the closed ring polygon of a tile's bounds
pub fn polygon_from_rect(bounds: &RectBounds) -> Polygon<f64> {
    let tl = bounds.top_left;
    let br = bounds.bottom_right;
    Polygon::new(
        LineString::from(vec![
            (tl.x, tl.y),
            (br.x, tl.y),
            (br.x, br.y),
            (tl.x, br.y),
            (tl.x, tl.y),
        ]),
        vec![],
    )
}

/// Builds the closed ring polygon of a view quadrilateral
pub fn polygon_from_quad(quad: &QuadBounds) -> Polygon<f64> {
    let corners = quad.corners();
    let mut ring: Vec<(f64, f64)> = corners.iter().map(|p| (p.x, p.y)).collect();
    ring.push((corners[0].x, corners[0].y));
    Polygon::new(LineString::from(ring), vec![])
}

fn guarded(operation: &str, clip: impl FnOnce() -> MultiPolygon<f64>) -> MultiPolygon<f64> {
    match catch_unwind(AssertUnwindSafe(clip)) {
        Ok(result) => result,
        Err(_) => {
            log::warn!("polygon {} failed on degenerate input, treating as empty", operation);
            MultiPolygon::new(vec![])
        }
    }
}

pub(crate) fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    guarded("difference", || a.difference(b))
}

pub(crate) fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    guarded("intersection", || a.intersection(b))
}

pub(crate) fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    guarded("union", || a.union(b))
}

/// Recomputes mask polygons and render states over the source's tile map.
///
/// Iterates finest to coarsest, growing the union of already-placed visible
/// tiles; each coarser tile keeps only the part of its bounds that union
/// does not cover. Tiles not yet signalled ready stay [`TileState::InSetup`]
/// and contribute nothing to the union.
pub fn update_tile_masks<R>(
    tiles: &mut BTreeMap<TileInfo, TileWrapper<R>>,
    ready_tiles: &FxHashSet<TileInfo>,
    current_zoom_identifier: i32,
    view_bounds: &QuadBounds,
    mask_tile: bool,
) {
    if !mask_tile {
        for (info, wrapper) in tiles.iter_mut() {
            wrapper.state = if ready_tiles.contains(info) {
                TileState::Visible
            } else {
                TileState::InSetup
            };
        }
        return;
    }

    let view_polygon: MultiPolygon<f64> = polygon_from_quad(view_bounds).into();
    let mut covered: Option<MultiPolygon<f64>> = None;
    let mut complete_view_drawn = false;

    for (info, wrapper) in tiles.iter_mut().rev() {
        wrapper.state = TileState::Visible;

        if !ready_tiles.contains(info) {
            wrapper.state = TileState::InSetup;
            continue;
        }

        if info.zoom_identifier != current_zoom_identifier {
            if let Some(mask) = &covered {
                if !complete_view_drawn {
                    complete_view_drawn = difference(&view_polygon, mask).0.is_empty();
                }
            }
            if complete_view_drawn {
                wrapper.state = TileState::Cached;
                continue;
            }

            let bounds: MultiPolygon<f64> = wrapper.tile_bounds.clone().into();
            let uncovered = match &covered {
                Some(mask) => difference(&bounds, mask),
                None => bounds,
            };
            if uncovered.0.is_empty() {
                wrapper.state = TileState::Cached;
                continue;
            }
            if intersection(&uncovered, &view_polygon).0.is_empty() {
                wrapper.state = TileState::Cached;
                continue;
            }
            wrapper.masks = uncovered;
        } else {
            wrapper.masks = wrapper.tile_bounds.clone().into();
        }

        if wrapper.state == TileState::Visible {
            let bounds: MultiPolygon<f64> = wrapper.tile_bounds.clone().into();
            covered = Some(match covered.take() {
                None => bounds,
                Some(mask) => union(&mask, &bounds),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn tile(x: i32, y: i32, ident: i32, size: f64) -> TileInfo {
        let left = f64::from(x) * size;
        let top = f64::from(y) * size;
        TileInfo::new(
            RectBounds::from_coords(left, top, left + size, top + size),
            x,
            y,
            0,
            ident,
            100.0 / f64::from(1 << ident),
        )
    }

    fn insert(tiles: &mut BTreeMap<TileInfo, TileWrapper<()>>, info: TileInfo) {
        tiles.insert(info, TileWrapper::new((), &info.bounds, 0, 0));
    }

    fn view() -> QuadBounds {
        QuadBounds::from_rect(&RectBounds::from_coords(0.0, 0.0, 10.0, 10.0))
    }

    fn all_ready(tiles: &BTreeMap<TileInfo, TileWrapper<()>>) -> FxHashSet<TileInfo> {
        tiles.keys().copied().collect()
    }

    #[test]
    fn test_unmasked_states_follow_readiness() {
        let mut tiles = BTreeMap::new();
        insert(&mut tiles, tile(0, 0, 1, 5.0));
        insert(&mut tiles, tile(1, 0, 1, 5.0));
        let mut ready = FxHashSet::default();
        ready.insert(tile(0, 0, 1, 5.0));

        update_tile_masks(&mut tiles, &ready, 1, &view(), false);

        assert_eq!(tiles[&tile(0, 0, 1, 5.0)].state, TileState::Visible);
        assert_eq!(tiles[&tile(1, 0, 1, 5.0)].state, TileState::InSetup);
    }

    #[test]
    fn test_target_level_masks_are_full_bounds() {
        let mut tiles = BTreeMap::new();
        for x in 0..2 {
            for y in 0..2 {
                insert(&mut tiles, tile(x, y, 1, 5.0));
            }
        }
        let ready = all_ready(&tiles);
        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        for wrapper in tiles.values() {
            assert_eq!(wrapper.state, TileState::Visible);
            assert!((wrapper.masks.unsigned_area() - 25.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fully_covered_coarse_tile_caches() {
        let mut tiles = BTreeMap::new();
        insert(&mut tiles, tile(0, 0, 0, 10.0));
        for x in 0..2 {
            for y in 0..2 {
                insert(&mut tiles, tile(x, y, 1, 5.0));
            }
        }
        let ready = all_ready(&tiles);
        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        assert_eq!(tiles[&tile(0, 0, 0, 10.0)].state, TileState::Cached);
    }

    #[test]
    fn test_partially_covered_coarse_tile_keeps_remainder() {
        let mut tiles = BTreeMap::new();
        insert(&mut tiles, tile(0, 0, 0, 10.0));
        // only the left half of the target level is loaded
        insert(&mut tiles, tile(0, 0, 1, 5.0));
        insert(&mut tiles, tile(0, 1, 1, 5.0));
        let ready = all_ready(&tiles);
        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        let coarse = &tiles[&tile(0, 0, 0, 10.0)];
        assert_eq!(coarse.state, TileState::Visible);
        // bounds area 100 minus the covered 50
        assert!((coarse.masks.unsigned_area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_not_ready_fine_tiles_leave_coarse_tile_uncut() {
        let mut tiles = BTreeMap::new();
        insert(&mut tiles, tile(0, 0, 0, 10.0));
        insert(&mut tiles, tile(0, 0, 1, 5.0));
        let mut ready = FxHashSet::default();
        ready.insert(tile(0, 0, 0, 10.0));

        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        assert_eq!(tiles[&tile(0, 0, 1, 5.0)].state, TileState::InSetup);
        let coarse = &tiles[&tile(0, 0, 0, 10.0)];
        assert_eq!(coarse.state, TileState::Visible);
        assert!((coarse.masks.unsigned_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_masks_tile_the_viewport_exactly_once() {
        // two target tiles plus the coarse background: the union of all
        // visible masks must cover the view rectangle with no overlap
        let mut tiles = BTreeMap::new();
        insert(&mut tiles, tile(0, 0, 0, 10.0));
        insert(&mut tiles, tile(0, 0, 1, 5.0));
        insert(&mut tiles, tile(1, 1, 1, 5.0));
        let ready = all_ready(&tiles);
        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        let mut total = MultiPolygon::new(vec![]);
        let mut area_sum = 0.0;
        for wrapper in tiles.values() {
            if wrapper.state == TileState::Visible {
                area_sum += wrapper.masks.unsigned_area();
                total = union(&total, &wrapper.masks);
            }
        }
        // no pixel belongs to zero or two tiles
        assert!((total.unsigned_area() - 100.0).abs() < 1e-9);
        assert!((area_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_view_restriction_caches_offscreen_tiles() {
        let mut tiles = BTreeMap::new();
        // coarse tile entirely outside the view quadrilateral
        insert(&mut tiles, tile(5, 5, 0, 10.0));
        insert(&mut tiles, tile(0, 0, 1, 5.0));
        let ready = all_ready(&tiles);
        update_tile_masks(&mut tiles, &ready, 1, &view(), true);

        assert_eq!(tiles[&tile(5, 5, 0, 10.0)].state, TileState::Cached);
    }
}
