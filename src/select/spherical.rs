//! 3D visibility selection: a breadth-first refinement over the globe.
//!
//! Candidates start at the coarsest usable level and subdivide until a tile
//! projects small enough on screen. Tiles behind the earth or outside the
//! frustum are culled, except on the kept (coarsest) level, which always
//! stays resident so the globe never shows holes.
//!
//! The altitude margins, FOV padding and sample size below are hand-tuned.
//! They trade pop-in against overdraw and should only be changed against
//! visual comparisons on a real globe scene.

use crate::core::coord::{Point, RectBounds};
use crate::core::tile::{PrioritizedTileInfo, TileInfo, VisibleTilesLayer};
use crate::core::zoom::{ZoomInfo, ZoomLevel};
use fxhash::FxHashSet;
use nalgebra::{Matrix4, Vector3, Vector4};
use std::collections::VecDeque;

/// Levels with at most this many tiles per axis are skipped as BFS roots
const MIN_NUM_TILES: i32 = 1;

/// Vertical margin (meters) applied around the focus altitude when culling
const HEIGHT_RANGE: f64 = 1000.0;

/// Precision probes sit this fraction of a tile away from the focus point
const SAMPLE_SIZE: f64 = 0.25;

/// Half of the field of view lies on each side of the view axis
const FOV_FACTOR: f64 = 0.5;

const EARTH_RADIUS: f64 = 6_378_137.0;

const MAX_TESSELLATION_FACTOR: i32 = 4;

/// Camera state handed to the selector on every 3D camera change
#[derive(Debug, Clone)]
pub struct CameraPose {
    /// Column-major view matrix
    pub view_matrix: [f64; 16],
    /// Column-major projection matrix
    pub projection_matrix: [f64; 16],
    /// Vertical field of view in degrees
    pub vertical_fov: f64,
    /// Horizontal field of view in degrees
    pub horizontal_fov: f64,
    /// Viewport size in pixels
    pub width: f64,
    pub height: f64,
    /// Altitude of the focus point in meters
    pub focus_point_altitude: f64,
    /// Focus point in layer coordinates (degrees)
    pub focus_point_position: Point,
    pub zoom: f64,
}

/// Result of a spherical selection run
#[derive(Debug, Clone)]
pub struct SphericalSelection {
    pub layers: Vec<VisibleTilesLayer>,
    /// Finest zoom identifier that was accepted anywhere on screen
    pub target_zoom_identifier: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Candidate {
    x: i32,
    y: i32,
    level_index: usize,
}

/// Maps layer coordinates (lon/lat degrees plus altitude in meters) onto the
/// unit sphere the camera matrices operate in
fn to_unit_sphere(point: &Point, altitude: f64) -> Vector4<f64> {
    let lon = point.x.to_radians();
    let lat = point.y.to_radians();
    let radius = 1.0 + altitude / EARTH_RADIUS;
    Vector4::new(
        radius * lat.cos() * lon.cos(),
        radius * lat.sin(),
        -radius * lat.cos() * lon.sin(),
        1.0,
    )
}

fn transform_to_view(point: &Point, altitude: f64, view: &Matrix4<f64>) -> Vector3<f64> {
    let v = view * to_unit_sphere(point, altitude);
    Vector3::new(v.x / v.w, v.y / v.w, v.z / v.w)
}

fn project_to_screen(point: &Vector3<f64>, projection: &Matrix4<f64>) -> Vector3<f64> {
    let v = projection * Vector4::new(point.x, point.y, point.z, 1.0);
    Vector3::new(v.x / v.w, v.y / v.w, v.z / v.w)
}

/// Horizontal and vertical view angles of a view-space point in degrees;
/// the view axis is -z
fn view_angles(point: &Vector3<f64>) -> (f64, f64) {
    (
        point.x.atan2(-point.z).to_degrees(),
        point.y.atan2(-point.z).to_degrees(),
    )
}

fn clamp_axis(value: f64, a: f64, b: f64) -> f64 {
    if a < b {
        value.clamp(a, b)
    } else {
        value.clamp(b, a)
    }
}

struct LevelGeometry {
    tile_width_adj: f64,
    tile_height_adj: f64,
    bounds_left: f64,
    bounds_top: f64,
}

impl LevelGeometry {
    fn new(level: &ZoomLevel) -> Self {
        let bounds_ratio = ((level.bounds.bottom_right.y - level.bounds.top_left.y)
            / (level.bounds.bottom_right.x - level.bounds.top_left.x))
            .abs();
        let tile_width = level.tile_width_layer_units;
        let tile_height = level.tile_width_layer_units * bounds_ratio;
        Self {
            tile_width_adj: if level.bounds.is_left_to_right() {
                tile_width
            } else {
                -tile_width
            },
            tile_height_adj: if level.bounds.is_top_to_bottom() {
                tile_height
            } else {
                -tile_height
            },
            bounds_left: level.bounds.top_left.x,
            bounds_top: level.bounds.top_left.y,
        }
    }

    fn top_left_of(&self, x: i32, y: i32) -> Point {
        Point::new(
            f64::from(x) * self.tile_width_adj + self.bounds_left,
            f64::from(y) * self.tile_height_adj + self.bounds_top,
        )
    }
}

pub fn select_visible_tiles(
    levels: &[ZoomLevel],
    zoom_info: &ZoomInfo,
    pose: &CameraPose,
) -> Option<SphericalSelection> {
    if pose.width <= 0.0 || pose.height <= 0.0 || levels.is_empty() {
        return None;
    }

    let view = Matrix4::from_column_slice(&pose.view_matrix);
    let projection = Matrix4::from_column_slice(&pose.projection_matrix);

    let keep_level_index = match levels
        .iter()
        .position(|l| l.num_tiles_x > MIN_NUM_TILES && l.num_tiles_y > MIN_NUM_TILES)
    {
        Some(index) => index,
        // every level is a single tile; fall back to the coarsest so an
        // underzoomed globe still has a background
        None if zoom_info.underzoom => 0,
        None => return None,
    };

    let mut queue: VecDeque<Candidate> = VecDeque::new();
    let mut enqueued: FxHashSet<Candidate> = FxHashSet::default();
    {
        let level = &levels[keep_level_index];
        for x in 0..level.num_tiles_x {
            for y in 0..level.num_tiles_y {
                queue.push_back(Candidate {
                    x,
                    y,
                    level_index: keep_level_index,
                });
            }
        }
    }

    let mut max_level = levels[keep_level_index].zoom_identifier;
    let max_level_available = levels.len() - 1;
    let focus = pose.focus_point_position;
    let focus_altitude = pose.focus_point_altitude;
    let earth_center_view = {
        let v = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        Vector3::new(v.x / v.w, v.y / v.w, v.z / v.w)
    };

    let mut accepted: Vec<(Candidate, PrioritizedTileInfo)> = Vec::new();
    let mut any_view_bounds = false;

    while let Some(candidate) = queue.pop_front() {
        enqueued.remove(&candidate);

        let level = &levels[candidate.level_index];
        let geometry = LevelGeometry::new(level);

        let top_left = geometry.top_left_of(candidate.x, candidate.y);
        let top_right = Point::new(top_left.x + geometry.tile_width_adj, top_left.y);
        let bottom_left = Point::new(top_left.x, top_left.y + geometry.tile_height_adj);
        let bottom_right = Point::new(
            top_left.x + geometry.tile_width_adj,
            top_left.y + geometry.tile_height_adj,
        );
        let tile_center = Point::new(
            (top_left.x + bottom_right.x) * 0.5,
            (top_left.y + bottom_right.y) * 0.5,
        );

        let low_altitude = focus_altitude - HEIGHT_RANGE / 2.0;
        let high_altitude = focus_altitude + HEIGHT_RANGE / 2.0;

        let focus_clamped = Point::new(
            clamp_axis(focus.x, top_left.x, top_right.x),
            clamp_axis(focus.y, top_left.y, bottom_left.y),
        );
        // probes step toward the tile interior so they stay inside it
        let to_right = focus_clamped.x < tile_center.x;
        let to_top = focus_clamped.y < tile_center.y;
        let step_x = if to_right {
            geometry.tile_width_adj
        } else {
            -geometry.tile_width_adj
        };
        let step_y = if to_top {
            -geometry.tile_height_adj
        } else {
            geometry.tile_height_adj
        };
        let sample_x = Point::new(focus_clamped.x + step_x * SAMPLE_SIZE, focus_clamped.y);
        let sample_y = Point::new(focus_clamped.x, focus_clamped.y + step_y * SAMPLE_SIZE);

        let corners_view = [
            transform_to_view(&top_left, focus_altitude, &view),
            transform_to_view(&top_right, low_altitude, &view),
            transform_to_view(&bottom_left, low_altitude, &view),
            transform_to_view(&bottom_right, low_altitude, &view),
        ];
        let corners_high_view = [
            transform_to_view(&top_left, high_altitude, &view),
            transform_to_view(&top_right, high_altitude, &view),
            transform_to_view(&bottom_left, high_altitude, &view),
            transform_to_view(&bottom_right, high_altitude, &view),
        ];

        let center_z = corners_view.iter().map(|v| v.z).sum::<f64>() / 4.0;
        let is_kept_level = candidate.level_index == keep_level_index;

        // behind the earth centre in depth on all corners: the tile is on
        // the far side of the globe
        if !is_kept_level
            && corners_view
                .iter()
                .all(|corner| (corner - earth_center_view).z < 0.0)
        {
            continue;
        }

        let focus_clamped_view = transform_to_view(&focus_clamped, focus_altitude, &view);
        let sample_origin_screen = project_to_screen(&focus_clamped_view, &projection);

        if !is_kept_level
            && (sample_origin_screen.x < -1.0
                || sample_origin_screen.x > 1.0
                || sample_origin_screen.y < -1.0
                || sample_origin_screen.y > 1.0)
        {
            let angles: Vec<(f64, f64)> = corners_view
                .iter()
                .chain(corners_high_view.iter())
                .map(view_angles)
                .collect();

            let v_limit = pose.vertical_fov * FOV_FACTOR;
            let h_limit = pose.horizontal_fov * FOV_FACTOR;
            if angles.iter().all(|(_, va)| *va < -v_limit)
                || angles.iter().all(|(ha, _)| *ha < -h_limit)
                || angles.iter().all(|(_, va)| *va > v_limit)
                || angles.iter().all(|(ha, _)| *ha > h_limit)
            {
                continue;
            }
        }

        any_view_bounds = true;

        let sample_x_screen =
            project_to_screen(&transform_to_view(&sample_x, focus_altitude, &view), &projection);
        let sample_y_screen =
            project_to_screen(&transform_to_view(&sample_y, focus_altitude, &view), &projection);

        let half_width = pose.width / 2.0;
        let half_height = pose.height / 2.0;
        let origin_px = (
            sample_origin_screen.x * half_width,
            sample_origin_screen.y * half_height,
        );
        let x_length_px = ((sample_x_screen.x * half_width - origin_px.0).powi(2)
            + (sample_x_screen.y * half_height - origin_px.1).powi(2))
        .sqrt();
        let y_length_px = ((sample_y_screen.x * half_width - origin_px.0).powi(2)
            + (sample_y_screen.y * half_height - origin_px.1).powi(2))
        .sqrt();

        let max_length = SAMPLE_SIZE
            * (pose.width.min(pose.height) * 0.5 / zoom_info.zoom_level_scale_factor);
        let precise_enough = x_length_px <= max_length && y_length_px <= max_length;
        let last_level = candidate.level_index == max_level_available;

        if precise_enough || last_level || is_kept_level {
            let rect = RectBounds::new(top_left, bottom_right);
            let priority = (-center_z * 100_000.0) as i32;
            accepted.push((
                candidate,
                PrioritizedTileInfo::new(
                    TileInfo::new(
                        rect,
                        candidate.x,
                        candidate.y,
                        0,
                        level.zoom_identifier,
                        level.zoom,
                    ),
                    priority,
                ),
            ));
            max_level = max_level.max(level.zoom_identifier);
        }

        if !precise_enough && !last_level {
            let child_geometry = LevelGeometry::new(&levels[candidate.level_index + 1]);
            let x_min = ((top_left.x - child_geometry.bounds_left) / child_geometry.tile_width_adj)
                .floor() as i32;
            let x_max = ((top_right.x - child_geometry.bounds_left)
                / child_geometry.tile_width_adj)
                .ceil() as i32
                - 1;
            let y_min = ((top_left.y - child_geometry.bounds_top) / child_geometry.tile_height_adj)
                .floor() as i32;
            let y_max = ((bottom_left.y - child_geometry.bounds_top)
                / child_geometry.tile_height_adj)
                .ceil() as i32
                - 1;
            for x in x_min..=x_max {
                for y in y_min..=y_max {
                    let child = Candidate {
                        x,
                        y,
                        level_index: candidate.level_index + 1,
                    };
                    if enqueued.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    if !any_view_bounds {
        return None;
    }

    // attach coarser ancestors so zoom transitions have fallback coverage
    let mut layers = Vec::new();
    let mut current = accepted;
    for offset in 0..=zoom_info.num_draw_previous_layers {
        let mut layer = VisibleTilesLayer::new(-offset);
        let mut parents: Vec<(Candidate, PrioritizedTileInfo)> = Vec::new();

        for (candidate, mut prioritized) in current {
            let tessellation =
                (max_level - prioritized.tile.zoom_identifier).clamp(0, MAX_TESSELLATION_FACTOR);
            prioritized.tile.tessellation_factor = tessellation as u8;
            layer.tiles.insert(prioritized);

            if candidate.level_index > 0 && offset < zoom_info.num_draw_previous_layers {
                let parent_level = &levels[candidate.level_index - 1];
                let parent_geometry = LevelGeometry::new(parent_level);
                let parent_x = ((prioritized.tile.bounds.top_left.x - parent_geometry.bounds_left)
                    / parent_geometry.tile_width_adj)
                    .floor() as i32;
                let parent_y = ((prioritized.tile.bounds.top_left.y - parent_geometry.bounds_top)
                    / parent_geometry.tile_height_adj)
                    .floor() as i32;
                let parent_top_left = parent_geometry.top_left_of(parent_x, parent_y);
                let parent_rect = RectBounds::new(
                    parent_top_left,
                    Point::new(
                        parent_top_left.x + parent_geometry.tile_width_adj,
                        parent_top_left.y + parent_geometry.tile_height_adj,
                    ),
                );
                let priority = offset * 100_000 + prioritized.priority;
                parents.push((
                    Candidate {
                        x: parent_x,
                        y: parent_y,
                        level_index: candidate.level_index - 1,
                    },
                    PrioritizedTileInfo::new(
                        TileInfo::new(
                            parent_rect,
                            parent_x,
                            parent_y,
                            0,
                            parent_level.zoom_identifier,
                            parent_level.zoom,
                        ),
                        priority,
                    ),
                ));
            }
        }

        current = parents;
        layers.push(layer);
    }

    Some(SphericalSelection {
        layers,
        target_zoom_identifier: max_level,
    })
}
