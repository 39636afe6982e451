use serde::{Deserialize, Serialize};

/// Represents a point in a layer's coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A rectangle in layer coordinates, spanned by its top-left and bottom-right
/// corners.
///
/// Unlike a screen-space bounding box this is NOT normalized: depending on the
/// layer's axis orientation `top_left.x` may be greater than `bottom_right.x`
/// (and likewise for y). Orientation is queried via [`RectBounds::is_left_to_right`]
/// and [`RectBounds::is_top_to_bottom`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectBounds {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl RectBounds {
    pub fn new(top_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Creates bounds from individual corner coordinates
    pub fn from_coords(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(Point::new(left, top), Point::new(right, bottom))
    }

    /// Signed width; negative when the layer runs right-to-left
    pub fn width(&self) -> f64 {
        self.bottom_right.x - self.top_left.x
    }

    /// Signed height; negative when the layer runs bottom-to-top
    pub fn height(&self) -> f64 {
        self.bottom_right.y - self.top_left.y
    }

    pub fn is_left_to_right(&self) -> bool {
        self.top_left.x < self.bottom_right.x
    }

    pub fn is_top_to_bottom(&self) -> bool {
        self.top_left.y < self.bottom_right.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.top_left.x + self.bottom_right.x) / 2.0,
            (self.top_left.y + self.bottom_right.y) / 2.0,
        )
    }

    /// Checks whether the bounds contain a point, regardless of orientation
    pub fn contains(&self, point: &Point) -> bool {
        let (min_x, max_x) = if self.is_left_to_right() {
            (self.top_left.x, self.bottom_right.x)
        } else {
            (self.bottom_right.x, self.top_left.x)
        };
        let (min_y, max_y) = if self.is_top_to_bottom() {
            (self.top_left.y, self.bottom_right.y)
        } else {
            (self.bottom_right.y, self.top_left.y)
        };
        point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y
    }

    /// Clamps a point into the bounds, regardless of orientation
    pub fn clamp(&self, point: &Point) -> Point {
        let x = if self.is_left_to_right() {
            point.x.clamp(self.top_left.x, self.bottom_right.x)
        } else {
            point.x.clamp(self.bottom_right.x, self.top_left.x)
        };
        let y = if self.is_top_to_bottom() {
            point.y.clamp(self.top_left.y, self.bottom_right.y)
        } else {
            point.y.clamp(self.bottom_right.y, self.top_left.y)
        };
        Point::new(x, y)
    }

    /// Returns a copy grown outward by `amount` layer units on every side,
    /// respecting the axis orientation.
    pub fn padded(&self, amount: f64) -> RectBounds {
        let sign_x = if self.is_left_to_right() { 1.0 } else { -1.0 };
        let sign_y = if self.is_top_to_bottom() { 1.0 } else { -1.0 };
        RectBounds::new(
            Point::new(
                self.top_left.x - sign_x * amount,
                self.top_left.y - sign_y * amount,
            ),
            Point::new(
                self.bottom_right.x + sign_x * amount,
                self.bottom_right.y + sign_y * amount,
            ),
        )
    }
}

impl Default for RectBounds {
    fn default() -> Self {
        Self::new(Point::default(), Point::default())
    }
}

/// An arbitrary view quadrilateral in layer coordinates.
///
/// The 2D camera produces an axis-aligned quad, the 3D camera a perspective
/// one; the mask builder clips against it either way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadBounds {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl QuadBounds {
    pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Builds the axis-aligned quad spanned by a rectangle
    pub fn from_rect(rect: &RectBounds) -> Self {
        Self::new(
            rect.top_left,
            Point::new(rect.bottom_right.x, rect.top_left.y),
            rect.bottom_right,
            Point::new(rect.top_left.x, rect.bottom_right.y),
        )
    }

    /// Corner points in winding order
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }
}

impl Default for QuadBounds {
    fn default() -> Self {
        Self::from_rect(&RectBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_orientation() {
        let ltr = RectBounds::from_coords(0.0, 0.0, 10.0, 10.0);
        assert!(ltr.is_left_to_right());
        assert!(ltr.is_top_to_bottom());
        assert_eq!(ltr.width(), 10.0);

        // EPSG:4326-style layers run top-to-bottom in descending y
        let flipped = RectBounds::from_coords(-180.0, 90.0, 180.0, -90.0);
        assert!(flipped.is_left_to_right());
        assert!(!flipped.is_top_to_bottom());
        assert_eq!(flipped.height(), -180.0);
    }

    #[test]
    fn test_rect_contains_flipped_axis() {
        let bounds = RectBounds::from_coords(-180.0, 90.0, 180.0, -90.0);
        assert!(bounds.contains(&Point::new(8.0, 47.0)));
        assert!(!bounds.contains(&Point::new(200.0, 47.0)));
    }

    #[test]
    fn test_rect_clamp() {
        let bounds = RectBounds::from_coords(0.0, 10.0, 10.0, 0.0);
        let clamped = bounds.clamp(&Point::new(15.0, -3.0));
        assert_eq!(clamped, Point::new(10.0, 0.0));
    }

    #[test]
    fn test_rect_padding_respects_orientation() {
        let bounds = RectBounds::from_coords(0.0, 10.0, 10.0, 0.0);
        let padded = bounds.padded(1.0);
        assert_eq!(padded.top_left, Point::new(-1.0, 11.0));
        assert_eq!(padded.bottom_right, Point::new(11.0, -1.0));
    }

    #[test]
    fn test_quad_from_rect() {
        let rect = RectBounds::from_coords(0.0, 0.0, 4.0, 4.0);
        let quad = QuadBounds::from_rect(&rect);
        assert_eq!(quad.top_right, Point::new(4.0, 0.0));
        assert_eq!(quad.bottom_left, Point::new(0.0, 4.0));
    }
}
