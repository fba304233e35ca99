//! Physical-space points

/// A point in physical coordinates (meters, origin at the grid center)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Reorder two corners into (bottom-left, top-right)
    pub fn normalize_corners(a: Point, b: Point) -> (Point, Point) {
        (
            Point::new(a.x.min(b.x), a.y.min(b.y)),
            Point::new(a.x.max(b.x), a.y.max(b.y)),
        )
    }

    /// Whether the rectangle spanned by two corners has zero width or height
    pub fn is_degenerate_rect(a: Point, b: Point) -> bool {
        !((a.x - b.x).abs() > 0.0 && (a.y - b.y).abs() > 0.0)
    }
}
