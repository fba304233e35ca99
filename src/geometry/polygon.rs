//! Point-in-polygon classification and axis-aligned edge distances
//!
//! Material regions are rasterized by testing the staggered sample points
//! of every cell against a polygon with the even-odd crossing rule. The
//! signed distances along x and y feed the Yu-Mittra permittivity blend.

use crate::constants::FAR_DISTANCE;
use crate::error::{Result, SimError};
use crate::geometry::point::Point;

/// A closed polygon, vertices in drawing order
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// Build a polygon from a vertex list
    ///
    /// Two points describe an axis-aligned rectangle and are expanded to its
    /// four corners. Anything else needs at least three vertices.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        let vertices = match points {
            [p0, p1] => {
                if Point::is_degenerate_rect(*p0, *p1) {
                    return Err(SimError::DegenerateRectangle {
                        entity: "material",
                        x0: p0.x,
                        y0: p0.y,
                        x1: p1.x,
                        y1: p1.y,
                    });
                }
                vec![
                    Point::new(p0.x, p0.y),
                    Point::new(p0.x, p1.y),
                    Point::new(p1.x, p1.y),
                    Point::new(p1.x, p0.y),
                ]
            }
            _ if points.len() >= 3 => points.to_vec(),
            _ => {
                return Err(SimError::InvalidMaterial(format!(
                    "a polygon needs 2 (rectangle) or at least 3 points, got {}",
                    points.len()
                )))
            }
        };
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Iterate edges as (v[i], v[j]) with j the previous vertex, wrapping around
    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| {
            let j = if i == 0 { n - 1 } else { i - 1 };
            (self.vertices[i], self.vertices[j])
        })
    }

    /// Even-odd crossing test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for (vi, vj) in self.edges() {
            if (vi.y > y) != (vj.y > y) && x < (vj.x - vi.x) * (y - vi.y) / (vj.y - vi.y) + vi.x {
                inside = !inside;
            }
        }
        inside
    }

    /// Signed horizontal offset from `(x, y)` to the nearest exterior-facing edge
    ///
    /// Returns [`FAR_DISTANCE`] when the horizontal line through the point
    /// crosses no qualifying edge, which includes points inside convex shapes.
    pub fn distance_x(&self, x: f64, y: f64) -> f64 {
        let crossings = self.edges().filter_map(|(vi, vj)| {
            ((vi.y > y) != (vj.y > y))
                .then(|| (vj.x - vi.x) * (y - vi.y) / (vj.y - vi.y) + vi.x - x)
        });
        nearest_exterior(crossings)
    }

    /// Signed vertical offset from `(x, y)` to the nearest exterior-facing edge
    pub fn distance_y(&self, x: f64, y: f64) -> f64 {
        let crossings = self.edges().filter_map(|(vi, vj)| {
            ((vi.x > x) != (vj.x > x))
                .then(|| (vj.y - vi.y) * (x - vi.x) / (vj.x - vi.x) + vi.y - y)
        });
        nearest_exterior(crossings)
    }
}

/// Pick the smallest-magnitude offset on the exterior side
///
/// Every negative offset toggles the side; offsets are only considered
/// while the side flag says "exterior".
fn nearest_exterior(offsets: impl Iterator<Item = f64>) -> f64 {
    let mut exterior = true;
    let mut best = FAR_DISTANCE;
    let mut signed = FAR_DISTANCE;
    for d in offsets {
        if d < 0.0 {
            exterior = !exterior;
        }
        if exterior && d.abs() < best {
            best = d.abs();
            signed = d;
        }
    }
    signed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Polygon {
        Polygon::from_points(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_rectangle_expansion() {
        let square = unit_square();
        assert_eq!(square.vertices().len(), 4);
        assert_eq!(square.vertices()[1], Point::new(0.0, 1.0));
        assert_eq!(square.vertices()[3], Point::new(1.0, 0.0));
    }

    #[test]
    fn test_rejects_short_vertex_lists() {
        assert!(matches!(
            Polygon::from_points(&[Point::new(0.0, 0.0)]),
            Err(SimError::InvalidMaterial(_))
        ));
        assert!(matches!(
            Polygon::from_points(&[Point::new(0.0, 0.0), Point::new(0.0, 1.0)]),
            Err(SimError::DegenerateRectangle { .. })
        ));
    }

    #[test]
    fn test_contains_square() {
        let square = unit_square();
        assert!(square.contains(0.5, 0.5));
        assert!(!square.contains(1.5, 1.5));
        assert!(!square.contains(-0.1, 0.5));
    }

    #[test]
    fn test_contains_concave() {
        // L-shape
        let shape = Polygon::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 2.0),
            Point::new(0.0, 2.0),
        ])
        .unwrap();
        assert!(shape.contains(0.5, 1.5));
        assert!(shape.contains(1.5, 0.5));
        assert!(!shape.contains(1.5, 1.5));
    }

    #[test]
    fn test_distance_outside_square() {
        let square = unit_square();
        // Right of the square: nearest exterior edge is to the left
        assert_relative_eq!(square.distance_x(1.2, 0.5), -0.2, epsilon = 1e-12);
        // Left of the square: nearest edge is to the right
        assert_relative_eq!(square.distance_x(-0.3, 0.5), 0.3, epsilon = 1e-12);
        assert_relative_eq!(square.distance_y(0.5, 1.25), -0.25, epsilon = 1e-12);
        assert_relative_eq!(square.distance_y(0.5, -0.4), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_monotonic_away_from_edge() {
        let square = unit_square();
        let mut previous = 0.0;
        for k in 1..20 {
            let x = 1.0 + 0.05 * k as f64;
            let d = square.distance_x(x, 0.3).abs();
            assert!(d > previous);
            previous = d;
        }
    }

    #[test]
    fn test_distance_without_crossing() {
        let square = unit_square();
        assert_eq!(square.distance_x(0.5, 3.0), FAR_DISTANCE);
        assert_eq!(square.distance_y(3.0, 0.5), FAR_DISTANCE);
        // Inside a convex shape nothing qualifies either
        assert_eq!(square.distance_x(0.5, 0.5), FAR_DISTANCE);
    }
}
