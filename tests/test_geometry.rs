//! Randomized checks of polygon classification and interior tiling

use fdtd_hsg::domain_decomposition::{Area, Partition};
use fdtd_hsg::geometry::{Point, Polygon};
use fdtd_hsg::settings::Settings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

#[test]
fn test_rectangle_classification_matches_bounds() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let (x0, x1) = (rng.gen_range(-1.0..0.0), rng.gen_range(0.1..1.0));
        let (y0, y1) = (rng.gen_range(-1.0..0.0), rng.gen_range(0.1..1.0));
        let rect = Polygon::from_points(&[Point::new(x0, y0), Point::new(x1, y1)]).unwrap();
        for _ in 0..200 {
            let (x, y) = (rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5));
            // skip points on the boundary where the crossing rule is one-sided
            if [x - x0, x - x1, y - y0, y - y1].iter().any(|d| d.abs() < 1e-9) {
                continue;
            }
            let expected = x > x0 && x < x1 && y > y0 && y < y1;
            assert_eq!(rect.contains(x, y), expected, "({x}, {y}) in [{x0}, {x1}] x [{y0}, {y1}]");
        }
    }
}

#[test]
fn test_regular_polygon_between_inscribed_and_circumscribed_circles() {
    let mut rng = StdRng::seed_from_u64(11);
    for sides in 3..12 {
        let radius = rng.gen_range(0.2..0.8);
        let rotation = rng.gen_range(0.0..PI);
        let vertices: Vec<Point> = (0..sides)
            .map(|k| {
                let a = rotation + 2.0 * PI * k as f64 / sides as f64;
                Point::new(radius * a.cos(), radius * a.sin())
            })
            .collect();
        let polygon = Polygon::from_points(&vertices).unwrap();
        let inscribed = radius * (PI / sides as f64).cos();

        for _ in 0..300 {
            let r = rng.gen_range(0.0..1.5 * radius);
            let a = rng.gen_range(0.0..2.0 * PI);
            let (x, y) = (r * a.cos(), r * a.sin());
            if r < 0.999 * inscribed {
                assert!(polygon.contains(x, y), "{sides} sides, r = {r}");
            } else if r > 1.001 * radius {
                assert!(!polygon.contains(x, y), "{sides} sides, r = {r}");
            }
        }
    }
}

#[test]
fn test_concave_polygon_notch() {
    // a U shape: the notch between the arms is outside
    let u = Polygon::from_points(&[
        Point::new(0.0, 0.0),
        Point::new(3.0, 0.0),
        Point::new(3.0, 3.0),
        Point::new(2.0, 3.0),
        Point::new(2.0, 1.0),
        Point::new(1.0, 1.0),
        Point::new(1.0, 3.0),
        Point::new(0.0, 3.0),
    ])
    .unwrap();
    assert!(u.contains(0.5, 2.5));
    assert!(u.contains(2.5, 2.5));
    assert!(u.contains(1.5, 0.5));
    assert!(!u.contains(1.5, 2.0));
    assert!(!u.contains(3.5, 0.5));
}

#[test]
fn test_partition_tiles_interior_exactly_once() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..40 {
        let settings = Settings {
            cells_x: rng.gen_range(8..60),
            cells_y: rng.gen_range(8..60),
            pml_layers: rng.gen_range(2..8),
            ..Default::default()
        };
        let p = settings.pml_layers;
        let interior = Area::new(p, p + settings.cells_x, p, p + settings.cells_y);

        // a few disjoint footprints, kept apart by construction
        let mut footprints: Vec<Area> = Vec::new();
        for _ in 0..rng.gen_range(0..4) {
            let w = rng.gen_range(3..6);
            let h = rng.gen_range(3..6);
            if settings.cells_x < w + 2 || settings.cells_y < h + 2 {
                continue;
            }
            let i = rng.gen_range(interior.i_min..interior.i_max - w);
            let j = rng.gen_range(interior.j_min..interior.j_max - h);
            let candidate = Area::new(i, i + w, j, j + h);
            if footprints.iter().all(|f| !f.intersects(&candidate)) {
                footprints.push(candidate);
            }
        }

        let workers = rng.gen_range(1..10);
        let partition = Partition::new(&settings, &footprints, workers).unwrap();
        assert_eq!(partition.workers(), workers);

        let mut claims = vec![0usize; interior.cells()];
        for w in 0..workers {
            for area in partition.areas_of(w) {
                for (i, j) in area.indices() {
                    assert_eq!(partition.owner_of(i, j), Some(w));
                    claims[(i - p) * settings.cells_y + (j - p)] += 1;
                }
            }
        }
        assert!(claims.iter().all(|&c| c == 1));
    }
}
