//! Split-field perfectly matched layer
//!
//! The rim is cut into eight regions (four corners, four edges) that keep
//! one cell clear of the array border for the conducting wall. Inside a
//! region Hz is split into Hzx and Hzy, each damped by the conductivity
//! profile of its own axis. Profiles grow polynomially with depth; the
//! `*2` profiles are sampled half a cell further out.

use crate::constants::{EPSILON0, MU0};
use crate::domain::domain_trait::{FieldUpdate, StepSlots};
use crate::domain_decomposition::Area;
use crate::error::Result;
use crate::settings::{Differentials, Settings};
use ndarray::Array2;

/// Which graded profile damps a component, and at which depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loss {
    Lossless,
    /// Profile sampled on cell boundaries
    Aligned(Depth),
    /// Profile sampled half a cell further out
    Shifted(Depth),
}

/// Depth index inside a region, measured from one of its sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    FromLow,
    FromHigh,
}

/// Per-axis loss selection of one region
#[derive(Debug, Clone, Copy)]
struct RegionLosses {
    ex: Loss,
    ey: Loss,
    hzy: Loss,
    hzx: Loss,
}

/// Losses per region id, 0..8 from the lower left corner row by row
const LOSSES: [RegionLosses; 8] = {
    use Depth::*;
    use Loss::*;
    [
        RegionLosses { ex: Aligned(FromHigh), ey: Aligned(FromHigh), hzy: Shifted(FromHigh), hzx: Shifted(FromHigh) },
        RegionLosses { ex: Aligned(FromHigh), ey: Lossless, hzy: Shifted(FromHigh), hzx: Lossless },
        RegionLosses { ex: Aligned(FromHigh), ey: Shifted(FromLow), hzy: Shifted(FromHigh), hzx: Aligned(FromLow) },
        RegionLosses { ex: Lossless, ey: Aligned(FromHigh), hzy: Lossless, hzx: Shifted(FromHigh) },
        RegionLosses { ex: Lossless, ey: Shifted(FromLow), hzy: Lossless, hzx: Aligned(FromLow) },
        RegionLosses { ex: Shifted(FromLow), ey: Aligned(FromHigh), hzy: Aligned(FromLow), hzx: Shifted(FromHigh) },
        RegionLosses { ex: Shifted(FromLow), ey: Lossless, hzy: Aligned(FromLow), hzx: Lossless },
        RegionLosses { ex: Shifted(FromLow), ey: Shifted(FromLow), hzy: Aligned(FromLow), hzx: Aligned(FromLow) },
    ]
};

/// Graded conductivity profile along one axis
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub aligned: Vec<f64>,
    pub shifted: Vec<f64>,
}

impl Profile {
    /// `sigma(k) = ((k + offset) / (layers - 1))^m * sigma_max`
    pub fn graded(layers: usize, grading: f64, sigma_max: f64) -> Self {
        let scale = (layers - 1) as f64;
        let sample = |offset: f64| {
            (0..layers)
                .map(|k| ((k as f64 + offset) / scale).powf(grading) * sigma_max)
                .collect()
        };
        Self { aligned: sample(0.0), shifted: sample(0.5) }
    }

    #[inline]
    fn pick(&self, loss: Loss, low: usize, high: usize) -> f64 {
        let depth = |d: Depth| match d {
            Depth::FromLow => low,
            Depth::FromHigh => high,
        };
        match loss {
            Loss::Lossless => 0.0,
            Loss::Aligned(d) => self.aligned[depth(d)],
            Loss::Shifted(d) => self.shifted[depth(d)],
        }
    }
}

/// One rim region and its split Hz accumulators
#[derive(Debug, Clone)]
pub struct PmlRegion {
    pub id: usize,
    pub area: Area,
    pub hzx: Array2<f64>,
    pub hzy: Array2<f64>,
}

/// Boundary engine owning the whole PML rim
#[derive(Debug)]
pub struct PmlBoundary {
    regions: Vec<PmlRegion>,
    sigma_x: Profile,
    sigma_y: Profile,
    d: Differentials,
}

impl PmlBoundary {
    pub fn new(settings: &Settings, d: Differentials) -> Result<Self> {
        let regions = Self::define_regions(settings)
            .into_iter()
            .enumerate()
            .map(|(id, area)| {
                let shape = (area.i_max - area.i_min, area.j_max - area.j_min);
                PmlRegion { id, area, hzx: Array2::zeros(shape), hzy: Array2::zeros(shape) }
            })
            .collect();
        let layers = settings.pml_layers;
        Ok(Self {
            regions,
            sigma_x: Profile::graded(layers, settings.grading, settings.sigma_x_max),
            sigma_y: Profile::graded(layers, settings.grading, settings.sigma_y_max),
            d,
        })
    }

    /// The eight rim rectangles, keeping the outermost ring for the wall
    pub fn define_regions(settings: &Settings) -> [Area; 8] {
        let p = settings.pml_layers;
        let (cx, cy) = (settings.cells_x, settings.cells_y);
        let (left, middle_x, right) = ((1, p), (p, p + cx), (p + cx, 2 * p + cx - 1));
        let (bottom, middle_y, top) = ((1, p), (p, p + cy), (p + cy, 2 * p + cy - 1));
        let area = |(i0, i1): (usize, usize), (j0, j1): (usize, usize)| Area::new(i0, i1, j0, j1);
        [
            area(left, bottom),
            area(middle_x, bottom),
            area(right, bottom),
            area(left, middle_y),
            area(right, middle_y),
            area(left, top),
            area(middle_x, top),
            area(right, top),
        ]
    }

    pub fn regions(&self) -> &[PmlRegion] {
        &self.regions
    }

    pub fn sigma_x(&self) -> &Profile {
        &self.sigma_x
    }

    pub fn sigma_y(&self) -> &Profile {
        &self.sigma_y
    }
}

/// Depth of `(i, j)` from the low and high side of `area` along each axis
#[inline]
fn depths(area: &Area, i: usize, j: usize) -> ((usize, usize), (usize, usize)) {
    ((i - area.i_min, area.i_max - i - 1), (j - area.j_min, area.j_max - j - 1))
}

impl FieldUpdate for PmlBoundary {
    fn update_e(&mut self, slots: &StepSlots) -> bool {
        let StepSlots { old, new, .. } = *slots;
        let Differentials { dx, dy, dt } = self.d;
        let e_coefficients = |s: f64| {
            ((2.0 * EPSILON0 - dt * s) / (2.0 * EPSILON0 + dt * s), 2.0 * dt / (2.0 * EPSILON0 + dt * s))
        };

        for region in &self.regions {
            let losses = LOSSES[region.id];
            let area = region.area;
            for i in area.i_min..area.i_max {
                for j in area.j_min..area.j_max {
                    let ((i0, i1), (j0, j1)) = depths(&area, i, j);
                    // SAFETY: the rim belongs to this engine alone and
                    // the E phase reads only the previous slot
                    unsafe {
                        let (c1, c2) = e_coefficients(self.sigma_y.pick(losses.ex, j0, j1));
                        let curl = (old.hz.get(i, j + 1) - old.hz.get(i, j)) / dy;
                        new.ex.set(i, j, c1 * old.ex.get(i, j) + c2 * curl);

                        let (c1, c2) = e_coefficients(self.sigma_x.pick(losses.ey, i0, i1));
                        let curl = (old.hz.get(i + 1, j) - old.hz.get(i, j)) / dx;
                        new.ey.set(i, j, c1 * old.ey.get(i, j) - c2 * curl);
                    }
                }
            }
        }
        true
    }

    fn update_h(&mut self, slots: &StepSlots) {
        let new = slots.new;
        let Differentials { dx, dy, dt } = self.d;
        let z1 = MU0 / EPSILON0;
        let h_coefficients = |s: f64| {
            (
                (2.0 * MU0 - dt * s * z1) / (2.0 * MU0 + dt * s * z1),
                2.0 * dt / (2.0 * MU0 + dt * s * z1),
            )
        };

        for region in &mut self.regions {
            let losses = LOSSES[region.id];
            let area = region.area;
            for i in area.i_min..area.i_max {
                for j in area.j_min..area.j_max {
                    let ((i0, i1), (j0, j1)) = depths(&area, i, j);
                    // SAFETY: E is final after the first barrier
                    unsafe {
                        let (c1, c2) = h_coefficients(self.sigma_y.pick(losses.hzy, j0, j1));
                        let hzy = &mut region.hzy[[i0, j0]];
                        *hzy = c1 * *hzy + c2 * (new.ex.get(i, j) - new.ex.get(i, j - 1)) / dy;

                        let (c1, c2) = h_coefficients(self.sigma_x.pick(losses.hzx, i0, i1));
                        let hzx = &mut region.hzx[[i0, j0]];
                        *hzx = c1 * *hzx - c2 * (new.ey.get(i, j) - new.ey.get(i - 1, j)) / dx;

                        new.hz.set(i, j, region.hzx[[i0, j0]] + region.hzy[[i0, j0]]);
                    }
                }
            }
        }
    }

    fn areas(&self) -> Vec<Area> {
        self.regions.iter().map(|r| r.area).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::array::try_field_sets;
    use crate::engine::RawSlot;
    use approx::assert_relative_eq;

    fn settings() -> Settings {
        Settings { cells_x: 12, cells_y: 8, pml_layers: 4, ..Default::default() }
    }

    #[test]
    fn test_profiles() {
        let p = Profile::graded(4, 2.0, 9.0);
        assert_eq!(p.aligned, vec![0.0, 1.0, 4.0, 9.0]);
        assert_relative_eq!(p.shifted[0], 0.25);
        assert_relative_eq!(p.shifted[3], 12.25);
    }

    #[test]
    fn test_regions_tile_rim() {
        let s = settings();
        let regions = PmlBoundary::define_regions(&s);
        let (nx, ny) = (s.total_x(), s.total_y());
        let mut claims = vec![0; nx * ny];
        for area in &regions {
            for (i, j) in area.indices() {
                claims[i * ny + j] += 1;
            }
        }
        for i in 0..nx {
            for j in 0..ny {
                let wall = i == 0 || j == 0 || i == nx - 1 || j == ny - 1;
                let expected = usize::from(!wall && !s.is_interior(i, j));
                assert_eq!(claims[i * ny + j], expected, "cell ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_lossless_edge_component_matches_vacuum() {
        let s = settings();
        let d = s.differentials();
        let mut boundary = PmlBoundary::new(&s, d).unwrap();
        let mut sets = try_field_sets(4, (s.total_x(), s.total_y())).unwrap();
        // bottom edge region: Ey is not damped there
        let (i, j) = (8, 2);
        sets[3].hz.data[[i + 1, j]] = 1.0;
        let ring: Vec<RawSlot> = sets.iter_mut().map(RawSlot::of).collect();
        let slots = StepSlots::at(0, &ring);
        boundary.update_e(&slots);
        boundary.update_h(&slots);
        assert_relative_eq!(sets[0].ey.data[[i, j]], -d.dt / EPSILON0 / d.dx, max_relative = 1e-12);
        // the wall stays untouched
        assert!(sets[0].ex.data.row(0).iter().all(|&v| v == 0.0));
        assert!(sets[0].hz.data.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_damping_drains_energy() {
        let s = Settings { cells_x: 10, cells_y: 10, pml_layers: 8, sigma_x_max: 5.0, sigma_y_max: 5.0, ..Default::default() };
        let d = s.differentials();
        let mut boundary = PmlBoundary::new(&s, d).unwrap();
        let mut sets = try_field_sets(4, (s.total_x(), s.total_y())).unwrap();
        sets[3].ex.data[[2, 2]] = 1.0;
        let ring: Vec<RawSlot> = sets.iter_mut().map(RawSlot::of).collect();
        for n in 0..200 {
            let slots = StepSlots::at(n, &ring);
            boundary.update_e(&slots);
            boundary.update_h(&slots);
        }
        let last = &sets[199 % 4];
        let peak = last.ex.data.iter().chain(last.hz.data.iter()).fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 1.0, "peak {peak}");
    }
}
