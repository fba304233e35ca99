//! Material regions and their rasterization onto the staggered grid
//!
//! Each region is a polygon with constant relative permittivity,
//! permeability and conductivity. Rasterization tests three sample points
//! per interior cell: the Hz center for the permeability, the Ey edge
//! (half a cell along x) and the Ex edge (half a cell along y) for the
//! permittivity and conductivity. Later regions override earlier ones.
//!
//! The optional Yu-Mittra pass then blends the permittivity of the cells
//! straddling a region boundary by the sub-cell distance to that boundary.

use crate::constants::{EPSILON0, MU0};
use crate::engine::FieldArray;
use crate::error::{Result, SimError};
use crate::geometry::{Point, Polygon};
use crate::settings::{Differentials, Settings};
use ndarray::Zip;

/// User-facing material definition
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRegion {
    /// Polygon vertices, or two opposite corners of a rectangle
    pub points: Vec<Point>,
    pub eps_r: f64,
    pub mu_r: f64,
    /// Conductivity in S/m
    pub sigma: f64,
    /// Apply the Yu-Mittra permittivity blend at the boundary
    pub yu_mittra: bool,
}

impl Default for MaterialRegion {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            eps_r: 1.0,
            mu_r: 1.0,
            sigma: 0.0,
            yu_mittra: false,
        }
    }
}

impl MaterialRegion {
    pub fn new(points: Vec<Point>, eps_r: f64, mu_r: f64, sigma: f64) -> Self {
        Self { points, eps_r, mu_r, sigma, yu_mittra: false }
    }

    /// Builder-style toggle of the boundary blend
    pub fn with_yu_mittra(mut self, enabled: bool) -> Self {
        self.yu_mittra = enabled;
        self
    }

    /// Validate the region and expand it to its polygon
    pub fn resolve(&self) -> Result<ResolvedMaterial> {
        if !(self.eps_r > 0.0 && self.mu_r > 0.0 && self.sigma >= 0.0) {
            return Err(SimError::InvalidMaterial(format!(
                "need eps_r > 0, mu_r > 0 and sigma >= 0, got {}, {}, {}",
                self.eps_r, self.mu_r, self.sigma
            )));
        }
        if self.yu_mittra && (self.sigma != 0.0 || self.mu_r != 1.0) {
            return Err(SimError::InvalidMaterial(
                "Yu-Mittra blending requires sigma = 0 and mu_r = 1".to_string(),
            ));
        }
        Ok(ResolvedMaterial {
            polygon: Polygon::from_points(&self.points)?,
            eps: self.eps_r * EPSILON0,
            mu: self.mu_r * MU0,
            sigma: self.sigma,
            yu_mittra: self.yu_mittra,
        })
    }
}

/// A material with absolute constants and its polygon
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMaterial {
    pub polygon: Polygon,
    pub eps: f64,
    pub mu: f64,
    pub sigma: f64,
    pub yu_mittra: bool,
}

/// Constants at one sample point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSample {
    pub eps: f64,
    pub mu: f64,
    pub sigma: f64,
}

impl Default for MaterialSample {
    fn default() -> Self {
        Self { eps: EPSILON0, mu: MU0, sigma: 0.0 }
    }
}

/// Resolve every region, keeping their order
pub fn resolve_materials(regions: &[MaterialRegion]) -> Result<Vec<ResolvedMaterial>> {
    regions.iter().map(MaterialRegion::resolve).collect()
}

/// Last region containing `(x, y)` wins, vacuum otherwise
pub fn sample_at(materials: &[ResolvedMaterial], x: f64, y: f64) -> Option<&ResolvedMaterial> {
    materials.iter().rev().find(|m| m.polygon.contains(x, y))
}

/// Per-cell constants of the coarse grid
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialGrid {
    /// Permittivity at the Ex points
    pub eps_ex: FieldArray,
    /// Permittivity at the Ey points
    pub eps_ey: FieldArray,
    /// Permeability at the Hz points
    pub mu_hz: FieldArray,
    pub sigma_ex: FieldArray,
    pub sigma_ey: FieldArray,
}

impl MaterialGrid {
    /// Vacuum everywhere
    pub fn try_vacuum(shape: (usize, usize)) -> Result<Self> {
        Ok(Self {
            eps_ex: FieldArray::try_from_scalar(shape, EPSILON0)?,
            eps_ey: FieldArray::try_from_scalar(shape, EPSILON0)?,
            mu_hz: FieldArray::try_from_scalar(shape, MU0)?,
            sigma_ex: FieldArray::try_zeros(shape)?,
            sigma_ey: FieldArray::try_zeros(shape)?,
        })
    }

    /// Build the grid for `settings`, rasterize and blend
    pub fn build(settings: &Settings, d: &Differentials, materials: &[ResolvedMaterial]) -> Result<Self> {
        let mut grid = Self::try_vacuum((settings.total_x(), settings.total_y()))?;
        grid.rasterize(settings, d, materials);
        for material in materials.iter().filter(|m| m.yu_mittra) {
            grid.apply_yu_mittra(settings, d, &material.polygon);
        }
        Ok(grid)
    }

    /// Paint the interior cells, later materials overriding earlier ones
    pub fn rasterize(&mut self, settings: &Settings, d: &Differentials, materials: &[ResolvedMaterial]) {
        if materials.is_empty() {
            return;
        }
        let (dx, dy) = (d.dx, d.dy);
        let pml = settings.pml_layers as f64;
        let half_x = settings.cells_x as f64 / 2.0;
        let half_y = settings.cells_y as f64 / 2.0;

        Zip::indexed(&mut self.mu_hz.data)
            .and(&mut self.eps_ex.data)
            .and(&mut self.eps_ey.data)
            .and(&mut self.sigma_ex.data)
            .and(&mut self.sigma_ey.data)
            .par_for_each(|(i, j), mu, eps_ex, eps_ey, sigma_ex, sigma_ey| {
                if !settings.is_interior(i, j) {
                    return;
                }
                let x = (i as f64 - pml - half_x + 0.5) * dx;
                let y = (j as f64 - pml - half_y + 0.5) * dy;

                if let Some(m) = sample_at(materials, x, y) {
                    *mu = m.mu;
                }
                if let Some(m) = sample_at(materials, x + dx / 2.0, y) {
                    *eps_ey = m.eps;
                    *sigma_ey = m.sigma;
                }
                if let Some(m) = sample_at(materials, x, y + dy / 2.0) {
                    *eps_ex = m.eps;
                    *sigma_ex = m.sigma;
                }
            });
    }

    /// Blend the permittivity next to the boundary of `polygon`
    ///
    /// A boundary crossing less than one cell from a Hz point along x
    /// redistributes `eps_ex` between the two neighbouring columns weighted
    /// by the sub-cell distances; crossings along y do the same for
    /// `eps_ey` between rows. Runs in place, in index order, so a cell
    /// may see a value blended earlier in the same pass.
    pub fn apply_yu_mittra(&mut self, settings: &Settings, d: &Differentials, polygon: &Polygon) {
        let (dx, dy) = (d.dx, d.dy);
        let pml = settings.pml_layers;
        let half_x = settings.cells_x as f64 / 2.0;
        let half_y = settings.cells_y as f64 / 2.0;
        let eps_ex = &mut self.eps_ex.data;
        let eps_ey = &mut self.eps_ey.data;

        for i in pml..pml + settings.cells_x {
            for j in pml..pml + settings.cells_y {
                let x = (i as f64 + 0.5 - pml as f64 - half_x) * dx;
                let y = (j as f64 + 0.5 - pml as f64 - half_y) * dy;
                let distance_x = polygon.distance_x(x, y);
                let distance_y = polygon.distance_y(x, y);

                if distance_x.abs() < dx {
                    let d1 = distance_x.abs();
                    let d2 = dx - d1;
                    if distance_x > 0.0 {
                        if d1 <= dx / 2.0 {
                            eps_ex[[i + 1, j]] = (d1 * eps_ex[[i, j]] + d2 * eps_ex[[i + 1, j]]) / dx;
                        } else {
                            eps_ex[[i + 1, j]] = (d1 * eps_ex[[i + 1, j]] + d2 * eps_ex[[i + 2, j]]) / dx;
                        }
                    } else if d1 < dx / 2.0 {
                        eps_ex[[i, j]] = (d2 * eps_ex[[i, j]] + d1 * eps_ex[[i + 1, j]]) / dx;
                    } else {
                        eps_ex[[i, j]] = (d2 * eps_ex[[i - 1, j]] + d1 * eps_ex[[i, j]]) / dx;
                    }
                }

                if distance_y.abs() < dy {
                    let d1 = distance_y.abs();
                    let d2 = dy - d1;
                    if distance_y < 0.0 {
                        if d1 < dy / 2.0 {
                            eps_ey[[i, j]] = (d2 * eps_ey[[i, j]] + d1 * eps_ey[[i, j + 1]]) / dy;
                        } else {
                            eps_ey[[i, j]] = (d2 * eps_ey[[i, j - 1]] + d1 * eps_ey[[i, j]]) / dy;
                        }
                    } else if d1 <= dy / 2.0 {
                        eps_ey[[i, j + 1]] = (d1 * eps_ey[[i, j]] + d2 * eps_ey[[i, j + 1]]) / dy;
                    } else {
                        eps_ey[[i, j + 1]] = (d1 * eps_ey[[i, j + 1]] + d2 * eps_ey[[i, j + 2]]) / dy;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> Settings {
        Settings { cells_x: 20, cells_y: 20, pml_layers: 5, ..Default::default() }
    }

    fn slab(eps_r: f64) -> MaterialRegion {
        MaterialRegion::new(vec![Point::new(-0.2, -0.2), Point::new(0.2, 0.2)], eps_r, 1.0, 0.0)
    }

    #[test]
    fn test_rasterize_rectangle() {
        let s = settings();
        let d = s.differentials();
        let materials = resolve_materials(&[slab(4.0)]).unwrap();
        let grid = MaterialGrid::build(&s, &d, &materials).unwrap();

        // cell 15 centers at x = 0.025, inside the slab
        assert_relative_eq!(grid.eps_ex.data[[15, 15]], 4.0 * EPSILON0);
        assert_relative_eq!(grid.eps_ey.data[[15, 15]], 4.0 * EPSILON0);
        assert_relative_eq!(grid.mu_hz.data[[15, 15]], MU0);
        // outside the slab and in the PML rim
        assert_relative_eq!(grid.eps_ex.data[[6, 15]], EPSILON0);
        assert_relative_eq!(grid.eps_ex.data[[2, 2]], EPSILON0);
    }

    #[test]
    fn test_later_material_overrides() {
        let s = settings();
        let d = s.differentials();
        let lossy = MaterialRegion::new(
            vec![Point::new(-0.1, -0.1), Point::new(0.1, 0.1)],
            2.0,
            3.0,
            0.5,
        );
        let materials = resolve_materials(&[slab(4.0), lossy]).unwrap();
        let grid = MaterialGrid::build(&s, &d, &materials).unwrap();
        assert_relative_eq!(grid.eps_ex.data[[15, 15]], 2.0 * EPSILON0);
        assert_relative_eq!(grid.sigma_ey.data[[15, 15]], 0.5);
        assert_relative_eq!(grid.mu_hz.data[[15, 15]], 3.0 * MU0);
        // only the outer slab covers cell 18 (x = 0.175)
        assert_relative_eq!(grid.eps_ex.data[[18, 15]], 4.0 * EPSILON0);
    }

    #[test]
    fn test_yu_mittra_eligibility() {
        let lossy = MaterialRegion { sigma: 1.0, ..slab(2.0) }.with_yu_mittra(true);
        assert!(matches!(lossy.resolve(), Err(SimError::InvalidMaterial(_))));
        let magnetic = MaterialRegion { mu_r: 2.0, ..slab(2.0) }.with_yu_mittra(true);
        assert!(magnetic.resolve().is_err());
        assert!(slab(2.0).with_yu_mittra(true).resolve().is_ok());
        let open = MaterialRegion::new(vec![Point::new(0.0, 0.0)], 1.0, 1.0, 0.0);
        assert!(open.resolve().is_err());
    }

    #[test]
    fn test_yu_mittra_blends_between_bounds() {
        let s = settings();
        let d = s.differentials();
        // left and bottom edges sit just past the Hz points at -0.175
        let region = MaterialRegion::new(
            vec![Point::new(-0.16, -0.17), Point::new(0.12, 0.14)],
            4.0,
            1.0,
            0.0,
        );
        let plain = MaterialGrid::build(&s, &d, &resolve_materials(&[region.clone()]).unwrap()).unwrap();
        let blended = MaterialGrid::build(
            &s,
            &d,
            &resolve_materials(&[region.with_yu_mittra(true)]).unwrap(),
        )
        .unwrap();

        for (plain, blended) in [(&plain.eps_ex, &blended.eps_ex), (&plain.eps_ey, &blended.eps_ey)] {
            let mut changed = 0;
            for (p, b) in plain.data.iter().zip(blended.data.iter()) {
                assert!(*b >= EPSILON0 * (1.0 - 1e-12) && *b <= 4.0 * EPSILON0 * (1.0 + 1e-12));
                if (p - b).abs() > 1e-24 {
                    changed += 1;
                }
            }
            assert!(changed > 0);
        }
        // d1 = 0.015 of a 0.05 cell: column 12 mixes vacuum from column 11
        let expected = (0.015 * EPSILON0 + 0.035 * 4.0 * EPSILON0) / 0.05;
        assert_relative_eq!(blended.eps_ex.data[[12, 15]], expected, max_relative = 1e-9);
        // deep inside nothing moves
        assert_relative_eq!(blended.eps_ex.data[[15, 15]], 4.0 * EPSILON0);
    }
}
