//! Subgrid region definitions
//!
//! A subgrid is a rectangle snapped up to the coarse lattice and refined by
//! integer ratios along x and y. Resolution yields the coarse index box the
//! fine grid replaces plus the one-cell coupling ring around it.

use crate::domain_decomposition::Area;
use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::{Differentials, Settings};

/// User-facing subgrid definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubgridDefinition {
    pub corner_a: Point,
    pub corner_b: Point,
    /// Fine cells per coarse cell along x
    pub x_ratio: usize,
    /// Fine cells per coarse cell along y
    pub y_ratio: usize,
}

impl Default for SubgridDefinition {
    fn default() -> Self {
        Self {
            corner_a: Point::new(-0.02, -0.02),
            corner_b: Point::new(0.02, 0.02),
            x_ratio: 1,
            y_ratio: 1,
        }
    }
}

impl SubgridDefinition {
    pub fn new(corner_a: Point, corner_b: Point, x_ratio: usize, y_ratio: usize) -> Self {
        Self { corner_a, corner_b, x_ratio, y_ratio }
    }

    /// Snap the rectangle to the coarse lattice and locate it on the grid
    pub fn resolve(&self, settings: &Settings, d: &Differentials) -> Result<SubgridPlacement> {
        let degenerate = || SimError::DegenerateRectangle {
            entity: "subgrid",
            x0: self.corner_a.x,
            y0: self.corner_a.y,
            x1: self.corner_b.x,
            y1: self.corner_b.y,
        };
        if Point::is_degenerate_rect(self.corner_a, self.corner_b) {
            return Err(degenerate());
        }
        if self.x_ratio == 0 || self.y_ratio == 0 {
            return Err(SimError::InvalidSettings(format!(
                "subgrid ratios must be at least 1, got {}x{}",
                self.x_ratio, self.y_ratio
            )));
        }
        let (lo, hi) = Point::normalize_corners(self.corner_a, self.corner_b);

        // lattice indices of the snapped corners, counted from the grid center
        let (kx0, ky0) = ((lo.x / d.dx).ceil(), (lo.y / d.dy).ceil());
        let (kx1, ky1) = ((hi.x / d.dx).ceil(), (hi.y / d.dy).ceil());
        let cells_x = (kx1 - kx0) as i64;
        let cells_y = (ky1 - ky0) as i64;
        // the fine layout keeps one coarse cell on either side as a half-cell rim
        if cells_x < 2 || cells_y < 2 {
            return Err(degenerate());
        }

        let i_min = (kx0 + settings.cells_x as f64 / 2.0 + settings.pml_layers as f64).floor() as i64;
        let j_min = (ky0 + settings.cells_y as f64 / 2.0 + settings.pml_layers as f64).floor() as i64;
        let i_max = i_min + cells_x - 1;
        let j_max = j_min + cells_y - 1;

        // the coupling ring must stay inside the interior grid
        let pml = settings.pml_layers as i64;
        let inside_x = i_min - 1 >= pml && i_max + 1 < pml + settings.cells_x as i64;
        let inside_y = j_min - 1 >= pml && j_max + 1 < pml + settings.cells_y as i64;
        if !(inside_x && inside_y) {
            return Err(SimError::OutsideGrid { entity: "subgrid", x: lo.x, y: lo.y });
        }

        Ok(SubgridPlacement {
            i_min: i_min as usize,
            i_max: i_max as usize,
            j_min: j_min as usize,
            j_max: j_max as usize,
            cells_x: cells_x as usize,
            cells_y: cells_y as usize,
            bottom_left: Point::new(kx0 * d.dx, ky0 * d.dy),
            top_right: Point::new(kx1 * d.dx, ky1 * d.dy),
            x_ratio: self.x_ratio,
            y_ratio: self.y_ratio,
        })
    }
}

/// A subgrid located on the coarse grid; index bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubgridPlacement {
    pub i_min: usize,
    pub i_max: usize,
    pub j_min: usize,
    pub j_max: usize,
    /// Coarse cells covered along x
    pub cells_x: usize,
    pub cells_y: usize,
    pub bottom_left: Point,
    pub top_right: Point,
    pub x_ratio: usize,
    pub y_ratio: usize,
}

impl SubgridPlacement {
    /// Coarse cells excluded from ordinary tiling: the box plus its coupling ring
    pub fn footprint(&self) -> Area {
        Area::new(self.i_min - 1, self.i_max + 2, self.j_min - 1, self.j_max + 2)
    }

    /// Whether coarse cell `(i, j)` lies in the refined box, upper bounds exclusive
    pub fn covers(&self, i: usize, j: usize) -> bool {
        (self.i_min..self.i_max).contains(&i) && (self.j_min..self.j_max).contains(&j)
    }
}
