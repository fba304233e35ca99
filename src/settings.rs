//! Grid configuration
//!
//! `Settings` is mutated only between runs. The derived cell pitch and
//! timestep come from [`Settings::differentials`].

use crate::constants::C0;
use crate::error::{Result, SimError};

/// Configuration of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Interior cells along x
    pub cells_x: usize,
    /// Interior cells along y
    pub cells_y: usize,
    /// Physical interior width in meters
    pub size_x: f64,
    /// Physical interior height in meters
    pub size_y: f64,
    /// Courant number, in (0, 1]
    pub courant: f64,
    /// Maximum PML conductivity along x
    pub sigma_x_max: f64,
    /// Maximum PML conductivity along y
    pub sigma_y_max: f64,
    /// Polynomial grading order of the PML profile
    pub grading: f64,
    /// Number of timesteps to run
    pub steps: usize,
    /// Total thread count: patch workers plus the boundary worker
    pub threads: usize,
    /// PML depth in cells
    pub pml_layers: usize,
    /// Output-buffer decimation stride
    pub sample_distance: usize,
    /// Live redraw cadence in steps (0 disables redraw hints)
    pub draw_every: usize,
    /// Viewport width hint for the renderer
    pub view_width: f64,
    /// Viewport height hint for the renderer
    pub view_height: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cells_x: 200,
            cells_y: 200,
            size_x: 1.0,
            size_y: 1.0,
            courant: 0.9999,
            sigma_x_max: 1.91,
            sigma_y_max: 1.91,
            grading: 3.5,
            steps: 500,
            threads: 8,
            pml_layers: 10,
            sample_distance: 1,
            draw_every: 0,
            view_width: 240.0,
            view_height: 180.0,
        }
    }
}

/// Derived cell pitch and timestep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Differentials {
    pub dx: f64,
    pub dy: f64,
    pub dt: f64,
}

impl Settings {
    /// Compute the cell pitch and the Courant-limited timestep
    pub fn differentials(&self) -> Differentials {
        let dx = self.size_x / self.cells_x as f64;
        let dy = self.size_y / self.cells_y as f64;
        let dt = self.courant / (1.0 / (dx * dx) + 1.0 / (dy * dy)).sqrt() / C0;
        Differentials { dx, dy, dt }
    }

    /// Reject configurations no run can start from
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SimError::InvalidSettings(msg));

        if self.cells_x == 0 || self.cells_y == 0 {
            return fail(format!(
                "cell counts must be positive, got {}x{}",
                self.cells_x, self.cells_y
            ));
        }
        if !(self.size_x > 0.0 && self.size_y > 0.0) {
            return fail(format!(
                "physical size must be positive, got {}x{}",
                self.size_x, self.size_y
            ));
        }
        if !(self.courant > 0.0 && self.courant <= 1.0) {
            return fail(format!("courant number {} outside (0, 1]", self.courant));
        }
        if self.threads == 0 {
            return fail("thread count must be positive".to_string());
        }
        if self.steps == 0 {
            return fail("step count must be positive".to_string());
        }
        if self.sample_distance == 0 {
            return fail("sample distance must be positive".to_string());
        }
        // The grading divides by (layers - 1) and the Yu-Mittra blend reaches
        // two cells past the interior.
        if self.pml_layers < 2 {
            return fail(format!("need at least 2 PML layers, got {}", self.pml_layers));
        }
        if !(self.sigma_x_max >= 0.0 && self.sigma_y_max >= 0.0 && self.grading >= 0.0) {
            return fail("PML conductivity and grading must be non-negative".to_string());
        }
        Ok(())
    }

    /// Full array extent along x, PML rim included
    pub fn total_x(&self) -> usize {
        self.cells_x + 2 * self.pml_layers
    }

    /// Full array extent along y, PML rim included
    pub fn total_y(&self) -> usize {
        self.cells_y + 2 * self.pml_layers
    }

    /// Number of decimated output samples
    pub fn samples(&self) -> usize {
        self.steps.div_ceil(self.sample_distance)
    }

    /// Fractional grid coordinate of a physical x position (origin at the grid center)
    pub fn grid_x(&self, x: f64, dx: f64) -> f64 {
        x / dx + self.cells_x as f64 / 2.0 + self.pml_layers as f64
    }

    /// Fractional grid coordinate of a physical y position (origin at the grid center)
    pub fn grid_y(&self, y: f64, dy: f64) -> f64 {
        y / dy + self.cells_y as f64 / 2.0 + self.pml_layers as f64
    }

    /// Physical x position of array column `i`
    pub fn physical_x(&self, i: f64, dx: f64) -> f64 {
        dx * (i - self.cells_x as f64 / 2.0 - self.pml_layers as f64)
    }

    /// Physical y position of array row `j`
    pub fn physical_y(&self, j: f64, dy: f64) -> f64 {
        dy * (j - self.cells_y as f64 / 2.0 - self.pml_layers as f64)
    }

    /// Whether `(i, j)` is an interior (non-PML) cell
    pub fn is_interior(&self, i: usize, j: usize) -> bool {
        let pml = self.pml_layers;
        (pml..pml + self.cells_x).contains(&i) && (pml..pml + self.cells_y).contains(&j)
    }

    /// Index of the interior cell containing a fractional grid coordinate
    pub fn interior_index(&self, gx: f64, gy: f64) -> Option<(usize, usize)> {
        if !(gx.is_finite() && gy.is_finite()) || gx < 0.0 || gy < 0.0 {
            return None;
        }
        let (i, j) = (gx as usize, gy as usize);
        self.is_interior(i, j).then_some((i, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_differentials() {
        let settings = Settings::default();
        let d = settings.differentials();
        assert_relative_eq!(d.dx, 0.005);
        assert_relative_eq!(d.dy, 0.005);
        // dt obeys the 2-D Courant bound
        let bound = 1.0 / (C0 * (1.0 / (d.dx * d.dx) + 1.0 / (d.dy * d.dy)).sqrt());
        assert!(d.dt <= bound);
        assert_relative_eq!(d.dt, 0.9999 * bound, max_relative = 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(Settings::default().validate().is_ok());

        let bad = [
            Settings { cells_x: 0, ..Default::default() },
            Settings { threads: 0, ..Default::default() },
            Settings { courant: 1.5, ..Default::default() },
            Settings { pml_layers: 1, ..Default::default() },
            Settings { sample_distance: 0, ..Default::default() },
            Settings { steps: 0, ..Default::default() },
        ];
        for settings in bad {
            assert!(matches!(
                settings.validate(),
                Err(SimError::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn test_samples_round_up() {
        let settings = Settings { steps: 10, sample_distance: 3, ..Default::default() };
        assert_eq!(settings.samples(), 4);
    }

    #[test]
    fn test_position_mapping() {
        let settings = Settings { cells_x: 20, cells_y: 10, pml_layers: 5, ..Default::default() };
        let d = settings.differentials();
        assert_relative_eq!(settings.grid_x(0.0, d.dx), 15.0);
        assert_relative_eq!(settings.grid_y(0.0, d.dy), 10.0);
        assert_relative_eq!(settings.physical_x(15.0, d.dx), 0.0);
        assert_eq!(settings.interior_index(5.0, 5.0), Some((5, 5)));
        assert_eq!(settings.interior_index(4.9, 5.0), None);
        assert_eq!(settings.interior_index(25.0, 5.0), None);
    }
}
