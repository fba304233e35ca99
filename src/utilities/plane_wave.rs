//! Total-field/scattered-field plane-wave source
//!
//! The incident wave is a Gaussian-modulated sine travelling along the
//! incidence angle. It is injected only on the perimeter of a rectangle:
//! the E and H updates that straddle an edge get the incident field added
//! or removed so that the interior sees the total field and the exterior
//! sees only the scattered field.

use crate::constants::{C0, ETA0};
use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::{Differentials, Settings};
use std::f64::consts::PI;

/// User-facing TF/SF definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneWave {
    pub corner_a: Point,
    pub corner_b: Point,
    /// Incidence angle in degrees
    pub angle: f64,
    /// Seconds
    pub time_delay: f64,
    /// Gaussian envelope width in seconds
    pub pulse_width: f64,
    /// Carrier frequency in Hz
    pub center_frequency: f64,
    pub amplitude: f64,
}

impl Default for PlaneWave {
    fn default() -> Self {
        Self {
            corner_a: Point::new(-0.4, -0.4),
            corner_b: Point::new(0.4, 0.4),
            angle: 0.0,
            time_delay: 0.0,
            pulse_width: 0.5E-9,
            center_frequency: 1.0E9,
            amplitude: 1.0,
        }
    }
}

/// Incident field sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IncidentField {
    pub ex: f64,
    pub ey: f64,
    pub hz: f64,
}

impl PlaneWave {
    /// Normalize the corners, derive the index bounds and the injection origin
    pub fn resolve(&self, settings: &Settings, d: &Differentials) -> Result<ResolvedPlaneWave> {
        if Point::is_degenerate_rect(self.corner_a, self.corner_b) {
            return Err(SimError::DegenerateRectangle {
                entity: "TF/SF",
                x0: self.corner_a.x,
                y0: self.corner_a.y,
                x1: self.corner_b.x,
                y1: self.corner_b.y,
            });
        }
        if !(self.pulse_width > 0.0) {
            return Err(SimError::InvalidSettings(format!(
                "plane-wave pulse width must be positive, got {}",
                self.pulse_width
            )));
        }
        let (lo, hi) = Point::normalize_corners(self.corner_a, self.corner_b);

        let outside = |p: Point| SimError::OutsideGrid { entity: "TF/SF corner", x: p.x, y: p.y };
        let (i0, j0) = settings
            .interior_index(settings.grid_x(lo.x, d.dx), settings.grid_y(lo.y, d.dy))
            .ok_or(outside(lo))?;
        let (i1, j1) = settings
            .interior_index(settings.grid_x(hi.x, d.dx), settings.grid_y(hi.y, d.dy))
            .ok_or(outside(hi))?;
        // left/bottom corrections write one cell below the rectangle
        if i0 <= settings.pml_layers || j0 <= settings.pml_layers {
            return Err(outside(lo));
        }

        let center = Point::new((lo.x + hi.x) / 2.0, (lo.y + hi.y) / 2.0);
        let diagonal = ((hi.x - lo.x).powi(2) + (hi.y - lo.y).powi(2)).sqrt();
        let angle = self.angle.to_radians();
        let origin = Point::new(
            center.x + 0.8 * diagonal * angle.cos(),
            center.y + 0.8 * diagonal * angle.sin(),
        );

        Ok(ResolvedPlaneWave {
            i0,
            i1,
            j0,
            j1,
            origin,
            cos: angle.cos(),
            sin: angle.sin(),
            time_delay: self.time_delay,
            pulse_width: self.pulse_width,
            center_frequency: self.center_frequency,
            amplitude: self.amplitude,
            dx: d.dx,
            dy: d.dy,
            dt: d.dt,
            offset_x: settings.cells_x as f64 / 2.0 + settings.pml_layers as f64,
            offset_y: settings.cells_y as f64 / 2.0 + settings.pml_layers as f64,
        })
    }
}

/// A plane wave bound to the grid; evaluation is a pure function of
/// (i, j, n)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPlaneWave {
    pub i0: usize,
    pub i1: usize,
    pub j0: usize,
    pub j1: usize,
    pub origin: Point,
    cos: f64,
    sin: f64,
    time_delay: f64,
    pulse_width: f64,
    center_frequency: f64,
    amplitude: f64,
    dx: f64,
    dy: f64,
    dt: f64,
    offset_x: f64,
    offset_y: f64,
}

impl ResolvedPlaneWave {
    /// Incident field at fractional grid position (i, j) and fractional step n
    pub fn evaluate_at(&self, i: f64, j: f64, n: f64) -> IncidentField {
        let x = self.dx * (i - self.offset_x);
        let y = self.dy * (j - self.offset_y);
        let t = self.dt * n;

        let retarded = (self.cos * (x - self.origin.x) + self.sin * (y - self.origin.y)) / C0;
        let arg = t - self.time_delay + retarded;
        let f = (-arg * arg / (self.pulse_width * self.pulse_width)).exp()
            * (2.0 * PI * self.center_frequency * arg).sin()
            * self.amplitude;

        IncidentField { ex: -f * self.sin, ey: f * self.cos, hz: -f / ETA0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> Settings {
        Settings { cells_x: 40, cells_y: 40, pml_layers: 5, ..Default::default() }
    }

    #[test]
    fn test_resolve_normalizes_corners() {
        let s = settings();
        let d = s.differentials();
        let wave = PlaneWave {
            corner_a: Point::new(0.21, 0.21),
            corner_b: Point::new(-0.21, -0.21),
            ..Default::default()
        };
        let r = wave.resolve(&s, &d).unwrap();
        // -0.21 / 0.025 + 20 + 5 = 16.6, 0.21 / 0.025 + 25 = 33.4
        assert_eq!((r.i0, r.i1, r.j0, r.j1), (16, 33, 16, 33));
        // angle 0 pushes the origin along +x
        let diagonal = (0.42f64 * 0.42 * 2.0).sqrt();
        assert_relative_eq!(r.origin.x, 0.8 * diagonal, epsilon = 1e-12);
        assert_relative_eq!(r.origin.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_rectangle_rejected() {
        let s = settings();
        let d = s.differentials();
        let wave = PlaneWave {
            corner_a: Point::new(0.1, -0.2),
            corner_b: Point::new(0.1, 0.2),
            ..Default::default()
        };
        assert!(matches!(wave.resolve(&s, &d), Err(SimError::DegenerateRectangle { .. })));
    }

    #[test]
    fn test_incident_field_relations() {
        let s = settings();
        let d = s.differentials();
        let wave = PlaneWave {
            corner_a: Point::new(-0.2, -0.2),
            corner_b: Point::new(0.2, 0.2),
            angle: 30.0,
            ..Default::default()
        };
        let r = wave.resolve(&s, &d).unwrap();
        for n in [100.0, 250.5, 400.0] {
            let f = r.evaluate_at(20.0, 22.5, n);
            // transverse E, Hz = -|E| / eta with the sign of the envelope
            let e = (f.ex * f.ex + f.ey * f.ey).sqrt();
            assert_relative_eq!(f.hz.abs(), e / ETA0, epsilon = 1e-15);
            let angle = 30f64.to_radians();
            assert_relative_eq!(f.ex * angle.cos() + f.ey * angle.sin(), 0.0, epsilon = 1e-15);
        }
    }
}
