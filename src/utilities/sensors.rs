//! Point sensors capturing per-step field time series

use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::{Differentials, Settings};

/// A point probe
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sensor {
    pub position: Point,
}

impl Sensor {
    pub fn new(x: f64, y: f64) -> Self {
        Self { position: Point::new(x, y) }
    }

    /// Truncate the position to the interior cell containing it
    pub fn resolve(&self, settings: &Settings, d: &Differentials) -> Result<ResolvedSensor> {
        let (i, j) = settings
            .interior_index(
                settings.grid_x(self.position.x, d.dx),
                settings.grid_y(self.position.y, d.dy),
            )
            .ok_or(SimError::OutsideGrid {
                entity: "sensor",
                x: self.position.x,
                y: self.position.y,
            })?;
        Ok(ResolvedSensor { i, j, position: self.position })
    }
}

/// A sensor bound to its grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSensor {
    pub i: usize,
    pub j: usize,
    pub position: Point,
}

/// Recorded time series of one sensor, one entry per step
///
/// Entries start as NaN so unwritten steps are detectable.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTrace {
    pub i: usize,
    pub j: usize,
    pub ex: Vec<f64>,
    pub ey: Vec<f64>,
    pub hz: Vec<f64>,
}

impl SensorTrace {
    pub fn new(sensor: &ResolvedSensor, steps: usize) -> Self {
        Self {
            i: sensor.i,
            j: sensor.j,
            ex: vec![f64::NAN; steps],
            ey: vec![f64::NAN; steps],
            hz: vec![f64::NAN; steps],
        }
    }

    pub fn len(&self) -> usize {
        self.ex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ex.is_empty()
    }

    /// Whether every step has been recorded
    pub fn is_complete(&self) -> bool {
        self.ex
            .iter()
            .chain(&self.ey)
            .chain(&self.hz)
            .all(|v| !v.is_nan())
    }

    /// Time of sample `n` in seconds
    pub fn time(&self, n: usize, dt: f64) -> f64 {
        n as f64 * dt
    }
}
