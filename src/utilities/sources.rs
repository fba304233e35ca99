//! Current sources injected into the E update
//!
//! A source adds `dt / eps / (1 + C) * value(n)` with the sign of a current
//! density to one E component at its resolved cell.

use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::{Differentials, Settings};
use std::f64::consts::PI;

/// E component a source drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarization {
    #[default]
    X,
    Y,
}

impl Polarization {
    pub fn as_char(self) -> char {
        match self {
            Polarization::X => 'x',
            Polarization::Y => 'y',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'x' | 'X' => Some(Polarization::X),
            'y' | 'Y' => Some(Polarization::Y),
            _ => None,
        }
    }
}

/// Time dependence of a current source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// `magnitude * sin(2 pi f n dt)`
    Sinusoidal { frequency: f64, magnitude: f64 },
    /// Gaussian envelope around a sine carrier, peaking `3 * pulse_width`
    /// after `time_delay`
    Gaussian {
        frequency: f64,
        magnitude: f64,
        time_delay: f64,
        pulse_width: f64,
    },
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sinusoidal { frequency: 2.0E9, magnitude: 1.0 }
    }
}

impl Waveform {
    /// Source value at time `t` (seconds)
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            Waveform::Sinusoidal { frequency, magnitude } => magnitude * (2.0 * PI * frequency * t).sin(),
            Waveform::Gaussian { frequency, magnitude, time_delay, pulse_width } => {
                let arg = t - time_delay - 3.0 * pulse_width;
                (-arg * arg / (pulse_width * pulse_width)).exp() * (2.0 * PI * frequency * arg).sin() * magnitude
            }
        }
    }
}

/// A point current source
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurrentSource {
    pub position: Point,
    pub polarization: Polarization,
    pub waveform: Waveform,
}

impl CurrentSource {
    pub fn sinusoidal(position: Point, polarization: Polarization, frequency: f64, magnitude: f64) -> Self {
        Self {
            position,
            polarization,
            waveform: Waveform::Sinusoidal { frequency, magnitude },
        }
    }

    pub fn gaussian(
        position: Point,
        polarization: Polarization,
        frequency: f64,
        magnitude: f64,
        time_delay: f64,
        pulse_width: f64,
    ) -> Self {
        Self {
            position,
            polarization,
            waveform: Waveform::Gaussian { frequency, magnitude, time_delay, pulse_width },
        }
    }

    /// Round the position to the nearest interior cell
    pub fn resolve(&self, settings: &Settings, d: &Differentials) -> Result<ResolvedSource> {
        let gx = settings.grid_x(self.position.x, d.dx).round();
        let gy = settings.grid_y(self.position.y, d.dy).round();
        let (i, j) = settings.interior_index(gx, gy).ok_or(SimError::OutsideGrid {
            entity: "source",
            x: self.position.x,
            y: self.position.y,
        })?;
        if let Waveform::Gaussian { pulse_width, .. } = self.waveform {
            if !(pulse_width > 0.0) {
                return Err(SimError::InvalidSettings(format!(
                    "gaussian pulse width must be positive, got {pulse_width}"
                )));
            }
        }
        Ok(ResolvedSource { i, j, polarization: self.polarization, waveform: self.waveform })
    }
}

/// A source bound to its grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSource {
    pub i: usize,
    pub j: usize,
    pub polarization: Polarization,
    pub waveform: Waveform,
}

impl ResolvedSource {
    /// Waveform value at step `n`
    pub fn value(&self, n: usize, dt: f64) -> f64 {
        self.waveform.value_at(n as f64 * dt)
    }
}
