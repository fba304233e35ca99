//! Tagged-record codec for simulation definitions
//!
//! A definition is a whitespace-separated token stream. Each record starts
//! with an integer tag followed by the fields of one entity in a fixed order:
//!
//! | tag | entity   | fields |
//! |-----|----------|--------|
//! | -1  | settings | cellsX cellsY sizeX sizeY courant sigmaXMax sigmaYMax m steps threads pmlLayers width height sampleDistance drawNth |
//! | 0   | source   | frequency magnitude x y pol type timeDelay pulseWidth frequencyG magnitudeG xG yG polG |
//! | 1   | TF/SF    | timeDelay pulseWidth centerFrequency angle amplitude x0 y0 x1 y1 |
//! | 2   | material | nPoints (x y)* epsR muR sigma yuMittra |
//! | 3   | sensor   | x y |
//! | 4   | subgrid  | x0 y0 x1 y1 xRatio yRatio |
//!
//! Source frequencies are written in MHz. A source record carries both the
//! sinusoidal and the gaussian parameter sets; `type` (`s` or `g`) selects
//! which one is live. Line breaks carry no meaning.

use crate::domain::simulation::SimulationBuilder;
use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::Settings;
use crate::utilities::{CurrentSource, MaterialRegion, PlaneWave, Polarization, Sensor, SubgridDefinition, Waveform};
use std::str::{FromStr, SplitWhitespace};

pub const SETTINGS_TAG: i32 = -1;
pub const SOURCE_TAG: i32 = 0;
pub const PLANE_WAVE_TAG: i32 = 1;
pub const MATERIAL_TAG: i32 = 2;
pub const SENSOR_TAG: i32 = 3;
pub const SUBGRID_TAG: i32 = 4;

const MHZ: f64 = 1.0E6;

/// Token cursor that reports the position of the token it failed on
struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    index: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self { inner: text.split_whitespace(), index: 0 }
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        let token = self.inner.next()?;
        self.index += 1;
        Some(token)
    }

    fn error(&self, message: impl Into<String>) -> SimError {
        SimError::Parse { token: self.index, message: message.into() }
    }

    fn next<T: FromStr>(&mut self, field: &str) -> Result<T> {
        let token = self
            .next_raw()
            .ok_or_else(|| self.error(format!("missing {field}")))?;
        token
            .parse()
            .map_err(|_| self.error(format!("bad {field} '{token}'")))
    }

    fn next_point(&mut self, field: &str) -> Result<Point> {
        Ok(Point::new(self.next(field)?, self.next(field)?))
    }

    fn next_char(&mut self, field: &str) -> Result<char> {
        let token = self
            .next_raw()
            .ok_or_else(|| self.error(format!("missing {field}")))?;
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(self.error(format!("bad {field} '{token}'"))),
        }
    }

    fn next_polarization(&mut self, field: &str) -> Result<Polarization> {
        let c = self.next_char(field)?;
        Polarization::from_char(c).ok_or_else(|| self.error(format!("bad {field} '{c}'")))
    }

    fn next_flag(&mut self, field: &str) -> Result<bool> {
        let token = self
            .next_raw()
            .ok_or_else(|| self.error(format!("missing {field}")))?;
        match token {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(self.error(format!("bad {field} '{token}'"))),
        }
    }
}

/// Parse a definition into a builder, keeping entity order
///
/// Settings not present in the stream keep their defaults; a later
/// settings record replaces an earlier one.
pub fn read_records(text: &str) -> Result<SimulationBuilder> {
    let mut builder = SimulationBuilder::default();
    let mut tokens = Tokens::new(text);

    while let Some(tag) = tokens.next_raw() {
        let tag: i32 = tag.parse().map_err(|_| tokens.error(format!("bad record tag '{tag}'")))?;
        match tag {
            SETTINGS_TAG => builder.settings = read_settings(&mut tokens)?,
            SOURCE_TAG => builder.sources.push(read_source(&mut tokens)?),
            PLANE_WAVE_TAG => builder.plane_waves.push(read_plane_wave(&mut tokens)?),
            MATERIAL_TAG => builder.materials.push(read_material(&mut tokens)?),
            SENSOR_TAG => builder.sensors.push(Sensor { position: tokens.next_point("sensor position")? }),
            SUBGRID_TAG => builder.subgrids.push(read_subgrid(&mut tokens)?),
            other => return Err(tokens.error(format!("unknown record tag {other}"))),
        }
    }

    tracing::debug!(
        sources = builder.sources.len(),
        plane_waves = builder.plane_waves.len(),
        materials = builder.materials.len(),
        sensors = builder.sensors.len(),
        subgrids = builder.subgrids.len(),
        "records parsed"
    );
    Ok(builder)
}

fn read_settings(t: &mut Tokens<'_>) -> Result<Settings> {
    Ok(Settings {
        cells_x: t.next("cellsX")?,
        cells_y: t.next("cellsY")?,
        size_x: t.next("sizeX")?,
        size_y: t.next("sizeY")?,
        courant: t.next("courant")?,
        sigma_x_max: t.next("sigmaXMax")?,
        sigma_y_max: t.next("sigmaYMax")?,
        grading: t.next("grading")?,
        steps: t.next("steps")?,
        threads: t.next("threads")?,
        pml_layers: t.next("PML layers")?,
        view_width: t.next("width")?,
        view_height: t.next("height")?,
        sample_distance: t.next("sample distance")?,
        draw_every: t.next("draw cadence")?,
    })
}

fn read_source(t: &mut Tokens<'_>) -> Result<CurrentSource> {
    let frequency: f64 = t.next("frequency")?;
    let magnitude: f64 = t.next("magnitude")?;
    let position = t.next_point("source position")?;
    let polarization = t.next_polarization("polarization")?;
    let kind = t.next_char("source type")?;
    let time_delay: f64 = t.next("time delay")?;
    let pulse_width: f64 = t.next("pulse width")?;
    let frequency_g: f64 = t.next("gaussian frequency")?;
    let magnitude_g: f64 = t.next("gaussian magnitude")?;
    let position_g = t.next_point("gaussian position")?;
    let polarization_g = t.next_polarization("gaussian polarization")?;

    match kind {
        's' | 'S' => Ok(CurrentSource::sinusoidal(position, polarization, frequency * MHZ, magnitude)),
        'g' | 'G' => Ok(CurrentSource::gaussian(
            position_g,
            polarization_g,
            frequency_g * MHZ,
            magnitude_g,
            time_delay,
            pulse_width,
        )),
        other => Err(t.error(format!("bad source type '{other}'"))),
    }
}

fn read_plane_wave(t: &mut Tokens<'_>) -> Result<PlaneWave> {
    Ok(PlaneWave {
        time_delay: t.next("time delay")?,
        pulse_width: t.next("pulse width")?,
        center_frequency: t.next("center frequency")?,
        angle: t.next("angle")?,
        amplitude: t.next("amplitude")?,
        corner_a: t.next_point("first corner")?,
        corner_b: t.next_point("second corner")?,
    })
}

fn read_material(t: &mut Tokens<'_>) -> Result<MaterialRegion> {
    let count: usize = t.next("point count")?;
    let mut points = Vec::new();
    points
        .try_reserve(count)
        .map_err(|_| t.error(format!("point count {count} too large")))?;
    for _ in 0..count {
        points.push(t.next_point("material point")?);
    }
    let eps_r = t.next("epsR")?;
    let mu_r = t.next("muR")?;
    let sigma = t.next("sigma")?;
    let yu_mittra = t.next_flag("Yu-Mittra flag")?;
    Ok(MaterialRegion::new(points, eps_r, mu_r, sigma).with_yu_mittra(yu_mittra))
}

fn read_subgrid(t: &mut Tokens<'_>) -> Result<SubgridDefinition> {
    Ok(SubgridDefinition {
        corner_a: t.next_point("first corner")?,
        corner_b: t.next_point("second corner")?,
        x_ratio: t.next("x ratio")?,
        y_ratio: t.next("y ratio")?,
    })
}

/// Write a builder back out, one record per entity
///
/// Records come grouped by kind: settings, materials, sources, TF/SF
/// regions, sensors and subgrids.
pub fn write_records(builder: &SimulationBuilder) -> String {
    let s = &builder.settings;
    let mut out = format!(
        "{SETTINGS_TAG}\n{} {} {} {} {} {} {} {} {} {} {} {} {} {} {}\n",
        s.cells_x,
        s.cells_y,
        s.size_x,
        s.size_y,
        s.courant,
        s.sigma_x_max,
        s.sigma_y_max,
        s.grading,
        s.steps,
        s.threads,
        s.pml_layers,
        s.view_width,
        s.view_height,
        s.sample_distance,
        s.draw_every
    );

    for m in &builder.materials {
        out.push_str(&format!("{MATERIAL_TAG} {}\n", m.points.len()));
        for p in &m.points {
            out.push_str(&format!("{} {} ", p.x, p.y));
        }
        out.push_str(&format!("{} {} {} {}\n", m.eps_r, m.mu_r, m.sigma, u8::from(m.yu_mittra)));
    }

    for source in &builder.sources {
        out.push_str(&format!("{SOURCE_TAG}\n{}\n", source_fields(source)));
    }

    for w in &builder.plane_waves {
        out.push_str(&format!(
            "{PLANE_WAVE_TAG}\n{} {} {} {} {} {} {} {} {}\n",
            w.time_delay,
            w.pulse_width,
            w.center_frequency,
            w.angle,
            w.amplitude,
            w.corner_a.x,
            w.corner_a.y,
            w.corner_b.x,
            w.corner_b.y
        ));
    }

    for sensor in &builder.sensors {
        out.push_str(&format!("{SENSOR_TAG}\n{} {}\n", sensor.position.x, sensor.position.y));
    }

    for g in &builder.subgrids {
        out.push_str(&format!(
            "{SUBGRID_TAG}\n{} {} {} {} {} {}\n",
            g.corner_a.x, g.corner_a.y, g.corner_b.x, g.corner_b.y, g.x_ratio, g.y_ratio
        ));
    }
    out
}

/// The inactive parameter set is written with the live position and
/// polarization and zero amplitude
fn source_fields(source: &CurrentSource) -> String {
    let (x, y) = (source.position.x, source.position.y);
    let pol = source.polarization.as_char();
    match source.waveform {
        Waveform::Sinusoidal { frequency, magnitude } => format!(
            "{} {magnitude} {x} {y} {pol} s 0 0 0 0 {x} {y} {pol}",
            frequency / MHZ
        ),
        Waveform::Gaussian { frequency, magnitude, time_delay, pulse_width } => format!(
            "0 0 {x} {y} {pol} g {time_delay} {pulse_width} {} {magnitude} {x} {y} {pol}",
            frequency / MHZ
        ),
    }
}
