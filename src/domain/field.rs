//! Coarse-grid FDTD engine of one patch worker
//!
//! Each worker advances the interior cells it owns with the lossy Yee
//! update, applies the TF/SF edge corrections and current sources that
//! fall on its cells, and drives the subgrids whose footprints it owns.

use crate::domain::domain_trait::{FieldUpdate, StepSlots};
use crate::domain::subgrid::SubgridInterface;
use crate::domain_decomposition::Area;
use crate::engine::{FieldExtents, RawSlot};
use crate::settings::{Differentials, Settings};
use crate::utilities::materials::MaterialGrid;
use crate::utilities::plane_wave::ResolvedPlaneWave;
use crate::utilities::sensors::{ResolvedSensor, SensorTrace};
use crate::utilities::sources::{Polarization, ResolvedSource};

/// Read-only description of the coarse grid shared by every worker
#[derive(Debug)]
pub struct GridContext {
    pub settings: Settings,
    pub d: Differentials,
    pub materials: MaterialGrid,
    pub sources: Vec<ResolvedSource>,
    pub plane_waves: Vec<ResolvedPlaneWave>,
}

/// A sensor recorded by the worker owning its cell
#[derive(Debug, Clone)]
pub struct OwnedSensor {
    /// Index in the run's sensor list
    pub index: usize,
    pub sensor: ResolvedSensor,
    pub trace: SensorTrace,
}

/// Patch engine of one worker
#[derive(Debug)]
pub struct FieldEngine<'a> {
    ctx: &'a GridContext,
    areas: Vec<Area>,
    sources: Vec<ResolvedSource>,
    subgrids: Vec<(usize, SubgridInterface)>,
    sensors: Vec<OwnedSensor>,
    extents: FieldExtents,
}

impl<'a> FieldEngine<'a> {
    /// `areas` are the cells this worker writes; sources are kept when
    /// their cell falls inside them
    pub fn new(
        ctx: &'a GridContext,
        areas: Vec<Area>,
        subgrids: Vec<(usize, SubgridInterface)>,
        sensors: Vec<OwnedSensor>,
    ) -> Self {
        let sources = ctx
            .sources
            .iter()
            .filter(|s| areas.iter().any(|a| a.contains(s.i, s.j)))
            .copied()
            .collect();
        Self { ctx, areas, sources, subgrids, sensors, extents: FieldExtents::default() }
    }

    /// Subgrids driven by this worker, with their definition index
    pub fn subgrids(&self) -> &[(usize, SubgridInterface)] {
        &self.subgrids
    }

    pub fn sensors(&self) -> &[OwnedSensor] {
        &self.sensors
    }

    /// Hand back the sensor traces, the subgrids and the field extents
    pub fn into_parts(self) -> (Vec<OwnedSensor>, Vec<(usize, SubgridInterface)>, FieldExtents) {
        (self.sensors, self.subgrids, self.extents)
    }

    /// Lossy E update over one area
    unsafe fn update_e_area(&self, area: &Area, old: RawSlot, new: RawSlot) {
        let m = &self.ctx.materials;
        let Differentials { dx, dy, dt } = self.ctx.d;

        for i in area.i_min..area.i_max {
            for j in area.j_min..area.j_max {
                // Update Ex
                let eps = m.eps_ex.data[[i, j]];
                let c = m.sigma_ex.data[[i, j]] * dt / (2.0 * eps);
                let curl_h = (old.hz.get(i, j + 1) - old.hz.get(i, j)) / dy;
                new.ex.set(i, j, (1.0 - c) / (1.0 + c) * old.ex.get(i, j) + dt / eps / (1.0 + c) * curl_h);

                // Update Ey
                let eps = m.eps_ey.data[[i, j]];
                let c = m.sigma_ey.data[[i, j]] * dt / (2.0 * eps);
                let curl_h = (old.hz.get(i + 1, j) - old.hz.get(i, j)) / dx;
                new.ey.set(i, j, (1.0 - c) / (1.0 + c) * old.ey.get(i, j) - dt / eps / (1.0 + c) * curl_h);
            }
        }
    }

    /// Hz update over one area from the fresh E values
    unsafe fn update_h_area(&self, area: &Area, old: RawSlot, new: RawSlot) {
        let mu_hz = &self.ctx.materials.mu_hz.data;
        let Differentials { dx, dy, dt } = self.ctx.d;

        for i in area.i_min..area.i_max {
            for j in area.j_min..area.j_max {
                let curl_e = (new.ex.get(i, j) - new.ex.get(i, j - 1)) / dy
                    - (new.ey.get(i, j) - new.ey.get(i - 1, j)) / dx;
                new.hz.set(i, j, old.hz.get(i, j) + dt / mu_hz[[i, j]] * curl_e);
            }
        }
    }

    /// Incident-field corrections of the E values straddling a TF/SF edge
    unsafe fn correct_e(&self, wave: &ResolvedPlaneWave, area: &Area, n: usize, new: RawSlot) {
        let m = &self.ctx.materials;
        let Differentials { dx, dy, dt } = self.ctx.d;
        let t = n as f64;
        let rows = span(area.j_min, area.j_max, wave.j0, wave.j1);
        let columns = span(area.i_min, area.i_max, wave.i0, wave.i1);

        // left edge, one column outside the rectangle
        let i = wave.i0 - 1;
        if (area.i_min..area.i_max).contains(&i) {
            for j in rows.clone() {
                let hz = wave.evaluate_at((i + 1) as f64, j as f64, t).hz;
                new.ey.add(i, j, dt / m.eps_ey.data[[i, j]] * hz / dx);
            }
        }
        let i = wave.i1;
        if (area.i_min..area.i_max).contains(&i) {
            for j in rows {
                let hz = wave.evaluate_at(i as f64, j as f64, t).hz;
                new.ey.add(i, j, -dt / m.eps_ey.data[[i, j]] * hz / dx);
            }
        }
        // bottom edge, one row outside the rectangle
        let j = wave.j0 - 1;
        if (area.j_min..area.j_max).contains(&j) {
            for i in columns.clone() {
                let hz = wave.evaluate_at(i as f64, (j + 1) as f64, t).hz;
                new.ex.add(i, j, -dt / m.eps_ex.data[[i, j]] * hz / dy);
            }
        }
        let j = wave.j1;
        if (area.j_min..area.j_max).contains(&j) {
            for i in columns {
                let hz = wave.evaluate_at(i as f64, j as f64, t).hz;
                new.ex.add(i, j, dt / m.eps_ex.data[[i, j]] * hz / dy);
            }
        }
    }

    /// Incident-field corrections of the Hz values on a TF/SF edge
    unsafe fn correct_h(&self, wave: &ResolvedPlaneWave, area: &Area, n: usize, new: RawSlot) {
        let mu_hz = &self.ctx.materials.mu_hz.data;
        let Differentials { dx, dy, dt } = self.ctx.d;
        let t = n as f64 + 0.5;
        let rows = span(area.j_min, area.j_max, wave.j0, wave.j1);
        let columns = span(area.i_min, area.i_max, wave.i0, wave.i1);

        let i = wave.i0;
        if (area.i_min..area.i_max).contains(&i) {
            for j in rows.clone() {
                let ey = wave.evaluate_at(i as f64 - 0.5, j as f64, t).ey;
                new.hz.add(i, j, dt / mu_hz[[i, j]] * ey / dx);
            }
        }
        let i = wave.i1;
        if (area.i_min..area.i_max).contains(&i) {
            for j in rows {
                let ey = wave.evaluate_at(i as f64 + 0.5, j as f64, t).ey;
                new.hz.add(i, j, -dt / mu_hz[[i, j]] * ey / dx);
            }
        }
        let j = wave.j0;
        if (area.j_min..area.j_max).contains(&j) {
            for i in columns.clone() {
                let ex = wave.evaluate_at(i as f64, j as f64 - 0.5, t).ex;
                new.hz.add(i, j, -dt / mu_hz[[i, j]] * ex / dy);
            }
        }
        let j = wave.j1;
        if (area.j_min..area.j_max).contains(&j) {
            for i in columns {
                let ex = wave.evaluate_at(i as f64, j as f64 + 0.5, t).ex;
                new.hz.add(i, j, dt / mu_hz[[i, j]] * ex / dy);
            }
        }
    }

    /// Current injection scaled like the E update it joins
    unsafe fn inject(&self, source: &ResolvedSource, n: usize, new: RawSlot) {
        let m = &self.ctx.materials;
        let dt = self.ctx.d.dt;
        let (i, j) = (source.i, source.j);
        // the loss factor always comes from the Ex point of the cell
        let c = m.sigma_ex.data[[i, j]] * dt / (2.0 * m.eps_ex.data[[i, j]]);
        let value = source.value(n, dt);
        match source.polarization {
            Polarization::X => new.ex.add(i, j, -dt / m.eps_ex.data[[i, j]] / (1.0 + c) * value),
            Polarization::Y => new.ey.add(i, j, -dt / m.eps_ey.data[[i, j]] / (1.0 + c) * value),
        }
    }
}

/// Indices of `lo..=hi` that fall inside `min..max`
fn span(min: usize, max: usize, lo: usize, hi: usize) -> std::ops::Range<usize> {
    lo.max(min)..(hi + 1).min(max).max(lo.max(min))
}

impl FieldUpdate for FieldEngine<'_> {
    fn update_e(&mut self, slots: &StepSlots) -> bool {
        let StepSlots { n, old, new } = *slots;
        // SAFETY: the partition gives every interior cell one owner and
        // this phase reads only the previous slot
        unsafe {
            for area in &self.areas {
                self.update_e_area(area, old, new);
            }
            for wave in &self.ctx.plane_waves {
                for area in &self.areas {
                    self.correct_e(wave, area, n, new);
                }
            }
            for source in &self.sources {
                self.inject(source, n, new);
            }
            let mut converged = true;
            for (_, subgrid) in &mut self.subgrids {
                converged &= subgrid.advance_e(slots, &self.ctx.materials);
            }
            converged
        }
    }

    fn update_h(&mut self, slots: &StepSlots) {
        let StepSlots { n, old, new } = *slots;
        // SAFETY: E of this step is final after the first barrier
        unsafe {
            for area in &self.areas {
                self.update_h_area(area, old, new);
            }
            for wave in &self.ctx.plane_waves {
                for area in &self.areas {
                    self.correct_h(wave, area, n, new);
                }
            }
            for area in &self.areas {
                for (i, j) in area.indices() {
                    self.extents.observe(new.ex.get(i, j), new.ey.get(i, j), new.hz.get(i, j));
                }
            }
        }
    }

    fn finish_step(&mut self, slots: &StepSlots) {
        let StepSlots { n, new, .. } = *slots;
        for (_, subgrid) in &mut self.subgrids {
            subgrid.advance_h(n);
        }
        for owned in &mut self.sensors {
            let (i, j) = (owned.sensor.i, owned.sensor.j);
            // SAFETY: nothing writes the new slot until the next step
            let (ex, ey, hz) = unsafe { (new.ex.get(i, j), new.ey.get(i, j), new.hz.get(i, j)) };
            let hz = self
                .subgrids
                .iter()
                .find(|(_, s)| s.covers(&owned.sensor))
                .map_or(hz, |(_, s)| s.sensor_hz(n, &owned.sensor));
            owned.trace.ex[n] = ex;
            owned.trace.ey[n] = ey;
            owned.trace.hz[n] = hz;
        }
    }

    fn areas(&self) -> Vec<Area> {
        self.areas.clone()
    }

    fn extents(&self) -> FieldExtents {
        self.extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EPSILON0;
    use crate::engine::array::try_field_sets;
    use crate::engine::FieldSet;
    use crate::geometry::Point;
    use crate::utilities::sources::CurrentSource;
    use approx::assert_relative_eq;

    fn context(sources: Vec<ResolvedSource>) -> GridContext {
        let settings = Settings { cells_x: 10, cells_y: 10, pml_layers: 3, steps: 4, ..Default::default() };
        let d = settings.differentials();
        let materials = MaterialGrid::build(&settings, &d, &[]).unwrap();
        GridContext { settings, d, materials, sources, plane_waves: Vec::new() }
    }

    fn ring(sets: &mut [FieldSet]) -> Vec<RawSlot> {
        sets.iter_mut().map(RawSlot::of).collect()
    }

    #[test]
    fn test_sinusoidal_injection() {
        let probe = Settings { cells_x: 10, cells_y: 10, pml_layers: 3, ..Default::default() };
        let d = probe.differentials();
        let source = CurrentSource::sinusoidal(Point::new(0.0, 0.0), Polarization::Y, 1.0E9, 2.0)
            .resolve(&probe, &d)
            .unwrap();
        let ctx = context(vec![source]);
        let interior = Area::new(3, 13, 3, 13);
        let mut engine = FieldEngine::new(&ctx, vec![interior], Vec::new(), Vec::new());

        let mut sets = try_field_sets(4, (16, 16)).unwrap();
        let raw = ring(&mut sets);
        let n = 3;
        engine.update_e(&StepSlots::at(n, &raw));

        let expected = -ctx.d.dt / EPSILON0 * 2.0 * (2.0 * std::f64::consts::PI * 1.0E9 * n as f64 * ctx.d.dt).sin();
        assert_relative_eq!(sets[n].ey.data[[source.i, source.j]], expected, max_relative = 1e-12);
        assert_eq!(sets[n].ex.data[[source.i, source.j]], 0.0);
    }

    #[test]
    fn test_source_outside_areas_is_ignored() {
        let probe = Settings { cells_x: 10, cells_y: 10, pml_layers: 3, ..Default::default() };
        let d = probe.differentials();
        let source = CurrentSource::sinusoidal(Point::new(0.0, 0.0), Polarization::X, 1.0E9, 1.0)
            .resolve(&probe, &d)
            .unwrap();
        let ctx = context(vec![source]);
        let engine = FieldEngine::new(&ctx, vec![Area::new(3, 4, 3, 13)], Vec::new(), Vec::new());
        assert!(engine.sources.is_empty());
    }

    #[test]
    fn test_leapfrog_moves_energy_outwards() {
        let ctx = context(Vec::new());
        let interior = Area::new(3, 13, 3, 13);
        let mut engine = FieldEngine::new(&ctx, vec![interior], Vec::new(), Vec::new());
        let mut sets = try_field_sets(4, (16, 16)).unwrap();
        sets[3].hz.data[[8, 8]] = 1.0;
        let raw = ring(&mut sets);

        let slots = StepSlots::at(0, &raw);
        engine.update_e(&slots);
        engine.update_h(&slots);

        // Ex(8, 7) sits below the excited Hz, Ex(8, 8) above it
        assert!(sets[0].ex.data[[8, 7]] > 0.0);
        assert!(sets[0].ex.data[[8, 8]] < 0.0);
        assert!(sets[0].ey.data[[7, 8]] < 0.0);
        assert!(sets[0].hz.data[[8, 8]] < 1.0);
        assert_eq!(sets[0].hz.data[[0, 0]], 0.0);
        let extents = engine.extents();
        assert!(extents.hz.1 > 0.0 && !extents.non_finite);
    }

    #[test]
    fn test_span_clips() {
        assert_eq!(span(3, 8, 5, 10), 5..8);
        assert_eq!(span(3, 8, 0, 4), 3..5);
        assert!(span(3, 8, 9, 12).is_empty());
    }
}
