//! Coupling between the coarse grid and one fine subgrid
//!
//! The coarse E values on the ring just outside the refined box are
//! recomputed with the coarse Hz inside the box replaced by the rim of
//! the fine grid, averaged over the fine nodes sharing each coarse cell.
//! Those corrected E values then force the rim Hz of the fine grid
//! through its source vector before the implicit solve.

use super::field::{FineLayout, SubgridField};
use crate::domain::domain_trait::StepSlots;
use crate::domain::iteration::SolverConfig;
use crate::error::Result;
use crate::settings::{Differentials, Settings};
use crate::utilities::materials::{MaterialGrid, ResolvedMaterial};
use crate::utilities::sensors::ResolvedSensor;
use crate::utilities::subgrid::SubgridPlacement;

/// A placed subgrid and its fine-grid engine
#[derive(Debug)]
pub struct SubgridInterface {
    placement: SubgridPlacement,
    field: SubgridField,
    dt: f64,
}

impl SubgridInterface {
    pub fn new(
        placement: SubgridPlacement,
        settings: &Settings,
        d: &Differentials,
        materials: &[ResolvedMaterial],
        solver: SolverConfig,
    ) -> Result<Self> {
        let field = SubgridField::build(&placement, settings, d, materials, solver)?;
        Ok(Self { placement, field, dt: d.dt })
    }

    pub fn placement(&self) -> &SubgridPlacement {
        &self.placement
    }

    pub fn field(&self) -> &SubgridField {
        &self.field
    }

    pub fn layout(&self) -> &FineLayout {
        self.field.layout()
    }

    /// Correct the coarse ring E of step `n`, force the fine rim and solve
    ///
    /// Returns whether the implicit solve met its tolerance.
    ///
    /// # Safety
    /// The caller must own the footprint of this subgrid for the E phase
    /// of step `n`.
    pub unsafe fn advance_e(&mut self, slots: &StepSlots, materials: &MaterialGrid) -> bool {
        let n = slots.n;
        let p = self.placement;
        let layout = *self.field.layout();
        let (dx, dy, dt) = (layout.coarse_dx, layout.coarse_dy, self.dt);
        let (old, new) = (slots.old, slots.new);
        let eps_ex = &materials.eps_ex.data;
        let eps_ey = &materials.eps_ey.data;
        let sigma_ex = &materials.sigma_ex.data;
        let sigma_ey = &materials.sigma_ey.data;
        let coefficients = |eps: f64, sigma: f64| {
            let c = sigma * dt / (2.0 * eps);
            ((1.0 - c) / (1.0 + c), dt / eps / (1.0 + c))
        };

        // coarse E on the ring, with the coarse Hz inside the box taken as zero
        for i in p.i_min..=p.i_max {
            for (j, hz_above, hz_below) in [
                (p.j_min - 1, 0.0, old.hz.get(i, p.j_min - 1)),
                (p.j_max, old.hz.get(i, p.j_max + 1), 0.0),
            ] {
                let (decay, gain) = coefficients(eps_ex[[i, j]], sigma_ex[[i, j]]);
                new.ex.set(i, j, decay * old.ex.get(i, j) + gain * (hz_above - hz_below) / dy);
            }
        }
        for j in p.j_min..=p.j_max {
            for (i, hz_right, hz_left) in [
                (p.i_min - 1, 0.0, old.hz.get(p.i_min - 1, j)),
                (p.i_max, old.hz.get(p.i_max + 1, j), 0.0),
            ] {
                let (decay, gain) = coefficients(eps_ey[[i, j]], sigma_ey[[i, j]]);
                new.ey.set(i, j, decay * old.ey.get(i, j) - gain * (hz_right - hz_left) / dx);
            }
        }

        // the fine rim Hz of the previous step stands in for the coarse Hz
        let previous = n as isize - 1;
        let (top, right) = (layout.size_hzy - 1, layout.size_hzx - 1);
        for i in 0..layout.size_hzx {
            let ic = p.i_min + layout.coarse_column(i);
            let share = layout.rim_share_x(i);
            for (j, sign, fine) in [
                (p.j_min - 1, 1.0, self.field.hz(previous, i, 0)),
                (p.j_max, -1.0, self.field.hz(previous, i, top)),
            ] {
                let (_, gain) = coefficients(eps_ex[[ic, j]], sigma_ex[[ic, j]]);
                new.ex.add(ic, j, sign * gain / dy * fine / share);
            }
        }
        for j in 0..layout.size_hzy {
            let jc = p.j_min + layout.coarse_row(j);
            let share = layout.rim_share_y(j);
            for (i, sign, fine) in [
                (p.i_min - 1, -1.0, self.field.hz(previous, 0, j)),
                (p.i_max, 1.0, self.field.hz(previous, right, j)),
            ] {
                let (_, gain) = coefficients(eps_ey[[i, jc]], sigma_ey[[i, jc]]);
                new.ey.add(i, jc, sign * gain / dx * fine / share);
            }
        }

        // corrected coarse E drives the fine rim
        self.field.clear_source();
        for i in 0..layout.size_hzx {
            let ic = p.i_min + layout.coarse_column(i);
            let below = new.ex.get(ic, p.j_min - 1);
            let above = new.ex.get(ic, p.j_max);
            let (bottom_row, top_row) = (layout.index_hz(i, 0), layout.index_hz(i, top));
            let (mu_bottom, mu_top) = (self.field.mu(i, 0), self.field.mu(i, top));
            let s = self.field.source_mut();
            s[bottom_row] -= dt / (mu_bottom * dy) * below;
            s[top_row] += dt / (mu_top * dy) * above;
        }
        for j in 0..layout.size_hzy {
            let jc = p.j_min + layout.coarse_row(j);
            let left = new.ey.get(p.i_min - 1, jc);
            let right_e = new.ey.get(p.i_max, jc);
            let (left_col, right_col) = (layout.index_hz(0, j), layout.index_hz(right, j));
            let (mu_left, mu_right) = (self.field.mu(0, j), self.field.mu(right, j));
            let s = self.field.source_mut();
            s[left_col] += dt / (mu_left * dx) * left;
            s[right_col] -= dt / (mu_right * dx) * right_e;
        }

        self.field.step(n).converged
    }

    /// H-side coupling; the implicit solve already carries it
    pub fn advance_h(&mut self, _n: usize) {}

    /// Whether a sensor's coarse cell lies in the refined box
    pub fn covers(&self, sensor: &ResolvedSensor) -> bool {
        self.placement.covers(sensor.i, sensor.j)
    }

    /// Fine Hz of step `n` nearest to the sensor position
    pub fn sensor_hz(&self, n: usize, sensor: &ResolvedSensor) -> f64 {
        let (i, j) = self.layout().sensor_node(sensor.position.x, sensor.position.y);
        self.field.hz(n as isize, i, j)
    }

    /// Flush the fine output samples after the last step
    pub fn finish(&mut self, last_step: usize) {
        self.field.finish(last_step);
    }

    pub fn into_field(self) -> SubgridField {
        self.field
    }
}
