//! Implicitly stepped fine grid of a subgrid region
//!
//! The fine Yee grid is stored as one flattened state vector: all Hz
//! first, then Ex, then Ey. Each step solves
//!
//! ```text
//! A x[n] = B x[n-1] + C x[n-2] + s
//! ```
//!
//! where `s` carries the coarse-grid forcing on the rim Hz nodes. The E
//! rows average Hz over three time levels with weights 1/4, 1/2, 1/4,
//! which keeps the update stable at the coarse timestep. The ring and
//! output buffers follow the same swap-when-stale scheme as the coarse
//! grid.

use crate::constants::{EPSILON0, MU0, WORK_BUFFER_SLOTS};
use crate::domain::iteration::{BiCgStab, IterationResult, SolverConfig};
use crate::engine::sparse::{CsrMatrix, TripletBuilder};
use crate::engine::FieldExtents;
use crate::error::{Result, SimError};
use crate::geometry::Point;
use crate::settings::{Differentials, Settings};
use crate::utilities::materials::{sample_at, ResolvedMaterial};
use crate::utilities::subgrid::SubgridPlacement;

/// Dimensions and index maps of the fine grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FineLayout {
    pub x_ratio: usize,
    pub y_ratio: usize,
    pub size_exx: usize,
    pub size_exy: usize,
    pub size_eyx: usize,
    pub size_eyy: usize,
    pub size_hzx: usize,
    pub size_hzy: usize,
    /// Fine cell pitch along x
    pub dx: f64,
    /// Fine cell pitch along y
    pub dy: f64,
    /// Coarse cell pitch, used by the rim coupling
    pub coarse_dx: f64,
    pub coarse_dy: f64,
    pub bottom_left: Point,
}

impl FineLayout {
    /// The two outer coarse cells keep a single fine node each, the inner
    /// ones are refined by the ratios
    pub fn new(placement: &SubgridPlacement, d: &Differentials) -> Self {
        let (xr, yr) = (placement.x_ratio, placement.y_ratio);
        let inner_x = xr * (placement.cells_x - 2);
        let inner_y = yr * (placement.cells_y - 2);
        Self {
            x_ratio: xr,
            y_ratio: yr,
            size_exx: inner_x + 2,
            size_exy: inner_y + 1,
            size_eyx: inner_x + 1,
            size_eyy: inner_y + 2,
            size_hzx: inner_x + 2,
            size_hzy: inner_y + 2,
            dx: d.dx / xr as f64,
            dy: d.dy / yr as f64,
            coarse_dx: d.dx,
            coarse_dy: d.dy,
            bottom_left: placement.bottom_left,
        }
    }

    pub fn size_hz(&self) -> usize {
        self.size_hzx * self.size_hzy
    }

    pub fn size_ex(&self) -> usize {
        self.size_exx * self.size_exy
    }

    pub fn size_ey(&self) -> usize {
        self.size_eyx * self.size_eyy
    }

    /// Length of the flattened state vector
    pub fn len(&self) -> usize {
        self.size_hz() + self.size_ex() + self.size_ey()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index_hz(&self, i: usize, j: usize) -> usize {
        i + j * self.size_hzx
    }

    #[inline]
    pub fn index_ex(&self, i: usize, j: usize) -> usize {
        self.size_hz() + i + j * self.size_exx
    }

    #[inline]
    pub fn index_ey(&self, i: usize, j: usize) -> usize {
        self.size_hz() + self.size_ex() + i + j * self.size_eyx
    }

    /// Coarse column offset (from `i_min`) holding fine Hz column `i`
    #[inline]
    pub fn coarse_column(&self, i: usize) -> usize {
        (1 + (i as isize - 1).div_euclid(self.x_ratio as isize)) as usize
    }

    #[inline]
    pub fn coarse_row(&self, j: usize) -> usize {
        (1 + (j as isize - 1).div_euclid(self.y_ratio as isize)) as usize
    }

    /// Fine nodes sharing one coarse cell along the rim: one at the ends,
    /// `ratio` elsewhere
    #[inline]
    pub fn rim_share_x(&self, i: usize) -> f64 {
        if i == 0 || i == self.size_hzx - 1 {
            1.0
        } else {
            self.x_ratio as f64
        }
    }

    #[inline]
    pub fn rim_share_y(&self, j: usize) -> f64 {
        if j == 0 || j == self.size_hzy - 1 {
            1.0
        } else {
            self.y_ratio as f64
        }
    }

    /// Physical position of fine Hz node `(i, j)`
    pub fn hz_position(&self, i: usize, j: usize) -> Point {
        Point::new(
            self.bottom_left.x
                + self.coarse_dx / 2.0
                + (i as f64 + (self.x_ratio as f64 - 1.0) / 2.0) * self.dx,
            self.bottom_left.y
                + self.coarse_dy / 2.0
                + (j as f64 + (self.y_ratio as f64 - 1.0) / 2.0) * self.dy,
        )
    }

    /// Fine Hz node read by a sensor at `(x, y)`, clamped into the grid
    pub fn sensor_node(&self, x: f64, y: f64) -> (usize, usize) {
        let i = ((x - self.bottom_left.x) / self.dx - self.x_ratio as f64 + 1.0).max(0.0) as usize;
        let j = ((y - self.bottom_left.y) / self.dy - self.y_ratio as f64 + 1.0).max(0.0) as usize;
        (i.min(self.size_hzx - 1), j.min(self.size_hzy - 1))
    }
}

/// Fine-grid engine: operators, solver, state ring and output history
#[derive(Debug)]
pub struct SubgridField {
    layout: FineLayout,
    /// mu for Hz unknowns, eps for E unknowns
    parameters: Vec<f64>,
    /// sigma for the E unknowns, offset by `size_hz`
    conductivity: Vec<f64>,
    b: CsrMatrix,
    c: CsrMatrix,
    solver: BiCgStab,
    work: Vec<Vec<f64>>,
    output: Vec<Vec<f64>>,
    source: Vec<f64>,
    rhs: Vec<f64>,
    sample_distance: usize,
    extents: FieldExtents,
    solves: usize,
    missed: usize,
}

impl SubgridField {
    /// Rasterize the fine materials and assemble the three operators
    pub fn build(
        placement: &SubgridPlacement,
        settings: &Settings,
        d: &Differentials,
        materials: &[ResolvedMaterial],
        solver: SolverConfig,
    ) -> Result<Self> {
        let layout = FineLayout::new(placement, d);
        let len = layout.len();
        let size_hz = layout.size_hz();

        let mut parameters = try_vec(len, EPSILON0)?;
        parameters[..size_hz].iter_mut().for_each(|p| *p = MU0);
        let mut conductivity = try_vec(len - size_hz, 0.0)?;

        for i in 0..layout.size_hzx {
            for j in 0..layout.size_hzy {
                let p = layout.hz_position(i, j);
                if let Some(m) = sample_at(materials, p.x, p.y) {
                    parameters[layout.index_hz(i, j)] = m.mu;
                }
                if i < layout.size_hzx - 1 {
                    if let Some(m) = sample_at(materials, p.x + layout.dx / 2.0, p.y) {
                        let k = layout.index_ey(i, j);
                        parameters[k] = m.eps;
                        conductivity[k - size_hz] = m.sigma;
                    }
                }
                if j < layout.size_hzy - 1 {
                    if let Some(m) = sample_at(materials, p.x, p.y + layout.dy / 2.0) {
                        let k = layout.index_ex(i, j);
                        parameters[k] = m.eps;
                        conductivity[k - size_hz] = m.sigma;
                    }
                }
            }
        }

        let (a, b, c) = assemble(&layout, &parameters, &conductivity, d.dt);
        tracing::debug!(
            unknowns = len,
            nnz_a = a.nnz(),
            nnz_b = b.nnz(),
            nnz_c = c.nnz(),
            size_hzx = layout.size_hzx,
            size_hzy = layout.size_hzy,
            "assembled subgrid operators"
        );

        let mut work = Vec::new();
        work.try_reserve_exact(WORK_BUFFER_SLOTS)
            .map_err(|_| SimError::Allocation { what: "subgrid ring", elements: WORK_BUFFER_SLOTS })?;
        for _ in 0..WORK_BUFFER_SLOTS {
            work.push(try_vec(len, 0.0)?);
        }
        let samples = settings.samples();
        let mut output = Vec::new();
        output
            .try_reserve_exact(samples)
            .map_err(|_| SimError::Allocation { what: "subgrid output", elements: samples })?;
        for _ in 0..samples {
            output.push(try_vec(len, 0.0)?);
        }

        Ok(Self {
            layout,
            parameters,
            conductivity,
            b,
            c,
            solver: BiCgStab::new(a, solver),
            work,
            output,
            source: try_vec(len, 0.0)?,
            rhs: try_vec(len, 0.0)?,
            sample_distance: settings.sample_distance,
            extents: FieldExtents::default(),
            solves: 0,
            missed: 0,
        })
    }

    pub fn layout(&self) -> &FineLayout {
        &self.layout
    }

    /// Permeability at fine Hz node `(i, j)`
    pub fn mu(&self, i: usize, j: usize) -> f64 {
        self.parameters[self.layout.index_hz(i, j)]
    }

    pub fn sigma_ex(&self, i: usize, j: usize) -> f64 {
        self.conductivity[self.layout.index_ex(i, j) - self.layout.size_hz()]
    }

    /// Implicit operator
    pub fn matrix_a(&self) -> &CsrMatrix {
        self.solver.matrix()
    }

    pub fn matrix_b(&self) -> &CsrMatrix {
        &self.b
    }

    pub fn matrix_c(&self) -> &CsrMatrix {
        &self.c
    }

    #[inline]
    fn slot(step: isize) -> usize {
        step.rem_euclid(WORK_BUFFER_SLOTS as isize) as usize
    }

    /// Fine Hz at `(i, j)` for step `n` (negative steps read the zero start)
    pub fn hz(&self, n: isize, i: usize, j: usize) -> f64 {
        self.work[Self::slot(n)][self.layout.index_hz(i, j)]
    }

    pub fn ex(&self, n: isize, i: usize, j: usize) -> f64 {
        self.work[Self::slot(n)][self.layout.index_ex(i, j)]
    }

    pub fn ey(&self, n: isize, i: usize, j: usize) -> f64 {
        self.work[Self::slot(n)][self.layout.index_ey(i, j)]
    }

    /// Coarse forcing vector, zeroed by [`Self::clear_source`]
    pub fn source_mut(&mut self) -> &mut [f64] {
        &mut self.source
    }

    pub fn clear_source(&mut self) {
        self.source.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Solve for step `n` into its ring slot
    pub fn step(&mut self, n: usize) -> IterationResult {
        let w = WORK_BUFFER_SLOTS;
        // the slot about to be overwritten still holds step n - W
        if n >= w && (n - w) % self.sample_distance == 0 {
            self.transfer(n - w);
        }

        let new = n % w;
        let old1 = Self::slot(n as isize - 1);
        let old2 = Self::slot(n as isize - 2);

        self.b.matvec_into(&self.work[old1], &mut self.rhs);
        self.c.matvec_add(&self.work[old2], &mut self.rhs);
        for (r, s) in self.rhs.iter_mut().zip(&self.source) {
            *r += s;
        }

        let (guess, target) = two_slots(&mut self.work, old1, new);
        target.copy_from_slice(guess);
        let result = self.solver.solve_with_guess(&self.rhs, target);

        let size_hz = self.layout.size_hz();
        let size_ex = self.layout.size_ex();
        let state = &self.work[new];
        self.extents.observe_components(
            &state[size_hz..size_hz + size_ex],
            &state[size_hz + size_ex..],
            &state[..size_hz],
        );

        self.solves += 1;
        if !result.converged {
            self.missed += 1;
            tracing::warn!(
                step = n,
                iterations = result.iterations,
                residual = result.residual_norm,
                "subgrid solve missed its tolerance"
            );
        }
        result
    }

    /// Move the state of step `m` into its output sample
    fn transfer(&mut self, m: usize) {
        let sample = m / self.sample_distance;
        if let Some(out) = self.output.get_mut(sample) {
            std::mem::swap(out, &mut self.work[m % WORK_BUFFER_SLOTS]);
        }
    }

    /// Flush the samples still held by the ring after the last step
    pub fn finish(&mut self, last_step: usize) {
        let first = (last_step + 1).saturating_sub(WORK_BUFFER_SLOTS);
        for m in first..=last_step {
            if m % self.sample_distance == 0 {
                self.transfer(m);
            }
        }
    }

    pub fn samples(&self) -> usize {
        self.output.len()
    }

    /// Ex of output sample `k`
    pub fn sample_ex(&self, k: usize, i: usize, j: usize) -> f64 {
        self.output[k][self.layout.index_ex(i, j)]
    }

    pub fn sample_ey(&self, k: usize, i: usize, j: usize) -> f64 {
        self.output[k][self.layout.index_ey(i, j)]
    }

    pub fn sample_hz(&self, k: usize, i: usize, j: usize) -> f64 {
        self.output[k][self.layout.index_hz(i, j)]
    }

    pub fn extents(&self) -> FieldExtents {
        self.extents
    }

    /// Solves performed and how many missed the tolerance
    pub fn solve_counts(&self) -> (usize, usize) {
        (self.solves, self.missed)
    }
}

fn try_vec(len: usize, value: f64) -> Result<Vec<f64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SimError::Allocation { what: "subgrid vector", elements: len })?;
    v.resize(len, value);
    Ok(v)
}

/// Borrow one ring slot shared and another mutably
fn two_slots(work: &mut [Vec<f64>], read: usize, write: usize) -> (&[f64], &mut [f64]) {
    debug_assert_ne!(read, write);
    if read < write {
        let (lo, hi) = work.split_at_mut(write);
        (&lo[read], &mut hi[0])
    } else {
        let (lo, hi) = work.split_at_mut(read);
        (&hi[0], &mut lo[write])
    }
}

/// Build A, B and C
fn assemble(
    layout: &FineLayout,
    parameters: &[f64],
    conductivity: &[f64],
    dt: f64,
) -> (CsrMatrix, CsrMatrix, CsrMatrix) {
    let n = layout.len();
    let size_hz = layout.size_hz();
    let (dx, dy) = (layout.dx, layout.dy);
    let mut a = TripletBuilder::with_capacity(n, n, 5 * n);
    let mut b = TripletBuilder::with_capacity(n, n, 3 * n);
    let mut c = TripletBuilder::with_capacity(n, n, 2 * n);

    for i in 0..layout.size_exx {
        for j in 0..layout.size_exy {
            let row = layout.index_ex(i, j);
            let (eps, sigma) = (parameters[row], conductivity[row - size_hz]);
            let k = 2.0 * dt / (2.0 * eps + sigma * dt);
            let f = if j == 0 || j == layout.size_exy - 1 {
                0.5 * (1.0 + layout.y_ratio as f64)
            } else {
                1.0
            };

            a.push(row, row, 1.0);
            b.push(row, row, (2.0 * eps - sigma * dt) / (2.0 * eps + sigma * dt));

            let up = layout.index_hz(i, j + 1);
            a.push(row, up, -k / (4.0 * dy * f));
            b.push(row, up, k / (2.0 * dy * f));
            c.push(row, up, k / (4.0 * dy * f));

            let down = layout.index_hz(i, j);
            a.push(row, down, k / (4.0 * dy * f));
            b.push(row, down, -k / (2.0 * dy * f));
            c.push(row, down, -k / (4.0 * dy * f));
        }
    }

    for i in 0..layout.size_eyx {
        for j in 0..layout.size_eyy {
            let row = layout.index_ey(i, j);
            let (eps, sigma) = (parameters[row], conductivity[row - size_hz]);
            let k = 2.0 * dt / (2.0 * eps + sigma * dt);
            let f = if i == 0 || i == layout.size_eyx - 1 {
                0.5 * (1.0 + layout.x_ratio as f64)
            } else {
                1.0
            };

            a.push(row, row, 1.0);
            b.push(row, row, (2.0 * eps - sigma * dt) / (2.0 * eps + sigma * dt));

            let right = layout.index_hz(i + 1, j);
            a.push(row, right, k / (4.0 * dx * f));
            b.push(row, right, -k / (2.0 * dx * f));
            c.push(row, right, -k / (4.0 * dx * f));

            let left = layout.index_hz(i, j);
            a.push(row, left, -k / (4.0 * dx * f));
            b.push(row, left, k / (2.0 * dx * f));
            c.push(row, left, k / (4.0 * dx * f));
        }
    }

    for i in 0..layout.size_hzx {
        for j in 0..layout.size_hzy {
            let row = layout.index_hz(i, j);
            let mu = parameters[row];
            a.push(row, row, 1.0);
            b.push(row, row, 1.0);

            let fy = if j == 0 || j == layout.size_hzy - 1 { layout.y_ratio as f64 } else { 1.0 };
            if j < layout.size_exy {
                a.push(row, layout.index_ex(i, j), -dt / (mu * dy * fy));
            }
            if j > 0 {
                a.push(row, layout.index_ex(i, j - 1), dt / (mu * dy * fy));
            }

            let fx = if i == 0 || i == layout.size_hzx - 1 { layout.x_ratio as f64 } else { 1.0 };
            if i < layout.size_eyx {
                a.push(row, layout.index_ey(i, j), dt / (mu * dx * fx));
            }
            if i > 0 {
                a.push(row, layout.index_ey(i - 1, j), -dt / (mu * dx * fx));
            }
        }
    }

    (a.into_csr(), b.into_csr(), c.into_csr())
}
