//! Update trait shared by the grid engines of one time loop

use crate::constants::WORK_BUFFER_SLOTS;
use crate::domain_decomposition::Area;
use crate::engine::{FieldExtents, RawSlot};
use std::fmt::Debug;

/// The work slots read and written by step `n`
#[derive(Debug, Clone, Copy)]
pub struct StepSlots {
    pub n: usize,
    /// Fields after step `n - 1`
    pub old: RawSlot,
    /// Fields being computed for step `n`
    pub new: RawSlot,
}

impl StepSlots {
    /// Pick the slots of step `n` out of the ring
    pub fn at(n: usize, ring: &[RawSlot]) -> Self {
        Self {
            n,
            old: ring[(n + WORK_BUFFER_SLOTS - 1) % WORK_BUFFER_SLOTS],
            new: ring[n % WORK_BUFFER_SLOTS],
        }
    }
}

/// Trait defining one engine's share of a leapfrog step
///
/// Every call writes only cells the engine owns. The caller separates
/// the phases with barriers, so a phase may read any cell finalized by
/// an earlier phase.
pub trait FieldUpdate: Debug + Send {
    /// E half step; returns false if a subgrid solve missed its tolerance
    fn update_e(&mut self, slots: &StepSlots) -> bool;

    /// H half step from the E values of this step
    fn update_h(&mut self, slots: &StepSlots);

    /// Bookkeeping once every engine has finished the H half step
    fn finish_step(&mut self, _slots: &StepSlots) {}

    /// Cells written by this engine
    fn areas(&self) -> Vec<Area>;

    /// Running min/max of the fields this engine tracks
    fn extents(&self) -> FieldExtents {
        FieldExtents::default()
    }
}
