//! Storage shared between the stepping threads
//!
//! Access is ordered by the step barrier rather than by locks: inside a
//! phase each thread writes only the cells it owns, and a barrier action
//! runs while every other thread is parked.

use crate::engine::array::{FieldArray, FieldSet};
use std::cell::UnsafeCell;

/// Interior-mutable slot shared by all workers of a run
pub struct SharedCell<T> {
    value: UnsafeCell<T>,
}

// Workers only touch the contents under the barrier discipline above.
unsafe impl<T: Send> Sync for SharedCell<T> {}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self { value: UnsafeCell::new(value) }
    }

    /// Shared access
    ///
    /// # Safety
    /// No thread may hold a mutable reference obtained from [`Self::get_mut`]
    /// while the returned reference is alive.
    pub unsafe fn get(&self) -> &T {
        &*self.value.get()
    }

    /// Exclusive access
    ///
    /// # Safety
    /// The caller must be the only thread touching the cell, which holds
    /// inside a barrier action or before workers start.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        &mut *self.value.get()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// Raw row-major view of one field component
///
/// Element reads and writes go through the pointer so that threads writing
/// disjoint cells never materialize overlapping references.
#[derive(Debug, Clone, Copy)]
pub struct RawPlane {
    ptr: *mut f64,
    nx: usize,
    ny: usize,
}

unsafe impl Send for RawPlane {}
unsafe impl Sync for RawPlane {}

impl RawPlane {
    /// Capture a component's storage; the view stays valid until the array
    /// is moved or reallocated
    pub fn of(array: &mut FieldArray) -> Self {
        let (nx, ny) = array.shape_tuple();
        debug_assert!(array.data.is_standard_layout());
        Self { ptr: array.data.as_mut_ptr(), nx, ny }
    }

    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny, "({i}, {j}) outside {}x{}", self.nx, self.ny);
        i * self.ny + j
    }

    /// # Safety
    /// No other thread may be writing `(i, j)` during this phase.
    #[inline]
    pub unsafe fn get(&self, i: usize, j: usize) -> f64 {
        *self.ptr.add(self.offset(i, j))
    }

    /// # Safety
    /// The calling thread must own `(i, j)` for this phase.
    #[inline]
    pub unsafe fn set(&self, i: usize, j: usize, value: f64) {
        *self.ptr.add(self.offset(i, j)) = value;
    }

    /// # Safety
    /// Same contract as [`Self::set`].
    #[inline]
    pub unsafe fn add(&self, i: usize, j: usize, delta: f64) {
        *self.ptr.add(self.offset(i, j)) += delta;
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }
}

/// Raw views of the three components of one work slot
#[derive(Debug, Clone, Copy)]
pub struct RawSlot {
    pub ex: RawPlane,
    pub ey: RawPlane,
    pub hz: RawPlane,
}

impl RawSlot {
    pub fn of(set: &mut FieldSet) -> Self {
        Self {
            ex: RawPlane::of(&mut set.ex),
            ey: RawPlane::of(&mut set.ey),
            hz: RawPlane::of(&mut set.hz),
        }
    }
}
