//! Core array types for the staggered grid
//!
//! `FieldArray` wraps a 2-D ndarray in row-major (C) order, indexed as
//! `[i, j]` with `i` along x. A `FieldSet` holds the three Yee components
//! of one timestep slot.

use crate::error::{Result, SimError};
use ndarray::Array2;
use num_traits::Float;

/// A 2-D field or material component
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArray<T = f64> {
    /// The underlying ndarray
    pub data: Array2<T>,
}

impl<T> FieldArray<T>
where
    T: Float,
{
    /// Create a zero array, reporting allocation failure instead of aborting
    pub fn try_zeros(shape: (usize, usize)) -> Result<Self> {
        Self::try_from_scalar(shape, T::zero())
    }

    /// Create an array filled with `value`, reporting allocation failure
    pub fn try_from_scalar(shape: (usize, usize), value: T) -> Result<Self> {
        let elements = shape
            .0
            .checked_mul(shape.1)
            .ok_or(SimError::Allocation { what: "field array", elements: usize::MAX })?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(elements)
            .map_err(|_| SimError::Allocation { what: "field array", elements })?;
        buffer.resize(elements, value);
        let data = Array2::from_shape_vec(shape, buffer)
            .map_err(|_| SimError::Allocation { what: "field array", elements })?;
        Ok(Self { data })
    }

    /// Get the shape as a tuple
    pub fn shape_tuple(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Get the total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Smallest and largest value, `None` for an empty array
    pub fn min_max(&self) -> Option<(T, T)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

/// The three Yee components of one timestep slot
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    /// Ex at (i, j + 1/2)
    pub ex: FieldArray,
    /// Ey at (i + 1/2, j)
    pub ey: FieldArray,
    /// Hz at (i + 1/2, j + 1/2)
    pub hz: FieldArray,
}

impl FieldSet {
    pub fn try_zeros(shape: (usize, usize)) -> Result<Self> {
        Ok(Self {
            ex: FieldArray::try_zeros(shape)?,
            ey: FieldArray::try_zeros(shape)?,
            hz: FieldArray::try_zeros(shape)?,
        })
    }

    pub fn shape_tuple(&self) -> (usize, usize) {
        self.hz.shape_tuple()
    }
}

/// Allocate `count` zeroed slots
pub fn try_field_sets(count: usize, shape: (usize, usize)) -> Result<Vec<FieldSet>> {
    let mut sets = Vec::new();
    sets.try_reserve_exact(count)
        .map_err(|_| SimError::Allocation { what: "field slots", elements: count })?;
    for _ in 0..count {
        sets.push(FieldSet::try_zeros(shape)?);
    }
    Ok(sets)
}

/// Running min/max of each field component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldExtents {
    pub ex: (f64, f64),
    pub ey: (f64, f64),
    pub hz: (f64, f64),
    /// Set once any observed value was NaN or infinite
    pub non_finite: bool,
}

impl Default for FieldExtents {
    fn default() -> Self {
        let empty = (f64::INFINITY, f64::NEG_INFINITY);
        Self { ex: empty, ey: empty, hz: empty, non_finite: false }
    }
}

impl FieldExtents {
    /// Widen each range by one cell's values; a non-finite value only
    /// raises the flag
    #[inline]
    pub fn observe(&mut self, ex: f64, ey: f64, hz: f64) {
        for (range, v) in [(&mut self.ex, ex), (&mut self.ey, ey), (&mut self.hz, hz)] {
            if v.is_finite() {
                widen(range, v);
            } else {
                self.non_finite = true;
            }
        }
    }

    /// Widen each range over whole component slices of differing lengths
    pub fn observe_components(&mut self, ex: &[f64], ey: &[f64], hz: &[f64]) {
        for (range, values) in [(&mut self.ex, ex), (&mut self.ey, ey), (&mut self.hz, hz)] {
            for &v in values {
                if v.is_finite() {
                    widen(range, v);
                } else {
                    self.non_finite = true;
                }
            }
        }
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: &FieldExtents) {
        self.ex = (self.ex.0.min(other.ex.0), self.ex.1.max(other.ex.1));
        self.ey = (self.ey.0.min(other.ey.0), self.ey.1.max(other.ey.1));
        self.hz = (self.hz.0.min(other.hz.0), self.hz.1.max(other.hz.1));
        self.non_finite |= other.non_finite;
    }

    /// Whether nothing has been observed yet
    pub fn is_empty(&self) -> bool {
        self.hz.0 > self.hz.1
    }
}

#[inline]
fn widen(range: &mut (f64, f64), v: f64) {
    if v < range.0 {
        range.0 = v;
    }
    if v > range.1 {
        range.1 = v;
    }
}
