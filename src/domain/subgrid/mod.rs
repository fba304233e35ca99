//! Hybrid implicit subgridding
//!
//! [`SubgridField`] steps the fine grid implicitly; [`SubgridInterface`]
//! exchanges rim values with the coarse grid once per step.

pub mod field;
pub mod interface;

pub use field::{FineLayout, SubgridField};
pub use interface::SubgridInterface;
