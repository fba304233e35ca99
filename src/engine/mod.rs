//! Engine module containing array abstractions, sparse algebra and
//! the synchronization primitives of the stepping loop

pub mod array;
pub mod barrier;
pub mod operations;
pub mod shared;
pub mod sparse;

pub use array::{FieldArray, FieldExtents, FieldSet};
pub use barrier::StepBarrier;
pub use shared::{RawPlane, RawSlot, SharedCell};
pub use sparse::{CsrMatrix, IncompleteLu, TripletBuilder};
