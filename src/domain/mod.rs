//! Field engines and the time loop that drives them

pub mod domain_trait;
pub mod field;
pub mod iteration;
pub mod pml;
pub mod simulation;
pub mod subgrid;

pub use domain_trait::{FieldUpdate, StepSlots};
pub use field::{FieldEngine, GridContext};
pub use pml::PmlBoundary;
pub use simulation::{simulate, CancelToken, RunEvent, RunOutput, Simulation, SimulationBuilder};
