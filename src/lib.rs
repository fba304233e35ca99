//! fdtd-hsg - A Rust library for 2-D electromagnetic simulation with the
//! finite-difference time-domain method
//!
//! The coarse Yee grid (TE mode: Ex, Ey, Hz) is terminated by a split-field
//! PML and can carry current sources, total-field/scattered-field plane
//! waves, polygonal dielectric regions and refined subgrids solved
//! implicitly with BiCGSTAB. Runs advance in lockstep across worker threads
//! and produce bit-identical results for any thread count.

pub mod constants;
pub mod domain;
pub mod domain_decomposition;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod records;
pub mod settings;
pub mod utilities;

// Re-export commonly used types
pub use domain::simulation::{simulate, CancelToken, RunEvent, RunOutput, Simulation, SimulationBuilder};
pub use error::{Result, SimError};
pub use settings::Settings;

pub mod prelude {
    //! Common imports for setting up and running a simulation
    pub use crate::domain::iteration::SolverConfig;
    pub use crate::domain::simulation::{
        simulate, CancelToken, RunEvent, RunOutput, Simulation, SimulationBuilder,
    };
    pub use crate::error::SimError;
    pub use crate::geometry::Point;
    pub use crate::records::{read_records, write_records};
    pub use crate::settings::Settings;
    pub use crate::utilities::{
        CurrentSource, MaterialRegion, PlaneWave, Polarization, Sensor, SubgridDefinition, Waveform,
    };
}
