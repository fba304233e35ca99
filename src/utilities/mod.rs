//! Entity definitions and their placement on the grid

pub mod materials;
pub mod plane_wave;
pub mod sensors;
pub mod sources;
pub mod subgrid;

pub use materials::{MaterialGrid, MaterialRegion};
pub use plane_wave::PlaneWave;
pub use sensors::{Sensor, SensorTrace};
pub use sources::{CurrentSource, Polarization, Waveform};
pub use subgrid::SubgridDefinition;
