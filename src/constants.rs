//! Physical constants shared by the coarse and fine engines

/// Speed of light in vacuum (m/s)
pub const C0: f64 = 299_792_458.0;

/// Vacuum permittivity (F/m)
pub const EPSILON0: f64 = 8.8541878176E-12;

/// Vacuum permeability (H/m)
pub const MU0: f64 = 1.2566370614E-6;

/// Free-space wave impedance used by the plane-wave source (Ohm)
pub const ETA0: f64 = 377.0;

/// Distance reported by the polygon queries when no crossing qualifies
pub const FAR_DISTANCE: f64 = 1E10;

/// Slots in the sliding work ring, enough for the subgrid's two-step lookback
pub const WORK_BUFFER_SLOTS: usize = 4;
