//! Error types for the solver
//!
//! Every error here is raised before worker threads start. Faults detected
//! while stepping travel over the run-event channel instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("degenerate {entity} rectangle: ({x0}, {y0}) - ({x1}, {y1})")]
    DegenerateRectangle {
        entity: &'static str,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },

    #[error("invalid material region: {0}")]
    InvalidMaterial(String),

    #[error("{entity} at ({x}, {y}) lies outside the interior grid")]
    OutsideGrid { entity: &'static str, x: f64, y: f64 },

    #[error("subgrid footprints {first} and {second} overlap")]
    OverlappingSubgrids { first: usize, second: usize },

    #[error("thread layout mismatch: {spawned} workers for {configured} configured threads")]
    ThreadMismatch { configured: usize, spawned: usize },

    #[error("failed to allocate {what} ({elements} elements)")]
    Allocation { what: &'static str, elements: usize },

    #[error("record parse error at token {token}: {message}")]
    Parse { token: usize, message: String },

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),
}

pub type Result<T> = std::result::Result<T, SimError>;
