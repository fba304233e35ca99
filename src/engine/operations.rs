//! Dense vector operations for the iterative solver
//!
//! Reductions run sequentially so results do not depend on how many
//! threads happen to be available.

/// Inner product
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Mix two vectors: out = alpha * a + beta * b
pub fn mix(alpha: f64, a: &[f64], beta: f64, b: &[f64], out: &mut [f64]) {
    debug_assert!(a.len() == out.len() && b.len() == out.len());
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = alpha * x + beta * y;
    }
}

/// y += alpha * x
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (o, v) in y.iter_mut().zip(x) {
        *o += alpha * v;
    }
}

/// Copy data from one vector to another
pub fn copy(source: &[f64], dest: &mut [f64]) {
    dest.copy_from_slice(source);
}
