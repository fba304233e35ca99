//! Iteration methods for the implicit subgrid update
//!
//! Implements preconditioned BiCGSTAB for the nonsymmetric systems the
//! subgrid assembles once per run and solves once per timestep.

use crate::engine::operations::{axpy, copy, dot, mix, norm};
use crate::engine::sparse::{CsrMatrix, IncompleteLu};

/// Result of a solve; the solution is written into the caller's vector
#[derive(Debug, Clone)]
pub struct IterationResult {
    /// Number of iterations performed
    pub iterations: usize,
    /// Final residual norm relative to the right-hand side
    pub residual_norm: f64,
    /// Whether the threshold was reached
    pub converged: bool,
    /// History of relative residual norms (if requested)
    pub residual_history: Option<Vec<f64>>,
}

/// Preconditioner applied on the right of the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionerKind {
    /// Zero-fill incomplete LU
    IncompleteLu,
    /// No preconditioning
    Identity,
}

/// Configuration for the BiCGSTAB solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Convergence threshold for the relative residual norm
    pub threshold: f64,
    pub preconditioner: PreconditionerKind,
    /// Whether to record full residual history
    pub full_residuals: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            threshold: 1e-12,
            preconditioner: PreconditionerKind::IncompleteLu,
            full_residuals: false,
        }
    }
}

/// A matrix bound to its preconditioner and scratch vectors
#[derive(Debug, Clone)]
pub struct BiCgStab {
    matrix: CsrMatrix,
    ilu: Option<IncompleteLu>,
    config: SolverConfig,
    scratch: Scratch,
}

#[derive(Debug, Clone)]
struct Scratch {
    r: Vec<f64>,
    r_hat: Vec<f64>,
    p: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    t: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            r: vec![0.0; n],
            r_hat: vec![0.0; n],
            p: vec![0.0; n],
            v: vec![0.0; n],
            s: vec![0.0; n],
            t: vec![0.0; n],
            y: vec![0.0; n],
            z: vec![0.0; n],
        }
    }
}

impl BiCgStab {
    /// Bind a square matrix; falls back to no preconditioning when the
    /// incomplete factorization breaks down
    pub fn new(matrix: CsrMatrix, config: SolverConfig) -> Self {
        assert_eq!(matrix.nrows, matrix.ncols, "BiCGSTAB needs a square operator");
        let ilu = match config.preconditioner {
            PreconditionerKind::IncompleteLu => {
                let ilu = IncompleteLu::new(&matrix);
                if ilu.is_none() {
                    tracing::warn!("incomplete LU broke down, solving unpreconditioned");
                }
                ilu
            }
            PreconditionerKind::Identity => None,
        };
        let scratch = Scratch::new(matrix.nrows);
        Self { matrix, ilu, config, scratch }
    }

    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    pub fn is_preconditioned(&self) -> bool {
        self.ilu.is_some()
    }

    fn precondition(ilu: &Option<IncompleteLu>, input: &[f64], out: &mut [f64]) {
        match ilu {
            Some(ilu) => ilu.apply(input, out),
            None => copy(input, out),
        }
    }

    /// Solve A x = b starting from the guess already in `x`
    pub fn solve_with_guess(&mut self, b: &[f64], x: &mut [f64]) -> IterationResult {
        let n = self.matrix.nrows;
        assert!(b.len() == n && x.len() == n);
        let a = &self.matrix;
        let ilu = &self.ilu;
        let Scratch { r, r_hat, p, v, s, t, y, z } = &mut self.scratch;

        let mut residual_history = self
            .config
            .full_residuals
            .then(|| Vec::with_capacity(self.config.max_iterations));

        let b_norm = norm(b);
        if b_norm == 0.0 {
            x.iter_mut().for_each(|xi| *xi = 0.0);
            return IterationResult {
                iterations: 0,
                residual_norm: 0.0,
                converged: true,
                residual_history,
            };
        }

        // r = b - A x
        a.matvec_into(x, r);
        for (ri, bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
        let mut residual_norm = norm(r) / b_norm;
        if residual_norm <= self.config.threshold {
            return IterationResult { iterations: 0, residual_norm, converged: true, residual_history };
        }

        copy(r, r_hat);
        p.iter_mut().for_each(|e| *e = 0.0);
        v.iter_mut().for_each(|e| *e = 0.0);
        let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
        let mut iterations = 0;
        let mut converged = false;

        for i in 0..self.config.max_iterations {
            iterations = i + 1;

            let rho_next = dot(r_hat, r);
            if rho_next == 0.0 || omega == 0.0 {
                break;
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;

            // p = r + beta (p - omega v)
            for ((pi, ri), vi) in p.iter_mut().zip(r.iter()).zip(v.iter()) {
                *pi = ri + beta * (*pi - omega * vi);
            }

            Self::precondition(ilu, p, y);
            a.matvec_into(y, v);
            let denominator = dot(r_hat, v);
            if denominator == 0.0 {
                break;
            }
            alpha = rho / denominator;

            // s = r - alpha v
            mix(1.0, r, -alpha, v, s);
            let s_norm = norm(s) / b_norm;
            if s_norm <= self.config.threshold {
                axpy(alpha, y, x);
                residual_norm = s_norm;
                if let Some(history) = residual_history.as_mut() {
                    history.push(residual_norm);
                }
                converged = true;
                break;
            }

            Self::precondition(ilu, s, z);
            a.matvec_into(z, t);
            let tt = dot(t, t);
            omega = if tt == 0.0 { 0.0 } else { dot(t, s) / tt };

            axpy(alpha, y, x);
            axpy(omega, z, x);
            mix(1.0, s, -omega, t, r);

            residual_norm = norm(r) / b_norm;
            if let Some(history) = residual_history.as_mut() {
                history.push(residual_norm);
            }
            if residual_norm <= self.config.threshold {
                converged = true;
                break;
            }
        }

        IterationResult { iterations, residual_norm, converged, residual_history }
    }
}
