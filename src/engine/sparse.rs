//! Sparse matrices for the implicit subgrid update
//!
//! Operators are assembled from (row, col, value) triplets and frozen into
//! compressed sparse row form. `IncompleteLu` is the zero-fill ILU used to
//! precondition the BiCGSTAB solve.

use rayon::prelude::*;

/// Rows above which matrix-vector products are split across the rayon pool
const PARALLEL_ROWS: usize = 8192;

/// Triplet accumulator; duplicate entries are summed on conversion
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    nrows: usize,
    ncols: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl TripletBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self { nrows, ncols, entries: Vec::new() }
    }

    pub fn with_capacity(nrows: usize, ncols: usize, capacity: usize) -> Self {
        Self { nrows, ncols, entries: Vec::with_capacity(capacity) }
    }

    /// Add `value` at (row, col)
    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        assert!(
            row < self.nrows && col < self.ncols,
            "triplet ({row}, {col}) outside {}x{}",
            self.nrows,
            self.ncols
        );
        self.entries.push((row, col, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort each row by column, merge duplicates, build CSR
    pub fn into_csr(mut self) -> CsrMatrix {
        self.entries.sort_by_key(|&(row, col, _)| (row, col));

        let mut row_ptr = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::with_capacity(self.entries.len());
        let mut values: Vec<f64> = Vec::with_capacity(self.entries.len());

        row_ptr.push(0);
        let mut current_row = 0;
        let mut last: Option<(usize, usize)> = None;
        for (row, col, value) in self.entries {
            while current_row < row {
                row_ptr.push(col_indices.len());
                current_row += 1;
            }
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += value;
                }
                continue;
            }
            col_indices.push(col);
            values.push(value);
            last = Some((row, col));
        }
        while current_row < self.nrows {
            row_ptr.push(col_indices.len());
            current_row += 1;
        }

        CsrMatrix { nrows: self.nrows, ncols: self.ncols, row_ptr, col_indices, values }
    }
}

/// Sparse matrix in compressed sparse row format, columns sorted per row
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub nrows: usize,
    pub ncols: usize,
    pub row_ptr: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored value at (row, col), zero if absent
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        match self.col_indices[range.clone()].binary_search(&col) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        self.col_indices[start..end]
            .iter()
            .zip(&self.values[start..end])
            .map(|(&col, &v)| v * x[col])
            .sum()
    }

    /// y = A x
    pub fn matvec_into(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        if self.nrows >= PARALLEL_ROWS {
            y.par_iter_mut()
                .enumerate()
                .for_each(|(row, out)| *out = self.row_dot(row, x));
        } else {
            for (row, out) in y.iter_mut().enumerate() {
                *out = self.row_dot(row, x);
            }
        }
    }

    /// y += A x
    pub fn matvec_add(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        if self.nrows >= PARALLEL_ROWS {
            y.par_iter_mut()
                .enumerate()
                .for_each(|(row, out)| *out += self.row_dot(row, x));
        } else {
            for (row, out) in y.iter_mut().enumerate() {
                *out += self.row_dot(row, x);
            }
        }
    }

    /// Compute y = A x
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.nrows];
        self.matvec_into(x, &mut y);
        y
    }

    /// Position of the diagonal entry of each row, `None` if any is missing
    fn diagonal_positions(&self) -> Option<Vec<usize>> {
        (0..self.nrows)
            .map(|row| {
                let range = self.row_ptr[row]..self.row_ptr[row + 1];
                self.col_indices[range.clone()]
                    .binary_search(&row)
                    .ok()
                    .map(|k| range.start + k)
            })
            .collect()
    }
}

/// Zero-fill incomplete LU factorization, stored in the pattern of A
///
/// L is unit lower triangular and shares storage with U.
#[derive(Debug, Clone)]
pub struct IncompleteLu {
    pattern: CsrMatrix,
    diagonal: Vec<usize>,
}

impl IncompleteLu {
    /// Factorize; `None` when a diagonal entry is missing or a pivot vanishes
    pub fn new(matrix: &CsrMatrix) -> Option<Self> {
        if matrix.nrows != matrix.ncols {
            return None;
        }
        let n = matrix.nrows;
        let diagonal = matrix.diagonal_positions()?;
        let mut lu = matrix.clone();
        let mut position = vec![usize::MAX; n];

        for i in 0..n {
            let (start, end) = (lu.row_ptr[i], lu.row_ptr[i + 1]);
            for p in start..end {
                position[lu.col_indices[p]] = p;
            }

            for p in start..end {
                let k = lu.col_indices[p];
                if k >= i {
                    break;
                }
                let pivot = lu.values[diagonal[k]];
                if pivot == 0.0 || !pivot.is_finite() {
                    return None;
                }
                lu.values[p] /= pivot;
                let factor = lu.values[p];
                for r in (diagonal[k] + 1)..lu.row_ptr[k + 1] {
                    let q = position[lu.col_indices[r]];
                    if q != usize::MAX {
                        lu.values[q] -= factor * lu.values[r];
                    }
                }
            }

            for p in start..end {
                position[lu.col_indices[p]] = usize::MAX;
            }
            if lu.values[diagonal[i]] == 0.0 {
                return None;
            }
        }

        Some(Self { pattern: lu, diagonal })
    }

    /// Solve (L U) z = r
    pub fn apply(&self, r: &[f64], z: &mut [f64]) {
        let lu = &self.pattern;
        let n = lu.nrows;

        // forward: L y = r
        for i in 0..n {
            let mut sum = r[i];
            for p in lu.row_ptr[i]..self.diagonal[i] {
                sum -= lu.values[p] * z[lu.col_indices[p]];
            }
            z[i] = sum;
        }
        // backward: U z = y
        for i in (0..n).rev() {
            let mut sum = z[i];
            for p in (self.diagonal[i] + 1)..lu.row_ptr[i + 1] {
                sum -= lu.values[p] * z[lu.col_indices[p]];
            }
            z[i] = sum / lu.values[self.diagonal[i]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tridiagonal(n: usize) -> CsrMatrix {
        let mut builder = TripletBuilder::new(n, n);
        for i in 0..n {
            builder.push(i, i, 4.0);
            if i > 0 {
                builder.push(i, i - 1, -1.0);
            }
            if i + 1 < n {
                builder.push(i, i + 1, -1.0);
            }
        }
        builder.into_csr()
    }

    #[test]
    fn test_duplicates_are_summed() {
        let mut builder = TripletBuilder::new(3, 3);
        builder.push(2, 1, 1.5);
        builder.push(0, 0, 1.0);
        builder.push(2, 1, 2.0);
        let m = builder.into_csr();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.row_ptr, vec![0, 1, 1, 2]);
        assert_relative_eq!(m.get(2, 1), 3.5);
        assert_relative_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn test_matvec() {
        let m = tridiagonal(4);
        let y = m.matvec(&[1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(y[0], 2.0);
        assert_relative_eq!(y[1], 4.0);
        assert_relative_eq!(y[2], 6.0);
        assert_relative_eq!(y[3], 13.0);

        let mut acc = vec![1.0; 4];
        m.matvec_add(&[1.0, 2.0, 3.0, 4.0], &mut acc);
        assert_relative_eq!(acc[3], 14.0);
    }

    #[test]
    fn test_ilu_is_exact_for_tridiagonal() {
        // ILU(0) introduces no dropped fill for a tridiagonal matrix
        let m = tridiagonal(6);
        let ilu = IncompleteLu::new(&m).unwrap();
        let b = [1.0, -2.0, 0.5, 3.0, 0.0, 1.0];
        let mut x = vec![0.0; 6];
        ilu.apply(&b, &mut x);
        let check = m.matvec(&x);
        for (got, want) in check.iter().zip(b.iter()) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ilu_rejects_missing_diagonal() {
        let mut builder = TripletBuilder::new(2, 2);
        builder.push(0, 1, 1.0);
        builder.push(1, 0, 1.0);
        assert!(IncompleteLu::new(&builder.into_csr()).is_none());
    }
}
