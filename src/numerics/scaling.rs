//! Log-sum matrix scaling for ill-conditioned Jacobians.
//!
//! Computes diagonal factors `U`, `V` so that the entries of `U * A * V` are
//! near unity in the sense that the sum of squared logarithms of the entries
//! is minimized (Chang & Reid; Gajulapalli & Lasdon, "Scaling Sparse Matrices
//! for Optimization Algorithms", algorithms 1 and 2). Exponents are integer
//! powers of the basis, found by Gauss-Seidel sweeps and clamped to +-10.

use nalgebra::{DMatrix, DVector};

pub struct LogSumScaling {
    basis: f64,
}

impl Default for LogSumScaling {
    fn default() -> Self {
        LogSumScaling { basis: 2.0 }
    }
}

impl LogSumScaling {
    pub fn new(basis: f64) -> Self {
        LogSumScaling { basis }
    }

    /// Row factors `U` and column factors `V` for `a`. Zero or non-finite
    /// entries are treated as structural zeros; empty rows and columns get a
    /// factor of one.
    pub fn factors(&self, a: &DMatrix<f64>) -> (DVector<f64>, DVector<f64>) {
        let (m, n) = a.shape();
        let log_b = self.basis.log10();

        let mut row_count = vec![0usize; m];
        let mut col_count = vec![0usize; n];
        let mut row_target = vec![0.0f64; m];
        let mut col_target = vec![0.0f64; n];
        let mut occupied = vec![vec![false; n]; m];

        for i in 0..m {
            for j in 0..n {
                let entry = a[(i, j)];
                if entry != 0.0 && entry.is_finite() {
                    row_count[i] += 1;
                    col_count[j] += 1;
                    occupied[i][j] = true;
                    let t = -(entry.abs().log10() / log_b + 0.5);
                    row_target[i] += t;
                    col_target[j] += t;
                }
            }
        }
        for i in 0..m {
            if row_count[i] > 0 {
                row_target[i] /= row_count[i] as f64;
            }
        }
        for j in 0..n {
            if col_count[j] > 0 {
                col_target[j] /= col_count[j] as f64;
            }
        }

        let mut row_exp = vec![0i32; m];
        let mut col_exp = vec![0i32; n];
        let mut previous_row: Option<Vec<i32>> = None;
        let mut previous_col: Option<Vec<i32>> = None;
        let mut row_stable = false;
        let mut col_stable = false;

        for _ in 0..=8 {
            if row_stable && col_stable {
                break;
            }

            let mut t = row_target.clone();
            for i in 0..m {
                if row_count[i] == 0 {
                    continue;
                }
                for j in 0..n {
                    if occupied[i][j] {
                        t[i] -= col_exp[j] as f64 / row_count[i] as f64;
                    }
                }
            }
            for i in 0..m {
                row_exp[i] = t[i].round() as i32;
            }
            row_stable = previous_row.as_deref() == Some(row_exp.as_slice());
            previous_row = Some(row_exp.clone());

            let mut t = col_target.clone();
            for j in 0..n {
                if col_count[j] == 0 {
                    continue;
                }
                for i in 0..m {
                    if occupied[i][j] {
                        t[j] -= row_exp[i] as f64 / col_count[j] as f64;
                    }
                }
            }
            for j in 0..n {
                col_exp[j] = t[j].round() as i32;
            }
            col_stable = previous_col.as_deref() == Some(col_exp.as_slice());
            previous_col = Some(col_exp.clone());
        }

        let u = DVector::from_fn(m, |i, _| self.basis.powi(row_exp[i].clamp(-10, 10)));
        let v = DVector::from_fn(n, |j, _| self.basis.powi(col_exp[j].clamp(-10, 10)));
        (u, v)
    }
}
