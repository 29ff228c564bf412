//! Bracketing bisection for one equation in one variable.

use crate::expressions::expression::Expr;
use crate::expressions::variable::Variable;

use super::error::BisectionError;

/// Interval bisection with a final secant polish across the converged
/// bracket.
///
/// All variables other than the one being solved for are held at their
/// current values. On a bracket without a sign change the variable is
/// restored to its entry value; on iteration exhaustion it is left at the
/// last accepted midpoint.
pub struct BisectionSolver {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for BisectionSolver {
    fn default() -> Self {
        BisectionSolver { max_iterations: 100, tolerance: 1e-6 }
    }
}

impl BisectionSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        BisectionSolver { max_iterations, tolerance }
    }

    pub fn solve(
        &self,
        residual: &Expr,
        x: &Variable,
        lo: f64,
        hi: f64,
    ) -> Result<(), BisectionError> {
        let x0 = x.val();

        x.set_value(lo);
        let f_lo = residual.val();
        x.set_value(hi);
        let f_hi = residual.val();

        if f_lo == 0.0 {
            x.set_value(lo);
            return Ok(());
        }
        if f_hi == 0.0 {
            return Ok(());
        }
        if f_lo.signum() == f_hi.signum() {
            x.set_value(x0);
            return Err(BisectionError::NoSignChange { lo, hi, f_lo, f_hi });
        }

        let mut x1 = lo;
        let mut x2 = hi;
        for _ in 0..self.max_iterations {
            let mid = 0.5 * (x1 + x2);
            x.set_value(mid);
            let f_mid = residual.val();

            // keep the sign of f(hi) on the x2 side of the bracket
            if f_hi * f_mid > 0.0 {
                x2 = mid;
            } else {
                x1 = mid;
            }

            if (x2 - x1).abs() < self.tolerance {
                x.set_value(x1);
                let f1 = residual.val();
                x.set_value(x2);
                let f2 = residual.val();
                if (f2 - f1).abs() > 0.0 {
                    x.set_value(x2 - (x2 - x1) * f2 / (f2 - f1));
                }
                return Ok(());
            }
        }

        Err(BisectionError::IterationLimit {
            iterations: self.max_iterations,
            width: (x2 - x1).abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn finds_the_bracketed_cubic_root() {
        let x = Variable::new("x", 0.0);
        let f = Expr::from(&x).pow(3.0) - 5.0 * &x + 3.0;
        let solver = BisectionSolver::new(20, 1e-4);
        solver.solve(&f, &x, 1.0, 2.0).unwrap();
        assert_abs_diff_eq!(x.val(), 1.834243, epsilon = 1e-4);
        assert_abs_diff_eq!(f.val(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn reports_missing_sign_change_and_restores_the_variable() {
        let x = Variable::new("x", 0.7);
        let f = Expr::from(&x).pow(3.0) - 5.0 * &x + 3.0;
        let solver = BisectionSolver::new(20, 1e-4);
        let err = solver.solve(&f, &x, 2.0, 3.0).unwrap_err();
        assert!(matches!(err, BisectionError::NoSignChange { .. }));
        assert_eq!(x.val(), 0.7);
    }

    #[test]
    fn reports_iteration_exhaustion() {
        let x = Variable::new("x", 0.0);
        let f = Expr::from(&x).pow(3.0) - 5.0 * &x + 3.0;
        // two halvings cannot shrink [1, 2] below 1e-8
        let solver = BisectionSolver::new(2, 1e-8);
        let err = solver.solve(&f, &x, 1.0, 2.0).unwrap_err();
        assert!(matches!(err, BisectionError::IterationLimit { .. }));
    }

    #[test]
    fn other_variables_are_held_at_current_values() {
        let x = Variable::new("x", 0.0);
        let a = Variable::new("a", 4.0);
        let f = &x * &x - Expr::from(&a);
        let solver = BisectionSolver::default();
        solver.solve(&f, &x, 0.0, 10.0).unwrap();
        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-5);
        assert_eq!(a.val(), 4.0);
    }
}
