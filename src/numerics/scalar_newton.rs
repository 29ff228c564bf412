//! Newton iteration for one equation in one variable.

use crate::expressions::expression::Expr;
use crate::expressions::variable::Variable;

use super::error::SolverError;

/// Scalar Newton-Raphson: `x <- x - f(x) / f'(x)`, with steps applied
/// through [`Variable::add_delta`] so bounds are respected. Converged when
/// the step is below the tolerance. Used standalone and as the inner solver
/// for decomposition blocks of size one without a usable bracket.
pub struct ScalarNewtonSolver {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ScalarNewtonSolver {
    fn default() -> Self {
        ScalarNewtonSolver { max_iterations: 50, tolerance: 1e-6 }
    }
}

impl ScalarNewtonSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        ScalarNewtonSolver { max_iterations, tolerance }
    }

    pub fn solve(&self, residual: &Expr, x: &Variable) -> Result<(), SolverError> {
        for iteration in 0..=self.max_iterations {
            let fx = residual.val();
            if !fx.is_finite() {
                return Err(SolverError::NonFiniteResidual {
                    equation: residual.to_string(),
                    iteration,
                });
            }
            let dfx = residual.diff(x);
            if dfx == 0.0 || !dfx.is_finite() {
                return Err(SolverError::VanishingDerivative {
                    equation: residual.to_string(),
                    variable: x.name(),
                });
            }

            let delta = -fx / dfx;
            x.add_delta(delta);

            if delta.abs() < self.tolerance {
                return Ok(());
            }
        }

        Err(SolverError::IterationLimit {
            iterations: self.max_iterations,
            norm: residual.val().abs(),
        })
    }
}
