//! Error types for the nonlinear solvers.

use thiserror::Error;

/// Failure reported by a solver. A returned error means "do not trust the
/// current variable values as converged" -- the last iterate is left in the
/// variables for inspection, and retrying with different initial values or
/// specifications is the normal recovery path.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("system {name} is not square: {equations} equations, {free_variables} free variables")]
    NotSquare { name: String, equations: usize, free_variables: usize },

    #[error("variable {name} already included in system {system}")]
    DuplicateVariable { name: String, system: String },

    #[error("equation {name} already included in system {system}")]
    DuplicateEquation { name: String, system: String },

    #[error(
        "structural singularity: no perfect equation-variable matching \
         (unmatched equations: {unmatched_equations:?}, unmatched variables: {unmatched_variables:?})"
    )]
    StructuralSingularity {
        unmatched_equations: Vec<String>,
        unmatched_variables: Vec<String>,
    },

    #[error("jacobian is singular at iteration {iteration}")]
    SingularJacobian { iteration: usize },

    #[error("residual of {equation} became non-finite at iteration {iteration}")]
    NonFiniteResidual { equation: String, iteration: usize },

    #[error("jacobian entry d({equation})/d({variable}) became non-finite at iteration {iteration}")]
    NonFiniteJacobian { equation: String, variable: String, iteration: usize },

    #[error("derivative of {equation} with respect to {variable} vanished")]
    VanishingDerivative { equation: String, variable: String },

    #[error("diverged: residual norm {norm:e} at iteration {iteration}")]
    Diverged { norm: f64, iteration: usize },

    #[error("no convergence within {iterations} iterations, residual norm {norm:e}")]
    IterationLimit { iterations: usize, norm: f64 },

    #[error("decomposition block {index} (size {size}) failed: {source}")]
    Block {
        index: usize,
        size: usize,
        #[source]
        source: Box<SolverError>,
    },
}

/// Failure of the bracketing bisection solver.
#[derive(Error, Debug)]
pub enum BisectionError {
    #[error("no sign change in bracket [{lo}, {hi}]: f(lo) = {f_lo}, f(hi) = {f_hi}")]
    NoSignChange { lo: f64, hi: f64, f_lo: f64, f_hi: f64 },

    #[error("no convergence within {iterations} iterations, bracket width {width:e}")]
    IterationLimit { iterations: usize, width: f64 },
}
