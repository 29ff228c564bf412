//! Nonlinear-equation solvers built on the expression engine.
//!
//! [`algebraic_system::AlgebraicSystem`] is the container collaborators fill
//! with variables and equations. Solvers consume it and, on success, leave
//! the converged values in the variables:
//! - [`bisection::BisectionSolver`] -- bracketing root finder for one
//!   equation in one variable;
//! - [`scalar_newton::ScalarNewtonSolver`] -- one-dimensional Newton;
//! - [`newton::NewtonSolver`] -- dense multivariate Newton-Raphson over the
//!   whole system;
//! - [`decomposition::DecompositionSolver`] -- partitions the system into
//!   minimal blocks by structural analysis and solves them in dependency
//!   order, which is both faster and considerably more robust for the weakly
//!   coupled systems process models produce.
//!
//! # Example
//! ```
//! use flowsolve::expressions::equation::Equation;
//! use flowsolve::expressions::variable::Variable;
//! use flowsolve::numerics::Solver;
//! use flowsolve::numerics::algebraic_system::AlgebraicSystem;
//! use flowsolve::numerics::newton::NewtonSolver;
//!
//! let x = Variable::new("x", 1.0);
//! let y = Variable::new("y", 1.0);
//! let mut system = AlgebraicSystem::new("demo");
//! system.add_variables([x.clone(), y.clone()]).unwrap();
//! system.add_equation(Equation::new("circle", &x * &x + &y * &y - 10.0)).unwrap();
//! system.add_equation(Equation::new("line", &x - &y - 4.0)).unwrap();
//! NewtonSolver::new().solve(&system).unwrap();
//! assert!((x.val() - 3.0).abs() < 1e-6);
//! ```

pub mod algebraic_system;
pub mod bisection;
pub mod decomposition;
pub mod error;
pub mod newton;
pub mod scalar_newton;
pub mod scaling;

use algebraic_system::AlgebraicSystem;
use error::SolverError;

/// A solver for a whole [`AlgebraicSystem`].
///
/// `Ok(())` means the system converged and the variables hold the solution.
/// An error means the current variable values must not be trusted as
/// converged; they hold the last attempted iterate for inspection.
pub trait Solver {
    fn solve(&mut self, system: &AlgebraicSystem) -> Result<(), SolverError>;
}
