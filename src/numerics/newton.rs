//! Dense multivariate Newton-Raphson over an entire [`AlgebraicSystem`].

use std::collections::HashMap;

use log::{debug, error, info};
use nalgebra::{DMatrix, DVector};

use crate::expressions::variable::Variable;

use super::algebraic_system::AlgebraicSystem;
use super::error::SolverError;
use super::scaling::LogSumScaling;
use super::Solver;

const DIVERGENCE_LIMIT: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-3;
const SCALING_REFRESH_INTERVAL: usize = 5;

/// Full Newton-Raphson: residual vector and dense Jacobian from the
/// expression graph, LU solve for the step, bound-aware damping, convergence
/// on the residual infinity norm.
///
/// The step is scaled by the fraction of the distance to the nearest
/// variable bound (floored at 1e-3) times `brake_factor`, which keeps
/// iterates inside physically meaningful ranges on strongly nonlinear
/// residuals. With `enable_scaling` the linear system is preconditioned by
/// log-sum row/column scaling, refreshed every few iterations.
///
/// On failure the variables hold the last attempted iterate.
pub struct NewtonSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub brake_factor: f64,
    pub enable_scaling: bool,
    /// Route the per-iteration trace to `debug` instead of `info`. Set by
    /// the decomposition solver for its inner block solves.
    pub quiet: bool,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        NewtonSolver {
            tolerance: 1e-6,
            max_iterations: 20,
            brake_factor: 1.0,
            enable_scaling: true,
            quiet: false,
        }
    }
}

impl NewtonSolver {
    pub fn new() -> Self {
        NewtonSolver::default()
    }

    fn trace(&self, message: String) {
        if self.quiet {
            debug!("{}", message);
        } else {
            info!("{}", message);
        }
    }
}

impl Solver for NewtonSolver {
    fn solve(&mut self, system: &AlgebraicSystem) -> Result<(), SolverError> {
        let variables = system.free_variables();
        let n = system.number_of_equations();
        if variables.len() != n {
            error!(
                "newton solver requires a square system: {} has E = {}, V = {}",
                system.name(),
                n,
                variables.len()
            );
            return Err(SolverError::NotSquare {
                name: system.name().to_string(),
                equations: n,
                free_variables: variables.len(),
            });
        }

        if n == 0 {
            return Ok(());
        }

        let index: HashMap<Variable, usize> =
            variables.iter().cloned().enumerate().map(|(i, v)| (v, i)).collect();
        let scaling = LogSumScaling::default();
        let mut u = DVector::from_element(n, 1.0);
        let mut v = DVector::from_element(n, 1.0);
        let mut step_norm = 0.0;
        let mut infeasibility = f64::INFINITY;

        self.trace(format!(
            "{:<4} {:<15} {:<15} {:<7}",
            "iter", "step length", "infeasibility", "damping"
        ));

        let mut lambda = 1.0;
        for iteration in 0..=self.max_iterations {
            let mut residuals = DVector::zeros(n);
            for (i, equation) in system.equations().iter().enumerate() {
                let r = equation.residual_value();
                if !r.is_finite() {
                    error!("residual of {} is non-finite, aborting", equation.name());
                    return Err(SolverError::NonFiniteResidual {
                        equation: equation.name().to_string(),
                        iteration,
                    });
                }
                residuals[i] = r;
            }

            infeasibility = residuals.amax();
            self.trace(format!(
                "{:<4} {:<15.6e} {:<15.6e} {:<7.3}",
                iteration, step_norm, infeasibility, lambda
            ));

            if infeasibility < self.tolerance {
                self.trace(format!(
                    "problem {} solved: constraint violation below tolerance ({} iterations, NV = {})",
                    system.name(),
                    iteration,
                    n
                ));
                return Ok(());
            }
            if infeasibility > DIVERGENCE_LIMIT {
                error!("problem {} diverged", system.name());
                return Err(SolverError::Diverged { norm: infeasibility, iteration });
            }

            // Jacobian over the structural incidence; absent entries stay zero.
            let mut jacobian = DMatrix::zeros(n, n);
            for (i, equation) in system.equations().iter().enumerate() {
                for variable in equation.variables() {
                    if let Some(&j) = index.get(variable) {
                        let d = equation.residual().diff(variable);
                        if !d.is_finite() {
                            return Err(SolverError::NonFiniteJacobian {
                                equation: equation.name().to_string(),
                                variable: variable.name(),
                                iteration,
                            });
                        }
                        jacobian[(i, j)] = d;
                    }
                }
            }

            if self.enable_scaling {
                if iteration % SCALING_REFRESH_INTERVAL == 0 {
                    (u, v) = scaling.factors(&jacobian);
                }
                for i in 0..n {
                    residuals[i] *= u[i];
                    for j in 0..n {
                        jacobian[(i, j)] *= u[i] * v[j];
                    }
                }
            }

            let rhs = -&residuals;
            let mut delta = match jacobian.lu().solve(&rhs) {
                Some(delta) if delta.iter().all(|d| d.is_finite()) => delta,
                _ => {
                    error!("jacobian of {} is singular at iteration {}", system.name(), iteration);
                    return Err(SolverError::SingularJacobian { iteration });
                }
            };

            if self.enable_scaling {
                for j in 0..n {
                    delta[j] *= v[j];
                }
            }

            // Damp the step so no variable crosses its bounds in one jump.
            let mut distance_to_bound = 1.0f64;
            for (j, variable) in variables.iter().enumerate() {
                let step = delta[j];
                let mut distance = 1.0;
                if step > 0.0 && variable.val() < variable.upper_bound() - 1e-3 {
                    distance = variable.upper_bound() - variable.val();
                }
                if step < 0.0 && variable.val() > variable.lower_bound() + 1e-3 {
                    distance = variable.val() - variable.lower_bound();
                }
                let fraction = distance / step.abs();
                if fraction < distance_to_bound {
                    distance_to_bound = fraction;
                }
            }
            lambda = (distance_to_bound * self.brake_factor).max(MIN_DAMPING);

            step_norm = delta.norm();
            for (j, variable) in variables.iter().enumerate() {
                if delta[j].is_finite() {
                    variable.add_delta(lambda * delta[j]);
                }
            }
        }

        self.trace(format!("problem {}: maximum number of iterations exceeded", system.name()));
        Err(SolverError::IterationLimit { iterations: self.max_iterations, norm: infeasibility })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::equation::Equation;
    use crate::expressions::functions::{cos, exp, ln};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn solves_a_two_variable_system() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("circle-line");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("circle", &x * &x + &y * &y - 10.0)).unwrap();
        system.add_equation(Equation::new("line", &x - &y - 4.0)).unwrap();

        NewtonSolver::new().solve(&system).unwrap();
        assert_abs_diff_eq!(x.val(), 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.val(), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn solves_the_three_variable_benchmark() {
        let x1 = Variable::new("x1", 1.0);
        let x2 = Variable::new("x2", 1.0);
        let x3 = Variable::new("x3", 1.0);
        let mut system = AlgebraicSystem::new("benchmark");
        system.add_variables([x1.clone(), x2.clone(), x3.clone()]).unwrap();
        system
            .add_equation(Equation::new("f1", 3.0 * &x1 - cos(&x2 * &x3) - 1.5))
            .unwrap();
        system
            .add_equation(Equation::new(
                "f2",
                4.0 * (&x1 * &x1) - 625.0 * (&x2 * &x2) + 2.0 * &x2 - 1.0,
            ))
            .unwrap();
        system
            .add_equation(Equation::new(
                "f3",
                exp(-(&x1 * &x2)) + 20.0 * &x3 + (10.0 * PI - 3.0) / 3.0,
            ))
            .unwrap();

        let mut solver = NewtonSolver::new();
        solver.max_iterations = 50;
        solver.solve(&system).unwrap();

        assert_abs_diff_eq!(x1.val(), 0.833197, epsilon = 1e-6);
        assert_abs_diff_eq!(x2.val(), 0.054944, epsilon = 1e-6);
        assert_abs_diff_eq!(x3.val(), -0.521361, epsilon = 1e-6);
    }

    #[test]
    fn rejects_non_square_systems() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("under");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e", &x + &y - 2.0)).unwrap();
        let err = NewtonSolver::new().solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::NotSquare { free_variables: 2, equations: 1, .. }));
    }

    #[test]
    fn fixing_a_variable_makes_the_system_square() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("specified");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e", &x + &y - 5.0)).unwrap();

        x.fix(2.0);
        NewtonSolver::new().solve(&system).unwrap();
        assert_abs_diff_eq!(y.val(), 3.0, epsilon = 1e-6);
        assert_eq!(x.val(), 2.0);
    }

    #[test]
    fn reports_a_singular_jacobian() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("rank-deficient");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e1", &x + &y - 2.0)).unwrap();
        system.add_equation(Equation::new("e2", 2.0 * &x + 2.0 * &y - 4.0)).unwrap();
        let err = NewtonSolver::new().solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::SingularJacobian { .. }));
    }

    #[test]
    fn reports_non_finite_residuals() {
        let x = Variable::new("x", -1.0);
        let mut system = AlgebraicSystem::new("domain");
        system.add_variable(x.clone()).unwrap();
        system.add_equation(Equation::new("e", ln(&x) - 1.0)).unwrap();
        let err = NewtonSolver::new().solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::NonFiniteResidual { .. }));
    }

    #[test]
    fn bounded_variables_stay_within_bounds() {
        let x = Variable::new("x", 0.5);
        x.set_bounds(0.0, 5.0);
        let mut system = AlgebraicSystem::new("bounded");
        system.add_variable(x.clone()).unwrap();
        system.add_equation(Equation::new("e", &x * &x - 4.0)).unwrap();
        let mut solver = NewtonSolver::new();
        solver.max_iterations = 50;
        solver.solve(&system).unwrap();
        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn iteration_budget_failure_keeps_the_last_iterate() {
        let x = Variable::new("x", 10.0);
        let mut system = AlgebraicSystem::new("slow");
        system.add_variable(x.clone()).unwrap();
        system.add_equation(Equation::new("e", &x * &x - 4.0)).unwrap();
        let mut solver = NewtonSolver::new();
        solver.max_iterations = 1;
        let err = solver.solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::IterationLimit { .. }));
        assert_ne!(x.val(), 10.0);
    }
}
