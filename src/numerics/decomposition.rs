//! Structural block decomposition of a nonlinear system.
//!
//! Rather than always solving the full coupled system, this solver finds the
//! minimal groups of mutually dependent equations and variables and solves
//! them independently, smallest and earliest first:
//!
//! 1. structural incidence of every equation over the free variables;
//! 2. a perfect bipartite matching assigning each equation the variable it
//!    will be solved for (augmenting paths, deterministic tie-breaks);
//! 3. a dependency graph over equations: A points to B when A's residual
//!    depends on the variable assigned to B;
//! 4. strongly connected components of that graph (each SCC is the minimal
//!    block that must be solved jointly), which Tarjan's algorithm already
//!    yields in reverse topological order -- exactly the required schedule;
//! 5. per-block solving: singleton blocks go through the scalar path
//!    (bisection over the variable's bounds when they bracket a sign change,
//!    scalar Newton otherwise), coupled blocks through a Newton solve
//!    restricted to the block, with upstream variables already known and
//!    downstream variables held at their current values;
//! 6. on a block failure, optionally one full Newton solve over everything
//!    not yet converged.
//!
//! Nothing is cached between `solve` calls: incidence, matching and blocks
//! are derived fresh from the system's current free/fixed variable split, so
//! fixing or unfixing a variable between calls just works.

use std::cmp::Ordering;

use itertools::Itertools;
use log::{debug, error, info, warn};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::expressions::equation::Equation;
use crate::expressions::variable::Variable;

use super::Solver;
use super::algebraic_system::AlgebraicSystem;
use super::bisection::BisectionSolver;
use super::error::SolverError;
use super::newton::NewtonSolver;
use super::scalar_newton::ScalarNewtonSolver;

/// Bounds wider than this are treated as absent when deriving a bisection
/// bracket.
const USABLE_BOUND: f64 = 1e19;

/// The inner solver a block was given to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSolver {
    Bisection,
    ScalarNewton,
    BlockNewton,
    FullNewtonFallback,
}

/// What happened to a block.
#[derive(Debug)]
pub enum BlockOutcome {
    Solved,
    Failed(String),
    /// Not attempted because an upstream block had already failed.
    Skipped,
}

/// One scheduled block: its equations, the variables they were assigned to
/// solve for, the inner solver chosen, and the outcome.
#[derive(Debug)]
pub struct Subproblem {
    pub name: String,
    pub equations: Vec<Equation>,
    pub variables: Vec<Variable>,
    pub solver: BlockSolver,
    pub outcome: BlockOutcome,
}

impl Subproblem {
    pub fn size(&self) -> usize {
        self.equations.len()
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.outcome, BlockOutcome::Solved)
    }
}

pub struct DecompositionSolver {
    pub newton_tolerance: f64,
    pub newton_max_iterations: usize,
    pub scalar_max_iterations: usize,
    /// Drop the inner solvers' iteration traces to debug level.
    pub suppress_block_logging: bool,
    /// After a block failure, try one full Newton solve over everything not
    /// yet converged.
    pub fallback_to_full_newton: bool,
    pub show_statistics: bool,
    subproblems: Vec<Subproblem>,
}

impl Default for DecompositionSolver {
    fn default() -> Self {
        DecompositionSolver {
            newton_tolerance: 1e-6,
            newton_max_iterations: 70,
            scalar_max_iterations: 50,
            suppress_block_logging: true,
            fallback_to_full_newton: true,
            show_statistics: true,
            subproblems: Vec::new(),
        }
    }
}

impl DecompositionSolver {
    pub fn new() -> Self {
        DecompositionSolver::default()
    }

    /// The blocks produced and processed by the last [`Solver::solve`] call,
    /// in scheduling order.
    pub fn subproblems(&self) -> &[Subproblem] {
        &self.subproblems
    }

    fn block_newton(&self) -> NewtonSolver {
        NewtonSolver {
            tolerance: self.newton_tolerance,
            max_iterations: self.newton_max_iterations,
            quiet: self.suppress_block_logging,
            ..NewtonSolver::default()
        }
    }

    /// Scalar path for a singleton block: bisection over the variable's
    /// bounds when they are usable and bracket a sign change, scalar Newton
    /// otherwise.
    fn solve_scalar_block(
        &self,
        equation: &Equation,
        variable: &Variable,
    ) -> (BlockSolver, Result<(), SolverError>) {
        let lo = variable.lower_bound();
        let hi = variable.upper_bound();
        if lo > -USABLE_BOUND && hi < USABLE_BOUND {
            let bisection =
                BisectionSolver::new(self.scalar_max_iterations.max(60), self.newton_tolerance);
            match bisection.solve(equation.residual(), variable, lo, hi) {
                Ok(()) => return (BlockSolver::Bisection, Ok(())),
                Err(reason) => {
                    debug!(
                        "bisection on {} over [{}, {}] not applicable ({}), using scalar newton",
                        equation.name(),
                        lo,
                        hi,
                        reason
                    );
                }
            }
        }
        let newton = ScalarNewtonSolver::new(self.scalar_max_iterations, self.newton_tolerance);
        (BlockSolver::ScalarNewton, newton.solve(equation.residual(), variable))
    }

    fn solve_newton_block(
        &self,
        block_name: &str,
        equations: &[Equation],
        variables: &[Variable],
    ) -> Result<(), SolverError> {
        let mut block = AlgebraicSystem::new(block_name);
        block.add_variables(variables.iter().cloned())?;
        for equation in equations {
            block.add_equation(equation.clone())?;
        }
        self.block_newton().solve(&block)
    }

    fn log_worst_residuals(&self, equations: &[Equation]) {
        error!("the most problematic constraints are:");
        let mut by_violation: Vec<&Equation> = equations.iter().collect();
        by_violation.sort_by(|a, b| {
            b.residual_value()
                .abs()
                .partial_cmp(&a.residual_value().abs())
                .unwrap_or(Ordering::Equal)
        });
        for equation in by_violation.iter().take(10) {
            error!("{:>20.8e}  ({})", equation.residual_value(), equation.name());
        }
    }

    /// One full Newton solve over every block from `from` on (the failed one
    /// and everything scheduled after it).
    fn fallback(&mut self, system: &AlgebraicSystem, from: usize) -> Result<(), SolverError> {
        let mut equations = Vec::new();
        let mut variables = Vec::new();
        for subproblem in &self.subproblems[from..] {
            equations.extend(subproblem.equations.iter().cloned());
            variables.extend(subproblem.variables.iter().cloned());
        }
        warn!(
            "falling back to a full newton solve over the remaining {} equations of {}",
            equations.len(),
            system.name()
        );
        let result = self.solve_newton_block(&format!("{} fallback", system.name()), &equations, &variables);
        self.subproblems.push(Subproblem {
            name: "fallback".to_string(),
            equations,
            variables,
            solver: BlockSolver::FullNewtonFallback,
            outcome: match &result {
                Ok(()) => BlockOutcome::Solved,
                Err(reason) => BlockOutcome::Failed(reason.to_string()),
            },
        });
        result
    }
}

impl Solver for DecompositionSolver {
    fn solve(&mut self, system: &AlgebraicSystem) -> Result<(), SolverError> {
        self.subproblems.clear();

        let free_variables = system.free_variables();
        let incidence = system.structural_incidence();
        let n_eq = system.number_of_equations();
        let n_var = free_variables.len();

        let (assigned_var, assigned_eq) = match_equations_to_variables(&incidence, n_var);

        let unmatched_equations: Vec<String> = (0..n_eq)
            .filter(|&e| assigned_var[e].is_none())
            .map(|e| system.equations()[e].name().to_string())
            .collect();
        let unmatched_variables: Vec<String> = (0..n_var)
            .filter(|&j| assigned_eq[j].is_none())
            .map(|j| free_variables[j].name())
            .collect();
        if !unmatched_equations.is_empty() || !unmatched_variables.is_empty() {
            if !unmatched_equations.is_empty() {
                error!(
                    "system {} has an overconstrained part; consider removing one of these constraints:",
                    system.name()
                );
                for name in &unmatched_equations {
                    error!("  {}", name);
                }
            }
            if !unmatched_variables.is_empty() {
                error!(
                    "system {} has an underspecified part; consider fixing one of these variables:",
                    system.name()
                );
                for name in &unmatched_variables {
                    error!("  {}", name);
                }
            }
            return Err(SolverError::StructuralSingularity {
                unmatched_equations,
                unmatched_variables,
            });
        }

        // Dependency graph over equations: a -> b when a's residual depends
        // on the variable assigned to b.
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n_eq, 0);
        let nodes: Vec<NodeIndex> = (0..n_eq).map(|e| graph.add_node(e)).collect();
        for a in 0..n_eq {
            for &j in &incidence[a] {
                let b = assigned_eq[j].expect("every free variable is matched");
                if b != a && !graph.contains_edge(nodes[a], nodes[b]) {
                    graph.add_edge(nodes[a], nodes[b], ());
                }
            }
        }
        let components = tarjan_scc(&graph);

        info!(
            "decomposition of {}: V = {}, E = {}, blocks = {}, singletons = {}",
            system.name(),
            n_var,
            n_eq,
            components.len(),
            components.iter().filter(|c| c.len() == 1).count()
        );
        if self.show_statistics {
            info!("{:>8} {:>8} {:>9}", "size", "blocks", "% blocks");
            for (size, count) in components.iter().map(|c| c.len()).counts().into_iter().sorted() {
                info!(
                    "{:>8} {:>8} {:>8.1}%",
                    size,
                    count,
                    100.0 * count as f64 / components.len() as f64
                );
            }
        }

        let mut failure: Option<(usize, usize, SolverError)> = None;
        for component in &components {
            let mut block_equations_idx: Vec<usize> =
                component.iter().map(|&node| graph[node]).collect();
            block_equations_idx.sort_unstable();

            let equations: Vec<Equation> = block_equations_idx
                .iter()
                .map(|&e| system.equations()[e].clone())
                .collect();
            let variables: Vec<Variable> = block_equations_idx
                .iter()
                .map(|&e| free_variables[assigned_var[e].expect("matched")].clone())
                .collect();
            let index = self.subproblems.len();
            let name = format!("block {}", index + 1);
            let size = equations.len();

            if failure.is_some() {
                self.subproblems.push(Subproblem {
                    name,
                    equations,
                    variables,
                    solver: if size == 1 {
                        BlockSolver::ScalarNewton
                    } else {
                        BlockSolver::BlockNewton
                    },
                    outcome: BlockOutcome::Skipped,
                });
                continue;
            }

            let (solver, result) = if size == 1 {
                self.solve_scalar_block(&equations[0], &variables[0])
            } else {
                (
                    BlockSolver::BlockNewton,
                    self.solve_newton_block(&name, &equations, &variables),
                )
            };

            match result {
                Ok(()) => {
                    debug!("{} (size {}) solved", name, size);
                    self.subproblems.push(Subproblem {
                        name,
                        equations,
                        variables,
                        solver,
                        outcome: BlockOutcome::Solved,
                    });
                }
                Err(reason) => {
                    error!("solving {} (size {}) of {} failed: {}", name, size, system.name(), reason);
                    self.log_worst_residuals(&equations);
                    self.subproblems.push(Subproblem {
                        name,
                        equations,
                        variables,
                        solver,
                        outcome: BlockOutcome::Failed(reason.to_string()),
                    });
                    failure = Some((index, size, reason));
                }
            }
        }

        match failure {
            None => {
                info!("problem {} was successfully solved ({} blocks)", system.name(), components.len());
                Ok(())
            }
            Some((index, size, source)) => {
                if self.fallback_to_full_newton && self.fallback(system, index).is_ok() {
                    info!("problem {} was solved by the full-newton fallback", system.name());
                    return Ok(());
                }
                error!("problem {} was not successfully solved", system.name());
                Err(SolverError::Block { index, size, source: Box::new(source) })
            }
        }
    }
}

/// Perfect bipartite matching of equations to the free variables they depend
/// on, by augmenting paths (Kuhn's algorithm). Deterministic tie-breaks make
/// the decomposition reproducible: equations are processed by ascending
/// incidence degree (then index), candidate variables tried by ascending
/// equation-degree (then index).
fn match_equations_to_variables(
    incidence: &[Vec<usize>],
    n_var: usize,
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let n_eq = incidence.len();

    let mut variable_degree = vec![0usize; n_var];
    for row in incidence {
        for &j in row {
            variable_degree[j] += 1;
        }
    }
    let candidates: Vec<Vec<usize>> = incidence
        .iter()
        .map(|row| {
            let mut columns = row.clone();
            columns.sort_by_key(|&j| (variable_degree[j], j));
            columns
        })
        .collect();

    let mut order: Vec<usize> = (0..n_eq).collect();
    order.sort_by_key(|&e| (incidence[e].len(), e));

    let mut assigned_var: Vec<Option<usize>> = vec![None; n_eq];
    let mut assigned_eq: Vec<Option<usize>> = vec![None; n_var];
    for &e in &order {
        let mut visited = vec![false; n_var];
        augment(e, &candidates, &mut visited, &mut assigned_var, &mut assigned_eq);
    }
    (assigned_var, assigned_eq)
}

fn augment(
    equation: usize,
    candidates: &[Vec<usize>],
    visited: &mut [bool],
    assigned_var: &mut [Option<usize>],
    assigned_eq: &mut [Option<usize>],
) -> bool {
    for &j in &candidates[equation] {
        if visited[j] {
            continue;
        }
        visited[j] = true;
        let free = match assigned_eq[j] {
            None => true,
            Some(other) => augment(other, candidates, visited, assigned_var, assigned_eq),
        };
        if free {
            assigned_eq[j] = Some(equation);
            assigned_var[equation] = Some(j);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::functions::exp;
    use approx::assert_abs_diff_eq;

    fn diagonal_system() -> (AlgebraicSystem, Variable, Variable, Variable) {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 0.5);
        let z = Variable::new("z", 0.0);
        let mut system = AlgebraicSystem::new("diagonal");
        system.add_variables([x.clone(), y.clone(), z.clone()]).unwrap();
        system.add_equation(Equation::new("ex", &x * &x - 4.0)).unwrap();
        system.add_equation(Equation::new("ey", exp(&y) - 1.0)).unwrap();
        system.add_equation(Equation::new("ez", 3.0 * &z - 6.0)).unwrap();
        (system, x, y, z)
    }

    #[test]
    fn diagonal_system_gives_one_singleton_block_per_equation() {
        let (system, x, y, z) = diagonal_system();
        let mut solver = DecompositionSolver::new();
        solver.solve(&system).unwrap();

        assert_eq!(solver.subproblems().len(), system.number_of_equations());
        for subproblem in solver.subproblems() {
            assert_eq!(subproblem.size(), 1);
            assert!(subproblem.is_solved());
            assert!(matches!(
                subproblem.solver,
                BlockSolver::ScalarNewton | BlockSolver::Bisection
            ));
        }
        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.val(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(z.val(), 2.0, epsilon = 1e-6);

        // full newton from the same start agrees with the decomposed solve
        x.set_value(1.0);
        y.set_value(0.5);
        z.set_value(0.0);
        NewtonSolver { max_iterations: 50, ..NewtonSolver::default() }.solve(&system).unwrap();
        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.val(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(z.val(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn bounded_singleton_goes_through_bisection() {
        let x = Variable::new("x", 0.1);
        x.set_bounds(0.0, 10.0);
        let mut system = AlgebraicSystem::new("bounded");
        system.add_variable(x.clone()).unwrap();
        system.add_equation(Equation::new("e", &x * &x - 4.0)).unwrap();

        let mut solver = DecompositionSolver::new();
        solver.solve(&system).unwrap();
        assert_eq!(solver.subproblems()[0].solver, BlockSolver::Bisection);
        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn cascade_is_scheduled_in_dependency_order() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 0.0);
        let z = Variable::new("z", 0.0);
        let mut system = AlgebraicSystem::new("cascade");
        system.add_variables([x.clone(), y.clone(), z.clone()]).unwrap();
        let ex = Equation::new("ex", &x * &x - 4.0);
        let ey = Equation::new("ey", &x + &y - 5.0);
        let ez = Equation::new("ez", &x * &y + &z - 7.0);
        system.add_equation(ex.clone()).unwrap();
        system.add_equation(ey.clone()).unwrap();
        system.add_equation(ez.clone()).unwrap();

        let mut solver = DecompositionSolver::new();
        solver.solve(&system).unwrap();

        let blocks = solver.subproblems();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].equations, vec![ex]);
        assert_eq!(blocks[0].variables, vec![x.clone()]);
        assert_eq!(blocks[1].equations, vec![ey]);
        assert_eq!(blocks[1].variables, vec![y.clone()]);
        assert_eq!(blocks[2].equations, vec![ez]);
        assert_eq!(blocks[2].variables, vec![z.clone()]);

        assert_abs_diff_eq!(x.val(), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.val(), 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(z.val(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn coupled_blocks_are_solved_jointly() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let w = Variable::new("w", 0.0);
        let mut system = AlgebraicSystem::new("coupled");
        system.add_variables([x.clone(), y.clone(), w.clone()]).unwrap();
        system.add_equation(Equation::new("circle", &x * &x + &y * &y - 10.0)).unwrap();
        system.add_equation(Equation::new("line", &x - &y - 4.0)).unwrap();
        system.add_equation(Equation::new("downstream", &x + &y + &w - 10.0)).unwrap();

        let mut solver = DecompositionSolver::new();
        solver.solve(&system).unwrap();

        let blocks = solver.subproblems();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].size(), 2);
        assert_eq!(blocks[0].solver, BlockSolver::BlockNewton);
        assert_eq!(blocks[1].size(), 1);

        assert_abs_diff_eq!(x.val(), 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.val(), -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w.val(), 8.0, epsilon = 1e-6);
    }

    #[test]
    fn reports_structural_singularity_with_detail() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("underspecified");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e", &x + &y - 5.0)).unwrap();

        let mut solver = DecompositionSolver::new();
        let err = solver.solve(&system).unwrap_err();
        match err {
            SolverError::StructuralSingularity { unmatched_equations, unmatched_variables } => {
                assert!(unmatched_equations.is_empty());
                assert_eq!(unmatched_variables.len(), 1);
            }
            other => panic!("expected a structural singularity, got {other}"),
        }
    }

    #[test]
    fn fixing_a_variable_changes_the_assignment_on_resolve() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 1.0);
        let mut system = AlgebraicSystem::new("swap");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e", &x + &y - 5.0)).unwrap();

        let mut solver = DecompositionSolver::new();

        x.fix(2.0);
        solver.solve(&system).unwrap();
        assert_eq!(solver.subproblems()[0].variables, vec![y.clone()]);
        assert_abs_diff_eq!(y.val(), 3.0, epsilon = 1e-6);

        // swap the specification without touching the system object
        x.unfix();
        y.fix(4.0);
        solver.solve(&system).unwrap();
        assert_eq!(solver.subproblems()[0].variables, vec![x.clone()]);
        assert_abs_diff_eq!(x.val(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn block_failure_is_reported_and_fallback_recorded() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 0.0);
        let mut system = AlgebraicSystem::new("rootless");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("no-root", &x * &x + 1.0)).unwrap();
        system.add_equation(Equation::new("fine", &y - 3.0)).unwrap();

        let mut solver = DecompositionSolver::new();
        let err = solver.solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::Block { .. }));

        let last = solver.subproblems().last().unwrap();
        assert_eq!(last.solver, BlockSolver::FullNewtonFallback);
        assert!(matches!(last.outcome, BlockOutcome::Failed(_)));
        assert!(
            solver
                .subproblems()
                .iter()
                .any(|s| matches!(s.outcome, BlockOutcome::Failed(_)))
        );
    }

    #[test]
    fn block_failure_without_fallback_stops_and_reports() {
        let x = Variable::new("x", 1.0);
        let mut system = AlgebraicSystem::new("rootless");
        system.add_variable(x.clone()).unwrap();
        system.add_equation(Equation::new("no-root", &x * &x + 1.0)).unwrap();

        let mut solver = DecompositionSolver::new();
        solver.fallback_to_full_newton = false;
        let err = solver.solve(&system).unwrap_err();
        assert!(matches!(err, SolverError::Block { index: 0, size: 1, .. }));
        assert!(
            !solver
                .subproblems()
                .iter()
                .any(|s| s.solver == BlockSolver::FullNewtonFallback)
        );
    }

    #[test]
    fn subproblems_are_rebuilt_on_every_solve() {
        let (system, ..) = diagonal_system();
        let mut solver = DecompositionSolver::new();
        solver.solve(&system).unwrap();
        assert_eq!(solver.subproblems().len(), 3);
        solver.solve(&system).unwrap();
        assert_eq!(solver.subproblems().len(), 3);
    }

    #[test]
    fn matching_prefers_scarce_variables() {
        // e0 touches x and y, e1 touches only x: e1 must get x, e0 gets y
        let incidence = vec![vec![0, 1], vec![0]];
        let (assigned_var, assigned_eq) = match_equations_to_variables(&incidence, 2);
        assert_eq!(assigned_var, vec![Some(1), Some(0)]);
        assert_eq!(assigned_eq, vec![Some(1), Some(0)]);
    }

    #[test]
    fn matching_reports_deficiency() {
        // two equations compete for one variable
        let incidence = vec![vec![0], vec![0]];
        let (assigned_var, _) = match_equations_to_variables(&incidence, 1);
        assert_eq!(assigned_var.iter().filter(|a| a.is_some()).count(), 1);
    }
}
