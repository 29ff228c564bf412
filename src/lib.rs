// MIT License
//! # flowsolve
//!
//! Nonlinear algebraic equation solving for process-engineering models
//! (material and energy balances, phase-equilibrium relations).
//!
//! The crate combines an expression graph with forward-mode automatic
//! differentiation ([`expressions`]) and a family of solvers built on it
//! ([`numerics`]): scalar bisection and Newton, a dense multivariate
//! Newton-Raphson, and a structural block-decomposition solver that
//! partitions a sparse nonlinear system into minimal blocks and solves them
//! in dependency order.
//!
//! ```
//! use flowsolve::expressions::parser::ExpressionParser;
//! use flowsolve::expressions::variable::Variable;
//! use flowsolve::numerics::Solver;
//! use flowsolve::numerics::algebraic_system::AlgebraicSystem;
//! use flowsolve::numerics::decomposition::DecompositionSolver;
//!
//! let x = Variable::new("x", 1.0);
//! let y = Variable::new("y", 0.0);
//! let mut parser = ExpressionParser::new();
//! parser.register_variables([&x, &y]);
//!
//! let mut system = AlgebraicSystem::new("demo");
//! system.add_variables([x.clone(), y.clone()]).unwrap();
//! system.add_equation(parser.parse_equation("x^2 = 4").unwrap()).unwrap();
//! system.add_equation(parser.parse_equation("y = x + 1").unwrap()).unwrap();
//!
//! let mut solver = DecompositionSolver::new();
//! solver.solve(&system).unwrap();
//! assert_eq!(solver.subproblems().len(), 2);
//! assert!((x.val() - 2.0).abs() < 1e-6);
//! assert!((y.val() - 3.0).abs() < 1e-6);
//! ```

pub mod expressions;
pub mod logging;
pub mod numerics;
