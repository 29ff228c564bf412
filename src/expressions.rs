//! Expression graphs with forward-mode automatic differentiation.
//!
//! The building blocks of every model: [`variable::Variable`] unknowns,
//! [`expression::Expr`] DAG nodes with numeric `val()`/`diff()`, the
//! [`functions`] operator library, named [`equation::Equation`] residuals,
//! and a [`parser::ExpressionParser`] that turns infix text into graphs bound
//! to externally held variables.
//!
//! # Example
//! ```
//! use flowsolve::expressions::functions::exp;
//! use flowsolve::expressions::variable::Variable;
//!
//! let x = Variable::new("x", 2.0);
//! let y = Variable::new("y", 3.0);
//! let f = exp(&x / &y) + &x * &y;
//! assert!((f.diff(&x) - ((2.0f64 / 3.0).exp() / 3.0 + 3.0)).abs() < 1e-12);
//! ```

pub mod equation;
pub mod expression;
pub mod functions;
pub mod parser;
pub mod variable;
