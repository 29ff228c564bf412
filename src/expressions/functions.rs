//! Constructors for the elementary function nodes.
//!
//! Mirrors the operator library available to the parser: every function takes
//! anything convertible into an [`Expr`] (an expression, a `&Variable`, or a
//! bare `f64`).

use std::rc::Rc;

use super::expression::Expr;

pub fn exp(x: impl Into<Expr>) -> Expr {
    Expr::Exp(Rc::new(x.into()))
}

pub fn ln(x: impl Into<Expr>) -> Expr {
    Expr::Ln(Rc::new(x.into()))
}

pub fn sqrt(x: impl Into<Expr>) -> Expr {
    Expr::Sqrt(Rc::new(x.into()))
}

pub fn sin(x: impl Into<Expr>) -> Expr {
    Expr::Sin(Rc::new(x.into()))
}

pub fn cos(x: impl Into<Expr>) -> Expr {
    Expr::Cos(Rc::new(x.into()))
}

pub fn tan(x: impl Into<Expr>) -> Expr {
    Expr::Tan(Rc::new(x.into()))
}

pub fn pow(base: impl Into<Expr>, exponent: impl Into<Expr>) -> Expr {
    Expr::Pow(Rc::new(base.into()), Rc::new(exponent.into()))
}

/// Grouping. Has no numeric effect, but fixes the node boundary so later
/// composition cannot re-associate across the wrapped subexpression.
pub fn par(x: impl Into<Expr>) -> Expr {
    Expr::Par(Rc::new(x.into()))
}

/// n-ary sum. An empty sequence sums to zero.
pub fn sum<I>(terms: I) -> Expr
where
    I: IntoIterator,
    I::Item: Into<Expr>,
{
    let terms: Vec<Rc<Expr>> = terms.into_iter().map(|t| Rc::new(t.into())).collect();
    if terms.is_empty() {
        Expr::Const(0.0)
    } else {
        Expr::Sum(terms)
    }
}
