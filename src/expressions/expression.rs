//! The expression graph: a DAG of differentiable scalar nodes.
//!
//! [`Expr`] nodes own their children through `Rc`, so a subexpression can be
//! shared by any number of parents. Evaluation ([`Expr::val`]) and
//! differentiation ([`Expr::diff`]) are pure recursive functions of the
//! current [`Variable`] values: nothing is cached, shared children give
//! identical results to every parent, and the chain-rule contributions of a
//! variable occurring in several children accumulate naturally.
//!
//! Singularities (division by zero, `ln`/`sqrt` of non-positive arguments,
//! powers of negative bases with varying exponents) follow IEEE-754 NaN and
//! infinity propagation; they never panic.

use std::fmt;
use std::rc::Rc;

use super::variable::Variable;

/// A scalar-valued, differentiable expression node.
#[derive(Clone, Debug)]
pub enum Expr {
    Const(f64),
    Var(Variable),
    Add(Rc<Expr>, Rc<Expr>),
    Sub(Rc<Expr>, Rc<Expr>),
    Mul(Rc<Expr>, Rc<Expr>),
    Div(Rc<Expr>, Rc<Expr>),
    /// base ^ exponent
    Pow(Rc<Expr>, Rc<Expr>),
    Neg(Rc<Expr>),
    Exp(Rc<Expr>),
    Ln(Rc<Expr>),
    Sqrt(Rc<Expr>),
    Sin(Rc<Expr>),
    Cos(Rc<Expr>),
    Tan(Rc<Expr>),
    /// Grouping: numerically transparent, but a hard node boundary that later
    /// composition can never restructure or re-associate across.
    Par(Rc<Expr>),
    /// n-ary sum over a sequence of terms.
    Sum(Vec<Rc<Expr>>),
}

impl Expr {
    /// Recomputes the numeric value from the current variable values.
    pub fn val(&self) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Var(v) => v.val(),
            Expr::Add(lhs, rhs) => lhs.val() + rhs.val(),
            Expr::Sub(lhs, rhs) => lhs.val() - rhs.val(),
            Expr::Mul(lhs, rhs) => lhs.val() * rhs.val(),
            Expr::Div(lhs, rhs) => lhs.val() / rhs.val(),
            Expr::Pow(base, exponent) => base.val().powf(exponent.val()),
            Expr::Neg(inner) => -inner.val(),
            Expr::Exp(inner) => inner.val().exp(),
            Expr::Ln(inner) => inner.val().ln(),
            Expr::Sqrt(inner) => inner.val().sqrt(),
            Expr::Sin(inner) => inner.val().sin(),
            Expr::Cos(inner) => inner.val().cos(),
            Expr::Tan(inner) => inner.val().tan(),
            Expr::Par(inner) => inner.val(),
            Expr::Sum(terms) => terms.iter().map(|t| t.val()).sum(),
        }
    }

    /// Partial derivative with respect to `var`, by the chain rule.
    ///
    /// Returns 1 for the variable itself and 0 for any subtree that does not
    /// contain it. The power rule only includes the `x^e * ln(x) * e'` term
    /// when the exponent actually depends on `var`, so the common case of a
    /// constant exponent over a negative base stays finite.
    pub fn diff(&self, var: &Variable) -> f64 {
        match self {
            Expr::Const(_) => 0.0,
            Expr::Var(v) => {
                if v == var {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::Add(lhs, rhs) => lhs.diff(var) + rhs.diff(var),
            Expr::Sub(lhs, rhs) => lhs.diff(var) - rhs.diff(var),
            Expr::Mul(lhs, rhs) => lhs.diff(var) * rhs.val() + lhs.val() * rhs.diff(var),
            Expr::Div(lhs, rhs) => {
                let denominator = rhs.val();
                (lhs.diff(var) * denominator - lhs.val() * rhs.diff(var))
                    / (denominator * denominator)
            }
            Expr::Pow(base, exponent) => {
                let b = base.val();
                let e = exponent.val();
                let mut derivative = e * b.powf(e - 1.0) * base.diff(var);
                let de = exponent.diff(var);
                if de != 0.0 {
                    derivative += b.powf(e) * b.ln() * de;
                }
                derivative
            }
            Expr::Neg(inner) => -inner.diff(var),
            Expr::Exp(inner) => inner.val().exp() * inner.diff(var),
            Expr::Ln(inner) => inner.diff(var) / inner.val(),
            Expr::Sqrt(inner) => inner.diff(var) / (2.0 * inner.val().sqrt()),
            Expr::Sin(inner) => inner.val().cos() * inner.diff(var),
            Expr::Cos(inner) => -inner.val().sin() * inner.diff(var),
            Expr::Tan(inner) => {
                let c = inner.val().cos();
                inner.diff(var) / (c * c)
            }
            Expr::Par(inner) => inner.diff(var),
            Expr::Sum(terms) => terms.iter().map(|t| t.diff(var)).sum(),
        }
    }

    /// Child nodes, for traversal and diagnostics.
    pub fn children(&self) -> Vec<Rc<Expr>> {
        match self {
            Expr::Const(_) | Expr::Var(_) => Vec::new(),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => vec![lhs.clone(), rhs.clone()],
            Expr::Neg(inner)
            | Expr::Exp(inner)
            | Expr::Ln(inner)
            | Expr::Sqrt(inner)
            | Expr::Sin(inner)
            | Expr::Cos(inner)
            | Expr::Tan(inner)
            | Expr::Par(inner) => vec![inner.clone()],
            Expr::Sum(terms) => terms.clone(),
        }
    }

    /// Distinct variables of the expression, by identity, in discovery order.
    pub fn variables(&self) -> Vec<Variable> {
        let mut found = Vec::new();
        self.collect_variables(&mut found);
        found
    }

    fn collect_variables(&self, found: &mut Vec<Variable>) {
        if let Expr::Var(v) = self {
            if !found.contains(v) {
                found.push(v.clone());
            }
        }
        for child in self.children() {
            child.collect_variables(found);
        }
    }

    /// True if `var` occurs anywhere in the expression graph.
    pub fn depends_on(&self, var: &Variable) -> bool {
        match self {
            Expr::Var(v) => v == var,
            _ => self.children().iter().any(|c| c.depends_on(var)),
        }
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Expr {
        Expr::Pow(Rc::new(self), Rc::new(exponent.into()))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<&Variable> for Expr {
    fn from(var: &Variable) -> Self {
        Expr::Var(var.clone())
    }
}

impl From<Variable> for Expr {
    fn from(var: Variable) -> Self {
        Expr::Var(var)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(v) => write!(f, "{}", v.name()),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exponent) => write!(f, "({} ^ {})", base, exponent),
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Exp(inner) => write!(f, "exp({})", inner),
            Expr::Ln(inner) => write!(f, "ln({})", inner),
            Expr::Sqrt(inner) => write!(f, "sqrt({})", inner),
            Expr::Sin(inner) => write!(f, "sin({})", inner),
            Expr::Cos(inner) => write!(f, "cos({})", inner),
            Expr::Tan(inner) => write!(f, "tan({})", inner),
            Expr::Par(inner) => write!(f, "({})", inner),
            Expr::Sum(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
        }
    }
}

// Operator overloading over every combination of Expr, &Variable and f64, so
// model code reads like the mathematics it encodes.
macro_rules! impl_expr_binop {
    ($op_trait:ident, $method:ident, $variant:ident) => {
        impl std::ops::$op_trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Rc::new(self), Rc::new(rhs))
            }
        }
        impl std::ops::$op_trait<&Variable> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Variable) -> Expr {
                Expr::$variant(Rc::new(self), Rc::new(Expr::from(rhs)))
            }
        }
        impl std::ops::$op_trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Rc::new(self), Rc::new(Expr::Const(rhs)))
            }
        }
        impl std::ops::$op_trait<Expr> for &Variable {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Rc::new(Expr::from(self)), Rc::new(rhs))
            }
        }
        impl std::ops::$op_trait<&Variable> for &Variable {
            type Output = Expr;
            fn $method(self, rhs: &Variable) -> Expr {
                Expr::$variant(Rc::new(Expr::from(self)), Rc::new(Expr::from(rhs)))
            }
        }
        impl std::ops::$op_trait<f64> for &Variable {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Rc::new(Expr::from(self)), Rc::new(Expr::Const(rhs)))
            }
        }
        impl std::ops::$op_trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Rc::new(Expr::Const(self)), Rc::new(rhs))
            }
        }
        impl std::ops::$op_trait<&Variable> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Variable) -> Expr {
                Expr::$variant(Rc::new(Expr::Const(self)), Rc::new(Expr::from(rhs)))
            }
        }
    };
}

impl_expr_binop!(Add, add, Add);
impl_expr_binop!(Sub, sub, Sub);
impl_expr_binop!(Mul, mul, Mul);
impl_expr_binop!(Div, div, Div);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Rc::new(self))
    }
}

impl std::ops::Neg for &Variable {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Rc::new(Expr::from(self)))
    }
}
