//! Named residual equations.

use std::fmt;
use std::rc::Rc;

use super::expression::Expr;
use super::variable::Variable;

struct EquationData {
    name: String,
    residual: Expr,
    variables: Vec<Variable>,
}

/// An equation `residual = 0`, satisfied when the residual vanishes within
/// tolerance.
///
/// Like [`Variable`], an `Equation` is a cheap-to-clone handle with identity
/// semantics: the same equation object can be a member of several systems
/// (the full problem and a decomposition block, say) without duplication.
/// The distinct variables of the residual are collected once at construction;
/// this is the equation's structural incidence.
#[derive(Clone)]
pub struct Equation {
    data: Rc<EquationData>,
}

impl Equation {
    pub fn new(name: &str, residual: Expr) -> Self {
        let variables = residual.variables();
        Equation {
            data: Rc::new(EquationData {
                name: name.to_string(),
                residual,
                variables,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn residual(&self) -> &Expr {
        &self.data.residual
    }

    /// Current residual value at the current variable values.
    pub fn residual_value(&self) -> f64 {
        self.data.residual.val()
    }

    /// Distinct variables appearing in the residual, in discovery order.
    pub fn variables(&self) -> &[Variable] {
        &self.data.variables
    }

    /// The non-fixed subset of [`Equation::variables`].
    pub fn free_variables(&self) -> Vec<Variable> {
        self.data.variables.iter().filter(|v| !v.is_fixed()).cloned().collect()
    }
}

impl PartialEq for Equation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for Equation {}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} = {}", self.data.name, self.data.residual, self.residual_value())
    }
}

impl fmt::Debug for Equation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Equation({})", self.data.name)
    }
}
