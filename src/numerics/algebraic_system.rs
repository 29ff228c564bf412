//! The mutable container of variables and equations handed to solvers.

use std::collections::HashMap;

use crate::expressions::equation::Equation;
use crate::expressions::variable::Variable;

use super::error::SolverError;

/// An ordered, duplicate-free collection of variables and equations.
///
/// Collaborators populate a system, hand it to a solver, and read the
/// converged variable values back afterwards. The container itself performs
/// no solving; it only keeps the books: membership, degree-of-freedom
/// counts, and the structural incidence the decomposition solver starts
/// from. Structural queries are computed fresh on every call so that fixing
/// or unfixing a variable between solves is picked up without rebuilding the
/// system.
pub struct AlgebraicSystem {
    name: String,
    variables: Vec<Variable>,
    equations: Vec<Equation>,
}

impl AlgebraicSystem {
    pub fn new(name: &str) -> Self {
        AlgebraicSystem { name: name.to_string(), variables: Vec::new(), equations: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a variable, rejecting a second insertion of the same entity.
    pub fn add_variable(&mut self, variable: Variable) -> Result<&mut Self, SolverError> {
        if self.variables.contains(&variable) {
            return Err(SolverError::DuplicateVariable {
                name: variable.name(),
                system: self.name.clone(),
            });
        }
        self.variables.push(variable);
        Ok(self)
    }

    pub fn add_variables<I: IntoIterator<Item = Variable>>(
        &mut self,
        variables: I,
    ) -> Result<&mut Self, SolverError> {
        for variable in variables {
            self.add_variable(variable)?;
        }
        Ok(self)
    }

    pub fn add_equation(&mut self, equation: Equation) -> Result<&mut Self, SolverError> {
        if self.equations.contains(&equation) {
            return Err(SolverError::DuplicateEquation {
                name: equation.name().to_string(),
                system: self.name.clone(),
            });
        }
        self.equations.push(equation);
        Ok(self)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn number_of_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn number_of_equations(&self) -> usize {
        self.equations.len()
    }

    /// The registered variables that are not fixed, in registration order.
    pub fn free_variables(&self) -> Vec<Variable> {
        self.variables.iter().filter(|v| !v.is_fixed()).cloned().collect()
    }

    /// Free variables minus equations. Zero for a well-posed square system.
    pub fn degrees_of_freedom(&self) -> isize {
        self.free_variables().len() as isize - self.equations.len() as isize
    }

    /// Identity index of the free variables.
    pub fn free_variable_index(&self) -> HashMap<Variable, usize> {
        self.free_variables().into_iter().enumerate().map(|(i, v)| (v, i)).collect()
    }

    /// Structural incidence: for each equation, the sorted indices (into
    /// [`AlgebraicSystem::free_variables`]) of the free variables present in
    /// its expression graph. Presence, not numeric derivative value.
    pub fn structural_incidence(&self) -> Vec<Vec<usize>> {
        let index = self.free_variable_index();
        self.equations
            .iter()
            .map(|eq| {
                let mut columns: Vec<usize> =
                    eq.variables().iter().filter_map(|v| index.get(v)).copied().collect();
                columns.sort_unstable();
                columns
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::expression::Expr;

    #[test]
    fn rejects_duplicate_variables_by_identity() {
        let x = Variable::new("x", 1.0);
        let mut system = AlgebraicSystem::new("test");
        system.add_variable(x.clone()).unwrap();
        assert!(matches!(
            system.add_variable(x.clone()),
            Err(SolverError::DuplicateVariable { .. })
        ));
        // a different entity with the same name is a different variable
        system.add_variable(Variable::new("x", 1.0)).unwrap();
        assert_eq!(system.number_of_variables(), 2);
    }

    #[test]
    fn rejects_duplicate_equations() {
        let x = Variable::new("x", 1.0);
        let eq = Equation::new("e", Expr::from(&x) - 1.0);
        let mut system = AlgebraicSystem::new("test");
        system.add_variable(x).unwrap();
        system.add_equation(eq.clone()).unwrap();
        assert!(matches!(
            system.add_equation(eq),
            Err(SolverError::DuplicateEquation { .. })
        ));
    }

    #[test]
    fn degrees_of_freedom_track_fixing() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 2.0);
        let mut system = AlgebraicSystem::new("test");
        system.add_variables([x.clone(), y.clone()]).unwrap();
        system.add_equation(Equation::new("e", &x + &y - 5.0)).unwrap();
        assert_eq!(system.degrees_of_freedom(), 1);
        x.fix(2.0);
        assert_eq!(system.degrees_of_freedom(), 0);
        assert_eq!(system.free_variables(), vec![y.clone()]);
        x.unfix();
        y.fix(3.0);
        assert_eq!(system.free_variables(), vec![x]);
    }

    #[test]
    fn structural_incidence_uses_free_variables_only() {
        let x = Variable::new("x", 1.0);
        let y = Variable::new("y", 2.0);
        let z = Variable::new("z", 3.0);
        let mut system = AlgebraicSystem::new("test");
        system.add_variables([x.clone(), y.clone(), z.clone()]).unwrap();
        system.add_equation(Equation::new("e1", &x * &y - 1.0)).unwrap();
        system.add_equation(Equation::new("e2", &y + &z)).unwrap();
        assert_eq!(system.structural_incidence(), vec![vec![0, 1], vec![1, 2]]);
        y.fix(2.0);
        // free variables are now [x, z] with indices [0, 1]
        assert_eq!(system.structural_incidence(), vec![vec![0], vec![1]]);
    }
}
