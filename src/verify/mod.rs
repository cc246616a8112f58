//! Candidate checking.
//!
//! A verifier either proves a candidate correct for every input allowed by
//! the side conditions or produces a counterexample on which it fails.

use std::collections::BTreeMap;

use crate::error::CegisError;
use crate::expr::{Expr, Value, Variable};
use crate::problem::{satisfies, CandidateEnv, Counterexample, Problem, Solution};

mod fm;
mod general;
mod linear;

pub use self::fm::FourierMotzkinVerifier;
pub use self::general::GeneralVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Counterexample(Counterexample),
}

pub trait Verifier {
    fn problem(&self) -> &Problem;

    fn check(&mut self, solution: &Solution) -> Result<Verification, CegisError>;

    /// How many of `ces` the candidate satisfies.
    fn count_satisfied(&self, solution: &Solution, ces: &[Counterexample]) -> Result<usize, CegisError> {
        count_satisfied(self.problem(), solution, ces)
    }
}

pub fn count_satisfied(problem: &Problem, solution: &Solution, ces: &[Counterexample]) -> Result<usize, CegisError> {
    let mut count = 0;
    for ce in ces {
        if satisfies(problem, solution, ce)? {
            count += 1;
        }
    }
    Ok(count)
}

/// `side_conditions ∧ ¬constraints` with the candidate substituted in.
pub(crate) fn negated_goal(problem: &Problem, solution: &Solution) -> Result<Expr, CegisError> {
    let sides = problem
        .side_conditions
        .iter()
        .map(|e| solution.instantiate(e))
        .collect::<Result<Vec<_>, _>>()?;
    let constraints = problem
        .constraints
        .iter()
        .map(|e| solution.instantiate(e))
        .collect::<Result<Vec<_>, _>>()?;

    let mut conjuncts = sides;
    conjuncts.push(Expr::not(Expr::and(constraints)));
    Ok(Expr::and(conjuncts))
}

/// Completes a free-variable assignment into a counterexample, recording
/// what the candidate computes for every application.
pub(crate) fn counterexample(
    problem: &Problem,
    solution: &Solution,
    assignment: BTreeMap<Variable, Value>,
) -> Result<Counterexample, CegisError> {
    let mut ce = Counterexample::new(assignment);
    let env = CandidateEnv {
        assignment: &ce.assignment,
        solution,
    };

    let mut applications = BTreeMap::new();
    for app in problem.applications() {
        let out = Expr::Apply(app.clone()).eval(&env)?;
        applications.insert(app, out);
    }
    ce.applications = applications;

    Ok(ce)
}
