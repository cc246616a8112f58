use std::collections::BTreeMap;

use log::{debug, info};

use super::{counterexample, negated_goal, Verification, Verifier};
use crate::error::CegisError;
use crate::oracle::{Backend, Verdict};
use crate::problem::{Problem, Solution};

/// Hands the negated goal to a decision procedure.
pub struct GeneralVerifier<'a> {
    problem: &'a Problem,
    backend: Backend<'a>,
}

impl<'a> GeneralVerifier<'a> {
    pub fn new(problem: &'a Problem, backend: Backend<'a>) -> Self {
        Self { problem, backend }
    }
}

impl Verifier for GeneralVerifier<'_> {
    fn problem(&self) -> &Problem {
        self.problem
    }

    fn check(&mut self, solution: &Solution) -> Result<Verification, CegisError> {
        info!("Verifying candidate");
        debug!("Candidate:\n{solution}");

        let goal = negated_goal(self.problem, solution)?;
        let mut oracle = self.backend.session()?;
        oracle.assert(&goal)?;

        match oracle.solve()? {
            Verdict::Unsat => Ok(Verification::Valid),
            Verdict::Sat => {
                let mut assignment = BTreeMap::new();
                for var in &self.problem.free_variables {
                    assignment.insert(var.clone(), oracle.value(var)?);
                }

                let ce = counterexample(self.problem, solution, assignment)?;
                debug!("Counterexample: {ce}");
                Ok(Verification::Counterexample(ce))
            }
        }
    }
}
