//! Neighbourhood search around a refuted candidate.

use log::{debug, info};

use crate::encoding::{Encoding, LocalEncoding};
use crate::error::CegisError;
use crate::learn::assert_instance;
use crate::oracle::{Backend, ModelView, Verdict};
use crate::problem::{Counterexample, Problem, Solution};
use crate::verify::{Verification, Verifier};

#[derive(Debug, Clone, Copy)]
pub struct LocalConfig {
    /// Distance a constant may move.
    pub radius: u32,
    /// Refinement rounds per run.
    pub rounds: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { radius: 2, rounds: 3 }
    }
}

/// Repairs a candidate by moving its constants within a small
/// neighbourhood. Every run opens fresh solver sessions.
pub struct LocalSearch<'a> {
    problem: &'a Problem,
    backend: Backend<'a>,
    config: LocalConfig,
    template: Option<(Solution, usize)>,
    counterexamples: Vec<Counterexample>,
    solution: Option<Solution>,
}

impl<'a> LocalSearch<'a> {
    pub fn new(problem: &'a Problem, backend: Backend<'a>, config: LocalConfig) -> Self {
        Self {
            problem,
            backend,
            config,
            template: None,
            counterexamples: Vec::new(),
            solution: None,
        }
    }

    /// Seeds the search with the latest candidate and its program size.
    pub fn push_template(&mut self, solution: Solution, size: usize) {
        self.template = Some((solution, size));
    }

    pub fn add_counterexample(&mut self, ce: Counterexample) {
        self.counterexamples.push(ce);
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    fn neighbour(&self, template: &Solution) -> Result<Option<Solution>, CegisError> {
        let mut encoding = LocalEncoding::new(template, self.config.radius, &self.problem.literals);
        if encoding.placeholders().next().is_none() {
            return Ok(None);
        }

        let mut oracle = self.backend.session()?;
        if self.counterexamples.is_empty() {
            assert_instance(self.problem, &mut encoding, &mut *oracle, None)?;
        } else {
            for (i, ce) in self.counterexamples.iter().enumerate() {
                assert_instance(self.problem, &mut encoding, &mut *oracle, Some((i, ce)))?;
            }
        }

        match oracle.solve()? {
            Verdict::Sat => Ok(Some(encoding.read_solution(&ModelView(&*oracle))?)),
            Verdict::Unsat => Ok(None),
        }
    }

    /// Runs the refinement rounds; a verified neighbour becomes
    /// [`LocalSearch::solution`].
    pub fn run(&mut self, verifier: &mut dyn Verifier) -> Result<(), CegisError> {
        let Some((mut template, size)) = self.template.clone() else {
            return Ok(());
        };
        info!("Local search around the size {size} candidate");

        for round in 0..self.config.rounds {
            let Some(candidate) = self.neighbour(&template)? else {
                debug!("Round {round}: neighbourhood exhausted");
                return Ok(());
            };

            match verifier.check(&candidate)? {
                Verification::Valid => {
                    info!("Local search found a solution in round {round}");
                    self.solution = Some(candidate);
                    return Ok(());
                }
                Verification::Counterexample(ce) => {
                    debug!("Round {round}: neighbour refuted by {ce}");
                    self.counterexamples.push(ce);
                    template = candidate;
                }
            }
        }

        Ok(())
    }
}
