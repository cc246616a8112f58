use log::info;

use super::{assert_instance, Learner};
use crate::encoding::EncodingFactory;
use crate::error::CegisError;
use crate::oracle::{Backend, ModelView, Verdict};
use crate::problem::{Counterexample, Problem, Solution};

/// Rebuilds the whole query on a fresh solver session for every proposal.
pub struct SolverLearner<'a> {
    problem: &'a Problem,
    backend: Backend<'a>,
    factory: EncodingFactory<'a>,
    program_size: usize,
    counterexamples: Vec<Counterexample>,
}

impl<'a> SolverLearner<'a> {
    pub fn new(problem: &'a Problem, backend: Backend<'a>, factory: EncodingFactory<'a>) -> Self {
        Self {
            problem,
            backend,
            factory,
            program_size: 1,
            counterexamples: Vec::new(),
        }
    }
}

impl Learner for SolverLearner<'_> {
    fn set_program_size(&mut self, size: usize) {
        self.program_size = size;
    }

    fn add_counterexample(&mut self, ce: Counterexample) -> Result<(), CegisError> {
        self.counterexamples.push(ce);
        Ok(())
    }

    fn propose(&mut self) -> Result<Option<Solution>, CegisError> {
        info!(
            "Synthesising at size {} from {} counterexamples",
            self.program_size,
            self.counterexamples.len()
        );

        let mut oracle = self.backend.session()?;
        let mut encoding = (self.factory)(self.program_size);

        if self.counterexamples.is_empty() {
            assert_instance(self.problem, &mut *encoding, &mut *oracle, None)?;
        } else {
            for (i, ce) in self.counterexamples.iter().enumerate() {
                assert_instance(self.problem, &mut *encoding, &mut *oracle, Some((i, ce)))?;
            }
        }

        match oracle.solve()? {
            Verdict::Sat => Ok(Some(encoding.read_solution(&ModelView(&*oracle))?)),
            Verdict::Unsat => Ok(None),
        }
    }
}
