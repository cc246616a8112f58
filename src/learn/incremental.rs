use log::{debug, info};

use super::{assert_instance, Learner};
use crate::encoding::{Encoding, EncodingFactory};
use crate::error::CegisError;
use crate::oracle::{Backend, ModelView, Oracle, Verdict};
use crate::problem::{Counterexample, Problem, Solution};

struct Session<'a> {
    oracle: Box<dyn Oracle + 'a>,
    encoding: Box<dyn Encoding + 'a>,
    program_size: usize,
    /// Counterexamples already asserted.
    asserted: usize,
}

/// Keeps one solver session per program size and only asserts the
/// counterexamples it has not seen yet.
pub struct IncrementalLearner<'a> {
    problem: &'a Problem,
    backend: Backend<'a>,
    factory: EncodingFactory<'a>,
    program_size: usize,
    counterexamples: Vec<Counterexample>,
    session: Option<Session<'a>>,
}

impl<'a> IncrementalLearner<'a> {
    pub fn new(problem: &'a Problem, backend: Backend<'a>, factory: EncodingFactory<'a>) -> Self {
        Self {
            problem,
            backend,
            factory,
            program_size: 1,
            counterexamples: Vec::new(),
            session: None,
        }
    }

    fn open_session(&mut self) -> Result<Session<'a>, CegisError> {
        debug!("Opening incremental session for size {}", self.program_size);

        let mut oracle = self.backend.session()?;
        let mut encoding = (self.factory)(self.program_size);

        // Grammar constraints hold for every instance; assert them outside
        // any scope.
        for c in encoding.take_constraints() {
            oracle.assert(&c)?;
        }

        Ok(Session {
            oracle,
            encoding,
            program_size: self.program_size,
            asserted: 0,
        })
    }
}

impl Learner for IncrementalLearner<'_> {
    fn set_program_size(&mut self, size: usize) {
        self.program_size = size;
    }

    fn add_counterexample(&mut self, ce: Counterexample) -> Result<(), CegisError> {
        self.counterexamples.push(ce);
        Ok(())
    }

    fn propose(&mut self) -> Result<Option<Solution>, CegisError> {
        info!(
            "Synthesising incrementally at size {} from {} counterexamples",
            self.program_size,
            self.counterexamples.len()
        );

        let mut session = match self.session.take() {
            Some(s) if s.program_size == self.program_size => s,
            _ => self.open_session()?,
        };

        let result = if self.counterexamples.is_empty() {
            session.oracle.push()?;
            assert_instance(self.problem, &mut *session.encoding, &mut *session.oracle, None)?;

            let result = match session.oracle.solve()? {
                Verdict::Sat => Some(session.encoding.read_solution(&ModelView(&*session.oracle))?),
                Verdict::Unsat => None,
            };
            session.oracle.pop()?;
            result
        } else {
            for i in session.asserted..self.counterexamples.len() {
                let ce = &self.counterexamples[i];
                assert_instance(self.problem, &mut *session.encoding, &mut *session.oracle, Some((i, ce)))?;
            }
            session.asserted = self.counterexamples.len();

            match session.oracle.solve()? {
                Verdict::Sat => Some(session.encoding.read_solution(&ModelView(&*session.oracle))?),
                Verdict::Unsat => None,
            }
        };

        self.session = Some(session);
        Ok(result)
    }
}
