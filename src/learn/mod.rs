//! Candidate proposal.
//!
//! A learner sees the accumulated counterexamples and proposes a solution
//! consistent with them, or reports that none exists at the current
//! program size.

use log::{debug, trace};

use crate::encoding::{ce_suffix, encode_counterexample, encode_problem, Encoding};
use crate::error::CegisError;
use crate::oracle::Oracle;
use crate::problem::{Counterexample, Problem, Solution};

mod enumerative;
mod incremental;
mod neural;
mod solver;

pub use self::enumerative::EnumerativeLearner;
pub use self::incremental::IncrementalLearner;
pub use self::neural::{IoExample, NeuralConfig, NeuralLearner, ProcessOracle, SequenceOracle, SequenceRequest};
pub use self::solver::SolverLearner;

pub trait Learner {
    fn set_program_size(&mut self, size: usize);

    fn add_counterexample(&mut self, ce: Counterexample) -> Result<(), CegisError>;

    /// `Ok(None)` means no candidate exists at the current program size.
    fn propose(&mut self) -> Result<Option<Solution>, CegisError>;
}

/// Asserts one instance of the specification: the counterexample-free one
/// for `None`, otherwise the one pinned to the `i`-th counterexample.
pub(crate) fn assert_instance(
    problem: &Problem,
    encoding: &mut dyn Encoding,
    oracle: &mut dyn Oracle,
    ce: Option<(usize, &Counterexample)>,
) -> Result<(), CegisError> {
    encoding.set_suffix(&ce_suffix(ce.map(|(i, _)| i)));

    if let Some((i, ce)) = ce {
        debug!("Adding counterexample {i}: {ce}");
        for e in encode_counterexample(ce, encoding)? {
            trace!("ce: {e}");
            oracle.assert(&e)?;
        }
    }

    for e in encode_problem(problem, encoding)? {
        trace!("co: {e}");
        oracle.assert(&e)?;
    }

    Ok(())
}
