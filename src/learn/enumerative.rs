use std::collections::BTreeMap;

use log::{debug, info, trace};

use super::Learner;
use crate::encoding::{Encoding, GrammarOptions, SynthEncoding};
use crate::error::CegisError;
use crate::expr::{Value, Variable};
use crate::problem::{satisfies, Counterexample, Problem, Solution};

/// Walks the selector assignments of the instruction grammar by index and
/// tests each program concretely against the counterexamples.
pub struct EnumerativeLearner<'a> {
    problem: &'a Problem,
    options: GrammarOptions,
    program_size: usize,
    program_index: u128,
    counterexamples: Vec<Counterexample>,
}

impl<'a> EnumerativeLearner<'a> {
    pub fn new(problem: &'a Problem, options: GrammarOptions) -> Self {
        Self {
            problem,
            options,
            program_size: 1,
            program_index: 0,
            counterexamples: Vec::new(),
        }
    }

    /// Number of selector assignments at the current size, well-formed or
    /// not.
    pub fn number_of_options(&self) -> u128 {
        let encoding = SynthEncoding::new(self.problem, self.program_size, &self.options);
        option_count(&encoding)
    }

    /// The `n`-th well-formed program at the current size, if any.
    pub fn nth_program(&self, n: u128) -> Option<Solution> {
        let encoding = SynthEncoding::new(self.problem, self.program_size, &self.options);
        let groups = encoding.selector_groups();
        let model = assignment(&groups, n)?;

        if !well_formed(&encoding, &model) {
            return None;
        }
        encoding.read_solution(&model).ok()
    }

    /// Programs that cannot be evaluated on a counterexample, such as an
    /// `Int` overflow, count as inconsistent.
    fn consistent(&self, candidate: &Solution) -> Result<bool, CegisError> {
        for ce in &self.counterexamples {
            match satisfies(self.problem, candidate, ce) {
                Ok(true) => (),
                Ok(false) => return Ok(false),
                Err(CegisError::Eval(e)) => {
                    trace!("Skipping candidate: {e}");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

fn option_count(encoding: &SynthEncoding) -> u128 {
    encoding
        .selector_groups()
        .iter()
        .fold(1u128, |acc, g| acc.saturating_mul(g.len().max(1) as u128))
}

/// Decodes `index` in the mixed radix given by the group sizes; `None` once
/// the index space is exhausted.
fn assignment(groups: &[Vec<Variable>], mut index: u128) -> Option<BTreeMap<Variable, Value>> {
    let mut model = BTreeMap::new();

    for group in groups {
        let radix = group.len() as u128;
        if radix == 0 {
            continue;
        }
        let choice = (index % radix) as usize;
        index /= radix;

        for (i, v) in group.iter().enumerate() {
            model.insert(v.clone(), Value::Bool(i == choice));
        }
    }

    (index == 0).then_some(model)
}

fn well_formed(encoding: &SynthEncoding, model: &BTreeMap<Variable, Value>) -> bool {
    encoding
        .structural_constraints()
        .iter()
        .all(|c| matches!(c.eval(model), Ok(Value::Bool(true))))
}

impl Learner for EnumerativeLearner<'_> {
    fn set_program_size(&mut self, size: usize) {
        if size != self.program_size {
            self.program_size = size;
            self.program_index = 0;
        }
    }

    fn add_counterexample(&mut self, ce: Counterexample) -> Result<(), CegisError> {
        self.counterexamples.push(ce);
        Ok(())
    }

    fn propose(&mut self) -> Result<Option<Solution>, CegisError> {
        let encoding = SynthEncoding::new(self.problem, self.program_size, &self.options);
        let groups = encoding.selector_groups();
        let total = option_count(&encoding);

        info!(
            "Enumerating programs of size {} from index {} of {total}",
            self.program_size, self.program_index
        );

        while self.program_index < total {
            let index = self.program_index;
            self.program_index += 1;

            let Some(model) = assignment(&groups, index) else {
                break;
            };
            if !well_formed(&encoding, &model) {
                continue;
            }

            let candidate = encoding.read_solution(&model)?;
            if self.consistent(&candidate)? {
                debug!("Program {index} is consistent with every counterexample");
                return Ok(Some(candidate));
            }
            trace!("Program {index} rejected");
        }

        Ok(None)
    }
}
