//! Translation of specifications into solver formulas whose models encode
//! candidate programs.

use std::collections::BTreeSet;

use crate::error::CegisError;
use crate::expr::{Expr, Sort, Value};
use crate::oracle::Valuation;
use crate::problem::{Counterexample, Problem, Signature, Solution};

mod local;
mod output;
mod synth;

pub use self::local::{neighbourhood, LocalEncoding};
pub use self::output::OutputEncoding;
pub use self::synth::{Instruction, Opcode, Operand, Program, SynthEncoding};

/// One encoding instance. The suffix keeps the free variables of distinct
/// counterexample instances apart; auxiliary constraints accumulate until
/// they are taken.
pub trait Encoding {
    fn set_suffix(&mut self, suffix: &str);

    /// Rewrites `e` so that it mentions no unknown function.
    fn encode(&mut self, e: &Expr) -> Result<Expr, CegisError>;

    fn take_constraints(&mut self) -> Vec<Expr>;

    fn read_solution(&self, model: &dyn Valuation) -> Result<Solution, CegisError>;
}

/// Builds an encoding for a program size.
pub type EncodingFactory<'a> = Box<dyn Fn(usize) -> Box<dyn Encoding + 'a> + 'a>;

/// Instruction set switches.
#[derive(Debug, Clone, Default)]
pub struct GrammarOptions {
    pub enable_bitwise: bool,
    pub enable_division: bool,
    pub enable_multiplication: bool,
    pub literals: BTreeSet<Value>,
}

/// Suffix of the `index`-th counterexample instance. The
/// counterexample-free instance uses the bare `$ce`.
pub fn ce_suffix(index: Option<usize>) -> String {
    match index {
        Some(i) => format!("$ce{i}"),
        None => "$ce".to_string(),
    }
}

/// Encodes the side conditions and constraints of `problem`, followed by the
/// auxiliary constraints the encoding produced so far.
pub fn encode_problem(problem: &Problem, encoding: &mut dyn Encoding) -> Result<Vec<Expr>, CegisError> {
    let mut out = Vec::with_capacity(problem.side_conditions.len() + problem.constraints.len());

    for e in problem.side_conditions.iter().chain(&problem.constraints) {
        out.push(encoding.encode(e)?);
    }
    out.extend(encoding.take_constraints());

    Ok(out)
}

/// Pins the free variables of the current instance to a counterexample.
pub fn encode_counterexample(ce: &Counterexample, encoding: &mut dyn Encoding) -> Result<Vec<Expr>, CegisError> {
    ce.assignment
        .iter()
        .map(|(var, value)| encoding.encode(&Expr::eq(Expr::Var(var.clone()), Expr::Const(*value))))
        .collect()
}

/// Sort programs for `sig` compute in.
pub fn word_sort(sig: &Signature) -> Sort {
    let sorts = || sig.domain.iter().chain(std::iter::once(&sig.codomain));

    if sorts().any(|s| *s == Sort::Int) {
        return Sort::Int;
    }

    sorts()
        .find_map(|s| match s {
            Sort::BitVec(w) => Some(Sort::BitVec(*w)),
            _ => None,
        })
        .unwrap_or(Sort::BitVec(1))
}

/// Moves a parameter or literal into the word sort.
pub(crate) fn to_word(e: Expr, word: Sort) -> Expr {
    match e.sort() {
        Sort::Bool => Expr::ite(e, Expr::Const(word.one()), Expr::Const(word.zero())),
        s if s == word => e,
        _ => match e.as_const() {
            Some(v) => Expr::Const(v.cast(word)),
            None => e,
        },
    }
}

/// Reads a word back into the codomain.
pub(crate) fn from_word(e: Expr, codomain: Sort) -> Expr {
    match codomain {
        Sort::Bool => {
            let zero = Expr::Const(e.sort().zero());
            Expr::not(Expr::eq(e, zero))
        }
        _ => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_sort_follows_signature() {
        let bv = Signature::new(vec![Sort::BitVec(8), Sort::Bool], Sort::Bool);
        let int = Signature::new(vec![Sort::Int], Sort::Bool);
        let boolean = Signature::new(vec![Sort::Bool], Sort::Bool);

        assert_eq!(word_sort(&bv), Sort::BitVec(8));
        assert_eq!(word_sort(&int), Sort::Int);
        assert_eq!(word_sort(&boolean), Sort::BitVec(1));
    }
}
