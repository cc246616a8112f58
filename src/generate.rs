//! Random straight-line programs, printed as training data for external
//! program generators.

use std::collections::BTreeSet;
use std::io::Write;

use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::encoding::{Encoding, GrammarOptions, SynthEncoding};
use crate::error::CegisError;
use crate::expr::{Expr, Sort, Value, MAX_BV_WIDTH};
use crate::problem::{define_fun, Problem, Signature};

/// Name of the generated function.
pub const FUNCTION: &str = "f";

/// Draws in a row that may repeat an earlier program before giving up.
const MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub program_size: usize,
    /// Random constants added to the operand pool.
    pub number_of_constants: usize,
    pub number_of_params: usize,
    pub width: u32,
    pub bool_return: bool,
    pub seed: u64,
    pub options: GrammarOptions,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program_size: 5,
            number_of_constants: 0,
            number_of_params: 2,
            width: 32,
            bool_return: false,
            seed: 0,
            options: GrammarOptions {
                enable_bitwise: true,
                enable_multiplication: true,
                ..Default::default()
            },
        }
    }
}

/// Samples programs of the instruction grammar uniformly per selector and
/// never yields the same selection twice.
pub struct ProgramGenerator {
    encoding: SynthEncoding,
    signature: Signature,
    rng: ChaCha8Rng,
    seen: BTreeSet<Vec<usize>>,
}

impl ProgramGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, CegisError> {
        if config.program_size == 0 {
            return Err(CegisError::MalformedProblem("program size must be positive".into()));
        }
        if config.width == 0 || config.width > MAX_BV_WIDTH {
            return Err(CegisError::MalformedProblem(format!(
                "bit-vector width {} outside 1..={MAX_BV_WIDTH}",
                config.width
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut options = config.options.clone();
        for _ in 0..config.number_of_constants {
            options.literals.insert(Value::bv(rng.gen(), config.width));
        }

        let word = Sort::BitVec(config.width);
        let codomain = if config.bool_return { Sort::Bool } else { word };
        let signature = Signature::new(vec![word; config.number_of_params], codomain);

        let mut problem = Problem::new();
        problem.declare_function(FUNCTION, signature.domain.clone(), codomain);
        let encoding = SynthEncoding::new(&problem, config.program_size, &options);

        info!(
            "Generating programs of size {} over {} selector groups",
            config.program_size,
            encoding.selector_groups().len()
        );

        Ok(Self {
            encoding,
            signature,
            rng,
            seen: BTreeSet::new(),
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Body of the next program not generated before; `None` once the draws
    /// keep repeating.
    pub fn next_program(&mut self) -> Result<Option<Expr>, CegisError> {
        for _ in 0..MAX_ATTEMPTS {
            let rng = &mut self.rng;
            let choices = self.encoding.canonical_choices(|n| rng.gen_range(0..n.max(1)));
            if !self.seen.insert(choices.clone()) {
                continue;
            }

            let model = self.encoding.selection(&choices);
            let mut solution = self.encoding.read_solution(&model)?;
            return Ok(solution.functions.remove(FUNCTION));
        }

        Ok(None)
    }

    /// Writes up to `count` programs as `define-fun` commands, one per line,
    /// and returns how many were written.
    pub fn write_programs(&mut self, count: usize, out: &mut dyn Write) -> Result<usize, CegisError> {
        for written in 0..count {
            let Some(body) = self.next_program()? else {
                warn!("No new program after {MAX_ATTEMPTS} attempts, stopping after {written}");
                return Ok(written);
            };
            writeln!(out, "{}", define_fun(FUNCTION, &self.signature, &body))?;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sygus::parse_program;

    fn programs(config: &GeneratorConfig, count: usize) -> Vec<String> {
        let mut out = Vec::new();
        let written = ProgramGenerator::new(config)
            .unwrap()
            .write_programs(count, &mut out)
            .unwrap();
        assert_eq!(written, count);

        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn same_seed_same_programs() {
        let config = GeneratorConfig {
            program_size: 3,
            width: 8,
            seed: 7,
            ..Default::default()
        };

        assert_eq!(programs(&config, 20), programs(&config, 20));
    }

    #[test]
    fn programs_read_back_as_definitions() {
        let config = GeneratorConfig {
            program_size: 2,
            number_of_constants: 2,
            width: 8,
            seed: 3,
            ..Default::default()
        };
        let sig = Signature::new(vec![Sort::BitVec(8); 2], Sort::BitVec(8));

        for line in programs(&config, 10) {
            assert!(line.starts_with("(define-fun f "), "{line}");
            parse_program(&line, &sig).unwrap();
        }
    }

    #[test]
    fn boolean_programs() {
        let config = GeneratorConfig {
            program_size: 2,
            number_of_params: 1,
            width: 8,
            bool_return: true,
            ..Default::default()
        };
        let sig = Signature::new(vec![Sort::BitVec(8)], Sort::Bool);

        for line in programs(&config, 5) {
            assert_eq!(parse_program(&line, &sig).unwrap().sort(), Sort::Bool);
        }
    }

    #[test]
    fn small_grammars_run_dry() {
        let config = GeneratorConfig {
            program_size: 1,
            number_of_params: 1,
            width: 8,
            options: GrammarOptions::default(),
            ..Default::default()
        };

        let mut out = Vec::new();
        let written = ProgramGenerator::new(&config)
            .unwrap()
            .write_programs(1000, &mut out)
            .unwrap();
        assert!(written > 0);
        assert!(written < 1000);
    }

    #[test]
    fn zero_size_is_rejected() {
        let config = GeneratorConfig {
            program_size: 0,
            ..Default::default()
        };
        assert!(ProgramGenerator::new(&config).is_err());
    }
}
