use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::Learner;
use crate::encoding::{Encoding, OutputEncoding};
use crate::error::CegisError;
use crate::expr::{Expr, Sort, Value, Variable};
use crate::oracle::{Backend, Verdict};
use crate::problem::{Counterexample, Problem, Signature, Solution};
use crate::sygus::parse_program;
use crate::verify::count_satisfied;

/// Widest magnitude an `Int` example is scaled against.
const INT_SCALE: f64 = 1024.0;

#[derive(Debug, Clone)]
pub struct NeuralConfig {
    /// Generator command; `--function`, `--arity` and `--beam-size` are
    /// appended.
    pub command: Vec<String>,
    pub beam_size: usize,
    /// Distinct counterexamples needed before the generator is consulted.
    pub min_num_io: usize,
    /// Examples kept in the rolling window.
    pub max_num_io: usize,
    /// Random inputs tried when looking for a complementary example.
    pub num_random_io: usize,
    pub placeholder_step: i64,
    pub seed: u64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "nn_synth.py".to_string()],
            beam_size: 1,
            min_num_io: 5,
            max_num_io: 10,
            num_random_io: 10,
            placeholder_step: 10,
            seed: 0,
        }
    }
}

/// Input/output pair of the function being learnt.
#[derive(Debug, Clone, PartialEq)]
pub struct IoExample {
    pub inputs: Vec<Value>,
    pub output: Value,
}

#[derive(Debug, Clone)]
pub struct SequenceRequest {
    pub function: String,
    pub arity: usize,
    pub beam_size: usize,
    /// `[[[i0 ...][i1 ...]]] [[[o ...]]]`, values normalised into [-1, 1].
    pub payload: String,
}

/// External program generator. Returns one program text per beam slot.
pub trait SequenceOracle {
    fn generate(&mut self, request: &SequenceRequest) -> Result<Vec<String>, CegisError>;
}

/// Runs the generator as a child process: payload on stdin, one program
/// per stdout line.
pub struct ProcessOracle {
    command: Vec<String>,
}

impl ProcessOracle {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl SequenceOracle for ProcessOracle {
    fn generate(&mut self, request: &SequenceRequest) -> Result<Vec<String>, CegisError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| CegisError::process(&self.command, "empty generator command"))?;

        debug!("Running {} for `{}`", self.command.join(" "), request.function);

        let mut child = Command::new(program)
            .args(args)
            .arg("--function")
            .arg(&request.function)
            .arg("--arity")
            .arg(request.arity.to_string())
            .arg("--beam-size")
            .arg(request.beam_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CegisError::process(&self.command, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.payload.as_bytes())
                .map_err(|e| CegisError::process(&self.command, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CegisError::process(&self.command, e))?;
        if !output.status.success() {
            return Err(CegisError::process(&self.command, output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Learner delegating proposals to an external sequence generator trained
/// on input/output examples. Only single-function problems are supported.
pub struct NeuralLearner<'a> {
    problem: &'a Problem,
    backend: Backend<'a>,
    oracle: Box<dyn SequenceOracle + 'a>,
    config: NeuralConfig,
    function: String,
    signature: Signature,
    counterexamples: Vec<Counterexample>,
    examples: VecDeque<IoExample>,
    /// Candidates already known to satisfy every counterexample.
    queue: VecDeque<Solution>,
    placeholder: i64,
    rng: ChaCha8Rng,
}

impl<'a> NeuralLearner<'a> {
    pub fn new(
        problem: &'a Problem,
        backend: Backend<'a>,
        oracle: Box<dyn SequenceOracle + 'a>,
        config: NeuralConfig,
    ) -> Result<Self, CegisError> {
        let mut functions = problem.functions.iter();
        let (function, signature) = match (functions.next(), functions.next()) {
            (Some((name, sig)), None) => (name.clone(), sig.clone()),
            _ => {
                return Err(CegisError::Unsupported(
                    "the neural learner synthesises exactly one function".into(),
                ))
            }
        };

        Ok(Self {
            problem,
            backend,
            oracle,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            function,
            signature,
            counterexamples: Vec::new(),
            examples: VecDeque::new(),
            queue: VecDeque::new(),
            placeholder: 0,
        })
    }

    pub fn examples(&self) -> impl Iterator<Item = &IoExample> {
        self.examples.iter()
    }

    /// Counterexamples learnt so far, sampled ones included.
    pub fn counterexamples(&self) -> &[Counterexample] {
        &self.counterexamples
    }

    /// Constant function; consecutive calls never return the same constant.
    fn placeholder_program(&mut self) -> Solution {
        let n = self.placeholder;
        self.placeholder = n.wrapping_add(1);

        let value = match self.signature.codomain {
            Sort::Bool => Value::Bool(n & 1 == 1),
            sort => {
                // A step that vanishes in the codomain would repeat the constant.
                let step = match self.config.placeholder_step {
                    s if Value::from_i64(s, sort).is_zero() => 1,
                    s => s,
                };
                Value::from_i64(n.wrapping_mul(step), sort)
            }
        };

        Solution::new().with_function(&self.function, Expr::Const(value))
    }

    fn distinct_counterexamples(&self) -> usize {
        let mut seen: Vec<&BTreeMap<Variable, Value>> = Vec::new();
        for ce in &self.counterexamples {
            if !seen.contains(&&ce.assignment) {
                seen.push(&ce.assignment);
            }
        }
        seen.len()
    }

    /// Runs the output generator on one input assignment: returns the
    /// examples of every application, or none when no output is consistent
    /// with the specification.
    fn generate_outputs(&self, assignment: &BTreeMap<Variable, Value>) -> Result<Vec<IoExample>, CegisError> {
        let mut oracle = self.backend.session()?;
        let mut encoding = OutputEncoding::new();

        for e in self
            .problem
            .side_conditions
            .iter()
            .chain(self.problem.generator_constraints())
        {
            oracle.assert(&encoding.encode(e)?)?;
        }
        for (var, value) in assignment {
            oracle.assert(&Expr::eq(Expr::Var(var.clone()), Expr::Const(*value)))?;
        }

        if oracle.solve()? == Verdict::Unsat {
            return Ok(Vec::new());
        }

        let mut env = assignment.clone();
        for out in encoding.outputs().values() {
            env.insert(out.clone(), oracle.value(out)?);
        }

        encoding
            .outputs()
            .iter()
            .filter(|(app, _)| app.function == self.function)
            .map(|(app, out)| {
                let inputs = app
                    .args
                    .iter()
                    .map(|a| a.eval(&env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(IoExample {
                    inputs,
                    output: env[out],
                })
            })
            .collect()
    }

    fn push_example(&mut self, example: IoExample) {
        if self.examples.contains(&example) {
            return;
        }
        self.examples.push_back(example);
        while self.examples.len() > self.config.max_num_io {
            self.examples.pop_front();
        }
    }

    /// Whether every example in a full window has the same output.
    fn saturated(&self) -> Option<Value> {
        let first = self.examples.front()?.output;
        let full = self.examples.len() >= self.config.min_num_io;

        (full && self.examples.iter().all(|e| e.output == first)).then_some(first)
    }

    fn random_value(&mut self, sort: Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(self.rng.gen()),
            Sort::BitVec(w) => Value::bv(self.rng.gen(), w),
            Sort::Int => Value::Int(self.rng.gen_range(-(INT_SCALE as i64)..=INT_SCALE as i64)),
        }
    }

    /// Samples inputs until one yields a new example, preferring one whose
    /// output differs from `avoid`.
    fn complementary_example(&mut self, avoid: Option<Value>) -> Result<Option<Counterexample>, CegisError> {
        let vars = self.problem.free_variables.iter().cloned().collect::<Vec<_>>();

        for _ in 0..self.config.num_random_io {
            let assignment = vars
                .iter()
                .map(|v| (v.clone(), self.random_value(v.sort)))
                .collect::<BTreeMap<_, _>>();
            if self.counterexamples.iter().any(|ce| ce.assignment == assignment) {
                continue;
            }

            let examples = self.generate_outputs(&assignment)?;
            let fresh = examples.iter().any(|e| Some(e.output) != avoid && !self.examples.contains(e));
            if fresh {
                for e in examples {
                    self.push_example(e);
                }
                return Ok(Some(Counterexample::new(assignment)));
            }
        }

        Ok(None)
    }

    fn request(&self) -> SequenceRequest {
        let mut payload = String::from("[[");
        for idx in 0..self.signature.arity() {
            payload.push('[');
            let column = self
                .examples
                .iter()
                .filter_map(|e| e.inputs.get(idx))
                .map(|v| format!("{:.6}", normalise(*v)))
                .collect::<Vec<_>>();
            payload.push_str(&column.join(", "));
            payload.push(']');
        }
        payload.push_str("]] [[[");
        let outputs = self
            .examples
            .iter()
            .map(|e| format!("{:.6}", normalise(e.output)))
            .collect::<Vec<_>>();
        payload.push_str(&outputs.join(", "));
        payload.push_str("]]]\n");

        SequenceRequest {
            function: self.function.clone(),
            arity: self.signature.arity(),
            beam_size: self.config.beam_size,
            payload,
        }
    }

    /// Counterexamples the candidate satisfies; `None` when it cannot be
    /// evaluated on them.
    fn satisfied_count(&self, candidate: &Solution) -> Result<Option<usize>, CegisError> {
        match count_satisfied(self.problem, candidate, &self.counterexamples) {
            Ok(count) => Ok(Some(count)),
            Err(CegisError::Eval(e)) => {
                warn!("Discarding generated program {candidate}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Maps a value linearly into [-1, 1].
pub fn normalise(v: Value) -> f64 {
    match v {
        Value::Bool(b) => {
            if b {
                1.0
            } else {
                -1.0
            }
        }
        Value::BitVec { bits, width } => {
            let max = crate::expr::mask(width) as f64;
            if max == 0.0 {
                0.0
            } else {
                2.0 * bits as f64 / max - 1.0
            }
        }
        Value::Int(i) => (i as f64 / INT_SCALE).clamp(-1.0, 1.0),
    }
}

impl Learner for NeuralLearner<'_> {
    /// Program size does not constrain the generator.
    fn set_program_size(&mut self, _size: usize) {}

    fn add_counterexample(&mut self, ce: Counterexample) -> Result<(), CegisError> {
        let duplicate = self.counterexamples.iter().any(|c| c.same_inputs(&ce));
        let saturated = self.saturated();

        if duplicate || saturated.is_some() {
            debug!("Counterexample {ce} adds no information, sampling a complementary one");
            if let Some(sample) = self.complementary_example(saturated)? {
                self.counterexamples.push(sample);
            }
            if duplicate {
                return Ok(());
            }
        }

        for example in self.generate_outputs(&ce.assignment)? {
            self.push_example(example);
        }
        self.counterexamples.push(ce);

        Ok(())
    }

    fn propose(&mut self) -> Result<Option<Solution>, CegisError> {
        while let Some(cached) = self.queue.pop_front() {
            if self.satisfied_count(&cached)? == Some(self.counterexamples.len()) {
                debug!("Reusing cached candidate");
                return Ok(Some(cached));
            }
        }

        if self.distinct_counterexamples() < self.config.min_num_io {
            info!("Not enough counterexamples for the generator yet, returning a placeholder program");
            return Ok(Some(self.placeholder_program()));
        }

        let request = self.request();
        debug!("Generator payload: {}", request.payload.trim_end());
        let lines = self.oracle.generate(&request)?;

        let mut candidates = Vec::new();
        for line in lines.iter().filter(|l| !l.trim().is_empty()) {
            match parse_program(line, &self.signature) {
                Ok(body) => candidates.push(Solution::new().with_function(&self.function, body)),
                Err(e) => warn!("Discarding generated program `{}`: {e}", line.trim()),
            }
        }
        if candidates.len() < self.config.beam_size {
            warn!(
                "Generator produced {} usable programs, {} requested",
                candidates.len(),
                self.config.beam_size
            );
        }

        let mut best: Option<(usize, Solution)> = None;
        for candidate in candidates {
            let Some(count) = self.satisfied_count(&candidate)? else {
                continue;
            };
            if count == self.counterexamples.len() {
                self.queue.push_back(candidate.clone());
            }
            if best.as_ref().map_or(true, |(c, _)| count > *c) {
                best = Some((count, candidate));
            }
        }

        if let Some(full) = self.queue.pop_front() {
            return Ok(Some(full));
        }
        match best {
            Some((count, candidate)) => {
                debug!("Best generated program satisfies {count} counterexamples");
                Ok(Some(candidate))
            }
            None => Ok(Some(self.placeholder_program())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_spans_unit_interval() {
        assert_eq!(normalise(Value::bv(0, 8)), -1.0);
        assert_eq!(normalise(Value::bv(0xff, 8)), 1.0);
        assert_eq!(normalise(Value::Bool(false)), -1.0);
        assert_eq!(normalise(Value::Int(1 << 20)), 1.0);
    }
}
