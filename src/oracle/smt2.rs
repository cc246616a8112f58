use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, trace};
use num_traits::ToPrimitive;
use smt2parser::concrete::{Command as SmtCommand, Constant, QualIdentifier, SyntaxBuilder, Term};
use smt2parser::visitors::Identifier;
use smt2parser::CommandStream;

use super::{guard_int_division, Logic, Oracle, Verdict};
use crate::error::CegisError;
use crate::expr::{quote_symbol, Expr, Sort, Value, Variable};

/// Session on an external SMT-LIB2 solver. Assertions are kept in memory,
/// one frame per `push`; every `solve` replays the script through a fresh
/// solver process.
pub struct Smt2Oracle {
    command: Vec<String>,
    logic: Logic,
    frames: Vec<Vec<String>>,
    declared: BTreeSet<Variable>,
    model: Option<BTreeMap<String, Value>>,
}

impl Smt2Oracle {
    pub fn new(command: &[String], logic: Logic) -> Result<Self, CegisError> {
        if command.is_empty() {
            return Err(CegisError::process(command, "empty solver command"));
        }

        Ok(Self {
            command: command.to_vec(),
            logic,
            frames: vec![Vec::new()],
            declared: BTreeSet::new(),
            model: None,
        })
    }

    fn script(&self) -> String {
        let mut out = String::new();
        out.push_str("(set-option :produce-models true)\n");
        out.push_str(&format!("(set-logic {})\n", self.logic.smt_name()));

        for var in &self.declared {
            out.push_str(&format!(
                "(declare-fun {} () {})\n",
                quote_symbol(&var.name),
                var.sort
            ));
        }
        for assertion in self.frames.iter().flatten() {
            out.push_str(&format!("(assert {assertion})\n"));
        }
        out.push_str("(check-sat)\n(get-model)\n(exit)\n");

        out
    }

    fn run(&self, script: &str) -> Result<String, CegisError> {
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CegisError::process(&self.command, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| CegisError::process(&self.command, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CegisError::process(&self.command, e))?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Oracle for Smt2Oracle {
    fn assert(&mut self, e: &Expr) -> Result<(), CegisError> {
        let mut vars = BTreeSet::new();
        e.collect_variables(&mut vars);
        self.declared.extend(vars);

        let e = guard_int_division(e);
        if e.has_applications() {
            return Err(CegisError::Unsupported(format!(
                "{e} must be encoded before it reaches the solver"
            )));
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.push(e.to_string());
        }
        self.model = None;

        Ok(())
    }

    fn solve(&mut self) -> Result<Verdict, CegisError> {
        let script = self.script();
        trace!("SMT-LIB2 script:\n{script}");

        let response = self.run(&script)?;
        let (answer, rest) = split_answer(&response);
        debug!("{} verdict: {answer}", self.command[0]);

        match answer {
            "sat" => {
                self.model = Some(parse_model(rest)?);
                Ok(Verdict::Sat)
            }
            "unsat" => Ok(Verdict::Unsat),
            "unknown" => Err(CegisError::oracle(format!("{} answered unknown", self.command[0]))),
            "" => Err(CegisError::process(&self.command, "no answer")),
            _ => Err(CegisError::oracle(format!("unexpected answer: {}", response.trim()))),
        }
    }

    fn value(&self, var: &Variable) -> Result<Value, CegisError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CegisError::oracle("no model available"))?;

        match model.get(&var.name) {
            Some(v) if v.sort() == var.sort => Ok(*v),
            Some(v) => Err(CegisError::oracle(format!(
                "model value {v} does not fit `{}`",
                var.name
            ))),
            None => Ok(var.sort.zero()),
        }
    }

    fn push(&mut self) -> Result<(), CegisError> {
        self.frames.push(Vec::new());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), CegisError> {
        if self.frames.len() <= 1 {
            return Err(CegisError::oracle("pop without matching push"));
        }
        self.frames.pop();
        self.model = None;
        Ok(())
    }
}

/// Splits the leading `sat`/`unsat` token off a solver response. An
/// `(error ...)` line in front of the answer is returned as the answer.
fn split_answer(response: &str) -> (&str, &str) {
    let trimmed = response.trim_start();
    let end = trimmed.find('\n').unwrap_or(trimmed.len());
    let (first, rest) = trimmed.split_at(end);

    (first.trim(), rest)
}

/// Parses a `(get-model)` response into named values.
pub fn parse_model(text: &str) -> Result<BTreeMap<String, Value>, CegisError> {
    let mut body = text.trim();
    if let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        body = inner.trim_start();
    }
    if let Some(inner) = body.strip_prefix("model") {
        body = inner;
    }

    let mut model = BTreeMap::new();
    let commands = CommandStream::new(body.as_bytes(), SyntaxBuilder, None);

    for command in commands {
        match command? {
            SmtCommand::DefineFun { sig, term } if sig.parameters.is_empty() => {
                let sort = convert_sort(&sig.result)?;
                model.insert(sig.name.0.clone(), convert_value(&term, sort)?);
            }
            // Auxiliary definitions some solvers add to a model.
            _ => (),
        }
    }

    Ok(model)
}

pub(crate) fn convert_sort(sort: &smt2parser::concrete::Sort) -> Result<Sort, CegisError> {
    let err = || Err(CegisError::Unsupported(format!("sort {sort}")));

    match sort {
        smt2parser::concrete::Sort::Simple { identifier } => match identifier {
            Identifier::Simple { symbol } => match symbol.0.as_str() {
                "Bool" => Ok(Sort::Bool),
                "Int" => Ok(Sort::Int),
                _ => err(),
            },
            Identifier::Indexed { symbol, indices } if symbol.0 == "BitVec" => {
                match indices.as_slice() {
                    [smt2parser::visitors::Index::Numeral(n)] => n
                        .to_u32()
                        .map(Sort::BitVec)
                        .map_or_else(err, Ok),
                    _ => err(),
                }
            }
            Identifier::Indexed { .. } => err(),
        },
        smt2parser::concrete::Sort::Parameterized { .. } => err(),
    }
}

/// Reads a constant model term of the given sort.
pub(crate) fn convert_value(term: &Term, sort: Sort) -> Result<Value, CegisError> {
    let err = || CegisError::Unsupported(format!("model term {term}"));

    match term {
        Term::Constant(Constant::Numeral(n)) => match sort {
            Sort::Int => n.to_i64().map(Value::Int).ok_or_else(err),
            Sort::BitVec(w) => n.to_u64().map(|bits| Value::bv(bits, w)).ok_or_else(err),
            Sort::Bool => Err(err()),
        },
        Term::Constant(Constant::Hexadecimal(nibbles)) => {
            let bits = nibbles
                .iter()
                .fold(0u64, |acc, nibble| (acc << 4) | u64::from(*nibble));
            Ok(Value::from_i64(bits as i64, sort))
        }
        Term::Constant(Constant::Binary(digits)) => {
            let bits = digits
                .iter()
                .fold(0u64, |acc, bit| (acc << 1) | u64::from(*bit));
            Ok(Value::from_i64(bits as i64, sort))
        }
        Term::QualIdentifier(QualIdentifier::Simple {
            identifier: Identifier::Simple { symbol },
        }) => match symbol.0.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(err()),
        },
        // `(- n)` for negative integers; `(_ bvN w)` for bit-vectors.
        Term::Application {
            qual_identifier:
                QualIdentifier::Simple {
                    identifier: Identifier::Simple { symbol },
                },
            arguments,
        } if symbol.0 == "-" && arguments.len() == 1 => {
            let v = convert_value(&arguments[0], sort)?;
            Ok(Value::from_i64(v.as_i64().wrapping_neg(), sort))
        }
        _ => match indexed_bv_literal(term) {
            Some(bits) => Ok(Value::from_i64(bits as i64, sort)),
            None => Err(err()),
        },
    }
}

fn indexed_bv_literal(term: &Term) -> Option<u64> {
    match term {
        Term::QualIdentifier(QualIdentifier::Simple {
            identifier: Identifier::Indexed { symbol, indices },
        }) => {
            let digits = symbol.0.strip_prefix("bv")?;
            match indices.as_slice() {
                [smt2parser::visitors::Index::Numeral(_)] => digits.parse().ok(),
                _ => None,
            }
        }
        _ => None,
    }
}
