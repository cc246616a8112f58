//! Reader for program texts produced by external generators.
//!
//! A program is either a full `(define-fun name ((p S) ...) S body)`
//! command or a bare term over the parameters `a0`, `a1`, ...

use std::collections::BTreeMap;

use smt2parser::concrete::{Command, Constant, QualIdentifier, SyntaxBuilder, Term};
use smt2parser::visitors::Identifier;
use smt2parser::CommandStream;

use crate::error::CegisError;
use crate::expr::{arg_name, BinopKind, Expr, Sort};
use crate::oracle::smt2::{convert_sort, convert_value};
use crate::problem::Signature;

/// Parses one program line into a function body over `Arg` parameters.
pub fn parse_program(text: &str, sig: &Signature) -> Result<Expr, CegisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CegisError::Unsupported("empty program text".into()));
    }

    let body = if text.starts_with("(define-fun") {
        parse_definition(text, sig)?
    } else {
        let params = (0..sig.arity())
            .map(|idx| (arg_name(idx), Expr::arg(idx, sig.domain[idx])))
            .collect();
        let term = parse_term(text)?;
        Converter { params }.expr(&term)?
    };

    if body.sort() != sig.codomain {
        return Err(CegisError::MalformedProblem(format!(
            "program {body} has sort {}, expected {}",
            body.sort(),
            sig.codomain
        )));
    }

    Ok(body)
}

fn parse_definition(text: &str, sig: &Signature) -> Result<Expr, CegisError> {
    let mut commands = CommandStream::new(text.as_bytes(), SyntaxBuilder, None);

    match commands.next() {
        Some(Ok(Command::DefineFun { sig: dec, term })) => {
            if dec.parameters.len() != sig.arity() {
                return Err(CegisError::MalformedProblem(format!(
                    "`{}` takes {} parameters, expected {}",
                    dec.name.0,
                    dec.parameters.len(),
                    sig.arity()
                )));
            }

            let mut params = BTreeMap::new();
            for (idx, (symbol, sort)) in dec.parameters.iter().enumerate() {
                let sort = convert_sort(sort)?;
                if sort != sig.domain[idx] {
                    return Err(CegisError::MalformedProblem(format!(
                        "parameter `{}` has sort {sort}, expected {}",
                        symbol.0, sig.domain[idx]
                    )));
                }
                params.insert(symbol.0.clone(), Expr::arg(idx, sort));
            }

            Converter { params }.expr(&term)
        }
        Some(Ok(other)) => Err(CegisError::Unsupported(format!("command {other}"))),
        Some(Err(e)) => Err(e.into()),
        None => Err(CegisError::Unsupported("empty program text".into())),
    }
}

/// Parses a bare term by wrapping it in an assertion.
fn parse_term(text: &str) -> Result<Term, CegisError> {
    let wrapped = format!("(assert {text})");
    let mut commands = CommandStream::new(wrapped.as_bytes(), SyntaxBuilder, None);

    match commands.next() {
        Some(Ok(Command::Assert { term })) => Ok(term),
        Some(Err(e)) => Err(e.into()),
        _ => Err(CegisError::Unsupported(format!("term {text}"))),
    }
}

struct Converter {
    params: BTreeMap<String, Expr>,
}

impl Converter {
    fn expr(&self, term: &Term) -> Result<Expr, CegisError> {
        match term {
            Term::Constant(Constant::Numeral(_)) => Ok(Expr::Const(convert_value(term, Sort::Int)?)),
            Term::Constant(Constant::Hexadecimal(nibbles)) => {
                let width = 4 * nibbles.len() as u32;
                Ok(Expr::Const(convert_value(term, Sort::BitVec(width))?))
            }
            Term::Constant(Constant::Binary(digits)) => {
                let width = digits.len() as u32;
                Ok(Expr::Const(convert_value(term, Sort::BitVec(width))?))
            }
            Term::QualIdentifier(QualIdentifier::Simple { identifier }) => self.leaf(identifier, term),
            Term::Application {
                qual_identifier: QualIdentifier::Simple { identifier: Identifier::Simple { symbol } },
                arguments,
            } => {
                let args = arguments
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                build(&symbol.0, args)
            }
            _ => Err(CegisError::Unsupported(format!("term {term}"))),
        }
    }

    fn leaf(&self, identifier: &Identifier, term: &Term) -> Result<Expr, CegisError> {
        match identifier {
            Identifier::Simple { symbol } => match symbol.0.as_str() {
                "true" => Ok(Expr::bool(true)),
                "false" => Ok(Expr::bool(false)),
                name => self
                    .params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CegisError::MalformedProblem(format!("unknown symbol `{name}`"))),
            },
            // `(_ bvN w)`
            Identifier::Indexed { indices, .. } => match indices.as_slice() {
                [smt2parser::visitors::Index::Numeral(w)] => {
                    let width = num_traits::ToPrimitive::to_u32(w)
                        .ok_or_else(|| CegisError::Unsupported(format!("term {term}")))?;
                    Ok(Expr::Const(convert_value(term, Sort::BitVec(width))?))
                }
                _ => Err(CegisError::Unsupported(format!("term {term}"))),
            },
        }
    }
}

/// Operand sorts an operator accepts.
#[derive(Debug, Clone, Copy)]
enum Operands {
    Bool,
    BitVec,
    Int,
    /// Checked by the operator itself.
    Any,
}

fn operands(op: &str) -> Operands {
    match op {
        "and" | "or" | "not" | "=>" => Operands::Bool,
        "+" | "-" | "*" | "div" | "mod" | "<" | "<=" | ">" | ">=" => Operands::Int,
        "=" | "ite" => Operands::Any,
        _ => Operands::BitVec,
    }
}

fn build(op: &str, mut args: Vec<Expr>) -> Result<Expr, CegisError> {
    use BinopKind::*;

    let arity_error = || CegisError::MalformedProblem(format!("wrong number of operands for `{op}`"));

    let well_sorted = match operands(op) {
        Operands::Bool => args.iter().all(|a| a.sort() == Sort::Bool),
        Operands::BitVec => args.iter().all(|a| matches!(a.sort(), Sort::BitVec(_))),
        Operands::Int => args.iter().all(|a| a.sort() == Sort::Int),
        Operands::Any => true,
    };
    if !well_sorted {
        return Err(CegisError::MalformedProblem(format!("ill-sorted operands for `{op}`")));
    }

    let binop = match op {
        "bvadd" | "+" => Some((Add, false)),
        "bvsub" => Some((Sub, false)),
        "bvmul" | "*" => Some((Mul, false)),
        "bvudiv" => Some((UDiv, false)),
        "bvsdiv" | "div" => Some((SDiv, false)),
        "bvurem" => Some((URem, false)),
        "bvsrem" | "mod" => Some((SRem, false)),
        "bvand" => Some((BitAnd, false)),
        "bvor" => Some((BitOr, false)),
        "bvxor" => Some((BitXor, false)),
        "bvshl" => Some((Shl, false)),
        "bvlshr" => Some((LShr, false)),
        "bvashr" => Some((AShr, false)),
        "=" => Some((Eq, false)),
        "=>" => Some((Implies, false)),
        "bvult" | "<" => Some((Ult, false)),
        "bvule" | "<=" => Some((Ule, false)),
        "bvslt" => Some((Slt, false)),
        "bvsle" => Some((Sle, false)),
        "bvugt" | ">" => Some((Ult, true)),
        "bvuge" | ">=" => Some((Ule, true)),
        "bvsgt" => Some((Slt, true)),
        "bvsge" => Some((Sle, true)),
        _ => None,
    };

    if let Some((kind, swapped)) = binop {
        if args.len() != 2 {
            return Err(arity_error());
        }
        let r = args.pop().ok_or_else(arity_error)?;
        let l = args.pop().ok_or_else(arity_error)?;
        let (l, r) = if swapped { (r, l) } else { (l, r) };

        if l.sort() != r.sort() {
            return Err(CegisError::MalformedProblem(format!("sort mismatch in `{op}`")));
        }
        return Ok(Expr::binop(kind, l, r));
    }

    match (op, args.len()) {
        ("-", 1) | ("bvneg", 1) => Ok(Expr::neg(args.remove(0))),
        ("-", 2) => {
            let r = args.remove(1);
            Ok(Expr::sub(args.remove(0), r))
        }
        ("bvnot", 1) => Ok(Expr::bvnot(args.remove(0))),
        ("not", 1) => Ok(Expr::not(args.remove(0))),
        ("and", _) => Ok(Expr::and(args)),
        ("or", _) => Ok(Expr::or(args)),
        ("ite", 3) => {
            let f = args.remove(2);
            let t = args.remove(1);
            let c = args.remove(0);
            if c.sort() != Sort::Bool || t.sort() != f.sort() {
                return Err(CegisError::MalformedProblem("ill-sorted ite".into()));
            }
            Ok(Expr::ite(c, t, f))
        }
        ("-" | "bvneg" | "bvnot" | "not" | "ite", _) => Err(arity_error()),
        _ => Err(CegisError::Unsupported(format!("operator `{op}`"))),
    }
}
