//! Decision-procedure boundary.
//!
//! Everything above this module talks to a solver through [`Oracle`]:
//! assert formulas, ask for satisfiability, read the model back. Two
//! backends exist: the in-process z3 library and an external SMT-LIB2
//! process.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CegisError;
use crate::expr::{BinopKind, Expr, Value, Variable};

pub(crate) mod smt2;
mod z3;

pub use self::smt2::{parse_model, Smt2Oracle};
pub use self::z3::Z3Oracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Sat,
    Unsat,
}

/// Theory the formulas live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    #[default]
    BV,
    LIA,
}

impl Logic {
    pub fn smt_name(self) -> &'static str {
        match self {
            Logic::BV => "QF_BV",
            Logic::LIA => "QF_LIA",
        }
    }

    /// Logics the bit-flattening backend cannot decide.
    pub fn requires_smt(self) -> bool {
        matches!(self, Logic::LIA)
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::BV => write!(f, "BV"),
            Logic::LIA => write!(f, "LIA"),
        }
    }
}

pub trait Oracle {
    fn assert(&mut self, e: &Expr) -> Result<(), CegisError>;

    fn solve(&mut self) -> Result<Verdict, CegisError>;

    /// Model value of `var` after a `Sat` answer. Variables the solver never
    /// saw read as the zero of their sort.
    fn value(&self, var: &Variable) -> Result<Value, CegisError>;

    fn push(&mut self) -> Result<(), CegisError>;

    fn pop(&mut self) -> Result<(), CegisError>;
}

/// Read-only view of a (partial) assignment.
pub trait Valuation {
    fn value_of(&self, var: &Variable) -> Option<Value>;
}

impl Valuation for BTreeMap<Variable, Value> {
    fn value_of(&self, var: &Variable) -> Option<Value> {
        self.get(var).copied()
    }
}

/// Exposes the current model of an oracle.
pub struct ModelView<'o>(pub &'o dyn Oracle);

impl Valuation for ModelView<'_> {
    fn value_of(&self, var: &Variable) -> Option<Value> {
        self.0.value(var).ok()
    }
}

/// Solver configuration; every learner or verifier call opens its own
/// session from it.
#[derive(Clone, Copy)]
pub enum Backend<'ctx> {
    Z3 {
        context: &'ctx ::z3::Context,
        logic: Logic,
        simplify: bool,
    },
    Smt2 {
        command: &'ctx [String],
        logic: Logic,
    },
}

impl<'ctx> Backend<'ctx> {
    pub fn z3(context: &'ctx ::z3::Context, logic: Logic) -> Self {
        Backend::Z3 {
            context,
            logic,
            simplify: false,
        }
    }

    pub fn logic(&self) -> Logic {
        match self {
            Backend::Z3 { logic, .. } | Backend::Smt2 { logic, .. } => *logic,
        }
    }

    pub fn session(&self) -> Result<Box<dyn Oracle + 'ctx>, CegisError> {
        match *self {
            Backend::Z3 {
                context,
                logic,
                simplify,
            } => Ok(Box::new(Z3Oracle::new(context, logic, simplify))),
            Backend::Smt2 { command, logic } => Ok(Box::new(Smt2Oracle::new(command, logic)?)),
        }
    }
}

impl fmt::Debug for Backend<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Z3 { logic, simplify, .. } => f
                .debug_struct("Z3")
                .field("logic", logic)
                .field("simplify", simplify)
                .finish(),
            Backend::Smt2 { command, logic } => f
                .debug_struct("Smt2")
                .field("command", command)
                .field("logic", logic)
                .finish(),
        }
    }
}

/// Integer division and remainder by zero are left open by SMT-LIB. Fix
/// them to the values the evaluator uses so solver models and concrete
/// evaluation agree.
pub(crate) fn guard_int_division(e: &Expr) -> Expr {
    e.rewrite(&mut |node| match node {
        Expr::Binop(kind @ (BinopKind::UDiv | BinopKind::SDiv | BinopKind::URem | BinopKind::SRem), lr)
            if lr.0.sort() == crate::expr::Sort::Int =>
        {
            let l = guard_int_division(&lr.0);
            let r = guard_int_division(&lr.1);
            let fallback = match kind {
                BinopKind::UDiv | BinopKind::SDiv => Expr::int(0),
                _ => l.clone(),
            };

            Some(Expr::ite(
                Expr::eq(r.clone(), Expr::int(0)),
                fallback,
                Expr::binop(*kind, l, r),
            ))
        }
        _ => None,
    })
}
