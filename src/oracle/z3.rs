use std::collections::BTreeMap;

use ::z3::ast::{Ast, Bool, Int, BV};
use log::{debug, trace};

use super::{guard_int_division, Logic, Oracle, Verdict};
use crate::error::CegisError;
use crate::expr::{BinopKind, Expr, Sort, UnopKind, Value, Variable};

#[derive(Clone)]
enum Term<'ctx> {
    Bool(Bool<'ctx>),
    BV(BV<'ctx>),
    Int(Int<'ctx>),
}

impl<'ctx> Term<'ctx> {
    fn into_bool(self) -> Result<Bool<'ctx>, CegisError> {
        match self {
            Term::Bool(b) => Ok(b),
            _ => Err(CegisError::oracle("expected a Boolean term")),
        }
    }
}

/// Session on the in-process z3 library.
pub struct Z3Oracle<'ctx> {
    z3: &'ctx ::z3::Context,
    solver: ::z3::Solver<'ctx>,
    vars: BTreeMap<Variable, Term<'ctx>>,
    model: Option<::z3::Model<'ctx>>,
}

impl<'ctx> Z3Oracle<'ctx> {
    pub fn new(z3: &'ctx ::z3::Context, logic: Logic, simplify: bool) -> Self {
        let solver = if simplify {
            ::z3::Tactic::new(z3, "simplify")
                .and_then(&::z3::Tactic::new(z3, "smt"))
                .solver()
        } else {
            ::z3::Solver::new_for_logic(z3, logic.smt_name())
                .unwrap_or_else(|| ::z3::Solver::new(z3))
        };

        Self {
            z3,
            solver,
            vars: BTreeMap::new(),
            model: None,
        }
    }

    fn variable(&mut self, var: &Variable) -> Term<'ctx> {
        if let Some(t) = self.vars.get(var) {
            return t.clone();
        }

        trace!("Declaring {} : {}", var.name, var.sort);
        let t = match var.sort {
            Sort::Bool => Term::Bool(Bool::new_const(self.z3, var.name.as_str())),
            Sort::BitVec(w) => Term::BV(BV::new_const(self.z3, var.name.as_str(), w)),
            Sort::Int => Term::Int(Int::new_const(self.z3, var.name.as_str())),
        };
        self.vars.insert(var.clone(), t.clone());

        t
    }

    fn constant(&self, v: Value) -> Term<'ctx> {
        match v {
            Value::Bool(b) => Term::Bool(Bool::from_bool(self.z3, b)),
            Value::BitVec { bits, width } => Term::BV(BV::from_u64(self.z3, bits, width)),
            Value::Int(i) => Term::Int(Int::from_i64(self.z3, i)),
        }
    }

    fn term(&mut self, e: &Expr) -> Result<Term<'ctx>, CegisError> {
        Ok(match e {
            Expr::Const(v) => self.constant(*v),
            Expr::Var(v) => self.variable(v),
            Expr::Arg(..) | Expr::Apply(_) => {
                return Err(CegisError::Unsupported(format!(
                    "{e} must be encoded before it reaches the solver"
                )))
            }
            Expr::Unop(kind, inner) => match (kind, self.term(inner)?) {
                (UnopKind::Not, Term::Bool(b)) => Term::Bool(b.not()),
                (UnopKind::BvNot, Term::BV(b)) => Term::BV(b.bvnot()),
                (UnopKind::Neg, Term::BV(b)) => Term::BV(b.bvneg()),
                (UnopKind::Neg, Term::Int(i)) => Term::Int(i.unary_minus()),
                _ => return Err(CegisError::oracle(format!("ill-sorted term {e}"))),
            },
            Expr::Binop(kind, lr) => {
                let l = self.term(&lr.0)?;
                let r = self.term(&lr.1)?;
                self.binop(*kind, l, r)
                    .ok_or_else(|| CegisError::oracle(format!("ill-sorted term {e}")))?
            }
            Expr::Ite(cte) => {
                let c = self.term(&cte.0)?.into_bool()?;
                match (self.term(&cte.1)?, self.term(&cte.2)?) {
                    (Term::Bool(t), Term::Bool(f)) => Term::Bool(c.ite(&t, &f)),
                    (Term::BV(t), Term::BV(f)) => Term::BV(c.ite(&t, &f)),
                    (Term::Int(t), Term::Int(f)) => Term::Int(c.ite(&t, &f)),
                    _ => return Err(CegisError::oracle(format!("ill-sorted term {e}"))),
                }
            }
            Expr::And(es) | Expr::Or(es) => {
                let parts = es
                    .iter()
                    .map(|x| self.term(x)?.into_bool())
                    .collect::<Result<Vec<_>, _>>()?;
                let refs = parts.iter().collect::<Vec<_>>();

                if matches!(e, Expr::And(_)) {
                    Term::Bool(Bool::and(self.z3, &refs))
                } else {
                    Term::Bool(Bool::or(self.z3, &refs))
                }
            }
        })
    }

    fn binop(&self, kind: BinopKind, l: Term<'ctx>, r: Term<'ctx>) -> Option<Term<'ctx>> {
        use BinopKind::*;

        Some(match (l, r) {
            (Term::BV(a), Term::BV(b)) => match kind {
                Add => Term::BV(a.bvadd(&b)),
                Sub => Term::BV(a.bvsub(&b)),
                Mul => Term::BV(a.bvmul(&b)),
                UDiv => Term::BV(a.bvudiv(&b)),
                SDiv => Term::BV(a.bvsdiv(&b)),
                URem => Term::BV(a.bvurem(&b)),
                SRem => Term::BV(a.bvsrem(&b)),
                BitAnd => Term::BV(a.bvand(&b)),
                BitOr => Term::BV(a.bvor(&b)),
                BitXor => Term::BV(a.bvxor(&b)),
                Shl => Term::BV(a.bvshl(&b)),
                LShr => Term::BV(a.bvlshr(&b)),
                AShr => Term::BV(a.bvashr(&b)),
                Eq => Term::Bool(a._eq(&b)),
                Ult => Term::Bool(a.bvult(&b)),
                Ule => Term::Bool(a.bvule(&b)),
                Slt => Term::Bool(a.bvslt(&b)),
                Sle => Term::Bool(a.bvsle(&b)),
                Implies => return None,
            },
            (Term::Int(a), Term::Int(b)) => match kind {
                Add => Term::Int(Int::add(self.z3, &[&a, &b])),
                Sub => Term::Int(Int::sub(self.z3, &[&a, &b])),
                Mul => Term::Int(Int::mul(self.z3, &[&a, &b])),
                UDiv | SDiv => Term::Int(a.div(&b)),
                URem | SRem => Term::Int(a.modulo(&b)),
                Eq => Term::Bool(a._eq(&b)),
                Ult | Slt => Term::Bool(a.lt(&b)),
                Ule | Sle => Term::Bool(a.le(&b)),
                _ => return None,
            },
            (Term::Bool(a), Term::Bool(b)) => match kind {
                Eq => Term::Bool(a._eq(&b)),
                Implies => Term::Bool(a.implies(&b)),
                _ => return None,
            },
            _ => return None,
        })
    }
}

impl<'ctx> Oracle for Z3Oracle<'ctx> {
    fn assert(&mut self, e: &Expr) -> Result<(), CegisError> {
        let e = guard_int_division(e);
        let b = self.term(&e)?.into_bool()?;
        self.solver.assert(&b);
        self.model = None;

        Ok(())
    }

    fn solve(&mut self) -> Result<Verdict, CegisError> {
        let verdict = self.solver.check();
        debug!("Z3 verdict: {verdict:?}");

        match verdict {
            ::z3::SatResult::Sat => {
                self.model = self.solver.get_model();
                if self.model.is_none() {
                    return Err(CegisError::oracle("z3 answered sat without a model"));
                }
                Ok(Verdict::Sat)
            }
            ::z3::SatResult::Unsat => {
                self.model = None;
                Ok(Verdict::Unsat)
            }
            ::z3::SatResult::Unknown => Err(CegisError::oracle(format!(
                "z3 answered unknown: {}",
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "no reason given".to_string())
            ))),
        }
    }

    fn value(&self, var: &Variable) -> Result<Value, CegisError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CegisError::oracle("no model available"))?;
        let missing = || CegisError::oracle(format!("model has no value for `{}`", var.name));

        match self.vars.get(var) {
            None => Ok(var.sort.zero()),
            Some(Term::Bool(b)) => model
                .eval(b, true)
                .and_then(|x| x.as_bool())
                .map(Value::Bool)
                .ok_or_else(missing),
            Some(Term::BV(b)) => model
                .eval(b, true)
                .and_then(|x| x.as_u64())
                .map(|bits| Value::bv(bits, b.get_size()))
                .ok_or_else(missing),
            Some(Term::Int(i)) => model
                .eval(i, true)
                .and_then(|x| x.as_i64())
                .map(Value::Int)
                .ok_or_else(missing),
        }
    }

    fn push(&mut self) -> Result<(), CegisError> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), CegisError> {
        self.solver.pop(1);
        self.model = None;
        Ok(())
    }
}
