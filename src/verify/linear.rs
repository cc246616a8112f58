//! Linear integer arithmetic normal forms.
//!
//! A Boolean formula over `Int` variables becomes a disjunction of systems
//! of inequalities `Σ aᵢxᵢ + c ≤ 0`. Strict comparisons are tightened to
//! non-strict ones, which is exact over the integers.

use std::collections::BTreeMap;
use std::fmt;

use num_integer::Integer;

use crate::expr::{BinopKind, Expr, Sort, UnopKind, Value, Variable};

/// Upper bound on the number of disjuncts a formula may expand to.
pub(crate) const MAX_CASES: usize = 1 << 12;

/// `Σ coeffs[x]·x + constant`. Zero coefficients are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinExpr {
    pub coeffs: BTreeMap<Variable, i128>,
    pub constant: i128,
}

impl LinExpr {
    pub fn constant(c: i128) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn var(v: Variable) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(v, 1);
        Self { coeffs, constant: 0 }
    }

    pub fn coeff(&self, v: &Variable) -> i128 {
        self.coeffs.get(v).copied().unwrap_or(0)
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn checked_add(&self, other: &LinExpr) -> Option<LinExpr> {
        let mut out = self.clone();
        for (v, c) in &other.coeffs {
            let sum = out.coeff(v).checked_add(*c)?;
            if sum == 0 {
                out.coeffs.remove(v);
            } else {
                out.coeffs.insert(v.clone(), sum);
            }
        }
        out.constant = out.constant.checked_add(other.constant)?;
        Some(out)
    }

    pub fn checked_scale(&self, k: i128) -> Option<LinExpr> {
        if k == 0 {
            return Some(LinExpr::default());
        }
        let mut coeffs = BTreeMap::new();
        for (v, c) in &self.coeffs {
            coeffs.insert(v.clone(), c.checked_mul(k)?);
        }
        Some(LinExpr {
            coeffs,
            constant: self.constant.checked_mul(k)?,
        })
    }

    pub fn checked_sub(&self, other: &LinExpr) -> Option<LinExpr> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    /// Value under an assignment of (some of) the variables; unassigned
    /// variables count as zero.
    pub fn eval(&self, assignment: &BTreeMap<Variable, i128>) -> Option<i128> {
        let mut acc = self.constant;
        for (v, c) in &self.coeffs {
            let x = assignment.get(v).copied().unwrap_or(0);
            acc = acc.checked_add(c.checked_mul(x)?)?;
        }
        Some(acc)
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (v, c) in &self.coeffs {
            write!(f, "{c}·{} + ", v.name)?;
        }
        write!(f, "{}", self.constant)
    }
}

/// `expr ≤ 0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Inequality(pub LinExpr);

impl Inequality {
    /// `l ≤ r`.
    pub fn le(l: &LinExpr, r: &LinExpr) -> Option<Self> {
        Some(Inequality(l.checked_sub(r)?).normalized())
    }

    /// `l < r`, i.e. `l - r + 1 ≤ 0`.
    pub fn lt(l: &LinExpr, r: &LinExpr) -> Option<Self> {
        let mut e = l.checked_sub(r)?;
        e.constant = e.constant.checked_add(1)?;
        Some(Inequality(e).normalized())
    }

    /// Divides through by the coefficient gcd, rounding the constant up.
    pub fn normalized(self) -> Self {
        let g = self
            .0
            .coeffs
            .values()
            .fold(0i128, |g, c| Integer::gcd(&g, c));
        if g <= 1 {
            return self;
        }

        let coeffs = self.0.coeffs.into_iter().map(|(v, c)| (v, c / g)).collect();
        Inequality(LinExpr {
            coeffs,
            constant: Integer::div_ceil(&self.0.constant, &g),
        })
    }

    /// `Some(holds)` once no variable is left.
    pub fn trivial(&self) -> Option<bool> {
        self.0.is_constant().then_some(self.0.constant <= 0)
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= 0", self.0)
    }
}

/// A conjunction of inequalities.
pub type System = Vec<Inequality>;

/// Linear form of an `Int` term, `None` when the term is not linear.
pub fn linearize(e: &Expr) -> Option<LinExpr> {
    match e {
        Expr::Const(Value::Int(i)) => Some(LinExpr::constant(*i as i128)),
        Expr::Var(v) if v.sort == Sort::Int => Some(LinExpr::var(v.clone())),
        Expr::Unop(UnopKind::Neg, e) => linearize(e)?.checked_scale(-1),
        Expr::Binop(BinopKind::Add, lr) => linearize(&lr.0)?.checked_add(&linearize(&lr.1)?),
        Expr::Binop(BinopKind::Sub, lr) => linearize(&lr.0)?.checked_sub(&linearize(&lr.1)?),
        Expr::Binop(BinopKind::Mul, lr) => {
            let (l, r) = (linearize(&lr.0)?, linearize(&lr.1)?);
            if l.is_constant() {
                r.checked_scale(l.constant)
            } else if r.is_constant() {
                l.checked_scale(r.constant)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Rewrites `P(ite(c, a, b))` into `ite(c, P(a), P(b))` for the first
/// `Int`-sorted conditional inside an atom.
fn lift_ite(atom: &Expr) -> Option<Expr> {
    let mut found = None;
    atom.visit(&mut |e| {
        if found.is_none() {
            if let Expr::Ite(cte) = e {
                if cte.1.sort() == Sort::Int {
                    found = Some(e.clone());
                }
            }
        }
    });

    let ite = found?;
    let Expr::Ite(cte) = &ite else {
        return None;
    };
    let (c, t, f) = &**cte;
    let branch = |with: &Expr| atom.rewrite(&mut |e| (*e == ite).then(|| with.clone()));

    Some(Expr::ite(c.clone(), branch(t), branch(f)))
}

/// Disjunctive normal form of `e` (or of its negation when `!positive`).
/// `None` when the formula leaves linear integer arithmetic or grows past
/// [`MAX_CASES`] disjuncts.
pub fn dnf(e: &Expr, positive: bool) -> Option<Vec<System>> {
    match e {
        Expr::Const(Value::Bool(b)) => Some(if *b == positive { vec![vec![]] } else { vec![] }),
        Expr::Unop(UnopKind::Not, e) => dnf(e, !positive),
        Expr::And(es) if positive => conjunction(es.iter().map(|e| (e, true))),
        Expr::And(es) => disjunction(es.iter().map(|e| (e, false))),
        Expr::Or(es) if positive => disjunction(es.iter().map(|e| (e, true))),
        Expr::Or(es) => conjunction(es.iter().map(|e| (e, false))),
        Expr::Binop(BinopKind::Implies, lr) if positive => disjunction([(&lr.0, false), (&lr.1, true)].into_iter()),
        Expr::Binop(BinopKind::Implies, lr) => conjunction([(&lr.0, true), (&lr.1, false)].into_iter()),
        Expr::Ite(cte) if cte.1.sort() == Sort::Bool => {
            let (c, t, f) = &**cte;
            let then = conjunction([(c, true), (t, positive)].into_iter())?;
            let otherwise = conjunction([(c, false), (f, positive)].into_iter())?;
            bounded([then, otherwise].concat())
        }
        Expr::Binop(BinopKind::Eq, lr) if lr.0.sort() == Sort::Bool => {
            let (l, r) = (&lr.0, &lr.1);
            let both = conjunction([(l, true), (r, positive)].into_iter())?;
            let neither = conjunction([(l, false), (r, !positive)].into_iter())?;
            bounded([both, neither].concat())
        }
        Expr::Binop(kind, lr) if lr.0.sort() == Sort::Int => {
            if let Some(lifted) = lift_ite(e) {
                return dnf(&lifted, positive);
            }
            atom(*kind, &linearize(&lr.0)?, &linearize(&lr.1)?, positive)
        }
        _ => None,
    }
}

fn atom(kind: BinopKind, l: &LinExpr, r: &LinExpr, positive: bool) -> Option<Vec<System>> {
    match (kind, positive) {
        (BinopKind::Eq, true) => Some(vec![vec![Inequality::le(l, r)?, Inequality::le(r, l)?]]),
        (BinopKind::Eq, false) => Some(vec![vec![Inequality::lt(l, r)?], vec![Inequality::lt(r, l)?]]),
        (BinopKind::Ult | BinopKind::Slt, true) => Some(vec![vec![Inequality::lt(l, r)?]]),
        (BinopKind::Ult | BinopKind::Slt, false) => Some(vec![vec![Inequality::le(r, l)?]]),
        (BinopKind::Ule | BinopKind::Sle, true) => Some(vec![vec![Inequality::le(l, r)?]]),
        (BinopKind::Ule | BinopKind::Sle, false) => Some(vec![vec![Inequality::lt(r, l)?]]),
        _ => None,
    }
}

fn bounded(cases: Vec<System>) -> Option<Vec<System>> {
    (cases.len() <= MAX_CASES).then_some(cases)
}

fn disjunction<'e>(parts: impl Iterator<Item = (&'e Expr, bool)>) -> Option<Vec<System>> {
    let mut out = Vec::new();
    for (e, positive) in parts {
        out.extend(dnf(e, positive)?);
        if out.len() > MAX_CASES {
            return None;
        }
    }
    Some(out)
}

fn conjunction<'e>(parts: impl Iterator<Item = (&'e Expr, bool)>) -> Option<Vec<System>> {
    let mut out: Vec<System> = vec![vec![]];
    for (e, positive) in parts {
        let cases = dnf(e, positive)?;
        if out.len().saturating_mul(cases.len()) > MAX_CASES {
            return None;
        }
        out = out
            .iter()
            .flat_map(|sys| {
                cases.iter().map(move |case| {
                    let mut merged = sys.clone();
                    merged.extend(case.iter().cloned());
                    merged
                })
            })
            .collect();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x", Sort::Int)
    }

    #[test]
    fn strict_comparison_is_tightened() {
        let cases = dnf(&Expr::slt(x(), Expr::int(3)), true).unwrap();
        let ineq = &cases[0][0];

        // x < 3  ~>  x - 2 <= 0
        assert_eq!(ineq.0.coeff(&Variable::new("x", Sort::Int)), 1);
        assert_eq!(ineq.0.constant, -2);
    }

    #[test]
    fn gcd_normalisation_rounds_towards_integers() {
        // 2x - 3 <= 0  ~>  x - 1 <= 0
        let e = LinExpr::var(Variable::new("x", Sort::Int))
            .checked_scale(2)
            .unwrap()
            .checked_add(&LinExpr::constant(-3))
            .unwrap();
        let ineq = Inequality(e).normalized();

        assert_eq!(ineq.0.constant, -1);
    }

    #[test]
    fn conditional_terms_split_into_cases() {
        let m = Expr::ite(Expr::slt(x(), Expr::int(0)), Expr::neg(x()), x());
        let cases = dnf(&Expr::sle(Expr::int(0), m), false).unwrap();

        assert_eq!(cases.len(), 2);
    }

    #[test]
    fn nonlinear_terms_are_rejected() {
        assert!(dnf(&Expr::eq(Expr::mul(x(), x()), Expr::int(4)), true).is_none());
    }
}
