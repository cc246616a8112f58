use crate::expr::{BinopKind, Expr, UnopKind, Value};

/// Bottom-up constant folding and algebraic clean-up. The result evaluates
/// to the same value as the input under every interpretation.
pub fn simplify(e: &Expr) -> Expr {
    let e = e.map_children(simplify);

    simplify_node(e)
}

fn is_zero(e: &Expr) -> bool {
    e.as_const()
        .map_or(false, |v| v.sort().is_numeric() && v.is_zero())
}

fn is_one(e: &Expr) -> bool {
    e.as_const()
        .map_or(false, |v| v.sort().is_numeric() && v.is_one())
}

fn zero_like(e: &Expr) -> Expr {
    Expr::Const(e.sort().zero())
}

/// Recognises `(ite c 1 0)` and `(ite c 0 1)` words.
fn as_indicator(e: &Expr) -> Option<Expr> {
    match e {
        Expr::Ite(cte) if is_one(&cte.1) && is_zero(&cte.2) => Some(cte.0.clone()),
        Expr::Ite(cte) if is_zero(&cte.1) && is_one(&cte.2) => Some(negate(cte.0.clone())),
        _ => None,
    }
}

fn negate(e: Expr) -> Expr {
    match e {
        Expr::Unop(UnopKind::Not, inner) => *inner,
        Expr::Const(Value::Bool(b)) => Expr::bool(!b),
        other => Expr::not(other),
    }
}

fn simplify_node(e: Expr) -> Expr {
    if !matches!(e, Expr::Const(_)) && e.is_closed() {
        if let Ok(v) = e.eval_closed() {
            return Expr::Const(v);
        }
    }

    match e {
        Expr::Unop(UnopKind::Not, inner) => negate(*inner),
        Expr::Unop(kind, inner) => match *inner {
            Expr::Unop(k2, x) if k2 == kind => *x,
            other => Expr::Unop(kind, Box::new(other)),
        },
        Expr::Binop(kind, lr) => {
            let (l, r) = *lr;
            simplify_binop(kind, l, r)
        }
        Expr::Ite(cte) => {
            let (c, t, f) = *cte;
            match c.as_const() {
                Some(Value::Bool(true)) => t,
                Some(Value::Bool(false)) => f,
                _ if t == f => t,
                _ => match (t.as_const(), f.as_const()) {
                    (Some(Value::Bool(true)), Some(Value::Bool(false))) => c,
                    (Some(Value::Bool(false)), Some(Value::Bool(true))) => negate(c),
                    _ => Expr::ite(c, t, f),
                },
            }
        }
        Expr::And(es) => simplify_junction(es, true),
        Expr::Or(es) => simplify_junction(es, false),
        other => other,
    }
}

/// `is_and` selects between conjunction and disjunction; the absorbing
/// constant is the negation of the neutral one.
fn simplify_junction(es: Vec<Expr>, is_and: bool) -> Expr {
    let mut out: Vec<Expr> = Vec::with_capacity(es.len());
    let mut flat = Vec::with_capacity(es.len());

    for e in es {
        match e {
            Expr::And(inner) if is_and => flat.extend(inner),
            Expr::Or(inner) if !is_and => flat.extend(inner),
            other => flat.push(other),
        }
    }

    for e in flat {
        match e.as_const() {
            Some(Value::Bool(b)) if b == is_and => continue,
            Some(Value::Bool(_)) => return Expr::bool(!is_and),
            _ => (),
        }
        if !out.contains(&e) {
            out.push(e);
        }
    }

    match out.len() {
        0 => Expr::bool(is_and),
        1 => out.pop().unwrap_or_else(|| Expr::bool(is_and)),
        _ if is_and => Expr::And(out),
        _ => Expr::Or(out),
    }
}

fn simplify_binop(kind: BinopKind, l: Expr, r: Expr) -> Expr {
    match kind {
        BinopKind::Add if is_zero(&r) => l,
        BinopKind::Add if is_zero(&l) => r,
        BinopKind::Sub if is_zero(&r) => l,
        BinopKind::Sub if l == r => zero_like(&l),
        BinopKind::Mul if is_one(&r) => l,
        BinopKind::Mul if is_one(&l) => r,
        BinopKind::Mul if is_zero(&l) || is_zero(&r) => zero_like(&l),
        BinopKind::BitAnd if is_zero(&l) || is_zero(&r) => zero_like(&l),
        BinopKind::BitAnd | BinopKind::BitOr if l == r => l,
        BinopKind::BitOr | BinopKind::BitXor if is_zero(&r) => l,
        BinopKind::BitOr | BinopKind::BitXor if is_zero(&l) => r,
        BinopKind::BitXor if l == r => zero_like(&l),
        BinopKind::Shl | BinopKind::LShr | BinopKind::AShr if is_zero(&r) => l,
        BinopKind::Shl | BinopKind::LShr if is_zero(&l) => l,
        BinopKind::UDiv | BinopKind::SDiv if is_one(&r) => l,
        BinopKind::Eq if l == r => Expr::bool(true),
        BinopKind::Ule | BinopKind::Sle if l == r => Expr::bool(true),
        BinopKind::Ult | BinopKind::Slt if l == r => Expr::bool(false),
        BinopKind::Eq => simplify_eq(l, r),
        BinopKind::Implies => match (l.as_const(), r.as_const()) {
            (Some(Value::Bool(false)), _) | (_, Some(Value::Bool(true))) => Expr::bool(true),
            (Some(Value::Bool(true)), _) => r,
            (_, Some(Value::Bool(false))) => negate(l),
            _ => Expr::implies(l, r),
        },
        _ => Expr::binop(kind, l, r),
    }
}

fn simplify_eq(l: Expr, r: Expr) -> Expr {
    // Keep constants on the right.
    let (l, r) = if l.as_const().is_some() && r.as_const().is_none() {
        (r, l)
    } else {
        (l, r)
    };

    match r.as_const() {
        Some(Value::Bool(true)) => return l,
        Some(Value::Bool(false)) => return negate(l),
        _ => (),
    }

    if let Some(c) = as_indicator(&l) {
        if is_zero(&r) {
            return negate(c);
        }
        if is_one(&r) {
            return c;
        }
    }

    Expr::eq(l, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Sort, Variable};
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeMap;

    const W: Sort = Sort::BitVec(8);

    #[derive(Clone, Debug)]
    struct Word(Expr);

    fn gen_word(g: &mut Gen, depth: usize) -> Expr {
        if depth == 0 || u8::arbitrary(g) % 3 == 0 {
            return match u8::arbitrary(g) % 5 {
                0 => Expr::var("x", W),
                1 => Expr::var("y", W),
                2 => Expr::bv(0, 8),
                3 => Expr::bv(1, 8),
                _ => Expr::bv(u8::arbitrary(g) as u64, 8),
            };
        }

        let ops = [
            BinopKind::Add,
            BinopKind::Sub,
            BinopKind::Mul,
            BinopKind::BitAnd,
            BinopKind::BitOr,
            BinopKind::BitXor,
            BinopKind::Shl,
            BinopKind::LShr,
            BinopKind::UDiv,
        ];

        match u8::arbitrary(g) % 4 {
            0 => Expr::bvnot(gen_word(g, depth - 1)),
            1 => {
                let cond = if bool::arbitrary(g) {
                    Expr::ult(gen_word(g, depth - 1), gen_word(g, depth - 1))
                } else {
                    Expr::eq(gen_word(g, depth - 1), gen_word(g, depth - 1))
                };
                Expr::ite(cond, gen_word(g, depth - 1), gen_word(g, depth - 1))
            }
            _ => {
                let op = *g.choose(&ops).unwrap_or(&BinopKind::Add);
                Expr::binop(op, gen_word(g, depth - 1), gen_word(g, depth - 1))
            }
        }
    }

    impl Arbitrary for Word {
        fn arbitrary(g: &mut Gen) -> Self {
            Word(gen_word(g, 4))
        }
    }

    #[quickcheck]
    fn simplification_preserves_value(e: Word, x: u8, y: u8) -> bool {
        let env = BTreeMap::from([
            (Variable::new("x", W), Value::bv(x as u64, 8)),
            (Variable::new("y", W), Value::bv(y as u64, 8)),
        ]);

        e.0.eval(&env).ok() == simplify(&e.0).eval(&env).ok()
    }

    #[test]
    fn indicator_comparison_collapses() {
        let x = Expr::var("x", W);
        let cond = Expr::ult(x.clone(), Expr::bv(3, 8));
        let word = Expr::ite(cond.clone(), Expr::bv(1, 8), Expr::bv(0, 8));
        let e = Expr::not(Expr::eq(word, Expr::bv(0, 8)));

        assert_eq!(simplify(&e), cond);
    }

    #[test]
    fn folds_constants_and_identities() {
        let x = Expr::var("x", W);
        let e = Expr::add(x.clone(), Expr::sub(Expr::bv(3, 8), Expr::bv(3, 8)));

        assert_eq!(simplify(&e), x);
        assert_eq!(
            simplify(&Expr::and(vec![Expr::bool(true), Expr::bool(true)])),
            Expr::bool(true)
        );
    }
}
