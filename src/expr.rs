use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CegisError;

/// Widest bit-vector the engine handles. Values are carried in a `u64`.
pub const MAX_BV_WIDTH: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Bool,
    BitVec(u32),
    Int,
}

impl Sort {
    pub fn is_numeric(self) -> bool {
        !matches!(self, Sort::Bool)
    }

    pub fn zero(self) -> Value {
        Value::from_i64(0, self)
    }

    pub fn one(self) -> Value {
        Value::from_i64(1, self)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(width) => write!(f, "(_ BitVec {width})"),
            Sort::Int => write!(f, "Int"),
        }
    }
}

pub(crate) fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn to_signed(bits: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    let shift = 64 - width.min(64);

    ((bits << shift) as i64) >> shift
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Bool(bool),
    BitVec { bits: u64, width: u32 },
    Int(i64),
}

impl Value {
    pub fn bv(bits: u64, width: u32) -> Self {
        Value::BitVec {
            bits: bits & mask(width),
            width,
        }
    }

    /// Builds a value of the given sort, wrapping into bit-vector range.
    pub fn from_i64(v: i64, sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(v != 0),
            Sort::BitVec(width) => Value::bv(v as u64, width),
            Sort::Int => Value::Int(v),
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::BitVec { width, .. } => Sort::BitVec(*width),
            Value::Int(_) => Sort::Int,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Signed reading of the value (two's complement for bit-vectors).
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Bool(b) => *b as i64,
            Value::BitVec { bits, width } => to_signed(*bits, *width),
            Value::Int(i) => *i,
        }
    }

    /// Unsigned reading of the value.
    pub fn as_u64(&self) -> u64 {
        match self {
            Value::Bool(b) => *b as u64,
            Value::BitVec { bits, .. } => *bits,
            Value::Int(i) => *i as u64,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !*b,
            _ => self.as_u64() == 0,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => self.as_u64() == 1,
        }
    }

    /// Converts a numeric value into another numeric sort. Bit-vectors are
    /// read as signed when widened into `Int`.
    pub fn cast(self, sort: Sort) -> Value {
        Value::from_i64(self.as_i64(), sort)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::BitVec { bits, width } if width % 4 == 0 => {
                write!(f, "#x{:0w$x}", bits, w = (*width / 4) as usize)
            }
            Value::BitVec { bits, width } => {
                write!(f, "#b{:0w$b}", bits, w = *width as usize)
            }
            Value::Int(i) if *i < 0 => write!(f, "(- {})", i.unsigned_abs()),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    pub name: String,
    pub sort: Sort,
}

impl Variable {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

/// One application of an unknown function inside a specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Application {
    pub function: String,
    pub args: Vec<Expr>,
    pub sort: Sort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnopKind {
    Not,
    BvNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ult,
    Ule,
    Slt,
    Sle,
    Implies,
}

impl BinopKind {
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinopKind::Eq
                | BinopKind::Ult
                | BinopKind::Ule
                | BinopKind::Slt
                | BinopKind::Sle
                | BinopKind::Implies
        )
    }

    fn smt_name(self, operand: Sort) -> &'static str {
        let int = operand == Sort::Int;
        match self {
            BinopKind::Add if int => "+",
            BinopKind::Add => "bvadd",
            BinopKind::Sub if int => "-",
            BinopKind::Sub => "bvsub",
            BinopKind::Mul if int => "*",
            BinopKind::Mul => "bvmul",
            BinopKind::UDiv | BinopKind::SDiv if int => "div",
            BinopKind::UDiv => "bvudiv",
            BinopKind::SDiv => "bvsdiv",
            BinopKind::URem | BinopKind::SRem if int => "mod",
            BinopKind::URem => "bvurem",
            BinopKind::SRem => "bvsrem",
            BinopKind::BitAnd => "bvand",
            BinopKind::BitOr => "bvor",
            BinopKind::BitXor => "bvxor",
            BinopKind::Shl => "bvshl",
            BinopKind::LShr => "bvlshr",
            BinopKind::AShr => "bvashr",
            BinopKind::Eq => "=",
            BinopKind::Ult | BinopKind::Slt if int => "<",
            BinopKind::Ule | BinopKind::Sle if int => "<=",
            BinopKind::Ult => "bvult",
            BinopKind::Ule => "bvule",
            BinopKind::Slt => "bvslt",
            BinopKind::Sle => "bvsle",
            BinopKind::Implies => "=>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Const(Value),
    Var(Variable),
    /// Parameter of a function body.
    Arg(usize, Sort),
    Apply(Application),
    Unop(UnopKind, Box<Expr>),
    Binop(BinopKind, Box<(Expr, Expr)>),
    Ite(Box<(Expr, Expr, Expr)>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Concrete meaning of the leaves of an expression.
pub trait Interpretation {
    fn variable(&self, var: &Variable) -> Option<Value>;

    fn argument(&self, _index: usize) -> Option<Value> {
        None
    }

    fn apply(&self, function: &str, _args: &[Value]) -> Result<Value, CegisError> {
        Err(CegisError::Eval(format!("no interpretation for `{function}`")))
    }
}

impl Interpretation for () {
    fn variable(&self, _var: &Variable) -> Option<Value> {
        None
    }
}

impl Interpretation for BTreeMap<Variable, Value> {
    fn variable(&self, var: &Variable) -> Option<Value> {
        self.get(var).copied()
    }
}

impl Expr {
    pub fn bool(b: bool) -> Self {
        Expr::Const(Value::Bool(b))
    }

    pub fn bv(bits: u64, width: u32) -> Self {
        Expr::Const(Value::bv(bits, width))
    }

    pub fn int(v: i64) -> Self {
        Expr::Const(Value::Int(v))
    }

    pub fn var(name: impl Into<String>, sort: Sort) -> Self {
        Expr::Var(Variable::new(name, sort))
    }

    pub fn arg(index: usize, sort: Sort) -> Self {
        Expr::Arg(index, sort)
    }

    pub fn apply(function: impl Into<String>, args: Vec<Expr>, sort: Sort) -> Self {
        Expr::Apply(Application {
            function: function.into(),
            args,
            sort,
        })
    }

    pub fn binop(kind: BinopKind, l: Expr, r: Expr) -> Self {
        Expr::Binop(kind, Box::new((l, r)))
    }

    pub fn ite(c: Expr, t: Expr, e: Expr) -> Self {
        Expr::Ite(Box::new((c, t, e)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(e: Expr) -> Self {
        Expr::Unop(UnopKind::Not, Box::new(e))
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Unop(UnopKind::Neg, Box::new(e))
    }

    pub fn bvnot(e: Expr) -> Self {
        Expr::Unop(UnopKind::BvNot, Box::new(e))
    }

    pub fn eq(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Eq, l, r)
    }

    pub fn implies(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Implies, l, r)
    }

    pub fn and(conjuncts: Vec<Expr>) -> Self {
        Expr::And(conjuncts)
    }

    pub fn or(disjuncts: Vec<Expr>) -> Self {
        Expr::Or(disjuncts)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Add, l, r)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Sub, l, r)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Mul, l, r)
    }

    pub fn ult(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Ult, l, r)
    }

    pub fn ule(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Ule, l, r)
    }

    pub fn uge(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Ule, r, l)
    }

    pub fn slt(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Slt, l, r)
    }

    pub fn sle(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Sle, l, r)
    }

    pub fn sge(l: Expr, r: Expr) -> Self {
        Expr::binop(BinopKind::Sle, r, l)
    }

    pub fn sort(&self) -> Sort {
        match self {
            Expr::Const(v) => v.sort(),
            Expr::Var(v) => v.sort,
            Expr::Arg(_, sort) => *sort,
            Expr::Apply(app) => app.sort,
            Expr::Unop(UnopKind::Not, _) => Sort::Bool,
            Expr::Unop(_, e) => e.sort(),
            Expr::Binop(kind, _) if kind.is_predicate() => Sort::Bool,
            Expr::Binop(_, lr) => lr.0.sort(),
            Expr::Ite(cte) => cte.1.sort(),
            Expr::And(_) | Expr::Or(_) => Sort::Bool,
        }
    }

    pub fn as_const(&self) -> Option<Value> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Preorder traversal.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Expr::Const(_) | Expr::Var(_) | Expr::Arg(..) => (),
            Expr::Apply(app) => app.args.iter().for_each(|a| a.visit(f)),
            Expr::Unop(_, e) => e.visit(f),
            Expr::Binop(_, lr) => {
                lr.0.visit(f);
                lr.1.visit(f);
            }
            Expr::Ite(cte) => {
                cte.0.visit(f);
                cte.1.visit(f);
                cte.2.visit(f);
            }
            Expr::And(es) | Expr::Or(es) => es.iter().for_each(|e| e.visit(f)),
        }
    }

    /// Rebuilds this node with every direct child passed through `f`.
    pub fn try_map_children<F>(&self, mut f: F) -> Result<Expr, CegisError>
    where
        F: FnMut(&Expr) -> Result<Expr, CegisError>,
    {
        Ok(match self {
            Expr::Const(_) | Expr::Var(_) | Expr::Arg(..) => self.clone(),
            Expr::Apply(app) => Expr::Apply(Application {
                function: app.function.clone(),
                args: app.args.iter().map(&mut f).collect::<Result<_, _>>()?,
                sort: app.sort,
            }),
            Expr::Unop(kind, e) => Expr::Unop(*kind, Box::new(f(e)?)),
            Expr::Binop(kind, lr) => Expr::binop(*kind, f(&lr.0)?, f(&lr.1)?),
            Expr::Ite(cte) => Expr::ite(f(&cte.0)?, f(&cte.1)?, f(&cte.2)?),
            Expr::And(es) => Expr::And(es.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Or(es) => Expr::Or(es.iter().map(&mut f).collect::<Result<_, _>>()?),
        })
    }

    /// Top-down rewrite: `f` may replace a node, otherwise its children are
    /// rewritten.
    pub fn rewrite<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(&Expr) -> Option<Expr>,
    {
        if let Some(replacement) = f(self) {
            return replacement;
        }

        self.map_children(|child| child.rewrite(f))
    }

    pub fn map_children<F>(&self, mut f: F) -> Expr
    where
        F: FnMut(&Expr) -> Expr,
    {
        match self.try_map_children(|child| Ok(f(child))) {
            Ok(e) => e,
            Err(_) => unreachable!("mapping closure is infallible"),
        }
    }

    /// Replaces function parameters by the given actual arguments.
    pub fn substitute_args(&self, args: &[Expr]) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Arg(idx, _) => args.get(*idx).cloned(),
            _ => None,
        })
    }

    /// Appends `suffix` to every free variable name.
    pub fn rename_vars(&self, suffix: &str) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Var(v) => Some(Expr::Var(Variable::new(format!("{}{suffix}", v.name), v.sort))),
            _ => None,
        })
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Variable>) {
        self.visit(&mut |e| {
            if let Expr::Var(v) = e {
                out.insert(v.clone());
            }
        });
    }

    pub fn collect_applications(&self, out: &mut BTreeSet<Application>) {
        self.visit(&mut |e| {
            if let Expr::Apply(app) = e {
                out.insert(app.clone());
            }
        });
    }

    pub fn has_applications(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Apply(_)));
        found
    }

    pub fn eval(&self, interp: &dyn Interpretation) -> Result<Value, CegisError> {
        match self {
            Expr::Const(v) => Ok(*v),
            Expr::Var(v) => interp
                .variable(v)
                .ok_or_else(|| CegisError::Eval(format!("unbound variable `{}`", v.name))),
            Expr::Arg(idx, _) => interp
                .argument(*idx)
                .ok_or_else(|| CegisError::Eval(format!("unbound parameter {idx}"))),
            Expr::Apply(app) => {
                let args = app
                    .args
                    .iter()
                    .map(|a| a.eval(interp))
                    .collect::<Result<Vec<_>, _>>()?;
                interp.apply(&app.function, &args)
            }
            Expr::Unop(kind, e) => eval_unop(*kind, e.eval(interp)?),
            Expr::Binop(BinopKind::Implies, lr) => {
                if !expect_bool(lr.0.eval(interp)?)? {
                    return Ok(Value::Bool(true));
                }
                lr.1.eval(interp)
            }
            Expr::Binop(kind, lr) => eval_binop(*kind, lr.0.eval(interp)?, lr.1.eval(interp)?),
            Expr::Ite(cte) => {
                if expect_bool(cte.0.eval(interp)?)? {
                    cte.1.eval(interp)
                } else {
                    cte.2.eval(interp)
                }
            }
            Expr::And(es) => {
                for e in es {
                    if !expect_bool(e.eval(interp)?)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(es) => {
                for e in es {
                    if expect_bool(e.eval(interp)?)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        }
    }

    /// Evaluates a closed expression.
    pub fn eval_closed(&self) -> Result<Value, CegisError> {
        self.eval(&())
    }

    pub fn is_closed(&self) -> bool {
        let mut closed = true;
        self.visit(&mut |e| {
            closed &= !matches!(e, Expr::Var(_) | Expr::Arg(..) | Expr::Apply(_))
        });
        closed
    }
}

fn expect_bool(v: Value) -> Result<bool, CegisError> {
    v.as_bool()
        .ok_or_else(|| CegisError::Eval(format!("expected Bool, got {v}")))
}

fn eval_unop(kind: UnopKind, v: Value) -> Result<Value, CegisError> {
    match (kind, v) {
        (UnopKind::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnopKind::BvNot, Value::BitVec { bits, width }) => Ok(Value::bv(!bits, width)),
        (UnopKind::Neg, Value::BitVec { bits, width }) => Ok(Value::bv(bits.wrapping_neg(), width)),
        (UnopKind::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow(kind, &[v])),
        _ => Err(CegisError::Eval(format!("{kind:?} is not defined on {v}"))),
    }
}

fn eval_binop(kind: BinopKind, l: Value, r: Value) -> Result<Value, CegisError> {
    match (l, r) {
        (Value::BitVec { bits: a, width }, Value::BitVec { bits: b, width: w2 }) if width == w2 => {
            eval_bv_binop(kind, a, b, width)
        }
        (Value::Int(a), Value::Int(b)) => eval_int_binop(kind, a, b),
        (Value::Bool(a), Value::Bool(b)) => match kind {
            BinopKind::Eq => Ok(Value::Bool(a == b)),
            BinopKind::Implies => Ok(Value::Bool(!a || b)),
            _ => Err(CegisError::Eval(format!("{kind:?} is not defined on Bool"))),
        },
        _ => Err(CegisError::Eval(format!("sort mismatch in {kind:?}: {l} and {r}"))),
    }
}

fn eval_bv_binop(kind: BinopKind, a: u64, b: u64, width: u32) -> Result<Value, CegisError> {
    let sa = to_signed(a, width);
    let sb = to_signed(b, width);
    let bits = match kind {
        BinopKind::Add => a.wrapping_add(b),
        BinopKind::Sub => a.wrapping_sub(b),
        BinopKind::Mul => a.wrapping_mul(b),
        BinopKind::UDiv if b == 0 => mask(width),
        BinopKind::UDiv => a / b,
        BinopKind::URem if b == 0 => a,
        BinopKind::URem => a % b,
        BinopKind::SDiv if sb == 0 => {
            if sa < 0 {
                1
            } else {
                mask(width)
            }
        }
        BinopKind::SDiv => sa.wrapping_div(sb) as u64,
        BinopKind::SRem if sb == 0 => a,
        BinopKind::SRem => sa.wrapping_rem(sb) as u64,
        BinopKind::BitAnd => a & b,
        BinopKind::BitOr => a | b,
        BinopKind::BitXor => a ^ b,
        BinopKind::Shl if b >= width as u64 => 0,
        BinopKind::Shl => a << b,
        BinopKind::LShr if b >= width as u64 => 0,
        BinopKind::LShr => a >> b,
        BinopKind::AShr if b >= width as u64 => {
            if sa < 0 {
                mask(width)
            } else {
                0
            }
        }
        BinopKind::AShr => (sa >> b) as u64,
        BinopKind::Eq => return Ok(Value::Bool(a == b)),
        BinopKind::Ult => return Ok(Value::Bool(a < b)),
        BinopKind::Ule => return Ok(Value::Bool(a <= b)),
        BinopKind::Slt => return Ok(Value::Bool(sa < sb)),
        BinopKind::Sle => return Ok(Value::Bool(sa <= sb)),
        BinopKind::Implies => {
            return Err(CegisError::Eval("=> is not defined on bit-vectors".into()))
        }
    };

    Ok(Value::bv(bits, width))
}

/// `Int` is unbounded; results outside `i64` are reported, never wrapped.
fn eval_int_binop(kind: BinopKind, a: i64, b: i64) -> Result<Value, CegisError> {
    let v = match kind {
        BinopKind::Add => a.checked_add(b),
        BinopKind::Sub => a.checked_sub(b),
        BinopKind::Mul => a.checked_mul(b),
        // Division by zero is unspecified in SMT-LIB; pick a fixed value.
        BinopKind::UDiv | BinopKind::SDiv if b == 0 => Some(0),
        BinopKind::UDiv | BinopKind::SDiv => a.checked_div_euclid(b),
        BinopKind::URem | BinopKind::SRem if b == 0 => Some(a),
        BinopKind::URem | BinopKind::SRem => a.checked_rem_euclid(b),
        BinopKind::Eq => return Ok(Value::Bool(a == b)),
        BinopKind::Ult | BinopKind::Slt => return Ok(Value::Bool(a < b)),
        BinopKind::Ule | BinopKind::Sle => return Ok(Value::Bool(a <= b)),
        _ => return Err(CegisError::Eval(format!("{kind:?} is not defined on Int"))),
    };

    v.map(Value::Int)
        .ok_or_else(|| overflow(kind, &[Value::Int(a), Value::Int(b)]))
}

fn overflow(kind: impl fmt::Debug, operands: &[Value]) -> CegisError {
    let operands = operands.iter().map(Value::to_string).collect::<Vec<_>>();
    CegisError::Eval(format!("{kind:?} overflows 64 bits on {}", operands.join(", ")))
}

/// Quotes a symbol when it is not a valid SMT-LIB simple symbol.
pub fn quote_symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));

    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

/// Name under which parameter `idx` is printed in function bodies.
pub fn arg_name(idx: usize) -> String {
    format!("a{idx}")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Var(v) => write!(f, "{}", quote_symbol(&v.name)),
            Expr::Arg(idx, _) => write!(f, "{}", arg_name(*idx)),
            Expr::Apply(app) if app.args.is_empty() => {
                write!(f, "{}", quote_symbol(&app.function))
            }
            Expr::Apply(app) => {
                write!(f, "({}", quote_symbol(&app.function))?;
                for a in &app.args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            Expr::Unop(UnopKind::Not, e) => write!(f, "(not {e})"),
            Expr::Unop(UnopKind::BvNot, e) => write!(f, "(bvnot {e})"),
            Expr::Unop(UnopKind::Neg, e) if e.sort() == Sort::Int => write!(f, "(- {e})"),
            Expr::Unop(UnopKind::Neg, e) => write!(f, "(bvneg {e})"),
            Expr::Binop(kind, lr) => {
                write!(f, "({} {} {})", kind.smt_name(lr.0.sort()), lr.0, lr.1)
            }
            Expr::Ite(cte) => write!(f, "(ite {} {} {})", cte.0, cte.1, cte.2),
            Expr::And(es) | Expr::Or(es) if es.len() == 1 => write!(f, "{}", es[0]),
            Expr::And(es) if es.is_empty() => write!(f, "true"),
            Expr::Or(es) if es.is_empty() => write!(f, "false"),
            Expr::And(es) | Expr::Or(es) => {
                let op = if matches!(self, Expr::And(_)) { "and" } else { "or" };
                write!(f, "({op}")?;
                for e in es {
                    write!(f, " {e}")?;
                }
                write!(f, ")")
            }
        }
    }
}
