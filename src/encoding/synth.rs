use std::collections::BTreeMap;
use std::fmt;

use log::{debug, trace};

use super::{from_word, to_word, word_sort, Encoding, GrammarOptions};
use crate::error::CegisError;
use crate::expr::{arg_name, BinopKind, Expr, Sort, Value, Variable};
use crate::oracle::Valuation;
use crate::problem::{Problem, Signature, Solution};

/// Operation of one instruction slot. Comparisons produce the words 1/0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Binop(BinopKind),
    Neg,
    BvNot,
    /// `o0 != 0 ? o1 : o2`
    Ite,
}

impl Opcode {
    pub fn arity(self) -> usize {
        match self {
            Opcode::Neg | Opcode::BvNot => 1,
            Opcode::Binop(_) => 2,
            Opcode::Ite => 3,
        }
    }

    fn apply(self, o: [Expr; 3], word: Sort) -> Expr {
        let [o0, o1, o2] = o;
        match self {
            Opcode::Neg => Expr::neg(o0),
            Opcode::BvNot => Expr::bvnot(o0),
            Opcode::Binop(kind) if kind.is_predicate() => Expr::ite(
                Expr::binop(kind, o0, o1),
                Expr::Const(word.one()),
                Expr::Const(word.zero()),
            ),
            Opcode::Binop(kind) => Expr::binop(kind, o0, o1),
            Opcode::Ite => Expr::ite(
                Expr::not(Expr::eq(o0, Expr::Const(word.zero()))),
                o1,
                o2,
            ),
        }
    }

    /// Instruction set over `word` under the given switches.
    pub fn instruction_set(word: Sort, options: &GrammarOptions) -> Vec<Opcode> {
        use BinopKind::*;

        let mut ops = vec![Opcode::Binop(Add), Opcode::Binop(Sub), Opcode::Neg];
        if options.enable_multiplication {
            ops.push(Opcode::Binop(Mul));
        }

        if word == Sort::Int {
            if options.enable_division {
                ops.extend([Opcode::Binop(SDiv), Opcode::Binop(SRem)]);
            }
            ops.extend([Opcode::Binop(Slt), Opcode::Binop(Sle)]);
        } else {
            if options.enable_bitwise {
                ops.extend([
                    Opcode::Binop(BitAnd),
                    Opcode::Binop(BitOr),
                    Opcode::Binop(BitXor),
                    Opcode::BvNot,
                    Opcode::Binop(Shl),
                    Opcode::Binop(LShr),
                    Opcode::Binop(AShr),
                ]);
            }
            if options.enable_division {
                ops.extend([
                    Opcode::Binop(UDiv),
                    Opcode::Binop(URem),
                    Opcode::Binop(SDiv),
                ]);
            }
            ops.extend([
                Opcode::Binop(Ult),
                Opcode::Binop(Ule),
                Opcode::Binop(Slt),
                Opcode::Binop(Sle),
            ]);
        }

        ops.extend([Opcode::Binop(Eq), Opcode::Ite]);
        ops
    }
}

/// Source of an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Param(usize),
    Literal(Value),
    Constant(Value),
    /// Result of an earlier instruction.
    Result(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: [Operand; 3],
}

/// Straight-line program read back from a selector assignment. Instruction
/// `k` may only refer to results `0..k`; the last result is the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub signature: Signature,
    pub word: Sort,
    pub instructions: Vec<Instruction>,
}

impl Program {
    fn operand(&self, operand: Operand, results: &[Expr]) -> Expr {
        match operand {
            Operand::Param(idx) => to_word(Expr::arg(idx, self.signature.domain[idx]), self.word),
            Operand::Literal(v) | Operand::Constant(v) => Expr::Const(v),
            Operand::Result(idx) => results
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Expr::Const(self.word.zero())),
        }
    }

    /// Expands the program into one expression tree over the parameters.
    pub fn to_expr(&self) -> Expr {
        let mut results: Vec<Expr> = Vec::with_capacity(self.instructions.len());

        for instr in &self.instructions {
            let operands = instr.operands.map(|o| self.operand(o, &results));
            results.push(instr.opcode.apply(operands, self.word));
        }

        let last = results
            .pop()
            .unwrap_or_else(|| Expr::Const(self.word.zero()));
        from_word(last, self.signature.codomain)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, instr) in self.instructions.iter().enumerate() {
            write!(f, "r{k} = {:?}", instr.opcode)?;
            for o in &instr.operands[..instr.opcode.arity()] {
                match o {
                    Operand::Param(idx) => write!(f, " {}", arg_name(*idx))?,
                    Operand::Literal(v) | Operand::Constant(v) => write!(f, " {v}")?,
                    Operand::Result(idx) => write!(f, " r{idx}")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Selector layout of one unknown function.
#[derive(Debug, Clone)]
struct Grammar {
    name: String,
    signature: Signature,
    word: Sort,
    literals: Vec<Value>,
    opcodes: Vec<Opcode>,
    size: usize,
}

impl Grammar {
    fn new(name: &str, signature: &Signature, size: usize, options: &GrammarOptions) -> Self {
        let word = word_sort(signature);
        let mut literals = Vec::new();
        for lit in &options.literals {
            let v = match lit {
                Value::Bool(b) => Value::from_i64(*b as i64, word),
                _ => lit.cast(word),
            };
            if !literals.contains(&v) {
                literals.push(v);
            }
        }

        Self {
            name: name.to_string(),
            signature: signature.clone(),
            word,
            literals,
            opcodes: Opcode::instruction_set(word, options),
            size: size.max(1),
        }
    }

    fn arity(&self) -> usize {
        self.signature.arity()
    }

    /// Number of operand choices for instruction `k`: parameters, literals,
    /// the slot's own constant, earlier results.
    fn pool_len(&self, k: usize) -> usize {
        self.arity() + self.literals.len() + 1 + k
    }

    fn opcode_selector(&self, k: usize, j: usize) -> Variable {
        Variable::new(format!("{}::i{k}::op{j}", self.name), Sort::Bool)
    }

    fn operand_selector(&self, k: usize, m: usize, p: usize) -> Variable {
        Variable::new(format!("{}::i{k}::o{m}::s{p}", self.name), Sort::Bool)
    }

    fn constant(&self, k: usize) -> Variable {
        Variable::new(format!("{}::i{k}::c", self.name), self.word)
    }

    fn operand_at(&self, k: usize, p: usize, constant: Value) -> Operand {
        let arity = self.arity();
        let lits = self.literals.len();

        if p < arity {
            Operand::Param(p)
        } else if p < arity + lits {
            Operand::Literal(self.literals[p - arity])
        } else if p == arity + lits {
            Operand::Constant(constant)
        } else {
            Operand::Result((p - arity - lits - 1).min(k.saturating_sub(1)))
        }
    }

    /// One-hot groups: per instruction the opcode group and three operand
    /// groups.
    fn selector_groups(&self) -> Vec<Vec<Variable>> {
        let mut groups = Vec::with_capacity(self.size * 4);
        for k in 0..self.size {
            groups.push((0..self.opcodes.len()).map(|j| self.opcode_selector(k, j)).collect());
            for m in 0..3 {
                groups.push((0..self.pool_len(k)).map(|p| self.operand_selector(k, m, p)).collect());
            }
        }
        groups
    }

    /// One choice per selector group with the operands an opcode ignores at
    /// choice 0.
    fn canonical_choices(&self, pick: &mut dyn FnMut(usize) -> usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.size * 4);
        for k in 0..self.size {
            let j = pick(self.opcodes.len());
            let arity = self.opcodes.get(j).map_or(0, |op| op.arity());
            out.push(j);
            for m in 0..3 {
                out.push(if m < arity { pick(self.pool_len(k)) } else { 0 });
            }
        }
        out
    }

    /// Exactly-one constraints per group; operands an opcode ignores are
    /// pinned to choice 0.
    fn structure(&self) -> Vec<Expr> {
        let mut out = Vec::new();

        for group in self.selector_groups() {
            let sel = group.into_iter().map(Expr::Var).collect::<Vec<_>>();
            out.push(Expr::or(sel.clone()));
            for (i, a) in sel.iter().enumerate() {
                for b in &sel[i + 1..] {
                    out.push(Expr::not(Expr::and(vec![a.clone(), b.clone()])));
                }
            }
        }

        for k in 0..self.size {
            for (j, op) in self.opcodes.iter().enumerate() {
                for m in op.arity()..3 {
                    out.push(Expr::implies(
                        Expr::Var(self.opcode_selector(k, j)),
                        Expr::Var(self.operand_selector(k, m, 0)),
                    ));
                }
            }
        }

        out
    }

    fn read(&self, model: &dyn Valuation) -> Program {
        let instructions = (0..self.size)
            .map(|k| {
                let j = first_true(model, (0..self.opcodes.len()).map(|j| self.opcode_selector(k, j)));
                let constant = model
                    .value_of(&self.constant(k))
                    .unwrap_or_else(|| self.word.zero());
                let operands = [0, 1, 2].map(|m| {
                    let p = first_true(model, (0..self.pool_len(k)).map(|p| self.operand_selector(k, m, p)));
                    self.operand_at(k, p, constant)
                });

                Instruction {
                    opcode: self.opcodes[j],
                    operands,
                }
            })
            .collect();

        Program {
            signature: self.signature.clone(),
            word: self.word,
            instructions,
        }
    }
}

/// Index of the selected choice; unassigned groups default to choice 0.
fn first_true(model: &dyn Valuation, mut vars: impl Iterator<Item = Variable>) -> usize {
    vars.position(|v| model.value_of(&v) == Some(Value::Bool(true)))
        .unwrap_or(0)
}

/// Mux over one-hot selectors; the last value is the fall-through.
fn select(selectors: Vec<Expr>, mut values: Vec<Expr>) -> Expr {
    let mut out = match values.pop() {
        Some(last) => last,
        None => return Expr::bool(false),
    };

    for (sel, value) in selectors.into_iter().zip(values).rev() {
        out = Expr::ite(sel, value, out);
    }
    out
}

/// Instruction-grammar encoding: every unknown function becomes a
/// straight-line program of `size` instructions chosen by selector
/// variables shared by all instances.
pub struct SynthEncoding {
    grammars: BTreeMap<String, Grammar>,
    suffix: String,
    instances: usize,
    cache: BTreeMap<(String, Vec<Expr>), Expr>,
    structure: Vec<Expr>,
    pending: Vec<Expr>,
}

impl SynthEncoding {
    pub fn new(problem: &Problem, size: usize, options: &GrammarOptions) -> Self {
        let grammars = problem
            .functions
            .iter()
            .map(|(name, sig)| (name.clone(), Grammar::new(name, sig, size, options)))
            .collect::<BTreeMap<_, _>>();

        let structure = grammars
            .values()
            .flat_map(Grammar::structure)
            .collect::<Vec<_>>();
        debug!(
            "Instruction grammar of size {size}: {} structural constraints",
            structure.len()
        );

        Self {
            grammars,
            suffix: String::new(),
            instances: 0,
            cache: BTreeMap::new(),
            pending: structure.clone(),
            structure,
        }
    }

    /// One-hot selector groups, in a fixed order.
    pub fn selector_groups(&self) -> Vec<Vec<Variable>> {
        self.grammars
            .values()
            .flat_map(Grammar::selector_groups)
            .collect()
    }

    /// Choices, in [`SynthEncoding::selector_groups`] order, that meet the
    /// structural constraints. `pick(n)` returns a choice in `0..n`.
    pub fn canonical_choices(&self, mut pick: impl FnMut(usize) -> usize) -> Vec<usize> {
        self.grammars
            .values()
            .flat_map(|g| g.canonical_choices(&mut pick))
            .collect()
    }

    /// One-hot selector valuation for a choice per group.
    pub fn selection(&self, choices: &[usize]) -> BTreeMap<Variable, Value> {
        let mut model = BTreeMap::new();
        for (group, choice) in self.selector_groups().iter().zip(choices) {
            for (i, v) in group.iter().enumerate() {
                model.insert(v.clone(), Value::Bool(i == *choice));
            }
        }
        model
    }

    /// Constraints every selector assignment must satisfy.
    pub fn structural_constraints(&self) -> &[Expr] {
        &self.structure
    }

    pub fn read_programs(&self, model: &dyn Valuation) -> BTreeMap<String, Program> {
        self.grammars
            .iter()
            .map(|(name, g)| (name.clone(), g.read(model)))
            .collect()
    }

    fn instantiate(&mut self, function: &str, args: Vec<Expr>) -> Result<Expr, CegisError> {
        let key = (function.to_string(), args);
        if let Some(out) = self.cache.get(&key) {
            return Ok(out.clone());
        }

        let g = self
            .grammars
            .get(function)
            .ok_or_else(|| CegisError::MalformedProblem(format!("undeclared function `{function}`")))?;
        let instance = self.instances;
        self.instances += 1;

        let word = g.word;
        let params = key
            .1
            .iter()
            .map(|a| to_word(a.clone(), word))
            .collect::<Vec<_>>();
        let literals = g.literals.iter().map(|v| Expr::Const(*v)).collect::<Vec<_>>();

        let mut results: Vec<Expr> = Vec::with_capacity(g.size);
        let mut constraints = Vec::new();

        for k in 0..g.size {
            let mut pool = params.clone();
            pool.extend(literals.iter().cloned());
            pool.push(Expr::Var(g.constant(k)));
            pool.extend(results.iter().cloned());

            let operands = [0, 1, 2].map(|m| {
                let name = format!("{function}::{instance}::i{k}::o{m}{}", self.suffix);
                Expr::var(name, word)
            });

            for (m, operand) in operands.iter().enumerate() {
                let sel = (0..pool.len())
                    .map(|p| Expr::Var(g.operand_selector(k, m, p)))
                    .collect();
                constraints.push(Expr::eq(operand.clone(), select(sel, pool.clone())));
            }

            let result = Expr::var(format!("{function}::{instance}::r{k}{}", self.suffix), word);
            let sel = (0..g.opcodes.len())
                .map(|j| Expr::Var(g.opcode_selector(k, j)))
                .collect();
            let values = g
                .opcodes
                .iter()
                .map(|op| op.apply(operands.clone(), word))
                .collect();
            constraints.push(Expr::eq(result.clone(), select(sel, values)));

            results.push(result);
        }

        let last = results
            .pop()
            .unwrap_or_else(|| Expr::Const(word.zero()));
        let out = from_word(last, g.signature.codomain);
        trace!("Instance {instance} of `{function}` yields {out}");

        self.pending.extend(constraints);
        self.cache.insert(key, out.clone());

        Ok(out)
    }
}

impl Encoding for SynthEncoding {
    fn set_suffix(&mut self, suffix: &str) {
        self.suffix = suffix.to_string();
        self.cache.clear();
    }

    fn encode(&mut self, e: &Expr) -> Result<Expr, CegisError> {
        match e {
            Expr::Var(v) => Ok(Expr::Var(Variable::new(format!("{}{}", v.name, self.suffix), v.sort))),
            Expr::Apply(app) => {
                let args = app
                    .args
                    .iter()
                    .map(|a| self.encode(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.instantiate(&app.function, args)
            }
            _ => e.try_map_children(|child| self.encode(child)),
        }
    }

    fn take_constraints(&mut self) -> Vec<Expr> {
        std::mem::take(&mut self.pending)
    }

    fn read_solution(&self, model: &dyn Valuation) -> Result<Solution, CegisError> {
        let mut solution = Solution::new();

        for (name, program) in self.read_programs(model) {
            debug!("Program for `{name}`:\n{program}");
            solution.functions.insert(name, program.to_expr());
        }

        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;

    fn increment_problem() -> Problem {
        let mut problem = Problem::new();
        let x = problem.free_variable("x", Sort::BitVec(8));
        problem.declare_function("f", vec![Sort::BitVec(8)], Sort::BitVec(8));
        let fx = problem.call("f", vec![x.clone()]).unwrap();
        problem.add_constraint(Expr::eq(fx, Expr::add(x, Expr::bv(1, 8))));
        problem
    }

    #[test]
    fn reads_back_selected_program() {
        let problem = increment_problem();
        let options = GrammarOptions {
            literals: [Value::bv(1, 8)].into(),
            ..Default::default()
        };
        let enc = SynthEncoding::new(&problem, 1, &options);
        let g = &enc.grammars["f"];

        // r0 = Add a0 #x01
        let add = g
            .opcodes
            .iter()
            .position(|op| *op == Opcode::Binop(BinopKind::Add))
            .unwrap();
        let model = BTreeMap::from([
            (g.opcode_selector(0, add), Value::Bool(true)),
            (g.operand_selector(0, 0, 0), Value::Bool(true)),
            (g.operand_selector(0, 1, 1), Value::Bool(true)),
            (g.operand_selector(0, 2, 0), Value::Bool(true)),
        ]);

        let solution = enc.read_solution(&model).unwrap();
        let out = solution.call("f", &[Value::bv(41, 8)]).unwrap();
        assert_eq!(out, Value::bv(42, 8));
    }

    #[test]
    fn selector_assignment_satisfies_structure() {
        let problem = increment_problem();
        let enc = SynthEncoding::new(&problem, 2, &GrammarOptions::default());

        let mut model = BTreeMap::new();
        for group in enc.selector_groups() {
            for (i, v) in group.into_iter().enumerate() {
                model.insert(v, Value::Bool(i == 0));
            }
        }

        for c in enc.structural_constraints() {
            assert_eq!(c.eval(&model).unwrap(), Value::Bool(true), "{c}");
        }
    }

    #[test]
    fn canonical_choices_are_well_formed() {
        let problem = increment_problem();
        let enc = SynthEncoding::new(&problem, 3, &GrammarOptions::default());
        let groups = enc.selector_groups();

        for seed in 0..16usize {
            let mut next = seed;
            let choices = enc.canonical_choices(|n| {
                next = next.wrapping_mul(31).wrapping_add(7);
                next % n
            });
            assert_eq!(choices.len(), groups.len());

            let model = enc.selection(&choices);
            for c in enc.structural_constraints() {
                assert_eq!(c.eval(&model).unwrap(), Value::Bool(true), "{c}");
            }
        }
    }

    #[test]
    fn encoding_removes_applications() {
        let problem = increment_problem();
        let mut enc = SynthEncoding::new(&problem, 2, &GrammarOptions::default());
        enc.set_suffix("$ce0");

        let encoded = enc.encode(&problem.constraints[0]).unwrap();
        assert!(!encoded.has_applications());
        assert!(encoded.to_string().contains("x$ce0"));

        let constraints = enc.take_constraints();
        assert!(constraints.iter().all(|c| !c.has_applications()));
        assert!(enc.take_constraints().is_empty());
    }
}
