use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CegisError;
use crate::expr::{arg_name, Application, Expr, Interpretation, Sort, Value, Variable, MAX_BV_WIDTH};
use crate::simplify::simplify;

/// Mathematical signature of an unknown function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub domain: Vec<Sort>,
    pub codomain: Sort,
}

impl Signature {
    pub fn new(domain: Vec<Sort>, codomain: Sort) -> Self {
        Self { domain, codomain }
    }

    pub fn arity(&self) -> usize {
        self.domain.len()
    }
}

/// Input of one synthesis attempt.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    pub free_variables: BTreeSet<Variable>,
    /// Domain restrictions, always assumed to hold.
    pub side_conditions: Vec<Expr>,
    pub constraints: Vec<Expr>,
    /// Used by the output generator instead of `constraints` when present.
    pub output_generator_constraints: Vec<Expr>,
    /// Constant hints for the encoding.
    pub literals: BTreeSet<Value>,
    pub functions: BTreeMap<String, Signature>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn free_variable(&mut self, name: &str, sort: Sort) -> Expr {
        let var = Variable::new(name, sort);
        self.free_variables.insert(var.clone());
        Expr::Var(var)
    }

    pub fn declare_function(&mut self, name: &str, domain: Vec<Sort>, codomain: Sort) {
        self.functions
            .insert(name.to_string(), Signature::new(domain, codomain));
    }

    /// Builds an application of a declared function.
    pub fn call(&self, name: &str, args: Vec<Expr>) -> Result<Expr, CegisError> {
        let sig = self
            .functions
            .get(name)
            .ok_or_else(|| CegisError::MalformedProblem(format!("undeclared function `{name}`")))?;

        Ok(Expr::apply(name, args, sig.codomain))
    }

    pub fn add_constraint(&mut self, e: Expr) {
        self.constraints.push(e);
    }

    pub fn add_side_condition(&mut self, e: Expr) {
        self.side_conditions.push(e);
    }

    pub fn add_literal(&mut self, v: Value) {
        self.literals.insert(v);
    }

    /// Constraints the output generator works from.
    pub fn generator_constraints(&self) -> &[Expr] {
        if self.output_generator_constraints.is_empty() {
            &self.constraints
        } else {
            &self.output_generator_constraints
        }
    }

    /// Every application of an unknown function in the specification.
    pub fn applications(&self) -> BTreeSet<Application> {
        let mut out = BTreeSet::new();
        for e in self.side_conditions.iter().chain(&self.constraints) {
            e.collect_applications(&mut out);
        }
        out
    }

    pub fn validate(&self) -> Result<(), CegisError> {
        let malformed = |msg: String| Err(CegisError::MalformedProblem(msg));

        for (name, sig) in &self.functions {
            let widths = sig
                .domain
                .iter()
                .chain(std::iter::once(&sig.codomain))
                .filter_map(|s| match s {
                    Sort::BitVec(w) => Some(*w),
                    _ => None,
                })
                .collect::<BTreeSet<_>>();

            if widths.len() > 1 {
                return malformed(format!("`{name}` mixes bit-vector widths {widths:?}"));
            }
            if widths.iter().any(|w| *w == 0 || *w > MAX_BV_WIDTH) {
                return malformed(format!("`{name}` uses an unsupported bit-vector width"));
            }
            if widths.len() == 1 && sig.domain.iter().chain([&sig.codomain]).any(|s| *s == Sort::Int) {
                return malformed(format!("`{name}` mixes Int and bit-vector sorts"));
            }
        }

        for v in &self.free_variables {
            if matches!(v.sort, Sort::BitVec(w) if w == 0 || w > MAX_BV_WIDTH) {
                return malformed(format!("free variable `{}` has an unsupported width", v.name));
            }
        }

        let all = self
            .side_conditions
            .iter()
            .chain(&self.constraints)
            .chain(&self.output_generator_constraints);

        for e in all {
            if e.sort() != Sort::Bool {
                return malformed(format!("constraint {e} is not Boolean"));
            }

            let mut problem = None;
            e.visit(&mut |node| {
                if problem.is_some() {
                    return;
                }
                match node {
                    Expr::Var(v) if !self.free_variables.contains(v) => {
                        problem = Some(format!("undeclared free variable `{}`", v.name));
                    }
                    Expr::Arg(..) => problem = Some(format!("parameter outside a function body in {e}")),
                    Expr::Apply(app) => match self.functions.get(&app.function) {
                        None => problem = Some(format!("undeclared function `{}`", app.function)),
                        Some(sig) => {
                            let arg_sorts = app.args.iter().map(Expr::sort).collect::<Vec<_>>();
                            if arg_sorts != sig.domain || app.sort != sig.codomain {
                                problem = Some(format!("ill-sorted application {node}"));
                            }
                        }
                    },
                    _ => (),
                }
            });

            if let Some(msg) = problem {
                return malformed(msg);
            }
        }

        for lit in &self.literals {
            if let Value::BitVec { width, .. } = lit {
                if *width == 0 || *width > MAX_BV_WIDTH {
                    return malformed(format!("literal {lit} has an unsupported width"));
                }
            }
        }

        Ok(())
    }
}

/// Closed implementations of the unknown functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    pub functions: BTreeMap<String, Expr>,
    /// Bodies over placeholder variables, kept by neighbourhood search.
    pub symbolic: BTreeMap<String, Expr>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, name: &str, body: Expr) -> Self {
        self.functions.insert(name.to_string(), body);
        self
    }

    /// Every body simplified; the symbolic part is dropped.
    pub fn simplified(&self) -> Solution {
        Solution {
            functions: self
                .functions
                .iter()
                .map(|(name, body)| (name.clone(), simplify(body)))
                .collect(),
            symbolic: BTreeMap::new(),
        }
    }

    /// Substitutes the function bodies into `e`.
    pub fn instantiate(&self, e: &Expr) -> Result<Expr, CegisError> {
        match e {
            Expr::Apply(app) => {
                let body = self.functions.get(&app.function).ok_or_else(|| {
                    CegisError::Eval(format!("solution has no body for `{}`", app.function))
                })?;
                let args = app
                    .args
                    .iter()
                    .map(|a| self.instantiate(a))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(body.substitute_args(&args))
            }
            _ => e.try_map_children(|child| self.instantiate(child)),
        }
    }

    /// Evaluates `function` on concrete arguments.
    pub fn call(&self, function: &str, args: &[Value]) -> Result<Value, CegisError> {
        let body = self
            .functions
            .get(function)
            .ok_or_else(|| CegisError::Eval(format!("solution has no body for `{function}`")))?;

        body.eval(&Arguments(args))
    }
}

struct Arguments<'a>(&'a [Value]);

impl Interpretation for Arguments<'_> {
    fn variable(&self, _var: &Variable) -> Option<Value> {
        None
    }

    fn argument(&self, index: usize) -> Option<Value> {
        self.0.get(index).copied()
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, body) in &self.functions {
            writeln!(f, "{name} -> {body}")?;
        }
        Ok(())
    }
}

/// Free-variable assignment on which a candidate violates the specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counterexample {
    pub assignment: BTreeMap<Variable, Value>,
    /// Observed outputs of the function applications in the specification.
    pub applications: BTreeMap<Application, Value>,
}

impl Counterexample {
    pub fn new(assignment: BTreeMap<Variable, Value>) -> Self {
        Self {
            assignment,
            applications: BTreeMap::new(),
        }
    }

    pub fn same_inputs(&self, other: &Counterexample) -> bool {
        self.assignment == other.assignment
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, value) in &self.assignment {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={value}", var.name)?;
            first = false;
        }
        Ok(())
    }
}

/// Free variables from a counterexample, functions from a candidate.
pub struct CandidateEnv<'a> {
    pub assignment: &'a BTreeMap<Variable, Value>,
    pub solution: &'a Solution,
}

impl Interpretation for CandidateEnv<'_> {
    fn variable(&self, var: &Variable) -> Option<Value> {
        self.assignment.get(var).copied()
    }

    fn apply(&self, function: &str, args: &[Value]) -> Result<Value, CegisError> {
        self.solution.call(function, args)
    }
}

/// Whether `solution` meets the specification on the inputs of `ce`.
/// Inputs outside the side conditions are satisfied vacuously.
pub fn satisfies(problem: &Problem, solution: &Solution, ce: &Counterexample) -> Result<bool, CegisError> {
    let env = CandidateEnv {
        assignment: &ce.assignment,
        solution,
    };

    for sc in &problem.side_conditions {
        if sc.eval(&env)? == Value::Bool(false) {
            return Ok(true);
        }
    }

    for c in &problem.constraints {
        if c.eval(&env)? == Value::Bool(false) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Prints a function body as an SMT-LIB definition.
pub fn define_fun(name: &str, sig: &Signature, body: &Expr) -> String {
    let params = sig
        .domain
        .iter()
        .enumerate()
        .map(|(idx, sort)| format!("({} {sort})", arg_name(idx)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "(define-fun {} ({params}) {} {body})",
        crate::expr::quote_symbol(name),
        sig.codomain
    )
}
