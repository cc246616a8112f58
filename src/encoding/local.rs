use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::Encoding;
use crate::error::CegisError;
use crate::expr::{Expr, Value, Variable};
use crate::oracle::Valuation;
use crate::problem::Solution;

/// Candidate replacements for constant `v`: `v - radius ..= v + radius`,
/// `0`, `1`, `-1` and the literal pool.
pub fn neighbourhood(v: Value, radius: u32, literals: &BTreeSet<Value>) -> BTreeSet<Value> {
    let sort = v.sort();
    let mut out = BTreeSet::new();

    if !sort.is_numeric() {
        out.insert(Value::Bool(true));
        out.insert(Value::Bool(false));
        return out;
    }

    let r = i64::from(radius);
    for delta in -r..=r {
        out.insert(Value::from_i64(v.as_i64().wrapping_add(delta), sort));
    }
    for c in [0, 1, -1] {
        out.insert(Value::from_i64(c, sort));
    }
    for lit in literals {
        if lit.sort().is_numeric() {
            out.insert(lit.cast(sort));
        }
    }

    out
}

/// Explores the constant neighbourhood of a template solution. Every
/// numeric constant of the template becomes a placeholder `f::k<i>`.
pub struct LocalEncoding {
    templates: BTreeMap<String, Expr>,
    placeholders: BTreeMap<Variable, Value>,
    suffix: String,
    pending: Vec<Expr>,
}

impl LocalEncoding {
    pub fn new(template: &Solution, radius: u32, literals: &BTreeSet<Value>) -> Self {
        let mut templates = BTreeMap::new();
        let mut placeholders = BTreeMap::new();

        for (name, body) in &template.functions {
            let mut index = 0;
            let symbolic = body.rewrite(&mut |e| match e {
                Expr::Const(v) if v.sort().is_numeric() => {
                    let p = Variable::new(format!("{name}::k{index}"), v.sort());
                    index += 1;
                    placeholders.insert(p.clone(), *v);
                    Some(Expr::Var(p))
                }
                _ => None,
            });
            templates.insert(name.clone(), symbolic);
        }

        let pending = placeholders
            .iter()
            .map(|(p, v)| {
                Expr::or(
                    neighbourhood(*v, radius, literals)
                        .into_iter()
                        .map(|n| Expr::eq(Expr::Var(p.clone()), Expr::Const(n)))
                        .collect(),
                )
            })
            .collect();
        debug!("Local search over {} placeholders", placeholders.len());

        Self {
            templates,
            placeholders,
            suffix: String::new(),
            pending,
        }
    }

    pub fn placeholders(&self) -> impl Iterator<Item = (&Variable, &Value)> {
        self.placeholders.iter()
    }

    fn is_placeholder(&self, v: &Variable) -> bool {
        self.placeholders.contains_key(v)
    }
}

impl Encoding for LocalEncoding {
    fn set_suffix(&mut self, suffix: &str) {
        self.suffix = suffix.to_string();
    }

    fn encode(&mut self, e: &Expr) -> Result<Expr, CegisError> {
        match e {
            Expr::Var(v) if !self.is_placeholder(v) => {
                Ok(Expr::Var(Variable::new(format!("{}{}", v.name, self.suffix), v.sort)))
            }
            Expr::Apply(app) => {
                let args = app
                    .args
                    .iter()
                    .map(|a| self.encode(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let body = self.templates.get(&app.function).ok_or_else(|| {
                    CegisError::MalformedProblem(format!("template has no body for `{}`", app.function))
                })?;

                Ok(body.substitute_args(&args))
            }
            _ => e.try_map_children(|child| self.encode(child)),
        }
    }

    fn take_constraints(&mut self) -> Vec<Expr> {
        std::mem::take(&mut self.pending)
    }

    fn read_solution(&self, model: &dyn Valuation) -> Result<Solution, CegisError> {
        let functions = self
            .templates
            .iter()
            .map(|(name, body)| {
                let concrete = body.rewrite(&mut |e| match e {
                    Expr::Var(p) => self
                        .placeholders
                        .get(p)
                        .map(|original| Expr::Const(model.value_of(p).unwrap_or(*original))),
                    _ => None,
                });
                (name.clone(), concrete)
            })
            .collect();

        Ok(Solution {
            functions,
            symbolic: self.templates.clone(),
        })
    }
}
