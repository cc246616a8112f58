use std::collections::BTreeMap;

use super::Encoding;
use crate::error::CegisError;
use crate::expr::{Application, Expr, Variable};
use crate::oracle::Valuation;
use crate::problem::Solution;

/// Replaces every application by a fresh output variable, so that a model
/// of the encoded specification yields outputs consistent with it.
/// Structurally equal applications share one output.
#[derive(Default)]
pub struct OutputEncoding {
    suffix: String,
    outputs: BTreeMap<Application, Variable>,
}

impl OutputEncoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded applications and the variables standing for their results.
    pub fn outputs(&self) -> &BTreeMap<Application, Variable> {
        &self.outputs
    }
}

impl Encoding for OutputEncoding {
    fn set_suffix(&mut self, suffix: &str) {
        self.suffix = suffix.to_string();
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
                let encoded = Application {
                    function: app.function.clone(),
                    args,
                    sort: app.sort,
                };

                let next = self.outputs.len();
                let out = self
                    .outputs
                    .entry(encoded)
                    .or_insert_with(|| Variable::new(format!("{}::out{next}{}", app.function, self.suffix), app.sort));

                Ok(Expr::Var(out.clone()))
            }
            _ => e.try_map_children(|child| self.encode(child)),
        }
    }

    fn take_constraints(&mut self) -> Vec<Expr> {
        Vec::new()
    }

    /// Output encodings carry no program.
    fn read_solution(&self, _model: &dyn Valuation) -> Result<Solution, CegisError> {
        Ok(Solution::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Sort;

    #[test]
    fn equal_applications_share_an_output() {
        let w = Sort::BitVec(8);
        let (x, y) = (Expr::var("x", w), Expr::var("y", w));
        let m = Expr::apply("max", vec![x.clone(), y.clone()], w);
        let spec = Expr::and(vec![Expr::uge(m.clone(), x), Expr::uge(m, y)]);

        let mut enc = OutputEncoding::new();
        let encoded = enc.encode(&spec).unwrap();

        assert_eq!(enc.outputs().len(), 1);
        assert!(!encoded.has_applications());
    }
}
