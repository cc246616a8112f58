use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, trace};
use num_integer::Integer;
use num_traits::ToPrimitive;

use super::general::GeneralVerifier;
use super::linear::{dnf, Inequality, System};
use super::{counterexample, negated_goal, Verification, Verifier};
use crate::error::CegisError;
use crate::expr::{Sort, Value, Variable};
use crate::oracle::Backend;
use crate::problem::{Problem, Solution};

/// Largest system an elimination step may produce.
const MAX_INEQUALITIES: usize = 1 << 14;

enum Feasibility {
    Infeasible,
    Witness(BTreeMap<Variable, i128>),
    /// Rational-only solution, blow-up or overflow.
    Unknown,
}

/// Decides linear integer specifications by Fourier-Motzkin elimination.
/// Anything else goes to the general verifier.
pub struct FourierMotzkinVerifier<'a> {
    problem: &'a Problem,
    fallback: GeneralVerifier<'a>,
}

impl<'a> FourierMotzkinVerifier<'a> {
    pub fn new(problem: &'a Problem, backend: Backend<'a>) -> Self {
        Self {
            problem,
            fallback: GeneralVerifier::new(problem, backend),
        }
    }

    fn fall_back(&mut self, solution: &Solution, why: &str) -> Result<Verification, CegisError> {
        debug!("Falling back to the general verifier: {why}");
        self.fallback.check(solution)
    }
}

impl Verifier for FourierMotzkinVerifier<'_> {
    fn problem(&self) -> &Problem {
        self.problem
    }

    fn check(&mut self, solution: &Solution) -> Result<Verification, CegisError> {
        if self.problem.free_variables.iter().any(|v| v.sort != Sort::Int) {
            return self.fall_back(solution, "non-integer free variables");
        }

        let goal = negated_goal(self.problem, solution)?;
        let Some(cases) = dnf(&goal, true) else {
            return self.fall_back(solution, "formula is not linear");
        };
        info!("Eliminating over {} linear cases", cases.len());

        for system in cases {
            match solve(system) {
                Feasibility::Infeasible => continue,
                Feasibility::Unknown => return self.fall_back(solution, "no integer witness"),
                Feasibility::Witness(witness) => {
                    let mut assignment = BTreeMap::new();
                    for var in &self.problem.free_variables {
                        let x = witness.get(var).copied().unwrap_or(0);
                        let Some(x) = x.to_i64() else {
                            return self.fall_back(solution, "witness exceeds 64 bits");
                        };
                        assignment.insert(var.clone(), Value::Int(x));
                    }

                    match goal.eval(&assignment) {
                        Ok(Value::Bool(true)) => (),
                        Ok(_) => return self.fall_back(solution, "witness does not refute the candidate"),
                        Err(CegisError::Eval(e)) => return self.fall_back(solution, &e),
                        Err(e) => return Err(e),
                    }

                    let ce = match counterexample(self.problem, solution, assignment) {
                        Err(CegisError::Eval(e)) => return self.fall_back(solution, &e),
                        ce => ce?,
                    };
                    debug!("Counterexample: {ce}");
                    return Ok(Verification::Counterexample(ce));
                }
            }
        }

        Ok(Verification::Valid)
    }
}

/// Drops satisfied constant rows and duplicates; `None` on a violated one.
fn cleanup(system: System) -> Option<System> {
    let mut out = BTreeSet::new();
    for ineq in system {
        match ineq.trivial() {
            Some(true) => (),
            Some(false) => return None,
            None => {
                out.insert(ineq);
            }
        }
    }
    Some(out.into_iter().collect())
}

/// Eliminates `v` by pairing every upper bound with every lower bound.
fn eliminate(system: &System, v: &Variable) -> Option<System> {
    let (mut upper, mut lower, mut rest) = (Vec::new(), Vec::new(), Vec::new());
    for ineq in system {
        match ineq.0.coeff(v) {
            0 => rest.push(ineq.clone()),
            c if c > 0 => upper.push(ineq),
            _ => lower.push(ineq),
        }
    }

    if rest.len() + upper.len() * lower.len() > MAX_INEQUALITIES {
        return None;
    }

    for u in &upper {
        for l in &lower {
            let a = u.0.coeff(v);
            let b = -l.0.coeff(v);
            let combined = u.0.checked_scale(b)?.checked_add(&l.0.checked_scale(a)?)?;
            rest.push(Inequality(combined).normalized());
        }
    }

    Some(rest)
}

fn solve(system: System) -> Feasibility {
    let vars = system
        .iter()
        .flat_map(|ineq| ineq.0.coeffs.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    let mut stages = Vec::with_capacity(vars.len());
    let Some(mut current) = cleanup(system) else {
        return Feasibility::Infeasible;
    };

    for v in &vars {
        trace!("Eliminating {} from {} inequalities", v.name, current.len());
        let Some(next) = eliminate(&current, v) else {
            return Feasibility::Unknown;
        };
        stages.push(current);
        current = match cleanup(next) {
            Some(s) => s,
            None => return Feasibility::Infeasible,
        };
    }

    back_substitute(&vars, &stages)
}

/// Picks each variable, last eliminated first, from the bounds of the system
/// it was eliminated from. Zero is preferred, otherwise the bound closest
/// to it.
fn back_substitute(vars: &[Variable], stages: &[System]) -> Feasibility {
    let mut witness = BTreeMap::new();

    for (v, stage) in vars.iter().zip(stages).rev() {
        let (mut lo, mut hi): (Option<i128>, Option<i128>) = (None, None);

        for ineq in stage {
            let a = ineq.0.coeff(v);
            if a == 0 {
                continue;
            }
            let mut rest = ineq.0.clone();
            rest.coeffs.remove(v);
            let Some((r, neg_r)) = rest.eval(&witness).and_then(|r| Some((r, r.checked_neg()?))) else {
                return Feasibility::Unknown;
            };

            // a·v + r ≤ 0
            if a > 0 {
                let bound = Integer::div_floor(&neg_r, &a);
                hi = Some(hi.map_or(bound, |h| h.min(bound)));
            } else {
                let bound = Integer::div_ceil(&r, &-a);
                lo = Some(lo.map_or(bound, |l| l.max(bound)));
            }
        }

        let x = match (lo, hi) {
            (Some(l), Some(h)) if l > h => return Feasibility::Unknown,
            (Some(l), _) if l > 0 => l,
            (_, Some(h)) if h < 0 => h,
            _ => 0,
        };
        witness.insert(v.clone(), x);
    }

    Feasibility::Witness(witness)
}
