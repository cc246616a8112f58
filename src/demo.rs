//! Built-in demonstration problems.

use crate::error::CegisError;
use crate::expr::{Expr, Sort};
use crate::oracle::Logic;
use crate::problem::Problem;

pub const NAMES: &[&str] = &["max", "inc", "square", "lia-max"];

pub struct Demo {
    pub problem: Problem,
    pub logic: Logic,
}

pub fn by_name(name: &str, width: u32) -> Result<Demo, CegisError> {
    let bv = Sort::BitVec(width);
    let (problem, logic) = match name {
        "max" => (max(bv)?, Logic::BV),
        "inc" => (inc(bv)?, Logic::BV),
        "square" => (square(bv)?, Logic::BV),
        "lia-max" => (max(Sort::Int)?, Logic::LIA),
        _ => {
            return Err(CegisError::Unsupported(format!(
                "unknown demo `{name}`, expected one of {}",
                NAMES.join(", ")
            )))
        }
    };

    Ok(Demo { problem, logic })
}

fn ge(sort: Sort, l: Expr, r: Expr) -> Expr {
    match sort {
        Sort::Int => Expr::sge(l, r),
        _ => Expr::uge(l, r),
    }
}

/// `max(x, y)`: at least both arguments and equal to one of them.
pub fn max(sort: Sort) -> Result<Problem, CegisError> {
    let mut problem = Problem::new();
    let x = problem.free_variable("x", sort);
    let y = problem.free_variable("y", sort);
    problem.declare_function("max", vec![sort, sort], sort);

    let m = problem.call("max", vec![x.clone(), y.clone()])?;
    problem.add_constraint(ge(sort, m.clone(), x.clone()));
    problem.add_constraint(ge(sort, m.clone(), y.clone()));
    problem.add_constraint(Expr::or(vec![Expr::eq(m.clone(), x), Expr::eq(m, y)]));

    Ok(problem)
}

/// `inc(x) = x + 1`.
pub fn inc(sort: Sort) -> Result<Problem, CegisError> {
    let mut problem = Problem::new();
    let x = problem.free_variable("x", sort);
    problem.declare_function("inc", vec![sort], sort);

    let f = problem.call("inc", vec![x.clone()])?;
    problem.add_constraint(Expr::eq(f, Expr::add(x, Expr::Const(sort.one()))));

    Ok(problem)
}

/// `square(x) = x * x`.
pub fn square(sort: Sort) -> Result<Problem, CegisError> {
    let mut problem = Problem::new();
    let x = problem.free_variable("x", sort);
    problem.declare_function("square", vec![sort], sort);

    let f = problem.call("square", vec![x.clone()])?;
    problem.add_constraint(Expr::eq(f, Expr::mul(x.clone(), x)));

    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_demo_is_well_formed() {
        for name in NAMES {
            let demo = by_name(name, 8).unwrap();
            demo.problem.validate().unwrap();
        }
    }

    #[test]
    fn unknown_demo_is_rejected() {
        assert!(by_name("min", 8).is_err());
    }
}
