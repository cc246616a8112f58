mod common;

use cegis_synth::demo;
use cegis_synth::expr::{Expr, Sort, Value, Variable};
use cegis_synth::oracle::{Backend, Logic};
use cegis_synth::problem::{satisfies, Solution};
use cegis_synth::verify::{count_satisfied, FourierMotzkinVerifier, GeneralVerifier, Verification, Verifier};

use common::run_tests_with_z3;

fn int_max() -> Expr {
    let (a, b) = (Expr::arg(0, Sort::Int), Expr::arg(1, Sort::Int));
    Expr::ite(Expr::slt(a.clone(), b.clone()), b, a)
}

#[test]
fn test_general_verifier_accepts_max() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(16);
        let problem = demo::max(w).unwrap();
        let (a, b) = (Expr::arg(0, w), Expr::arg(1, w));
        let solution = Solution::new().with_function("max", Expr::ite(Expr::ult(a.clone(), b.clone()), b, a));

        let mut verifier = GeneralVerifier::new(&problem, Backend::z3(&z3, Logic::BV));
        assert_eq!(verifier.check(&solution).unwrap(), Verification::Valid);
    });
}

#[test]
fn test_general_verifier_refutes_projection() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(16);
        let problem = demo::max(w).unwrap();
        let solution = Solution::new().with_function("max", Expr::arg(0, w));

        let mut verifier = GeneralVerifier::new(&problem, Backend::z3(&z3, Logic::BV));
        let Verification::Counterexample(ce) = verifier.check(&solution).unwrap() else {
            panic!("projection is not max");
        };

        let x = ce.assignment[&Variable::new("x", w)];
        let y = ce.assignment[&Variable::new("y", w)];
        assert!(x.as_u64() < y.as_u64());
        assert!(!satisfies(&problem, &solution, &ce).unwrap());
        assert_eq!(ce.applications.len(), 1);
        assert_eq!(ce.applications.values().next(), Some(&x));
    });
}

#[test]
fn test_side_conditions_restrict_counterexamples() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(16);
        let mut problem = demo::max(w).unwrap();
        let (x, y) = (Expr::var("x", w), Expr::var("y", w));
        problem.add_side_condition(Expr::uge(x, y));

        let solution = Solution::new().with_function("max", Expr::arg(0, w));
        let mut verifier = GeneralVerifier::new(&problem, Backend::z3(&z3, Logic::BV));

        assert_eq!(verifier.check(&solution).unwrap(), Verification::Valid);
    });
}

#[test]
fn test_elimination_accepts_linear_max() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::Int).unwrap();
        let solution = Solution::new().with_function("max", int_max());

        let mut verifier = FourierMotzkinVerifier::new(&problem, Backend::z3(&z3, Logic::LIA));
        assert_eq!(verifier.check(&solution).unwrap(), Verification::Valid);
    });
}

#[test]
fn test_elimination_finds_integer_counterexample() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::Int).unwrap();
        let solution = Solution::new().with_function("max", Expr::add(Expr::arg(0, Sort::Int), Expr::int(1)));

        let mut verifier = FourierMotzkinVerifier::new(&problem, Backend::z3(&z3, Logic::LIA));
        let Verification::Counterexample(ce) = verifier.check(&solution).unwrap() else {
            panic!("x + 1 is not max");
        };

        assert!(!satisfies(&problem, &solution, &ce).unwrap());
    });
}

#[test]
fn test_elimination_falls_back_on_bit_vectors() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(8);
        let problem = demo::inc(w).unwrap();
        let solution = Solution::new().with_function("inc", Expr::arg(0, w));

        let mut verifier = FourierMotzkinVerifier::new(&problem, Backend::z3(&z3, Logic::BV));
        let Verification::Counterexample(ce) = verifier.check(&solution).unwrap() else {
            panic!("identity is not increment");
        };

        assert!(!satisfies(&problem, &solution, &ce).unwrap());
    });
}

#[test]
fn test_verification_is_repeatable() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::Int).unwrap();
        let solution = Solution::new().with_function("max", Expr::arg(1, Sort::Int));

        let mut verifier = FourierMotzkinVerifier::new(&problem, Backend::z3(&z3, Logic::LIA));
        let first = verifier.check(&solution).unwrap();
        let second = verifier.check(&solution).unwrap();

        assert_eq!(first, second);
    });
}

#[test]
fn test_counting_satisfied_counterexamples() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::Int).unwrap();
        let wrong = Solution::new().with_function("max", Expr::arg(0, Sort::Int));
        let right = Solution::new().with_function("max", int_max());

        let mut verifier = GeneralVerifier::new(&problem, Backend::z3(&z3, Logic::LIA));
        let Verification::Counterexample(ce) = verifier.check(&wrong).unwrap() else {
            panic!("projection is not max");
        };

        let mut agreeing = ce.clone();
        let x = Variable::new("x", Sort::Int);
        let y = Variable::new("y", Sort::Int);
        agreeing.assignment.insert(x, Value::Int(5));
        agreeing.assignment.insert(y, Value::Int(1));
        let ces = vec![ce, agreeing];

        assert_eq!(count_satisfied(&problem, &wrong, &ces).unwrap(), 1);
        assert_eq!(verifier.count_satisfied(&right, &ces).unwrap(), 2);
    });
}
