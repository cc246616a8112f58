mod common;

use cegis_synth::cegis::{Cegis, CegisConfig, LearnerKind, Outcome};
use cegis_synth::demo;
use cegis_synth::encoding::{Encoding, EncodingFactory, GrammarOptions, SynthEncoding};
use cegis_synth::error::CegisError;
use cegis_synth::expr::{Expr, Sort, Value};
use cegis_synth::learn::{Learner, SolverLearner};
use cegis_synth::local::{LocalConfig, LocalSearch};
use cegis_synth::oracle::{Backend, Logic};
use cegis_synth::problem::{Counterexample, Problem, Solution};
use cegis_synth::verify::{FourierMotzkinVerifier, GeneralVerifier, Verification, Verifier};

use common::{assert_valid, run_tests_with_z3};

const WIDTH: u32 = 8;

fn satisfiable(outcome: Outcome) -> Solution {
    match outcome {
        Outcome::Satisfiable(solution) => solution,
        Outcome::Unsatisfiable => panic!("expected a solution"),
    }
}

#[test]
fn test_max_is_synthesised() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig::default());

        let report = cegis.run(&problem, &z3).unwrap();
        let solution = satisfiable(report.outcome);

        assert_eq!(report.program_size, 2);
        assert_eq!(
            solution.call("max", &[Value::bv(3, WIDTH), Value::bv(200, WIDTH)]).unwrap(),
            Value::bv(200, WIDTH)
        );
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_increment_is_synthesised() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig::default());

        let solution = satisfiable(cegis.run(&problem, &z3).unwrap().outcome);

        assert_eq!(
            solution.call("inc", &[Value::bv(255, WIDTH)]).unwrap(),
            Value::bv(0, WIDTH)
        );
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_incremental_solving_is_sound() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig {
            incremental_solving: true,
            ..Default::default()
        });

        let solution = satisfiable(cegis.run(&problem, &z3).unwrap().outcome);
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_simplifying_solver_is_sound() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig {
            use_simp_solver: true,
            ..Default::default()
        });

        let solution = satisfiable(cegis.run(&problem, &z3).unwrap().outcome);
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_enumeration_uses_literals() {
    run_tests_with_z3(|z3| {
        let mut problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        problem.add_literal(Value::bv(1, WIDTH));

        let cegis = Cegis::new(CegisConfig {
            learner: LearnerKind::Enumerative,
            use_literals: true,
            max_program_size: 2,
            ..Default::default()
        });

        let report = cegis.run(&problem, &z3).unwrap();
        assert_eq!(report.program_size, 1);
        assert_valid(&z3, &problem, &satisfiable(report.outcome), Logic::BV);
    });
}

#[test]
fn test_square_without_multiplication_is_unsatisfiable() {
    run_tests_with_z3(|z3| {
        let problem = demo::square(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig {
            enable_multiplication: false,
            max_program_size: 2,
            ..Default::default()
        });

        let report = cegis.run(&problem, &z3).unwrap();
        assert_eq!(report.outcome, Outcome::Unsatisfiable);
        assert_eq!(report.program_size, 2);
    });
}

#[test]
fn test_empty_specification_accepts_first_candidate() {
    run_tests_with_z3(|z3| {
        let mut problem = Problem::new();
        problem.free_variable("x", Sort::BitVec(WIDTH));
        problem.declare_function("f", vec![Sort::BitVec(WIDTH)], Sort::BitVec(WIDTH));

        let report = Cegis::new(CegisConfig::default()).run(&problem, &z3).unwrap();

        assert_eq!(report.iterations, 1);
        assert!(matches!(report.outcome, Outcome::Satisfiable(_)));
    });
}

#[test]
fn test_malformed_problem_is_rejected() {
    run_tests_with_z3(|z3| {
        let mut problem = Problem::new();
        let x = problem.free_variable("x", Sort::BitVec(WIDTH));
        problem.add_constraint(Expr::eq(Expr::apply("g", vec![x.clone()], Sort::BitVec(WIDTH)), x));

        let result = Cegis::new(CegisConfig::default()).run(&problem, &z3);
        assert!(matches!(result, Err(CegisError::MalformedProblem(_))));
    });
}

/// Keeps reporting the first counterexample it ever found.
struct StuckVerifier<'a> {
    inner: GeneralVerifier<'a>,
    first: Option<Counterexample>,
}

impl Verifier for StuckVerifier<'_> {
    fn problem(&self) -> &Problem {
        self.inner.problem()
    }

    fn check(&mut self, solution: &Solution) -> Result<Verification, CegisError> {
        if let Some(ce) = &self.first {
            return Ok(Verification::Counterexample(ce.clone()));
        }
        let result = self.inner.check(solution)?;
        if let Verification::Counterexample(ce) = &result {
            self.first = Some(ce.clone());
        }
        Ok(result)
    }
}

/// Ignores counterexamples altogether.
struct ConstantLearner(Solution);

impl Learner for ConstantLearner {
    fn set_program_size(&mut self, _size: usize) {}

    fn add_counterexample(&mut self, _ce: Counterexample) -> Result<(), CegisError> {
        Ok(())
    }

    fn propose(&mut self) -> Result<Option<Solution>, CegisError> {
        Ok(Some(self.0.clone()))
    }
}

#[test]
fn test_stuck_verifier_reports_no_progress() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let problem = demo::inc(w).unwrap();
        let backend = Backend::z3(&z3, Logic::BV);

        let mut learner = ConstantLearner(Solution::new().with_function("inc", Expr::arg(0, w)));
        let mut verifier = StuckVerifier {
            inner: GeneralVerifier::new(&problem, backend),
            first: None,
        };

        let cegis = Cegis::new(CegisConfig::default());
        let result = cegis.run_with(&problem, &mut learner, &mut verifier, None);

        assert!(matches!(result, Err(CegisError::NoProgress)));
    });
}

#[test]
fn test_stuck_verifier_terminates_with_error() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let problem = demo::max(w).unwrap();
        let backend = Backend::z3(&z3, Logic::BV);
        let options = GrammarOptions {
            enable_multiplication: true,
            ..Default::default()
        };

        let factory: EncodingFactory = Box::new(|size| {
            Box::new(SynthEncoding::new(&problem, size, &options)) as Box<dyn Encoding>
        });
        let mut learner = SolverLearner::new(&problem, backend, factory);
        let mut verifier = StuckVerifier {
            inner: GeneralVerifier::new(&problem, backend),
            first: None,
        };

        let cegis = Cegis::new(CegisConfig {
            max_iterations: Some(50),
            ..Default::default()
        });
        let result = cegis.run_with(&problem, &mut learner, &mut verifier, None);

        assert!(result.is_err());
    });
}

#[test]
fn test_iteration_limit_is_an_error() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::BitVec(WIDTH)).unwrap();
        let cegis = Cegis::new(CegisConfig {
            max_iterations: Some(1),
            ..Default::default()
        });

        let result = cegis.run(&problem, &z3);
        assert!(matches!(result, Err(CegisError::IterationLimit(1))));
    });
}

#[test]
fn test_linear_max_with_elimination() {
    run_tests_with_z3(|z3| {
        let problem = demo::max(Sort::Int).unwrap();
        let backend = Backend::z3(&z3, Logic::LIA);
        let options = GrammarOptions::default();

        let factory: EncodingFactory = Box::new(|size| {
            Box::new(SynthEncoding::new(&problem, size, &options)) as Box<dyn Encoding>
        });
        let mut learner = SolverLearner::new(&problem, backend, factory);
        let mut verifier = FourierMotzkinVerifier::new(&problem, backend);

        let cegis = Cegis::new(CegisConfig::default());
        let report = cegis.run_with(&problem, &mut learner, &mut verifier, None).unwrap();
        let solution = satisfiable(report.outcome);

        assert_eq!(solution.call("max", &[Value::Int(3), Value::Int(7)]).unwrap(), Value::Int(7));
        assert_eq!(solution.call("max", &[Value::Int(-2), Value::Int(-5)]).unwrap(), Value::Int(-2));
        assert_valid(&z3, &problem, &solution, Logic::LIA);
    });
}

/// `f(x) = x + 3`.
fn plus_three() -> Problem {
    let w = Sort::BitVec(WIDTH);
    let mut problem = Problem::new();
    let x = problem.free_variable("x", w);
    problem.declare_function("f", vec![w], w);
    let f = problem.call("f", vec![x.clone()]).unwrap();
    problem.add_constraint(Expr::eq(f, Expr::add(x, Expr::bv(3, WIDTH))));
    problem
}

fn plus_one() -> Solution {
    Solution::new().with_function("f", Expr::add(Expr::arg(0, Sort::BitVec(WIDTH)), Expr::bv(1, WIDTH)))
}

#[test]
fn test_local_search_moves_constant() {
    run_tests_with_z3(|z3| {
        let problem = plus_three();
        let backend = Backend::z3(&z3, Logic::BV);
        let mut verifier = GeneralVerifier::new(&problem, backend);

        let Verification::Counterexample(ce) = verifier.check(&plus_one()).unwrap() else {
            panic!("x + 1 is not x + 3");
        };

        let mut local = LocalSearch::new(&problem, backend, LocalConfig { radius: 2, rounds: 3 });
        local.add_counterexample(ce);
        local.push_template(plus_one(), 1);
        local.run(&mut verifier).unwrap();

        let solution = local.solution().expect("x + 3 is within radius 2 of x + 1").clone();
        assert_eq!(
            solution.call("f", &[Value::bv(5, WIDTH)]).unwrap(),
            Value::bv(8, WIDTH)
        );
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_local_search_outside_radius_finds_nothing() {
    run_tests_with_z3(|z3| {
        let problem = plus_three();
        let backend = Backend::z3(&z3, Logic::BV);
        let mut verifier = GeneralVerifier::new(&problem, backend);

        let Verification::Counterexample(ce) = verifier.check(&plus_one()).unwrap() else {
            panic!("x + 1 is not x + 3");
        };

        let mut local = LocalSearch::new(&problem, backend, LocalConfig { radius: 1, rounds: 3 });
        local.add_counterexample(ce);
        local.push_template(plus_one(), 1);
        local.run(&mut verifier).unwrap();

        assert!(local.solution().is_none());
    });
}

#[test]
fn test_driver_returns_local_search_result() {
    run_tests_with_z3(|z3| {
        let problem = plus_three();
        let backend = Backend::z3(&z3, Logic::BV);

        // Alone this learner would stall on its first candidate.
        let mut learner = ConstantLearner(plus_one());
        let mut verifier = GeneralVerifier::new(&problem, backend);
        let mut local = LocalSearch::new(&problem, backend, LocalConfig::default());

        let cegis = Cegis::new(CegisConfig {
            use_local_search: true,
            ..Default::default()
        });
        let report = cegis
            .run_with(&problem, &mut learner, &mut verifier, Some(&mut local))
            .unwrap();

        assert_eq!(report.iterations, 1);
        assert_valid(&z3, &problem, &satisfiable(report.outcome), Logic::BV);
    });
}
