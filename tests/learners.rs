mod common;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use cegis_synth::cegis::{Cegis, CegisConfig, Outcome};
use cegis_synth::demo;
use cegis_synth::encoding::GrammarOptions;
use cegis_synth::error::CegisError;
use cegis_synth::expr::{Expr, Sort, Value, Variable};
use cegis_synth::learn::{
    EnumerativeLearner, Learner, NeuralConfig, NeuralLearner, ProcessOracle, SequenceOracle, SequenceRequest,
};
use cegis_synth::oracle::{Backend, Logic};
use cegis_synth::problem::{Counterexample, Problem};
use cegis_synth::verify::GeneralVerifier;

use common::{assert_valid, run_tests_with_z3};

const WIDTH: u32 = 8;

/// Answers every request with the same beam and records the requests.
struct ScriptedOracle {
    beam: Vec<String>,
    requests: Rc<RefCell<Vec<SequenceRequest>>>,
}

impl SequenceOracle for ScriptedOracle {
    fn generate(&mut self, request: &SequenceRequest) -> Result<Vec<String>, CegisError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.beam.clone())
    }
}

fn scripted(beam: &[&str]) -> (ScriptedOracle, Rc<RefCell<Vec<SequenceRequest>>>) {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let oracle = ScriptedOracle {
        beam: beam.iter().map(|l| l.to_string()).collect(),
        requests: requests.clone(),
    };
    (oracle, requests)
}

/// `p(x) = x <u 10`.
fn below_ten() -> Problem {
    let w = Sort::BitVec(WIDTH);
    let mut problem = Problem::new();
    let x = problem.free_variable("x", w);
    problem.declare_function("p", vec![w], Sort::Bool);
    let p = problem.call("p", vec![x.clone()]).unwrap();
    problem.add_constraint(Expr::eq(p, Expr::ult(x, Expr::bv(10, WIDTH))));
    problem
}

fn input(name: &str, sort: Sort, value: Value) -> Counterexample {
    Counterexample::new(BTreeMap::from([(Variable::new(name, sort), value)]))
}

#[test]
fn test_neural_learner_uses_generated_programs() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        let backend = Backend::z3(&z3, Logic::BV);
        let requests = Rc::new(RefCell::new(Vec::new()));

        let oracle = ScriptedOracle {
            beam: vec![
                "(bvadd a0".to_string(),
                "(bvsub a0 #x01)".to_string(),
                "(define-fun |synth_fun::inc| ((x (_ BitVec 8))) (_ BitVec 8) (bvadd x #x01))".to_string(),
            ],
            requests: requests.clone(),
        };
        let config = NeuralConfig {
            beam_size: 3,
            ..Default::default()
        };
        let mut learner = NeuralLearner::new(&problem, backend, Box::new(oracle), config).unwrap();
        let mut verifier = GeneralVerifier::new(&problem, backend);

        let cegis = Cegis::new(CegisConfig {
            max_iterations: Some(40),
            ..Default::default()
        });
        let report = cegis.run_with(&problem, &mut learner, &mut verifier, None).unwrap();

        let Outcome::Satisfiable(solution) = report.outcome else {
            panic!("expected a solution");
        };
        assert_valid(&z3, &problem, &solution, Logic::BV);

        let requests = requests.borrow();
        assert!(!requests.is_empty());
        assert_eq!(requests[0].function, "inc");
        assert_eq!(requests[0].arity, 1);
        assert!(requests[0].payload.starts_with("[[["));
        assert!(learner.examples().count() >= 5);
    });
}

#[test]
fn test_neural_learner_starts_with_placeholders() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        let backend = Backend::z3(&z3, Logic::BV);
        let oracle = ScriptedOracle {
            beam: vec![],
            requests: Rc::new(RefCell::new(Vec::new())),
        };
        let mut learner = NeuralLearner::new(&problem, backend, Box::new(oracle), NeuralConfig::default()).unwrap();

        let first = learner.propose().unwrap().unwrap();
        let second = learner.propose().unwrap().unwrap();

        assert_eq!(first.call("inc", &[Value::bv(7, WIDTH)]).unwrap(), Value::bv(0, WIDTH));
        assert_eq!(second.call("inc", &[Value::bv(7, WIDTH)]).unwrap(), Value::bv(10, WIDTH));
    });
}

#[test]
fn test_neural_placeholders_alternate_for_predicates() {
    run_tests_with_z3(|z3| {
        let problem = below_ten();
        let (oracle, _) = scripted(&[]);
        let mut learner =
            NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), NeuralConfig::default()).unwrap();

        let outputs = (0..4)
            .map(|_| learner.propose().unwrap().unwrap().call("p", &[Value::bv(0, WIDTH)]).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(
            outputs,
            vec![Value::Bool(false), Value::Bool(true), Value::Bool(false), Value::Bool(true)]
        );
    });
}

#[test]
fn test_neural_placeholders_move_in_one_bit_codomain() {
    run_tests_with_z3(|z3| {
        let bit = Sort::BitVec(1);
        let mut problem = Problem::new();
        problem.free_variable("x", bit);
        problem.declare_function("g", vec![bit], bit);

        let (oracle, _) = scripted(&[]);
        let mut learner =
            NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), NeuralConfig::default()).unwrap();

        let first = learner.propose().unwrap().unwrap().call("g", &[Value::bv(0, 1)]).unwrap();
        let second = learner.propose().unwrap().unwrap().call("g", &[Value::bv(0, 1)]).unwrap();
        assert_ne!(first, second);
    });
}

#[test]
fn test_neural_learner_synthesises_predicate() {
    run_tests_with_z3(|z3| {
        let problem = below_ten();
        let backend = Backend::z3(&z3, Logic::BV);
        let (oracle, _) = scripted(&["(bvult a0 #x0a)"]);

        let mut learner = NeuralLearner::new(&problem, backend, Box::new(oracle), NeuralConfig::default()).unwrap();
        let mut verifier = GeneralVerifier::new(&problem, backend);

        let cegis = Cegis::new(CegisConfig {
            max_iterations: Some(40),
            ..Default::default()
        });
        let report = cegis.run_with(&problem, &mut learner, &mut verifier, None).unwrap();

        let Outcome::Satisfiable(solution) = report.outcome else {
            panic!("expected a solution");
        };
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_neural_learner_drops_ill_sorted_programs() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::BitVec(WIDTH)).unwrap();
        let backend = Backend::z3(&z3, Logic::BV);
        let (oracle, _) = scripted(&["(ite (and a0 a0) a0 a0)", "(bvadd a0 #x01)"]);
        let config = NeuralConfig {
            beam_size: 2,
            ..Default::default()
        };

        let mut learner = NeuralLearner::new(&problem, backend, Box::new(oracle), config).unwrap();
        let mut verifier = GeneralVerifier::new(&problem, backend);

        let cegis = Cegis::new(CegisConfig {
            max_iterations: Some(40),
            ..Default::default()
        });
        let report = cegis.run_with(&problem, &mut learner, &mut verifier, None).unwrap();

        let Outcome::Satisfiable(solution) = report.outcome else {
            panic!("expected a solution");
        };
        assert_valid(&z3, &problem, &solution, Logic::BV);
    });
}

#[test]
fn test_neural_learner_skips_overflowing_programs() {
    run_tests_with_z3(|z3| {
        let problem = demo::inc(Sort::Int).unwrap();
        let (oracle, _) = scripted(&["(* a0 a0)", "(+ a0 1)"]);
        let config = NeuralConfig {
            beam_size: 2,
            ..Default::default()
        };
        let mut learner = NeuralLearner::new(&problem, Backend::z3(&z3, Logic::LIA), Box::new(oracle), config).unwrap();

        for x in [i64::MAX - 1, 1, 2, 3, 4] {
            learner.add_counterexample(input("x", Sort::Int, Value::Int(x))).unwrap();
        }

        let candidate = learner.propose().unwrap().unwrap();
        assert_eq!(candidate.call("inc", &[Value::Int(3)]).unwrap(), Value::Int(4));
    });
}

#[test]
fn test_repeated_counterexample_is_replaced_by_a_sample() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let problem = demo::inc(w).unwrap();
        let (oracle, _) = scripted(&[]);
        let mut learner =
            NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), NeuralConfig::default()).unwrap();

        let ce = input("x", w, Value::bv(3, WIDTH));
        learner.add_counterexample(ce.clone()).unwrap();
        learner.add_counterexample(ce).unwrap();

        let ces = learner.counterexamples();
        assert_eq!(ces.len(), 2);
        assert_ne!(ces[0].assignment, ces[1].assignment);
        assert_eq!(learner.examples().count(), 2);
    });
}

#[test]
fn test_saturated_outputs_trigger_complementary_sample() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let problem = below_ten();
        let (oracle, _) = scripted(&[]);
        let config = NeuralConfig {
            min_num_io: 3,
            num_random_io: 1000,
            ..Default::default()
        };
        let mut learner = NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), config).unwrap();

        for x in [20, 30, 40] {
            learner.add_counterexample(input("x", w, Value::bv(x, WIDTH))).unwrap();
        }
        assert!(learner.examples().all(|e| e.output == Value::Bool(false)));

        learner.add_counterexample(input("x", w, Value::bv(50, WIDTH))).unwrap();

        assert_eq!(learner.counterexamples().len(), 5);
        assert!(learner.examples().any(|e| e.output == Value::Bool(true)));
    });
}

#[test]
fn test_full_satisfiers_are_served_in_order() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let problem = demo::inc(w).unwrap();
        let (oracle, requests) = scripted(&["(bvadd a0 #x01)", "(bvadd #x01 a0)"]);
        let config = NeuralConfig {
            beam_size: 2,
            ..Default::default()
        };
        let mut learner = NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), config).unwrap();

        for x in 1..=5 {
            learner.add_counterexample(input("x", w, Value::bv(x, WIDTH))).unwrap();
        }

        let first = learner.propose().unwrap().unwrap();
        assert_eq!(requests.borrow().len(), 1);
        let second = learner.propose().unwrap().unwrap();
        assert_eq!(requests.borrow().len(), 1);

        let a0 = Expr::arg(0, w);
        assert_eq!(first.functions["inc"], Expr::add(a0.clone(), Expr::bv(1, WIDTH)));
        assert_eq!(second.functions["inc"], Expr::add(Expr::bv(1, WIDTH), a0));
    });
}

#[test]
fn test_neural_learner_needs_a_single_function() {
    run_tests_with_z3(|z3| {
        let w = Sort::BitVec(WIDTH);
        let mut problem = demo::inc(w).unwrap();
        problem.declare_function("dec", vec![w], w);

        let oracle = ProcessOracle::new(vec!["true".to_string()]);
        let result = NeuralLearner::new(&problem, Backend::z3(&z3, Logic::BV), Box::new(oracle), NeuralConfig::default());

        assert!(matches!(result, Err(CegisError::Unsupported(_))));
    });
}

#[test]
fn test_process_oracle_reads_stdout_lines() {
    let mut oracle = ProcessOracle::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        "cat > /dev/null; echo '(bvadd a0 #x01)'; echo '(bvsub a0 #x01)'".to_string(),
    ]);
    let request = SequenceRequest {
        function: "inc".to_string(),
        arity: 1,
        beam_size: 2,
        payload: "[[[0.5]]] [[[0.6]]]\n".to_string(),
    };

    let lines = oracle.generate(&request).unwrap();
    assert_eq!(lines, vec!["(bvadd a0 #x01)", "(bvsub a0 #x01)"]);
}

#[test]
fn test_process_oracle_failure_is_an_error() {
    let mut oracle = ProcessOracle::new(vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()]);
    let request = SequenceRequest {
        function: "inc".to_string(),
        arity: 1,
        beam_size: 1,
        payload: String::new(),
    };

    assert!(matches!(oracle.generate(&request), Err(CegisError::ExternalProcess { .. })));
}

#[test]
fn test_enumeration_is_exhaustive() {
    let w = Sort::BitVec(4);
    let problem = demo::inc(w).unwrap();
    let mut learner = EnumerativeLearner::new(&problem, GrammarOptions::default());
    learner.set_program_size(1);

    let total = learner.number_of_options();
    assert!(total > 0);
    assert!(learner.nth_program(total).is_none());

    let well_formed = (0..total).filter_map(|n| learner.nth_program(n)).count();
    assert!(well_formed > 0);
    assert!((well_formed as u128) < total);
}

#[test]
fn test_enumeration_skips_overflowing_programs() {
    let mut problem = Problem::new();
    let x = problem.free_variable("x", Sort::Int);
    problem.declare_function("f", vec![Sort::Int], Sort::Int);
    let f = problem.call("f", vec![x.clone()]).unwrap();
    problem.add_constraint(Expr::eq(f, x));

    let mut learner = EnumerativeLearner::new(&problem, GrammarOptions::default());
    learner.set_program_size(1);
    learner
        .add_counterexample(input("x", Sort::Int, Value::Int(i64::MAX)))
        .unwrap();

    let candidate = learner.propose().unwrap().unwrap();
    assert_eq!(
        candidate.call("f", &[Value::Int(i64::MAX)]).unwrap(),
        Value::Int(i64::MAX)
    );
}
