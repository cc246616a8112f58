use cegis_synth::problem::{Problem, Solution};
use cegis_synth::verify::{GeneralVerifier, Verification, Verifier};
use cegis_synth::oracle::{Backend, Logic};

pub fn run_tests_with_z3<F>(f: F)
where
    F: FnOnce(z3::Context),
{
    let _ = colog::default_builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();

    let cfg = z3::Config::default();
    let ctx = z3::Context::new(&cfg);

    f(ctx)
}

/// Re-checks a returned solution from scratch.
#[allow(dead_code)]
pub fn assert_valid(z3: &z3::Context, problem: &Problem, solution: &Solution, logic: Logic) {
    let mut verifier = GeneralVerifier::new(problem, Backend::z3(z3, logic));
    assert_eq!(verifier.check(solution).unwrap(), Verification::Valid, "{solution}");
}
