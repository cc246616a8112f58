//! The counterexample-guided synthesis loop.

use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::encoding::{Encoding, EncodingFactory, GrammarOptions, SynthEncoding};
use crate::error::CegisError;
use crate::learn::{EnumerativeLearner, IncrementalLearner, Learner, NeuralConfig, NeuralLearner, ProcessOracle, SolverLearner};
use crate::local::{LocalConfig, LocalSearch};
use crate::oracle::{Backend, Logic};
use crate::problem::{Problem, Solution};
use crate::verify::{FourierMotzkinVerifier, GeneralVerifier, Verification, Verifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnerKind {
    #[default]
    Solver,
    Enumerative,
    Neural,
}

#[derive(Debug, Clone)]
pub struct CegisConfig {
    pub min_program_size: usize,
    pub max_program_size: usize,
    pub max_iterations: Option<usize>,
    pub learner: LearnerKind,
    /// Keep one growing solver session for the solver learner.
    pub incremental_solving: bool,
    pub use_fm: bool,
    /// Talk to an external SMT-LIB2 process instead of the z3 library.
    pub use_smt: bool,
    pub use_simp_solver: bool,
    pub logic: Logic,
    pub enable_bitwise: bool,
    pub enable_division: bool,
    pub enable_multiplication: bool,
    /// Seed the grammar with the problem's literal hints.
    pub use_literals: bool,
    pub use_local_search: bool,
    pub neural: NeuralConfig,
    pub local: LocalConfig,
    pub smt_solver: Vec<String>,
}

impl Default for CegisConfig {
    fn default() -> Self {
        Self {
            min_program_size: 1,
            max_program_size: 5,
            max_iterations: None,
            learner: LearnerKind::default(),
            incremental_solving: false,
            use_fm: false,
            use_smt: false,
            use_simp_solver: false,
            logic: Logic::default(),
            enable_bitwise: false,
            enable_division: false,
            enable_multiplication: true,
            use_literals: false,
            use_local_search: false,
            neural: NeuralConfig::default(),
            local: LocalConfig::default(),
            smt_solver: vec!["z3".to_string(), "-in".to_string(), "-smt2".to_string()],
        }
    }
}

impl CegisConfig {
    /// Resolves conflicting options. Never fails; every adjustment is
    /// logged.
    pub fn normalize(&mut self) {
        if (self.incremental_solving || self.use_simp_solver) && self.use_smt {
            warn!("Incremental or simplifying solving is unavailable with the SMT back end, using SMT only");
            self.incremental_solving = false;
            self.use_simp_solver = false;
        }

        if self.logic.requires_smt() && (!self.use_smt || self.incremental_solving || self.use_simp_solver) {
            warn!("{} requires the SMT back end, switching to it", self.logic);
            self.use_smt = true;
            self.incremental_solving = false;
            self.use_simp_solver = false;
        }

        if self.logic == Logic::LIA && self.enable_multiplication {
            warn!("Multiplication leaves linear arithmetic, disabling it");
            self.enable_multiplication = false;
        }

        if self.min_program_size == 0 {
            warn!("Programs have at least one instruction");
            self.min_program_size = 1;
        }
        if self.max_program_size < self.min_program_size {
            warn!(
                "Maximum program size {} is below the minimum, using {}",
                self.max_program_size, self.min_program_size
            );
            self.max_program_size = self.min_program_size;
        }
    }

    pub fn grammar(&self, problem: &Problem) -> GrammarOptions {
        GrammarOptions {
            enable_bitwise: self.enable_bitwise,
            enable_division: self.enable_division,
            enable_multiplication: self.enable_multiplication,
            literals: if self.use_literals {
                problem.literals.clone()
            } else {
                BTreeSet::new()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Satisfiable(Solution),
    /// No candidate up to the maximum program size.
    Unsatisfiable,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub outcome: Outcome,
    pub iterations: usize,
    pub program_size: usize,
}

pub struct Cegis {
    config: CegisConfig,
}

impl Cegis {
    pub fn new(mut config: CegisConfig) -> Self {
        config.normalize();
        Self { config }
    }

    pub fn config(&self) -> &CegisConfig {
        &self.config
    }

    fn backend<'a>(&'a self, z3: &'a z3::Context) -> Backend<'a> {
        if self.config.use_smt {
            Backend::Smt2 {
                command: &self.config.smt_solver,
                logic: self.config.logic,
            }
        } else {
            Backend::Z3 {
                context: z3,
                logic: self.config.logic,
                simplify: self.config.use_simp_solver,
            }
        }
    }

    /// Picks the learner, verifier and optional local search the
    /// configuration asks for and runs the loop with them.
    pub fn run(&self, problem: &Problem, z3: &z3::Context) -> Result<Report, CegisError> {
        problem.validate()?;

        let backend = self.backend(z3);
        let options = self.config.grammar(problem);
        info!("Using {backend:?}");

        let mut learner: Box<dyn Learner + '_> = match self.config.learner {
            LearnerKind::Solver => {
                let factory: EncodingFactory<'_> = Box::new(move |size| {
                    Box::new(SynthEncoding::new(problem, size, &options)) as Box<dyn Encoding>
                });
                if self.config.incremental_solving {
                    info!("Incremental CEGIS");
                    Box::new(IncrementalLearner::new(problem, backend, factory))
                } else {
                    info!("Non-incremental CEGIS");
                    Box::new(SolverLearner::new(problem, backend, factory))
                }
            }
            LearnerKind::Enumerative => {
                info!("Enumerative CEGIS");
                Box::new(EnumerativeLearner::new(problem, options))
            }
            LearnerKind::Neural => {
                info!("Neural CEGIS");
                let oracle = Box::new(ProcessOracle::new(self.config.neural.command.clone()));
                Box::new(NeuralLearner::new(problem, backend, oracle, self.config.neural.clone())?)
            }
        };

        let mut verifier: Box<dyn Verifier + '_> = if self.config.use_fm {
            Box::new(FourierMotzkinVerifier::new(problem, backend))
        } else {
            Box::new(GeneralVerifier::new(problem, backend))
        };

        let mut local = self
            .config
            .use_local_search
            .then(|| LocalSearch::new(problem, backend, self.config.local));

        self.run_with(problem, &mut *learner, &mut *verifier, local.as_mut())
    }

    /// The loop itself over caller-provided components.
    pub fn run_with(
        &self,
        problem: &Problem,
        learner: &mut dyn Learner,
        verifier: &mut dyn Verifier,
        mut local: Option<&mut LocalSearch<'_>>,
    ) -> Result<Report, CegisError> {
        let mut iteration = 0;
        let mut program_size = self.config.min_program_size;
        let mut previous: Option<Solution> = None;

        info!(
            "Synthesising {} function(s) from {} constraint(s)",
            problem.functions.len(),
            problem.constraints.len()
        );

        loop {
            if let Some(found) = local.as_deref().and_then(LocalSearch::solution) {
                info!("Local search successful after {iteration} iteration(s)");
                return Ok(Report {
                    outcome: Outcome::Satisfiable(found.clone()),
                    iterations: iteration,
                    program_size,
                });
            }

            iteration += 1;
            info!("CEGIS iteration {iteration}");
            let started = Instant::now();

            if let Some(max) = self.config.max_iterations {
                if iteration > max {
                    error!("Iteration limit reached");
                    return Err(CegisError::IterationLimit(max));
                }
            }

            info!("Synthesis phase");
            learner.set_program_size(program_size);

            let candidate = match learner.propose()? {
                Some(candidate) => candidate.simplified(),
                None if program_size < self.config.max_program_size => {
                    program_size += 1;
                    info!("Failed to get candidate; increasing program size to {program_size}");
                    continue;
                }
                None => {
                    error!("Failed to get candidate");
                    return Ok(Report {
                        outcome: Outcome::Unsatisfiable,
                        iterations: iteration,
                        program_size,
                    });
                }
            };

            if previous.as_ref() == Some(&candidate) {
                error!("No progress made");
                return Err(CegisError::NoProgress);
            }
            previous = Some(candidate.clone());

            debug!("Candidate:\n{candidate}");
            debug!("Synthesis time iteration {iteration}: {:?}", started.elapsed());

            info!("Verification phase");
            match verifier.check(&candidate)? {
                Verification::Valid => {
                    info!("Result obtained with {iteration} iteration(s)");
                    debug!("Total time iteration {iteration}: {:?}", started.elapsed());
                    return Ok(Report {
                        outcome: Outcome::Satisfiable(candidate),
                        iterations: iteration,
                        program_size,
                    });
                }
                Verification::Counterexample(ce) => {
                    info!("Verification failed");
                    debug!("Total time iteration {iteration}: {:?}", started.elapsed());

                    if let Some(local) = local.as_deref_mut() {
                        local.add_counterexample(ce.clone());
                        local.push_template(candidate, program_size);
                        local.run(verifier)?;
                    }
                    learner.add_counterexample(ce)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smt_backend_disables_incremental_solving() {
        let mut config = CegisConfig {
            use_smt: true,
            incremental_solving: true,
            use_simp_solver: true,
            ..Default::default()
        };
        config.normalize();

        assert!(config.use_smt);
        assert!(!config.incremental_solving);
        assert!(!config.use_simp_solver);
    }

    #[test]
    fn linear_logic_forces_smt_backend() {
        let mut config = CegisConfig {
            logic: Logic::LIA,
            incremental_solving: true,
            ..Default::default()
        };
        config.normalize();

        assert!(config.use_smt);
        assert!(!config.incremental_solving);
        assert!(!config.enable_multiplication);
    }

    #[test]
    fn size_bounds_are_ordered() {
        let mut config = CegisConfig {
            min_program_size: 4,
            max_program_size: 2,
            ..Default::default()
        };
        config.normalize();

        assert_eq!(config.max_program_size, 4);
    }
}
