use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};

use cegis_synth::cegis::{Cegis, CegisConfig, LearnerKind, Outcome};
use cegis_synth::demo;
use cegis_synth::encoding::GrammarOptions;
use cegis_synth::generate::{GeneratorConfig, ProgramGenerator};
use cegis_synth::learn::NeuralConfig;
use cegis_synth::local::LocalConfig;
use cegis_synth::problem::define_fun;

const EXIT_SATISFIABLE: u8 = 0;
const EXIT_UNSATISFIABLE: u8 = 10;
const EXIT_ERROR: u8 = 6;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliLearner {
    /// Fresh solver query per candidate
    Solver,
    /// One growing solver session
    Incremental,
    /// Index-ordered enumeration of the grammar
    Enumerative,
    /// External sequence generator
    Neural,
}

#[derive(Parser)]
#[command(name = "cegis-synth")]
#[command(about = "Counterexample-guided synthesis of loop-free programs")]
#[command(version)]
struct Args {
    /// Demonstration problem to solve
    #[arg(default_value = "max", value_parser = clap::builder::PossibleValuesParser::new(demo::NAMES))]
    problem: String,
    /// Bit-vector width of the demonstration problem
    #[arg(long, default_value_t = 32)]
    width: u32,
    #[arg(long, value_enum, default_value_t = CliLearner::Solver)]
    learner: CliLearner,
    #[arg(long, default_value_t = 1)]
    min_program_size: usize,
    #[arg(long, default_value_t = 5)]
    max_program_size: usize,
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Verify linear integer problems by Fourier-Motzkin elimination
    #[arg(long)]
    fm: bool,
    /// Use an external SMT-LIB2 solver process
    #[arg(long)]
    smt: bool,
    /// Solver command for --smt
    #[arg(long, num_args = 1.., allow_hyphen_values = true, default_values_t = ["z3".to_string(), "-in".to_string(), "-smt2".to_string()])]
    smt_solver: Vec<String>,
    /// Run the simplifying tactic pipeline before solving
    #[arg(long)]
    simplifying_solver: bool,
    /// Leave bit-wise operations out of the instruction set
    #[arg(long)]
    no_bitwise: bool,
    #[arg(long)]
    enable_division: bool,
    #[arg(long)]
    disable_multiplication: bool,
    #[arg(long)]
    literals: bool,
    /// Try to repair refuted candidates by moving their constants
    #[arg(long)]
    local_search: bool,
    #[arg(long, default_value_t = 2)]
    local_radius: u32,
    /// Generator command for the neural learner
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    neural_command: Option<Vec<String>>,
    #[arg(long, default_value_t = 1)]
    beam_size: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Print the result as SMT-LIB definitions
    #[arg(long)]
    smt_output: bool,
    /// Print N random programs instead of solving a problem
    #[arg(long = "generate-N-programs", value_name = "N")]
    generate_n_programs: Option<usize>,
    /// Size of the generated programs
    #[arg(long, default_value_t = 5)]
    program_size: usize,
    /// Random constants available to generated programs
    #[arg(long, default_value_t = 0)]
    number_of_constants: usize,
    /// Arguments of generated programs
    #[arg(long, default_value_t = 2)]
    number_of_params: usize,
    /// Generate predicates
    #[arg(long)]
    bool_return: bool,
}

impl Args {
    fn config(&self, demo: &demo::Demo) -> CegisConfig {
        let mut neural = NeuralConfig {
            beam_size: self.beam_size,
            seed: self.seed,
            ..Default::default()
        };
        if let Some(command) = &self.neural_command {
            neural.command = command.clone();
        }

        CegisConfig {
            min_program_size: self.min_program_size,
            max_program_size: self.max_program_size,
            max_iterations: self.max_iterations,
            learner: match self.learner {
                CliLearner::Solver | CliLearner::Incremental => LearnerKind::Solver,
                CliLearner::Enumerative => LearnerKind::Enumerative,
                CliLearner::Neural => LearnerKind::Neural,
            },
            incremental_solving: matches!(self.learner, CliLearner::Incremental),
            use_fm: self.fm,
            use_smt: self.smt,
            use_simp_solver: self.simplifying_solver,
            logic: demo.logic,
            enable_bitwise: !self.no_bitwise,
            enable_division: self.enable_division,
            enable_multiplication: !self.disable_multiplication,
            use_literals: self.literals,
            use_local_search: self.local_search,
            neural,
            local: LocalConfig {
                radius: self.local_radius,
                ..Default::default()
            },
            smt_solver: self.smt_solver.clone(),
        }
    }

    fn generator(&self) -> GeneratorConfig {
        GeneratorConfig {
            program_size: self.program_size,
            number_of_constants: self.number_of_constants,
            number_of_params: self.number_of_params,
            width: self.width,
            bool_return: self.bool_return,
            seed: self.seed,
            options: GrammarOptions {
                enable_bitwise: !self.no_bitwise,
                enable_division: self.enable_division,
                enable_multiplication: !self.disable_multiplication,
                ..Default::default()
            },
        }
    }
}

fn generate(args: &Args, count: usize) -> ExitCode {
    let mut stdout = std::io::stdout().lock();
    let written = ProgramGenerator::new(&args.generator()).and_then(|mut g| g.write_programs(count, &mut stdout));

    match written {
        Ok(written) => {
            info!("Generated {written} program(s)");
            ExitCode::from(EXIT_SATISFIABLE)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn main() -> ExitCode {
    colog::init();

    let args = Args::parse();
    if let Some(count) = args.generate_n_programs {
        return generate(&args, count);
    }

    let demo = match demo::by_name(&args.problem, args.width) {
        Ok(demo) => demo,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let cegis = Cegis::new(args.config(&demo));
    let z3 = z3::Context::new(&z3::Config::default());

    info!("Started");
    match cegis.run(&demo.problem, &z3) {
        Ok(report) => match report.outcome {
            Outcome::Satisfiable(solution) => {
                info!(
                    "SATISFIABLE after {} iteration(s) at program size {}",
                    report.iterations, report.program_size
                );
                if args.smt_output {
                    for (name, body) in &solution.functions {
                        if let Some(sig) = demo.problem.functions.get(name) {
                            println!("{}", define_fun(name, sig, body));
                        }
                    }
                } else {
                    print!("{solution}");
                }
                ExitCode::from(EXIT_SATISFIABLE)
            }
            Outcome::Unsatisfiable => {
                info!("UNSATISFIABLE up to program size {}", report.program_size);
                ExitCode::from(EXIT_UNSATISFIABLE)
            }
        },
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(argv: &[&str]) -> CegisConfig {
        let args = Args::try_parse_from(argv).unwrap();
        let demo = demo::by_name(&args.problem, args.width).unwrap();
        args.config(&demo)
    }

    #[test]
    fn bitwise_is_on_unless_disabled() {
        assert!(config(&["cegis-synth", "max"]).enable_bitwise);
        assert!(!config(&["cegis-synth", "max", "--no-bitwise"]).enable_bitwise);
    }

    #[test]
    fn generator_flags() {
        let args = Args::try_parse_from([
            "cegis-synth",
            "--generate-N-programs",
            "3",
            "--number-of-params",
            "1",
            "--bool-return",
        ])
        .unwrap();

        assert_eq!(args.generate_n_programs, Some(3));
        let generator = args.generator();
        assert_eq!(generator.number_of_params, 1);
        assert!(generator.bool_return);
        assert!(generator.options.enable_bitwise);
    }
}
