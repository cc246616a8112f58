#[derive(Debug, thiserror::Error)]
pub enum CegisError {
    #[error("Decision procedure failed: {0}")]
    Oracle(String),
    #[error("No progress made: the learner proposed the same candidate twice")]
    NoProgress,
    #[error("Iteration limit of {0} reached")]
    IterationLimit(usize),
    #[error("External process `{command}` failed: {reason}")]
    ExternalProcess { command: String, reason: String },
    #[error("Malformed problem: {0}")]
    MalformedProblem(String),
    #[error("Evaluation failed: {0}")]
    Eval(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    SmtError(#[from] smt2parser::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CegisError {
    pub fn oracle(reason: impl std::fmt::Display) -> Self {
        CegisError::Oracle(reason.to_string())
    }

    pub fn process(command: &[String], reason: impl std::fmt::Display) -> Self {
        CegisError::ExternalProcess {
            command: command.join(" "),
            reason: reason.to_string(),
        }
    }
}
