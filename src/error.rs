use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("orchestrator is already running")]
    AlreadyRunning,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate action: {0}")]
    DuplicateAction(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
