use cpt_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures building a stimulus sequence.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// No arrangement satisfies the quotas and the no-repeat rule.
    /// Always a configuration bug; surfaces before the run starts.
    #[error("no arrangement of {length} rounds satisfies the quotas: {detail}")]
    ConstraintUnsatisfiable { length: usize, detail: String },

    #[error("invalid sequence plan: {0}")]
    InvalidPlan(String),

    #[error("provided sequence rejected: {0}")]
    RejectedSequence(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown test '{0}'")]
    UnknownTest(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Failures constructing a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}
