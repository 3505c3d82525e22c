use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the offline pipeline: dataset parsing, pair generation,
/// training and persistence.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("not enough examples in dataset, found {found}, expected {expected}")]
    InsufficientPairs { found: usize, expected: usize },

    #[error("csv line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("binary encoding: {0}")]
    Encode(#[from] bincode::Error),

    #[error("json encoding: {0}")]
    Json(#[from] serde_json::Error),
}
