use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColaError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("COLA constraint violated: {0}")]
    Validation(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Buffer bounds exceeded: {0}")]
    Bounds(String),

    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ColaError>;
