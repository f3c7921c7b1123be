use thiserror::Error;

use crate::types::FactoryId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse planner configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tensor handle factory '{0}' is already registered")]
    DuplicateFactory(FactoryId),

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Invalid tensor description: {0}")]
    InvalidTensor(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
}
