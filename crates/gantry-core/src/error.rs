//! Error types for Gantry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Workflow errors
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    #[error("Invalid glob pattern `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    // Execution errors
    #[error("Job {job} on {os} failed: {message}")]
    JobExecution {
        job: String,
        os: String,
        message: String,
    },

    #[error("Step `{step}` timed out after {seconds}s")]
    StepTimeout { step: String, seconds: u64 },

    #[error("Coverage upload failed: {0}")]
    CoverageUpload(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
