//! Error taxonomy for a pipeline run.
//!
//! Only [`FatalError`] leaves [`crate::Pipeline`]; generation and write
//! failures are caught per record and turned into a
//! [`crate::RecordOutcome::Failed`].

use std::path::PathBuf;

use thiserror::Error;

/// Startup-time failures. Any of these aborts the run before the first record.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Malformed input '{}': {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Backend '{backend}' failed to start: {cause:#}")]
    BackendStartup {
        backend: String,
        cause: anyhow::Error,
    },

    #[error("Unable to prepare output directory '{}': {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The backend could not turn a prompt into an image.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0:#}")]
    Backend(anyhow::Error),

    #[error("backend returned no images")]
    EmptyResponse,
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Backend(err)
    }
}

/// Persisting one image failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Unable to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to convert generated image to PNG: {source}")]
    Encode {
        #[from]
        source: image::ImageError,
    },
}

pub type FatalResult<T> = std::result::Result<T, FatalError>;
