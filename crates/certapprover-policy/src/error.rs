//! Error types for policy loading and evaluation

use std::path::PathBuf;
use thiserror::Error;

/// Policy errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy file could not be read
    #[error("Unable to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy sources failed to compile
    #[error("Unable to compile policy module {module}: {reason}")]
    Compile { module: String, reason: String },

    /// The input document could not be built
    #[error("Invalid policy input: {reason}")]
    Input { reason: String },

    /// The evaluator failed while running the query
    #[error("Policy evaluation failed: {reason}")]
    Evaluation { reason: String },
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
