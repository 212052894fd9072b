use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VolumeCounterError {
    #[error("input BIDS directory does not exist: {}", .0.display())]
    #[diagnostic(help("pass the root of a BIDS dataset as the first argument"))]
    MissingInputDir(PathBuf),

    #[error("invalid participant label: {0}")]
    InvalidParticipantLabel(String),

    #[error("failed to read image {path}: {message}")]
    ImageRead { path: String, message: String },

    #[error("failed to serialize {0}")]
    Serialize(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
