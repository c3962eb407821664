//! Error types for cmtag runs
//!
//! Run-level errors stop a run before or instead of processing files.
//! Per-file problems never surface here; the pipeline counts them by
//! [`FailureStage`](crate::types::FailureStage).

use crate::services::file_scanner::ScanError;
use crate::services::inference_client::InferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Run error type
#[derive(Debug, Error)]
pub enum RunError {
    /// Missing credential, bad config file, bad log filter
    #[error(transparent)]
    Setup(#[from] cmtag_common::Error),

    /// Library root missing or not a directory
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Inference client could not be constructed
    #[error("Inference client unavailable: {0}")]
    Client(#[from] InferenceError),

    /// Cover image given on the command line could not be read
    #[error("Failed to read cover image {path}: {source}")]
    CoverArt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience result type for run-level operations
pub type RunResult<T> = Result<T, RunError>;
