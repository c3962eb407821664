//! Test Helper Utilities
//!
//! Shared utilities for testing cmtag

#![allow(dead_code)]

pub mod audio_generator;
pub mod oracle;

use cmtag::services::reconciliation::ReconciliationEngine;
use cmtag::services::transcoder::Transcoder;
use cmtag::workflow::{Pipeline, PipelineConfig, ReviewGate};
use cmtag::services::inference_client::MetadataOracle;
use std::path::Path;

// Re-export commonly used items
pub use audio_generator::{generate_test_wav, write_minimal_flac, write_tagged_flac, AudioConfig};
pub use oracle::{
    calls, complete_moonlight_proposal, moonlight_proposal, DeclineAll, FailingOracle, StubOracle,
};

/// Encoder name that never resolves on PATH
pub const MISSING_ENCODER: &str = "cmtag-test-missing-encoder";

/// Pipeline with default policy, backups under `backup_dir`
pub fn pipeline<O: MetadataOracle, G: ReviewGate>(
    config: PipelineConfig,
    oracle: O,
    gate: G,
    encoder: &str,
    backup_dir: &Path,
) -> Pipeline<O, G> {
    Pipeline::new(
        config,
        oracle,
        gate,
        Transcoder::new(encoder, backup_dir),
        ReconciliationEngine::default(),
    )
}
