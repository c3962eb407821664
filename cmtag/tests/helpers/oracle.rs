//! Scripted metadata oracles

use async_trait::async_trait;
use cmtag::services::inference_client::{InferenceError, InferenceRequest, MetadataOracle};
use cmtag::services::reconciliation::ReconciliationDecision;
use cmtag::types::ProposedMetadata;
use cmtag::workflow::ReviewGate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Returns a fixed proposal per filename, or a default for any other name
///
/// Deterministic, so repeated runs see the same proposal.
#[derive(Default)]
pub struct StubOracle {
    by_filename: HashMap<String, ProposedMetadata>,
    fallback: Option<ProposedMetadata>,
    calls: Arc<AtomicUsize>,
}

impl StubOracle {
    /// Answer every request with `proposal`
    pub fn always(proposal: ProposedMetadata) -> Self {
        Self {
            fallback: Some(proposal),
            ..Default::default()
        }
    }

    /// Answer requests for `filename` with `proposal`
    pub fn with(mut self, filename: &str, proposal: ProposedMetadata) -> Self {
        self.by_filename.insert(filename.to_string(), proposal);
        self
    }

    /// Shared call counter, readable after the oracle moves into a pipeline
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MetadataOracle for StubOracle {
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<ProposedMetadata, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.by_filename
            .get(request.filename)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| InferenceError::Parse(format!("no stub for {}", request.filename)))
    }
}

/// Always fails like an unreachable service
pub struct FailingOracle;

#[async_trait]
impl MetadataOracle for FailingOracle {
    async fn infer(&self, _request: &InferenceRequest<'_>) -> Result<ProposedMetadata, InferenceError> {
        Err(InferenceError::Network("connection refused".to_string()))
    }
}

/// Declines every change set
pub struct DeclineAll;

impl ReviewGate for DeclineAll {
    fn approve(&self, _path: &Path, _decision: &ReconciliationDecision) -> bool {
        false
    }
}

/// Reads a shared counter
pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// "Moonlight Sonata" proposal used across scenarios
pub fn moonlight_proposal() -> ProposedMetadata {
    ProposedMetadata {
        composer: Some("Beethoven, Ludwig van".to_string()),
        work_short: Some("Moonlight Sonata".to_string()),
        movement: Some("I. Adagio sostenuto".to_string()),
        suggested_filename: Some(
            "01 - Beethoven - Moonlight Sonata - I. Adagio sostenuto - Pollini".to_string(),
        ),
        ..Default::default()
    }
}

/// Moonlight proposal that satisfies every required role
pub fn complete_moonlight_proposal() -> ProposedMetadata {
    ProposedMetadata {
        work: Some("Piano Sonata No. 14 in C-sharp minor, Op. 27 No. 2".to_string()),
        performers: vec!["Maurizio Pollini".to_string()],
        track: Some("1".to_string()),
        ..moonlight_proposal()
    }
}
