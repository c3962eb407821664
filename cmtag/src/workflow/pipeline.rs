//! Pipeline orchestrator
//!
//! Drives every audio file under a root through
//! sniff → (convert) → read → infer → reconcile → write/rename/cover art.
//!
//! # Error Handling
//! - Per-file isolation: any failure is logged with the file and stage,
//!   counted, and the run moves on
//! - Only an unreadable root aborts a run
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(config, oracle, AutoApprove, transcoder, engine);
//! let stats = pipeline.run_normal(Path::new("/music/Beethoven")).await?;
//! ```

use super::{AuditStats, FileOutcome, NormalStats, ReviewGate, SkipReason};
use crate::services::file_scanner::{FileScanner, ScanError};
use crate::services::inference_client::{InferenceRequest, MetadataOracle, MAX_CONTEXT_FILES};
use crate::services::reconciliation::{Policy, ReconciliationDecision, ReconciliationEngine};
use crate::services::safe_renamer::{file_stem, SafeRenamer};
use crate::services::tag_store::{TagFields, TagHandle, TagStore};
use crate::services::transcoder::{TranscodeError, Transcoder};
use crate::types::{FailureStage, ProposedMetadata};
use std::path::Path;
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Clone)]
pub struct PipelineConfig {
    /// Compute and report decisions without touching any file
    pub dry_run: bool,
    /// Apply audit changes without asking the review gate
    pub auto_approve: bool,
    /// Image embedded as front cover after tagging
    pub cover_art: Option<Vec<u8>>,
    /// Sibling filenames sent as inference context
    pub context_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_approve: false,
            cover_art: None,
            context_limit: MAX_CONTEXT_FILES,
        }
    }
}

/// Pipeline orchestrator
pub struct Pipeline<O: MetadataOracle, G: ReviewGate> {
    config: PipelineConfig,
    oracle: O,
    gate: G,
    scanner: FileScanner,
    tag_store: TagStore,
    transcoder: Transcoder,
    engine: ReconciliationEngine,
    renamer: SafeRenamer,
}

impl<O: MetadataOracle, G: ReviewGate> Pipeline<O, G> {
    /// Create new pipeline
    pub fn new(
        config: PipelineConfig,
        oracle: O,
        gate: G,
        transcoder: Transcoder,
        engine: ReconciliationEngine,
    ) -> Self {
        Self {
            config,
            oracle,
            gate,
            scanner: FileScanner::new(),
            tag_store: TagStore::new(),
            transcoder,
            engine,
            renamer: SafeRenamer::new(),
        }
    }

    /// Tag every file under `root` that lacks required metadata
    pub async fn run_normal(&self, root: &Path) -> Result<NormalStats, ScanError> {
        let files = self.scanner.scan(root)?;
        info!(
            root = %root.display(),
            files = files.len(),
            dry_run = self.config.dry_run,
            "Starting tag run"
        );

        let mut stats = NormalStats::default();
        for (index, path) in files.iter().enumerate() {
            debug!(file = %path.display(), index = index + 1, total = files.len(), "Processing");
            let outcome = self.process_normal(path).await;
            log_outcome(path, outcome);
            stats.record(outcome);
        }

        info!(%stats, "Tag run complete");
        Ok(stats)
    }

    /// Re-check every tagged file under `root`, applying approved fixes
    pub async fn run_audit(&self, root: &Path) -> Result<AuditStats, ScanError> {
        let files = self.scanner.scan(root)?;
        info!(
            root = %root.display(),
            files = files.len(),
            dry_run = self.config.dry_run,
            auto_approve = self.config.auto_approve,
            "Starting audit run"
        );

        let mut stats = AuditStats::default();
        for (index, path) in files.iter().enumerate() {
            debug!(file = %path.display(), index = index + 1, total = files.len(), "Auditing");
            let outcome = self.process_audit(path).await;
            log_outcome(path, outcome);
            stats.record(outcome);
        }

        info!(%stats, "Audit run complete");
        Ok(stats)
    }

    /// Normal policy for one file
    pub async fn process_normal(&self, path: &Path) -> FileOutcome {
        let mut handle = match self.ensure_canonical(path) {
            Ok(handle) => handle,
            Err(outcome) => return outcome,
        };

        let completeness = handle.completeness();
        if completeness.complete {
            return FileOutcome::Skipped(SkipReason::AlreadyTagged);
        }
        info!(
            file = %path.display(),
            missing = ?completeness.missing_roles,
            "Missing metadata"
        );

        let proposal = match self.infer(path, None).await {
            Ok(proposal) => proposal,
            Err(stage) => return FileOutcome::Failed(stage),
        };

        let decision = match self.engine.decide(
            Policy::Populate,
            Some(handle.fields()),
            &file_stem(path),
            &proposal,
        ) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(file = %path.display(), stage = %FailureStage::InferenceFailure, error = %e, "Unusable proposal");
                return FileOutcome::Failed(FailureStage::InferenceFailure);
            }
        };

        report_decision(path, &proposal, &decision);

        if self.config.dry_run {
            return FileOutcome::Skipped(SkipReason::DryRun);
        }

        match self.apply(&mut handle, &proposal, &decision) {
            Ok(()) => FileOutcome::Processed,
            Err(stage) => FileOutcome::Failed(stage),
        }
    }

    /// Audit policy for one file
    pub async fn process_audit(&self, path: &Path) -> FileOutcome {
        let mut handle = match self.ensure_canonical(path) {
            Ok(handle) => handle,
            Err(outcome) => return outcome,
        };

        let existing = handle.fields().clone();
        let proposal = match self.infer(path, Some(&existing)).await {
            Ok(proposal) => proposal,
            Err(stage) => return FileOutcome::Failed(stage),
        };

        let decision = match self.engine.decide(
            Policy::Audit,
            Some(&existing),
            &file_stem(path),
            &proposal,
        ) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(file = %path.display(), stage = %FailureStage::InferenceFailure, error = %e, "Unusable proposal");
                return FileOutcome::Failed(FailureStage::InferenceFailure);
            }
        };

        if !decision.changes_needed {
            return FileOutcome::Verified;
        }

        report_decision(path, &proposal, &decision);

        if self.config.dry_run {
            return FileOutcome::Skipped(SkipReason::DryRun);
        }

        if !self.config.auto_approve && !self.gate.approve(path, &decision) {
            return FileOutcome::Skipped(SkipReason::Declined);
        }

        match self.apply(&mut handle, &proposal, &decision) {
            Ok(()) => FileOutcome::Updated,
            Err(stage) => FileOutcome::Failed(stage),
        }
    }

    /// Open `path` as FLAC, converting it first if needed
    ///
    /// Unconvertible files are skipped. A conversion whose installed output
    /// does not validate is a failure: the backup is the only good copy.
    fn ensure_canonical(&self, path: &Path) -> Result<TagHandle, FileOutcome> {
        let read_error = match self.tag_store.read(path) {
            Ok(handle) => return Ok(handle),
            Err(e) => e,
        };

        info!(file = %path.display(), reason = %read_error, "Not a valid FLAC file");

        if self.config.dry_run {
            info!(file = %path.display(), "Dry run: conversion skipped");
            return Err(FileOutcome::Skipped(SkipReason::NotCanonical(
                FailureStage::FormatInvalid,
            )));
        }

        match self.transcoder.to_canonical(path) {
            Ok(outcome) => {
                info!(
                    file = %path.display(),
                    from = %outcome.detected,
                    backup = %outcome.backup_path.display(),
                    "Converted to FLAC"
                );
                Ok(outcome.handle)
            }
            Err(e) => {
                let outcome = match e {
                    TranscodeError::CapabilityMissing(_) => FileOutcome::Skipped(
                        SkipReason::NotCanonical(FailureStage::CapabilityMissing),
                    ),
                    TranscodeError::InvalidOutput(_) => {
                        FileOutcome::Failed(FailureStage::FormatInvalid)
                    }
                    _ => FileOutcome::Skipped(SkipReason::NotCanonical(FailureStage::FormatInvalid)),
                };
                warn!(file = %path.display(), error = %e, "Conversion failed");
                Err(outcome)
            }
        }
    }

    async fn infer(
        &self,
        path: &Path,
        existing: Option<&TagFields>,
    ) -> Result<ProposedMetadata, FailureStage> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let context = self.scanner.sibling_names(path, self.config.context_limit);

        let request = InferenceRequest {
            filename: &filename,
            context: &context,
            existing,
        };

        self.oracle.infer(&request).await.map_err(|e| {
            warn!(
                file = %path.display(),
                stage = %FailureStage::InferenceFailure,
                error = %e,
                "Metadata inference failed"
            );
            FailureStage::InferenceFailure
        })
    }

    /// Write tags, then cover art, then rename
    ///
    /// Only the tag write can fail the file. Cover art and rename failures
    /// are logged; the tags are already on disk at that point.
    fn apply(
        &self,
        handle: &mut TagHandle,
        proposal: &ProposedMetadata,
        decision: &ReconciliationDecision,
    ) -> Result<(), FailureStage> {
        let report = self.tag_store.write(handle, proposal).map_err(|e| {
            warn!(
                file = %handle.path().display(),
                stage = %FailureStage::WriteFailure,
                error = %e,
                "Failed to write tags"
            );
            FailureStage::WriteFailure
        })?;
        debug!(
            file = %handle.path().display(),
            cleared = report.cleared,
            written = ?report.written,
            "Tags written"
        );

        if let Some(image) = &self.config.cover_art {
            if let Err(e) = self.tag_store.embed_cover_art(handle, image) {
                warn!(file = %handle.path().display(), error = %e, "Failed to embed cover art");
            }
        }

        if let Some(rename) = &decision.rename {
            let path = handle.path().to_path_buf();
            match self.renamer.rename(&path, &rename.to_stem) {
                Ok(outcome) => {
                    if outcome.renamed {
                        info!(
                            from = %path.display(),
                            to = %outcome.new_path.display(),
                            "Renamed"
                        );
                    }
                    handle.relocate(outcome.new_path);
                }
                Err(e) => warn!(
                    file = %path.display(),
                    error = %e,
                    "Rename failed, tags may still have been written"
                ),
            }
        }

        Ok(())
    }
}

fn report_decision(path: &Path, proposal: &ProposedMetadata, decision: &ReconciliationDecision) {
    for (field, value) in proposal.populated_fields() {
        debug!(file = %path.display(), field, value = %value, "Proposed");
    }
    for diff in &decision.diffs {
        info!(
            file = %path.display(),
            field = %diff.field,
            old = diff.old.as_deref().unwrap_or("<none>"),
            new = %diff.new,
            "Change"
        );
    }
    if let Some(rename) = &decision.rename {
        info!(
            file = %path.display(),
            from = %rename.from_stem,
            to = %rename.to_stem,
            "Rename"
        );
    }
}

fn log_outcome(path: &Path, outcome: FileOutcome) {
    match outcome {
        FileOutcome::Processed => info!(file = %path.display(), "Metadata applied"),
        FileOutcome::Verified => info!(file = %path.display(), "Metadata verified"),
        FileOutcome::Updated => info!(file = %path.display(), "Metadata updated"),
        FileOutcome::Skipped(reason) => info!(file = %path.display(), ?reason, "Skipped"),
        FileOutcome::Failed(stage) => warn!(file = %path.display(), %stage, "Failed"),
    }
}
