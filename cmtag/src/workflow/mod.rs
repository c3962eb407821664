//! Library workflows
//!
//! Two policies drive a run over a folder:
//! - **Normal** (`tag`): fill in files that lack required metadata
//! - **Audit** (`audit`): re-check already tagged files and fix only what
//!   is inadequate, subject to review
//!
//! Files are processed sequentially. Per-file failures are counted and
//! logged, never propagated.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig};

use crate::services::reconciliation::ReconciliationDecision;
use crate::types::FailureStage;
use std::fmt;
use std::path::Path;

/// Human approval of an audit change set
pub trait ReviewGate: Send + Sync {
    /// Return true to apply `decision` to `path`
    fn approve(&self, path: &Path, decision: &ReconciliationDecision) -> bool;
}

/// Gate that approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ReviewGate for AutoApprove {
    fn approve(&self, _path: &Path, _decision: &ReconciliationDecision) -> bool {
        true
    }
}

/// Why a file was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Required fields already present (normal policy)
    AlreadyTagged,
    /// Not canonical and could not be converted
    NotCanonical(FailureStage),
    /// Dry run: decision computed, nothing applied
    DryRun,
    /// Reviewer declined the change set
    Declined,
}

/// Result of processing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Tags written (normal policy)
    Processed,
    /// Existing metadata adequate (audit policy)
    Verified,
    /// Changes applied (audit policy)
    Updated,
    Skipped(SkipReason),
    Failed(FailureStage),
}

/// Counters for a normal run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl NormalStats {
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Processed | FileOutcome::Updated | FileOutcome::Verified => {
                self.processed += 1
            }
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

impl fmt::Display for NormalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} failed",
            self.processed, self.skipped, self.failed
        )
    }
}

/// Counters for an audit run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub verified: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl AuditStats {
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Verified => self.verified += 1,
            FileOutcome::Updated | FileOutcome::Processed => self.updated += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.verified + self.updated + self.skipped + self.failed
    }
}

impl fmt::Display for AuditStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} verified, {} updated, {} skipped, {} failed",
            self.verified, self.updated, self.skipped, self.failed
        )
    }
}
