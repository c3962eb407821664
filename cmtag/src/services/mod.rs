//! Service modules for the tagging pipeline

pub mod file_scanner;
pub mod format_sniffer;
pub mod inference_client;
pub mod reconciliation;
pub mod safe_renamer;
pub mod tag_store;
pub mod transcoder;

pub use file_scanner::{FileScanner, ScanError};
pub use format_sniffer::AudioFormat;
pub use inference_client::{InferenceError, InferenceRequest, MetadataOracle, OpenRouterClient};
pub use reconciliation::{
    Policy, PolicyParams, ReconcileError, ReconciliationDecision, ReconciliationEngine,
};
pub use safe_renamer::{RenameError, RenameOutcome, SafeRenamer};
pub use tag_store::{TagError, TagFields, TagHandle, TagStore};
pub use transcoder::{TranscodeError, TranscodeOutcome, Transcoder};
