//! cmtag library interface
//!
//! Tags classical-music audio files with metadata inferred from their
//! filenames, converting them to FLAC first when needed, and keeps tags
//! and filenames consistent over repeated runs.

pub mod cli;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{RunError, RunResult};
