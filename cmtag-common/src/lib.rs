//! # cmtag Common Library
//!
//! Shared code for the cmtag workspace including:
//! - Error types
//! - Configuration loading (TOML file, environment, platform defaults)
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
