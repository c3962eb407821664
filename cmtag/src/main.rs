//! cmtag - Classical music tagger
//!
//! Infers composer, work, movement and performer metadata from filenames,
//! converts non-FLAC files with a lossless backup, and writes Vorbis
//! comments, cover art and normalized filenames.

use anyhow::{Context, Result};
use clap::Parser;
use cmtag::cli::{self, Cli, RunSummary};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Config errors surface again, logged, when the run loads settings
    let configured_level = cmtag_common::config::load_toml_config(args.config.as_deref())
        .ok()
        .and_then(|config| config.logging.level);
    cmtag_common::logging::init_tracing(&args.log_directive(configured_level.as_deref()))
        .context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting cmtag"
    );

    let summary = cli::run(&args).await?;

    match summary {
        RunSummary::Tag(stats) => {
            println!("\nProcessing complete: {}", stats);
            if stats.total() == 0 {
                println!("No audio files found");
            }
        }
        RunSummary::Audit(stats) => {
            println!("\nAudit complete: {}", stats);
        }
    }

    Ok(())
}
