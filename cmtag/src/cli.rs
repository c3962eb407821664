//! Command-line interface
//!
//! Thin shell over the pipeline: parses arguments, resolves settings and
//! the credential, wires the services together, and runs one policy.

use crate::config::{resolve_api_key, Settings, SettingsOverrides};
use crate::error::{RunError, RunResult};
use crate::services::inference_client::{OpenRouterClient, MAX_CONTEXT_FILES};
use crate::services::reconciliation::{ReconciliationDecision, ReconciliationEngine};
use crate::services::transcoder::Transcoder;
use crate::workflow::{AuditStats, NormalStats, Pipeline, PipelineConfig, ReviewGate};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line arguments for cmtag
#[derive(Parser, Debug)]
#[command(name = "cmtag")]
#[command(about = "Classical music tagger: infer, reconcile and apply FLAC metadata")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Inference model identifier
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Encoder executable used to convert non-FLAC files
    #[arg(long, global = true)]
    pub encoder: Option<String>,

    /// Directory receiving originals replaced by conversion
    #[arg(long, global = true)]
    pub backup_dir: Option<PathBuf>,

    /// TOML config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tag files that are missing required metadata
    Tag(TagArgs),
    /// Re-check tagged files and fix inadequate metadata
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
pub struct TagArgs {
    /// Folder to process recursively
    pub folder: PathBuf,

    /// Show proposals without modifying files
    #[arg(long)]
    pub dry_run: bool,

    /// Image to embed as front cover
    #[arg(long, value_name = "IMAGE")]
    pub cover: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Folder to process recursively
    pub folder: PathBuf,

    /// Apply changes without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Show proposed changes without modifying files
    #[arg(long)]
    pub dry_run: bool,

    /// Image to embed as front cover on updated files
    #[arg(long, value_name = "IMAGE")]
    pub cover: Option<PathBuf>,
}

/// Counters of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSummary {
    Tag(NormalStats),
    Audit(AuditStats),
}

impl Cli {
    /// Default log directive for this invocation
    ///
    /// `--verbose` wins over the configured `[logging] level`.
    pub fn log_directive(&self, configured: Option<&str>) -> String {
        if self.verbose {
            return "debug".to_string();
        }
        configured
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or("info")
            .to_string()
    }

    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            model: self.model.clone(),
            encoder: self.encoder.clone(),
            backup_dir: self.backup_dir.clone(),
        }
    }
}

/// Review gate asking y/N on stdin
pub struct StdinGate;

impl ReviewGate for StdinGate {
    fn approve(&self, path: &Path, decision: &ReconciliationDecision) -> bool {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "\n{}", path.display());
        for diff in &decision.diffs {
            let _ = writeln!(
                stdout,
                "  {}: {} -> {}",
                diff.field,
                diff.old.as_deref().unwrap_or("<none>"),
                diff.new
            );
        }
        if let Some(rename) = &decision.rename {
            let _ = writeln!(stdout, "  rename: {} -> {}", rename.from_stem, rename.to_stem);
        }
        let _ = write!(stdout, "Apply these changes? [y/N] ");
        let _ = stdout.flush();
        drop(stdout);

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Resolve settings, build the pipeline, and run the selected policy
pub async fn run(cli: &Cli) -> RunResult<RunSummary> {
    let toml = cmtag_common::config::load_toml_config(cli.config.as_deref())?;
    let settings = Settings::resolve(&cli.overrides(), &toml)?;
    let api_key = resolve_api_key()?;
    let oracle = OpenRouterClient::new(settings.oracle_settings(api_key))?;

    let transcoder = Transcoder::new(settings.encoder.clone(), settings.backup_dir.clone());
    if !transcoder.is_available() {
        info!(
            encoder = %settings.encoder,
            "Encoder not found; non-FLAC files will be skipped"
        );
    }
    let engine = ReconciliationEngine::new(settings.policy);

    match &cli.command {
        Command::Tag(args) => {
            let config = PipelineConfig {
                dry_run: args.dry_run,
                auto_approve: true,
                cover_art: read_cover(args.cover.as_deref())?,
                context_limit: MAX_CONTEXT_FILES,
            };
            let pipeline = Pipeline::new(config, oracle, StdinGate, transcoder, engine);
            let stats = pipeline.run_normal(&args.folder).await?;
            Ok(RunSummary::Tag(stats))
        }
        Command::Audit(args) => {
            let config = PipelineConfig {
                dry_run: args.dry_run,
                auto_approve: args.yes,
                cover_art: read_cover(args.cover.as_deref())?,
                context_limit: MAX_CONTEXT_FILES,
            };
            let pipeline = Pipeline::new(config, oracle, StdinGate, transcoder, engine);
            let stats = pipeline.run_audit(&args.folder).await?;
            Ok(RunSummary::Audit(stats))
        }
    }
}

fn read_cover(path: Option<&Path>) -> RunResult<Option<Vec<u8>>> {
    path.map(|path| {
        std::fs::read(path).map_err(|source| RunError::CoverArt {
            path: path.to_path_buf(),
            source,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_uses_configured_level() {
        let cli = Cli::try_parse_from(["cmtag", "audit", "/music"]).unwrap();
        assert_eq!(cli.log_directive(None), "info");
        assert_eq!(cli.log_directive(Some("  ")), "info");
        assert_eq!(cli.log_directive(Some("warn,cmtag=debug")), "warn,cmtag=debug");
    }

    #[test]
    fn test_parse_tag() {
        let cli = Cli::try_parse_from(["cmtag", "tag", "/music", "--dry-run", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_directive(Some("warn")), "debug");
        match cli.command {
            Command::Tag(args) => {
                assert_eq!(args.folder, PathBuf::from("/music"));
                assert!(args.dry_run);
                assert!(args.cover.is_none());
            }
            other => panic!("Expected tag, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_audit_with_global_flags() {
        let cli = Cli::try_parse_from([
            "cmtag",
            "--model",
            "openai/gpt-4o-mini",
            "audit",
            "/music",
            "--yes",
            "--cover",
            "front.jpg",
            "--backup-dir",
            "/tmp/backups",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("openai/gpt-4o-mini"));
        assert_eq!(cli.backup_dir, Some(PathBuf::from("/tmp/backups")));
        match cli.command {
            Command::Audit(args) => {
                assert!(args.yes);
                assert!(!args.dry_run);
                assert_eq!(args.cover, Some(PathBuf::from("front.jpg")));
            }
            other => panic!("Expected audit, got {:?}", other),
        }
    }

    #[test]
    fn test_folder_required() {
        assert!(Cli::try_parse_from(["cmtag", "tag"]).is_err());
        assert!(Cli::try_parse_from(["cmtag"]).is_err());
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
    }

    #[test]
    fn test_missing_cover_file() {
        let result = read_cover(Some(Path::new("/no/such/cover.jpg")));
        assert!(matches!(result, Err(RunError::CoverArt { .. })));
        assert!(matches!(read_cover(None), Ok(None)));
    }
}
