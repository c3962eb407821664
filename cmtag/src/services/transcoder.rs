//! Conversion to the canonical container
//!
//! Runs the external encoder into a hidden sibling file, moves the original
//! into the backup directory, then installs the converted file under the
//! original path. The original bytes always reach the backup directory
//! before anything is written at the original path, and backups are never
//! deleted.

use crate::services::format_sniffer::{self, AudioFormat};
use crate::services::tag_store::{TagError, TagHandle, TagStore};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// FLAC compression level passed to the encoder
pub const COMPRESSION_LEVEL: u8 = 8;

/// Encoder stderr is cut to this many characters in errors
const STDERR_LIMIT: usize = 300;

/// Transcoder errors
///
/// Every variant leaves the source file in place at its original path,
/// except `InvalidOutput`, where the original is already in the backup
/// directory.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Encoder not found on PATH
    #[error("Encoder '{0}' not found on PATH; install it to convert non-FLAC files")]
    CapabilityMissing(String),

    /// Encoder could not be started
    #[error("Failed to run encoder: {0}")]
    EncoderSpawn(#[source] std::io::Error),

    /// Encoder exited with an error
    #[error("Encoder failed ({status}): {stderr}")]
    EncoderFailed { status: String, stderr: String },

    /// Encoder reported success but produced nothing
    #[error("Encoder produced no output at {0}")]
    MissingOutput(PathBuf),

    /// Moving the original into the backup directory failed
    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Installing the converted file failed; original restored from backup
    #[error("Failed to install converted file at {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Installed file does not open as FLAC
    #[error("Converted file is not valid FLAC: {0}")]
    InvalidOutput(#[source] TagError),
}

/// Successful conversion
pub struct TranscodeOutcome {
    /// Validated handle on the installed canonical file
    pub handle: TagHandle,
    /// Format the source was detected as
    pub detected: AudioFormat,
    /// Where the original bytes now live
    pub backup_path: PathBuf,
}

/// Transcoder service
pub struct Transcoder {
    encoder: String,
    backup_dir: PathBuf,
    tag_store: TagStore,
}

impl Transcoder {
    /// Create new transcoder
    ///
    /// `encoder` is an executable name resolved on PATH, or a path.
    pub fn new(encoder: impl Into<String>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
            backup_dir: backup_dir.into(),
            tag_store: TagStore::new(),
        }
    }

    /// Backup directory in use
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// True if the encoder resolves on PATH
    pub fn is_available(&self) -> bool {
        which::which(&self.encoder).is_ok()
    }

    /// Convert `path` to FLAC in place, keeping the original as a backup
    pub fn to_canonical(&self, path: &Path) -> Result<TranscodeOutcome, TranscodeError> {
        let encoder = which::which(&self.encoder)
            .map_err(|_| TranscodeError::CapabilityMissing(self.encoder.clone()))?;

        let detected = format_sniffer::sniff_file(path);
        let temp_path = converted_temp_path(path);

        tracing::info!(
            file = %path.display(),
            format = %detected,
            "Converting to FLAC"
        );

        let output = Command::new(&encoder)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-c:a", "flac", "-compression_level"])
            .arg(COMPRESSION_LEVEL.to_string())
            .arg(&temp_path)
            .stdin(Stdio::null())
            .output()
            .map_err(TranscodeError::EncoderSpawn)?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&temp_path);
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(STDERR_LIMIT)
                .collect();
            return Err(TranscodeError::EncoderFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        if !temp_path.is_file() {
            return Err(TranscodeError::MissingOutput(temp_path));
        }

        let backup_path = self.backup_original(path, detected).map_err(|source| {
            let _ = std::fs::remove_file(&temp_path);
            TranscodeError::Backup {
                path: path.to_path_buf(),
                source,
            }
        })?;

        tracing::info!(
            file = %path.display(),
            backup = %backup_path.display(),
            "Original backed up"
        );

        if let Err(source) = move_file(&temp_path, path) {
            restore_from_backup(&backup_path, path);
            let _ = std::fs::remove_file(&temp_path);
            return Err(TranscodeError::Install {
                path: path.to_path_buf(),
                source,
            });
        }

        let handle = self
            .tag_store
            .read(path)
            .map_err(TranscodeError::InvalidOutput)?;

        Ok(TranscodeOutcome {
            handle,
            detected,
            backup_path,
        })
    }

    /// Move the original into the backup directory under a fresh name
    fn backup_original(&self, path: &Path, detected: AudioFormat) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.backup_dir)?;
        let target = backup_target(&self.backup_dir, path, detected);
        move_file(path, &target)?;
        Ok(target)
    }
}

/// Hidden sibling the encoder writes to: `.{stem}_converted.flac`
pub fn converted_temp_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}_converted.flac", stem))
}

/// First free `{stem}_original_{format}[_{N}]{.ext}` in `backup_dir`
pub fn backup_target(backup_dir: &Path, path: &Path, detected: AudioFormat) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let base = format!("{}_original_{}", stem, detected);

    let candidate = backup_dir.join(format!("{}{}", base, extension));
    if !candidate.exists() {
        return candidate;
    }

    let mut counter = 1u32;
    loop {
        let candidate = backup_dir.join(format!("{}_{}{}", base, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to verified copy + remove across filesystems
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                error = %rename_err,
                "Rename failed, copying instead"
            );

            std::fs::copy(from, to)?;
            if sha256_file(from)? != sha256_file(to)? {
                let _ = std::fs::remove_file(to);
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Copy of {} does not match the source", from.display()),
                ));
            }
            std::fs::remove_file(from)
        }
    }
}

/// Put the original bytes back at `path`, leaving the backup in place
fn restore_from_backup(backup: &Path, path: &Path) {
    match std::fs::copy(backup, path) {
        Ok(_) => tracing::warn!(file = %path.display(), "Install failed, original restored"),
        Err(e) => tracing::error!(
            file = %path.display(),
            backup = %backup.display(),
            error = %e,
            "Install failed and restore failed; original is only in the backup directory"
        ),
    }
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
