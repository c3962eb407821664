//! Collision-safe file renaming
//!
//! A rename never replaces a different file: when the target name is taken,
//! " (N)" is appended to the stem until a free name is found.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum stem length, in characters
pub const MAX_STEM_CHARS: usize = 200;

/// Characters that are invalid in filenames on at least one major platform
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Rename errors
#[derive(Debug, Error)]
pub enum RenameError {
    /// Desired stem is empty after sanitizing
    #[error("Suggested filename is empty after sanitizing: {0:?}")]
    EmptyStem(String),

    /// Source has no parent directory
    #[error("Cannot rename {0}: no parent directory")]
    NoParent(PathBuf),

    /// Underlying move failed
    #[error("Failed to rename {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a rename attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    /// Path of the file after the call
    pub new_path: PathBuf,
    /// False when the file already had the desired name
    pub renamed: bool,
}

/// Make a desired stem safe to use as a filename
///
/// Strips invalid and control characters, collapses whitespace runs,
/// trims, and truncates to [`MAX_STEM_CHARS`] characters.
pub fn sanitize_stem(desired: &str) -> String {
    let stripped: String = desired
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control())
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_STEM_CHARS).collect();

    // Trailing dots and spaces are silently dropped on Windows
    truncated.trim_end_matches(['.', ' ']).to_string()
}

/// Filename stem of a path as UTF-8 (lossy)
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Safe renamer service
pub struct SafeRenamer {}

impl SafeRenamer {
    /// Create new renamer
    pub fn new() -> Self {
        Self {}
    }

    /// Compute the path `path` would be renamed to, without touching disk
    /// beyond existence checks
    pub fn resolve_target(&self, path: &Path, desired_stem: &str) -> Result<PathBuf, RenameError> {
        let stem = sanitize_stem(desired_stem);
        if stem.is_empty() {
            return Err(RenameError::EmptyStem(desired_stem.to_string()));
        }

        let parent = path
            .parent()
            .ok_or_else(|| RenameError::NoParent(path.to_path_buf()))?;
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let candidate = parent.join(format!("{}{}", stem, extension));
        if candidate == path || !candidate.exists() || is_same_file(&candidate, path) {
            return Ok(candidate);
        }

        let mut counter = 1u32;
        loop {
            let candidate = parent.join(format!("{} ({}){}", stem, counter, extension));
            if candidate == path || !candidate.exists() {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Rename `path` so its stem becomes `desired_stem`, keeping the extension
    pub fn rename(&self, path: &Path, desired_stem: &str) -> Result<RenameOutcome, RenameError> {
        let target = self.resolve_target(path, desired_stem)?;

        if target == path {
            return Ok(RenameOutcome {
                new_path: target,
                renamed: false,
            });
        }

        std::fs::rename(path, &target).map_err(|source| RenameError::Io {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;

        tracing::debug!(from = %path.display(), to = %target.display(), "Renamed file");

        Ok(RenameOutcome {
            new_path: target,
            renamed: true,
        })
    }
}

impl Default for SafeRenamer {
    fn default() -> Self {
        Self::new()
    }
}

/// True if both paths resolve to the same file (case-only renames on
/// case-insensitive filesystems)
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sanitize_strips_and_collapses() {
        assert_eq!(
            sanitize_stem("01 - Bach:  Goldberg / Aria?  "),
            "01 - Bach Goldberg Aria"
        );
        assert_eq!(sanitize_stem("a\tb\nc"), "abc");
        assert_eq!(sanitize_stem("Op. 27 No. 2..."), "Op. 27 No. 2");
        assert_eq!(sanitize_stem("***"), "");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let sanitized = sanitize_stem(&long);
        assert_eq!(sanitized.chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_same_name_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Moonlight Sonata.flac");
        fs::write(&path, b"a").unwrap();

        let outcome = SafeRenamer::new().rename(&path, "Moonlight  Sonata").unwrap();
        assert!(!outcome.renamed);
        assert_eq!(outcome.new_path, path);
        assert!(path.exists());
    }

    #[test]
    fn test_extension_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track01.FLAC");
        fs::write(&path, b"a").unwrap();

        let outcome = SafeRenamer::new().rename(&path, "Aria").unwrap();
        assert!(outcome.renamed);
        assert_eq!(outcome.new_path, dir.path().join("Aria.FLAC"));
        assert!(!path.exists());
    }

    #[test]
    fn test_collision_gets_counter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Aria.flac"), b"first").unwrap();
        fs::write(dir.path().join("Aria (1).flac"), b"second").unwrap();
        let third = dir.path().join("x.flac");
        fs::write(&third, b"third").unwrap();

        let outcome = SafeRenamer::new().rename(&third, "Aria").unwrap();
        assert_eq!(outcome.new_path, dir.path().join("Aria (2).flac"));
        assert_eq!(fs::read(dir.path().join("Aria.flac")).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join("Aria (1).flac")).unwrap(), b"second");
    }

    #[test]
    fn test_empty_stem_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.flac");
        fs::write(&path, b"a").unwrap();
        assert!(matches!(
            SafeRenamer::new().rename(&path, " ?? "),
            Err(RenameError::EmptyStem(_))
        ));
        assert!(path.exists());
    }

    #[test]
    fn test_missing_source_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.flac");
        assert!(matches!(
            SafeRenamer::new().rename(&path, "Aria"),
            Err(RenameError::Io { .. })
        ));
    }
}
