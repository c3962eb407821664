//! Audio file scanner
//!
//! Recursive audio file discovery by extension. Container validation is left
//! to the tag store and transcoder, since a mislabelled file still needs to
//! be found in order to be converted.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions considered audio (compared lower-cased)
const AUDIO_EXTENSIONS: &[&str] = &["flac", "wav", "mp3", "ogg", "oga", "m4a", "mp4", "aac"];

/// OS clutter never descended into or returned
const IGNORED_NAMES: &[&str] = &[
    "Thumbs.db",
    "desktop.ini",
    "$RECYCLE.BIN",
    "System Volume Information",
];

/// Library walker errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Root exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Recursive audio file discovery
#[derive(Debug, Default, Clone, Copy)]
pub struct FileScanner;

impl FileScanner {
    /// Create new file scanner
    ///
    /// Dot-files are always skipped, which also hides in-progress
    /// `.{stem}_converted.flac` conversion outputs.
    pub fn new() -> Self {
        Self
    }

    /// Audio files under `root_path`, sorted by path
    ///
    /// Symlinks are followed; walkdir reports a link back to an ancestor as
    /// an error, which is logged and skipped along with unreadable entries.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }
        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root_path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || is_wanted(e));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && is_audio_path(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) if e.loop_ancestor().is_some() => {
                    tracing::warn!(path = ?e.path(), "Symlink loop detected");
                }
                Err(e) => tracing::warn!(error = %e, "Error accessing entry"),
            }
        }

        files.sort();
        tracing::debug!(root = %root_path.display(), files = files.len(), "Scan complete");
        Ok(files)
    }

    /// Names of up to `limit` other audio files in the same directory
    ///
    /// Inference context: track listings disambiguate terse filenames.
    pub fn sibling_names(&self, path: &Path, limit: usize) -> Vec<String> {
        let Some(parent) = path.parent() else {
            return Vec::new();
        };

        let own_name = path.file_name();
        let mut names: Vec<String> = match std::fs::read_dir(parent) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter(|entry| Some(entry.file_name().as_os_str()) != own_name)
                .map(|entry| entry.path())
                .filter(|p| !is_hidden(p) && is_audio_path(p))
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
            Err(e) => {
                tracing::debug!(dir = %parent.display(), error = %e, "Cannot list siblings");
                Vec::new()
            }
        };

        names.sort();
        names.truncate(limit);
        names
    }
}

fn is_wanted(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !IGNORED_NAMES.iter().any(|ignored| name.contains(ignored))
}

/// Case-insensitive audio extension check
pub fn is_audio_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_audio_extension_detection() {
        assert!(is_audio_path(Path::new("a.mp3")));
        assert!(is_audio_path(Path::new("a.FLAC")));
        assert!(is_audio_path(Path::new("a.Oga")));
        assert!(!is_audio_path(Path::new("a.txt")));
        assert!(!is_audio_path(Path::new("a.opus")));
        assert!(!is_audio_path(Path::new("flac")));
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let scanner = FileScanner::new();
        let result = scanner.scan(Path::new("/nonexistent/path"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_scan_file_as_directory() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "a.flac");
        assert!(matches!(
            FileScanner::new().scan(&file),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = TempDir::new().unwrap();
        let result = FileScanner::new().scan(dir.path()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_scan_recursive_sorted_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.mp3");
        touch(dir.path(), "a.FLAC");
        touch(dir.path(), "cover.jpg");
        touch(dir.path(), ".hidden.flac");
        touch(dir.path(), ".track_converted.flac");
        touch(dir.path(), "disc2/c.wav");
        touch(dir.path(), ".git/d.flac");
        touch(dir.path(), "Thumbs.db");

        let files = FileScanner::new().scan(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.FLAC", "b.mp3", "disc2/c.wav"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_found_and_loops_skipped() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = touch(outside.path(), "linked.flac");
        std::os::unix::fs::symlink(&target, dir.path().join("linked.flac")).unwrap();
        touch(dir.path(), "sub/real.flac");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();

        let files = FileScanner::new().scan(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("linked.flac"), dir.path().join("sub/real.flac")]
        );
    }

    #[test]
    fn test_sibling_names_excludes_self_and_limits() {
        let dir = TempDir::new().unwrap();
        let me = touch(dir.path(), "03.flac");
        for i in 0..15 {
            touch(dir.path(), &format!("{:02}x.flac", i));
        }
        touch(dir.path(), "booklet.pdf");
        touch(dir.path(), ".03_converted.flac");

        let names = FileScanner::new().sibling_names(&me, 10);
        assert_eq!(names.len(), 10);
        assert!(!names.contains(&"03.flac".to_string()));
        assert!(names.iter().all(|n| n.ends_with(".flac") && !n.starts_with('.')));
        assert_eq!(names[0], "00x.flac");
    }
}
