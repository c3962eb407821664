//! Container format detection from magic bytes
//!
//! Extensions lie (renamed downloads, `.flac` files that are really M4A),
//! so the container is classified from the first 12 bytes only.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of header bytes inspected
pub const HEADER_LEN: usize = 12;

/// Detected container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// FLAC, the canonical container
    Flac,
    Wav,
    Mp3,
    Ogg,
    /// MP4 family (M4A, AAC in MP4, ALAC)
    Mp4,
    /// No known signature; cannot be converted
    Unknown,
}

impl AudioFormat {
    /// Short lower-case name, used in backup filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp4 => "m4a",
            AudioFormat::Unknown => "unknown",
        }
    }

    /// True for the canonical container
    pub fn is_canonical(&self) -> bool {
        matches!(self, AudioFormat::Flac)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a header
///
/// Never fails: anything unmatched, including headers shorter than a
/// signature, is `Unknown`.
pub fn detect(header: &[u8]) -> AudioFormat {
    let header = &header[..header.len().min(HEADER_LEN)];

    match header {
        [b'f', b'L', b'a', b'C', ..] => AudioFormat::Flac,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => AudioFormat::Wav,
        [b'I', b'D', b'3', ..] | [0xFF, 0xFB, ..] => AudioFormat::Mp3,
        [b'O', b'g', b'g', b'S', ..] => AudioFormat::Ogg,
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => AudioFormat::Mp4,
        // Big-endian box sizes of common leading MP4 atoms
        [0x00, 0x00, 0x00, 0x18, ..] | [0x00, 0x00, 0x00, 0x1C, ..] | [0x00, 0x00, 0x00, 0x20, ..] => {
            AudioFormat::Mp4
        }
        _ => AudioFormat::Unknown,
    }
}

/// Read the header of a file and classify it
///
/// I/O failures classify as `Unknown` rather than erroring.
pub fn sniff_file(path: &Path) -> AudioFormat {
    let mut buffer = [0u8; HEADER_LEN];
    let read = File::open(path).and_then(|mut file| read_up_to(&mut file, &mut buffer));

    match read {
        Ok(bytes_read) => detect(&buffer[..bytes_read]),
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "Header read failed");
            AudioFormat::Unknown
        }
    }
}

/// `read` until the buffer is full or EOF
fn read_up_to(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_signatures() {
        assert_eq!(detect(b"fLaC\x00\x00\x00\x22\x10\x00\x10\x00"), AudioFormat::Flac);
        assert_eq!(detect(b"RIFF\x24\x08\x00\x00WAVE"), AudioFormat::Wav);
        assert_eq!(detect(b"ID3\x04\x00\x00\x00\x00\x00\x00\x00\x00"), AudioFormat::Mp3);
        assert_eq!(detect(&[0xFF, 0xFB, 0x90, 0x64, 0, 0, 0, 0]), AudioFormat::Mp3);
        assert_eq!(detect(b"OggS\x00\x02\x00\x00\x00\x00\x00\x00"), AudioFormat::Ogg);
        assert_eq!(detect(b"\x00\x00\x00\x2cftypM4A "), AudioFormat::Mp4);
    }

    #[test]
    fn test_mp4_box_size_prefixes() {
        assert_eq!(detect(b"\x00\x00\x00\x18moov\x00\x00\x00\x00"), AudioFormat::Mp4);
        assert_eq!(detect(b"\x00\x00\x00\x1cmoov"), AudioFormat::Mp4);
        assert_eq!(detect(b"\x00\x00\x00\x20free"), AudioFormat::Mp4);
        assert_eq!(detect(b"\x00\x00\x00\x21free"), AudioFormat::Unknown);
    }

    #[test]
    fn test_riff_without_wave_is_unknown() {
        assert_eq!(detect(b"RIFF\x24\x08\x00\x00AVI "), AudioFormat::Unknown);
    }

    #[test]
    fn test_short_and_empty_headers_are_unknown() {
        assert_eq!(detect(b""), AudioFormat::Unknown);
        assert_eq!(detect(b"fLa"), AudioFormat::Unknown);
        assert_eq!(detect(b"RIFF\x00\x00"), AudioFormat::Unknown);
        assert_eq!(detect(b"not audio at all"), AudioFormat::Unknown);
    }

    #[test]
    fn test_extension_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let lying = dir.path().join("track.flac");
        std::fs::write(&lying, b"ID3\x03\x00\x00\x00\x00\x00\x00garbage").unwrap();
        assert_eq!(sniff_file(&lying), AudioFormat::Mp3);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        assert_eq!(
            sniff_file(Path::new("/nonexistent/file.flac")),
            AudioFormat::Unknown
        );
    }

    #[test]
    fn test_backup_names() {
        assert_eq!(AudioFormat::Mp4.as_str(), "m4a");
        assert!(AudioFormat::Flac.is_canonical());
        assert!(!AudioFormat::Unknown.is_canonical());
    }
}
