//! FLAC tag store
//!
//! Reads and writes the Vorbis comment field set of the canonical container
//! using lofty, and embeds front-cover artwork as a FLAC PICTURE block.
//!
//! Writes are full replacements: every prior comment is dropped and the
//! proposal is written from scratch. The vendor string, audio frames and
//! embedded pictures are preserved.

use crate::services::format_sniffer::{self, AudioFormat};
use crate::types::{ProposedMetadata, Role};
use lofty::config::{ParseOptions, ParsingMode, WriteOptions};
use lofty::file::AudioFile;
use lofty::flac::FlacFile;
use lofty::ogg::{OggPictureStorage, VorbisComments};
use lofty::picture::{Picture, PictureInformation, PictureType};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Physical Vorbis comment keys
pub mod keys {
    pub const COMPOSER: &str = "COMPOSER";
    pub const ALBUM: &str = "ALBUM";
    pub const WORK: &str = "WORK";
    pub const TITLE: &str = "TITLE";
    pub const MOVEMENT: &str = "MOVEMENT";
    pub const ARTIST: &str = "ARTIST";
    pub const ALBUMARTIST: &str = "ALBUMARTIST";
    pub const ORCHESTRA: &str = "ORCHESTRA";
    pub const ENSEMBLE: &str = "ENSEMBLE";
    pub const PERFORMER: &str = "PERFORMER";
    pub const DATE: &str = "DATE";
    pub const DISCNUMBER: &str = "DISCNUMBER";
    pub const TRACKNUMBER: &str = "TRACKNUMBER";
}

/// Physical fields backing each logical role, in lookup order
const ROLE_FIELDS: [(Role, &[&str]); 4] = [
    (Role::Composer, &[keys::COMPOSER]),
    (Role::Work, &[keys::ALBUM, keys::WORK]),
    (Role::Title, &[keys::TITLE]),
    (Role::Artist, &[keys::ARTIST, keys::ALBUMARTIST]),
];

/// Tag store errors
#[derive(Debug, Error)]
pub enum TagError {
    /// File header is not the FLAC signature
    #[error("Not a FLAC file: {path} (detected {detected})")]
    NotCanonical { path: PathBuf, detected: AudioFormat },

    /// Signature matched but lofty could not parse the stream
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Commit to disk failed
    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// Artwork could not be decoded or attached
    #[error("Invalid cover art: {0}")]
    CoverArt(String),

    /// Proposal carried nothing writable; refusing to clear existing tags
    #[error("Nothing to write for {0}")]
    NothingToWrite(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upper-cased field name to one-or-many values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    fields: BTreeMap<String, Vec<String>>,
}

/// Result of the required-field check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    /// All roles present
    pub complete: bool,
    /// Roles with no non-blank backing field
    pub missing_roles: Vec<Role>,
}

/// First value per logical role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentFields {
    pub composer: Option<String>,
    pub work: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl TagFields {
    /// Empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect fields from parsed Vorbis comments
    pub fn from_comments(comments: Option<&VorbisComments>) -> Self {
        let mut fields = Self::new();
        if let Some(comments) = comments {
            for (key, value) in comments.items() {
                fields.push(key, value);
            }
        }
        fields
    }

    /// Derive the physical field set from a proposal
    ///
    /// Absent proposal fields are omitted, never written as empty strings.
    pub fn build(proposal: &ProposedMetadata) -> Self {
        let mut fields = Self::new();

        if let Some(composer) = &proposal.composer {
            fields.push(keys::COMPOSER, composer);
        }

        if let Some(album) = proposal.album_value() {
            fields.push(keys::ALBUM, album);
            fields.push(keys::WORK, album);
        }

        if let Some(title) = proposal.title_value() {
            fields.push(keys::TITLE, &title);
        }

        if let Some(movement) = &proposal.movement {
            fields.push(keys::MOVEMENT, movement);
        }

        if let Some(performers) = proposal.performers_joined() {
            fields.push(keys::ARTIST, &performers);
            fields.push(keys::ALBUMARTIST, &performers);
        }

        if let Some(orchestra) = &proposal.orchestra {
            fields.push(keys::ORCHESTRA, orchestra);
            fields.push(keys::ENSEMBLE, orchestra);
        }

        for soloist in &proposal.soloists {
            fields.push(keys::PERFORMER, soloist);
        }

        if let Some(date) = &proposal.date {
            fields.push(keys::DATE, date);
        }
        if let Some(disc) = &proposal.disc {
            fields.push(keys::DISCNUMBER, disc);
        }
        if let Some(track) = &proposal.track {
            fields.push(keys::TRACKNUMBER, track);
        }

        fields
    }

    /// Append a value (keys are case-insensitive)
    pub fn push(&mut self, key: &str, value: &str) {
        self.fields
            .entry(key.to_ascii_uppercase())
            .or_default()
            .push(value.to_string());
    }

    /// All values of a field
    pub fn values(&self, key: &str) -> &[String] {
        self.fields
            .get(&key.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of a field
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// True if the first value of the field is non-blank
    fn has_value(&self, key: &str) -> bool {
        self.first(key).is_some_and(|v| !v.trim().is_empty())
    }

    /// Number of distinct field names
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate (key, value) pairs, multi-value fields yielding one pair per value
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Required-field check over the four logical roles
    ///
    /// A role is satisfied when any backing field has a non-blank first value.
    pub fn completeness(&self) -> Completeness {
        let missing_roles: Vec<Role> = ROLE_FIELDS
            .iter()
            .filter(|(_, backing)| !backing.iter().any(|key| self.has_value(key)))
            .map(|(role, _)| *role)
            .collect();

        Completeness {
            complete: missing_roles.is_empty(),
            missing_roles,
        }
    }

    /// First non-blank value per role
    pub fn current_fields(&self) -> CurrentFields {
        let role_value = |role: Role| -> Option<String> {
            ROLE_FIELDS
                .iter()
                .find(|(r, _)| *r == role)
                .and_then(|(_, backing)| {
                    backing
                        .iter()
                        .filter_map(|key| self.first(key))
                        .find(|v| !v.trim().is_empty())
                })
                .map(str::to_string)
        };

        CurrentFields {
            composer: role_value(Role::Composer),
            work: role_value(Role::Work),
            title: role_value(Role::Title),
            artist: role_value(Role::Artist),
        }
    }
}

/// An open, validated FLAC file and its current tags
pub struct TagHandle {
    path: PathBuf,
    flac: FlacFile,
    fields: TagFields,
}

impl TagHandle {
    /// Path the handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current fields as of the last read or write
    pub fn fields(&self) -> &TagFields {
        &self.fields
    }

    /// Required-field check
    pub fn completeness(&self) -> Completeness {
        self.fields.completeness()
    }

    /// First value per role
    pub fn current_fields(&self) -> CurrentFields {
        self.fields.current_fields()
    }

    /// True if a front-cover picture is embedded
    pub fn has_front_cover(&self) -> bool {
        self.flac
            .pictures()
            .iter()
            .any(|(picture, _)| picture.pic_type() == PictureType::CoverFront)
    }

    /// Re-point the handle after the file was moved
    pub fn relocate(&mut self, new_path: PathBuf) {
        self.path = new_path;
    }
}

/// Summary of a committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Number of comment fields removed before writing
    pub cleared: usize,
    /// Field names written
    pub written: Vec<String>,
}

/// Tag store service
pub struct TagStore {}

impl TagStore {
    /// Create new tag store
    pub fn new() -> Self {
        Self {}
    }

    /// Open and validate a canonical file
    ///
    /// Valid requires both the FLAC signature and a successful lofty parse.
    pub fn read(&self, path: &Path) -> Result<TagHandle, TagError> {
        let detected = format_sniffer::sniff_file(path);
        if !detected.is_canonical() {
            return Err(TagError::NotCanonical {
                path: path.to_path_buf(),
                detected,
            });
        }

        let mut file = File::open(path)?;
        let flac = FlacFile::read_from(&mut file, parse_options()).map_err(|e| TagError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let fields = TagFields::from_comments(flac.vorbis_comments());

        tracing::debug!(
            file = %path.display(),
            fields = fields.len(),
            pictures = flac.pictures().len(),
            "Read FLAC tags"
        );

        Ok(TagHandle {
            path: path.to_path_buf(),
            flac,
            fields,
        })
    }

    /// Replace all comment fields with those derived from `proposal`
    ///
    /// No staging: an interrupted write can leave a partially written tag set.
    pub fn write(
        &self,
        handle: &mut TagHandle,
        proposal: &ProposedMetadata,
    ) -> Result<WriteReport, TagError> {
        let fields = TagFields::build(proposal);
        if fields.is_empty() {
            return Err(TagError::NothingToWrite(handle.path.clone()));
        }

        let mut comments = VorbisComments::default();
        if let Some(existing) = handle.flac.vorbis_comments() {
            comments.set_vendor(existing.vendor().to_string());
        }
        for (key, value) in fields.entries() {
            comments.push(key.to_string(), value.to_string());
        }

        let cleared = handle.fields.entries().count();
        handle.flac.set_vorbis_comments(comments);

        self.commit(handle)?;

        let written = fields.fields.keys().cloned().collect();
        handle.fields = fields;

        tracing::debug!(file = %handle.path.display(), cleared, "Committed tags");
        Ok(WriteReport { cleared, written })
    }

    /// Embed `image` as the front cover, replacing any existing front cover
    pub fn embed_cover_art(&self, handle: &mut TagHandle, image: &[u8]) -> Result<(), TagError> {
        let picture = front_cover_picture(image)?;
        let information = PictureInformation::from_picture(&picture).ok();

        handle.flac.remove_picture_type(PictureType::CoverFront);
        handle
            .flac
            .insert_picture(picture, information)
            .map_err(|e| TagError::CoverArt(e.to_string()))?;

        self.commit(handle)?;
        tracing::debug!(file = %handle.path.display(), "Embedded front cover");
        Ok(())
    }

    /// Save the in-memory FLAC metadata back to its file
    fn commit(&self, handle: &TagHandle) -> Result<(), TagError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&handle.path)?;

        handle
            .flac
            .save_to(&mut file, WriteOptions::default())
            .map_err(|e| TagError::Write {
                path: handle.path.clone(),
                reason: e.to_string(),
            })
    }
}

impl Default for TagStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_options() -> ParseOptions {
    ParseOptions::new()
        .read_properties(false)
        .read_cover_art(true)
        .parsing_mode(ParsingMode::BestAttempt)
}

/// Build a front-cover picture, detecting the MIME type from the bytes
fn front_cover_picture(image: &[u8]) -> Result<Picture, TagError> {
    let mut cursor = std::io::Cursor::new(image);
    let detected =
        Picture::from_reader(&mut cursor).map_err(|e| TagError::CoverArt(e.to_string()))?;

    let mut builder = Picture::unchecked(image.to_vec()).pic_type(PictureType::CoverFront);
    if let Some(mime) = detected.mime_type() {
        builder = builder.mime_type(mime.clone());
    }
    Ok(builder.build())
}
