//! Core data types shared across services
//!
//! `ProposedMetadata` is the inference result for one file. The inference
//! service is loose about shapes (a performer list may arrive as a bare
//! string, a track number as a JSON number), so everything is normalized
//! here at the deserialization boundary and downstream code never branches
//! on shape.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Metadata proposed by the inference oracle for a single file
///
/// Every field is optional. `None` means "uncertain" and is never replaced
/// by a placeholder. Blank strings are normalized to `None`, blank list
/// entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedMetadata {
    /// Full composer name, "Last, First"
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,

    /// Composer surname only
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub composer_short: Option<String>,

    /// Full work title including catalog number
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,

    /// Short, searchable work name ("Moonlight Sonata")
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub work_short: Option<String>,

    /// Older responses name the work `work_title`
    #[serde(
        default,
        rename = "work_title",
        deserialize_with = "de_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_work: Option<String>,

    /// Movement with number ("I. Adagio sostenuto")
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub movement: Option<String>,

    /// Bare movement name ("Adagio sostenuto")
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub movement_name: Option<String>,

    /// Conductors and performers, in billing order
    #[serde(default, deserialize_with = "de_text_list", skip_serializing_if = "Vec::is_empty")]
    pub performers: Vec<String>,

    /// Orchestra or ensemble
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub orchestra: Option<String>,

    /// Soloists, in billing order
    #[serde(default, deserialize_with = "de_text_list", skip_serializing_if = "Vec::is_empty")]
    pub soloists: Vec<String>,

    /// Recording date or year
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Disc number
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub disc: Option<String>,

    /// Track number
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,

    /// Suggested filename stem (no extension)
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub suggested_filename: Option<String>,
}

impl ProposedMetadata {
    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        self.populated_fields().is_empty()
    }

    /// Value for the album/work role: work, then work_short, then legacy work
    pub fn album_value(&self) -> Option<&str> {
        self.work
            .as_deref()
            .or(self.work_short.as_deref())
            .or(self.legacy_work.as_deref())
    }

    /// Search-oriented title
    ///
    /// "{work_short} - {movement}" when both are known, else whichever is
    /// known, else the album value.
    pub fn title_value(&self) -> Option<String> {
        match (self.work_short.as_deref(), self.movement.as_deref()) {
            (Some(work), Some(movement)) => Some(format!("{} - {}", work, movement)),
            (Some(work), None) => Some(work.to_string()),
            (None, Some(movement)) => Some(movement.to_string()),
            (None, None) => self.album_value().map(str::to_string),
        }
    }

    /// Work name used for keyword matching: the short name when known
    pub fn work_keyword_source(&self) -> Option<&str> {
        self.work_short
            .as_deref()
            .or(self.work.as_deref())
            .or(self.legacy_work.as_deref())
    }

    /// Performers joined for the single-valued artist fields
    pub fn performers_joined(&self) -> Option<String> {
        if self.performers.is_empty() {
            None
        } else {
            Some(self.performers.join(", "))
        }
    }

    /// (name, value) pairs for every populated field, for reports
    pub fn populated_fields(&self) -> Vec<(&'static str, String)> {
        let scalars = [
            ("composer", &self.composer),
            ("composer_short", &self.composer_short),
            ("work", &self.work),
            ("work_short", &self.work_short),
            ("work_title", &self.legacy_work),
            ("movement", &self.movement),
            ("movement_name", &self.movement_name),
            ("orchestra", &self.orchestra),
            ("date", &self.date),
            ("disc", &self.disc),
            ("track", &self.track),
            ("suggested_filename", &self.suggested_filename),
        ];

        let mut fields: Vec<(&'static str, String)> = scalars
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.clone())))
            .collect();

        if !self.performers.is_empty() {
            fields.push(("performers", self.performers.join("; ")));
        }
        if !self.soloists.is_empty() {
            fields.push(("soloists", self.soloists.join("; ")));
        }
        fields
    }
}

/// Scalar JSON value to trimmed text; blank or null becomes `None`
fn value_to_text(value: Value) -> Result<Option<String>, String> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => return Err(format!("expected a string or number, found {}", other)),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn de_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_text(value).map_err(de::Error::custom)
}

fn de_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(text) = value_to_text(item).map_err(de::Error::custom)? {
                    out.push(text);
                }
            }
            Ok(out)
        }
        scalar => Ok(value_to_text(scalar)
            .map_err(de::Error::custom)?
            .into_iter()
            .collect()),
    }
}

/// Logical metadata roles checked for completeness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Composer,
    Work,
    Title,
    Artist,
}

impl Role {
    /// All roles in reporting order
    pub const ALL: [Role; 4] = [Role::Composer, Role::Work, Role::Title, Role::Artist];

    /// Lower-case role name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Composer => "composer",
            Role::Work => "work",
            Role::Title => "title",
            Role::Artist => "artist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage at which a file failed
///
/// Every stage is non-fatal to the run; the walker moves on to the next file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Encoder executable not installed
    CapabilityMissing,
    /// Bad signature or unparsable container, and conversion failed
    FormatInvalid,
    /// Network or parse error, or a semantically empty proposal
    InferenceFailure,
    /// Tag commit or rename failed
    WriteFailure,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::CapabilityMissing => "capability-missing",
            FailureStage::FormatInvalid => "format-invalid",
            FailureStage::InferenceFailure => "inference-failure",
            FailureStage::WriteFailure => "write-failure",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performers_accept_string_or_list() {
        let single: ProposedMetadata =
            serde_json::from_str(r#"{"performers": "Maurizio Pollini"}"#).unwrap();
        assert_eq!(single.performers, vec!["Maurizio Pollini".to_string()]);

        let many: ProposedMetadata =
            serde_json::from_str(r#"{"performers": ["Karajan", " ", null, "Mutter"]}"#).unwrap();
        assert_eq!(many.performers, vec!["Karajan".to_string(), "Mutter".to_string()]);

        let none: ProposedMetadata = serde_json::from_str(r#"{"soloists": null}"#).unwrap();
        assert!(none.soloists.is_empty());
    }

    #[test]
    fn test_numbers_become_strings_and_blanks_become_none() {
        let meta: ProposedMetadata =
            serde_json::from_str(r#"{"track": 3, "disc": "  ", "date": 1962, "composer": null}"#)
                .unwrap();
        assert_eq!(meta.track.as_deref(), Some("3"));
        assert_eq!(meta.disc, None);
        assert_eq!(meta.date.as_deref(), Some("1962"));
        assert_eq!(meta.composer, None);
    }

    #[test]
    fn test_unknown_fields_ignored_and_object_required() {
        let meta: ProposedMetadata =
            serde_json::from_str(r#"{"confidence": 0.9, "work": "Symphony No. 5"}"#).unwrap();
        assert_eq!(meta.work.as_deref(), Some("Symphony No. 5"));

        assert!(serde_json::from_str::<ProposedMetadata>("[1, 2]").is_err());
        assert!(serde_json::from_str::<ProposedMetadata>(r#"{"work": {"a": 1}}"#).is_err());
    }

    #[test]
    fn test_all_null_is_empty() {
        let meta: ProposedMetadata = serde_json::from_str(
            r#"{"composer": null, "work": "", "performers": [], "track": null}"#,
        )
        .unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn test_title_derivation_priority() {
        let mut meta = ProposedMetadata {
            work: Some("Piano Sonata No. 14 in C-sharp minor, Op. 27 No. 2".into()),
            work_short: Some("Moonlight Sonata".into()),
            movement: Some("I. Adagio sostenuto".into()),
            ..Default::default()
        };
        assert_eq!(
            meta.title_value().as_deref(),
            Some("Moonlight Sonata - I. Adagio sostenuto")
        );

        meta.movement = None;
        assert_eq!(meta.title_value().as_deref(), Some("Moonlight Sonata"));

        meta.work_short = None;
        assert_eq!(
            meta.title_value().as_deref(),
            Some("Piano Sonata No. 14 in C-sharp minor, Op. 27 No. 2")
        );

        let movement_only = ProposedMetadata {
            movement: Some("II. Allegretto".into()),
            work: Some("Sonata".into()),
            ..Default::default()
        };
        assert_eq!(movement_only.title_value().as_deref(), Some("II. Allegretto"));
    }

    #[test]
    fn test_album_fallback_chain_uses_legacy_work() {
        let meta: ProposedMetadata =
            serde_json::from_str(r#"{"work_title": "Goldberg Variations, BWV 988"}"#).unwrap();
        assert_eq!(meta.album_value(), Some("Goldberg Variations, BWV 988"));
        assert_eq!(meta.work_keyword_source(), Some("Goldberg Variations, BWV 988"));
    }
}
