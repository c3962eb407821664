//! Reconciliation of current tags against a proposal
//!
//! Decides, per file, whether a proposal warrants rewriting tags and/or
//! renaming the file.
//!
//! The oracle is non-deterministic between calls, so the audit policy does
//! not compare for equality. A current value is accepted when it already
//! covers a loose majority of the proposal's keywords; repeated audits of a
//! stable library then converge to zero changes at the cost of occasionally
//! missing a real inconsistency.

use crate::services::safe_renamer::sanitize_stem;
use crate::services::tag_store::{keys, TagFields};
use crate::types::ProposedMetadata;
use thiserror::Error;

/// Which decision rules apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// File lacks required metadata: accept any non-empty proposal wholesale
    Populate,
    /// File already carries metadata: flag only inadequate fields
    Audit,
}

/// Tunable keyword-coverage parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyParams {
    /// Words must be strictly longer than this (in characters) to be keywords
    pub min_keyword_len: usize,
    /// Fraction of keywords that must appear in the current value
    pub coverage_threshold: f64,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            min_keyword_len: 3,
            coverage_threshold: 0.5,
        }
    }
}

/// Reconciliation errors
///
/// Both variants count as processing failures, never as skips.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Every proposal field is absent
    #[error("Proposal is empty")]
    EmptyProposal,

    /// Proposal has values, but none that map to a tag field
    #[error("Proposal has no fields matching a known role")]
    NoKnownRoles,
}

/// One field change, for human review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

/// Old stem to new stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInstruction {
    pub from_stem: String,
    pub to_stem: String,
}

/// Outcome of comparing current state against a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationDecision {
    pub changes_needed: bool,
    pub diffs: Vec<FieldDiff>,
    pub rename: Option<RenameInstruction>,
}

/// Lower-cased words longer than `min_len` characters, deduplicated in order
///
/// Surrounding punctuation is trimmed so "Sonata," matches "sonata".
pub fn extract_keywords(text: &str, min_len: usize) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.chars().count() > min_len && !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// Keyword-coverage acceptance test
///
/// Adequate when `current` is non-blank and contains (case-insensitively)
/// at least `ceil(n * threshold)` of the `n` keywords. With no keywords to
/// check, any non-blank value is adequate. A NaN threshold demands every
/// keyword.
pub fn is_already_adequate(current: &str, keywords: &[String], threshold: f64) -> bool {
    let current = current.trim();
    if current.is_empty() {
        return false;
    }
    if keywords.is_empty() {
        return true;
    }

    let haystack = current.to_lowercase();
    let found = keywords
        .iter()
        .filter(|k| haystack.contains(k.to_lowercase().as_str()))
        .count();
    let threshold = if threshold.is_nan() {
        1.0
    } else {
        threshold.clamp(0.0, 1.0)
    };
    let required = (keywords.len() as f64 * threshold).ceil() as usize;

    found >= required
}

/// Decision engine
pub struct ReconciliationEngine {
    params: PolicyParams,
}

impl ReconciliationEngine {
    /// Create new engine with the given policy parameters
    pub fn new(params: PolicyParams) -> Self {
        Self { params }
    }

    /// Policy parameters in use
    pub fn params(&self) -> PolicyParams {
        self.params
    }

    /// Compare `current` tags and filename stem against `proposal`
    pub fn decide(
        &self,
        policy: Policy,
        current: Option<&TagFields>,
        current_stem: &str,
        proposal: &ProposedMetadata,
    ) -> Result<ReconciliationDecision, ReconcileError> {
        if proposal.is_empty() {
            return Err(ReconcileError::EmptyProposal);
        }

        let proposed = TagFields::build(proposal);
        if proposed.is_empty() {
            return Err(ReconcileError::NoKnownRoles);
        }

        let decision = match policy {
            Policy::Populate => self.populate(current, current_stem, proposal, &proposed),
            Policy::Audit => self.audit(current, current_stem, proposal, &proposed),
        };

        tracing::debug!(
            ?policy,
            changes_needed = decision.changes_needed,
            diffs = decision.diffs.len(),
            rename = decision.rename.is_some(),
            "Reconciled proposal"
        );

        Ok(decision)
    }

    /// Every derived field is a change; nothing present is worth comparing
    fn populate(
        &self,
        current: Option<&TagFields>,
        current_stem: &str,
        proposal: &ProposedMetadata,
        proposed: &TagFields,
    ) -> ReconciliationDecision {
        let mut diffs: Vec<FieldDiff> = Vec::new();
        for (field, value) in proposed.entries() {
            match diffs.iter_mut().find(|d| d.field == field) {
                Some(existing) => {
                    existing.new.push_str("; ");
                    existing.new.push_str(value);
                }
                None => diffs.push(FieldDiff {
                    field: field.to_string(),
                    old: current.and_then(|c| c.first(field)).map(str::to_string),
                    new: value.to_string(),
                }),
            }
        }

        let rename = proposal
            .suggested_filename
            .as_deref()
            .and_then(|suggested| rename_instruction(current_stem, suggested));

        ReconciliationDecision {
            changes_needed: true,
            diffs,
            rename,
        }
    }

    /// Flag only fields whose current value does not already cover the proposal
    fn audit(
        &self,
        current: Option<&TagFields>,
        current_stem: &str,
        proposal: &ProposedMetadata,
        proposed: &TagFields,
    ) -> ReconciliationDecision {
        let threshold = self.params.coverage_threshold;
        let work_keywords = proposal
            .work_keyword_source()
            .map(|work| extract_keywords(work, self.params.min_keyword_len))
            .unwrap_or_default();
        let current_value = |key: &str| -> Option<String> {
            current.and_then(|c| c.first(key)).map(str::to_string)
        };

        let mut diffs = Vec::new();

        if let Some(new_title) = proposed.first(keys::TITLE) {
            let old = current_value(keys::TITLE);
            let old_text = old.as_deref().unwrap_or("");
            // A title this proposal would write is always adequate, even when
            // it is built from the movement alone.
            let matches_proposal = is_substring_of(new_title, old_text);
            if !matches_proposal && !is_already_adequate(old_text, &work_keywords, threshold) {
                diffs.push(FieldDiff {
                    field: keys::TITLE.to_string(),
                    old,
                    new: new_title.to_string(),
                });
            }
        }

        if let Some(new_composer) = proposed.first(keys::COMPOSER) {
            let old = current_value(keys::COMPOSER);
            let old_text = old.as_deref().unwrap_or("");
            let composer_keywords = extract_keywords(new_composer, self.params.min_keyword_len);

            // "Beethoven" vs "Beethoven, Ludwig van". Also hides a wrong tag
            // that happens to be a substring of the proposal.
            let exempt = is_substring_of(old_text, new_composer);

            if !exempt && !is_already_adequate(old_text, &composer_keywords, threshold) {
                diffs.push(FieldDiff {
                    field: keys::COMPOSER.to_string(),
                    old,
                    new: new_composer.to_string(),
                });
            }
        }

        let rename = proposal
            .suggested_filename
            .as_deref()
            .filter(|_| !is_already_adequate(current_stem, &work_keywords, threshold))
            .and_then(|suggested| rename_instruction(current_stem, suggested));

        ReconciliationDecision {
            changes_needed: !diffs.is_empty() || rename.is_some(),
            diffs,
            rename,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(PolicyParams::default())
    }
}

/// Non-blank `needle` contained case-insensitively in `haystack`
fn is_substring_of(needle: &str, haystack: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Rename instruction when the sanitized suggestion differs from the current stem
fn rename_instruction(current_stem: &str, suggested: &str) -> Option<RenameInstruction> {
    let to_stem = sanitize_stem(suggested);
    if to_stem.is_empty() || to_stem == current_stem {
        return None;
    }
    if is_collision_variant(current_stem, &to_stem) {
        return None;
    }
    Some(RenameInstruction {
        from_stem: current_stem.to_string(),
        to_stem,
    })
}

/// `current` is `target` plus the renamer's " (N)" collision suffix
fn is_collision_variant(current: &str, target: &str) -> bool {
    current
        .strip_prefix(target)
        .and_then(|rest| rest.strip_prefix(" ("))
        .and_then(|rest| rest.strip_suffix(')'))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
