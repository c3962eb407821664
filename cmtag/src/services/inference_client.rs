//! Metadata inference client
//!
//! The pipeline only sees the [`MetadataOracle`] trait. [`OpenRouterClient`]
//! implements it over the OpenRouter chat-completions API.

use crate::services::tag_store::{keys, TagFields};
use crate::types::ProposedMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("cmtag/", env!("CARGO_PKG_VERSION"));

/// Maximum sibling filenames included in a prompt
pub const MAX_CONTEXT_FILES: usize = 10;

/// Response fields requested from the model
const RESPONSE_SCHEMA: &str = r#"{
    "composer": "Last name, First name",
    "composer_short": "Last name only",
    "work": "Full work title including catalog number",
    "work_short": "Common short name of the work, e.g. Moonlight Sonata",
    "movement": "Movement number and name if applicable, e.g. I. Adagio sostenuto",
    "movement_name": "Movement name without number",
    "performers": ["Conductor/Performer names"],
    "orchestra": "Orchestra/Ensemble name",
    "soloists": ["Soloist names"],
    "date": "Recording year if present",
    "disc": "Disc number if multi-disc",
    "track": "Track number",
    "suggested_filename": "Track - Composer - Work - Movement - Performer (no extension)"
}"#;

const GUIDELINES: &str = "Guidelines for classical music:
- Composer should be \"Last, First\" format
- Include catalog numbers (Op., K., BWV, etc.) in work title
- Separate movement info if it's part of a larger work
- Identify conductors, orchestras, and soloists";

/// Inference errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid API key")]
    InvalidApiKey,

    /// Response was not a JSON object of the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Everything the oracle is told about one file
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    /// Filename including extension
    pub filename: &'a str,
    /// Other audio filenames in the same folder
    pub context: &'a [String],
    /// Current tags (audit only)
    pub existing: Option<&'a TagFields>,
}

/// Source of proposed metadata
#[async_trait]
pub trait MetadataOracle: Send + Sync {
    /// Propose metadata for one file
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<ProposedMetadata, InferenceError>;
}

/// Connection settings for [`OpenRouterClient`]
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub model: String,
    pub api_base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter chat-completions client
pub struct OpenRouterClient {
    http_client: reqwest::Client,
    settings: OracleSettings,
}

impl OpenRouterClient {
    pub fn new(settings: OracleSettings) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Model name requests are sent with
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl MetadataOracle for OpenRouterClient {
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<ProposedMetadata, InferenceError> {
        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        tracing::debug!(
            filename = request.filename,
            model = %self.settings.model,
            context_files = request.context.len(),
            "Requesting metadata"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(InferenceError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::Parse("Response has no message content".to_string()))?;

        let proposal = parse_response(&content)?;

        tracing::debug!(
            filename = request.filename,
            fields = proposal.populated_fields().len(),
            "Received metadata"
        );

        Ok(proposal)
    }
}

/// Prompt text for one request
pub fn build_prompt(request: &InferenceRequest<'_>) -> String {
    let mut prompt = format!(
        "Analyze this classical music filename and extract metadata as JSON.\n\n\
         Filename: {}\n\n\
         Return ONLY valid JSON with these fields (use null if uncertain):\n{}\n\n{}",
        request.filename, RESPONSE_SCHEMA, GUIDELINES
    );

    if let Some(existing) = request.existing {
        let summary = existing_tag_summary(existing);
        if !summary.is_empty() {
            prompt.push_str("\n\nCurrent tags (correct them only if they are wrong):\n");
            prompt.push_str(&summary);
        }
    }

    if !request.context.is_empty() {
        let siblings: Vec<&str> = request
            .context
            .iter()
            .take(MAX_CONTEXT_FILES)
            .map(String::as_str)
            .collect();
        prompt.push_str("\n\nOther files in the same folder: ");
        prompt.push_str(&siblings.join(", "));
    }

    prompt
}

fn existing_tag_summary(existing: &TagFields) -> String {
    [
        keys::COMPOSER,
        keys::ALBUM,
        keys::TITLE,
        keys::MOVEMENT,
        keys::ARTIST,
        keys::ORCHESTRA,
        keys::DATE,
        keys::TRACKNUMBER,
    ]
    .iter()
    .filter_map(|key| existing.first(key).map(|value| format!("- {}: {}", key, value)))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Strip a markdown code fence around the model output, if any
///
/// Handles ```json ... ``` anywhere in the text and a bare ``` ... ```
/// wrapping the whole text.
pub fn unwrap_code_fence(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    if text.len() >= 6 && text.starts_with("```") && text.ends_with("```") {
        let inner = text.trim_matches('`').trim();
        return inner.strip_prefix("json").map(str::trim).unwrap_or(inner);
    }

    text
}

/// Parse model output into a proposal; never yields a partial object
pub fn parse_response(text: &str) -> Result<ProposedMetadata, InferenceError> {
    serde_json::from_str(unwrap_code_fence(text)).map_err(|e| InferenceError::Parse(e.to_string()))
}
