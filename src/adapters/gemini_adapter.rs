//! Gemini `generateContent` client implementing [`AnalysisPort`].

use crate::domain::error::{PulseError, ServiceError, ServiceErrorKind};
use crate::ports::analysis_port::AnalysisPort;
use crate::ports::config_port::ConfigPort;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_MAX_OUTPUT_TOKENS: i64 = 8192;
pub const DEFAULT_TIMEOUT_SECS: i64 = 60;

const TOP_P: f64 = 0.8;
const TOP_K: u32 = 40;

#[derive(Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiConfig {
    /// Reads `[gemini]`; the API key comes from the environment variable
    /// named by `api_key_env`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PulseError> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    pub fn from_config_with(
        config: &dyn ConfigPort,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PulseError> {
        let key_env = config
            .get_string("gemini", "api_key_env")
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = lookup(&key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PulseError::Configuration {
                reason: format!("environment variable {} is not set", key_env),
            })?;

        Ok(Self {
            api_key,
            model: config
                .get_string("gemini", "model")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: config
                .get_string("gemini", "endpoint")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            temperature: config.get_double("gemini", "temperature", DEFAULT_TEMPERATURE),
            max_output_tokens: config
                .get_int("gemini", "max_output_tokens", DEFAULT_MAX_OUTPUT_TOKENS)
                .clamp(1, i64::from(u32::MAX)) as u32,
            timeout: Duration::from_secs(
                config
                    .get_int("gemini", "timeout_secs", DEFAULT_TIMEOUT_SECS)
                    .max(1) as u64,
            ),
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Maps a non-success HTTP status onto a retry classification.
pub fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let kind = match status.as_u16() {
        429 => ServiceErrorKind::RateLimited,
        401 | 403 => ServiceErrorKind::Unauthorized,
        400 => ServiceErrorKind::BadRequest,
        408 => ServiceErrorKind::Timeout,
        500..=599 => ServiceErrorKind::Unavailable,
        _ => ServiceErrorKind::Rejected,
    };
    let snippet: String = body.chars().take(200).collect();
    ServiceError::new(kind, format!("HTTP {}: {}", status, snippet))
}

fn classify_transport(err: &reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::new(ServiceErrorKind::Timeout, err.to_string())
    } else {
        ServiceError::new(ServiceErrorKind::Network, err.to_string())
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ServiceError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ServiceError::new(ServiceErrorKind::Rejected, reason));
    };
    Ok(candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default())
}

pub struct GeminiAdapter {
    client: Client,
    config: GeminiConfig,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> Result<Self, PulseError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PulseError::Configuration {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl AnalysisPort for GeminiAdapter {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        debug!(model = %self.config.model, chars = prompt.len(), "sending generateContent request");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ServiceError::new(ServiceErrorKind::Rejected, format!("invalid response body: {}", e)))?;
        extract_text(parsed)
    }
}
