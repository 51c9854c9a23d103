//! The reasoning oracle seam.
//!
//! The loop treats generation as an opaque request/response call: a task
//! prompt goes in, either a usable candidate or an explicit decline comes
//! out. Nothing about the oracle's internals leaks into the controller, and
//! identical prompts may legitimately produce different candidates.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use tracing::debug;

use parsergen_core::config::OracleConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Outcome of one generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proposal {
    /// Source text for the extraction function, ready for the sandbox.
    Candidate(String),
    /// The oracle explicitly refused to continue. Terminal for the run;
    /// never consumed as a candidate.
    Decline(String),
}

/// Infrastructure failures of the oracle itself. Rate-limit and auth
/// problems belong here, not in the retry budget.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle authentication/quota failure: {0}")]
    Environment(String),
    #[error("oracle request failed: {0}")]
    Transport(String),
    #[error("oracle returned an unusable reply: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CodeOracle: Send + Sync {
    async fn propose(&self, prompt: &str) -> Result<Proposal, OracleError>;
}

/// Gemini `generateContent` client.
pub struct GeminiOracle {
    client: reqwest::Client,
    config: OracleConfig,
    base_url: String,
}

impl GeminiOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| OracleError::Environment(format!("could not build http client: {err}")))?;

        let base_url =
            config.base_url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string());

        Ok(Self { client, config, base_url })
    }

    fn api_key(&self) -> Result<&str, OracleError> {
        self.config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| OracleError::Environment("oracle api key is not configured".to_string()))
    }
}

#[async_trait]
impl CodeOracle for GeminiOracle {
    async fn propose(&self, prompt: &str) -> Result<Proposal, OracleError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.config.model);
        let request = GenerateContentRequest {
            contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OracleError::Environment(format!("authentication rejected ({status})")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::Environment("rate limited by the oracle".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Transport(format!("status {status}: {body}")));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| OracleError::Malformed(err.to_string()))?;

        if let Some(feedback) = &body.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Ok(Proposal::Decline(format!("prompt blocked: {reason}")));
            }
        }

        let Some(candidate) = body.candidates.as_ref().and_then(|list| list.first()) else {
            return Ok(Proposal::Decline("oracle returned no candidates".to_string()));
        };

        if let Some(reason) = &candidate.finish_reason {
            if reason != "STOP" && reason != "MAX_TOKENS" {
                return Ok(Proposal::Decline(format!("generation stopped: {reason}")));
            }
        }

        let text = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| OracleError::Malformed("candidate carried no text part".to_string()))?;

        debug!(
            event_name = "agent.oracle.reply",
            model = %self.config.model,
            reply_bytes = text.len(),
            "oracle produced a candidate"
        );

        Ok(Proposal::Candidate(strip_code_fences(&text)))
    }
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers
/// (Ollama exposes the same surface under `/v1`).
pub struct ChatCompletionsOracle {
    client: reqwest::Client,
    config: OracleConfig,
    base_url: String,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

impl ChatCompletionsOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| OracleError::Environment(format!("could not build http client: {err}")))?;

        let base_url = config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self { client, config, base_url })
    }
}

#[async_trait]
impl CodeOracle for ChatCompletionsOracle {
    async fn propose(&self, prompt: &str) -> Result<Proposal, OracleError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }],
            max_tokens: self.config.max_output_tokens,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = self.config.api_key.as_ref() {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|err| OracleError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OracleError::Environment(format!("authentication rejected ({status})")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::Environment("rate limited by the oracle".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Transport(format!("status {status}: {body}")));
        }

        let body: ChatCompletionsResponse =
            response.json().await.map_err(|err| OracleError::Malformed(err.to_string()))?;

        let Some(choice) = body.choices.first() else {
            return Ok(Proposal::Decline("oracle returned no choices".to_string()));
        };

        if let Some(reason) = &choice.finish_reason {
            if reason == "content_filter" {
                return Ok(Proposal::Decline("reply blocked by content filter".to_string()));
            }
        }

        match &choice.message.content {
            Some(text) if !text.trim().is_empty() => {
                Ok(Proposal::Candidate(strip_code_fences(text)))
            }
            _ => Ok(Proposal::Decline("oracle returned an empty reply".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Oracle replies usually arrive wrapped in markdown fences; unwrap the
/// first fenced block, tolerating a language tag after the opening fence.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let body = match rest.split_once('\n') {
        Some((_lang_tag, body)) => body,
        None => return trimmed.to_string(),
    };

    match body.rfind("```") {
        Some(end) => body[..end].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<ResponseCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}
