//! Client for the hosted text-generation endpoint.
//!
//! One call per request, no retries.  Every outcome, including transport
//! failures and timeouts, is folded into an [`UpstreamResult`] so the
//! mediator can apply its fallback rule without catching errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::config::{UpstreamApi, UpstreamSettings};
use crate::error::{OracleError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Reason attached to a 200 response whose text is too short to use.
pub const EMPTY_RESPONSE: &str = "empty response";

/// Reason attached when no credential is configured.
pub const NOT_CONFIGURED: &str = "upstream not configured";

/// Longest slice of an error body kept in a [`UpstreamResult::RemoteError`].
const MAX_ERROR_BODY_CHARS: usize = 200;

const USER_AGENT: &str = concat!("oracle-bot/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single generation request, built per call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    /// Sampling temperature, always within `[0, 1]`.
    pub temperature: f64,
}

/// Classified outcome of one upstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResult {
    /// Usable generated text, already stripped and trimmed.
    Success { text: String },
    /// The provider answered but not with usable text.  `status_code` is
    /// `None` when the call was never made.
    RemoteError {
        status_code: Option<u16>,
        message: String,
    },
    /// Connection, DNS, or TLS failure.
    TransportError { message: String },
    /// The call did not finish within its deadline.
    Timeout,
}

impl UpstreamResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::RemoteError { .. } => "remote_error",
            Self::TransportError { .. } => "transport_error",
            Self::Timeout => "timeout",
        }
    }

    /// Convert into a `Result`, mapping every failure to
    /// [`OracleError::UpstreamUnavailable`].
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Success { text } => Ok(text),
            Self::RemoteError {
                status_code: Some(code),
                message,
            } => Err(OracleError::UpstreamUnavailable {
                reason: format!("status {code}: {message}"),
            }),
            Self::RemoteError {
                status_code: None,
                message,
            } => Err(OracleError::UpstreamUnavailable { reason: message }),
            Self::TransportError { message } => Err(OracleError::UpstreamUnavailable {
                reason: format!("transport: {message}"),
            }),
            Self::Timeout => Err(OracleError::UpstreamUnavailable {
                reason: "timed out".into(),
            }),
        }
    }
}

/// Anything that can turn a question into an [`UpstreamResult`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Perform one bounded call for `question`.
    async fn generate(&self, question: &str, timeout: Duration) -> UpstreamResult;

    /// Whether a credential is available.  Unconfigured generators still
    /// answer `generate`, with an immediate `RemoteError`.
    fn is_configured(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the configured provider.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    settings: UpstreamSettings,
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Create a client.  A missing credential is not an error; the client
    /// then short-circuits every call.
    pub fn new(settings: UpstreamSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        if settings.api_key.is_none() {
            tracing::warn!("no upstream credential configured, answering from the catalog only");
        }

        Ok(Self { settings, http })
    }

    /// Embed `question` into the oracle prompt template.
    pub fn build_request(&self, question: &str) -> UpstreamRequest {
        UpstreamRequest {
            prompt: render_prompt(question, self.settings.max_words),
            max_output_tokens: self.settings.max_output_tokens,
            temperature: self.settings.temperature.clamp(0.0, 1.0),
        }
    }

    /// JSON body for the configured wire format.
    fn request_body(&self, request: &UpstreamRequest) -> Value {
        match self.settings.api {
            UpstreamApi::HuggingFace => json!({
                "inputs": request.prompt,
                "parameters": {
                    "max_new_tokens": request.max_output_tokens,
                    "temperature": request.temperature,
                    "return_full_text": false,
                },
            }),
            UpstreamApi::OpenAiChat => json!({
                "model": self.settings.model,
                "messages": [{ "role": "user", "content": request.prompt }],
                "max_tokens": request.max_output_tokens,
                "temperature": request.temperature,
            }),
        }
    }

    async fn call(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> UpstreamResult {
        let body = self.request_body(request);

        tracing::debug!(
            endpoint = %self.settings.endpoint,
            api = ?self.settings.api,
            "sending upstream request"
        );

        let resp = match self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => return classify_transport_error(&e),
        };

        classify_response(
            self.settings.api,
            status,
            &text,
            &request.prompt,
            self.settings.min_answer_chars,
        )
    }
}

#[async_trait]
impl TextGenerator for UpstreamClient {
    async fn generate(&self, question: &str, timeout: Duration) -> UpstreamResult {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return UpstreamResult::RemoteError {
                status_code: None,
                message: NOT_CONFIGURED.into(),
            };
        };

        let request = self.build_request(question);
        match tokio::time::timeout(timeout, self.call(api_key, &request, timeout)).await {
            Ok(result) => result,
            Err(_) => UpstreamResult::Timeout,
        }
    }

    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Classification helpers
// ---------------------------------------------------------------------------

/// The fixed oracle instruction wrapped around every question.
pub fn render_prompt(question: &str, max_words: usize) -> String {
    format!(
        "You are an oracle; answer briefly and mystically in at most {max_words} words: {}",
        question.trim()
    )
}

fn classify_transport_error(err: &reqwest::Error) -> UpstreamResult {
    if err.is_timeout() {
        UpstreamResult::Timeout
    } else {
        UpstreamResult::TransportError {
            message: err.to_string(),
        }
    }
}

/// Classify a completed HTTP exchange.
pub fn classify_response(
    api: UpstreamApi,
    status: StatusCode,
    body: &str,
    prompt: &str,
    min_answer_chars: usize,
) -> UpstreamResult {
    if status != StatusCode::OK {
        return UpstreamResult::RemoteError {
            status_code: Some(status.as_u16()),
            message: truncate_chars(body, MAX_ERROR_BODY_CHARS),
        };
    }

    let payload: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return UpstreamResult::RemoteError {
                status_code: Some(status.as_u16()),
                message: format!("malformed payload: {e}"),
            };
        }
    };

    let Some(raw) = extract_generated_text(api, &payload) else {
        return UpstreamResult::RemoteError {
            status_code: Some(status.as_u16()),
            message: "unexpected payload shape".into(),
        };
    };

    match normalize_answer(raw, prompt, min_answer_chars) {
        Some(text) => UpstreamResult::Success { text },
        None => UpstreamResult::RemoteError {
            status_code: Some(status.as_u16()),
            message: EMPTY_RESPONSE.into(),
        },
    }
}

/// Pull the generated text out of a provider payload.
pub fn extract_generated_text(api: UpstreamApi, payload: &Value) -> Option<&str> {
    match api {
        UpstreamApi::HuggingFace => {
            let item = match payload {
                Value::Array(items) => items.first()?,
                Value::Object(_) => payload,
                _ => return None,
            };
            item.get("generated_text")?.as_str()
        }
        UpstreamApi::OpenAiChat => payload.pointer("/choices/0/message/content")?.as_str(),
    }
}

/// Strip an echoed prompt, trim, and reject answers that are too short.
pub fn normalize_answer(raw: &str, prompt: &str, min_answer_chars: usize) -> Option<String> {
    let trimmed = raw.trim_start();
    let without_echo = trimmed.strip_prefix(prompt.trim()).unwrap_or(trimmed);
    let text = without_echo.trim();
    if text.chars().count() < min_answer_chars {
        return None;
    }
    Some(text.to_owned())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
