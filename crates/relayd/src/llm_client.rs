//! Remote text model client.
//!
//! One call type: system instructions + user prompt in, free-form text out.
//! Both relevance classification and action resolution go through it.
//!
//! Production code uses [`OpenAiClient`]; tests use [`FakeTextModel`] with
//! scripted replies.

use crate::error::ModelError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Longest error body kept in a [`ModelError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// A single completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Vec<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: Vec::new(),
            prompt: prompt.into(),
            max_tokens: 300,
            temperature: 0.2,
        }
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.system.push(text.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait abstraction over the remote text model
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

// ============================================================================
// OpenAI-compatible client (Production)
// ============================================================================

/// Chat-completions client with bearer authentication
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        let mut messages: Vec<Value> = request
            .system
            .iter()
            .map(|text| json!({"role": "system", "content": text}))
            .collect();
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl TextModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let payload = self.build_payload(&request);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY).to_string(),
            });
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|e| ModelError::MalformedEnvelope(format!("body is not JSON: {}", e)))?;
        let content = extract_content(&envelope)?;
        debug!("Text model returned {} chars", content.len());
        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions envelope
pub fn extract_content(envelope: &Value) -> Result<String, ModelError> {
    let choice = envelope
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ModelError::MalformedEnvelope("no choices".to_string()))?;

    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ModelError::MalformedEnvelope("no message content".to_string()))
}

/// Remove a Markdown code fence (```` ``` ```` or ```` ```json ````) around model output
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Cut `text` to at most `max` bytes on a char boundary
pub fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Fake Text Model (Testing)
// ============================================================================

#[derive(Debug, Clone)]
struct FakeRule {
    marker: String,
    reply: Result<String, ModelError>,
    delay: Option<Duration>,
}

/// Scripted text model for deterministic testing
///
/// Each rule matches when its marker appears in the joined system
/// instructions; the first matching rule wins.
///
/// ```rust,ignore
/// let fake = FakeTextModel::builder()
///     .respond_when("relevance", r#"[{"service": "Ticketing", "applicability": 95}]"#)
///     .build();
/// ```
pub struct FakeTextModel {
    rules: Vec<FakeRule>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl FakeTextModel {
    pub fn builder() -> FakeTextModelBuilder {
        FakeTextModelBuilder::default()
    }

    /// A fake that answers every call with `text`
    pub fn always(text: impl Into<String>) -> Self {
        Self::builder().respond_when("", text).build()
    }

    /// A fake that fails every call with `error`
    pub fn always_error(error: ModelError) -> Self {
        Self::builder().fail_when("", error).build()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of calls whose system instructions contained `marker`
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.system.join("\n").contains(marker))
            .count()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TextModel for FakeTextModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let joined = request.system.join("\n");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let rule = self
            .rules
            .iter()
            .find(|r| joined.contains(&r.marker))
            .cloned();

        match rule {
            Some(rule) => {
                if let Some(delay) = rule.delay {
                    tokio::time::sleep(delay).await;
                }
                rule.reply
            }
            None => Err(ModelError::Transport("no scripted reply".to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeTextModelBuilder {
    rules: Vec<FakeRule>,
}

impl FakeTextModelBuilder {
    pub fn respond_when(mut self, marker: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push(FakeRule {
            marker: marker.into(),
            reply: Ok(text.into()),
            delay: None,
        });
        self
    }

    pub fn fail_when(mut self, marker: impl Into<String>, error: ModelError) -> Self {
        self.rules.push(FakeRule {
            marker: marker.into(),
            reply: Err(error),
            delay: None,
        });
        self
    }

    /// Delay the most recently added rule
    pub fn delayed(mut self, delay: Duration) -> Self {
        if let Some(rule) = self.rules.last_mut() {
            rule.delay = Some(delay);
        }
        self
    }

    pub fn build(self) -> FakeTextModel {
        FakeTextModel {
            rules: self.rules,
            calls: Mutex::new(Vec::new()),
        }
    }
}
