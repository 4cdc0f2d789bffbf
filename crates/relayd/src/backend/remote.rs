//! Generic remote backend: resolve an action with the text model, then call
//! `<base_url>/<operation><suffix>?<params>&<credential_param>=<credential>`.

use super::{Backend, ExecuteRequest};
use crate::error::BackendError;
use crate::llm_client::{strip_code_fence, truncate, CompletionRequest, TextModel};
use async_trait::async_trait;
use chrono::Utc;
use relay_common::BackendAction;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const RESOLVE_MAX_TOKENS: u32 = 300;
const RESOLVE_TEMPERATURE: f32 = 0.0;

/// Appended to every backend's instructions during action resolution
pub const ACTION_SHAPE: &str = "\
Respond with ONLY a JSON object of the form \
{\"operation\": \"<operation>\", \"parameters\": {\"<name>\": \"<value>\"}}. \
Every parameter value must be a string. Do not add any other text.";

/// Everything that distinguishes one remote backend from another
#[derive(Clone)]
pub struct BackendProfile {
    pub base_url: String,
    pub credential: String,
    pub credential_param: String,
    pub instructions: String,
    pub path_suffix: String,
}

impl std::fmt::Debug for BackendProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendProfile")
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .field("credential_param", &self.credential_param)
            .field("path_suffix", &self.path_suffix)
            .finish()
    }
}

pub struct RemoteBackend {
    profile: BackendProfile,
    model: Arc<dyn TextModel>,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl RemoteBackend {
    pub fn new(
        profile: BackendProfile,
        model: Arc<dyn TextModel>,
        timeout_secs: u64,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::RemoteCall(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            profile,
            model,
            http,
            timeout_secs,
        })
    }

    /// Ask the text model for this backend's operation and parameters
    pub async fn resolve_action(&self, prompt: &str) -> Result<BackendAction, BackendError> {
        let request = CompletionRequest::new(prompt)
            .instruction(self.profile.instructions.clone())
            .instruction(format!(
                "Current date and time (UTC): {}.",
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
            ))
            .instruction(ACTION_SHAPE)
            .max_tokens(RESOLVE_MAX_TOKENS)
            .temperature(RESOLVE_TEMPERATURE);

        let text = self
            .model
            .complete(request)
            .await
            .map_err(|e| BackendError::ActionResolution(e.to_string()))?;

        let action = parse_action(&text)?;
        debug!(
            "Resolved operation {} with {} parameters",
            action.operation,
            action.parameters.len()
        );
        Ok(action)
    }

    /// Build the endpoint URL, credential included
    pub fn endpoint(&self, action: &BackendAction) -> Result<Url, BackendError> {
        validate_operation(&action.operation)?;

        let base = format!(
            "{}/{}{}",
            self.profile.base_url.trim_end_matches('/'),
            action.operation,
            self.profile.path_suffix
        );

        let mut params: Vec<(&str, &str)> = action
            .parameters
            .iter()
            .filter(|(k, _)| k.as_str() != self.profile.credential_param)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        params.sort();
        params.push((
            self.profile.credential_param.as_str(),
            self.profile.credential.as_str(),
        ));

        Url::parse_with_params(&base, params)
            .map_err(|e| BackendError::ActionResolution(format!("invalid endpoint {}: {}", base, e)))
    }

    /// Call the remote API for an already-resolved action
    pub async fn fetch(&self, action: &BackendAction) -> Result<Value, BackendError> {
        let url = self.endpoint(action)?;
        debug!("GET {}{}", url.host_str().unwrap_or_default(), url.path());

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::TimedOut(self.timeout_secs)
            } else {
                BackendError::RemoteCall(strip_credential(&e.to_string(), &self.profile.credential))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::TimedOut(self.timeout_secs)
            } else {
                BackendError::RemoteCall(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(BackendError::RemoteCall(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 256)
            )));
        }

        decode_body(&body)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn execute(&self, request: ExecuteRequest) -> Result<Value, BackendError> {
        let action = match request {
            ExecuteRequest::Prompt(prompt) => self.resolve_action(&prompt).await?,
            ExecuteRequest::Action(action) => action,
        };
        self.fetch(&action).await
    }
}

/// Parse the model's answer into a [`BackendAction`].
///
/// Scalar parameter values (numbers, booleans) are stringified; nested
/// values and nulls are rejected.
pub fn parse_action(text: &str) -> Result<BackendAction, BackendError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| BackendError::ActionResolution(format!("answer is not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| BackendError::ActionResolution("answer is not a JSON object".to_string()))?;

    let operation = object
        .get("operation")
        .or_else(|| object.get("action"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BackendError::ActionResolution("missing operation".to_string()))?;

    let mut parameters = HashMap::new();
    let raw_params = object.get("parameters").or_else(|| object.get("params"));
    match raw_params {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(BackendError::ActionResolution(format!(
                            "parameter {} is not a string: {}",
                            key, other
                        )))
                    }
                };
                parameters.insert(key.clone(), value);
            }
        }
        Some(other) => {
            return Err(BackendError::ActionResolution(format!(
                "parameters must be an object, got {}",
                other
            )))
        }
    }

    Ok(BackendAction {
        operation: operation.to_string(),
        parameters,
    })
}

fn validate_operation(operation: &str) -> Result<(), BackendError> {
    let valid = !operation.is_empty()
        && !operation.starts_with('/')
        && !operation.split('/').any(|seg| seg.is_empty() || seg == "..")
        && operation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'));

    if valid {
        Ok(())
    } else {
        Err(BackendError::ActionResolution(format!(
            "invalid operation name: {:?}",
            operation
        )))
    }
}

fn decode_body(body: &str) -> Result<Value, BackendError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Null) => Err(BackendError::ResponseDecode("body is JSON null".to_string())),
        Ok(value) => Ok(value),
        Err(e) => Err(BackendError::ResponseDecode(format!("body is not JSON: {}", e))),
    }
}

/// reqwest errors include the URL, which carries the credential
fn strip_credential(message: &str, credential: &str) -> String {
    if credential.is_empty() {
        return message.to_string();
    }
    message.replace(credential, "<redacted>")
}
