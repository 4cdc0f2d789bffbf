//! Activity formatter.
//!
//! Normalises the raw payloads of successful backends into a flat list of
//! [`Activity`] records with a single text-model call.

use crate::error::ModelError;
use crate::llm_client::{strip_code_fence, truncate, CompletionRequest, TextModel};
use relay_common::{Activity, AggregateResponse};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on the serialised payload sent to the model, in bytes
pub const MAX_PAYLOAD_BYTES: usize = 10_000;

const FORMAT_MAX_TOKENS: u32 = 1500;
const FORMAT_TEMPERATURE: f32 = 0.3;

const SYSTEM_INSTRUCTION: &str = "\
You are a data extraction assistant that processes raw JSON data from multiple services. \
Extract activities in a standardized format.";

const FIELD_INSTRUCTION: &str = "\
Return ONLY a JSON array of activities. Each activity has these string fields \
(use null when unknown):
- image: URL of an image for the activity
- activity_name: name or title of the activity
- time: time or duration of the activity
- date: date of the activity
- location: location of the activity
- details: key highlights or details about the activity
- link: URL with more information about the activity";

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("formatter call failed: {0}")]
    Model(#[from] ModelError),

    #[error("formatter output is not a list of activities: {0}")]
    Parse(String),
}

#[derive(Serialize)]
struct CombinedData<'a> {
    service: &'a str,
    data: &'a Value,
}

pub struct ActivityFormatter {
    model: Arc<dyn TextModel>,
}

impl ActivityFormatter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub async fn format(&self, aggregate: &AggregateResponse) -> Result<Vec<Activity>, FormatError> {
        let combined: Vec<CombinedData<'_>> = aggregate
            .successes()
            .filter_map(|o| {
                o.data.as_ref().map(|data| CombinedData {
                    service: &o.backend,
                    data,
                })
            })
            .collect();

        if combined.is_empty() {
            debug!("No successful outcomes to format");
            return Ok(Vec::new());
        }

        let payload = build_payload(&combined)?;
        let request = CompletionRequest::new(format!(
            "Format the following combined raw data into the standardized activity format:\n\n{}",
            payload
        ))
        .instruction(SYSTEM_INSTRUCTION)
        .instruction(FIELD_INSTRUCTION)
        .max_tokens(FORMAT_MAX_TOKENS)
        .temperature(FORMAT_TEMPERATURE);

        let text = self.model.complete(request).await?;
        let activities = parse_activities(&text)?;
        info!("Formatted {} activities from {} backends", activities.len(), combined.len());
        Ok(activities)
    }
}

/// Serialise, cap at [`MAX_PAYLOAD_BYTES`] and neutralise backticks so the
/// payload cannot close a Markdown fence in the prompt.
fn build_payload(combined: &[CombinedData<'_>]) -> Result<String, FormatError> {
    let json = serde_json::to_string(combined).map_err(|e| FormatError::Parse(e.to_string()))?;
    Ok(truncate(&json, MAX_PAYLOAD_BYTES).replace('`', "'"))
}

/// Accepts a JSON array of activities or an object whose values are
/// activities (or arrays of them).
pub fn parse_activities(text: &str) -> Result<Vec<Activity>, FormatError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| FormatError::Parse(e.to_string()))?;

    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .flat_map(|(_, v)| match v {
                Value::Array(items) => items,
                other => vec![other],
            })
            .collect(),
        other => return Err(FormatError::Parse(format!("unexpected {}", other))),
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<Activity>(item).map_err(|e| FormatError::Parse(e.to_string()))
        })
        .collect()
}
