//! Relevance classifier.
//!
//! Asks the text model how applicable every known backend is to a prompt and
//! parses the answer into an ordered list of [`RelevanceScore`]s. The list is
//! returned unfiltered; thresholding belongs to the orchestrator.

use crate::error::ClassificationError;
use crate::llm_client::{strip_code_fence, CompletionRequest, TextModel};
use relay_common::{RelevanceScore, MAX_APPLICABILITY};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFIER_MAX_TOKENS: u32 = 300;
const CLASSIFIER_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct RawScore {
    service: String,
    applicability: Value,
}

pub struct RelevanceClassifier {
    model: Arc<dyn TextModel>,
    backends: Vec<String>,
}

impl RelevanceClassifier {
    pub fn new(model: Arc<dyn TextModel>, backends: Vec<String>) -> Self {
        Self { model, backends }
    }

    fn instruction(&self) -> String {
        format!(
            "You rate how relevant each backend service is to a user request.\n\
             Known services: {}.\n\
             Respond with ONLY a JSON array containing one object per known service, \
             in the form [{{\"service\": \"<name>\", \"applicability\": <integer 0-100>}}]. \
             Use the service names exactly as listed. Do not add any other text.",
            self.backends.join(", ")
        )
    }

    pub async fn classify(&self, prompt: &str) -> Result<Vec<RelevanceScore>, ClassificationError> {
        let request = CompletionRequest::new(prompt)
            .instruction(self.instruction())
            .max_tokens(CLASSIFIER_MAX_TOKENS)
            .temperature(CLASSIFIER_TEMPERATURE);

        let text = self.model.complete(request).await?;
        let scores = parse_scores(&text)?;
        debug!("Classifier returned {} scores", scores.len());
        Ok(scores)
    }
}

/// Parse the classifier's answer. Any malformed entry fails the whole list.
pub fn parse_scores(text: &str) -> Result<Vec<RelevanceScore>, ClassificationError> {
    let body = strip_code_fence(text);
    let raw: Vec<RawScore> =
        serde_json::from_str(body).map_err(|e| ClassificationError::Parse(e.to_string()))?;

    let mut scores: Vec<RelevanceScore> = Vec::with_capacity(raw.len());
    for entry in raw {
        let applicability = parse_applicability(&entry.service, &entry.applicability)?;
        if scores.iter().any(|s| s.backend == entry.service) {
            warn!("Classifier repeated {}, keeping first score", entry.service);
            continue;
        }
        scores.push(RelevanceScore::new(entry.service, applicability));
    }
    Ok(scores)
}

/// Accepts an integer or an integer-valued string (optionally suffixed with `%`).
fn parse_applicability(backend: &str, value: &Value) -> Result<u8, ClassificationError> {
    let out_of_range = || ClassificationError::OutOfRange {
        backend: backend.to_string(),
        value: value.to_string(),
    };

    let number = match value {
        Value::Number(n) => n.as_i64().ok_or_else(out_of_range)?,
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<i64>()
            .map_err(|_| out_of_range())?,
        _ => return Err(out_of_range()),
    };

    if !(0..=i64::from(MAX_APPLICABILITY)).contains(&number) {
        return Err(out_of_range());
    }
    u8::try_from(number).map_err(|_| out_of_range())
}
