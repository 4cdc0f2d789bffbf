//! Dispatch data model: relevance scores, resolved actions and per-backend outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum applicability a backend needs before it is dispatched to.
pub const DEFAULT_THRESHOLD: u8 = 90;

/// Upper bound of the applicability scale (inclusive).
pub const MAX_APPLICABILITY: u8 = 100;

/// How applicable one backend is to a prompt, on a 0-100 scale.
///
/// The wire name of the backend field is `service`, which is what the
/// classification instruction asks the model to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceScore {
    #[serde(rename = "service")]
    pub backend: String,
    pub applicability: u8,
}

impl RelevanceScore {
    pub fn new(backend: impl Into<String>, applicability: u8) -> Self {
        Self {
            backend: backend.into(),
            applicability,
        }
    }

    pub fn passes(&self, threshold: u8) -> bool {
        self.applicability >= threshold
    }
}

/// A structured operation resolved from free text for a single backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAction {
    #[serde(alias = "action")]
    pub operation: String,
    #[serde(default, alias = "params")]
    pub parameters: HashMap<String, String>,
}

impl BackendAction {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Result of one backend for one request. Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub backend: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl BackendOutcome {
    pub fn success(backend: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            backend: backend.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(backend: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            data: None,
            error: Some(error.into()),
        }
    }

    /// Outcome for a backend whose score did not reach the threshold.
    pub fn below_threshold(backend: impl Into<String>, applicability: u8) -> Self {
        Self::failure(
            backend,
            format!("applicability below threshold ({})", applicability),
        )
    }

    /// Outcome for a selected backend name with no registered implementation.
    pub fn unregistered(backend: impl Into<String>) -> Self {
        Self::failure(backend, "no backend registered")
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

/// All outcomes of one request, in classifier order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub outcomes: Vec<BackendOutcome>,
}

impl AggregateResponse {
    pub fn new(outcomes: Vec<BackendOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn get(&self, backend: &str) -> Option<&BackendOutcome> {
        self.outcomes.iter().find(|o| o.backend == backend)
    }

    pub fn successes(&self) -> impl Iterator<Item = &BackendOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
