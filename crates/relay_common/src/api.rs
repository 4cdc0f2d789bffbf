//! HTTP request and response bodies for relayd.

use crate::dispatch::{BackendAction, BackendOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /v1/prompt` and `POST /v1/activities`.
///
/// `prompt` is optional on the wire so a missing field can be reported as a
/// client error with a readable message instead of a bare rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

/// Body of `POST /v1/backends/{name}/execute`: an already-resolved action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl From<ActionRequest> for BackendAction {
    fn from(req: ActionRequest) -> Self {
        BackendAction {
            operation: req.action,
            parameters: req.params,
        }
    }
}

/// One activity in the normalised format produced by the activity formatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Body returned by `POST /v1/activities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub activities: Vec<Activity>,
    /// Outcomes of backends that failed or were skipped, in classifier order.
    #[serde(default)]
    pub errors: Vec<BackendOutcome>,
}

impl ActivityResponse {
    /// Keep only the failed outcomes, preserving their order
    pub fn new(activities: Vec<Activity>, outcomes: Vec<BackendOutcome>) -> Self {
        Self {
            activities,
            errors: outcomes.into_iter().filter(|o| !o.is_success()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub backends: Vec<String>,
}

/// JSON error body used for request-level failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_response_keeps_failure_order() {
        let response = ActivityResponse::new(
            vec![Activity::default()],
            vec![
                BackendOutcome::below_threshold("Weather", 10),
                BackendOutcome::success("Ticketing", json!({"events": []})),
                BackendOutcome::unregistered("Dining"),
            ],
        );

        let names: Vec<_> = response.errors.iter().map(|o| o.backend.as_str()).collect();
        assert_eq!(names, vec!["Weather", "Dining"]);
        assert!(response.errors.iter().all(|o| o.data.is_none()));
    }
}
