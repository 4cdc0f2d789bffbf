//! Shared types for Relay components.
//!
//! The daemon (`relayd`) and its HTTP clients exchange these types as JSON.

pub mod api;
pub mod dispatch;

pub use api::{
    ActionRequest, Activity, ActivityResponse, ErrorBody, HealthResponse, PromptRequest,
};
pub use dispatch::{
    AggregateResponse, BackendAction, BackendOutcome, RelevanceScore, DEFAULT_THRESHOLD,
    MAX_APPLICABILITY,
};
