//! Error types for relayd.
//!
//! Only [`DispatchError`] ever reaches an HTTP client as a failed request.
//! Backend and selection failures are folded into per-backend outcomes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_common::ErrorBody;

/// Failure of a single call to the remote text model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("HTTP {status} from text model: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

/// Startup failure while building the backend registry from config.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no credential resolved for backend {0}")]
    MissingCredential(String),

    #[error("failed to build backend {name}: {source}")]
    Build {
        name: String,
        #[source]
        source: BackendError,
    },
}

/// Relevance classification failed; no backend selection is possible.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier call failed: {0}")]
    Model(#[from] ModelError),

    #[error("classifier output is not a valid score list: {0}")]
    Parse(String),

    #[error("applicability for {backend} out of range: {value}")]
    OutOfRange { backend: String, value: String },
}

/// Failure of one backend. Never fatal to the request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("action resolution failed: {0}")]
    ActionResolution(String),

    #[error("remote call failed: {0}")]
    RemoteCall(String),

    #[error("response decode failed: {0}")]
    ResponseDecode(String),

    #[error("remote call failed: timed out after {0} seconds")]
    TimedOut(u64),
}

/// Request-level failure. Produces no outcomes.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("prompt is required")]
    EmptyPrompt,

    #[error("failed to analyze the prompt: {0}")]
    Classification(#[from] ClassificationError),

    #[error("no backend registered under '{0}'")]
    UnknownBackend(String),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::EmptyPrompt => StatusCode::BAD_REQUEST,
            DispatchError::Classification(_) => StatusCode::BAD_GATEWAY,
            DispatchError::UnknownBackend(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
