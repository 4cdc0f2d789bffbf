//! Backend executors.
//!
//! Every backend is polymorphic over one capability, [`Backend::execute`]:
//! turn a prompt (or an already-resolved action) into structured data from
//! the backend's remote API. Concrete backends differ only in their
//! [`BackendProfile`]; see [`remote::RemoteBackend`].

pub mod fake;
pub mod remote;
pub mod ticketing;

use crate::error::BackendError;
use async_trait::async_trait;
use relay_common::BackendAction;
use serde_json::Value;

pub use fake::{FakeBackend, FakeBackendBuilder};
pub use remote::{BackendProfile, RemoteBackend};

/// Input to one backend execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteRequest {
    /// Free text; the backend resolves its own action
    Prompt(String),
    /// Skip action resolution and call the remote API directly
    Action(BackendAction),
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<Value, BackendError>;
}
