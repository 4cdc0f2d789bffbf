//! Fake backend for deterministic testing.
//!
//! Returns a pre-configured result after an optional delay and records every
//! request it receives, so tests can assert that a backend was (or was not)
//! called.

use super::{Backend, ExecuteRequest};
use crate::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub struct FakeBackend {
    result: Result<Value, BackendError>,
    delay: Option<Duration>,
    panics: bool,
    requests: Mutex<Vec<ExecuteRequest>>,
}

impl FakeBackend {
    pub fn builder() -> FakeBackendBuilder {
        FakeBackendBuilder::default()
    }

    /// A fake that succeeds with `data`
    pub fn ok(data: Value) -> Self {
        Self::builder().data(data).build()
    }

    /// A fake that fails with `error`
    pub fn failing(error: BackendError) -> Self {
        Self::builder().error(error).build()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn execute(&self, request: ExecuteRequest) -> Result<Value, BackendError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("fake backend configured to panic");
        }
        self.result.clone()
    }
}

pub struct FakeBackendBuilder {
    result: Result<Value, BackendError>,
    delay: Option<Duration>,
    panics: bool,
}

impl Default for FakeBackendBuilder {
    fn default() -> Self {
        Self {
            result: Ok(Value::Object(Default::default())),
            delay: None,
            panics: false,
        }
    }
}

impl FakeBackendBuilder {
    pub fn data(mut self, data: Value) -> Self {
        self.result = Ok(data);
        self
    }

    pub fn error(mut self, error: BackendError) -> Self {
        self.result = Err(error);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic inside `execute` after recording the call
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn build(self) -> FakeBackend {
        FakeBackend {
            result: self.result,
            delay: self.delay,
            panics: self.panics,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fake_backend_counts_calls() {
        let fake = FakeBackend::ok(json!({"events": []}));
        assert_eq!(fake.call_count(), 0);

        let data = fake
            .execute(ExecuteRequest::Prompt("concert".to_string()))
            .await
            .unwrap();
        assert_eq!(data, json!({"events": []}));
        assert_eq!(fake.call_count(), 1);
        assert_eq!(
            fake.requests(),
            vec![ExecuteRequest::Prompt("concert".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fake_backend_failing() {
        let fake = FakeBackend::failing(BackendError::RemoteCall("refused".to_string()));
        let err = fake
            .execute(ExecuteRequest::Prompt("concert".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RemoteCall(_)));
    }
}
