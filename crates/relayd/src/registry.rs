//! Backend registry: name → backend implementation.
//!
//! Built once at startup and immutable afterwards, so concurrent dispatch
//! tasks read it without locking.

use crate::backend::{ticketing, Backend, BackendProfile, RemoteBackend};
use crate::config::{BackendKind, Config, Credentials};
use crate::error::RegistryError;
use crate::llm_client::TextModel;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Build the remote backends named in `config`.
    ///
    /// Every backend must have a credential in `credentials`; a missing one
    /// is an error, never a backend that can only fail.
    pub fn from_config(
        config: &Config,
        credentials: &Credentials,
        model: Arc<dyn TextModel>,
    ) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();

        for entry in &config.backends {
            let credential = credentials
                .backend_key(&entry.name)
                .ok_or_else(|| RegistryError::MissingCredential(entry.name.clone()))?;

            let mut profile = match entry.kind {
                BackendKind::Ticketing => ticketing::profile(entry.base_url.clone(), credential),
                BackendKind::Custom => BackendProfile {
                    base_url: entry.base_url.clone(),
                    credential: credential.to_string(),
                    credential_param: entry.credential_param.clone(),
                    instructions: entry.instructions.clone().unwrap_or_default(),
                    path_suffix: String::new(),
                },
            };
            profile.credential_param = entry.credential_param.clone();
            if let Some(suffix) = &entry.path_suffix {
                profile.path_suffix = suffix.clone();
            }

            let backend = RemoteBackend::new(profile, model.clone(), config.model.timeout_secs)
                .map_err(|source| RegistryError::Build {
                    name: entry.name.clone(),
                    source,
                })?;
            info!("Registered backend {} ({:?}) at {}", entry.name, entry.kind, entry.base_url);
            builder = builder.register(entry.name.clone(), Arc::new(backend));
        }

        Ok(builder.build())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistryBuilder {
    /// Register `backend` under `name`, replacing any earlier entry
    pub fn register(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}
