//! Configuration management for relayd.
//!
//! Loads settings from /etc/relay/config.toml or uses defaults.
//! Credentials never live in the file: each section names the environment
//! variable that carries its key, and [`Credentials::resolve`] reads them.

use relay_common::{DEFAULT_THRESHOLD, MAX_APPLICABILITY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/relay/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("backend '{0}' has kind 'custom' but no instructions")]
    MissingInstructions(String),

    #[error("backend '{0}' is configured more than once")]
    DuplicateBackend(String),

    #[error("dispatch threshold {0} is above the maximum applicability {max}", max = MAX_APPLICABILITY)]
    ThresholdOutOfRange(u8),
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Minimum applicability (0-100) for a backend to be executed
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    /// Outer bound on one backend task, in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn default_task_timeout() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl DispatchConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Remote text model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_model_key_env")]
    pub api_key_env: String,
}

fn default_model_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_model_timeout() -> u64 {
    10
}

fn default_model_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model(),
            timeout_secs: default_model_timeout(),
            api_key_env: default_model_key_env(),
        }
    }
}

/// Which instruction set a backend uses for action resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Ticketing,
    /// Instructions come from the `instructions` field
    Custom,
}

/// One remote backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key_env: String,

    /// Query parameter that carries the credential
    #[serde(default = "default_credential_param")]
    pub credential_param: String,

    #[serde(default)]
    pub instructions: Option<String>,

    /// Appended to the operation name in the endpoint path (ticketing uses `.json`)
    #[serde(default)]
    pub path_suffix: Option<String>,
}

fn default_credential_param() -> String {
    "apikey".to_string()
}

fn default_backends() -> Vec<BackendConfig> {
    vec![BackendConfig {
        name: "Ticketing".to_string(),
        kind: BackendKind::Ticketing,
        base_url: "https://app.ticketmaster.com/discovery/v2".to_string(),
        api_key_env: "TICKETMASTER_API_KEY".to_string(),
        credential_param: default_credential_param(),
        instructions: None,
        path_suffix: None,
    }]
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dispatch: DispatchConfig::default(),
            model: ModelConfig::default(),
            backends: default_backends(),
        }
    }
}

impl Config {
    /// Load config from `explicit` if given, otherwise from the system path,
    /// falling back to defaults when no system file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None if Path::new(CONFIG_PATH).exists() => Self::load_from_path(Path::new(CONFIG_PATH))?,
            None => {
                warn!("Config not found at {}, using defaults", CONFIG_PATH);
                Config::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.threshold > MAX_APPLICABILITY {
            return Err(ConfigError::ThresholdOutOfRange(self.dispatch.threshold));
        }

        let mut seen = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            if seen.contains(&backend.name.as_str()) {
                return Err(ConfigError::DuplicateBackend(backend.name.clone()));
            }
            seen.push(backend.name.as_str());

            let has_instructions = backend
                .instructions
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty());
            if backend.kind == BackendKind::Custom && !has_instructions {
                return Err(ConfigError::MissingInstructions(backend.name.clone()));
            }
        }
        Ok(())
    }

    /// Apply `PORT` from the environment
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name.clone()).collect()
    }
}

/// Resolved secrets for the text model and each backend
#[derive(Clone)]
pub struct Credentials {
    pub model_key: String,
    backend_keys: HashMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("model_key", &"<redacted>")
            .field("backends", &self.backend_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Read every credential the config names from the process environment
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |var| std::env::var(var).ok())
    }

    pub fn resolve_with(
        config: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredential {
                    var: var.to_string(),
                })
        };

        let model_key = read(&config.model.api_key_env)?;
        let mut backend_keys = HashMap::new();
        for backend in &config.backends {
            backend_keys.insert(backend.name.clone(), read(&backend.api_key_env)?);
        }

        Ok(Self {
            model_key,
            backend_keys,
        })
    }

    pub fn backend_key(&self, name: &str) -> Option<&str> {
        self.backend_keys.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.dispatch.threshold, 90);
        assert_eq!(config.model.timeout_secs, 10);
        assert_eq!(config.backend_names(), vec!["Ticketing".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[dispatch]
threshold = 75

[[backends]]
name = "Weather"
kind = "custom"
base_url = "https://weather.example.com/v1"
api_key_env = "WEATHER_KEY"
credential_param = "key"
instructions = "Operations: forecast. Parameters: city."
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dispatch.threshold, 75);
        // Defaults for missing fields
        assert_eq!(config.dispatch.task_timeout_secs, 30);
        assert_eq!(config.model.model, "gpt-3.5-turbo");
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].kind, BackendKind::Custom);
        assert_eq!(config.backends[0].credential_param, "key");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_backend_requires_instructions() {
        let toml_str = r#"
[[backends]]
name = "Weather"
kind = "custom"
base_url = "https://weather.example.com/v1"
api_key_env = "WEATHER_KEY"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingInstructions(name)) if name == "Weather"
        ));
    }

    #[test]
    fn test_duplicate_backend_rejected() {
        let mut config = Config::default();
        config.backends.extend(default_backends());
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateBackend(_))));
    }

    #[test]
    fn test_threshold_above_maximum_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nthreshold = 150").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ThresholdOutOfRange(150)));

        let mut config = Config::default();
        config.dispatch.threshold = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9100").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_port_override() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("PORT", "8123")]));
        assert_eq!(config.server.port, 8123);

        config.apply_env_overrides(env(&[("PORT", "not-a-port")]));
        assert_eq!(config.server.port, 8123);
    }

    #[test]
    fn test_credentials_resolve() {
        let config = Config::default();
        let creds = Credentials::resolve_with(
            &config,
            env(&[("OPENAI_API_KEY", "sk-test"), ("TICKETMASTER_API_KEY", "tm-test")]),
        )
        .unwrap();
        assert_eq!(creds.model_key, "sk-test");
        assert_eq!(creds.backend_key("Ticketing"), Some("tm-test"));
        assert!(!format!("{:?}", creds).contains("sk-test"));
    }

    #[test]
    fn test_missing_credential_fails_fast() {
        let config = Config::default();
        let err = Credentials::resolve_with(
            &config,
            env(&[("OPENAI_API_KEY", "sk-test"), ("TICKETMASTER_API_KEY", "  ")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { var } if var == "TICKETMASTER_API_KEY"));
    }
}
