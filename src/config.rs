//! Runtime configuration: endpoint, credentials, per-model parameter
//! overrides, and retry settings.
//!
//! Loadable from a YAML file with environment-variable overrides on top.
//! API keys resolve through a cascade: explicit config, then the OS
//! keyring, then a `<PROVIDER>_API_KEY` environment variable.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use keyring::Entry;
use serde::{Deserialize, Serialize};

use crate::transport::RetryPolicy;
use crate::types::ChatRequest;
use crate::{Error, Result};

/// Keyring service name under which provider keys are stored.
const KEYRING_SERVICE: &str = "toolcall-runtime";

/// Sampling parameters applied to requests for a given model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ModelParams {
    /// Fill any unset fields on the request from these parameters. Fields
    /// already set on the request always win.
    pub fn apply_to(&self, request: &mut ChatRequest) {
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }
        if request.top_p.is_none() {
            request.top_p = self.top_p;
        }
        if request.top_k.is_none() {
            request.top_k = self.top_k;
        }
        if request.stop.is_none() {
            request.stop = self.stop.clone();
        }
    }
}

/// Serializable retry settings, converted to a [`RetryPolicy`] at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub base_url: String,
    pub model: String,
    /// Explicit key; when absent the keyring/env cascade applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Provider id used for keyring and env-var key lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub model_overrides: HashMap<String, ModelParams>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RuntimeConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            provider: None,
            request_timeout_secs: default_timeout_secs(),
            retry: RetrySettings::default(),
            model_overrides: HashMap::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("invalid config yaml: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("TOOLRUN_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = env::var("TOOLRUN_MODEL") {
            self.model = v;
        }
        if let Ok(v) = env::var("TOOLRUN_API_KEY") {
            self.api_key = Some(v);
        }
        if let Ok(v) = env::var("TOOLRUN_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Resolve the API key: explicit config, then keyring, then
    /// `<PROVIDER>_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let provider = self.provider.as_deref()?;
        if let Ok(entry) = Entry::new(KEYRING_SERVICE, provider) {
            if let Ok(key) = entry.get_password() {
                return Some(key);
            }
        }
        env::var(format!("{}_API_KEY", provider.to_uppercase())).ok()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parameters for a model: the override entry when present, empty
    /// defaults otherwise.
    pub fn params_for(&self, model: &str) -> ModelParams {
        self.model_overrides.get(model).cloned().unwrap_or_default()
    }
}
