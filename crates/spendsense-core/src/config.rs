//! Runtime configuration
//!
//! Loaded in layers: built-in defaults, then an optional TOML file, then
//! environment variables.
//!
//! # Environment variables
//!
//! - `SPENDSENSE_CONFIG`: Path to a TOML config file
//! - `SPENDSENSE_BACKEND`: Classifier backend (`remote` or `mock`). Default: remote
//! - `SPENDSENSE_API_URL`: Chat completions endpoint
//! - `SPENDSENSE_API_KEY`: Bearer token (falls back to `NVIDIA_API_KEY`)
//! - `SPENDSENSE_MODEL`: Vision model name
//! - `SPENDSENSE_TIMEOUT_SECS`: Per-attempt request timeout
//! - `SPENDSENSE_MAX_IMAGE_BYTES`: Limit on the base64-encoded image size
//! - `SPENDSENSE_RETRY_ATTEMPTS`: Maximum attempts per classification
//! - `SPENDSENSE_RETRY_BASE_MS`: First backoff delay
//! - `SPENDSENSE_RETRY_MAX_MS`: Backoff cap
//! - `SPENDSENSE_WINDOW_DAYS`: Dashboard aggregation window

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_PATH_ENV: &str = "SPENDSENSE_CONFIG";

pub const DEFAULT_API_URL: &str =
    "https://ai.api.nvidia.com/v1/gr/meta/llama-3.2-11b-vision-instruct/chat/completions";
pub const DEFAULT_MODEL: &str = "meta/llama-3.2-11b-vision-instruct";

/// Longest dashboard window accepted anywhere (ten years)
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Which classifier implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Remote,
    Mock,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "nvidia" | "openai" => Ok(Self::Remote),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Remote model settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub backend: BackendKind,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    /// Refuse to send images whose base64 form is larger than this
    pub max_encoded_image_bytes: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Remote,
            endpoint: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            max_encoded_image_bytes: 180_000,
            max_tokens: 512,
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

// Hand-written so the key never reaches logs
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_encoded_image_bytes", &self.max_encoded_image_bytes)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .finish()
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry/backoff settings for the remote call
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Dashboard settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub window_days: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl DashboardConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.window_days))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load defaults, then the TOML file (explicit path or `SPENDSENSE_CONFIG`),
    /// then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let path = path.or(env_path.as_deref().map(Path::new));

        let mut config = match path {
            Some(p) => Self::from_toml(&std::fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SPENDSENSE_BACKEND") {
            self.api.backend = v.parse().map_err(Error::Config)?;
        }
        if let Some(v) = get("SPENDSENSE_API_URL") {
            self.api.endpoint = v;
        }
        if let Some(v) = get("SPENDSENSE_API_KEY").or_else(|| get("NVIDIA_API_KEY")) {
            self.api.api_key = Some(v);
        }
        if let Some(v) = get("SPENDSENSE_MODEL") {
            self.api.model = v;
        }
        if let Some(v) = get("SPENDSENSE_TIMEOUT_SECS") {
            self.api.request_timeout_secs = parse_var("SPENDSENSE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SPENDSENSE_MAX_IMAGE_BYTES") {
            self.api.max_encoded_image_bytes = parse_var("SPENDSENSE_MAX_IMAGE_BYTES", &v)?;
        }
        if let Some(v) = get("SPENDSENSE_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_var("SPENDSENSE_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("SPENDSENSE_RETRY_BASE_MS") {
            self.retry.base_delay_ms = parse_var("SPENDSENSE_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = get("SPENDSENSE_RETRY_MAX_MS") {
            self.retry.max_delay_ms = parse_var("SPENDSENSE_RETRY_MAX_MS", &v)?;
        }
        if let Some(v) = get("SPENDSENSE_WINDOW_DAYS") {
            self.dashboard.window_days = parse_var("SPENDSENSE_WINDOW_DAYS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(Error::Config("api.request_timeout_secs must be positive".into()));
        }
        if self.api.max_encoded_image_bytes == 0 {
            return Err(Error::Config(
                "api.max_encoded_image_bytes must be positive".into(),
            ));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.dashboard.window_days) {
            return Err(Error::Config(format!(
                "dashboard.window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.request_timeout_secs, 120);
        assert_eq!(config.api.max_encoded_image_bytes, 180_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.dashboard.window_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = Config::from_toml(
            r#"
            [api]
            model = "local-vision"
            max_encoded_image_bytes = 500000

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.api.model, "local-vision");
        assert_eq!(config.api.max_encoded_image_bytes, 500_000);
        assert_eq!(config.api.endpoint, DEFAULT_API_URL);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 1_000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SPENDSENSE_BACKEND", "mock"),
                ("SPENDSENSE_API_KEY", "sk-test"),
                ("SPENDSENSE_RETRY_ATTEMPTS", "3"),
                ("SPENDSENSE_WINDOW_DAYS", "7"),
            ]))
            .unwrap();
        assert_eq!(config.api.backend, BackendKind::Mock);
        assert_eq!(config.api.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.dashboard.window(), chrono::Duration::days(7));
    }

    #[test]
    fn test_legacy_api_key_fallback() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("NVIDIA_API_KEY", "nv-key")]))
            .unwrap();
        assert_eq!(config.api.api_key.as_deref(), Some("nv-key"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("SPENDSENSE_RETRY_ATTEMPTS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_days_bounded() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("SPENDSENSE_WINDOW_DAYS", "4000000000")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.dashboard.window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
        config.dashboard.window_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = Config::default();
        config.api.api_key = Some("sk-very-secret".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
