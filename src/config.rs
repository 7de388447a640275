//! Runtime configuration, read from the environment (`.env` is loaded in `main`).

use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen3-omni-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

/// Placeholder key values shipped in sample configs. Matched case-insensitively.
const PLACEHOLDER_KEYS: &[&str] = &[
    "YOUR_OPENROUTER_API_KEY",
    "YOUR_DASHSCOPE_API_KEY",
    "YOUR_API_KEY",
];

/// Settings for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Missing key is reported per call, not at startup.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = env::var("AI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            base_url: non_empty_var("DASHSCOPE_BASE_URL").unwrap_or(defaults.base_url),
            api_key: non_empty_var("DASHSCOPE_API_KEY"),
            model: non_empty_var("DASHSCOPE_MODEL").unwrap_or(defaults.model),
            temperature: defaults.temperature,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Full chat-completions URL.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
impl GatewayConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// True when the key is one of the sample placeholder values.
pub fn is_placeholder_key(key: &str) -> bool {
    let upper = key.to_uppercase();
    PLACEHOLDER_KEYS.iter().any(|p| upper.contains(p))
}

/// Settings for the HTTP surface and local collaborators.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Speech-to-text sidecar; transcription fallback is disabled when unset.
    pub speech_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let max_upload_mb = env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);

        Self {
            bind_addr: non_empty_var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            speech_url: non_empty_var("SPEECH_URL"),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_path() {
        let config = GatewayConfig::default().with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(
            GatewayConfig::default().endpoint(),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn test_placeholder_keys() {
        assert!(is_placeholder_key("your_openrouter_api_key"));
        assert!(is_placeholder_key("sk-YOUR_DASHSCOPE_API_KEY"));
        assert!(!is_placeholder_key("sk-3f9a0c1e"));
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.model, "qwen3-omni-flash");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.api_key.is_none());
    }
}
