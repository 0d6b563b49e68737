// Engine Configuration
//
// Local, host-side configuration for the engine: where the remote store
// lives, how long the debounce windows and dialog timers are, and which
// input mode drives selection handling. Per-user settings fetched from the
// remote store live in `types::UserSettings`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `backend_url`
pub const ENV_BACKEND_URL: &str = "LINGOMARKER_BACKEND_URL";

/// Environment variable carrying the session cookie value
pub const ENV_SESSION: &str = "LINGOMARKER_SESSION";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// How the host delivers selection gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Mouse-up is a discrete end-of-gesture signal
    #[default]
    Pointer,

    /// Touch/no-hover: selection handles fire many intermediate events
    Touch,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote store
    pub backend_url: String,

    /// Session cookie value sent with every request (cookie-based session)
    pub session_cookie: Option<String>,

    /// Remote request timeout (in seconds)
    #[serde(with = "serde_secs")]
    pub request_timeout: Duration,

    /// Debounce window for re-highlight requests (in milliseconds)
    #[serde(with = "serde_millis")]
    pub highlight_debounce: Duration,

    /// Debounce window for touch `selectionchange` events (in milliseconds)
    #[serde(with = "serde_millis")]
    pub selection_debounce: Duration,

    /// Auto-dismiss delay for the confirmation dialog (in milliseconds)
    #[serde(with = "serde_millis")]
    pub dialog_timeout: Duration,

    /// Delay before the dialog's outside-click handler is armed (in milliseconds)
    #[serde(with = "serde_millis")]
    pub outside_click_delay: Duration,

    /// Pages whose body text exceeds this many characters are left untouched
    pub page_size_limit: usize,

    /// Selection input mode
    pub input_mode: InputMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_url: "https://dev.lingomarker.com:8443".to_string(),
            session_cookie: None,
            request_timeout: Duration::from_secs(20),
            highlight_debounce: Duration::from_millis(300),
            selection_debounce: Duration::from_millis(300),
            dialog_timeout: Duration::from_millis(5000),
            outside_click_delay: Duration::from_millis(50),
            page_size_limit: 1_000_000,
            input_mode: InputMode::Pointer,
        }
    }
}

// Durations as whole milliseconds
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Durations as whole seconds
mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the loaded values
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            if !url.trim().is_empty() {
                self.backend_url = url.trim().to_string();
            }
        }
        if let Ok(session) = std::env::var(ENV_SESSION) {
            if !session.trim().is_empty() {
                self.session_cookie = Some(session.trim().to_string());
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Backend URL without a trailing slash
    pub fn backend_base(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.backend_url).map_err(|e| {
            ConfigError::ValidationError(format!("backend_url is not a valid URL: {}", e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::ValidationError(
                "backend_url must use http or https".to_string(),
            ));
        }

        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("highlight_debounce", self.highlight_debounce),
            ("selection_debounce", self.selection_debounce),
            ("dialog_timeout", self.dialog_timeout),
            ("outside_click_delay", self.outside_click_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{}: must be greater than zero",
                    name
                )));
            }
        }

        if self.page_size_limit == 0 {
            return Err(ConfigError::ValidationError(
                "page_size_limit: must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dialog_timeout, Duration::from_millis(5000));
        assert_eq!(config.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            backend_url = "http://127.0.0.1:3000"
            dialog_timeout = 1500
            input_mode = "touch"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend_url, "http://127.0.0.1:3000");
        assert_eq!(config.dialog_timeout, Duration::from_millis(1500));
        assert_eq!(config.input_mode, InputMode::Touch);
        assert_eq!(config.highlight_debounce, Duration::from_millis(300));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineConfig::from_toml(r#"backend_url = "ftp://example.com""#).is_err());
        assert!(EngineConfig::from_toml(r#"backend_url = "not a url""#).is_err());
        assert!(EngineConfig::from_toml("highlight_debounce = 0").is_err());
        assert!(EngineConfig::from_toml("page_size_limit = 0").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend_url = \"https://example.org/\"").unwrap();
        writeln!(file, "request_timeout = 5").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backend_base(), "https://example.org");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_BACKEND_URL, "https://override.example");
        std::env::set_var(ENV_SESSION, "abc123");

        let config = EngineConfig::default().with_env_overrides().unwrap();
        assert_eq!(config.backend_url, "https://override.example");
        assert_eq!(config.session_cookie.as_deref(), Some("abc123"));

        std::env::remove_var(ENV_BACKEND_URL);
        std::env::remove_var(ENV_SESSION);
    }
}
