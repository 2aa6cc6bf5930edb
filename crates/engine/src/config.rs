//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRINTLINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SHIPSTATION_API_KEY` - ShipStation API key
//! - `SHIPSTATION_API_SECRET` - ShipStation API secret
//!
//! ## Required for `process`
//! - `OPENAI_API_KEY` - `OpenAI` API key used for personalization extraction
//!
//! ## Optional
//! - `SHIPSTATION_BASE_URL` - API base URL (default: `https://ssapi.shipstation.com`)
//! - `OPENAI_BASE_URL` - Chat completions base URL (default: `https://api.openai.com/v1`)
//! - `OPENAI_MODEL` - Model ID (default: gpt-4.1-mini)
//! - `AI_SYSTEM_PROMPT_PATH` - Replace the built-in system prompt with a file
//! - `AI_USER_PROMPT_PATH` - Replace the built-in user prompt template with a file
//! - `SYNC_PAGE_DELAY_MS` - Pause between ShipStation pages (default: 1500)
//! - `LOG_FORMAT` - `json` or `text` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sample rates (default: 1.0)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_SHIPSTATION_BASE_URL: &str = "https://ssapi.shipstation.com";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_PAGE_DELAY_MS: u64 = 1500;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// ShipStation API configuration
    pub shipstation: ShipStationConfig,
    /// `OpenAI` configuration (only needed when processing orders)
    pub openai: Option<OpenAiConfig>,
    /// Prompt file overrides
    pub prompts: PromptConfig,
    /// Delay between ShipStation pages during a sync
    pub page_delay: Duration,
    /// Log line format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// ShipStation API configuration.
///
/// Implements `Debug` manually to redact credentials.
#[derive(Clone)]
pub struct ShipStationConfig {
    /// API base URL
    pub base_url: Url,
    /// API key (basic auth username)
    pub api_key: SecretString,
    /// API secret (basic auth password)
    pub api_secret: SecretString,
}

impl std::fmt::Debug for ShipStationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipStationConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// `OpenAI`-compatible chat completions configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: SecretString,
    /// Model ID
    pub model: String,
    /// Base URL; `/chat/completions` is appended
    pub base_url: Url,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Optional prompt file overrides.
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    pub system_prompt_path: Option<PathBuf>,
    pub user_prompt_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets look like placeholders.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("PRINTLINE_DATABASE_URL")?;
        let shipstation = ShipStationConfig::from_env()?;
        let openai = OpenAiConfig::from_env()?;
        let prompts = PromptConfig {
            system_prompt_path: get_optional_env("AI_SYSTEM_PROMPT_PATH").map(PathBuf::from),
            user_prompt_path: get_optional_env("AI_USER_PROMPT_PATH").map(PathBuf::from),
        };
        let page_delay_ms = get_env_or_default("SYNC_PAGE_DELAY_MS", &DEFAULT_PAGE_DELAY_MS.to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar("SYNC_PAGE_DELAY_MS".to_string(), e.to_string()))?;
        let log_format = parse_log_format(&get_env_or_default("LOG_FORMAT", "text"))?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            shipstation,
            openai,
            prompts,
            page_delay: Duration::from_millis(page_delay_ms),
            log_format,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the `OpenAI` configuration or an error naming the missing key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` was not set.
    pub fn require_openai(&self) -> Result<&OpenAiConfig, ConfigError> {
        self.openai
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }
}

/// Only the database URL, for commands that need nothing else.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither `PRINTLINE_DATABASE_URL`
/// nor `DATABASE_URL` is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("PRINTLINE_DATABASE_URL")
}

impl ShipStationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: get_url("SHIPSTATION_BASE_URL", DEFAULT_SHIPSTATION_BASE_URL)?,
            api_key: get_validated_secret("SHIPSTATION_API_KEY")?,
            api_secret: get_validated_secret("SHIPSTATION_API_SECRET")?,
        })
    }
}

impl OpenAiConfig {
    /// Returns `None` if `OPENAI_API_KEY` is not set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("OPENAI_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&key, "OPENAI_API_KEY")?;
        Ok(Some(Self {
            api_key: SecretString::from(key),
            model: get_env_or_default("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            base_url: get_url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_url(key: &str, default: &str) -> Result<Url, ConfigError> {
    Url::parse(&get_env_or_default(key, default))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_log_format(value: &str) -> Result<LogFormat, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "text" | "pretty" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(ConfigError::InvalidEnvVar(
            "LOG_FORMAT".to_string(),
            format!("expected 'json' or 'text', got '{other}'"),
        )),
    }
}

/// Reject secrets that look like copied placeholders.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_empty() {
        assert!(validate_secret_strength("   ", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("4f1c9e0b7a2d4e8f9c3b", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("JSON").unwrap(), LogFormat::Json);
        assert_eq!(parse_log_format("text").unwrap(), LogFormat::Text);
        assert!(parse_log_format("xml").is_err());
    }

    #[test]
    fn test_require_openai_missing() {
        let config = EngineConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            shipstation: ShipStationConfig {
                base_url: Url::parse(DEFAULT_SHIPSTATION_BASE_URL).unwrap(),
                api_key: SecretString::from("key"),
                api_secret: SecretString::from("secret"),
            },
            openai: None,
            prompts: PromptConfig::default(),
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
        };

        let err = config.require_openai().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "OPENAI_API_KEY"));
    }

    #[test]
    fn test_shipstation_config_debug_redacts_secrets() {
        let config = ShipStationConfig {
            base_url: Url::parse(DEFAULT_SHIPSTATION_BASE_URL).unwrap(),
            api_key: SecretString::from("ss_live_key_123"),
            api_secret: SecretString::from("ss_live_secret_456"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("ssapi.shipstation.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("ss_live_key_123"));
        assert!(!debug_output.contains("ss_live_secret_456"));
    }

    #[test]
    fn test_openai_config_debug_redacts_secrets() {
        let config = OpenAiConfig {
            api_key: SecretString::from("sk-super-secret-key"),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: Url::parse(DEFAULT_OPENAI_BASE_URL).unwrap(),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains(DEFAULT_OPENAI_MODEL));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk-super-secret-key"));
    }
}
