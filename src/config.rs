//! Runtime configuration.
//!
//! Values come from the environment and may be overridden by CLI flags.

use crate::compose::Typeface;
use crate::error::{BackdropError, Result};
use crate::usage::UsageStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Fallback API key variable, shared with other Google tooling.
pub const FALLBACK_API_KEY_VAR: &str = "GOOGLE_API_KEY";
/// Model variant (`flash` or `pro`).
pub const MODEL_VAR: &str = "BACKDROP_MODEL";
/// Usage record location.
pub const USAGE_PATH_VAR: &str = "BACKDROP_USAGE_PATH";
/// Font file used for titles.
pub const FONT_VAR: &str = "BACKDROP_FONT";
/// `true`, `yes` or `1` switches logs to JSON.
pub const LOG_JSON_VAR: &str = "BACKDROP_LOG_JSON";

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gemini API key. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Model variant name (`flash` or `pro`).
    pub model: String,

    /// Usage record location; the platform data dir when unset.
    pub usage_path: Option<PathBuf>,

    /// Font for titles; a system font is searched for when unset.
    pub font_path: Option<PathBuf>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "backdrop=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "flash".to_string(),
            usage_path: None,
            font_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            api_key: get(API_KEY_VAR).or_else(|| get(FALLBACK_API_KEY_VAR)),
            model: get(MODEL_VAR).unwrap_or(defaults.model),
            usage_path: get(USAGE_PATH_VAR).map(PathBuf::from),
            font_path: get(FONT_VAR).map(PathBuf::from),
            logging: LoggingConfig {
                level: defaults.logging.level,
                json: get(LOG_JSON_VAR)
                    .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
        }
    }

    /// Returns the API key or fails with an auth error.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            BackdropError::Auth(format!(
                "{API_KEY_VAR} is not set; export it before running an enhancement"
            ))
        })
    }

    /// Usage store at the configured or default location.
    pub fn usage_store(&self) -> Option<UsageStore> {
        self.usage_path
            .clone()
            .or_else(UsageStore::default_path)
            .map(UsageStore::new)
    }

    /// Loads the configured font, or searches for a system font.
    pub fn typeface(&self) -> Result<Option<Typeface>> {
        match &self.font_path {
            Some(path) => Typeface::from_file(path).map(Some),
            None => Ok(Typeface::discover()),
        }
    }
}
