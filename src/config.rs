// src/config.rs
use crate::errors::ReshapeError;
use crate::session::SessionPolicy;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Service configuration loaded from environment variables.
///
/// A `.env` file in the working directory is read first when present.
///
/// | Env var                    | Default                                          |
/// |----------------------------|--------------------------------------------------|
/// | `GEMINI_API_KEY`           | required (`API_KEY` is accepted as a fallback)   |
/// | `GEMINI_API_BASE`          | `https://generativelanguage.googleapis.com/v1beta` |
/// | `ANALYSIS_MODEL`           | `gemini-2.5-flash`                               |
/// | `IMAGE_MODEL`              | `gemini-2.5-flash-image`                         |
/// | `CHAT_MODEL`               | `gemini-2.5-flash`                               |
/// | `BIND_ADDR`                | `0.0.0.0:8080`                                   |
/// | `MAX_IMAGE_DIMENSION`      | `2048`                                           |
/// | `CLEAR_CHAT_ON_REANALYSIS` | `false`                                          |
/// | `REQUEST_TIMEOUT_SECS`     | `120`                                            |
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub analysis_model: String,
    pub image_model: String,
    pub chat_model: String,
    pub bind_addr: String,
    pub max_image_dimension: u32,
    pub clear_chat_on_reanalysis: bool,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ReshapeError> {
        if dotenvy::dotenv().is_ok() {
            log::debug!("Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReshapeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let api_key = get("GEMINI_API_KEY")
            .or_else(|| get("API_KEY"))
            .ok_or_else(|| ReshapeError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let max_image_dimension = match get("MAX_IMAGE_DIMENSION") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| invalid("MAX_IMAGE_DIMENSION", &raw))?,
            None => 2048,
        };

        let clear_chat_on_reanalysis = match get("CLEAR_CHAT_ON_REANALYSIS") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| invalid("CLEAR_CHAT_ON_REANALYSIS", &raw))?,
            None => false,
        };

        let timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| invalid("REQUEST_TIMEOUT_SECS", &raw))?,
            None => 120,
        };

        Ok(Self {
            api_key,
            api_base: or("GEMINI_API_BASE", DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            analysis_model: or("ANALYSIS_MODEL", "gemini-2.5-flash"),
            image_model: or("IMAGE_MODEL", "gemini-2.5-flash-image"),
            chat_model: or("CHAT_MODEL", "gemini-2.5-flash"),
            bind_addr: or("BIND_ADDR", "0.0.0.0:8080"),
            max_image_dimension,
            clear_chat_on_reanalysis,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            clear_chat_on_reanalysis: self.clear_chat_on_reanalysis,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, raw: &str) -> ReshapeError {
    ReshapeError::Config(format!("{} has an invalid value: {:?}", key, raw))
}
