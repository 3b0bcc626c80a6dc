//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which persistence backend the repositories run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Where the OpenAI-compatible LLM endpoint lives.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub use_remote: bool,
    pub local_url: String,
    pub remote_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
}

impl LlmConfig {
    /// The remote tunnel when enabled and configured, the local host otherwise.
    pub fn endpoint(&self) -> &str {
        match (&self.remote_url, self.use_remote) {
            (Some(remote), true) => remote,
            _ => &self.local_url,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Clone, Debug)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
    pub retention_weeks: usize,
    pub projects_per_language: usize,
    pub llm: LlmConfig,
    pub cloudinary: Option<CloudinaryConfig>,
    pub gmail: Option<GmailConfig>,
    pub google: Option<GoogleOAuthConfig>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Reads a group of variables that must be set together. `None` when all
/// are missing, an error when only some are.
fn group<const N: usize>(names: [&str; N]) -> Result<Option<[String; N]>, ConfigError> {
    let values = names.map(var);
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(missing) = names.iter().zip(values.iter()).find(|(_, v)| v.is_none()) {
        return Err(ConfigError::MissingVar(missing.0.to_string()));
    }
    Ok(Some(values.map(Option::unwrap_or_default)))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Store Settings ---
        let bind_address = parsed::<SocketAddr>(
            "BIND_ADDRESS",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        let store = match var("STORE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "STORE".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };
        let database_url = var("DATABASE_URL");
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let max_upload_bytes = parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;
        let retention_weeks = parsed("HISTORY_RETENTION_WEEKS", 26)?;
        let projects_per_language = parsed("PROJECTS_PER_LANGUAGE", 3)?;

        // --- LLM Settings ---
        let llm = LlmConfig {
            use_remote: parsed("LLM_USE_REMOTE", false)?,
            local_url: var("LLM_LOCAL_URL")
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            remote_url: var("LLM_REMOTE_URL"),
            model: var("LLM_MODEL").unwrap_or_else(|| "codellama".to_string()),
            api_key: var("LLM_API_KEY"),
        };

        // --- Optional Integrations ---
        let cloudinary = group([
            "CLOUDINARY_CLOUD_NAME",
            "CLOUDINARY_API_KEY",
            "CLOUDINARY_API_SECRET",
        ])?
        .map(|[cloud_name, api_key, api_secret]| CloudinaryConfig {
            cloud_name,
            api_key,
            api_secret,
            folder: var("CLOUDINARY_FOLDER").unwrap_or_else(|| "classroom".to_string()),
        });

        let gmail = group([
            "GMAIL_CLIENT_ID",
            "GMAIL_CLIENT_SECRET",
            "GMAIL_REFRESH_TOKEN",
            "GMAIL_SENDER",
        ])?
        .map(|[client_id, client_secret, refresh_token, sender]| GmailConfig {
            client_id,
            client_secret,
            refresh_token,
            sender,
        });

        let google = group([
            "GOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET",
            "GOOGLE_REDIRECT_URI",
        ])?
        .map(|[client_id, client_secret, redirect_uri]| GoogleOAuthConfig {
            client_id,
            client_secret,
            redirect_uri,
        });

        Ok(Self {
            bind_address,
            store,
            database_url,
            log_level,
            cors_origin,
            max_upload_bytes,
            retention_weeks,
            projects_per_language,
            llm,
            cloudinary,
            gmail,
            google,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(use_remote: bool, remote: Option<&str>) -> LlmConfig {
        LlmConfig {
            use_remote,
            local_url: "http://localhost:11434/v1".into(),
            remote_url: remote.map(str::to_string),
            model: "codellama".into(),
            api_key: None,
        }
    }

    #[test]
    fn llm_endpoint_switches_on_remote_flag() {
        assert_eq!(llm(false, Some("https://tunnel.example/v1")).endpoint(), "http://localhost:11434/v1");
        assert_eq!(llm(true, Some("https://tunnel.example/v1")).endpoint(), "https://tunnel.example/v1");
        assert_eq!(llm(true, None).endpoint(), "http://localhost:11434/v1");
    }

    #[test]
    fn partial_groups_are_rejected() {
        std::env::set_var("TEST_GROUP_A", "a");
        std::env::remove_var("TEST_GROUP_B");
        assert!(matches!(
            group(["TEST_GROUP_A", "TEST_GROUP_B"]),
            Err(ConfigError::MissingVar(name)) if name == "TEST_GROUP_B"
        ));

        std::env::remove_var("TEST_GROUP_A");
        assert!(group(["TEST_GROUP_A", "TEST_GROUP_B"]).unwrap().is_none());
    }
}
