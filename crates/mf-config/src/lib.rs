//! minifeed/crates/mf-config/src/lib.rs
//!
//! Layered settings: built-in defaults, then an optional `minifeed.toml`,
//! then `MINIFEED__*` environment variables (after loading `.env`).

use config::{Config, Environment, File, FileFormat};
use mf_core::settings::EngineSettings;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "minifeed";
const ENV_PREFIX: &str = "MINIFEED";
const DEFAULT_DATABASE_URL: &str = "sqlite:minifeed.db?mode=rwc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: SecretString,
    /// `None` selects the in-process cache store.
    pub redis_url: Option<SecretString>,
    pub log: LogSettings,
    pub engine: EngineSettings,
}

#[derive(Deserialize)]
struct RawSettings {
    database_url: String,
    redis_url: Option<String>,
    #[serde(default)]
    log: LogSettings,
    #[serde(default)]
    engine: EngineSettings,
}

impl TryFrom<RawSettings> for Settings {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let engine = raw.engine;
        if engine.hot.top_n == 0 {
            return Err(ConfigError::Invalid("engine.hot.top_n must be positive".into()));
        }
        if engine.feed.max_limit == 0 {
            return Err(ConfigError::Invalid("engine.feed.max_limit must be positive".into()));
        }
        if engine.feed.default_limit == 0 {
            return Err(ConfigError::Invalid("engine.feed.default_limit must be positive".into()));
        }
        if engine.hot.default_limit == 0 {
            return Err(ConfigError::Invalid("engine.hot.default_limit must be positive".into()));
        }
        let fpr = engine.bloom.false_positive_rate;
        if !(fpr > 0.0 && fpr < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "engine.bloom.false_positive_rate must be in (0, 1), got {fpr}"
            )));
        }

        Ok(Self {
            database_url: SecretString::from(raw.database_url),
            redis_url: raw
                .redis_url
                .filter(|url| !url.trim().is_empty())
                .map(SecretString::from),
            log: raw.log,
            engine,
        })
    }
}

impl Settings {
    /// Reads `.env`, `minifeed.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!(error = %err, "ignoring unreadable .env"),
        }
        Self::from_sources(File::with_name(CONFIG_FILE).required(false), environment())
    }

    /// Settings from a TOML document layered under `env`.
    pub fn from_toml(toml: &str, env: Environment) -> Result<Self, ConfigError> {
        Self::from_sources(File::from_str(toml, FileFormat::Toml), env)
    }

    fn from_sources<F>(file: F, env: Environment) -> Result<Self, ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let raw: RawSettings = Config::builder()
            .set_default("database_url", DEFAULT_DATABASE_URL)?
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        raw.try_into()
    }
}

/// `MINIFEED__ENGINE__HOT__TTL_SECS=120` sets `engine.hot.ttl_secs`.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
