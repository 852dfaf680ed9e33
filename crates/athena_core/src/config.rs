//! Process-level configuration for the Athena core.
//!
//! # Responsibility
//! - Collect store location, logging and reward tuning in one value.
//! - Read overrides from `ATHENA_*` environment variables.
//!
//! # Invariants
//! - Blank variables fall back to defaults; malformed ones are errors.
//! - `checkpoint_interval` is at least 1 and `default_zoom` lies in the
//!   reader's zoom bounds.

use crate::logging::{default_log_level, normalize_level};
use crate::reader::{MAX_ZOOM, MIN_ZOOM};
use crate::service::auth_service::DEFAULT_STARTING_EXP;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "ATHENA_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "ATHENA_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ATHENA_LOG_DIR";
pub const ENV_STARTING_EXP: &str = "ATHENA_STARTING_EXP";
pub const ENV_CHECKPOINT_INTERVAL: &str = "ATHENA_CHECKPOINT_INTERVAL";

pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 5;
pub const DEFAULT_ZOOM: f32 = 1.2;
const DEFAULT_STORE_FILE: &str = "athena_store.sqlite3";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { var: &'static str, value: String },
    InvalidLogLevel(String),
    RelativeLogDir(String),
    ZeroCheckpointInterval,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got `{value}`")
            }
            Self::InvalidLogLevel(value) => write!(
                f,
                "unsupported log level `{value}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeLogDir(value) => {
                write!(f, "log directory must be an absolute path, got `{value}`")
            }
            Self::ZeroCheckpointInterval => write!(f, "checkpoint interval must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// SQLite file backing the key-value store.
    pub store_path: PathBuf,
    pub log_level: &'static str,
    /// Absolute log directory; `None` leaves file logging off.
    pub log_dir: Option<PathBuf>,
    pub starting_exp: u64,
    pub checkpoint_interval: u32,
    pub default_zoom: f32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store_path: std::env::temp_dir().join(DEFAULT_STORE_FILE),
            log_level: default_log_level(),
            log_dir: None,
            starting_exp: DEFAULT_STARTING_EXP,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            default_zoom: DEFAULT_ZOOM,
        }
    }
}

impl CoreConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = value(ENV_DB_PATH) {
            config.store_path = PathBuf::from(path);
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            config.log_level =
                normalize_level(&level).map_err(|_| ConfigError::InvalidLogLevel(level))?;
        }
        if let Some(dir) = value(ENV_LOG_DIR) {
            if !Path::new(&dir).is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir));
            }
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = value(ENV_STARTING_EXP) {
            config.starting_exp = parse_number(ENV_STARTING_EXP, raw)?;
        }
        if let Some(raw) = value(ENV_CHECKPOINT_INTERVAL) {
            config.checkpoint_interval = parse_number(ENV_CHECKPOINT_INTERVAL, raw)?;
            if config.checkpoint_interval == 0 {
                return Err(ConfigError::ZeroCheckpointInterval);
            }
        }
        config.default_zoom = config.default_zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value: raw })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, ENV_CHECKPOINT_INTERVAL, ENV_LOG_DIR, ENV_STARTING_EXP};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let config = CoreConfig::from_lookup(lookup(&[(ENV_STARTING_EXP, "   ")]))
            .expect("blank values fall back");
        assert_eq!(config.starting_exp, 1000);
        assert_eq!(config.checkpoint_interval, 5);
        assert!(config.store_path.ends_with("athena_store.sqlite3"));
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("ATHENA_DB_PATH", "/data/athena.db"),
            ("ATHENA_LOG_LEVEL", "WARNING"),
            (ENV_STARTING_EXP, "250"),
            (ENV_CHECKPOINT_INTERVAL, "3"),
        ]))
        .expect("valid overrides");
        assert_eq!(config.store_path.to_str(), Some("/data/athena.db"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.starting_exp, 250);
        assert_eq!(config.checkpoint_interval, 3);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(
            CoreConfig::from_lookup(lookup(&[(ENV_STARTING_EXP, "-5")])),
            Err(ConfigError::InvalidNumber {
                var: ENV_STARTING_EXP,
                value: "-5".to_string()
            })
        );
        assert_eq!(
            CoreConfig::from_lookup(lookup(&[(ENV_CHECKPOINT_INTERVAL, "0")])),
            Err(ConfigError::ZeroCheckpointInterval)
        );
        assert!(matches!(
            CoreConfig::from_lookup(lookup(&[(ENV_LOG_DIR, "logs")])),
            Err(ConfigError::RelativeLogDir(_))
        ));
    }
}
