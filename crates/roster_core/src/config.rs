//! Runtime configuration for maintenance jobs and request handlers.
//!
//! # Responsibility
//! - Load settings from a JSON file with per-field defaults.
//! - Apply `ROSTER_*` environment overrides.
//! - Validate values before any store access happens.
//!
//! # Invariants
//! - `store_timeout_ms` is always positive: store I/O never waits unbounded.
//! - Collection names and the member role are never empty.

use crate::logging::default_log_level;
use crate::model::member::STUDENT_ROLE;
use crate::repo::Collections;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "ROSTER_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "ROSTER_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ROSTER_LOG_DIR";
pub const ENV_STORE_TIMEOUT_MS: &str = "ROSTER_STORE_TIMEOUT_MS";

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RosterConfig {
    /// SQLite file backing the document store.
    pub db_path: Option<PathBuf>,
    /// Busy timeout for every store operation.
    pub store_timeout_ms: u64,
    /// Role tag of members that belong to groups.
    pub member_role: String,
    pub collections: Collections,
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            member_role: STUDENT_ROLE.to_string(),
            collections: Collections::default(),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl RosterConfig {
    /// Parses JSON text; absent fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            self.db_path = Some(PathBuf::from(value.trim()));
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            self.log_level = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_LOG_DIR).filter(|value| !value.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(value.trim()));
        }
        if let Some(value) = lookup(ENV_STORE_TIMEOUT_MS) {
            self.store_timeout_ms = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_STORE_TIMEOUT_MS} must be an integer, got `{value}`"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.member_role.trim().is_empty() {
            return Err(ConfigError::Invalid("member_role cannot be empty".to_string()));
        }
        for (field, name) in [
            ("collections.members", &self.collections.members),
            ("collections.groups", &self.collections.groups),
            ("collections.items", &self.collections.items),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} cannot be empty")));
            }
        }
        Ok(())
    }
}
