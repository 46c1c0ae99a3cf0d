//! Process configuration.
//!
//! # Responsibility
//! - Resolve database location, logging settings, default umask and the
//!   cluster role from the process environment.
//! - Hand the write-authority decision to pools as explicit configuration.
//!
//! # Invariants
//! - The cluster role is read once at startup and never re-read.
//! - Unknown roles and malformed umasks are rejected, never defaulted.

use crate::logging::default_log_level;
use crate::model::permissions::DEFAULT_UMASK;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "MARKET_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "MARKET_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "MARKET_LOG_DIR";
pub const ENV_FEDERATION_ROLE: &str = "MARKET_FEDERATION_ROLE";
pub const ENV_UMASK: &str = "MARKET_UMASK";

/// Role of this process inside a federation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClusterRole {
    /// Not federated. Owns its catalog.
    #[default]
    Standalone,
    /// Federation master. Write authority for shared pools.
    Master,
    /// Federation slave. Read-only replica of shared pools.
    Slave,
}

impl ClusterRole {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "standalone" | "none" => Ok(Self::Standalone),
            "master" => Ok(Self::Master),
            "slave" | "replica" => Ok(Self::Slave),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }

    pub fn is_write_authority(self) -> bool {
        !matches!(self, Self::Slave)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Master => "master",
            Self::Slave => "slave",
        }
    }
}

/// Configuration injected into an `ObjectPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub write_authority: bool,
}

impl PoolConfig {
    pub fn for_role(role: ClusterRole) -> Self {
        Self {
            write_authority: role.is_write_authority(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_role(ClusterRole::default())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownRole(String),
    InvalidUmask(String),
    RelativePath { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRole(value) => write!(
                f,
                "unknown federation role `{value}`; expected standalone|master|slave"
            ),
            Self::InvalidUmask(value) => {
                write!(f, "invalid umask `{value}`; expected octal between 000 and 777")
            }
            Self::RelativePath { key, value } => {
                write!(f, "{key} must be an absolute path, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings for one catalog process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Database file. `None` means in-memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Log directory. `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
    pub role: ClusterRole,
    pub umask: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            role: ClusterRole::default(),
            umask: DEFAULT_UMASK,
        }
    }
}

impl CoreConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = value(ENV_DB_PATH) {
            config.db_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            config.log_level = level.trim().to_string();
        }
        if let Some(dir) = value(ENV_LOG_DIR) {
            let dir = PathBuf::from(dir.trim());
            if !dir.is_absolute() {
                return Err(ConfigError::RelativePath {
                    key: ENV_LOG_DIR,
                    value: dir.display().to_string(),
                });
            }
            config.log_dir = Some(dir);
        }
        if let Some(role) = value(ENV_FEDERATION_ROLE) {
            config.role = ClusterRole::parse(&role)?;
        }
        if let Some(umask) = value(ENV_UMASK) {
            config.umask = parse_umask(&umask)?;
        }

        Ok(config)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::for_role(self.role)
    }
}

fn parse_umask(value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    match u32::from_str_radix(digits, 8) {
        Ok(umask) if umask <= 0o777 => Ok(umask),
        _ => Err(ConfigError::InvalidUmask(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterRole, ConfigError, CoreConfig, PoolConfig, ENV_DB_PATH, ENV_FEDERATION_ROLE,
        ENV_LOG_DIR, ENV_UMASK,
    };
    use crate::model::permissions::DEFAULT_UMASK;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_from(pairs: &[(&str, &str)]) -> Result<CoreConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CoreConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.role, ClusterRole::Standalone);
        assert_eq!(config.umask, DEFAULT_UMASK);
        assert!(config.pool_config().write_authority);
    }

    #[test]
    fn slave_role_is_not_write_authority() {
        let config = config_from(&[(ENV_FEDERATION_ROLE, " SLAVE ")]).unwrap();
        assert_eq!(config.role, ClusterRole::Slave);
        assert_eq!(
            config.pool_config(),
            PoolConfig {
                write_authority: false
            }
        );
        assert!(PoolConfig::for_role(ClusterRole::Master).write_authority);
    }

    #[test]
    fn parses_paths_and_umask() {
        let config = config_from(&[
            (ENV_DB_PATH, "/var/lib/market/catalog.db"),
            (ENV_LOG_DIR, "/var/log/market"),
            (ENV_UMASK, "027"),
        ])
        .unwrap();
        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/var/lib/market/catalog.db"))
        );
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/market")));
        assert_eq!(config.umask, 0o027);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            config_from(&[(ENV_FEDERATION_ROLE, "leader")]).unwrap_err(),
            ConfigError::UnknownRole("leader".to_string())
        );
        assert!(matches!(
            config_from(&[(ENV_UMASK, "999")]).unwrap_err(),
            ConfigError::InvalidUmask(_)
        ));
        assert!(matches!(
            config_from(&[(ENV_UMASK, "1000")]).unwrap_err(),
            ConfigError::InvalidUmask(_)
        ));
        assert!(matches!(
            config_from(&[(ENV_LOG_DIR, "logs")]).unwrap_err(),
            ConfigError::RelativePath { .. }
        ));
    }
}
