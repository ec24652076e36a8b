//! Configuration
//!
//! Settings are plain serde structs with sensible defaults. `from_env()` overlays
//! `WITRACK_*` environment variables on those defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default spacing between adjacent execution orders
pub const DEFAULT_ORDER_GAP: f64 = 1000.0;

/// Neighbours closer than this trigger a re-spacing pass
pub const DEFAULT_MIN_ORDER_GAP: f64 = 0.0001;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub database: DatabaseConfig,
    pub ordering: OrderingConfig,
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            ordering: OrderingConfig::from_env(),
        }
    }
}

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "witrack".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("WITRACK_DB_HOST", defaults.host),
            port: env_parse("WITRACK_DB_PORT", defaults.port),
            dbname: env_or("WITRACK_DB_NAME", defaults.dbname),
            user: env_or("WITRACK_DB_USER", defaults.user),
            password: env_or("WITRACK_DB_PASSWORD", defaults.password),
            max_size: env_parse("WITRACK_DB_POOL_SIZE", defaults.max_size),
            timeout_secs: env_parse("WITRACK_DB_TIMEOUT", defaults.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    /// Spacing for new top items and for re-spaced spaces
    pub gap: f64,
    /// Smallest neighbour distance a placement may split
    pub min_gap: f64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            gap: DEFAULT_ORDER_GAP,
            min_gap: DEFAULT_MIN_ORDER_GAP,
        }
    }
}

impl OrderingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gap: env_parse("WITRACK_ORDER_GAP", defaults.gap),
            min_gap: env_parse("WITRACK_ORDER_MIN_GAP", defaults.min_gap),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.max_size, 16);
        assert_eq!(config.database.timeout(), Duration::from_secs(30));
        assert_eq!(config.ordering.gap, 1000.0);
        assert_eq!(config.ordering.min_gap, 0.0001);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{ "ordering": { "gap": 10.0 } }"#).unwrap();
        assert_eq!(config.ordering.gap, 10.0);
        assert_eq!(config.ordering.min_gap, DEFAULT_MIN_ORDER_GAP);
        assert_eq!(config.database.dbname, "witrack");
    }

    #[test]
    fn test_password_not_serialized() {
        let mut config = DatabaseConfig::default();
        config.password = "secret".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
