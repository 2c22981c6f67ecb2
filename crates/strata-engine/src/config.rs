//! Database configuration.

use serde::{Deserialize, Serialize};
use strata_adapters::DialectKind;

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of compiled queries kept in the cache.
    ///
    /// `None` keeps every compiled query for the life of the database.
    pub cache_capacity: Option<usize>,

    /// Render parameter values when logging commands.
    pub sensitive_data_logging: bool,

    /// SQL dialect commands are generated for.
    pub dialect: DialectKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: None,
            sensitive_data_logging: false,
            dialect: DialectKind::SqlServer,
        }
    }
}

impl Config {
    /// Configuration for a SQLite database.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::default().with_dialect(DialectKind::Sqlite)
    }

    /// Sets the compiled-query cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enables or disables logging of parameter values.
    #[must_use]
    pub fn with_sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    /// Sets the SQL dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = Config::sqlite()
            .with_cache_capacity(Some(64))
            .with_sensitive_data_logging(true);
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert_eq!(config.cache_capacity, Some(64));
        assert!(config.sensitive_data_logging);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{ "dialect": "sqlite" }"#).unwrap();
        assert_eq!(config, Config::sqlite());

        let config: Config = serde_json::from_str(r#"{ "cache_capacity": 8 }"#).unwrap();
        assert_eq!(config.cache_capacity, Some(8));
        assert_eq!(config.dialect, DialectKind::SqlServer);
    }
}
