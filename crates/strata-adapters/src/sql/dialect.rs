//! SQL dialects.
//!
//! The generator is written once against [`SqlDialect`]; providers override
//! the handful of hooks where their SQL differs. The defaults describe a
//! SQL Server-style dialect.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::types::Value;
use strata_common::utils::error::{Error, Result};

use super::literal;
use super::type_mapper::{SqlServerTypeMapper, SqliteTypeMapper, TypeMapper};

/// How row limits and offsets are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `TOP(n)` for a bare limit, `OFFSET n ROWS FETCH NEXT m ROWS ONLY` otherwise.
    TopOffsetFetch,
    /// `LIMIT n OFFSET m`.
    LimitOffset,
}

/// Provider-specific SQL hooks.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Dialect name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Store type mapping used for parameters and casts.
    fn type_mapper(&self) -> &dyn TypeMapper;

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "+"
    }

    /// Boolean true in comparison position.
    fn true_literal(&self) -> &'static str {
        "1"
    }

    /// Boolean false in comparison position.
    fn false_literal(&self) -> &'static str {
        "0"
    }

    /// Boolean true usable as a value.
    fn typed_true_literal(&self) -> &'static str {
        "CAST(1 AS BIT)"
    }

    /// Boolean false usable as a value.
    fn typed_false_literal(&self) -> &'static str {
        "CAST(0 AS BIT)"
    }

    /// Prefix of parameter placeholders.
    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    /// Paging syntax.
    fn paging_style(&self) -> PagingStyle {
        PagingStyle::TopOffsetFetch
    }

    /// Function returning the length of a string.
    fn string_length_function(&self) -> &'static str {
        "LEN"
    }

    /// Counting aggregate, 32-bit or 64-bit.
    fn count_function(&self, long: bool) -> &'static str {
        if long { "COUNT_BIG" } else { "COUNT" }
    }

    /// Delimits an identifier; empty identifiers are rejected.
    fn delimit_identifier(&self, identifier: &str) -> Result<String> {
        if identifier.is_empty() {
            return Err(Error::Generation(
                "identifiers must not be empty".to_string(),
            ));
        }
        Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
    }

    /// Renders a literal value.
    fn generate_literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Bool(b) => Ok(if *b {
                self.true_literal()
            } else {
                self.false_literal()
            }
            .to_string()),
            other => literal::format_literal(other),
        }
    }
}

/// SQL Server-style dialect; uses the trait defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect {
    type_mapper: SqlServerTypeMapper,
}

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.type_mapper
    }
}

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect {
    type_mapper: SqliteTypeMapper,
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.type_mapper
    }

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    fn typed_true_literal(&self) -> &'static str {
        "1"
    }

    fn typed_false_literal(&self) -> &'static str {
        "0"
    }

    fn paging_style(&self) -> PagingStyle {
        PagingStyle::LimitOffset
    }

    fn string_length_function(&self) -> &'static str {
        "length"
    }

    fn count_function(&self, _long: bool) -> &'static str {
        "COUNT"
    }

    fn generate_literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Bytes(bytes) => Ok(format!("X'{}'", hex::encode_upper(bytes))),
            Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            other => literal::format_literal(other),
        }
    }
}

/// Selects a built-in dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// [`SqlServerDialect`]
    #[default]
    SqlServer,
    /// [`SqliteDialect`]
    Sqlite,
}

impl DialectKind {
    /// Instantiates the dialect.
    #[must_use]
    pub fn dialect(self) -> Arc<dyn SqlDialect> {
        match self {
            Self::SqlServer => Arc::new(SqlServerDialect::default()),
            Self::Sqlite => Arc::new(SqliteDialect::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimit_identifier() {
        let dialect = SqlServerDialect::default();
        assert_eq!(dialect.delimit_identifier("Name").unwrap(), "\"Name\"");
        assert_eq!(dialect.delimit_identifier("a\"b").unwrap(), "\"a\"\"b\"");
        assert!(dialect.delimit_identifier("").is_err());
    }

    #[test]
    fn test_sqlite_overrides() {
        let dialect = DialectKind::Sqlite.dialect();
        assert_eq!(dialect.concat_operator(), "||");
        assert_eq!(dialect.paging_style(), PagingStyle::LimitOffset);
        assert_eq!(
            dialect.generate_literal(&Value::Bytes(vec![1, 255])).unwrap(),
            "X'01FF'"
        );
    }

    #[test]
    fn test_default_dialect_literals() {
        let dialect = DialectKind::default().dialect();
        assert_eq!(dialect.name(), "sqlserver");
        assert_eq!(dialect.generate_literal(&Value::Bool(false)).unwrap(), "0");
        assert_eq!(dialect.typed_true_literal(), "CAST(1 AS BIT)");
        assert_eq!(dialect.count_function(true), "COUNT_BIG");
    }
}
