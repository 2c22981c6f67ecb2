//! Store type mapping.
//!
//! A type mapper answers one question: which store type does a value or a
//! projected type map to. It is used to type bound parameters and to render
//! `CAST` targets, and it never touches a connection.

use std::fmt;

use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};

/// Maps query types to store types.
pub trait TypeMapper: Send + Sync + fmt::Debug {
    /// Returns the store type for a (possibly nullable) value type.
    fn store_type(&self, ty: &ValueType) -> Result<&'static str>;

    /// Returns the default store type for a runtime value; `None` for null.
    fn default_mapping(&self, value: &Value) -> Result<Option<&'static str>> {
        match value.value_type() {
            Some(ty) => self.store_type(&ty).map(Some),
            None => Ok(None),
        }
    }
}

fn unmapped(ty: &ValueType) -> Error {
    Error::Generation(format!("no store type mapping for {ty}"))
}

/// Store types for SQL Server-style databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerTypeMapper;

impl TypeMapper for SqlServerTypeMapper {
    fn store_type(&self, ty: &ValueType) -> Result<&'static str> {
        Ok(match ty.underlying() {
            ValueType::Bool => "bit",
            ValueType::Int32 => "int",
            ValueType::Int64 => "bigint",
            ValueType::Decimal => "decimal(18, 2)",
            ValueType::Float64 => "float",
            ValueType::String => "nvarchar(max)",
            ValueType::Bytes => "varbinary(max)",
            ValueType::DateTime => "datetime2",
            ValueType::DateTimeOffset => "datetimeoffset",
            ValueType::Guid => "uniqueidentifier",
            other => return Err(unmapped(other)),
        })
    }
}

/// Store types for SQLite's storage classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypeMapper;

impl TypeMapper for SqliteTypeMapper {
    fn store_type(&self, ty: &ValueType) -> Result<&'static str> {
        Ok(match ty.underlying() {
            ValueType::Bool | ValueType::Int32 | ValueType::Int64 => "INTEGER",
            ValueType::Float64 => "REAL",
            ValueType::Bytes => "BLOB",
            ValueType::Decimal
            | ValueType::String
            | ValueType::DateTime
            | ValueType::DateTimeOffset
            | ValueType::Guid => "TEXT",
            other => return Err(unmapped(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_maps_to_underlying() {
        let mapper = SqlServerTypeMapper;
        assert_eq!(
            mapper
                .store_type(&ValueType::Nullable(Box::new(ValueType::Int32)))
                .unwrap(),
            "int"
        );
    }

    #[test]
    fn test_default_mapping_of_null() {
        assert_eq!(SqliteTypeMapper.default_mapping(&Value::Null).unwrap(), None);
        assert_eq!(
            SqliteTypeMapper
                .default_mapping(&Value::Float64(1.0))
                .unwrap(),
            Some("REAL")
        );
    }

    #[test]
    fn test_entities_are_unmapped() {
        let result = SqlServerTypeMapper.store_type(&ValueType::Entity("Customer".to_string()));
        assert!(matches!(result, Err(Error::Generation(_))));
    }
}
