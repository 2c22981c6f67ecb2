//! Row buffers.

use std::str::FromStr;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, NaiveDateTime};
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};
use uuid::Uuid;

use super::materialize::FromValue;

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueBuffer {
    values: Vec<Value>,
}

impl ValueBuffer {
    /// Wraps already-coerced values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row of `width` nulls.
    #[must_use]
    pub fn nulls(width: usize) -> Self {
        Self {
            values: vec![Value::Null; width],
        }
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Reads and converts the value at `index`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Materialization(format!(
                "column index {index} is out of range for a row of {} columns",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns the values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the buffer, returning the values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Builds [`ValueBuffer`]s from raw driver rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueBufferFactory {
    types: Vec<ValueType>,
}

impl ValueBufferFactory {
    /// Creates a factory for the given projected column types.
    #[must_use]
    pub fn new(types: Vec<ValueType>) -> Self {
        Self { types }
    }

    /// Returns the projected column types.
    #[must_use]
    pub fn types(&self) -> &[ValueType] {
        &self.types
    }

    /// Coerces a raw row to the projected types.
    pub fn create(&self, raw: Vec<Value>) -> Result<ValueBuffer> {
        if raw.len() != self.types.len() {
            return Err(Error::Materialization(format!(
                "expected {} columns, the reader produced {}",
                self.types.len(),
                raw.len()
            )));
        }
        let values = raw
            .into_iter()
            .zip(&self.types)
            .map(|(value, ty)| coerce(value, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(ValueBuffer { values })
    }
}

/// Converts a driver value to the given projected type.
pub fn coerce(value: Value, ty: &ValueType) -> Result<Value> {
    if value.is_null() {
        return Ok(value);
    }
    let target = ty.underlying();
    let converted = match (target, value) {
        (ValueType::Bool, Value::Bool(b)) => Value::Bool(b),
        (ValueType::Bool, Value::Int32(i)) => Value::Bool(i != 0),
        (ValueType::Bool, Value::Int64(i)) => Value::Bool(i != 0),

        (ValueType::Int32, Value::Int32(i)) => Value::Int32(i),
        (ValueType::Int32, Value::Int64(i)) => Value::Int32(i32::try_from(i).map_err(|_| {
            Error::Materialization(format!("value {i} does not fit in Int32"))
        })?),
        (ValueType::Int32, Value::Bool(b)) => Value::Int32(i32::from(b)),

        (ValueType::Int64, Value::Int32(i)) => Value::Int64(i64::from(i)),
        (ValueType::Int64, Value::Int64(i)) => Value::Int64(i),
        (ValueType::Int64, Value::Bool(b)) => Value::Int64(i64::from(b)),

        (ValueType::Float64, Value::Float64(f)) => Value::Float64(f),
        (ValueType::Float64, Value::Int32(i)) => Value::Float64(f64::from(i)),
        (ValueType::Float64, Value::Int64(i)) => Value::Float64(i as f64),
        (ValueType::Float64, Value::Decimal(d)) => Value::Float64(d.to_f64().ok_or_else(|| {
            Error::Materialization(format!("decimal {d} is out of range for Float64"))
        })?),

        (ValueType::Decimal, Value::Decimal(d)) => Value::Decimal(d),
        (ValueType::Decimal, Value::Int32(i)) => Value::Decimal(BigDecimal::from(i)),
        (ValueType::Decimal, Value::Int64(i)) => Value::Decimal(BigDecimal::from(i)),
        (ValueType::Decimal, Value::Float64(f)) => {
            Value::Decimal(BigDecimal::from_f64(f).ok_or_else(|| {
                Error::Materialization(format!("{f} cannot be represented as a decimal"))
            })?)
        }
        (ValueType::Decimal, Value::String(s)) => Value::Decimal(
            BigDecimal::from_str(&s)
                .map_err(|e| Error::Materialization(format!("invalid decimal '{s}': {e}")))?,
        ),

        (ValueType::String, Value::String(s)) => Value::String(s),
        (ValueType::Bytes, Value::Bytes(b)) => Value::Bytes(b),

        (ValueType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
        (ValueType::DateTime, Value::String(s)) => Value::DateTime(parse_date_time(&s)?),

        (ValueType::DateTimeOffset, Value::DateTimeOffset(dt)) => Value::DateTimeOffset(dt),
        (ValueType::DateTimeOffset, Value::String(s)) => Value::DateTimeOffset(
            DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f%:z")
                .or_else(|_| DateTime::parse_from_rfc3339(&s))
                .map_err(|e| {
                    Error::Materialization(format!("invalid date/time offset '{s}': {e}"))
                })?,
        ),

        (ValueType::Guid, Value::Guid(g)) => Value::Guid(g),
        (ValueType::Guid, Value::String(s)) => Value::Guid(
            Uuid::parse_str(&s)
                .map_err(|e| Error::Materialization(format!("invalid GUID '{s}': {e}")))?,
        ),
        (ValueType::Guid, Value::Bytes(b)) => Value::Guid(
            Uuid::from_slice(&b)
                .map_err(|e| Error::Materialization(format!("invalid GUID bytes: {e}")))?,
        ),

        // Shapes without a storage class pass through
        (
            ValueType::Object
            | ValueType::Entity(_)
            | ValueType::Anonymous(_)
            | ValueType::Closure(_)
            | ValueType::List(_)
            | ValueType::Query(_),
            value,
        ) => value,

        (expected, value) => {
            return Err(Error::Materialization(format!(
                "cannot convert {} to {expected}",
                value.type_name()
            )));
        }
    };
    Ok(converted)
}

fn parse_date_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| Error::Materialization(format!("invalid date/time '{s}': {e}")))
}
