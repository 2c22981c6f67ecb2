//! Typed materialization of values and rows.
//!
//! [`FromValue`] converts a single [`Value`]; [`Materialize`] builds a
//! result item from a whole [`ValueBuffer`]. Scalars, `Option`, and tuples
//! of up to four scalars are covered here. Entity types implement
//! [`Materialize`] themselves, reading columns in property order:
//!
//! ```
//! use strata_common::Result;
//! use strata_core::{Materialize, ValueBuffer};
//!
//! struct Customer {
//!     id: i32,
//!     name: Option<String>,
//! }
//!
//! impl Materialize for Customer {
//!     fn materialize(row: &ValueBuffer) -> Result<Self> {
//!         Ok(Self { id: row.get(0)?, name: row.get(1)? })
//!     }
//! }
//! ```

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use strata_common::types::Value;
use strata_common::utils::error::{Error, Result};
use uuid::Uuid;

use super::buffer::ValueBuffer;

/// Conversion from a single value.
pub trait FromValue: Sized {
    /// Converts the value, failing on null or a type mismatch.
    fn from_value(value: &Value) -> Result<Self>;
}

/// Construction of a result item from one row.
pub trait Materialize: Sized {
    /// Builds the item.
    fn materialize(row: &ValueBuffer) -> Result<Self>;
}

fn mismatch(value: &Value, expected: &str) -> Error {
    if value.is_null() {
        Error::Materialization(format!(
            "null value cannot be materialized as {expected}; request an Option instead"
        ))
    } else {
        Error::Materialization(format!(
            "expected {expected}, found {}",
            value.type_name()
        ))
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $name:literal, $($pattern:pat => $conv:expr),+ $(,)?) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                match value {
                    $($pattern => Ok($conv),)+
                    other => Err(mismatch(other, $name)),
                }
            }
        }

        impl Materialize for $ty {
            fn materialize(row: &ValueBuffer) -> Result<Self> {
                row.get(0)
            }
        }
    };
}

impl_from_value!(bool, "Bool", Value::Bool(b) => *b);
impl_from_value!(i32, "Int32", Value::Int32(i) => *i);
impl_from_value!(i64, "Int64",
    Value::Int64(i) => *i,
    Value::Int32(i) => i64::from(*i),
);
impl_from_value!(f64, "Float64",
    Value::Float64(f) => *f,
    Value::Int32(i) => f64::from(*i),
    Value::Int64(i) => *i as f64,
);
impl_from_value!(String, "String", Value::String(s) => s.clone());
impl_from_value!(Vec<u8>, "Bytes", Value::Bytes(b) => b.clone());
impl_from_value!(BigDecimal, "Decimal",
    Value::Decimal(d) => d.clone(),
    Value::Int32(i) => BigDecimal::from(*i),
    Value::Int64(i) => BigDecimal::from(*i),
);
impl_from_value!(NaiveDateTime, "DateTime", Value::DateTime(dt) => *dt);
impl_from_value!(DateTime<FixedOffset>, "DateTimeOffset", Value::DateTimeOffset(dt) => *dt);
impl_from_value!(Uuid, "Guid", Value::Guid(g) => *g);

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl Materialize for Value {
    fn materialize(row: &ValueBuffer) -> Result<Self> {
        row.get(0)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> Materialize for Option<T> {
    fn materialize(row: &ValueBuffer) -> Result<Self> {
        row.get(0)
    }
}

impl Materialize for Vec<Value> {
    fn materialize(row: &ValueBuffer) -> Result<Self> {
        Ok(row.values().to_vec())
    }
}

impl Materialize for ValueBuffer {
    fn materialize(row: &ValueBuffer) -> Result<Self> {
        Ok(row.clone())
    }
}

macro_rules! impl_tuple {
    ($($name:ident : $index:tt),+) => {
        impl<$($name: FromValue),+> Materialize for ($($name,)+) {
            fn materialize(row: &ValueBuffer) -> Result<Self> {
                Ok(($(row.get::<$name>($index)?,)+))
            }
        }
    };
}

impl_tuple!(A: 0, B: 1);
impl_tuple!(A: 0, B: 1, C: 2);
impl_tuple!(A: 0, B: 1, C: 2, D: 3);
