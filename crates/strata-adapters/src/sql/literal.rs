//! Canonical SQL literal rendering.
//!
//! Every literal renders culture-invariant and round-trips through
//! [`parse_literal`]: integers and decimals as digits, floating point in a
//! fixed `{}E0` exponential template, text single-quoted with embedded
//! quotes doubled, binary data as a `0x` hex literal, and timestamps to the
//! millisecond (with offset where the type carries one).

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime};
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};
use uuid::Uuid;

/// Timestamp format without offset.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Timestamp format with offset.
pub const DATE_TIME_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Renders a value as a SQL literal, booleans as `1` / `0`.
pub fn format_literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Float64(f) => {
            if !f.is_finite() {
                return Err(Error::Generation(format!(
                    "floating point value {f} has no SQL literal form"
                )));
            }
            format!("{f}E0")
        }
        Value::String(s) => format_string(s),
        Value::Bytes(bytes) => format!("0x{}", hex::encode_upper(bytes)),
        Value::DateTime(dt) => format!("'{}'", dt.format(DATE_TIME_FORMAT)),
        Value::DateTimeOffset(dt) => format!("'{}'", dt.format(DATE_TIME_OFFSET_FORMAT)),
        Value::Guid(g) => format!("'{g}'"),
        Value::List(_) => {
            return Err(Error::Generation(
                "list values cannot be rendered as a single literal".to_string(),
            ));
        }
    })
}

/// Quotes text, doubling embedded quotes.
#[must_use]
pub fn format_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Parses a literal produced by [`format_literal`] back into a value.
pub fn parse_literal(text: &str, ty: &ValueType) -> Result<Value> {
    let invalid = |detail: &dyn std::fmt::Display| {
        Error::Generation(format!("invalid {ty} literal {text}: {detail}"))
    };
    if text == "NULL" {
        return Ok(Value::Null);
    }
    Ok(match ty.underlying() {
        ValueType::Bool => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            _ => return Err(invalid(&"expected 1 or 0")),
        },
        ValueType::Int32 => Value::Int32(text.parse().map_err(|e| invalid(&e))?),
        ValueType::Int64 => Value::Int64(text.parse().map_err(|e| invalid(&e))?),
        ValueType::Decimal => {
            Value::Decimal(BigDecimal::from_str(text).map_err(|e| invalid(&e))?)
        }
        ValueType::Float64 => Value::Float64(text.parse().map_err(|e| invalid(&e))?),
        ValueType::String => Value::String(unquote(text).ok_or_else(|| invalid(&"not quoted"))?),
        ValueType::Bytes => {
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("X'").and_then(|t| t.strip_suffix('\'')))
                .ok_or_else(|| invalid(&"missing hex prefix"))?;
            Value::Bytes(hex::decode(digits).map_err(|e| invalid(&e))?)
        }
        ValueType::DateTime => {
            let inner = unquote(text).ok_or_else(|| invalid(&"not quoted"))?;
            Value::DateTime(
                NaiveDateTime::parse_from_str(&inner, DATE_TIME_FORMAT).map_err(|e| invalid(&e))?,
            )
        }
        ValueType::DateTimeOffset => {
            let inner = unquote(text).ok_or_else(|| invalid(&"not quoted"))?;
            Value::DateTimeOffset(
                DateTime::parse_from_str(&inner, DATE_TIME_OFFSET_FORMAT)
                    .map_err(|e| invalid(&e))?,
            )
        }
        ValueType::Guid => {
            let inner = unquote(text).ok_or_else(|| invalid(&"not quoted"))?;
            Value::Guid(Uuid::parse_str(&inner).map_err(|e| invalid(&e))?)
        }
        _ => return Err(invalid(&"type has no literal form")),
    })
}

fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use proptest::prelude::*;

    #[test]
    fn test_string_quotes_are_doubled() {
        assert_eq!(
            format_literal(&Value::from("O'Brien")).unwrap(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_formats() {
        assert_eq!(format_literal(&Value::Bool(true)).unwrap(), "1");
        assert_eq!(format_literal(&Value::Float64(1.5)).unwrap(), "1.5E0");
        assert_eq!(
            format_literal(&Value::Bytes(vec![0xde, 0xad, 0x01])).unwrap(),
            "0xDEAD01"
        );
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(10, 15, 0, 250)
            .unwrap();
        assert_eq!(
            format_literal(&Value::DateTime(dt)).unwrap(),
            "'2024-03-01T10:15:00.250'"
        );
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dto = offset.from_local_datetime(&dt).unwrap();
        assert_eq!(
            format_literal(&Value::DateTimeOffset(dto)).unwrap(),
            "'2024-03-01T10:15:00.250+02:00'"
        );
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        assert!(format_literal(&Value::Float64(f64::NAN)).is_err());
    }

    #[test]
    fn test_list_is_rejected() {
        assert!(format_literal(&Value::List(vec![Value::Int32(1)])).is_err());
    }

    fn round_trip(value: &Value, ty: &ValueType) -> Value {
        parse_literal(&format_literal(value).unwrap(), ty).unwrap()
    }

    proptest! {
        #[test]
        fn test_int_round_trip(i in any::<i64>()) {
            prop_assert_eq!(round_trip(&Value::Int64(i), &ValueType::Int64), Value::Int64(i));
        }

        #[test]
        fn test_decimal_round_trip(units in any::<i64>(), scale in 0i64..10) {
            let d = BigDecimal::new(units.into(), scale);
            prop_assert_eq!(
                round_trip(&Value::Decimal(d.clone()), &ValueType::Decimal),
                Value::Decimal(d)
            );
        }

        #[test]
        fn test_string_round_trip(s in ".*") {
            prop_assert_eq!(
                round_trip(&Value::String(s.clone()), &ValueType::String),
                Value::String(s)
            );
        }

        #[test]
        fn test_bytes_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(
                round_trip(&Value::Bytes(bytes.clone()), &ValueType::Bytes),
                Value::Bytes(bytes)
            );
        }

        #[test]
        fn test_timestamp_round_trip(secs in 0i64..4_102_444_800, millis in 0u32..1000) {
            let dt = DateTime::from_timestamp(secs, millis * 1_000_000).unwrap().naive_utc();
            prop_assert_eq!(
                round_trip(&Value::DateTime(dt), &ValueType::DateTime),
                Value::DateTime(dt)
            );
        }
    }
}
