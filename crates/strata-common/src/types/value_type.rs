//! Static types of query expressions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The static type of an expression node, property, or projected column.
///
/// Scalar variants mirror [`Value`](super::Value). The remaining variants
/// describe shapes that only exist at query-construction time: entities,
/// in-memory lists, queryable sequences, captured closures, and anonymous
/// projections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Arbitrary precision decimal.
    Decimal,
    /// 64-bit floating point.
    Float64,
    /// Text.
    String,
    /// Binary data.
    Bytes,
    /// Date and time without offset.
    DateTime,
    /// Date and time with a fixed UTC offset.
    DateTimeOffset,
    /// 128-bit globally unique identifier.
    Guid,
    /// A value type that may additionally hold null.
    Nullable(Box<ValueType>),
    /// An entity type from the metadata model, by name.
    Entity(String),
    /// An in-memory list.
    List(Box<ValueType>),
    /// A queryable sequence that is translated, never evaluated locally.
    Query(Box<ValueType>),
    /// A captured closure environment, by class name.
    Closure(String),
    /// An anonymous projection with named members.
    Anonymous(Vec<(String, ValueType)>),
    /// Untyped object.
    Object,
}

impl ValueType {
    /// Returns true for types that can never hold null unless wrapped in
    /// [`ValueType::Nullable`].
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int32
                | Self::Int64
                | Self::Decimal
                | Self::Float64
                | Self::DateTime
                | Self::DateTimeOffset
                | Self::Guid
        )
    }

    /// Returns true if a value of this type may be null.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        !self.is_value_type()
    }

    /// Wraps value types in [`ValueType::Nullable`]; other types are returned as-is.
    #[must_use]
    pub fn make_nullable(self) -> Self {
        if self.is_value_type() {
            Self::Nullable(Box::new(self))
        } else {
            self
        }
    }

    /// Strips a [`ValueType::Nullable`] wrapper.
    #[must_use]
    pub fn underlying(&self) -> &ValueType {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Returns true for in-memory lists and queryable sequences.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::List(_) | Self::Query(_))
    }

    /// Returns true for queryable sequences.
    #[must_use]
    pub fn is_queryable(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns the item type of a sequence type.
    #[must_use]
    pub fn sequence_item(&self) -> Option<&ValueType> {
        match self {
            Self::List(item) | Self::Query(item) => Some(item),
            _ => None,
        }
    }

    /// Returns true if the (underlying) type is text.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self.underlying(), Self::String)
    }

    /// Returns true if the (underlying) type is boolean.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        matches!(self.underlying(), Self::Bool)
    }

    /// Returns true if the (underlying) type is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.underlying(),
            Self::Int32 | Self::Int64 | Self::Decimal | Self::Float64
        )
    }

    /// Returns the member type of an anonymous projection.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&ValueType> {
        match self {
            Self::Anonymous(members) => members.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Decimal => write!(f, "Decimal"),
            Self::Float64 => write!(f, "Float64"),
            Self::String => write!(f, "String"),
            Self::Bytes => write!(f, "Bytes"),
            Self::DateTime => write!(f, "DateTime"),
            Self::DateTimeOffset => write!(f, "DateTimeOffset"),
            Self::Guid => write!(f, "Guid"),
            Self::Nullable(inner) => write!(f, "Nullable<{inner}>"),
            Self::Entity(name) => write!(f, "{name}"),
            Self::List(item) => write!(f, "List<{item}>"),
            Self::Query(item) => write!(f, "Query<{item}>"),
            Self::Closure(class) => write!(f, "Closure<{class}>"),
            Self::Anonymous(members) => {
                write!(f, "{{ ")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, " }}")
            }
            Self::Object => write!(f, "Object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_nullable() {
        assert_eq!(
            ValueType::Int32.make_nullable(),
            ValueType::Nullable(Box::new(ValueType::Int32))
        );
        // Reference-like types are already nullable
        assert_eq!(ValueType::String.make_nullable(), ValueType::String);
        let nullable = ValueType::Bool.make_nullable();
        assert_eq!(nullable.clone().make_nullable(), nullable);
    }

    #[test]
    fn test_predicates() {
        let nullable_text = ValueType::Nullable(Box::new(ValueType::String));
        assert!(nullable_text.is_textual());
        assert!(ValueType::Nullable(Box::new(ValueType::Bool)).is_boolean());
        assert!(!ValueType::Int32.is_nullable());
        assert!(ValueType::Entity("Customer".to_string()).is_nullable());

        let query = ValueType::Query(Box::new(ValueType::Entity("Customer".to_string())));
        assert!(query.is_sequence());
        assert!(query.is_queryable());
        assert!(!ValueType::List(Box::new(ValueType::Int32)).is_queryable());
    }

    #[test]
    fn test_display() {
        let anon = ValueType::Anonymous(vec![
            ("Name".to_string(), ValueType::String),
            ("Age".to_string(), ValueType::Nullable(Box::new(ValueType::Int32))),
        ]);
        assert_eq!(anon.to_string(), "{ Name: String, Age: Nullable<Int32> }");
        assert_eq!(
            ValueType::Query(Box::new(ValueType::Entity("Order".to_string()))).to_string(),
            "Query<Order>"
        );
    }
}
