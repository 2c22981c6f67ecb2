//! Error types shared by every Strata crate.

use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Compilation-time failures (shape, metadata, parameterization) are raised
/// eagerly. Execution failures from the driver are carried through
/// unchanged in [`Error::Execution`].
#[derive(Error, Debug)]
pub enum Error {
    /// An expression node or method call has no registered translation.
    #[error("unsupported query shape: {0}")]
    UnsupportedShape(String),

    /// Evaluating an extracted constant subtree failed.
    #[error("failed to evaluate `{expression}` for query parameter: {source}")]
    Parameterization {
        /// Textual form of the offending expression.
        expression: String,
        /// The evaluation failure.
        #[source]
        source: Box<Error>,
    },

    /// The metadata model is inconsistent or a lookup failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The relational tree could not be rendered as SQL.
    #[error("SQL generation failed: {0}")]
    Generation(String),

    /// The underlying execution primitive failed.
    #[error(transparent)]
    Execution(Box<dyn std::error::Error + Send + Sync>),

    /// Local evaluation of an expression failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A result row could not be converted into the requested type.
    #[error("materialization failed: {0}")]
    Materialization(String),

    /// A single-element operator found zero or several elements.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The caller cancelled the operation.
    #[error("operation was cancelled")]
    Cancelled,

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps a driver error.
    pub fn execution(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Execution(err.into())
    }
}

/// Metadata model errors, raised at model-build or compile time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// No entity type with this name.
    #[error("entity type '{0}' was not found in the model")]
    EntityNotFound(String),

    /// The entity type has no such property.
    #[error("property '{property}' was not found on entity type '{entity}'")]
    PropertyNotFound {
        /// Entity type name.
        entity: String,
        /// Property name.
        property: String,
    },

    /// The entity type has no such navigation.
    #[error("navigation '{navigation}' was not found on entity type '{entity}'")]
    NavigationNotFound {
        /// Entity type name.
        entity: String,
        /// Navigation name.
        navigation: String,
    },

    /// A root entity type declares no key.
    #[error("entity type '{0}' has no key")]
    MissingKey(String),

    /// A key refers to an unknown property.
    #[error("key property '{property}' is not declared on entity type '{entity}'")]
    KeyPropertyMissing {
        /// Entity type name.
        entity: String,
        /// Property name.
        property: String,
    },

    /// A derived entity type declares its own key.
    #[error("derived entity type '{0}' cannot declare a key; keys are defined on the root")]
    DerivedTypeKey(String),

    /// The declared base type does not exist.
    #[error("base type '{base}' of entity type '{entity}' was not found")]
    BaseTypeNotFound {
        /// Entity type name.
        entity: String,
        /// Base type name.
        base: String,
    },

    /// The inheritance chain loops back on itself.
    #[error("inheritance cycle detected at entity type '{0}'")]
    InheritanceCycle(String),

    /// A discriminator property was declared on a derived type.
    #[error("discriminator property can only be set on the hierarchy root; '{entity}' derives from '{root}'")]
    DiscriminatorNotOnRoot {
        /// Entity type name.
        entity: String,
        /// Hierarchy root name.
        root: String,
    },

    /// A discriminator value was set but the root declares no discriminator property.
    #[error("cannot set a discriminator value for '{entity}' because root '{root}' has no discriminator property")]
    NoDiscriminator {
        /// Entity type name.
        entity: String,
        /// Hierarchy root name.
        root: String,
    },

    /// A discriminator value does not fit the discriminator property's type.
    #[error("discriminator value '{value}' for '{entity}' is not assignable to discriminator type {expected}")]
    DiscriminatorValueIncompatible {
        /// Entity type name.
        entity: String,
        /// The rejected value, rendered.
        value: String,
        /// The discriminator property type, rendered.
        expected: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterization_preserves_source() {
        let err = Error::Parameterization {
            expression: "(x / 0)".to_string(),
            source: Box::new(Error::Evaluation("division by zero".to_string())),
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("evaluation failed: division by zero"));
        assert!(err.to_string().contains("(x / 0)"));
    }

    #[test]
    fn test_execution_is_transparent() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::execution(io);
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_metadata_conversion() {
        let err: Error = MetadataError::EntityNotFound("Ghost".to_string()).into();
        assert!(matches!(err, Error::Metadata(MetadataError::EntityNotFound(_))));
    }
}
