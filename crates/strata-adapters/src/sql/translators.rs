//! Instance method and member translations.
//!
//! The relational translator hands string method calls and members it
//! meets inside predicates and projections to [`MethodCallTranslators`] and
//! [`translate_member`]. A method no translator claims is an unsupported
//! query shape.

use strata_common::types::ValueType;
use strata_common::utils::error::{Error, Result};
use strata_core::relational::{SqlBinaryOp, SqlExpr};

use super::dialect::SqlDialect;

/// Translates one family of instance methods.
pub trait MethodCallTranslator: Send + Sync {
    /// Returns the SQL form of `instance.method(args)`, or `None` if the
    /// call is not handled here.
    fn translate(
        &self,
        instance: &SqlExpr,
        method: &str,
        args: &[SqlExpr],
        dialect: &dyn SqlDialect,
    ) -> Option<SqlExpr>;
}

fn concat(left: SqlExpr, right: SqlExpr) -> SqlExpr {
    SqlExpr::binary(SqlBinaryOp::Add, left, right)
}

/// `StartsWith`, `EndsWith` and `Contains` as `LIKE`.
#[derive(Debug, Default)]
pub struct StringLikeTranslator;

impl MethodCallTranslator for StringLikeTranslator {
    fn translate(
        &self,
        instance: &SqlExpr,
        method: &str,
        args: &[SqlExpr],
        _dialect: &dyn SqlDialect,
    ) -> Option<SqlExpr> {
        let [arg] = args else {
            return None;
        };
        if !instance.ty().is_textual() || !arg.ty().is_textual() {
            return None;
        }
        let wildcard = || SqlExpr::constant("%");
        let pattern = match method {
            "StartsWith" => concat(arg.clone(), wildcard()),
            "EndsWith" => concat(wildcard(), arg.clone()),
            "Contains" => concat(concat(wildcard(), arg.clone()), wildcard()),
            _ => return None,
        };
        Some(SqlExpr::Like {
            operand: Box::new(instance.clone()),
            pattern: Box::new(pattern),
        })
    }
}

/// `ToUpper`, `ToLower` and `Trim` as scalar functions.
#[derive(Debug, Default)]
pub struct StringFunctionTranslator;

impl MethodCallTranslator for StringFunctionTranslator {
    fn translate(
        &self,
        instance: &SqlExpr,
        method: &str,
        args: &[SqlExpr],
        _dialect: &dyn SqlDialect,
    ) -> Option<SqlExpr> {
        if !args.is_empty() || !instance.ty().is_textual() {
            return None;
        }
        let function = |name: &str, arg: SqlExpr| SqlExpr::Function {
            name: name.to_string(),
            args: vec![arg],
            ty: ValueType::String,
        };
        match method {
            "ToUpper" => Some(function("UPPER", instance.clone())),
            "ToLower" => Some(function("LOWER", instance.clone())),
            "Trim" => Some(function("LTRIM", function("RTRIM", instance.clone()))),
            _ => None,
        }
    }
}

/// The registered method translators, tried in order.
pub struct MethodCallTranslators {
    translators: Vec<Box<dyn MethodCallTranslator>>,
}

impl Default for MethodCallTranslators {
    fn default() -> Self {
        Self {
            translators: vec![
                Box::new(StringLikeTranslator),
                Box::new(StringFunctionTranslator),
            ],
        }
    }
}

impl std::fmt::Debug for MethodCallTranslators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodCallTranslators")
            .field("count", &self.translators.len())
            .finish()
    }
}

impl MethodCallTranslators {
    /// Adds a translator tried after the built-in ones.
    pub fn register(&mut self, translator: Box<dyn MethodCallTranslator>) {
        self.translators.push(translator);
    }

    /// Translates a method call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedShape`] when no translator handles it.
    pub fn translate(
        &self,
        instance: &SqlExpr,
        method: &str,
        args: &[SqlExpr],
        dialect: &dyn SqlDialect,
    ) -> Result<SqlExpr> {
        self.translators
            .iter()
            .find_map(|t| t.translate(instance, method, args, dialect))
            .ok_or_else(|| {
                Error::UnsupportedShape(format!(
                    "method '{method}' on {} has no SQL translation",
                    instance.ty()
                ))
            })
    }
}

/// Translates a member of a non-entity value, e.g. `Length` of a string.
#[must_use]
pub fn translate_member(
    instance: &SqlExpr,
    member: &str,
    dialect: &dyn SqlDialect,
) -> Option<SqlExpr> {
    match member {
        "Length" if instance.ty().is_textual() => Some(SqlExpr::Function {
            name: dialect.string_length_function().to_string(),
            args: vec![instance.clone()],
            ty: ValueType::Int32,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::{SqlServerDialect, SqliteDialect};

    fn name() -> SqlExpr {
        SqlExpr::column("c", "Name", ValueType::String, true)
    }

    #[test]
    fn test_starts_with() {
        let translated = MethodCallTranslators::default()
            .translate(
                &name(),
                "StartsWith",
                &[SqlExpr::constant("An")],
                &SqlServerDialect::default(),
            )
            .unwrap();
        match translated {
            SqlExpr::Like { pattern, .. } => {
                assert_eq!(*pattern, concat(SqlExpr::constant("An"), SqlExpr::constant("%")));
            }
            other => panic!("Expected Like, got {other:?}"),
        }
    }

    #[test]
    fn test_trim_nests_functions() {
        let translated = MethodCallTranslators::default()
            .translate(&name(), "Trim", &[], &SqlServerDialect::default())
            .unwrap();
        match translated {
            SqlExpr::Function { name, args, .. } => {
                assert_eq!(name, "LTRIM");
                assert!(matches!(&args[0], SqlExpr::Function { name, .. } if name == "RTRIM"));
            }
            other => panic!("Expected Function, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        let result = MethodCallTranslators::default().translate(
            &name(),
            "Normalize",
            &[],
            &SqlServerDialect::default(),
        );
        assert!(matches!(result, Err(Error::UnsupportedShape(_))));
    }

    #[test]
    fn test_length_uses_dialect_function() {
        let sqlite = translate_member(&name(), "Length", &SqliteDialect::default()).unwrap();
        assert!(matches!(sqlite, SqlExpr::Function { ref name, .. } if name == "length"));
        let server = translate_member(&name(), "Length", &SqlServerDialect::default()).unwrap();
        assert_eq!(server.ty(), ValueType::Int32);
        assert!(translate_member(&name(), "Chars", &SqlServerDialect::default()).is_none());
    }
}
