//! Parameter extraction.
//!
//! Replaces every maximal evaluatable subtree with a named parameter,
//! evaluating it immediately and recording the value in the query context.
//! The rewritten tree no longer depends on captured values, so it prints
//! identically for every execution of the same query shape.

use strata_common::types::ValueType;
use strata_common::utils::error::{Error, Result};
use strata_core::expression::{Expr, UnaryOp, evaluate};
use tracing::debug;

use super::context::QueryContext;
use super::evaluatable::PartialEvaluationInfo;

/// Prefix of every extracted parameter name.
pub const PARAMETER_PREFIX: &str = "__";

/// Rewrites evaluatable subtrees into parameters.
pub struct ParameterExtractor<'a, 'c> {
    info: &'a PartialEvaluationInfo<'a>,
    context: &'c mut QueryContext,
}

impl<'a, 'c> ParameterExtractor<'a, 'c> {
    /// Creates an extractor over the analyzed tree.
    pub fn new(info: &'a PartialEvaluationInfo<'a>, context: &'c mut QueryContext) -> Self {
        Self { info, context }
    }

    /// Returns the rewritten tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parameterization`] when evaluating a subtree fails.
    pub fn extract(&mut self, expr: &Expr) -> Result<Expr> {
        self.visit(expr)
    }

    fn visit(&mut self, expr: &Expr) -> Result<Expr> {
        // Late-bound property reads stay as they are, children included
        if matches!(expr, Expr::Property { .. }) {
            return Ok(expr.clone());
        }
        if matches!(expr, Expr::Lambda { .. }) || !self.info.is_evaluatable(expr) {
            return expr.map_children(|child| self.visit(child));
        }

        let mut target = expr;
        if let Expr::Unary {
            op: UnaryOp::Convert(ty),
            operand,
            ..
        } = expr
        {
            if matches!(strip_convert(operand), Expr::Constant { .. }) {
                return Ok(expr.clone());
            }
            let widens_to_nullable = matches!(ty, ValueType::Nullable(_))
                && !matches!(operand.ty(), ValueType::Nullable(_));
            if widens_to_nullable || *ty == ValueType::Object {
                target = operand;
            }
        }

        if matches!(target, Expr::Constant { .. }) || target.ty().is_queryable() {
            return Ok(expr.clone());
        }

        let value = evaluate(target).map_err(|source| Error::Parameterization {
            expression: expr.to_string(),
            source: Box::new(source),
        })?;
        let name = format!(
            "{PARAMETER_PREFIX}{}_{}",
            parameter_base_name(target),
            self.context.parameter_count()
        );
        debug!(parameter = %name, "Extracted query parameter");
        self.context.add_parameter(name.clone(), value);

        let parameter = Expr::parameter(name, target.ty());
        Ok(if target.ty() == expr.ty() {
            parameter
        } else {
            parameter.convert(expr.ty())
        })
    }
}

fn strip_convert(expr: &Expr) -> &Expr {
    match expr {
        Expr::Unary {
            op: UnaryOp::Convert(_),
            operand,
            ..
        } => strip_convert(operand),
        other => other,
    }
}

/// Names a parameter after the member chain it reads, e.g. `customer_Name`
/// for a captured `customer.Name`. Compiler-generated prefixes ending in `>`
/// are dropped.
fn parameter_base_name(expr: &Expr) -> String {
    let mut chain = Vec::new();
    let mut current = expr;
    while let Expr::Member { target, member, .. } = current {
        chain.push(member.as_str());
        current = target;
    }
    chain.reverse();
    let name = chain.join("_");
    let name = match name.rfind('>') {
        Some(index) => &name[index + 1..],
        None => name.as_str(),
    };
    if name.is_empty() {
        "p".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::evaluatable::NullEvaluatableFilter;
    use strata_common::types::Value;
    use strata_core::expression::LambdaParam;

    fn customer() -> ValueType {
        ValueType::Entity("Customer".to_string())
    }

    fn extract(expr: &Expr) -> Result<(Expr, QueryContext)> {
        let mut context = QueryContext::new();
        let info = PartialEvaluationInfo::analyze(expr, &NullEvaluatableFilter);
        let rewritten = ParameterExtractor::new(&info, &mut context).extract(expr)?;
        Ok((rewritten, context))
    }

    fn where_city(city: Expr) -> Expr {
        let body = Expr::parameter("c", customer())
            .member("City", ValueType::String)
            .eq(city);
        Expr::Source {
            entity: "Customer".to_string(),
        }
        .operator(
            "Where",
            vec![Expr::lambda(
                vec![LambdaParam {
                    name: "c".to_string(),
                    ty: customer(),
                }],
                body,
            )],
            ValueType::Query(Box::new(customer())),
        )
    }

    #[test]
    fn test_captured_value_becomes_parameter() {
        let (rewritten, context) = extract(&where_city(Expr::capture("city", "London"))).unwrap();
        assert_eq!(
            rewritten.to_string(),
            "Where(Source<Customer>, c => (c.City == __city_0))"
        );
        assert_eq!(
            context.parameter_values().get("__city_0"),
            Some(&Value::from("London"))
        );
    }

    #[test]
    fn test_same_shape_for_different_values() {
        let (a, _) = extract(&where_city(Expr::capture("city", "London"))).unwrap();
        let (b, context) = extract(&where_city(Expr::capture("city", "Paris"))).unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(
            context.parameter_values().get("__city_0"),
            Some(&Value::from("Paris"))
        );
    }

    #[test]
    fn test_constants_stay_inline() {
        let (rewritten, context) = extract(&where_city(Expr::constant("London"))).unwrap();
        assert!(rewritten.to_string().contains("\"London\""));
        assert_eq!(context.parameter_count(), 0);
    }

    #[test]
    fn test_convert_of_constant_is_untouched() {
        let converted = Expr::constant(5).convert(ValueType::Int64);
        let (rewritten, context) = extract(&converted).unwrap();
        assert_eq!(rewritten, converted);
        assert_eq!(context.parameter_count(), 0);
    }

    #[test]
    fn test_nullable_convert_extracts_operand() {
        let nullable = ValueType::Nullable(Box::new(ValueType::Int32));
        let converted = Expr::capture("age", 30).convert(nullable.clone());
        let (rewritten, _) = extract(&converted).unwrap();
        match rewritten {
            Expr::Unary {
                op: UnaryOp::Convert(ty),
                operand,
                ..
            } => {
                assert_eq!(ty, nullable);
                assert_eq!(*operand, Expr::parameter("__age_0", ValueType::Int32));
            }
            other => panic!("Expected Convert, got {other}"),
        }
    }

    #[test]
    fn test_names_are_suffixed_by_count() {
        let tree = Expr::capture("a", 1).add(Expr::parameter("x", ValueType::Int32));
        let tree = tree.add(Expr::capture("b", 2));
        let (rewritten, context) = extract(&tree).unwrap();
        assert_eq!(rewritten.to_string(), "((__a_0 + x) + __b_1)");
        assert_eq!(context.parameter_count(), 2);
    }

    #[test]
    fn test_compiler_prefix_is_stripped() {
        let tree = Expr::capture("<>h__TransparentIdentifier0", 1);
        assert_eq!(parameter_base_name(&tree), "h__TransparentIdentifier0");
        let computed = Expr::capture("a", 1).add(Expr::capture("b", 2));
        assert_eq!(parameter_base_name(&computed), "p");
    }

    #[test]
    fn test_evaluation_failure_is_wrapped() {
        let tree = Expr::capture("x", 1)
            .div(Expr::capture("zero", 0))
            .add(Expr::parameter("y", ValueType::Int32));
        let err = extract(&tree).unwrap_err();
        match err {
            Error::Parameterization { expression, source } => {
                assert_eq!(expression, "(value(<>c__DisplayClass).x / value(<>c__DisplayClass).zero)");
                assert!(matches!(*source, Error::Evaluation(_)));
            }
            other => panic!("Expected Parameterization, got {other:?}"),
        }
    }

    #[test]
    fn test_property_access_is_preserved() {
        let tree = Expr::capture("entity", 1).property("Name", ValueType::String);
        let (rewritten, context) = extract(&tree).unwrap();
        assert_eq!(rewritten, tree);
        assert_eq!(context.parameter_count(), 0);
    }
}
