//! Predicate rewriting for SQL's three-valued logic.
//!
//! Source predicates are two-valued: `a == b` is true when both sides are
//! null and false when exactly one is. SQL comparisons against NULL yield
//! UNKNOWN instead. Before a `WHERE` predicate is emitted it goes through:
//!
//! 1. [`transform_null_comparisons`]: comparisons against a parameter whose
//!    bound value is null become `IS [NOT] NULL`.
//! 2. [`expand_optimized`], falling back to [`expand`] when the optimized
//!    form cannot be proven equivalent.
//! 3. [`reduce`]: removes the boolean artifacts the expansion introduces.
//!
//! [`rewrite_predicate`] runs the whole pipeline.

use strata_common::types::Value;
use strata_core::relational::{SqlBinaryOp, SqlExpr};

use super::ParameterValues;

/// Runs the full rewrite pipeline over a non-constant predicate.
///
/// With no bound parameters the predicate is only reduced.
#[must_use]
pub fn rewrite_predicate(predicate: &SqlExpr, values: &ParameterValues) -> SqlExpr {
    if values.is_empty() {
        return reduce(predicate);
    }
    let transformed = transform_null_comparisons(predicate, values);
    let expanded =
        expand_optimized(&transformed, values).unwrap_or_else(|| expand(&transformed, values));
    reduce(&expanded)
}

fn null_parameter<'a>(expr: &'a SqlExpr, values: &ParameterValues) -> Option<&'a str> {
    match expr {
        SqlExpr::Convert { operand, .. } | SqlExpr::Alias { expr: operand, .. } => {
            null_parameter(operand, values)
        }
        SqlExpr::Parameter { name, .. } => values
            .get(name)
            .filter(|v| v.is_null())
            .map(|_| name.as_str()),
        _ => None,
    }
}

fn is_null_constant(expr: &SqlExpr) -> bool {
    matches!(expr.unaliased(), SqlExpr::Constant { value: Value::Null, .. })
}

/// Rewrites `x = @p` / `x <> @p` to `x IS [NOT] NULL` wherever `@p` is bound
/// to null.
#[must_use]
pub fn transform_null_comparisons(predicate: &SqlExpr, values: &ParameterValues) -> SqlExpr {
    let rebuilt = predicate.map_children(|child| transform_null_comparisons(child, values));
    if let SqlExpr::Binary {
        op: op @ (SqlBinaryOp::Equal | SqlBinaryOp::NotEqual),
        left,
        right,
        ..
    } = &rebuilt
    {
        let negated = *op == SqlBinaryOp::NotEqual;
        let right_null = null_parameter(right, values).is_some() || is_null_constant(right);
        let left_null = null_parameter(left, values).is_some() || is_null_constant(left);
        if right_null {
            return SqlExpr::IsNull {
                operand: left.clone(),
                negated,
            };
        }
        if left_null {
            return SqlExpr::IsNull {
                operand: right.clone(),
                negated,
            };
        }
    }
    rebuilt
}

/// Nullability that consults bound values for parameters.
fn is_nullable(expr: &SqlExpr, values: &ParameterValues) -> bool {
    match expr {
        SqlExpr::Parameter { name, ty } => values.get(name).map_or(ty.is_nullable(), Value::is_null),
        SqlExpr::Alias { expr, .. }
        | SqlExpr::Convert { operand: expr, .. }
        | SqlExpr::Negate(expr) => is_nullable(expr, values),
        SqlExpr::Binary {
            op, left, right, ..
        } if !op.is_comparison() && !op.is_logical() => {
            is_nullable(left, values) || is_nullable(right, values)
        }
        SqlExpr::Coalesce { right, .. } => is_nullable(right, values),
        other => other.can_be_null(),
    }
}

struct OptimizedExpander<'a> {
    values: &'a ParameterValues,
    negated: bool,
    possible: bool,
}

impl OptimizedExpander<'_> {
    fn visit(&mut self, expr: &SqlExpr) -> SqlExpr {
        match expr {
            SqlExpr::Binary {
                op: SqlBinaryOp::And | SqlBinaryOp::Or,
                ..
            } => expr.map_children(|child| self.visit(child)),
            SqlExpr::Not(operand) => {
                self.negated = !self.negated;
                let operand = self.visit(operand);
                self.negated = !self.negated;
                SqlExpr::not(operand)
            }
            SqlExpr::Binary {
                op, left, right, ..
            } if op.is_comparison() => {
                let left_nullable = is_nullable(left, self.values);
                let right_nullable = is_nullable(right, self.values);
                if !left_nullable && !right_nullable {
                    return expr.clone();
                }
                if self.negated || *op != SqlBinaryOp::Equal {
                    self.possible = false;
                    return expr.clone();
                }
                if left_nullable && right_nullable {
                    SqlExpr::or(
                        expr.clone(),
                        SqlExpr::and(
                            SqlExpr::is_null((**left).clone()),
                            SqlExpr::is_null((**right).clone()),
                        ),
                    )
                } else {
                    // one-sided null compares false, as in the source semantics
                    expr.clone()
                }
            }
            other => other.clone(),
        }
    }
}

/// Expands equality comparisons in positive position without growing the
/// predicate combinatorially.
///
/// Returns `None` when a nullable operand appears under negation or in a
/// non-equality comparison, where only [`expand`] is correct.
#[must_use]
pub fn expand_optimized(predicate: &SqlExpr, values: &ParameterValues) -> Option<SqlExpr> {
    let mut expander = OptimizedExpander {
        values,
        negated: false,
        possible: true,
    };
    let expanded = expander.visit(predicate);
    expander.possible.then_some(expanded)
}

/// Expands every comparison with a nullable operand into a form that is
/// correct in any context, including under `NOT`.
#[must_use]
pub fn expand(predicate: &SqlExpr, values: &ParameterValues) -> SqlExpr {
    match predicate {
        SqlExpr::Binary {
            op: SqlBinaryOp::And | SqlBinaryOp::Or,
            ..
        }
        | SqlExpr::Not(_) => predicate.map_children(|child| expand(child, values)),
        SqlExpr::Binary {
            op, left, right, ..
        } if op.is_comparison() => {
            let l = (**left).clone();
            let r = (**right).clone();
            match (is_nullable(left, values), is_nullable(right, values)) {
                (false, false) => predicate.clone(),
                (true, true) => match op {
                    SqlBinaryOp::Equal => SqlExpr::or(
                        SqlExpr::and(
                            predicate.clone(),
                            SqlExpr::and(
                                SqlExpr::is_not_null(l.clone()),
                                SqlExpr::is_not_null(r.clone()),
                            ),
                        ),
                        SqlExpr::and(SqlExpr::is_null(l), SqlExpr::is_null(r)),
                    ),
                    SqlBinaryOp::NotEqual => SqlExpr::and(
                        SqlExpr::or(
                            predicate.clone(),
                            SqlExpr::or(SqlExpr::is_null(l.clone()), SqlExpr::is_null(r.clone())),
                        ),
                        SqlExpr::or(SqlExpr::is_not_null(l), SqlExpr::is_not_null(r)),
                    ),
                    _ => SqlExpr::and(
                        predicate.clone(),
                        SqlExpr::and(SqlExpr::is_not_null(l), SqlExpr::is_not_null(r)),
                    ),
                },
                (left_nullable, _) => {
                    let nullable = if left_nullable { l } else { r };
                    if *op == SqlBinaryOp::NotEqual {
                        SqlExpr::or(predicate.clone(), SqlExpr::is_null(nullable))
                    } else {
                        SqlExpr::and(predicate.clone(), SqlExpr::is_not_null(nullable))
                    }
                }
            }
        }
        other => other.clone(),
    }
}

fn bool_constant(expr: &SqlExpr) -> Option<bool> {
    match expr {
        SqlExpr::Constant {
            value: Value::Bool(b),
            ..
        } => Some(*b),
        _ => None,
    }
}

/// Collapses double negation, `x = true` / `x = false` artifacts, negated
/// null tests, and boolean constants under `AND` / `OR`.
///
/// Reducing an already reduced predicate returns it unchanged.
#[must_use]
pub fn reduce(predicate: &SqlExpr) -> SqlExpr {
    simplify(predicate.map_children(reduce))
}

fn simplify(expr: SqlExpr) -> SqlExpr {
    match expr {
        SqlExpr::Not(operand) => match *operand {
            SqlExpr::Not(inner) => *inner,
            SqlExpr::IsNull { operand, negated } => SqlExpr::IsNull {
                operand,
                negated: !negated,
            },
            SqlExpr::Constant {
                value: Value::Bool(b),
                ..
            } => SqlExpr::constant(!b),
            other => SqlExpr::not(other),
        },
        SqlExpr::Binary {
            op: SqlBinaryOp::Equal,
            left,
            right,
            ty,
        } => {
            if left.ty().is_boolean() && !left.can_be_null() {
                if let Some(b) = bool_constant(&right) {
                    return if b { *left } else { simplify(SqlExpr::not(*left)) };
                }
            }
            if right.ty().is_boolean() && !right.can_be_null() {
                if let Some(b) = bool_constant(&left) {
                    return if b { *right } else { simplify(SqlExpr::not(*right)) };
                }
            }
            SqlExpr::Binary {
                op: SqlBinaryOp::Equal,
                left,
                right,
                ty,
            }
        }
        SqlExpr::Binary {
            op: op @ (SqlBinaryOp::And | SqlBinaryOp::Or),
            left,
            right,
            ty,
        } => {
            // AND absorbs false, OR absorbs true; the other constant is the identity
            let absorbing = op == SqlBinaryOp::Or;
            match (bool_constant(&left), bool_constant(&right)) {
                (Some(b), _) | (_, Some(b)) if b == absorbing => SqlExpr::constant(absorbing),
                (Some(_), _) => *right,
                (_, Some(_)) => *left,
                _ => SqlExpr::Binary {
                    op,
                    left,
                    right,
                    ty,
                },
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use strata_common::types::ValueType;

    fn name() -> SqlExpr {
        SqlExpr::column("c", "Name", ValueType::String, true)
    }

    fn id() -> SqlExpr {
        SqlExpr::column("c", "Id", ValueType::Int32, false)
    }

    fn param(n: &str) -> SqlExpr {
        SqlExpr::parameter(n, ValueType::String)
    }

    fn bound(pairs: &[(&str, Value)]) -> ParameterValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect::<IndexMap<_, _>>()
    }

    #[test]
    fn test_null_parameter_becomes_is_null() {
        let values = bound(&[("__name_0", Value::Null)]);
        let eq = SqlExpr::equal(name(), param("__name_0"));
        assert_eq!(transform_null_comparisons(&eq, &values), SqlExpr::is_null(name()));

        let ne = SqlExpr::binary(SqlBinaryOp::NotEqual, param("__name_0"), name());
        assert_eq!(
            transform_null_comparisons(&ne, &values),
            SqlExpr::is_not_null(name())
        );
    }

    #[test]
    fn test_non_null_parameter_is_kept() {
        let values = bound(&[("__name_0", Value::from("Ann"))]);
        let eq = SqlExpr::equal(name(), param("__name_0"));
        assert_eq!(transform_null_comparisons(&eq, &values), eq);
    }

    #[test]
    fn test_optimized_equality_of_two_nullables() {
        let other = SqlExpr::column("c", "Alias", ValueType::String, true);
        let eq = SqlExpr::equal(name(), other.clone());
        let values = bound(&[("unused", Value::Int32(1))]);
        let expanded = expand_optimized(&eq, &values).unwrap();
        assert_eq!(
            expanded,
            SqlExpr::or(
                eq,
                SqlExpr::and(SqlExpr::is_null(name()), SqlExpr::is_null(other))
            )
        );
    }

    #[test]
    fn test_optimized_gives_up_under_negation() {
        let values = bound(&[("__name_0", Value::from("Ann"))]);
        let ne = SqlExpr::not(SqlExpr::equal(name(), param("__name_0")));
        assert!(expand_optimized(&ne, &values).is_none());
    }

    #[test]
    fn test_general_not_equal_keeps_nulls() {
        let values = bound(&[("__name_0", Value::from("Ann"))]);
        let ne = SqlExpr::binary(SqlBinaryOp::NotEqual, name(), param("__name_0"));
        assert_eq!(
            expand(&ne, &values),
            SqlExpr::or(ne.clone(), SqlExpr::is_null(name()))
        );
    }

    #[test]
    fn test_non_nullable_comparisons_untouched() {
        let values = bound(&[("__id_0", Value::Int32(3))]);
        let gt = SqlExpr::binary(
            SqlBinaryOp::GreaterThan,
            id(),
            SqlExpr::parameter("__id_0", ValueType::Int32),
        );
        assert_eq!(rewrite_predicate(&gt, &values), gt);
    }

    #[test]
    fn test_reduce_identities() {
        let active = SqlExpr::column("c", "Active", ValueType::Bool, false);
        assert_eq!(
            reduce(&SqlExpr::not(SqlExpr::not(active.clone()))),
            active.clone()
        );
        assert_eq!(
            reduce(&SqlExpr::equal(active.clone(), SqlExpr::constant(true))),
            active.clone()
        );
        assert_eq!(
            reduce(&SqlExpr::equal(active.clone(), SqlExpr::constant(false))),
            SqlExpr::not(active.clone())
        );
        assert_eq!(
            reduce(&SqlExpr::not(SqlExpr::is_null(name()))),
            SqlExpr::is_not_null(name())
        );
        assert_eq!(
            reduce(&SqlExpr::and(SqlExpr::constant(true), active.clone())),
            active
        );
        assert_eq!(
            reduce(&SqlExpr::or(SqlExpr::is_null(name()), SqlExpr::constant(true))),
            SqlExpr::constant(true)
        );
    }

    fn leaf() -> impl Strategy<Value = SqlExpr> {
        prop_oneof![
            Just(SqlExpr::column("c", "Active", ValueType::Bool, false)),
            Just(SqlExpr::is_null(SqlExpr::column("c", "Name", ValueType::String, true))),
            Just(SqlExpr::constant(true)),
            Just(SqlExpr::constant(false)),
            Just(SqlExpr::equal(
                SqlExpr::column("c", "Id", ValueType::Int32, false),
                SqlExpr::constant(1)
            )),
        ]
    }

    fn predicate() -> impl Strategy<Value = SqlExpr> {
        leaf().prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(SqlExpr::not),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| SqlExpr::and(l, r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| SqlExpr::or(l, r)),
                (inner, any::<bool>()).prop_map(|(e, b)| SqlExpr::equal(e, SqlExpr::constant(b))),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_reduce_is_idempotent(p in predicate()) {
            let once = reduce(&p);
            prop_assert_eq!(reduce(&once), once);
        }
    }
}
