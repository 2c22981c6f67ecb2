//! Clause-structured query models.
//!
//! A [`QueryModel`] is what the parser makes of an operator chain: one
//! main `from` clause, ordered body clauses (`where`, `orderby`, `join`),
//! a selector, and trailing result operators (aggregates, paging, element
//! operators). Models own their subtrees outright; wrapping a model as a
//! subquery source clones it.

use std::fmt;

use smallvec::SmallVec;
use strata_common::types::ValueType;

use crate::expression::Expr;

/// A query model.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    /// The main source clause.
    pub main_from: FromClause,
    /// Body clauses in source order.
    pub body_clauses: Vec<BodyClause>,
    /// The selector, expressed over clause items via [`Expr::QuerySource`].
    pub select: Expr,
    /// Result operators in source order.
    pub result_operators: Vec<ResultOperator>,
}

/// A `from` clause: an item name ranging over a source.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    /// Item name, referenced by [`Expr::QuerySource`].
    pub item_name: String,
    /// Item type.
    pub item_type: ValueType,
    /// The source sequence.
    pub source: FromSource,
}

/// The sequence a clause ranges over.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// All instances of an entity type.
    Entity(String),
    /// The results of a nested query.
    SubQuery(Box<QueryModel>),
    /// An in-memory list value (a parameter or list literal).
    Value(Expr),
    /// A collection navigation of an outer item.
    Navigation {
        /// The owning item.
        owner: Expr,
        /// Navigation name.
        navigation: String,
        /// Target entity type.
        target: String,
    },
}

/// A body clause.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    /// Filter.
    Where(Expr),
    /// Sort keys, most significant first.
    OrderBy(Vec<Ordering>),
    /// Inner join.
    Join(JoinClause),
}

/// A sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// Key expression.
    pub expr: Expr,
    /// Descending order.
    pub descending: bool,
}

/// An inner equi-join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Item name of the joined source.
    pub item_name: String,
    /// Item type of the joined source.
    pub item_type: ValueType,
    /// Joined source.
    pub inner: FromSource,
    /// Key over the outer items.
    pub outer_key: Expr,
    /// Key over the joined item.
    pub inner_key: Expr,
}

/// A trailing result operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOperator {
    /// Row count as Int32.
    Count,
    /// Row count as Int64.
    LongCount,
    /// Sum of the selected values.
    Sum,
    /// Minimum of the selected values.
    Min,
    /// Maximum of the selected values.
    Max,
    /// Average of the selected values.
    Average,
    /// First element.
    First {
        /// Return the default instead of failing on an empty sequence.
        or_default: bool,
    },
    /// The only element.
    Single {
        /// Return the default instead of failing on an empty sequence.
        or_default: bool,
    },
    /// Whether any element exists.
    Any,
    /// Whether all elements satisfy the predicate.
    All(Expr),
    /// Whether the sequence contains the item.
    Contains(Expr),
    /// Limit.
    Take(Expr),
    /// Offset.
    Skip(Expr),
    /// Remove duplicates.
    Distinct,
    /// Eagerly load a navigation path.
    Include(SmallVec<[String; 2]>),
    /// Group by key.
    GroupBy {
        /// Grouping key.
        key: Expr,
    },
}

impl ResultOperator {
    /// Returns true for operators that change which rows a nested clause
    /// would see, forcing later body clauses into an outer query.
    #[must_use]
    pub fn requires_subquery_for_body_clauses(&self) -> bool {
        matches!(
            self,
            Self::Take(_) | Self::Skip(_) | Self::Distinct | Self::GroupBy { .. }
        )
    }
}

/// How an empty-set aggregate behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullResult {
    /// Null is a legal result.
    Null,
    /// Null means "no rows"; the result is zero.
    Zero,
    /// Null means "no rows"; the result is an error.
    NoElements,
}

/// How a single-valued query adapts its one-row sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleKind {
    /// Aggregate or boolean scalar.
    Aggregate {
        /// Empty-set behavior.
        on_null: NullResult,
    },
    /// First element.
    First {
        /// Default on empty.
        or_default: bool,
    },
    /// The only element.
    Single {
        /// Default on empty.
        or_default: bool,
    },
}

/// The output shape of a query model.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputInfo {
    /// A sequence of items.
    Sequence {
        /// Item type.
        item_type: ValueType,
    },
    /// A single value.
    Single {
        /// Value type.
        value_type: ValueType,
        /// Adaptation from the underlying sequence.
        kind: SingleKind,
    },
}

impl OutputInfo {
    /// Returns the item type of the underlying row sequence.
    #[must_use]
    pub fn item_type(&self) -> &ValueType {
        match self {
            Self::Sequence { item_type } => item_type,
            Self::Single { value_type, .. } => value_type,
        }
    }
}

impl QueryModel {
    /// Creates a model selecting the main clause item.
    #[must_use]
    pub fn new(main_from: FromClause) -> Self {
        let select = Expr::QuerySource {
            name: main_from.item_name.clone(),
            ty: main_from.item_type.clone(),
        };
        Self {
            main_from,
            body_clauses: Vec::new(),
            select,
            result_operators: Vec::new(),
        }
    }

    /// Returns the type of the selected items, before result operators.
    #[must_use]
    pub fn selected_type(&self) -> ValueType {
        self.select.ty()
    }

    /// Computes the output shape after applying all result operators.
    #[must_use]
    pub fn output_info(&self) -> OutputInfo {
        let mut output = OutputInfo::Sequence {
            item_type: self.selected_type(),
        };
        for op in &self.result_operators {
            let item = output.item_type().clone();
            output = match op {
                ResultOperator::Count => aggregate(ValueType::Int32, NullResult::Zero),
                ResultOperator::LongCount => aggregate(ValueType::Int64, NullResult::Zero),
                ResultOperator::Any | ResultOperator::All(_) | ResultOperator::Contains(_) => {
                    aggregate(ValueType::Bool, NullResult::Zero)
                }
                ResultOperator::Sum => {
                    let on_null = if matches!(item, ValueType::Nullable(_)) {
                        NullResult::Null
                    } else {
                        NullResult::Zero
                    };
                    aggregate(item, on_null)
                }
                ResultOperator::Min | ResultOperator::Max => {
                    let on_null = if item.is_nullable() {
                        NullResult::Null
                    } else {
                        NullResult::NoElements
                    };
                    aggregate(item, on_null)
                }
                ResultOperator::Average => {
                    let base = if item.underlying() == &ValueType::Decimal {
                        ValueType::Decimal
                    } else {
                        ValueType::Float64
                    };
                    if matches!(item, ValueType::Nullable(_)) {
                        aggregate(base.make_nullable(), NullResult::Null)
                    } else {
                        aggregate(base, NullResult::NoElements)
                    }
                }
                ResultOperator::First { or_default } => OutputInfo::Single {
                    value_type: if *or_default { item.make_nullable() } else { item },
                    kind: SingleKind::First {
                        or_default: *or_default,
                    },
                },
                ResultOperator::Single { or_default } => OutputInfo::Single {
                    value_type: if *or_default { item.make_nullable() } else { item },
                    kind: SingleKind::Single {
                        or_default: *or_default,
                    },
                },
                ResultOperator::GroupBy { .. } => OutputInfo::Sequence {
                    item_type: ValueType::Object,
                },
                ResultOperator::Take(_)
                | ResultOperator::Skip(_)
                | ResultOperator::Distinct
                | ResultOperator::Include(_) => output,
            };
        }
        output
    }
}

fn aggregate(value_type: ValueType, on_null: NullResult) -> OutputInfo {
    OutputInfo::Single {
        value_type,
        kind: SingleKind::Aggregate { on_null },
    }
}

impl fmt::Display for FromSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(name) => write!(f, "{name}"),
            Self::SubQuery(model) => write!(f, "({model})"),
            Self::Value(expr) => write!(f, "{expr}"),
            Self::Navigation {
                owner, navigation, ..
            } => write!(f, "{owner}.{navigation}"),
        }
    }
}

impl fmt::Display for QueryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from {} in {}",
            self.main_from.item_name, self.main_from.source
        )?;
        for clause in &self.body_clauses {
            match clause {
                BodyClause::Where(predicate) => write!(f, " where {predicate}")?,
                BodyClause::OrderBy(orderings) => {
                    f.write_str(" orderby ")?;
                    for (i, o) in orderings.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{} {}", o.expr, if o.descending { "desc" } else { "asc" })?;
                    }
                }
                BodyClause::Join(join) => write!(
                    f,
                    " join {} in {} on {} equals {}",
                    join.item_name, join.inner, join.outer_key, join.inner_key
                )?,
            }
        }
        write!(f, " select {}", self.select)?;
        for op in &self.result_operators {
            f.write_str(" => ")?;
            match op {
                ResultOperator::Count => f.write_str("Count()")?,
                ResultOperator::LongCount => f.write_str("LongCount()")?,
                ResultOperator::Sum => f.write_str("Sum()")?,
                ResultOperator::Min => f.write_str("Min()")?,
                ResultOperator::Max => f.write_str("Max()")?,
                ResultOperator::Average => f.write_str("Average()")?,
                ResultOperator::First { or_default } => {
                    f.write_str(if *or_default { "FirstOrDefault()" } else { "First()" })?;
                }
                ResultOperator::Single { or_default } => {
                    f.write_str(if *or_default { "SingleOrDefault()" } else { "Single()" })?;
                }
                ResultOperator::Any => f.write_str("Any()")?,
                ResultOperator::All(p) => write!(f, "All({p})")?,
                ResultOperator::Contains(item) => write!(f, "Contains({item})")?,
                ResultOperator::Take(n) => write!(f, "Take({n})")?,
                ResultOperator::Skip(n) => write!(f, "Skip({n})")?,
                ResultOperator::Distinct => f.write_str("Distinct()")?,
                ResultOperator::Include(path) => write!(f, "Include({})", path.join("."))?,
                ResultOperator::GroupBy { key } => write!(f, "GroupBy({key})")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> QueryModel {
        QueryModel::new(FromClause {
            item_name: "c".to_string(),
            item_type: ValueType::Entity("Customer".to_string()),
            source: FromSource::Entity("Customer".to_string()),
        })
    }

    #[test]
    fn test_sequence_output() {
        let model = customers();
        assert_eq!(
            model.output_info(),
            OutputInfo::Sequence {
                item_type: ValueType::Entity("Customer".to_string())
            }
        );
    }

    #[test]
    fn test_count_output() {
        let mut model = customers();
        model.result_operators.push(ResultOperator::Take(Expr::constant(5)));
        model.result_operators.push(ResultOperator::Count);
        assert_eq!(
            model.output_info(),
            OutputInfo::Single {
                value_type: ValueType::Int32,
                kind: SingleKind::Aggregate {
                    on_null: NullResult::Zero
                }
            }
        );
    }

    #[test]
    fn test_sum_of_non_nullable_defaults_to_zero() {
        let mut model = customers();
        model.select = Expr::QuerySource {
            name: "c".to_string(),
            ty: ValueType::Entity("Customer".to_string()),
        }
        .member("Age", ValueType::Int32);
        model.result_operators.push(ResultOperator::Sum);
        assert!(matches!(
            model.output_info(),
            OutputInfo::Single {
                kind: SingleKind::Aggregate {
                    on_null: NullResult::Zero
                },
                ..
            }
        ));
    }

    #[test]
    fn test_first_or_default_is_nullable() {
        let mut model = customers();
        model.select = Expr::QuerySource {
            name: "c".to_string(),
            ty: ValueType::Entity("Customer".to_string()),
        }
        .member("Id", ValueType::Int32);
        model
            .result_operators
            .push(ResultOperator::First { or_default: true });
        assert_eq!(
            model.output_info().item_type(),
            &ValueType::Nullable(Box::new(ValueType::Int32))
        );
    }

    #[test]
    fn test_display() {
        let mut model = customers();
        model.body_clauses.push(BodyClause::Where(
            Expr::QuerySource {
                name: "c".to_string(),
                ty: ValueType::Entity("Customer".to_string()),
            }
            .member("Age", ValueType::Int32)
            .gt(3),
        ));
        model.result_operators.push(ResultOperator::Take(Expr::constant(5)));
        assert_eq!(
            model.to_string(),
            "from c in Customer where ([c].Age > 3) select [c] => Take(5)"
        );
    }

    #[test]
    fn test_subquery_wrap_is_a_deep_copy() {
        let inner = customers();
        let mut outer = QueryModel::new(FromClause {
            item_name: "t".to_string(),
            item_type: ValueType::Entity("Customer".to_string()),
            source: FromSource::SubQuery(Box::new(inner.clone())),
        });
        outer.result_operators.push(ResultOperator::Distinct);
        // Mutating the wrapper leaves the inner model alone
        assert!(inner.result_operators.is_empty());
    }
}
