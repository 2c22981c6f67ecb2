//! Relational expression trees.
//!
//! A [`SelectExpr`] and its [`SqlExpr`] nodes mirror the structure of the
//! SQL that will be generated for one query. The tree is built by the
//! relational translator and consumed by the SQL generator; rewriting
//! passes (null semantics, reduction) produce new trees.

mod select;

use strata_common::types::{Value, ValueType};

use crate::expression::BinaryOp;

pub use select::{SelectExpr, SqlOrdering, TableSource};

/// A SQL binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlBinaryOp {
    /// `+`, or the dialect's concatenation operator for text.
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl SqlBinaryOp {
    /// Returns the operator text.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// Returns true for `AND` / `OR`.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Returns true for comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }

    /// Maps an expression-tree operator. Coalesce has no binary SQL form.
    #[must_use]
    pub fn from_expression_op(op: BinaryOp) -> Option<Self> {
        Some(match op {
            BinaryOp::Add => Self::Add,
            BinaryOp::Subtract => Self::Subtract,
            BinaryOp::Multiply => Self::Multiply,
            BinaryOp::Divide => Self::Divide,
            BinaryOp::Modulo => Self::Modulo,
            BinaryOp::Eq => Self::Equal,
            BinaryOp::Ne => Self::NotEqual,
            BinaryOp::Lt => Self::LessThan,
            BinaryOp::Le => Self::LessThanOrEqual,
            BinaryOp::Gt => Self::GreaterThan,
            BinaryOp::Ge => Self::GreaterThanOrEqual,
            BinaryOp::And => Self::And,
            BinaryOp::Or => Self::Or,
            BinaryOp::Coalesce => return None,
        })
    }
}

/// A column of a table or subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    /// Alias of the owning table source.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Non-nullable column type.
    pub ty: ValueType,
    /// Whether the column may hold null, including through outer joins.
    pub nullable: bool,
}

/// The right-hand side of an `IN` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum InValues {
    /// Literal, parameter, or list-parameter entries.
    List(Vec<SqlExpr>),
    /// A single-column subquery.
    Subquery(Box<SelectExpr>),
}

/// A node in a relational expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Column reference.
    Column(ColumnExpr),
    /// Projection alias.
    Alias {
        /// Aliased expression.
        expr: Box<SqlExpr>,
        /// Alias name.
        alias: String,
    },
    /// Literal.
    Constant {
        /// Value.
        value: Value,
        /// Type used to render the literal.
        ty: ValueType,
    },
    /// Query parameter; the value is bound per execution.
    Parameter {
        /// Parameter name without dialect prefix.
        name: String,
        /// Declared type.
        ty: ValueType,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: SqlBinaryOp,
        /// Left operand.
        left: Box<SqlExpr>,
        /// Right operand.
        right: Box<SqlExpr>,
        /// Result type.
        ty: ValueType,
    },
    /// Logical negation.
    Not(Box<SqlExpr>),
    /// Arithmetic negation.
    Negate(Box<SqlExpr>),
    /// `CAST(operand AS type)`
    Convert {
        /// Operand.
        operand: Box<SqlExpr>,
        /// Target type.
        ty: ValueType,
    },
    /// `IS [NOT] NULL`
    IsNull {
        /// Tested expression.
        operand: Box<SqlExpr>,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
    /// `[NOT] IN (...)`
    In {
        /// Tested expression.
        operand: Box<SqlExpr>,
        /// Candidate values.
        values: InValues,
        /// True for `NOT IN`.
        negated: bool,
    },
    /// `LIKE`
    Like {
        /// Matched text.
        operand: Box<SqlExpr>,
        /// Pattern.
        pattern: Box<SqlExpr>,
    },
    /// `CASE WHEN test THEN if_true ELSE if_false END`
    Case {
        /// Condition.
        test: Box<SqlExpr>,
        /// Value when true.
        if_true: Box<SqlExpr>,
        /// Value when false.
        if_false: Box<SqlExpr>,
        /// Result type.
        ty: ValueType,
    },
    /// `EXISTS (subquery)`
    Exists(Box<SelectExpr>),
    /// `COUNT(*)` or `COUNT_BIG(*)`
    Count {
        /// Produce a 64-bit count.
        long: bool,
    },
    /// `SUM(x)`
    Sum(Box<SqlExpr>),
    /// `MIN(x)`
    Min(Box<SqlExpr>),
    /// `MAX(x)`
    Max(Box<SqlExpr>),
    /// `AVG(x)`
    Average {
        /// Averaged expression.
        operand: Box<SqlExpr>,
        /// Result type.
        ty: ValueType,
    },
    /// Scalar function call.
    Function {
        /// Function name as emitted.
        name: String,
        /// Arguments.
        args: Vec<SqlExpr>,
        /// Result type.
        ty: ValueType,
    },
    /// `COALESCE(left, right)`
    Coalesce {
        /// First candidate.
        left: Box<SqlExpr>,
        /// Fallback.
        right: Box<SqlExpr>,
        /// Result type.
        ty: ValueType,
    },
    /// A subquery producing one value.
    ScalarSubquery(Box<SelectExpr>),
}

impl SqlExpr {
    /// Creates a column reference.
    pub fn column(
        table: impl Into<String>,
        name: impl Into<String>,
        ty: ValueType,
        nullable: bool,
    ) -> Self {
        Self::Column(ColumnExpr {
            table: table.into(),
            name: name.into(),
            ty,
            nullable,
        })
    }

    /// Creates a literal typed by its value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.value_type().unwrap_or(ValueType::Object);
        Self::Constant { value, ty }
    }

    /// Creates a parameter reference.
    pub fn parameter(name: impl Into<String>, ty: ValueType) -> Self {
        Self::Parameter {
            name: name.into(),
            ty,
        }
    }

    /// Creates a binary node; comparison and logical nodes are boolean.
    #[must_use]
    pub fn binary(op: SqlBinaryOp, left: SqlExpr, right: SqlExpr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            ValueType::Bool
        } else if left.ty().is_textual() || right.ty().is_textual() {
            ValueType::String
        } else {
            left.ty()
        };
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    /// `left = right`
    #[must_use]
    pub fn equal(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(SqlBinaryOp::Equal, left, right)
    }

    /// `left AND right`
    #[must_use]
    pub fn and(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(SqlBinaryOp::And, left, right)
    }

    /// `left OR right`
    #[must_use]
    pub fn or(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(SqlBinaryOp::Or, left, right)
    }

    /// `NOT operand`
    #[must_use]
    pub fn not(operand: SqlExpr) -> Self {
        Self::Not(Box::new(operand))
    }

    /// `operand IS NULL`
    #[must_use]
    pub fn is_null(operand: SqlExpr) -> Self {
        Self::IsNull {
            operand: Box::new(operand),
            negated: false,
        }
    }

    /// `operand IS NOT NULL`
    #[must_use]
    pub fn is_not_null(operand: SqlExpr) -> Self {
        Self::IsNull {
            operand: Box::new(operand),
            negated: true,
        }
    }

    /// Returns the result type of this node.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        match self {
            Self::Column(c) => {
                if c.nullable {
                    c.ty.clone().make_nullable()
                } else {
                    c.ty.clone()
                }
            }
            Self::Alias { expr, .. } => expr.ty(),
            Self::Constant { ty, .. }
            | Self::Parameter { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Convert { ty, .. }
            | Self::Case { ty, .. }
            | Self::Average { ty, .. }
            | Self::Function { ty, .. }
            | Self::Coalesce { ty, .. } => ty.clone(),
            Self::Not(_)
            | Self::IsNull { .. }
            | Self::In { .. }
            | Self::Like { .. }
            | Self::Exists(_) => ValueType::Bool,
            Self::Negate(operand) => operand.ty(),
            Self::Count { long } => {
                if *long {
                    ValueType::Int64
                } else {
                    ValueType::Int32
                }
            }
            Self::Sum(operand) | Self::Min(operand) | Self::Max(operand) => {
                operand.ty().make_nullable()
            }
            Self::ScalarSubquery(select) => select
                .projection
                .first()
                .map_or(ValueType::Object, |p| p.ty().make_nullable()),
        }
    }

    /// Returns true for terminal nodes that never need parentheses.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            Self::Column(_) | Self::Constant { .. } | Self::Parameter { .. }
        )
    }

    /// Returns true if evaluating this node can produce NULL.
    ///
    /// Parameters are judged by declared type only; bound values are
    /// examined separately by the null-comparison transform.
    #[must_use]
    pub fn can_be_null(&self) -> bool {
        match self {
            Self::Column(c) => c.nullable,
            Self::Alias { expr, .. } | Self::Negate(expr) | Self::Not(expr) => expr.can_be_null(),
            Self::Constant { value, .. } => value.is_null(),
            Self::Parameter { ty, .. } => ty.is_nullable(),
            Self::Binary { left, right, .. } => left.can_be_null() || right.can_be_null(),
            Self::Convert { operand, .. } => operand.can_be_null(),
            Self::IsNull { .. } | Self::Exists(_) | Self::Count { .. } => false,
            Self::In { operand, .. } => operand.can_be_null(),
            Self::Like { operand, pattern } => operand.can_be_null() || pattern.can_be_null(),
            Self::Case {
                if_true, if_false, ..
            } => if_true.can_be_null() || if_false.can_be_null(),
            Self::Coalesce { right, .. } => right.can_be_null(),
            Self::Function { args, .. } => args.iter().any(SqlExpr::can_be_null),
            Self::Sum(_)
            | Self::Min(_)
            | Self::Max(_)
            | Self::Average { .. }
            | Self::ScalarSubquery(_) => true,
        }
    }

    /// Strips a projection alias.
    #[must_use]
    pub fn unaliased(&self) -> &SqlExpr {
        match self {
            Self::Alias { expr, .. } => expr.unaliased(),
            other => other,
        }
    }

    /// Returns the name this expression is projected under, if any.
    #[must_use]
    pub fn projected_name(&self) -> Option<&str> {
        match self {
            Self::Alias { alias, .. } => Some(alias),
            Self::Column(c) => Some(&c.name),
            _ => None,
        }
    }

    /// Rebuilds this node with every direct child replaced by `f(child)`.
    ///
    /// Nested select expressions are left as they are.
    #[must_use]
    pub fn map_children(&self, mut f: impl FnMut(&SqlExpr) -> SqlExpr) -> SqlExpr {
        let mut b = |e: &SqlExpr| Box::new(f(e));
        match self {
            Self::Column(_)
            | Self::Constant { .. }
            | Self::Parameter { .. }
            | Self::Count { .. }
            | Self::Exists(_)
            | Self::ScalarSubquery(_) => self.clone(),
            Self::Alias { expr, alias } => Self::Alias {
                expr: b(expr),
                alias: alias.clone(),
            },
            Self::Binary {
                op,
                left,
                right,
                ty,
            } => Self::Binary {
                op: *op,
                left: b(left),
                right: b(right),
                ty: ty.clone(),
            },
            Self::Not(operand) => Self::Not(b(operand)),
            Self::Negate(operand) => Self::Negate(b(operand)),
            Self::Convert { operand, ty } => Self::Convert {
                operand: b(operand),
                ty: ty.clone(),
            },
            Self::IsNull { operand, negated } => Self::IsNull {
                operand: b(operand),
                negated: *negated,
            },
            Self::In {
                operand,
                values,
                negated,
            } => {
                let operand = b(operand);
                let values = match values {
                    InValues::List(items) => InValues::List(items.iter().map(|i| *b(i)).collect()),
                    InValues::Subquery(select) => InValues::Subquery(select.clone()),
                };
                Self::In {
                    operand,
                    values,
                    negated: *negated,
                }
            }
            Self::Like { operand, pattern } => Self::Like {
                operand: b(operand),
                pattern: b(pattern),
            },
            Self::Case {
                test,
                if_true,
                if_false,
                ty,
            } => Self::Case {
                test: b(test),
                if_true: b(if_true),
                if_false: b(if_false),
                ty: ty.clone(),
            },
            Self::Sum(operand) => Self::Sum(b(operand)),
            Self::Min(operand) => Self::Min(b(operand)),
            Self::Max(operand) => Self::Max(b(operand)),
            Self::Average { operand, ty } => Self::Average {
                operand: b(operand),
                ty: ty.clone(),
            },
            Self::Function { name, args, ty } => Self::Function {
                name: name.clone(),
                args: args.iter().map(|a| *b(a)).collect(),
                ty: ty.clone(),
            },
            Self::Coalesce { left, right, ty } => Self::Coalesce {
                left: b(left),
                right: b(right),
                ty: ty.clone(),
            },
        }
    }

    /// Calls `f` for every parameter name referenced in this tree, including
    /// nested select expressions.
    pub fn visit_parameters(&self, f: &mut impl FnMut(&str)) {
        match self {
            Self::Parameter { name, .. } => f(name),
            Self::Exists(select) | Self::ScalarSubquery(select) => select.visit_parameters(f),
            Self::In {
                operand,
                values: InValues::Subquery(select),
                ..
            } => {
                operand.visit_parameters(f);
                select.visit_parameters(f);
            }
            _ => {
                // map_children visits every direct child exactly once
                let _ = self.map_children(|child| {
                    child.visit_parameters(&mut *f);
                    child.clone()
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_column() -> SqlExpr {
        SqlExpr::column("c", "Name", ValueType::String, true)
    }

    #[test]
    fn test_types() {
        let age = SqlExpr::column("c", "Age", ValueType::Int32, true);
        assert_eq!(age.ty(), ValueType::Nullable(Box::new(ValueType::Int32)));
        assert_eq!(SqlExpr::equal(age.clone(), SqlExpr::constant(3)).ty(), ValueType::Bool);
        assert_eq!(SqlExpr::Count { long: true }.ty(), ValueType::Int64);
        assert_eq!(
            SqlExpr::binary(SqlBinaryOp::Add, name_column(), SqlExpr::constant("x")).ty(),
            ValueType::String
        );
    }

    #[test]
    fn test_nullability() {
        assert!(name_column().can_be_null());
        assert!(!SqlExpr::is_null(name_column()).can_be_null());
        assert!(SqlExpr::constant(strata_common::Value::Null).can_be_null());
        assert!(!SqlExpr::parameter("p", ValueType::Int32).can_be_null());
    }

    #[test]
    fn test_map_children() {
        let pred = SqlExpr::and(
            SqlExpr::equal(name_column(), SqlExpr::parameter("p0", ValueType::String)),
            SqlExpr::is_null(name_column()),
        );
        let rewritten = pred.map_children(|c| SqlExpr::not(c.clone()));
        if let SqlExpr::Binary { left, right, .. } = rewritten {
            assert!(matches!(*left, SqlExpr::Not(_)));
            assert!(matches!(*right, SqlExpr::Not(_)));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_visit_parameters() {
        let mut inner = SelectExpr::new();
        inner.add_to_predicate(SqlExpr::equal(
            SqlExpr::column("o", "Id", ValueType::Int32, false),
            SqlExpr::parameter("__id_1", ValueType::Int32),
        ));
        let pred = SqlExpr::and(
            SqlExpr::equal(name_column(), SqlExpr::parameter("__name_0", ValueType::String)),
            SqlExpr::Exists(Box::new(inner)),
        );
        let mut names = Vec::new();
        pred.visit_parameters(&mut |n| names.push(n.to_string()));
        assert_eq!(names, vec!["__name_0", "__id_1"]);
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(
            SqlBinaryOp::from_expression_op(BinaryOp::Ne),
            Some(SqlBinaryOp::NotEqual)
        );
        assert_eq!(SqlBinaryOp::from_expression_op(BinaryOp::Coalesce), None);
        assert_eq!(SqlBinaryOp::NotEqual.symbol(), "<>");
    }
}
