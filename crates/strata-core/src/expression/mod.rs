//! Query expression trees.
//!
//! An [`Expr`] describes a query over typed sequences the way a caller
//! writes it: chained operator calls, lambdas, member accesses, captured
//! closure values, and constants. Trees are immutable; every pass in the
//! pipeline produces a new tree.
//!
//! - [`eval`] evaluates closed subtrees locally
//! - [`printer`] renders a tree to deterministic text
//! - [`queryable`] offers a fluent builder over entity sets

pub mod eval;
mod printer;
pub mod queryable;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::Result;

use crate::query_model::{OutputInfo, QueryModel};

pub use eval::evaluate;
pub use queryable::{Queryable, Row};

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition, or concatenation for text.
    Add,
    /// Subtraction.
    Subtract,
    /// Multiplication.
    Multiply,
    /// Division.
    Divide,
    /// Remainder.
    Modulo,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Short-circuit logical AND.
    And,
    /// Short-circuit logical OR.
    Or,
    /// Null coalescing.
    Coalesce,
}

impl BinaryOp {
    /// Returns the operator's source-level symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Coalesce => "??",
        }
    }

    /// Returns true for comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Returns true for AND / OR.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// A unary operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Negate,
    /// Type conversion to the given type.
    Convert(ValueType),
}

/// A lambda parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: ValueType,
}

/// A captured closure environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    /// Class name of the environment, as reported in diagnostics.
    pub class: String,
    /// Captured fields, in capture order.
    pub fields: IndexMap<String, Value>,
}

type ClientFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A scalar function that can only run on the client.
///
/// Calls whose arguments are all evaluable are computed once per execution
/// and bound as parameters. Calls that depend on row data cannot be
/// translated.
#[derive(Clone)]
pub struct ClientFunction {
    name: String,
    func: Arc<ClientFn>,
}

impl ClientFunction {
    /// Creates a named client function.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for ClientFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ClientFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// A node in a query expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Constant {
        /// The value.
        value: Value,
        /// Declared type.
        ty: ValueType,
    },
    /// A captured closure environment; fields are read through [`Expr::Member`].
    Closure(Arc<Closure>),
    /// The root entity set of a query.
    Source {
        /// Entity type name.
        entity: String,
    },
    /// A lambda parameter, or a placeholder produced by parameter extraction.
    Parameter {
        /// Parameter name.
        name: String,
        /// Parameter type.
        ty: ValueType,
    },
    /// A lambda.
    Lambda {
        /// Declared parameters.
        params: Vec<LambdaParam>,
        /// Body.
        body: Box<Expr>,
    },
    /// Member access on an entity, a projection, a closure, or a scalar.
    Member {
        /// Accessed object.
        target: Box<Expr>,
        /// Member name.
        member: String,
        /// Member type.
        ty: ValueType,
    },
    /// Late-bound property access; never evaluated early.
    Property {
        /// Accessed entity.
        target: Box<Expr>,
        /// Property name.
        name: String,
        /// Property type.
        ty: ValueType,
    },
    /// A query operator (no target) or an instance method call.
    Call {
        /// Method name.
        method: String,
        /// Receiver for instance methods.
        target: Option<Box<Expr>>,
        /// Arguments; for query operators the first is the source sequence.
        args: Vec<Expr>,
        /// Result type.
        ty: ValueType,
    },
    /// A client-evaluable function call.
    Function {
        /// The function.
        function: ClientFunction,
        /// Arguments.
        args: Vec<Expr>,
        /// Result type.
        ty: ValueType,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Result type.
        ty: ValueType,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
        /// Result type.
        ty: ValueType,
    },
    /// A ternary conditional.
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when true.
        if_true: Box<Expr>,
        /// Value when false.
        if_false: Box<Expr>,
        /// Result type.
        ty: ValueType,
    },
    /// An anonymous object with named members.
    New {
        /// Members in declaration order.
        members: Vec<(String, Expr)>,
    },
    /// An in-memory list literal.
    NewList {
        /// Items.
        items: Vec<Expr>,
        /// Item type.
        item_type: ValueType,
    },
    /// Reference to a clause item of an enclosing query model.
    QuerySource {
        /// Item name of the referenced clause.
        name: String,
        /// Item type.
        ty: ValueType,
    },
    /// A nested query model.
    SubQuery(Box<QueryModel>),
}

impl Expr {
    /// Creates a constant typed by its value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.value_type().unwrap_or(ValueType::Object);
        Self::Constant { value, ty }
    }

    /// Creates a constant with an explicit type.
    pub fn typed_constant(value: impl Into<Value>, ty: ValueType) -> Self {
        Self::Constant {
            value: value.into(),
            ty,
        }
    }

    /// Creates a null constant of the given type.
    #[must_use]
    pub fn null(ty: ValueType) -> Self {
        Self::Constant {
            value: Value::Null,
            ty: ty.make_nullable(),
        }
    }

    /// Reads a captured variable: member access on a one-field closure.
    pub fn capture(name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.value_type().unwrap_or(ValueType::Object);
        Self::capture_typed(name, value, ty)
    }

    /// Reads a captured variable with an explicit type.
    pub fn capture_typed(name: &str, value: impl Into<Value>, ty: ValueType) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(name.to_string(), value.into());
        let closure = Self::Closure(Arc::new(Closure {
            class: "<>c__DisplayClass".to_string(),
            fields,
        }));
        closure.member(name, ty)
    }

    /// Creates a lambda parameter reference.
    pub fn parameter(name: impl Into<String>, ty: ValueType) -> Self {
        Self::Parameter {
            name: name.into(),
            ty,
        }
    }

    /// Creates a lambda.
    #[must_use]
    pub fn lambda(params: Vec<LambdaParam>, body: Expr) -> Self {
        Self::Lambda {
            params,
            body: Box::new(body),
        }
    }

    /// Member access.
    #[must_use]
    pub fn member(self, member: impl Into<String>, ty: ValueType) -> Self {
        Self::Member {
            target: Box::new(self),
            member: member.into(),
            ty,
        }
    }

    /// Late-bound property access.
    #[must_use]
    pub fn property(self, name: impl Into<String>, ty: ValueType) -> Self {
        Self::Property {
            target: Box::new(self),
            name: name.into(),
            ty,
        }
    }

    /// Instance method call.
    #[must_use]
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>, ty: ValueType) -> Self {
        Self::Call {
            method: method.into(),
            target: Some(Box::new(self)),
            args,
            ty,
        }
    }

    /// Query operator call with `self` as the source sequence.
    #[must_use]
    pub fn operator(self, method: impl Into<String>, mut args: Vec<Expr>, ty: ValueType) -> Self {
        args.insert(0, self);
        Self::Call {
            method: method.into(),
            target: None,
            args,
            ty,
        }
    }

    /// Client function call.
    #[must_use]
    pub fn function(function: ClientFunction, args: Vec<Expr>, ty: ValueType) -> Self {
        Self::Function { function, args, ty }
    }

    /// Binary operation with an inferred result type.
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = binary_result_type(op, &left.ty(), &right.ty());
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    /// `self == other`
    #[must_use]
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Eq, self, other.into())
    }

    /// `self != other`
    #[must_use]
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ne, self, other.into())
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lt, self, other.into())
    }

    /// `self <= other`
    #[must_use]
    pub fn le(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Le, self, other.into())
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gt, self, other.into())
    }

    /// `self >= other`
    #[must_use]
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ge, self, other.into())
    }

    /// `self && other`
    #[must_use]
    pub fn and(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::And, self, other.into())
    }

    /// `self || other`
    #[must_use]
    pub fn or(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Or, self, other.into())
    }

    /// `self + other`
    #[must_use]
    pub fn add(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Add, self, other.into())
    }

    /// `self - other`
    #[must_use]
    pub fn sub(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Subtract, self, other.into())
    }

    /// `self * other`
    #[must_use]
    pub fn mul(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Multiply, self, other.into())
    }

    /// `self / other`
    #[must_use]
    pub fn div(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Divide, self, other.into())
    }

    /// `self % other`
    #[must_use]
    pub fn rem(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Modulo, self, other.into())
    }

    /// `self ?? other`
    #[must_use]
    pub fn coalesce(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Coalesce, self, other.into())
    }

    /// `!self`
    #[must_use]
    pub fn not(self) -> Self {
        let ty = self.ty();
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
            ty,
        }
    }

    /// `-self`
    #[must_use]
    pub fn negate(self) -> Self {
        let ty = self.ty();
        Self::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
            ty,
        }
    }

    /// Converts to the given type.
    #[must_use]
    pub fn convert(self, ty: ValueType) -> Self {
        Self::Unary {
            op: UnaryOp::Convert(ty.clone()),
            operand: Box::new(self),
            ty,
        }
    }

    /// `test ? if_true : if_false`
    #[must_use]
    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let ty = if_true.ty();
        Self::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            ty,
        }
    }

    /// Anonymous object.
    #[must_use]
    pub fn new_object(members: Vec<(&str, Expr)>) -> Self {
        Self::New {
            members: members
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        }
    }

    /// In-memory list literal.
    #[must_use]
    pub fn new_list(items: Vec<Expr>, item_type: ValueType) -> Self {
        Self::NewList { items, item_type }
    }

    /// `self.StartsWith(prefix)`
    #[must_use]
    pub fn starts_with(self, prefix: impl Into<Expr>) -> Self {
        self.call("StartsWith", vec![prefix.into()], ValueType::Bool)
    }

    /// `self.EndsWith(suffix)`
    #[must_use]
    pub fn ends_with(self, suffix: impl Into<Expr>) -> Self {
        self.call("EndsWith", vec![suffix.into()], ValueType::Bool)
    }

    /// `self.Contains(fragment)` on text.
    #[must_use]
    pub fn contains_text(self, fragment: impl Into<Expr>) -> Self {
        self.call("Contains", vec![fragment.into()], ValueType::Bool)
    }

    /// `self.ToUpper()`
    #[must_use]
    pub fn to_upper(self) -> Self {
        self.call("ToUpper", Vec::new(), ValueType::String)
    }

    /// `self.ToLower()`
    #[must_use]
    pub fn to_lower(self) -> Self {
        self.call("ToLower", Vec::new(), ValueType::String)
    }

    /// `self.Trim()`
    #[must_use]
    pub fn trim(self) -> Self {
        self.call("Trim", Vec::new(), ValueType::String)
    }

    /// `self.Length` on text.
    #[must_use]
    pub fn length(self) -> Self {
        self.member("Length", ValueType::Int32)
    }

    /// `list.Contains(item)` over an in-memory list.
    #[must_use]
    pub fn list_contains(self, item: impl Into<Expr>) -> Self {
        self.operator("Contains", vec![item.into()], ValueType::Bool)
    }

    /// Returns the static type of this node.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        match self {
            Self::Constant { ty, .. }
            | Self::Parameter { ty, .. }
            | Self::Member { ty, .. }
            | Self::Property { ty, .. }
            | Self::Call { ty, .. }
            | Self::Function { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Conditional { ty, .. }
            | Self::QuerySource { ty, .. } => ty.clone(),
            Self::Closure(closure) => ValueType::Closure(closure.class.clone()),
            Self::Source { entity } => {
                ValueType::Query(Box::new(ValueType::Entity(entity.clone())))
            }
            Self::Lambda { body, .. } => body.ty(),
            Self::New { members } => ValueType::Anonymous(
                members
                    .iter()
                    .map(|(name, e)| (name.clone(), e.ty()))
                    .collect(),
            ),
            Self::NewList { item_type, .. } => ValueType::List(Box::new(item_type.clone())),
            Self::SubQuery(model) => match model.output_info() {
                OutputInfo::Sequence { item_type } => ValueType::Query(Box::new(item_type)),
                OutputInfo::Single { value_type, .. } => value_type,
            },
        }
    }

    /// Returns true for null constants.
    #[must_use]
    pub fn is_null_constant(&self) -> bool {
        matches!(self, Self::Constant { value, .. } if value.is_null())
    }

    /// Returns the direct children of this node.
    ///
    /// Subquery models are opaque here; passes that need to descend into
    /// them do so explicitly.
    #[must_use]
    pub fn children(&self) -> SmallVec<[&Expr; 4]> {
        let mut out = SmallVec::new();
        match self {
            Self::Constant { .. }
            | Self::Closure(_)
            | Self::Source { .. }
            | Self::Parameter { .. }
            | Self::QuerySource { .. }
            | Self::SubQuery(_) => {}
            Self::Lambda { body, .. } => out.push(body.as_ref()),
            Self::Member { target, .. } | Self::Property { target, .. } => {
                out.push(target.as_ref());
            }
            Self::Call { target, args, .. } => {
                if let Some(target) = target {
                    out.push(target.as_ref());
                }
                out.extend(args.iter());
            }
            Self::Function { args, .. } => out.extend(args.iter()),
            Self::Binary { left, right, .. } => {
                out.push(left.as_ref());
                out.push(right.as_ref());
            }
            Self::Unary { operand, .. } => out.push(operand.as_ref()),
            Self::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => {
                out.push(test.as_ref());
                out.push(if_true.as_ref());
                out.push(if_false.as_ref());
            }
            Self::New { members } => out.extend(members.iter().map(|(_, e)| e)),
            Self::NewList { items, .. } => out.extend(items.iter()),
        }
        out
    }

    /// Rebuilds this node with each direct child replaced by `f(child)`.
    ///
    /// Children are visited in the same order as [`Expr::children`].
    pub fn map_children<F>(&self, mut f: F) -> Result<Expr>
    where
        F: FnMut(&Expr) -> Result<Expr>,
    {
        let mut boxed = |e: &Expr| -> Result<Box<Expr>> { Ok(Box::new(f(e)?)) };
        Ok(match self {
            Self::Constant { .. }
            | Self::Closure(_)
            | Self::Source { .. }
            | Self::Parameter { .. }
            | Self::QuerySource { .. }
            | Self::SubQuery(_) => self.clone(),
            Self::Lambda { params, body } => Self::Lambda {
                params: params.clone(),
                body: boxed(body)?,
            },
            Self::Member { target, member, ty } => Self::Member {
                target: boxed(target)?,
                member: member.clone(),
                ty: ty.clone(),
            },
            Self::Property { target, name, ty } => Self::Property {
                target: boxed(target)?,
                name: name.clone(),
                ty: ty.clone(),
            },
            Self::Call {
                method,
                target,
                args,
                ty,
            } => {
                let target = match target {
                    Some(t) => Some(boxed(t)?),
                    None => None,
                };
                let args = args
                    .iter()
                    .map(|a| boxed(a).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?;
                Self::Call {
                    method: method.clone(),
                    target,
                    args,
                    ty: ty.clone(),
                }
            }
            Self::Function { function, args, ty } => Self::Function {
                function: function.clone(),
                args: args
                    .iter()
                    .map(|a| boxed(a).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?,
                ty: ty.clone(),
            },
            Self::Binary {
                op,
                left,
                right,
                ty,
            } => Self::Binary {
                op: *op,
                left: boxed(left)?,
                right: boxed(right)?,
                ty: ty.clone(),
            },
            Self::Unary { op, operand, ty } => Self::Unary {
                op: op.clone(),
                operand: boxed(operand)?,
                ty: ty.clone(),
            },
            Self::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => Self::Conditional {
                test: boxed(test)?,
                if_true: boxed(if_true)?,
                if_false: boxed(if_false)?,
                ty: ty.clone(),
            },
            Self::New { members } => Self::New {
                members: members
                    .iter()
                    .map(|(name, e)| boxed(e).map(|b| (name.clone(), *b)))
                    .collect::<Result<Vec<_>>>()?,
            },
            Self::NewList { items, item_type } => Self::NewList {
                items: items
                    .iter()
                    .map(|a| boxed(a).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?,
                item_type: item_type.clone(),
            },
        })
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::constant(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::constant(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::constant(v)
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::constant(v)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::constant(v)
    }
}

/// Infers the result type of a binary operation.
fn binary_result_type(op: BinaryOp, left: &ValueType, right: &ValueType) -> ValueType {
    if op.is_comparison() || op.is_logical() {
        return ValueType::Bool;
    }
    if op == BinaryOp::Coalesce {
        return if right.is_nullable() {
            right.clone()
        } else {
            right.underlying().clone()
        };
    }
    if left.is_textual() || right.is_textual() {
        return ValueType::String;
    }
    let base = widen(left.underlying(), right.underlying());
    if matches!(left, ValueType::Nullable(_)) || matches!(right, ValueType::Nullable(_)) {
        base.make_nullable()
    } else {
        base
    }
}

fn widen(left: &ValueType, right: &ValueType) -> ValueType {
    use ValueType::{Decimal, Float64, Int32, Int64};
    match (left, right) {
        (Float64, _) | (_, Float64) => Float64,
        (Decimal, _) | (_, Decimal) => Decimal,
        (Int64, _) | (_, Int64) => Int64,
        (Int32, Int32) => Int32,
        (other, _) => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_param(name: &str) -> Expr {
        Expr::parameter(name, ValueType::Int32)
    }

    #[test]
    fn test_binary_type_inference() {
        let nullable = Expr::parameter("n", ValueType::Nullable(Box::new(ValueType::Int32)));
        assert_eq!(
            nullable.clone().add(Expr::constant(1i64)).ty(),
            ValueType::Nullable(Box::new(ValueType::Int64))
        );
        assert_eq!(nullable.clone().eq(1).ty(), ValueType::Bool);
        assert_eq!(nullable.coalesce(0).ty(), ValueType::Int32);
        assert_eq!(Expr::constant("a").add("b").ty(), ValueType::String);
    }

    #[test]
    fn test_capture_reads_closure_field() {
        let captured = Expr::capture("city", "London");
        if let Expr::Member { target, member, ty } = &captured {
            assert_eq!(member, "city");
            assert_eq!(ty, &ValueType::String);
            assert!(matches!(target.as_ref(), Expr::Closure(_)));
        } else {
            panic!("Expected Member");
        }
    }

    #[test]
    fn test_children_order() {
        let e = int_param("a").add(int_param("b"));
        let names: Vec<String> = e.children().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_map_children_rebuilds() {
        let e = int_param("a").gt(int_param("b"));
        let rewritten = e
            .map_children(|c| match c {
                Expr::Parameter { name, .. } if name == "b" => Ok(Expr::constant(7)),
                other => Ok(other.clone()),
            })
            .unwrap();
        assert_eq!(rewritten, int_param("a").gt(7));
        // The input tree is untouched
        assert_eq!(e, int_param("a").gt(int_param("b")));
    }

    #[test]
    fn test_source_type() {
        let source = Expr::Source {
            entity: "Customer".to_string(),
        };
        assert!(source.ty().is_queryable());
    }

    #[test]
    fn test_client_function_equality_is_by_identity() {
        let f = ClientFunction::new("f", |_| Ok(Value::Null));
        let g = ClientFunction::new("f", |_| Ok(Value::Null));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}
