//! Deterministic textual rendering of expression trees.
//!
//! The output doubles as the shape component of compiled-query cache keys,
//! so two structurally identical trees always print identically and any
//! structural difference shows up in the text. Constants print losslessly
//! and carry a type suffix, so values that differ only in type or precision
//! never share a key.

use std::fmt::{self, Write};

use strata_common::types::{Value, ValueType};

use super::{Expr, UnaryOp};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, ty } => write_typed_constant(f, value, ty),
            Expr::Closure(closure) => write!(f, "value({})", closure.class),
            Expr::Source { entity } => write!(f, "Source<{entity}>"),
            Expr::Parameter { name, .. } => f.write_str(name),
            Expr::Lambda { params, body } => {
                if params.len() == 1 {
                    write!(f, "{} => {body}", params[0].name)
                } else {
                    f.write_char('(')?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(&p.name)?;
                    }
                    write!(f, ") => {body}")
                }
            }
            Expr::Member { target, member, .. } => write!(f, "{target}.{member}"),
            Expr::Property { target, name, .. } => write!(f, "Property({target}, \"{name}\")"),
            Expr::Call {
                method,
                target,
                args,
                ..
            } => {
                if let Some(target) = target {
                    write!(f, "{target}.")?;
                }
                write!(f, "{method}(")?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Expr::Function { function, args, .. } => {
                write!(f, "{}(", function.name())?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => write!(f, "Not({operand})"),
                UnaryOp::Negate => write!(f, "-{operand}"),
                UnaryOp::Convert(ty) => write!(f, "Convert({operand}, {ty})"),
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => write!(f, "IIF({test}, {if_true}, {if_false})"),
            Expr::New { members } => {
                f.write_str("new { ")?;
                for (i, (name, e)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {e}")?;
                }
                f.write_str(" }")
            }
            Expr::NewList { items, item_type } => {
                write!(f, "new {item_type}[] {{")?;
                write_list(f, items)?;
                f.write_char('}')
            }
            Expr::QuerySource { name, .. } => write!(f, "[{name}]"),
            Expr::SubQuery(model) => write!(f, "{{{model}}}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_typed_constant(f: &mut fmt::Formatter<'_>, value: &Value, ty: &ValueType) -> fmt::Result {
    write_constant(f, value)?;
    // The declared type only shows when it differs from the value's own.
    if value.value_type().as_ref() != Some(ty) {
        write!(f, ":{ty}")?;
    }
    Ok(())
}

fn write_constant(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int32(i) => write!(f, "{i}"),
        Value::Int64(i) => write!(f, "{i}i64"),
        Value::Decimal(d) => write!(f, "{d}m"),
        Value::Float64(v) => write!(f, "{v:?}f64"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Bytes(b) => {
            f.write_str("0x")?;
            for byte in b {
                write!(f, "{byte:02x}")?;
            }
            Ok(())
        }
        Value::DateTime(dt) => write!(f, "DateTime({})", dt.format("%Y-%m-%dT%H:%M:%S%.9f")),
        Value::DateTimeOffset(dt) => write!(
            f,
            "DateTimeOffset({})",
            dt.format("%Y-%m-%dT%H:%M:%S%.9f%:z")
        ),
        Value::Guid(g) => write!(f, "Guid({g})"),
        Value::List(items) => {
            f.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_constant(f, item)?;
            }
            f.write_char(']')
        }
    }
}
