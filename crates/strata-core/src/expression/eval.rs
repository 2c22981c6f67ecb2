//! Local evaluation of closed expression subtrees.
//!
//! Only subtrees that reference no lambda parameters or query sources can
//! be evaluated. Arithmetic is checked; overflow and division by zero are
//! evaluation errors, not panics.

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive, Zero};
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};

use super::{BinaryOp, Expr, UnaryOp};

/// Evaluates a closed expression to a value.
///
/// # Errors
///
/// Returns [`Error::Evaluation`] for nodes that cannot be evaluated locally
/// and for runtime failures, or the error raised by a client function.
pub fn evaluate(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Member { target, member, .. } => evaluate_member(target, member),
        Expr::Binary {
            op, left, right, ..
        } => evaluate_binary(*op, left, right),
        Expr::Unary { op, operand, .. } => {
            let value = evaluate(operand)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    Value::Null => Ok(Value::Null),
                    other => Err(type_error("!", &other)),
                },
                UnaryOp::Negate => negate(value),
                UnaryOp::Convert(ty) => convert(value, ty),
            }
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } => match evaluate(test)? {
            Value::Bool(true) => evaluate(if_true),
            Value::Bool(false) => evaluate(if_false),
            other => Err(type_error("?:", &other)),
        },
        Expr::NewList { items, .. } => Ok(Value::List(
            items.iter().map(evaluate).collect::<Result<Vec<_>>>()?,
        )),
        Expr::Function { function, args, .. } => {
            let args = args.iter().map(evaluate).collect::<Result<Vec<_>>>()?;
            function.invoke(&args)
        }
        Expr::Call {
            method,
            target: Some(target),
            args,
            ..
        } => {
            let receiver = evaluate(target)?;
            let args = args.iter().map(evaluate).collect::<Result<Vec<_>>>()?;
            evaluate_method(&receiver, method, &args)
        }
        Expr::Call {
            method,
            target: None,
            args,
            ..
        } if method == "Contains" && args.len() == 2 => {
            match (evaluate(&args[0])?, evaluate(&args[1])?) {
                (Value::List(items), item) => Ok(Value::Bool(items.contains(&item))),
                (other, _) => Err(type_error("Contains", &other)),
            }
        }
        other => Err(Error::Evaluation(format!(
            "expression `{other}` cannot be evaluated locally"
        ))),
    }
}

fn evaluate_member(target: &Expr, member: &str) -> Result<Value> {
    if let Expr::Closure(closure) = target {
        return closure
            .fields
            .get(member)
            .cloned()
            .ok_or_else(|| Error::Evaluation(format!("closure has no field '{member}'")));
    }
    match (evaluate(target)?, member) {
        (Value::String(s), "Length") => Ok(Value::Int32(s.chars().count() as i32)),
        (Value::Bytes(b), "Length") => Ok(Value::Int32(b.len() as i32)),
        (Value::List(items), "Count") => Ok(Value::Int32(items.len() as i32)),
        (Value::Null, _) => Err(Error::Evaluation(format!(
            "null reference while reading member '{member}'"
        ))),
        (other, _) => Err(Error::Evaluation(format!(
            "{} has no member '{member}'",
            other.type_name()
        ))),
    }
}

fn evaluate_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value> {
    let Value::String(s) = receiver else {
        return Err(Error::Evaluation(format!(
            "{} has no method '{method}'",
            receiver.type_name()
        )));
    };
    let text_arg = || match args.first() {
        Some(Value::String(a)) => Ok(a.as_str()),
        _ => Err(Error::Evaluation(format!(
            "'{method}' expects a text argument"
        ))),
    };
    Ok(match method {
        "StartsWith" => Value::Bool(s.starts_with(text_arg()?)),
        "EndsWith" => Value::Bool(s.ends_with(text_arg()?)),
        "Contains" => Value::Bool(s.contains(text_arg()?)),
        "ToUpper" => Value::String(s.to_uppercase()),
        "ToLower" => Value::String(s.to_lowercase()),
        "Trim" => Value::String(s.trim().to_string()),
        _ => {
            return Err(Error::Evaluation(format!(
                "String has no method '{method}'"
            )));
        }
    })
}

fn evaluate_binary(op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
    // Logical operators short-circuit
    match op {
        BinaryOp::And => {
            return match evaluate(left)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => evaluate(right),
                other => Err(type_error("&&", &other)),
            };
        }
        BinaryOp::Or => {
            return match evaluate(left)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                Value::Bool(false) => evaluate(right),
                other => Err(type_error("||", &other)),
            };
        }
        BinaryOp::Coalesce => {
            let l = evaluate(left)?;
            return if l.is_null() { evaluate(right) } else { Ok(l) };
        }
        _ => {}
    }

    let l = evaluate(left)?;
    let r = evaluate(right)?;

    if op.is_comparison() {
        return compare(op, &l, &r);
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (BinaryOp::Add, Value::String(a), b) | (BinaryOp::Add, b, Value::String(a)) =
        (op, &l, &r)
    {
        let (first, second) = if matches!(l, Value::String(_)) {
            (a.clone(), b.to_string())
        } else {
            (b.to_string(), a.clone())
        };
        return Ok(Value::String(first + &second));
    }
    arithmetic(op, l, r)
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    use std::cmp::Ordering;

    if l.is_null() || r.is_null() {
        // Two-valued semantics: null equals only null
        let both = l.is_null() && r.is_null();
        return Ok(Value::Bool(match op {
            BinaryOp::Eq => both,
            BinaryOp::Ne => !both,
            _ => false,
        }));
    }
    let ordering = match (l, r) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => a.cmp(b),
        (Value::Guid(a), Value::Guid(b)) => a.cmp(b),
        (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
        (a, b) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = to_decimal(a)?;
                let y = to_decimal(b)?;
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
    };
    Ok(Value::Bool(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("non-comparison operator"),
    }))
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    let overflow = || Error::Evaluation(format!("arithmetic overflow in '{}'", op.symbol()));
    match (&l, &r) {
        (Value::Int32(a), Value::Int32(b)) => {
            let (a, b) = (*a, *b);
            check_divisor(op, i64::from(b))?;
            let v = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => None,
            };
            v.map(Value::Int32).ok_or_else(overflow)
        }
        (Value::Float64(_), _) | (_, Value::Float64(_)) => {
            let a = to_f64(&l)?;
            let b = to_f64(&r)?;
            Ok(Value::Float64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(type_error(op.symbol(), &l)),
            }))
        }
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            let a = to_decimal(&l)?;
            let b = to_decimal(&r)?;
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b.is_zero() {
                return Err(Error::Evaluation("division by zero".to_string()));
            }
            Ok(Value::Decimal(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(type_error(op.symbol(), &l)),
            }))
        }
        _ => {
            let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) else {
                return Err(type_error(op.symbol(), &l));
            };
            check_divisor(op, b)?;
            let v = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                _ => None,
            };
            v.map(Value::Int64).ok_or_else(overflow)
        }
    }
}

fn check_divisor(op: BinaryOp, divisor: i64) -> Result<()> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && divisor == 0 {
        return Err(Error::Evaluation("division by zero".to_string()));
    }
    Ok(())
}

fn negate(value: Value) -> Result<Value> {
    let overflow = || Error::Evaluation("arithmetic overflow in negation".to_string());
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int32(i) => i.checked_neg().map(Value::Int32).ok_or_else(overflow),
        Value::Int64(i) => i.checked_neg().map(Value::Int64).ok_or_else(overflow),
        Value::Float64(f) => Ok(Value::Float64(-f)),
        Value::Decimal(d) => Ok(Value::Decimal(-d)),
        other => Err(type_error("-", &other)),
    }
}

/// Converts a value to the given type using the same widening rules as
/// the expression type system.
fn convert(value: Value, ty: &ValueType) -> Result<Value> {
    if value.is_null() {
        return if ty.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(Error::Evaluation(format!(
                "null cannot be converted to non-nullable {ty}"
            )))
        };
    }
    let target = ty.underlying();
    let converted = match target {
        ValueType::Object => value,
        ValueType::Int64 if value.as_i64().is_some() => Value::Int64(value.as_i64().unwrap_or(0)),
        ValueType::Int32 if value.as_i64().is_some() => {
            let wide = value.as_i64().unwrap_or(0);
            Value::Int32(i32::try_from(wide).map_err(|_| {
                Error::Evaluation(format!("value {wide} does not fit in Int32"))
            })?)
        }
        ValueType::Float64 => Value::Float64(to_f64(&value)?),
        ValueType::Decimal => Value::Decimal(to_decimal(&value)?),
        _ if value.value_type().as_ref() == Some(target) => value,
        _ => {
            return Err(Error::Evaluation(format!(
                "cannot convert {} to {target}",
                value.type_name()
            )));
        }
    };
    Ok(converted)
}

fn to_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Float64(f) => Ok(*f),
        Value::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| Error::Evaluation(format!("{d} is out of Float64 range"))),
        v => v
            .as_i64()
            .map(|i| i as f64)
            .ok_or_else(|| type_error("numeric conversion", v)),
    }
}

fn to_decimal(value: &Value) -> Result<BigDecimal> {
    match value {
        Value::Decimal(d) => Ok(d.clone()),
        Value::Float64(f) => BigDecimal::from_f64(*f)
            .ok_or_else(|| Error::Evaluation(format!("{f} cannot be represented as Decimal"))),
        v => v
            .as_i64()
            .map(BigDecimal::from)
            .ok_or_else(|| type_error("numeric conversion", v)),
    }
}

fn type_error(op: &str, value: &Value) -> Error {
    Error::Evaluation(format!(
        "operator '{op}' is not defined for {}",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ClientFunction;

    #[test]
    fn test_evaluate_captured_member() {
        let e = Expr::capture("name", "Alice");
        assert_eq!(evaluate(&e).unwrap(), Value::from("Alice"));
        assert_eq!(evaluate(&e.length()).unwrap(), Value::Int32(5));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let e = Expr::capture("n", 20).add(22);
        assert_eq!(evaluate(&e).unwrap(), Value::Int32(42));

        let mixed = Expr::constant(1).add(Expr::constant(2i64));
        assert_eq!(evaluate(&mixed).unwrap(), Value::Int64(3));

        let float = Expr::constant(1.5).mul(2);
        assert_eq!(evaluate(&float).unwrap(), Value::Float64(3.0));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let e = Expr::capture("n", 1).div(0);
        let err = evaluate(&e).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_overflow_is_error() {
        let e = Expr::constant(i32::MAX).add(1);
        assert!(evaluate(&e).is_err());
    }

    #[test]
    fn test_string_methods() {
        let e = Expr::capture("s", " Hi ").trim().to_upper();
        assert_eq!(evaluate(&e).unwrap(), Value::from("HI"));
        let starts = Expr::constant("London").starts_with("Lon");
        assert_eq!(evaluate(&starts).unwrap(), Value::Bool(true));
        let concat = Expr::constant("id-").add(7);
        assert_eq!(evaluate(&concat).unwrap(), Value::from("id-7"));
    }

    #[test]
    fn test_null_comparisons_are_two_valued() {
        let null = Expr::null(ValueType::Int32);
        assert_eq!(
            evaluate(&null.clone().eq(Expr::null(ValueType::Int32))).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(evaluate(&null.ne(1)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_convert_widening() {
        let e = Expr::constant(5).convert(ValueType::Nullable(Box::new(ValueType::Int64)));
        assert_eq!(evaluate(&e).unwrap(), Value::Int64(5));
        let to_object = Expr::constant("x").convert(ValueType::Object);
        assert_eq!(evaluate(&to_object).unwrap(), Value::from("x"));
        let narrowing = Expr::constant(i64::MAX).convert(ValueType::Int32);
        assert!(evaluate(&narrowing).is_err());
    }

    #[test]
    fn test_client_function_errors_propagate() {
        let f = ClientFunction::new("explode", |_| {
            Err(Error::Evaluation("boom".to_string()))
        });
        let e = Expr::function(f, vec![], ValueType::Int32);
        assert!(matches!(evaluate(&e), Err(Error::Evaluation(m)) if m == "boom"));
    }

    #[test]
    fn test_list_contains() {
        let list = Expr::new_list(vec![Expr::constant(1), Expr::constant(2)], ValueType::Int32);
        assert_eq!(
            evaluate(&list.list_contains(2)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_parameters_cannot_be_evaluated() {
        let e = Expr::parameter("c", ValueType::Int32);
        assert!(evaluate(&e).is_err());
    }
}
