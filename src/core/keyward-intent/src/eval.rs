//! Intent evaluation.

use std::cmp::Ordering;

use crate::env::{BindingEnv, APPROVERS};
use crate::error::IntentError;
use crate::expr::{CmpOp, Expr, Value};

/// Evaluates an expression to a value.
pub fn evaluate(expr: &Expr, env: &BindingEnv) -> Result<Value, IntentError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => env
            .lookup(name)
            .cloned()
            .ok_or_else(|| IntentError::eval(format!("unknown identifier '{name}'"))),
        Expr::List(items) => items
            .iter()
            .map(|e| evaluate(e, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Not(e) => Ok(Value::Bool(!evaluate_bool(e, env)?)),
        Expr::And(a, b) => Ok(Value::Bool(evaluate_bool(a, env)? && evaluate_bool(b, env)?)),
        Expr::Or(a, b) => Ok(Value::Bool(evaluate_bool(a, env)? || evaluate_bool(b, env)?)),
        Expr::Compare(op, a, b) => compare(*op, &evaluate(a, env)?, &evaluate(b, env)?).map(Value::Bool),
        Expr::All(list) => {
            let items = expect_list(evaluate(list, env)?, "all")?;
            let approvers = approvers(env)?;
            for item in &items {
                if !is_satisfied(item, &approvers)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        },
        Expr::Any(threshold, list) => {
            let n = match evaluate(threshold, env)? {
                Value::Int(n) if n >= 0 => n as u64,
                Value::Int(n) => return Err(IntentError::eval(format!("any: negative threshold {n}"))),
                other => {
                    return Err(IntentError::eval(format!(
                        "any: threshold must be int, got {}",
                        other.type_name()
                    )))
                },
            };
            let items = expect_list(evaluate(list, env)?, "any")?;
            let approvers = approvers(env)?;
            let mut count = 0u64;
            for item in &items {
                if is_satisfied(item, &approvers)? {
                    count += 1;
                }
            }
            Ok(Value::Bool(count >= n))
        },
    }
}

/// Evaluates an expression that must produce a boolean.
pub fn evaluate_bool(expr: &Expr, env: &BindingEnv) -> Result<bool, IntentError> {
    match evaluate(expr, env)? {
        Value::Bool(b) => Ok(b),
        other => Err(IntentError::eval(format!("expected bool, got {}", other.type_name()))),
    }
}

fn expect_list(v: Value, func: &str) -> Result<Vec<Value>, IntentError> {
    match v {
        Value::List(items) => Ok(items),
        other => Err(IntentError::eval(format!(
            "{func}: expected list, got {}",
            other.type_name()
        ))),
    }
}

fn approvers(env: &BindingEnv) -> Result<Vec<String>, IntentError> {
    match env.lookup(APPROVERS) {
        None => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s.clone()),
                other => Err(IntentError::eval(format!(
                    "approvers must be strings, got {}",
                    other.type_name()
                ))),
            })
            .collect(),
        Some(other) => Err(IntentError::eval(format!(
            "approvers must be a list, got {}",
            other.type_name()
        ))),
    }
}

/// An address element counts when it approved; a nested condition counts
/// when it evaluated to true.
fn is_satisfied(item: &Value, approvers: &[String]) -> Result<bool, IntentError> {
    match item {
        Value::Str(addr) => Ok(approvers.iter().any(|a| a == addr)),
        Value::Bool(b) => Ok(*b),
        other => Err(IntentError::eval(format!(
            "approval list element must be an address or bool, got {}",
            other.type_name()
        ))),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, IntentError> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bool(_), Value::Bool(_)) | (Value::List(_), Value::List(_)) => None,
        _ => {
            return Err(IntentError::eval(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )))
        },
    };

    match (op, ordering) {
        (CmpOp::Eq, _) => Ok(a == b),
        (CmpOp::Ne, _) => Ok(a != b),
        (_, None) => Err(IntentError::eval(format!(
            "operator {} is not defined for {}",
            op.symbol(),
            a.type_name()
        ))),
        (CmpOp::Lt, Some(o)) => Ok(o == Ordering::Less),
        (CmpOp::Le, Some(o)) => Ok(o != Ordering::Greater),
        (CmpOp::Gt, Some(o)) => Ok(o == Ordering::Greater),
        (CmpOp::Ge, Some(o)) => Ok(o != Ordering::Less),
    }
}
