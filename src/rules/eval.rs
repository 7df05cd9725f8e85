//! Evaluation of compiled rule expressions against a context.
use std::collections::HashMap;

use semver::Version;

use crate::{Context, ContextValue, EvaluationError};

use super::parser::{CompareOp, Expr};

fn type_error(detail: impl Into<String>) -> EvaluationError {
    EvaluationError::RuleType {
        detail: detail.into(),
    }
}

fn expect_bool(value: ContextValue, operator: &str) -> Result<bool, EvaluationError> {
    value.as_bool().ok_or_else(|| {
        type_error(format!(
            "operand of {operator:?} must be a boolean, got {}",
            value.type_name(),
        ))
    })
}

pub(crate) fn evaluate(expr: &Expr, context: &Context) -> Result<ContextValue, EvaluationError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        // Absent fields evaluate to null so rules can probe optional attributes
        // (`plan != null and plan == "pro"`).
        Expr::Field(path) => Ok(context.get(path).cloned().unwrap_or(ContextValue::Null)),

        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ContextValue::List(values))
        }

        Expr::Dict(entries) => {
            let mut map = HashMap::with_capacity(entries.len());
            for (key, value) in entries {
                let key = evaluate(key, context)?;
                let ContextValue::String(key) = key else {
                    return Err(type_error(format!(
                        "dict keys must be strings, got {}",
                        key.type_name(),
                    )));
                };
                map.insert(key, evaluate(value, context)?);
            }
            Ok(ContextValue::Object(map))
        }

        Expr::Not(operand) => {
            let value = expect_bool(evaluate(operand, context)?, "not")?;
            Ok(ContextValue::Boolean(!value))
        }

        Expr::And(lhs, rhs) => {
            if !expect_bool(evaluate(lhs, context)?, "and")? {
                return Ok(ContextValue::Boolean(false));
            }
            let rhs = expect_bool(evaluate(rhs, context)?, "and")?;
            Ok(ContextValue::Boolean(rhs))
        }

        Expr::Or(lhs, rhs) => {
            if expect_bool(evaluate(lhs, context)?, "or")? {
                return Ok(ContextValue::Boolean(true));
            }
            let rhs = expect_bool(evaluate(rhs, context)?, "or")?;
            Ok(ContextValue::Boolean(rhs))
        }

        Expr::Compare(op, lhs, rhs) => {
            let lhs = evaluate(lhs, context)?;
            let rhs = evaluate(rhs, context)?;
            compare(*op, &lhs, &rhs).map(ContextValue::Boolean)
        }
    }
}

fn compare(op: CompareOp, lhs: &ContextValue, rhs: &ContextValue) -> Result<bool, EvaluationError> {
    match op {
        // Structural equality; values of different types are simply unequal.
        CompareOp::Eq => Ok(lhs == rhs),
        CompareOp::Ne => Ok(lhs != rhs),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let ordering = ordering_of(op, lhs, rhs)?;
            Ok(ordering)
        }
        CompareOp::In => contains(lhs, rhs),
        CompareOp::NotIn => contains(lhs, rhs).map(|found| !found),
    }
}

fn ordering_of(
    op: CompareOp,
    lhs: &ContextValue,
    rhs: &ContextValue,
) -> Result<bool, EvaluationError> {
    match (lhs, rhs) {
        (ContextValue::Number(l), ContextValue::Number(r)) => Ok(apply_ordering(op, l, r)),
        (ContextValue::String(l), ContextValue::String(r)) => {
            // Version strings order numerically per component ("1.10.0" above "1.2.0"); anything
            // else orders lexicographically.
            match (Version::parse(l), Version::parse(r)) {
                (Ok(l), Ok(r)) => Ok(apply_ordering(op, &l, &r)),
                _ => Ok(apply_ordering(op, l, r)),
            }
        }
        _ => Err(type_error(format!(
            "cannot order {} against {}",
            lhs.type_name(),
            rhs.type_name(),
        ))),
    }
}

fn apply_ordering<T: PartialOrd + ?Sized>(op: CompareOp, lhs: &T, rhs: &T) -> bool {
    match op {
        CompareOp::Lt => lhs < rhs,
        CompareOp::Lte => lhs <= rhs,
        CompareOp::Gt => lhs > rhs,
        CompareOp::Gte => lhs >= rhs,
        // ordering_of is only called with ordering operators
        CompareOp::Eq | CompareOp::Ne | CompareOp::In | CompareOp::NotIn => unreachable!(),
    }
}

fn contains(needle: &ContextValue, haystack: &ContextValue) -> Result<bool, EvaluationError> {
    match haystack {
        ContextValue::List(items) => Ok(items.iter().any(|item| item == needle)),
        ContextValue::String(s) => match needle {
            ContextValue::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Err(type_error(format!(
                "membership in a string requires a string, got {}",
                needle.type_name(),
            ))),
        },
        ContextValue::Object(map) => match needle {
            ContextValue::String(key) => Ok(map.contains_key(key)),
            _ => Err(type_error(format!(
                "membership in a dict requires a string key, got {}",
                needle.type_name(),
            ))),
        },
        _ => Err(type_error(format!(
            "membership requires a list, string, or dict, got {}",
            haystack.type_name(),
        ))),
    }
}
