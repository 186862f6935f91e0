//! The type algebra for `+`, `-`, comparisons and membership tests.

use ecow::EcoString;
use thiserror::Error;

use syntax::ast::{BinaryOp, CompareOp};

use crate::evaluated_data::{Struct, StructMember, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueOpError {
    #[error("Cannot add a {rhs} to a {lhs}.")]
    CannotAdd {
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("Cannot subtract a {rhs} from a {lhs}.")]
    CannotSubtract {
        lhs: &'static str,
        rhs: &'static str,
    },
}

/// Applies one `+` or `-` step, dispatching on the left operand's type.
pub fn apply_binary_op(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ValueOpError> {
    let mismatch = |lhs: &Value, rhs: &Value| match op {
        BinaryOp::Add => ValueOpError::CannotAdd {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        },
        BinaryOp::Subtract => ValueOpError::CannotSubtract {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        },
    };

    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Integer(lhs), Value::Integer(rhs)) => {
            Ok(Value::Integer(lhs.wrapping_add(rhs)))
        }
        (BinaryOp::Subtract, Value::Integer(lhs), Value::Integer(rhs)) => {
            Ok(Value::Integer(lhs.wrapping_sub(rhs)))
        }
        (BinaryOp::Add, Value::String(mut lhs), Value::String(rhs)) => {
            lhs.push_str(&rhs);
            Ok(Value::String(lhs))
        }
        (BinaryOp::Subtract, Value::String(lhs), Value::String(rhs)) => {
            Ok(Value::String(remove_all(&lhs, &rhs)))
        }
        (BinaryOp::Add, Value::ArrayOfStrings(mut lhs), Value::String(rhs)) => {
            lhs.push(rhs);
            Ok(Value::ArrayOfStrings(lhs))
        }
        (BinaryOp::Subtract, Value::ArrayOfStrings(mut lhs), Value::String(rhs)) => {
            lhs.retain(|item| *item != rhs);
            Ok(Value::ArrayOfStrings(lhs))
        }
        (BinaryOp::Add, Value::ArrayOfStrings(mut lhs), Value::ArrayOfStrings(rhs)) => {
            lhs.extend(rhs);
            Ok(Value::ArrayOfStrings(lhs))
        }
        // An empty array is an ArrayOfStrings until a struct is appended.
        (BinaryOp::Add, Value::ArrayOfStrings(lhs), Value::Struct(rhs)) if lhs.is_empty() => {
            Ok(Value::ArrayOfStructs(vec![rhs]))
        }
        (BinaryOp::Add, Value::ArrayOfStrings(lhs), Value::ArrayOfStructs(rhs))
            if lhs.is_empty() =>
        {
            Ok(Value::ArrayOfStructs(rhs))
        }
        (BinaryOp::Add, Value::ArrayOfStructs(mut lhs), Value::Struct(rhs)) => {
            lhs.push(rhs);
            Ok(Value::ArrayOfStructs(lhs))
        }
        (BinaryOp::Add, Value::ArrayOfStructs(mut lhs), Value::ArrayOfStructs(rhs)) => {
            lhs.extend(rhs);
            Ok(Value::ArrayOfStructs(lhs))
        }
        (BinaryOp::Add, Value::ArrayOfStructs(lhs), Value::ArrayOfStrings(rhs))
            if rhs.is_empty() =>
        {
            Ok(Value::ArrayOfStructs(lhs))
        }
        (BinaryOp::Add, Value::Struct(lhs), Value::Struct(rhs)) => {
            Ok(Value::Struct(merge_structs(lhs, &rhs)))
        }
        (_, lhs, rhs) => Err(mismatch(&lhs, &rhs)),
    }
}

/// Removes every occurrence of `needle` from `haystack`.
fn remove_all(haystack: &str, needle: &str) -> EcoString {
    if needle.is_empty() {
        return haystack.into();
    }
    haystack.replace(needle, "").into()
}

/// Concatenates two structs. The left operand's member order is kept; a
/// member present on both sides takes the right operand's value, and the
/// definitions of both sides are merged.
fn merge_structs(mut lhs: Struct, rhs: &Struct) -> Struct {
    for (name, member) in rhs.iter() {
        let mut definitions = match lhs.get(name) {
            Some(existing) => existing.definitions.clone(),
            None => Vec::new(),
        };
        for id in &member.definitions {
            if !definitions.contains(id) {
                definitions.push(*id);
            }
        }
        lhs.insert(
            name.clone(),
            StructMember::new(member.value.clone(), definitions),
        );
    }
    lhs
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("Cannot compare a {lhs} to a {rhs}.")]
    MismatchedTypes {
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("Cannot compare {type_name} values with '{op}'.")]
    UnsupportedOrdering {
        type_name: &'static str,
        op: &'static str,
    },
}

/// Compares two values. Equality works for any two values of the same type;
/// ordering only for integers and strings.
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, CompareError> {
    if lhs.type_name() != rhs.type_name() {
        return Err(CompareError::MismatchedTypes {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        });
    }

    match op {
        CompareOp::Eq => return Ok(lhs == rhs),
        CompareOp::NotEq => return Ok(lhs != rhs),
        _ => {}
    }

    let ordering = match (lhs, rhs) {
        (Value::Integer(lhs), Value::Integer(rhs)) => lhs.cmp(rhs),
        (Value::String(lhs), Value::String(rhs)) => lhs.cmp(rhs),
        _ => {
            return Err(CompareError::UnsupportedOrdering {
                type_name: lhs.type_name(),
                op: op.symbol(),
            });
        }
    };

    Ok(match op {
        CompareOp::Less => ordering.is_lt(),
        CompareOp::LessEq => ordering.is_le(),
        CompareOp::Greater => ordering.is_gt(),
        CompareOp::GreaterEq => ordering.is_ge(),
        CompareOp::Eq | CompareOp::NotEq => unreachable!(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("Left-hand side of 'in' must be a String or an ArrayOfStrings, but it is a {0}.")]
    BadLhs(&'static str),
    #[error("Right-hand side of 'in' must be an ArrayOfStrings, but it is a {0}.")]
    BadRhs(&'static str),
}

/// The `in` test: is the left string present in the right array? An array
/// on the left is a subset test: every element must be present, so an empty
/// left array is vacuously in any array.
pub fn membership(lhs: &Value, rhs: &Value) -> Result<bool, MembershipError> {
    let haystack = match rhs {
        Value::ArrayOfStrings(items) => items,
        other => return Err(MembershipError::BadRhs(other.type_name())),
    };
    match lhs {
        Value::String(needle) => Ok(haystack.contains(needle)),
        Value::ArrayOfStrings(needles) => {
            Ok(needles.iter().all(|needle| haystack.contains(needle)))
        }
        other => Err(MembershipError::BadLhs(other.type_name())),
    }
}
