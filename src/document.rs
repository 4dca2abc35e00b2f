//! Typed accessors over `serde_json::Value`, plus the two operations the
//! spec calls out by name: deep copy and in-place scalar assignment.
//!
//! `serde_json::Value`'s `Clone` is already a structural deep copy (it owns
//! every node), so [`deep_copy`] is a thin, named wrapper rather than a
//! hand-rolled recursive copier -- the recursion the spec describes is the
//! one `serde_json` already performs; naming it keeps call sites reading
//! like the spec ("deep-copy this value onto the stack") instead of a bare
//! `.clone()`.

use crate::error::FatalError;
use serde_json::{Number, Value};

/// Deep-copy `value`. Required anywhere a value crosses a semantic
/// boundary: literal push, sandbox return, heap store.
pub fn deep_copy(value: &Value) -> Value {
    value.clone()
}

/// Overwrite the tag and payload of `target` in place with `value`.
/// Supports only null/bool/number/string on both sides; container-to-
/// container replacement (array/object on either side) is a fatal
/// [`FatalError::TypeMismatch`], per spec §4.1.
pub fn scalar_assign(op: &'static str, target: &mut Value, value: Value) -> Result<(), FatalError> {
    if target.is_array() || target.is_object() || value.is_array() || value.is_object() {
        return Err(FatalError::TypeMismatch {
            op,
            detail: "scalar_assign does not support containers".to_string(),
        });
    }
    *target = value;
    Ok(())
}

/// Read a bool, coercing nothing -- the accessor fails fast on wrong shape.
pub fn get_bool(op: &'static str, value: &Value) -> Result<bool, FatalError> {
    value.as_bool().ok_or_else(|| FatalError::TypeMismatch {
        op,
        detail: format!("expected bool, got {}", type_name(value)),
    })
}

/// Read an integer. Accepts a `Number` that is exactly representable as
/// `i64`, and also a whole-valued `f64` (numbers may be signed integer or
/// real; accessors coerce where ambiguous, per spec §4.1).
pub fn get_int(op: &'static str, value: &Value) -> Result<i64, FatalError> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        _ => None,
    }
    .ok_or_else(|| FatalError::TypeMismatch {
        op,
        detail: format!("expected integer, got {}", type_name(value)),
    })
}

/// Read a real number, coercing an integer `Number` up to `f64`.
pub fn get_real(op: &'static str, value: &Value) -> Result<f64, FatalError> {
    value.as_f64().ok_or_else(|| FatalError::TypeMismatch {
        op,
        detail: format!("expected number, got {}", type_name(value)),
    })
}

/// Read a string slice.
pub fn get_str<'a>(op: &'static str, value: &'a Value) -> Result<&'a str, FatalError> {
    value.as_str().ok_or_else(|| FatalError::TypeMismatch {
        op,
        detail: format!("expected string, got {}", type_name(value)),
    })
}

/// Read an object member by key.
pub fn obj_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object()?.get(key)
}

/// Number of elements in an array value.
pub fn arr_size(op: &'static str, value: &Value) -> Result<usize, FatalError> {
    value
        .as_array()
        .map(|a| a.len())
        .ok_or_else(|| FatalError::TypeMismatch {
            op,
            detail: format!("expected array, got {}", type_name(value)),
        })
}

/// Append `item` to an array value in place.
pub fn arr_append(op: &'static str, value: &mut Value, item: Value) -> Result<(), FatalError> {
    value
        .as_array_mut()
        .ok_or_else(|| FatalError::TypeMismatch {
            op,
            detail: format!("expected array, got {}", type_name(value)),
        })?
        .push(item);
    Ok(())
}

/// Remove and return the last element of an array value, if any.
pub fn arr_remove_last(value: &mut Value) -> Option<Value> {
    value.as_array_mut()?.pop()
}

/// Insert or overwrite a key on an object value, returning the previous
/// value if the key already existed (used to decide add-vs-replace for
/// residual logging).
pub fn obj_add(op: &'static str, value: &mut Value, key: String, item: Value) -> Result<Option<Value>, FatalError> {
    Ok(value
        .as_object_mut()
        .ok_or_else(|| FatalError::TypeMismatch {
            op,
            detail: format!("expected object, got {}", type_name(value)),
        })?
        .insert(key, item))
}

/// Remove a key from an object value.
pub fn obj_remove(value: &mut Value, key: &str) -> Option<Value> {
    value.as_object_mut()?.remove(key)
}

/// Build a `Number` that stays an integer when `n` is integral, matching
/// the spec's note (§9) that implementations should preserve integer-ness
/// when both `add_two_top` operands were integers.
pub fn number_from_f64_or_i64(n: f64, prefer_int: bool) -> Number {
    if prefer_int && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Number::from(n as i64)
    } else {
        Number::from_f64(n).unwrap_or_else(|| Number::from(0))
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ensure the document root is an object, per spec invariant 2.
pub fn ensure_object(root: &Value) -> Result<(), FatalError> {
    if root.is_object() {
        Ok(())
    } else {
        Err(FatalError::AssertionFailure {
            detail: "document root must be an object".to_string(),
        })
    }
}

/// Ensure `root["stack"]` is an array, per spec invariant 1, creating an
/// empty one if the key is altogether absent (documents that never
/// mention `stack` still get one the first time an opcode needs it).
pub fn ensure_stack(root: &mut Value) -> Result<(), FatalError> {
    let obj = root.as_object_mut().ok_or_else(|| FatalError::AssertionFailure {
        detail: "document root must be an object".to_string(),
    })?;
    match obj.get("stack") {
        Some(Value::Array(_)) => Ok(()),
        None => {
            obj.insert("stack".to_string(), Value::Array(Vec::new()));
            Ok(())
        }
        Some(_) => Err(FatalError::AssertionFailure {
            detail: "`stack` must be an array".to_string(),
        }),
    }
}
