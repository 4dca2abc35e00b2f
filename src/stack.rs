//! The visible operand stack at `/stack`: push-with-log and
//! remove-with-log, per spec §4.3.

use crate::document;
use crate::error::FatalError;
use crate::residual;
use serde_json::Value;

fn stack_array(root: &Value) -> Result<&Vec<Value>, FatalError> {
    root.get("stack")
        .and_then(Value::as_array)
        .ok_or_else(|| FatalError::AssertionFailure {
            detail: "`stack` must be an array".to_string(),
        })
}

fn stack_array_mut(root: &mut Value) -> Result<&mut Vec<Value>, FatalError> {
    root.get_mut("stack")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| FatalError::AssertionFailure {
            detail: "`stack` must be an array".to_string(),
        })
}

/// Number of elements currently on the operand stack.
pub fn len(root: &Value) -> Result<usize, FatalError> {
    Ok(stack_array(root)?.len())
}

/// Push `value` onto the stack and, if reversible, append the matching
/// `{op: "add", path: "/stack/-", value}` residual entry. `value` is taken
/// as-is -- callers that push a literal from the instruction stream are
/// responsible for having deep-copied it first (per spec §3, "pushing a
/// literal always deep-copies"); this function deep-copies only for the
/// log entry, not for the pushed value itself, to avoid a redundant clone
/// when the caller already owns a fresh copy.
pub fn push(root: &mut Value, value: Value) -> Result<(), FatalError> {
    let logged = document::deep_copy(&value);
    stack_array_mut(root)?.push(value);
    residual::record_single(root, residual::patch_add("/stack/-", logged));
    Ok(())
}

/// Pop the top of the stack, logging `{op: "remove", path: "/stack/<n-1>",
/// value}` with the captured value so `undo` can restore it. Fatal
/// `stack_underflow` naming `op` if the stack is empty.
pub fn pop(op: &'static str, root: &mut Value) -> Result<Value, FatalError> {
    let n = stack_array(root)?.len();
    let value = stack_array_mut(root)?
        .pop()
        .ok_or_else(|| FatalError::StackUnderflow {
            op,
            detail: "stack is empty".to_string(),
        })?;
    let path = format!("/stack/{}", n - 1);
    residual::record_single(root, residual::patch_remove(path, document::deep_copy(&value)));
    Ok(value)
}

/// Peek the top of the stack without removing it. Fatal `stack_underflow`
/// naming `op` if the stack is empty.
pub fn peek<'a>(op: &'static str, root: &'a Value) -> Result<&'a Value, FatalError> {
    stack_array(root)?
        .last()
        .ok_or_else(|| FatalError::StackUnderflow {
            op,
            detail: "stack is empty".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_pop_round_trips() {
        let mut doc = json!({"stack": []});
        push(&mut doc, json!(7)).unwrap();
        assert_eq!(pop("test", &mut doc).unwrap(), json!(7));
    }

    #[test]
    fn pop_underflow_names_opcode() {
        let mut doc = json!({"stack": []});
        let err = pop("add_two_top", &mut doc).unwrap_err();
        assert_eq!(err.opcode(), Some("add_two_top"));
    }

    #[test]
    fn push_logs_add_patch_when_reversible() {
        let mut doc = json!({"stack": [], "is_reversible": true});
        push(&mut doc, json!(1)).unwrap();
        assert_eq!(doc["residual"][0]["op"], json!("add"));
        assert_eq!(doc["residual"][0]["path"], json!("/stack/-"));
    }

    #[test]
    fn pop_logs_remove_patch_with_captured_value() {
        let mut doc = json!({"stack": [9], "is_reversible": true});
        pop("test", &mut doc).unwrap();
        assert_eq!(doc["residual"][0]["op"], json!("remove"));
        assert_eq!(doc["residual"][0]["path"], json!("/stack/0"));
        assert_eq!(doc["residual"][0]["value"], json!(9));
    }
}
