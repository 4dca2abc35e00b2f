//! The entrypoint walker: classifies each instruction by JSON shape and
//! dispatches literals, macros, and opcodes (spec §4.4).
//!
//! Instruction arrays are cloned out of the document before iterating
//! (entrypoint, a macro body, or a directive's inline `.` array) rather
//! than borrowed from it, since the same document is mutated while those
//! instructions run -- there is no generation-counted arena to borrow
//! against safely, and the arrays involved are small relative to the
//! document as a whole.

use crate::document;
use crate::error::FatalError;
use crate::opcode::OpKind;
use crate::stack;
use crate::Interpreter;
use serde_json::Value;

/// Walk one frame: push `frame_path` onto `call_stack`, run every
/// instruction in `instructions` in order (stopping early if `exit` fires),
/// then pop `call_stack`. The push/pop is unconditional -- it happens on
/// every exit path (normal completion, `exit` interrupt, or a fatal error
/// propagating out), per spec §4.4 point 1 ("must be symmetric").
pub fn walk(vm: &mut Interpreter, instructions: &[Value], frame_path: &str) -> Result<(), FatalError> {
    push_frame(vm, frame_path)?;
    let result = walk_body(vm, instructions, frame_path);
    pop_frame(vm);
    result
}

fn walk_body(vm: &mut Interpreter, instructions: &[Value], frame_path: &str) -> Result<(), FatalError> {
    for (idx, instr) in instructions.iter().enumerate() {
        dispatch(vm, instr, frame_path, idx)?;
        if consume_interrupt(vm) {
            break;
        }
    }
    Ok(())
}

/// Classify and dispatch a single instruction. The interrupt flag is
/// checked by the caller immediately *after* this returns, so `exit`
/// always takes effect in the frame that ran it -- including when `exit`
/// is the last instruction of that frame -- rather than leaking into
/// whichever frame happens to run its next loop iteration first.
fn dispatch(vm: &mut Interpreter, instr: &Value, frame_path: &str, idx: usize) -> Result<(), FatalError> {
    match instr {
        Value::String(_) | Value::Number(_) | Value::Array(_) | Value::Bool(_) | Value::Null => {
            stack::push(&mut vm.document, document::deep_copy(instr))
        }
        Value::Object(map) => match map.get(".") {
            None => stack::push(&mut vm.document, document::deep_copy(instr)),
            Some(Value::Array(nested)) => {
                let nested = nested.clone();
                let child_path = format!("{frame_path}/{idx}/.");
                walk(vm, &nested, &child_path)
            }
            Some(Value::String(name)) => dispatch_named(vm, name, instr),
            Some(other) => Err(FatalError::InvalidDirective {
                detail: format!(
                    "`.` must be a string or array, got {}",
                    document::type_name(other)
                ),
            }),
        },
    }
}

fn dispatch_named(vm: &mut Interpreter, name: &str, instr: &Value) -> Result<(), FatalError> {
    if let Some(kind) = OpKind::lookup(name) {
        return crate::opcode::execute(vm, kind);
    }
    let macro_body = vm
        .document
        .as_object()
        .and_then(|o| o.get(name))
        .and_then(Value::as_array)
        .cloned();
    match macro_body {
        Some(body) => walk(vm, &body, &format!("/{name}")),
        None => stack::push(&mut vm.document, document::deep_copy(instr)),
    }
}

fn push_frame(vm: &mut Interpreter, frame_path: &str) -> Result<(), FatalError> {
    let obj = vm
        .document
        .as_object_mut()
        .ok_or_else(|| FatalError::AssertionFailure {
            detail: "document root must be an object".to_string(),
        })?;
    match obj.get_mut("call_stack") {
        Some(Value::Array(arr)) => arr.push(Value::String(frame_path.to_string())),
        _ => {
            obj.insert(
                "call_stack".to_string(),
                Value::Array(vec![Value::String(frame_path.to_string())]),
            );
        }
    }
    Ok(())
}

fn pop_frame(vm: &mut Interpreter) {
    if let Some(arr) = vm
        .document
        .as_object_mut()
        .and_then(|o| o.get_mut("call_stack"))
        .and_then(Value::as_array_mut)
    {
        arr.pop();
    }
}

/// Consume `_interrupt_exit` if set, clearing it. Returns whether it was
/// set (i.e. whether the current frame should stop iterating).
fn consume_interrupt(vm: &mut Interpreter) -> bool {
    let Some(obj) = vm.document.as_object_mut() else {
        return false;
    };
    if matches!(obj.get("_interrupt_exit"), Some(Value::Bool(true))) {
        obj.insert("_interrupt_exit".to_string(), Value::Bool(false));
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interpreter;
    use serde_json::json;

    fn run(doc: Value) -> Value {
        let mut vm = Interpreter::new(doc);
        vm.run().unwrap();
        vm.into_document()
    }

    #[test]
    fn literal_scalars_push_onto_stack() {
        let doc = run(json!({"stack": [], "entrypoint": [1, "a", true, null]}));
        assert_eq!(doc["stack"], json!([1, "a", true, null]));
    }

    #[test]
    fn object_without_dot_key_is_a_literal() {
        let doc = run(json!({"stack": [], "entrypoint": [{"x": 1}]}));
        assert_eq!(doc["stack"], json!([{"x": 1}]));
    }

    #[test]
    fn nested_array_directive_runs_as_a_frame() {
        let doc = run(json!({"stack": [], "entrypoint": [{".": [1, 2]}]}));
        assert_eq!(doc["stack"], json!([1, 2]));
    }

    #[test]
    fn macro_expansion_by_name() {
        let doc = run(json!({
            "stack": [],
            "my_macro": [5, 7, {".": "add_two_top"}],
            "entrypoint": [{".": "my_macro"}, "sum", {".": "pop_and_store"}]
        }));
        assert_eq!(doc["sum"], json!(12));
    }

    #[test]
    fn unknown_dot_name_falls_back_to_literal() {
        let doc = run(json!({"stack": [], "entrypoint": [{".": "not_a_thing"}]}));
        assert_eq!(doc["stack"], json!([{".": "not_a_thing"}]));
    }

    #[test]
    fn invalid_directive_shape_is_fatal() {
        let mut vm = Interpreter::new(json!({"stack": [], "entrypoint": [{".": 5}]}));
        assert!(vm.run().is_err());
    }

    #[test]
    fn exit_at_top_level_terminates_cleanly() {
        let doc = run(json!({"stack": [], "entrypoint": [1, {".": "exit"}, 2]}));
        assert_eq!(doc["stack"], json!([1]));
    }

    #[test]
    fn exit_as_last_instruction_of_a_nested_frame_does_not_leak() {
        let doc = run(json!({
            "stack": [],
            "entrypoint": [{".": [1, {".": "exit"}]}, 99]
        }));
        assert_eq!(doc["stack"], json!([1, 99]));
    }

    #[test]
    fn call_stack_is_symmetric_after_a_clean_run() {
        let doc = run(json!({"stack": [], "entrypoint": [{".": [1, 2]}]}));
        assert_eq!(doc["call_stack"], json!([]));
    }
}
