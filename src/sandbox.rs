//! Sandboxed sub-execution for `test`, `step`, and `undo` (spec §4.8).
//!
//! Each entry point here (a) deep-copies the caller's program value into a
//! fresh document, (b) retains it once, (c) does its isolated work, and
//! (d) hands back a deep copy of the result -- the sandbox document itself
//! is dropped (Rust's ordinary ownership stands in for the spec's explicit
//! "release the sandbox document" step; see SPEC_FULL.md §5). No handle or
//! residual state crosses the boundary in either direction.

use crate::document;
use crate::error::FatalError;
use crate::residual;
use crate::walker;
use crate::Interpreter;
use serde_json::Value;

/// Run `program` to completion in an isolated document and return the
/// resulting root. Used by the `test` opcode.
pub fn run_program(program: &Value) -> Result<Value, FatalError> {
    let sandboxed = document::deep_copy(program);
    let mut vm = Interpreter::new(sandboxed);
    vm.run()?;
    Ok(vm.into_document())
}

/// Execute a single instruction of `program` at its `pc` (default 0),
/// returning a copy of `program` with `pc` incremented and that one
/// instruction's effects applied. Used by the `step` opcode.
pub fn step_once(program: &Value) -> Result<Value, FatalError> {
    let sandboxed = document::deep_copy(program);
    document::ensure_object(&sandboxed)?;

    let pc = sandboxed.get("pc").and_then(Value::as_u64).unwrap_or(0) as usize;
    let instr = sandboxed
        .get("entrypoint")
        .and_then(Value::as_array)
        .and_then(|arr| arr.get(pc))
        .cloned();

    let mut vm = Interpreter::new(sandboxed);
    if let Some(instr) = instr {
        walker::walk(&mut vm, std::slice::from_ref(&instr), "/entrypoint")?;
    }

    let mut result = vm.into_document();
    if let Some(obj) = result.as_object_mut() {
        obj.insert("pc".to_string(), Value::from((pc + 1) as u64));
    }
    Ok(result)
}

/// Pop one residual entry from `program` and apply its inverse, returning
/// the modified program. Used by the `undo` opcode. No walker run is
/// involved -- only the inverse machinery of [`residual::undo_last`].
pub fn undo_once(program: &Value) -> Result<Value, FatalError> {
    let mut sandboxed = document::deep_copy(program);
    document::ensure_object(&sandboxed)?;
    residual::undo_last(&mut sandboxed)?;
    Ok(sandboxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_program_executes_to_completion() {
        let program = json!({"stack": [], "entrypoint": [1, 2, {".": "add_two_top"}]});
        let result = run_program(&program).unwrap();
        assert_eq!(result["stack"], json!([3]));
    }

    #[test]
    fn run_program_does_not_mutate_the_caller_copy() {
        let program = json!({"stack": [], "entrypoint": [1]});
        let _ = run_program(&program).unwrap();
        assert_eq!(program["stack"], json!([]));
    }

    #[test]
    fn step_once_executes_a_single_instruction_and_advances_pc() {
        let program = json!({"stack": [], "entrypoint": [1, 2, 3]});
        let after_one = step_once(&program).unwrap();
        assert_eq!(after_one["stack"], json!([1]));
        assert_eq!(after_one["pc"], json!(1));

        let after_two = step_once(&after_one).unwrap();
        assert_eq!(after_two["stack"], json!([1, 2]));
        assert_eq!(after_two["pc"], json!(2));
    }

    #[test]
    fn undo_once_inverts_the_last_residual_entry() {
        let program = json!({
            "stack": [1],
            "is_reversible": true,
            "residual": [{"op": "add", "path": "/stack/-", "value": 1}]
        });
        let result = undo_once(&program).unwrap();
        assert_eq!(result["stack"], json!([]));
        assert_eq!(result["residual"], json!([]));
    }
}
