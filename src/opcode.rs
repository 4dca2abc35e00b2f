//! The opcode library (spec §4.5): the ~20 built-in operations that read
//! and write the operand stack, the heap, the JPM, and the residual log.
//!
//! Dispatch is a tagged-variant enum matched exhaustively, per spec §9's
//! design note ("replace function-pointer-by-id dispatch with a tagged
//! enumeration of opcode kinds"), rather than the source's numeric-id ->
//! function-pointer table.

use crate::document;
use crate::error::{self, FatalError};
use crate::pointer;
use crate::residual::{self, Group};
use crate::sandbox;
use crate::stack;
use crate::walker;
use crate::Interpreter;
use serde_json::Value;

/// One opcode, as a tagged variant. Matches the table in spec §4.5 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    DuplicateTop,
    PopAndStore,
    AddTwoTop,
    Get,
    Set,
    Append,
    MapOver,
    Enter,
    Exit,
    PtrNew,
    PtrRelease,
    PtrGet,
    PtrSet,
    Test,
    PrintError,
    Load,
    Store,
    Undo,
    Step,
    PrintJson,
}

impl OpKind {
    /// Look up an opcode by its registered name. Names are case-sensitive
    /// (spec §6, "Opcode registry").
    pub fn lookup(name: &str) -> Option<OpKind> {
        use OpKind::*;
        Some(match name {
            "duplicate_top" => DuplicateTop,
            "pop_and_store" => PopAndStore,
            "add_two_top" => AddTwoTop,
            "get" => Get,
            "set" => Set,
            "append" => Append,
            "map_over" => MapOver,
            "enter" => Enter,
            "exit" => Exit,
            "ptr_new" => PtrNew,
            "ptr_release" => PtrRelease,
            "ptr_get" => PtrGet,
            "ptr_set" => PtrSet,
            "test" => Test,
            "print_error" => PrintError,
            "load" => Load,
            "store" => Store,
            "undo" => Undo,
            "step" => Step,
            "print_json" => PrintJson,
            _ => return None,
        })
    }

    /// The registered name, for diagnostics.
    pub fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            DuplicateTop => "duplicate_top",
            PopAndStore => "pop_and_store",
            AddTwoTop => "add_two_top",
            Get => "get",
            Set => "set",
            Append => "append",
            MapOver => "map_over",
            Enter => "enter",
            Exit => "exit",
            PtrNew => "ptr_new",
            PtrRelease => "ptr_release",
            PtrGet => "ptr_get",
            PtrSet => "ptr_set",
            Test => "test",
            PrintError => "print_error",
            Load => "load",
            Store => "store",
            Undo => "undo",
            Step => "step",
            PrintJson => "print_json",
        }
    }
}

/// Run one opcode against the interpreter's state.
pub fn execute(vm: &mut Interpreter, kind: OpKind) -> Result<(), FatalError> {
    match kind {
        OpKind::DuplicateTop => duplicate_top(vm),
        OpKind::PopAndStore => pop_and_store(vm),
        OpKind::AddTwoTop => add_two_top(vm),
        OpKind::Get => get(vm),
        OpKind::Set => set(vm),
        OpKind::Append => append(vm),
        OpKind::MapOver => map_over(vm),
        OpKind::Enter => enter(vm),
        OpKind::Exit => exit(vm),
        OpKind::PtrNew => ptr_new(vm),
        OpKind::PtrRelease => ptr_release(vm),
        OpKind::PtrGet => ptr_get(vm),
        OpKind::PtrSet => ptr_set(vm),
        OpKind::Test => test(vm),
        OpKind::PrintError => print_error(vm),
        OpKind::Load => load(vm),
        OpKind::Store => store(vm),
        OpKind::Undo => undo(vm),
        OpKind::Step => step(vm),
        OpKind::PrintJson => print_json(vm),
    }
}

fn duplicate_top(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    let top = stack::peek("duplicate_top", root)?.clone();
    stack::push(root, top)
}

fn pop_and_store(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    require_len("pop_and_store", root, 2)?;
    let key_val = stack::pop("pop_and_store", root)?;
    let key = match key_val {
        Value::String(s) => s,
        other => {
            return Err(FatalError::TypeMismatch {
                op: "pop_and_store",
                detail: format!("key must be a string, got {}", document::type_name(&other)),
            })
        }
    };
    let value = stack::pop("pop_and_store", root)?;
    let prior = document::obj_add("pop_and_store", root, key.clone(), value.clone())?;
    let path = format!("/{}", pointer::encode_key(&key));
    let patch = match prior {
        None => residual::patch_add(path, value),
        Some(_) => residual::patch_replace(path, value),
    };
    residual::record_single(root, patch);
    Ok(())
}

fn numeric_add(op: &'static str, a: &Value, b: &Value) -> Result<Value, FatalError> {
    let both_integral = a.as_i64().is_some() && b.as_i64().is_some();
    if both_integral {
        let sum = a
            .as_i64()
            .unwrap()
            .checked_add(b.as_i64().unwrap())
            .ok_or_else(|| FatalError::TypeMismatch {
                op,
                detail: "integer overflow in add_two_top".to_string(),
            })?;
        Ok(Value::from(sum))
    } else {
        let fa = document::get_real(op, a)?;
        let fb = document::get_real(op, b)?;
        Ok(Value::Number(document::number_from_f64_or_i64(fa + fb, false)))
    }
}

fn add_two_top(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    require_len("add_two_top", root, 2)?;
    let mut group = Group::new();

    let n = stack::len(root)?;
    let b = stack::pop("add_two_top", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&b),
    ));

    let n = stack::len(root)?;
    let a = stack::pop("add_two_top", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&a),
    ));

    let sum = numeric_add("add_two_top", &a, &b)?;
    stack::push(root, sum.clone())?;
    group.push(residual::patch_add("/stack/-", sum));

    // stack::push/pop above already appended their own single-entry
    // patches; discard those and keep only the grouped entry, since
    // add_two_top is one of the multi-edit opcodes that must commit a
    // single flat-array residual entry (spec §4.7).
    undo_auto_logged_entries(root, 3);
    group.commit(root);
    Ok(())
}

fn get(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    let mut group = Group::new();

    let n = stack::len(root)?;
    let p = stack::pop("get", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&p),
    ));

    let path = document::get_str("get", &p)?.to_string();
    let value = pointer::resolve(root, &path)
        .map_err(|kind| pointer::resolve_error("get", &path, kind))?
        .clone();

    stack::push(root, value.clone())?;
    group.push(residual::patch_add("/stack/-", value));

    undo_auto_logged_entries(root, 2);
    group.commit(root);
    Ok(())
}

fn set(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    require_len("set", root, 2)?;
    let mut group = Group::new();

    let n = stack::len(root)?;
    let p = stack::pop("set", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&p),
    ));

    let n = stack::len(root)?;
    let v = stack::pop("set", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&v),
    ));

    let path = document::get_str("set", &p)?.to_string();
    {
        let target = pointer::resolve_mut(root, &path)
            .map_err(|kind| pointer::resolve_error("set", &path, kind))?;
        document::scalar_assign("set", target, v.clone())?;
    }
    group.push(residual::patch_replace(path, v));

    undo_auto_logged_entries(root, 2);
    group.commit(root);
    Ok(())
}

fn append(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    require_len("append", root, 2)?;
    let mut group = Group::new();

    let n = stack::len(root)?;
    let p = stack::pop("append", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&p),
    ));

    let n = stack::len(root)?;
    let v = stack::pop("append", root)?;
    group.push(residual::patch_remove(
        format!("/stack/{}", n - 1),
        document::deep_copy(&v),
    ));

    let path = document::get_str("append", &p)?.to_string();
    let target = pointer::resolve_mut(root, &path)
        .map_err(|kind| pointer::resolve_error("append", &path, kind))?;
    document::arr_append("append", target, v.clone())?;
    group.push(residual::patch_add(format!("{path}/-"), v));

    undo_auto_logged_entries(root, 2);
    group.commit(root);
    Ok(())
}

fn map_over(vm: &mut Interpreter) -> Result<(), FatalError> {
    let root = &mut vm.document;
    require_len("map_over", root, 2)?;
    let n = stack::len(root)?;
    let f_val = stack::pop("map_over", root)?;
    let f_path = format!("/stack/{}", n - 1);

    let n = stack::len(root)?;
    let d_val = stack::pop("map_over", root)?;
    let d_path = format!("/stack/{}", n - 1);
    undo_auto_logged_entries(&mut vm.document, 2);

    let f_arr = d_f_as_array("map_over", &f_val)?;
    let d_arr = d_f_as_array("map_over", &d_val)?;

    // The per-element sub-frame runs arbitrary opcodes of its own (including
    // nested groups like `add_two_top`), all of which would log into this
    // same document's `residual` if left alone. `map_over` must commit
    // exactly one group -- [remove f, remove d, add result] -- so recording
    // is suppressed for the duration of the loop and restored afterward
    // regardless of whether the loop succeeds.
    let suppressed = suppress_reversible(&mut vm.document);
    let outcome = run_map_over_loop(vm, &f_arr, &d_arr);
    restore_reversible(&mut vm.document, suppressed);
    let results = outcome?;

    let result_array = Value::Array(results);
    let root = &mut vm.document;
    stack::push(root, result_array.clone())?;
    undo_auto_logged_entries(root, 1);

    let mut group = Group::new();
    group.push(residual::patch_remove(f_path, document::deep_copy(&f_val)));
    group.push(residual::patch_remove(d_path, document::deep_copy(&d_val)));
    group.push(residual::patch_add("/stack/-", result_array));
    group.commit(root);
    Ok(())
}

fn run_map_over_loop(
    vm: &mut Interpreter,
    f_arr: &[Value],
    d_arr: &[Value],
) -> Result<Vec<Value>, FatalError> {
    let mut results = Vec::with_capacity(d_arr.len());
    for (idx, elem) in d_arr.iter().enumerate() {
        let before = stack::len(&vm.document)?;
        stack::push(&mut vm.document, document::deep_copy(elem))?;
        walker::walk(vm, f_arr, &format!("/map_over/{idx}"))?;
        let after = stack::len(&vm.document)?;
        if after != before + 2 {
            return Err(FatalError::AssertionFailure {
                detail: format!(
                    "map_over: function must leave exactly one net value on the stack \
                     (started at {before}, expected {}, got {after})",
                    before + 2
                ),
            });
        }
        results.push(stack::pop("map_over", &mut vm.document)?);
    }
    Ok(results)
}

/// Force `root["is_reversible"]` to `false`, returning whatever was there
/// before (including absence) so [`restore_reversible`] can put it back
/// exactly.
fn suppress_reversible(root: &mut Value) -> Option<Value> {
    root.as_object_mut()
        .and_then(|obj| obj.insert("is_reversible".to_string(), Value::Bool(false)))
}

/// Undo [`suppress_reversible`]: restore the prior value, or remove the key
/// entirely if it was absent beforehand.
fn restore_reversible(root: &mut Value, previous: Option<Value>) {
    let Some(obj) = root.as_object_mut() else {
        return;
    };
    match previous {
        Some(v) => {
            obj.insert("is_reversible".to_string(), v);
        }
        None => {
            obj.remove("is_reversible");
        }
    }
}

fn d_f_as_array(op: &'static str, value: &Value) -> Result<Vec<Value>, FatalError> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| FatalError::TypeMismatch {
            op,
            detail: format!("expected array, got {}", document::type_name(value)),
        })
}

fn enter(vm: &mut Interpreter) -> Result<(), FatalError> {
    let target = stack::pop("enter", &mut vm.document)?;
    match target {
        Value::String(path) => {
            let arr = pointer::resolve(&vm.document, &path)
                .map_err(|kind| pointer::resolve_error("enter", &path, kind))?
                .as_array()
                .cloned()
                .ok_or_else(|| FatalError::TypeMismatch {
                    op: "enter",
                    detail: format!("`{path}` does not resolve to an array"),
                })?;
            walker::walk(vm, &arr, &path)
        }
        Value::Array(arr) => walker::walk(vm, &arr, "/enter"),
        other => Err(FatalError::TypeMismatch {
            op: "enter",
            detail: format!(
                "expected string path or array, got {}",
                document::type_name(&other)
            ),
        }),
    }
}

fn exit(vm: &mut Interpreter) -> Result<(), FatalError> {
    vm.document
        .as_object_mut()
        .ok_or_else(|| FatalError::AssertionFailure {
            detail: "document root must be an object".to_string(),
        })?
        .insert("_interrupt_exit".to_string(), Value::Bool(true));
    Ok(())
}

fn ptr_new(vm: &mut Interpreter) -> Result<(), FatalError> {
    let p = stack::pop("ptr_new", &mut vm.document)?;
    let path = document::get_str("ptr_new", &p)?.to_string();
    vm.jpm.push(&mut vm.document, path)
}

fn ptr_release(vm: &mut Interpreter) -> Result<(), FatalError> {
    vm.jpm.pop(&mut vm.document)?;
    Ok(())
}

fn ptr_get(vm: &mut Interpreter) -> Result<(), FatalError> {
    let path = vm.jpm.peek()?.path.clone();
    let value = pointer::resolve(&vm.document, &path)
        .map_err(|kind| pointer::resolve_error("ptr_get", &path, kind))?
        .clone();
    stack::push(&mut vm.document, value)
}

fn ptr_set(vm: &mut Interpreter) -> Result<(), FatalError> {
    let path = vm.jpm.peek()?.path.clone();
    let value = stack::pop("ptr_set", &mut vm.document)?;
    {
        let target = pointer::resolve_mut(&mut vm.document, &path)
            .map_err(|kind| pointer::resolve_error("ptr_set", &path, kind))?;
        document::scalar_assign("ptr_set", target, value.clone())?;
    }
    residual::record_single(&mut vm.document, residual::patch_replace(path, value));
    Ok(())
}

fn test(vm: &mut Interpreter) -> Result<(), FatalError> {
    require_len("test", &vm.document, 2)?;
    let expected = stack::pop("test", &mut vm.document)?;
    let program = stack::pop("test", &mut vm.document)?;
    let actual = sandbox::run_program(&program)?;
    if subset_match(&expected, &actual) {
        Ok(())
    } else {
        stack::push(&mut vm.document, error::test_failure(&expected, &actual))
    }
}

/// Subset match, per spec §4.5: scalars compare equal, arrays compare
/// element-wise equal, and object fields present in `expected` must
/// recursively subset-match in `actual` (extra `actual` fields tolerated).
fn subset_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(_)) => exp
            .iter()
            .all(|(k, v)| actual.get(k).is_some_and(|av| subset_match(v, av))),
        (Value::Array(exp), Value::Array(act)) => {
            exp.len() == act.len() && exp.iter().zip(act).all(|(e, a)| e == a)
        }
        (a, b) if !a.is_object() && !a.is_array() && !b.is_object() && !b.is_array() => a == b,
        _ => false,
    }
}

fn print_error(vm: &mut Interpreter) -> Result<(), FatalError> {
    let err = stack::pop("print_error", &mut vm.document)?;
    let formatted = vm.printer.format_error(&err);
    vm.output.push(formatted);
    Ok(())
}

fn load(vm: &mut Interpreter) -> Result<(), FatalError> {
    let p = stack::pop("load", &mut vm.document)?;
    let path = document::get_str("load", &p)?.to_string();
    let content = std::fs::read_to_string(&path).map_err(|source| FatalError::Io {
        path: path.clone(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| FatalError::Io {
        path: path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    stack::push(&mut vm.document, value)
}

fn store(vm: &mut Interpreter) -> Result<(), FatalError> {
    require_len("store", &vm.document, 2)?;
    let p = stack::pop("store", &mut vm.document)?;
    let path = document::get_str("store", &p)?.to_string();
    let v = stack::pop("store", &mut vm.document)?;
    let text = serde_json::to_string_pretty(&v).map_err(|e| FatalError::Io {
        path: path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })?;
    std::fs::write(&path, text).map_err(|source| FatalError::Io { path, source })
}

fn undo(vm: &mut Interpreter) -> Result<(), FatalError> {
    let program = stack::pop("undo", &mut vm.document)?;
    let result = sandbox::undo_once(&program)?;
    stack::push(&mut vm.document, result)
}

fn step(vm: &mut Interpreter) -> Result<(), FatalError> {
    let program = stack::pop("step", &mut vm.document)?;
    let result = sandbox::step_once(&program)?;
    stack::push(&mut vm.document, result)
}

fn print_json(vm: &mut Interpreter) -> Result<(), FatalError> {
    let formatted = vm.printer.format_json(&vm.document);
    vm.output.push(formatted);
    Ok(())
}

/// Check the stack holds at least `n` operands before a multi-pop opcode
/// does any popping at all. Without this, an opcode that needs two operands
/// could pop the first successfully (mutating the stack and logging a
/// residual entry) and then underflow on the second, leaving a partial
/// mutation behind on a fatal abort.
fn require_len(op: &'static str, root: &Value, n: usize) -> Result<(), FatalError> {
    if stack::len(root)? < n {
        return Err(FatalError::StackUnderflow {
            op,
            detail: format!("requires {n} operand(s) on the stack"),
        });
    }
    Ok(())
}

/// Multi-edit opcodes call [`stack::pop`]/[`stack::push`] for their own
/// bookkeeping (so each step's `value` is captured with the right
/// position), but those helpers log a single-entry residual patch as a
/// side effect. Grouped opcodes want exactly one flat-array entry instead,
/// so this removes the `n` single entries those calls just appended,
/// immediately before the opcode commits its own [`Group`].
fn undo_auto_logged_entries(root: &mut Value, n: usize) {
    if !residual::is_reversible(root) {
        return;
    }
    if let Some(Value::Array(log)) = root.as_object_mut().and_then(|o| o.get_mut("residual")) {
        let new_len = log.len().saturating_sub(n);
        log.truncate(new_len);
    }
}
