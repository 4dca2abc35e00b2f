//! The reversible-patch log (`residual`) and its grouped-undo semantics.
//!
//! Patches are plain JSON objects living inside the document itself (spec
//! §3's `residual` key), not a separate Rust-typed log -- unlike the
//! teacher's `PatchOperation` enum (which exists to be applied generically
//! via RFC 6902), JISP's residual entries exist only to be *inverted* for
//! `undo`, and only a designated subset is invertible at all (spec §4.7),
//! so a handful of small JSON-builder functions are enough.

use crate::document;
use crate::error::FatalError;
use serde_json::{json, Value};

/// Whether `root["is_reversible"]` is `true`. Residual recording and undo
/// are both no-ops otherwise.
pub fn is_reversible(root: &Value) -> bool {
    matches!(root.get("is_reversible"), Some(Value::Bool(true)))
}

/// Build an `add` patch: `{op: "add", path, value}`.
pub fn patch_add(path: impl Into<String>, value: Value) -> Value {
    json!({ "op": "add", "path": path.into(), "value": value })
}

/// Build a `replace` patch: `{op: "replace", path, value}`.
pub fn patch_replace(path: impl Into<String>, value: Value) -> Value {
    json!({ "op": "replace", "path": path.into(), "value": value })
}

/// Build a `remove` patch with the captured prior value, enabling
/// inversion: `{op: "remove", path, value}`.
pub fn patch_remove(path: impl Into<String>, value: Value) -> Value {
    json!({ "op": "remove", "path": path.into(), "value": value })
}

/// Append a single residual entry, if `is_reversible` is set. No-op
/// otherwise (per spec §4.7, recording is gated on that flag).
pub fn record_single(root: &mut Value, patch: Value) {
    if !is_reversible(root) {
        return;
    }
    append_entry(root, patch);
}

fn append_entry(root: &mut Value, entry: Value) {
    let obj = root
        .as_object_mut()
        .expect("document root must be an object; checked by caller");
    match obj.get_mut("residual") {
        Some(Value::Array(arr)) => arr.push(entry),
        _ => {
            obj.insert("residual".to_string(), Value::Array(vec![entry]));
        }
    }
}

/// Accumulates the individual patches of a multi-edit opcode
/// (`add_two_top`, `map_over`, `get`, `set`, `append`) and commits them as
/// one flat-array residual entry, per invariant 4 ("a grouped residual
/// entry is a flat array of patch objects; nesting is disallowed").
#[derive(Debug, Default)]
pub struct Group {
    patches: Vec<Value>,
}

impl Group {
    /// Start a new, empty group.
    pub fn new() -> Self {
        Group::default()
    }

    /// Record one patch into the group. Has no effect on whether it is
    /// actually logged -- that is decided at [`Group::commit`] time based
    /// on `is_reversible`, so callers can build the patch unconditionally.
    pub fn push(&mut self, patch: Value) {
        self.patches.push(patch);
    }

    /// Commit the group as a single residual entry, if `is_reversible` is
    /// set and the group is non-empty.
    pub fn commit(self, root: &mut Value) {
        if self.patches.is_empty() || !is_reversible(root) {
            return;
        }
        append_entry(root, Value::Array(self.patches));
    }
}

/// Pop the last residual entry and invert it (spec §4.7 "Undo semantics").
/// A single patch is inverted directly; a group is inverted patch-by-patch
/// in reverse order. If `residual` is empty or absent, this is a no-op --
/// spec §4.5's `undo` opcode runs this inside a sandbox and always pushes
/// a (possibly unmodified) program back, so an empty log is not an error.
pub fn undo_last(root: &mut Value) -> Result<(), FatalError> {
    let entry = pop_last(root);
    match entry {
        None => Ok(()),
        Some(Value::Array(group)) => {
            for patch in group.into_iter().rev() {
                invert(root, &patch)?;
            }
            Ok(())
        }
        Some(single) => invert(root, &single),
    }
}

fn pop_last(root: &mut Value) -> Option<Value> {
    root.as_object_mut()?
        .get_mut("residual")?
        .as_array_mut()?
        .pop()
}

/// Invert one patch. Only two shapes are rigorously invertible (spec
/// §4.7): a stack-top literal push, and a stack removal with its captured
/// value. Everything else -- `replace`/`add` at non-stack paths -- is a
/// documented best-effort no-op (spec §9, "Residual log coverage gap").
fn invert(root: &mut Value, patch: &Value) -> Result<(), FatalError> {
    let op = patch.get("op").and_then(Value::as_str).unwrap_or("");
    let path = patch.get("path").and_then(Value::as_str).unwrap_or("");

    match (op, path) {
        ("add", "/stack/-") => {
            let stack = root
                .as_object_mut()
                .and_then(|o| o.get_mut("stack"))
                .ok_or_else(|| FatalError::AssertionFailure {
                    detail: "`stack` must be an array".to_string(),
                })?;
            document::arr_remove_last(stack);
            Ok(())
        }
        ("remove", p) if p.starts_with("/stack/") => {
            let value = patch.get("value").cloned().unwrap_or(Value::Null);
            let stack = root
                .as_object_mut()
                .and_then(|o| o.get_mut("stack"))
                .ok_or_else(|| FatalError::AssertionFailure {
                    detail: "`stack` must be an array".to_string(),
                })?;
            document::arr_append("undo", stack, value)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reversible_doc() -> Value {
        json!({ "is_reversible": true, "stack": [], "residual": [] })
    }

    #[test]
    fn recording_is_gated_on_is_reversible() {
        let mut doc = json!({ "is_reversible": false, "stack": [] });
        record_single(&mut doc, patch_add("/stack/-", json!(1)));
        assert_eq!(doc.get("residual"), None);
    }

    #[test]
    fn single_patch_round_trips_stack_push() {
        let mut doc = reversible_doc();
        doc["stack"].as_array_mut().unwrap().push(json!(42));
        record_single(&mut doc, patch_add("/stack/-", json!(42)));
        undo_last(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([]));
    }

    #[test]
    fn stack_remove_undo_restores_captured_value() {
        let mut doc = reversible_doc();
        record_single(&mut doc, patch_remove("/stack/0", json!(7)));
        undo_last(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([7]));
    }

    #[test]
    fn group_commits_as_flat_array_and_reverts_in_order() {
        let mut doc = reversible_doc();
        doc["stack"].as_array_mut().unwrap().push(json!(5));
        let mut group = Group::new();
        group.push(patch_remove("/stack/1", json!(10)));
        group.push(patch_remove("/stack/0", json!(20)));
        group.push(patch_add("/stack/-", json!(30)));
        doc["stack"] = json!([5, 30]);
        group.commit(&mut doc);
        assert!(doc["residual"][0].is_array());

        undo_last(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([5, 30, 20, 10]));
    }

    #[test]
    fn replace_is_best_effort_no_op() {
        let mut doc = reversible_doc();
        doc["k"] = json!(1);
        record_single(&mut doc, patch_replace("/k", json!(1)));
        undo_last(&mut doc).unwrap();
        assert_eq!(doc["k"], json!(1));
    }

    #[test]
    fn undo_on_empty_log_is_a_no_op() {
        let mut doc = reversible_doc();
        undo_last(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([]));
    }
}
