//! JPM: the auxiliary stack of path-resolved pointer handles (spec §4.6).
//!
//! A handle is conceptually `(document reference, target value, optional
//! origin path)`. `serde_json::Value` has no stable node identity to index
//! into, so this implementation takes the conservative translation spec §9
//! recommends: a handle is a retained document plus a path, re-resolved
//! against the live document on every `ptr_get`/`ptr_set` rather than a
//! cached raw pointer. This trades a little performance for never being
//! able to go stale undetectably.

use crate::error::FatalError;
use serde_json::Value;

/// Default bound from spec §4.6 ("capacity >= 64").
pub const CAPACITY: usize = 64;

/// One path-resolved handle.
#[derive(Debug, Clone)]
pub struct Handle {
    /// The RFC 6901 path this handle was created against.
    pub path: String,
}

/// The bounded parallel stack of handles.
#[derive(Debug, Default)]
pub struct Jpm {
    handles: Vec<Handle>,
}

impl Jpm {
    /// A fresh, empty handle stack.
    pub fn new() -> Self {
        Jpm {
            handles: Vec::new(),
        }
    }

    /// Resolve `path` against `root` (failing the same way `get` does if it
    /// doesn't resolve), retain the document via `ref`, and push a handle.
    /// Fatal if the stack is already at [`CAPACITY`].
    pub fn push(&mut self, root: &mut Value, path: String) -> Result<(), FatalError> {
        crate::pointer::resolve(root, &path)
            .map_err(|kind| crate::pointer::resolve_error("ptr_new", &path, kind))?;
        if self.handles.len() >= CAPACITY {
            return Err(FatalError::AssertionFailure {
                detail: format!("JPM stack overflow (capacity {CAPACITY})"),
            });
        }
        bump_ref(root, 1);
        self.handles.push(Handle { path });
        Ok(())
    }

    /// Pop and release the top handle. Fatal underflow if empty (spec
    /// §8, "`ptr_release` on empty pointer stack is fatal").
    pub fn pop(&mut self, root: &mut Value) -> Result<Handle, FatalError> {
        let handle = self.handles.pop().ok_or_else(|| FatalError::AssertionFailure {
            detail: "ptr_release on empty pointer stack".to_string(),
        })?;
        bump_ref(root, -1);
        Ok(handle)
    }

    /// Peek the top handle without changing `ref`. Fatal underflow if
    /// empty.
    pub fn peek(&self) -> Result<&Handle, FatalError> {
        self.handles.last().ok_or_else(|| FatalError::AssertionFailure {
            detail: "pointer stack is empty".to_string(),
        })
    }

    /// Release every remaining handle (VM shutdown, per spec §4.6).
    pub fn release_all(&mut self, root: &mut Value) {
        while self.pop(root).is_ok() {}
    }

}

fn bump_ref(root: &mut Value, delta: i64) {
    let Some(obj) = root.as_object_mut() else {
        return;
    };
    let current = obj.get("ref").and_then(Value::as_i64).unwrap_or(1);
    obj.insert("ref".to_string(), Value::from(current + delta));
}
