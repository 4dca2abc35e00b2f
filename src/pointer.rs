//! RFC 6901 JSON Pointer resolution.
//!
//! The core parsing (leading `/`, `~0`/`~1` escapes, decimal array indices)
//! is the same shape as the teacher's `split_pointer`/`parse_index` helpers,
//! generalized to classify failures into the four kinds spec §4.2 requires
//! (not-found, type, range, invalid) instead of a single `InvalidPointer`.

use crate::error::FatalError;
use serde_json::Value;

/// Why a pointer failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveErrorKind {
    /// Missing object key or array index past the end.
    NotFound,
    /// An intermediate segment resolved to a scalar.
    Type,
    /// An array index was syntactically a number but out of bounds.
    Range,
    /// Malformed escape sequence or non-decimal array index.
    Invalid,
}

/// Split `pointer` into the last segment (decoded) and the rest. Mirrors the
/// teacher's `split_pointer`, but works on the leading-`/`-segment grammar
/// directly rather than an `rfind('/')` shortcut, so it can also validate
/// every earlier segment's escapes.
fn decode_segment(raw: &str) -> String {
    raw.replace("~1", "/").replace("~0", "~")
}

fn split_segments(pointer: &str) -> Result<Vec<String>, ResolveErrorKind> {
    if pointer.is_empty() || pointer == "/" {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(ResolveErrorKind::Invalid);
    }
    Ok(pointer[1..].split('/').map(decode_segment).collect())
}

/// Parse a decoded array-index segment per RFC 6901 (no leading zero unless
/// the index is exactly `"0"`; `-` is the one-past-the-end marker handled
/// by callers separately). Same rule as the teacher's `parse_index`.
fn parse_index(segment: &str, len: usize) -> Result<usize, ResolveErrorKind> {
    if segment.starts_with('0') && segment.len() != 1 {
        return Err(ResolveErrorKind::Invalid);
    }
    match segment.parse::<usize>() {
        Ok(idx) if idx < len => Ok(idx),
        Ok(_) => Err(ResolveErrorKind::Range),
        Err(_) => Err(ResolveErrorKind::Invalid),
    }
}

/// Resolve `pointer` against `root`, returning a shared reference.
/// Both `""` and `"/"` resolve to `root` itself -- spec §4.2 treats a bare
/// `/` as the root document rather than RFC 6901's literal reading (which
/// would look up the member named by the empty string).
pub fn resolve<'a>(root: &'a Value, pointer: &str) -> Result<&'a Value, ResolveErrorKind> {
    let segments = split_segments(pointer)?;
    let mut current = root;
    for segment in &segments {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or(ResolveErrorKind::NotFound)?,
            Value::Array(arr) => {
                let idx = parse_index(segment, arr.len())?;
                &arr[idx]
            }
            _ => return Err(ResolveErrorKind::Type),
        };
    }
    Ok(current)
}

/// Resolve `pointer` against `root`, returning a mutable reference.
pub fn resolve_mut<'a>(
    root: &'a mut Value,
    pointer: &str,
) -> Result<&'a mut Value, ResolveErrorKind> {
    let segments = split_segments(pointer)?;
    let mut current = root;
    for segment in &segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment).ok_or(ResolveErrorKind::NotFound)?,
            Value::Array(arr) => {
                let idx = parse_index(segment, arr.len())?;
                &mut arr[idx]
            }
            _ => return Err(ResolveErrorKind::Type),
        };
    }
    Ok(current)
}

/// Encode a single raw key as an RFC 6901 segment (`~` -> `~0`, `/` -> `~1`).
/// Used by the residual logger to build patch paths for root-key edits.
pub fn encode_key(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Turn a [`ResolveErrorKind`] into the [`FatalError`] variant a caller
/// should raise, attaching the opcode name and raw path for diagnostics.
pub fn resolve_error(op: &'static str, path: &str, kind: ResolveErrorKind) -> FatalError {
    match kind {
        ResolveErrorKind::NotFound => FatalError::NotFound {
            path: path.to_string(),
        },
        ResolveErrorKind::Type => FatalError::TypeMismatch {
            op,
            detail: format!("intermediate segment of `{path}` is a scalar"),
        },
        ResolveErrorKind::Range => FatalError::InvalidPath {
            path: path.to_string(),
            detail: "array index out of bounds".to_string(),
        },
        ResolveErrorKind::Invalid => FatalError::InvalidPath {
            path: path.to_string(),
            detail: "malformed pointer segment".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_root_with_empty_pointer() {
        let doc = json!({"a": 1});
        assert_eq!(resolve(&doc, "").unwrap(), &doc);
    }

    #[test]
    fn resolves_root_with_bare_slash() {
        let doc = json!({"a": 1});
        assert_eq!(resolve(&doc, "/").unwrap(), &doc);
    }

    #[test]
    fn decodes_tilde_and_slash_escapes() {
        let doc = json!({"a/b": 1, "a~b": 2});
        assert_eq!(resolve(&doc, "/a~1b").unwrap(), &json!(1));
        assert_eq!(resolve(&doc, "/a~0b").unwrap(), &json!(2));
    }

    #[test]
    fn array_index_by_decimal() {
        let doc = json!([10, 20, 30]);
        assert_eq!(resolve(&doc, "/1").unwrap(), &json!(20));
    }

    #[test]
    fn leading_zero_index_is_invalid() {
        let doc = json!([10, 20]);
        assert_eq!(resolve(&doc, "/01"), Err(ResolveErrorKind::Invalid));
    }

    #[test]
    fn out_of_bounds_index_is_range() {
        let doc = json!([10]);
        assert_eq!(resolve(&doc, "/5"), Err(ResolveErrorKind::Range));
    }

    #[test]
    fn scalar_intermediate_is_type_error() {
        let doc = json!({"a": 1});
        assert_eq!(resolve(&doc, "/a/b"), Err(ResolveErrorKind::Type));
    }

    #[test]
    fn missing_key_is_not_found() {
        let doc = json!({"a": 1});
        assert_eq!(resolve(&doc, "/missing"), Err(ResolveErrorKind::NotFound));
    }

    #[test]
    fn resolve_mut_allows_in_place_edit() {
        let mut doc = json!({"a": 1});
        *resolve_mut(&mut doc, "/a").unwrap() = json!(2);
        assert_eq!(doc, json!({"a": 2}));
    }

    #[test]
    fn encode_key_escapes_tilde_then_slash() {
        assert_eq!(encode_key("a/b"), "a~1b");
        assert_eq!(encode_key("a~b"), "a~0b");
    }
}
