//! JISP: an embedded virtual machine whose instruction stream, operand
//! stack, register file, and auxiliary bookkeeping all live inside a
//! single mutable JSON document. Executing a program mutates that document
//! in place; the final document is the program's output.
//!
//! This crate is the interpreter core only: the entrypoint walker, the
//! opcode library, the JPM pointer stack, the residual patch log and its
//! grouped undo, call-stack reflection, and sandboxed sub-execution for
//! `test`/`step`/`undo`. CLI argument parsing and file reading live in the
//! `jisp` binary (`src/main.rs`); this library never touches stdio itself.
//!
//! ```
//! use serde_json::json;
//!
//! let mut doc = json!({
//!     "stack": [],
//!     "entrypoint": [10, 20, {".": "add_two_top"}, "temp_sum", {".": "pop_and_store"}]
//! });
//! jisp::run(&mut doc).unwrap();
//! assert_eq!(doc["temp_sum"], json!(30));
//! ```

pub mod diagnostics;
pub mod document;
pub mod error;
pub mod jpm;
pub mod opcode;
pub mod pointer;
pub mod residual;
pub mod sandbox;
pub mod stack;
pub mod walker;

pub use error::FatalError;

use diagnostics::{DefaultPrinter, Printer};
use serde_json::Value;

/// Owns one document's worth of interpreter state: the document itself,
/// the JPM handle stack (never serialized), and a diagnostic output
/// buffer filled by `print_json`/`print_error`.
pub struct Interpreter {
    pub(crate) document: Value,
    pub(crate) jpm: jpm::Jpm,
    pub(crate) output: Vec<String>,
    pub(crate) printer: Box<dyn Printer>,
}

impl Interpreter {
    /// Wrap `document` for execution. If the root is an object and has no
    /// `ref` field, one is inserted at 1 (ref starts at 1 on construction).
    pub fn new(mut document: Value) -> Self {
        if let Some(obj) = document.as_object_mut() {
            obj.entry("ref").or_insert(Value::from(1));
        }
        Interpreter {
            document,
            jpm: jpm::Jpm::new(),
            output: Vec::new(),
            printer: Box::new(DefaultPrinter::default()),
        }
    }

    /// As [`Interpreter::new`], but with a caller-supplied [`Printer`] for
    /// `print_json`/`print_error` output formatting.
    pub fn with_printer(document: Value, printer: Box<dyn Printer>) -> Self {
        let mut vm = Interpreter::new(document);
        vm.printer = printer;
        vm
    }

    /// Read-only access to the document as it currently stands.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Mutable access to the document, for embedders that want to inspect
    /// or patch state between runs.
    pub fn document_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    /// Consume the interpreter, returning the final document.
    pub fn into_document(self) -> Value {
        self.document
    }

    /// Drain and return everything `print_json`/`print_error` have
    /// buffered so far.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Drive execution of `document["entrypoint"]`. Only objects with an
    /// `entrypoint` array produce interesting execution; any other
    /// document is a no-op. Handles are released at the end regardless of
    /// whether execution succeeded.
    pub fn run(&mut self) -> Result<(), FatalError> {
        document::ensure_object(&self.document)?;
        document::ensure_stack(&mut self.document)?;

        let entrypoint = document::obj_get(&self.document, "entrypoint").cloned();
        let result = match entrypoint {
            None => Ok(()),
            Some(Value::Array(instructions)) => walker::walk(self, &instructions, "/entrypoint"),
            Some(_) => Err(FatalError::AssertionFailure {
                detail: "`entrypoint` must be an array".to_string(),
            }),
        };

        self.jpm.release_all(&mut self.document);
        result
    }
}

/// Run `document` to completion in place. Equivalent to
/// `Interpreter::new(document).run()` followed by writing the resulting
/// document back through `document`.
pub fn run(document: &mut Value) -> Result<(), FatalError> {
    let mut vm = Interpreter::new(std::mem::take(document));
    let result = vm.run();
    *document = vm.into_document();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arithmetic_then_store() {
        let mut doc = json!({
            "stack": [],
            "entrypoint": [10, 20, {".": "add_two_top"}, "temp_sum", {".": "pop_and_store"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([]));
        assert_eq!(doc["temp_sum"], json!(30));
    }

    #[test]
    fn pointer_in_place_edit() {
        let mut doc = json!({
            "stack": [0, 0, 0],
            "entrypoint": ["/stack/1", {".": "ptr_new"}, 99, {".": "ptr_set"}, {".": "ptr_release"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([0, 99, 0]));
    }

    #[test]
    fn macro_call_via_dot_name() {
        let mut doc = json!({
            "stack": [],
            "my_macro": [5, 7, {".": "add_two_top"}],
            "entrypoint": [{".": "my_macro"}, "sum", {".": "pop_and_store"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["sum"], json!(12));
    }

    #[test]
    fn map_over_transforms_each_element() {
        let mut doc = json!({
            "stack": [],
            "entrypoint": [
                [1, 2, 3],
                [{".": "duplicate_top"}, {".": "add_two_top"}],
                {".": "map_over"}
            ]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([[2, 4, 6]]));
    }

    #[test]
    fn test_opcode_subset_match_success_pushes_nothing() {
        let mut doc = json!({
            "stack": [
                {"stack": [], "entrypoint": [1, "x", {".": "pop_and_store"}, 2, "y", {".": "pop_and_store"}]},
                {"x": 1}
            ],
            "entrypoint": [{".": "test"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([]));
    }

    #[test]
    fn test_opcode_subset_match_failure_pushes_structured_error() {
        let mut doc = json!({
            "stack": [
                {"stack": [], "entrypoint": [1, "x", {".": "pop_and_store"}]},
                {"x": 2}
            ],
            "entrypoint": [{".": "test"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"][0]["kind"], json!("test_failure"));
        assert_eq!(doc["stack"][0]["details"]["expected"], json!({"x": 2}));
        assert_eq!(doc["stack"][0]["details"]["actual"], json!({"x": 1}));
    }

    #[test]
    fn undo_reverts_a_grouped_arithmetic_entry() {
        let mut doc = json!({
            "is_reversible": true,
            "residual": [],
            "stack": [10, 20],
            "entrypoint": [{".": "add_two_top"}]
        });
        run(&mut doc).unwrap();
        assert_eq!(doc["stack"], json!([30]));

        let mut undo_doc = json!({"stack": [doc.clone()], "entrypoint": [{".": "undo"}]});
        run(&mut undo_doc).unwrap();
        let restored = &undo_doc["stack"][0];
        assert_eq!(restored["stack"], json!([10, 20]));
        assert_eq!(restored["residual"], json!([]));
    }

    #[test]
    fn document_without_entrypoint_is_a_no_op() {
        let mut doc = json!({"a": 1});
        run(&mut doc).unwrap();
        assert_eq!(doc, json!({"a": 1, "ref": 1, "stack": []}));
    }

    #[test]
    fn non_object_root_is_fatal() {
        let mut doc = json!([1, 2, 3]);
        assert!(run(&mut doc).is_err());
    }

    #[test]
    fn non_array_entrypoint_is_fatal() {
        let mut doc = json!({"stack": [], "entrypoint": "nope"});
        assert!(run(&mut doc).is_err());
    }
}
