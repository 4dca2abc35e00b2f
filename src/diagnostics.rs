//! The pretty-printer hook spec §1(iv) asks the core to expose.
//!
//! The `print_json`/`print_error` opcodes never write to stdout directly --
//! doing so would make the library depend on a particular output sink, and
//! neither the teacher nor its nearest CLI relatives in the pack reach for
//! a logging crate for this (see SPEC_FULL.md §2.2). Instead they format
//! through a [`Printer`] and append the result to the interpreter's output
//! buffer; `main.rs` drains that buffer and is the only place that touches
//! stdout/stderr.

use serde_json::Value;

/// Formats document and error values for display. Embedders may supply
/// their own (colorized, machine-readable, etc); [`DefaultPrinter`] is
/// what the CLI uses.
pub trait Printer {
    /// Format a full document/value for `print_json`.
    fn format_json(&self, value: &Value) -> String;

    /// Format a structured error object for `print_error`.
    fn format_error(&self, error: &Value) -> String;
}

/// Plain `serde_json` pretty/compact formatting, matching the teacher's own
/// use of `serde_json::to_string_pretty` in its CLI (`src/main.rs`).
#[derive(Debug, Clone, Copy)]
pub struct DefaultPrinter {
    /// Compact (`-c`) vs. pretty output.
    pub compact: bool,
}

impl Default for DefaultPrinter {
    fn default() -> Self {
        DefaultPrinter { compact: false }
    }
}

impl Printer for DefaultPrinter {
    fn format_json(&self, value: &Value) -> String {
        if self.compact {
            serde_json::to_string(value)
        } else {
            serde_json::to_string_pretty(value)
        }
        .unwrap_or_else(|e| format!("<unprintable: {e}>"))
    }

    fn format_error(&self, error: &Value) -> String {
        let kind = error.get("kind").and_then(Value::as_str).unwrap_or("error");
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("");
        let details = error
            .get("details")
            .map(|d| self.format_json(d))
            .unwrap_or_default();
        if details.is_empty() {
            format!("error[{kind}]: {message}")
        } else {
            format!("error[{kind}]: {message}\n{details}")
        }
    }
}
