//! Thin CLI shell: parse flags, stream JSON values in, run each one
//! against a fresh interpreter, print results. All the actual interpreter
//! logic lives in the library -- this binary never touches `Interpreter`'s
//! internals beyond the public surface.

use clap::Parser;
use jisp::diagnostics::DefaultPrinter;
use jisp::Interpreter;
use serde_json::{de::IoRead, Deserializer, Value};
use std::fs::File;
use std::io::{stdin, Read};
use std::process::exit;

/// Execute one or more JISP documents, mutating and printing each in turn.
#[derive(Parser, Debug)]
#[command(name = "jisp", version, about = "Runs a JSON document as a program, printing the mutated document")]
struct Cli {
    /// Print the final document as a raw string instead of quoted JSON,
    /// when the document root is a string.
    #[arg(short = 'r', long = "raw")]
    raw: bool,

    /// Print compact JSON instead of pretty-printed.
    #[arg(short = 'c', long = "compact")]
    compact: bool,

    /// Input file to read (`-` or omitted reads stdin). Multiple top-level
    /// JSON values may appear in one input; each runs against its own
    /// interpreter.
    file: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let documents = match read_documents(cli.file.as_deref()) {
        Ok(docs) => docs,
        Err(e) => {
            eprintln!("could not read input: {e}");
            exit(1);
        }
    };

    let mut failed = false;
    for document in documents {
        let printer = DefaultPrinter { compact: cli.compact };
        let mut vm = Interpreter::with_printer(document, Box::new(printer));
        let result = vm.run();

        for line in vm.take_output() {
            println!("{line}");
        }

        match result {
            Ok(()) => print_document(vm.document(), cli.raw, cli.compact),
            Err(e) => {
                failed = true;
                eprintln!("fatal error{}: {e}", opcode_suffix(&e));
                print_document(vm.document(), cli.raw, cli.compact);
            }
        }
    }

    if failed {
        exit(1);
    }
}

fn opcode_suffix(e: &jisp::FatalError) -> String {
    match e.opcode() {
        Some(op) => format!(" in `{op}`"),
        None => String::new(),
    }
}

fn print_document(document: &Value, raw: bool, compact: bool) {
    if raw {
        if let Some(s) = document.as_str() {
            println!("{s}");
            return;
        }
    }
    let printed = if compact {
        serde_json::to_string(document)
    } else {
        serde_json::to_string_pretty(document)
    }
    .expect("serializing a JSON Value to JSON should not fail");
    println!("{printed}");
}

fn read_documents(file: Option<&str>) -> Result<Vec<Value>, std::io::Error> {
    match file {
        None | Some("-") => {
            Deserializer::new(IoRead::new(stdin()))
                .into_iter::<Value>()
                .collect::<Result<Vec<Value>, _>>()
                .map_err(std::io::Error::from)
        }
        Some(path) => {
            let mut contents = String::new();
            File::open(path)?.read_to_string(&mut contents)?;
            Deserializer::from_str(&contents)
                .into_iter::<Value>()
                .collect::<Result<Vec<Value>, _>>()
                .map_err(std::io::Error::from)
        }
    }
}
