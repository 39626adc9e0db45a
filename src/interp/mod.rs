//! Reference interpreter for compiled modules
//!
//! Executes the module IR exactly as a WebAssembly engine would execute the
//! encoded bytes, with the four imports served by a [`Host`]. Used by
//! `impc run` and by the test suite.

pub mod host;
pub mod machine;
pub mod value;

pub use host::{Host, Output, RecordingHost, StreamHost};
pub use machine::{Machine, MAX_CALL_DEPTH};
pub use value::Value;

use crate::codegen::Module;
use miette::Diagnostic;
use thiserror::Error;

/// Runtime failure of a guest program
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum Trap {
    #[error("integer divide by zero")]
    #[diagnostic(code(trap::divide_by_zero))]
    IntegerDivideByZero,

    #[error("integer overflow")]
    #[diagnostic(code(trap::overflow))]
    IntegerOverflow,

    #[error("unreachable executed")]
    #[diagnostic(code(trap::unreachable))]
    Unreachable,

    #[error("out of bounds memory access at address {address}")]
    #[diagnostic(code(trap::memory))]
    MemoryOutOfBounds { address: u64 },

    #[error("call stack exhausted")]
    #[diagnostic(code(trap::stack), help("check for unbounded recursion"))]
    StackExhausted,

    #[error("instruction budget exhausted")]
    #[diagnostic(code(trap::fuel))]
    OutOfFuel,

    #[error("no export named `{0}`")]
    #[diagnostic(code(trap::export))]
    UnknownExport(String),

    #[error("undefined function {0}")]
    #[diagnostic(code(trap::function))]
    UndefinedFunction(u32),

    #[error("arguments do not match the function type")]
    #[diagnostic(code(trap::arguments))]
    BadArguments,

    #[error("input exhausted")]
    #[diagnostic(code(trap::input))]
    InputExhausted,

    #[error("invalid {expected} input `{text}`")]
    #[diagnostic(code(trap::input))]
    InvalidInput { text: String, expected: &'static str },

    #[error("host error: {0}")]
    #[diagnostic(code(trap::host))]
    Host(String),

    #[error("malformed module: {0}")]
    #[diagnostic(code(trap::malformed))]
    Malformed(&'static str),
}

/// Run the exported `main` of `module` against `host`
pub fn run<H: Host>(module: &Module, host: &mut H) -> Result<(), Trap> {
    let mut machine = Machine::new(module)?;
    machine.invoke_export("main", &[], host)?;
    Ok(())
}
