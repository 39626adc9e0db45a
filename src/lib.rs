//! Imp to WebAssembly compiler
//!
//! Imp is a small procedural teaching language:
//! - `int` (32-bit) and `float` (64-bit) scalars
//! - Fixed-size global arrays
//! - `if` / `else`, counted `for` loops and `while` loops
//! - Functions and procedures with parameters, locals and recursion
//! - `read` / `write` through host imports
//!
//! # Architecture
//!
//! ```text
//! Source → Lexer → Parser → AST → Resolver → Type Checker → HIR → Module IR → Wasm
//! ```
//!
//! # Example
//!
//! ```text
//! arrays int A[3]
//!
//! int sum(int n) with int total {
//!     total = 0
//!     for i from 0 to n - 1 {
//!         total = total + A[i]
//!     }
//!     return total
//! }
//!
//! def main() {
//!     A[0] = 5
//!     write sum(1)
//! }
//! ```

pub mod ast;
pub mod check;
pub mod codegen;
pub mod common;
pub mod diagnostics;
pub mod hir;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod types;

// Re-export diagnostics for convenience
pub use diagnostics::{CompileError, ErrorKind, SourceFile};

// Re-exports for convenience
pub use ast::Ast;
pub use codegen::MemoryLayout;
pub use interp::{Host, RecordingHost, Trap};
pub use types::Type;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Code generation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Emit a `name` custom section with routine and local names
    pub debug_names: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { debug_names: true }
    }
}

/// Output of a successful compilation
#[derive(Debug, Clone)]
pub struct CompiledModule {
    bytes: Vec<u8>,
    module: codegen::Module,
}

impl CompiledModule {
    /// The WebAssembly binary
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The module in WebAssembly text format
    pub fn disassemble(&self) -> String {
        self.module.to_string()
    }

    /// Where each global array lives in linear memory
    pub fn layout(&self) -> &MemoryLayout {
        &self.module.layout
    }

    /// The instruction-level module the bytes were encoded from
    pub fn module(&self) -> &codegen::Module {
        &self.module
    }
}

/// Compile source code to a WebAssembly module
pub fn compile(source: &str) -> Result<CompiledModule, CompileError> {
    compile_with(source, &Options::default())
}

/// Compile source code with explicit options
pub fn compile_with(source: &str, options: &Options) -> Result<CompiledModule, CompileError> {
    let program = check(source)?;
    let module = codegen::lower(&program);
    let bytes = codegen::encode(&module, options.debug_names);
    Ok(CompiledModule { bytes, module })
}

/// Run every front-end check and return the typed program
pub fn check(source: &str) -> Result<hir::Program, CompileError> {
    let ast = parse(source)?;
    let resolved = resolve::resolve(ast)?;
    check::check(&resolved)
}

/// Parse source code to AST
pub fn parse(source: &str) -> Result<Ast, CompileError> {
    let tokens = lexer::lex(source)?;
    parser::parse(&tokens)
}

/// Execute `main` of a compiled module in the reference interpreter
pub fn run<H: Host>(module: &CompiledModule, host: &mut H) -> Result<(), Trap> {
    interp::run(&module.module, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_each_stage_logs_once() {
        use std::sync::{Arc, Mutex};
        use tracing::{Event, Level, Subscriber};
        use tracing_subscriber::layer::{Context, Layer};
        use tracing_subscriber::prelude::*;

        struct Stages(Arc<Mutex<Vec<String>>>);

        impl<S: Subscriber> Layer<S> for Stages {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let meta = event.metadata();
                if *meta.level() == Level::DEBUG {
                    let module = meta.module_path().unwrap_or_default().to_string();
                    self.0.lock().unwrap().push(module);
                }
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Stages(seen.clone()));
        tracing::subscriber::with_default(subscriber, || {
            compile("arrays int A[2]\ndef main() {\n  write A[1]\n}\n").unwrap();
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "impc::parser",
                "impc::resolve::resolver",
                "impc::check",
                "impc::codegen::lower",
                "impc::codegen::encode",
            ]
        );
    }

    #[test]
    fn test_names_are_optional() {
        let source = "def main() {\n  write 1\n}\n";
        let named = compile(source).unwrap();
        let plain = compile_with(source, &Options { debug_names: false }).unwrap();
        assert!(named.bytes().len() > plain.bytes().len());
        assert_eq!(named.disassemble(), plain.disassemble());
    }
}
