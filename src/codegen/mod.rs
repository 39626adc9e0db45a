//! WebAssembly code generation
//!
//! Codegen runs in two steps:
//! - `lower`: typed HIR to the instruction-level [`Module`] IR
//! - `encode`: module IR to binary bytes via `wasm-encoder`
//!
//! The IR is kept around after encoding for disassembly and for the
//! reference interpreter.

pub mod encode;
pub mod layout;
pub mod lower;
pub mod module;

pub use encode::encode;
pub use layout::{ArraySlot, MemoryLayout, PAGE_SIZE};
pub use lower::lower;
pub use module::{FuncType, Function, HostImport, Instr, Module, ValType, FIRST_ROUTINE};
