//! Name resolution
//!
//! Binds every name use in the AST to the declaration it refers to and
//! assigns each parameter, `with` local and loop variable a local slot.
//! Global arrays and routines are collected first so routines may call each
//! other regardless of declaration order.

pub mod resolver;
pub mod symbols;

pub use resolver::{resolve, ResolvedAst, Resolver, RoutineFrame, SlotInfo, SlotKind};
pub use symbols::{DefId, DefKind, Symbol, SymbolTable};
