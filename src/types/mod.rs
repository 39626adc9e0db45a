//! Type system for the Imp language
//!
//! Two scalar types, `int` and `float`, and routine signatures over them.

pub mod core;

pub use self::core::*;
