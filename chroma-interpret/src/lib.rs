#![forbid(unsafe_code)]

//! Flat bytecode execution of redshifted functions.
//!
//! This is the simple execution strategy: a closed instruction set, a value
//! stack and a typed variable store. Only straight-line functions can be
//! lowered; everything else runs on the tree-walking frame of
//! `chroma-core`.

mod asm;
mod code;
mod frame;
mod lower;

pub use asm::{parse_code, parse_const};
pub use code::{CodeObject, OpCode};
pub use frame::Frame;
pub use lower::lower_function;
