#![forbid(unsafe_code)]

//! C code generation for redshifted modules.

mod context;
mod emit;
mod runtime;

pub use context::{CBackendError, CContext};
pub use emit::{CArtifacts, emit_module};
