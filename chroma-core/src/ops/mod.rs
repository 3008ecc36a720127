#![forbid(unsafe_code)]

//! Operator dispatch. Every syntactic operation is resolved, from the static
//! types of its operands, to a concrete function plus argument conversions.

pub mod attrop;
pub mod binop;
pub mod callop;
pub mod itemop;
pub mod multimethod;

mod dynamic;
mod impls;

use chroma_ast::Fqn;

pub use multimethod::{BinaryOp, MultiMethodTable};

use crate::error::{ChromaError, ErrorKind};
use crate::function::FuncRef;
use crate::object::Value;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) {
    impls::register(vm);
}

/// A function of the `operator` module.
pub fn operator_func(vm: &Vm, name: &str) -> Result<FuncRef, ChromaError> {
    match vm.lookup_global(&Fqn::make_global("operator", name)) {
        Some(Value::Func(f)) => Ok(f),
        _ => Err(ChromaError::new(
            ErrorKind::Panic,
            format!("`operator::{name}` is not registered"),
        )),
    }
}
