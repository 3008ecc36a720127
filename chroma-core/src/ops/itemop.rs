#![forbid(unsafe_code)]

use crate::error::ChromaError;
use crate::object::OpKind;
use crate::opimpl::{OpCall, Operand};
use crate::typecheck::{Dispatch, typecheck_opimpl};
use crate::vm::Vm;

pub fn getitem(vm: &mut Vm, obj: &Operand, index: &Operand) -> Result<OpCall, ChromaError> {
    let ty = obj.static_type.clone();
    let operands = [obj.clone(), index.clone()];
    let opimpl = ty.hooks.resolve(vm, OpKind::GetItem, &operands)?;
    typecheck_opimpl(vm, opimpl, &operands, Dispatch::Single, "cannot do `{0}`[...]")
}

pub fn setitem(vm: &mut Vm, obj: &Operand, index: &Operand, value: &Operand) -> Result<OpCall, ChromaError> {
    let ty = obj.static_type.clone();
    let operands = [obj.clone(), index.clone(), value.clone()];
    let opimpl = ty.hooks.resolve(vm, OpKind::SetItem, &operands)?;
    typecheck_opimpl(vm, opimpl, &operands, Dispatch::Single, "cannot do `{0}`[...] = ...")
}
