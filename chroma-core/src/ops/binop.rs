#![forbid(unsafe_code)]

use chroma_ast::UnaryOp;

use crate::error::ChromaError;
use crate::object::{OpKind, TypeRef};
use crate::opimpl::{OpCall, OpImpl, Operand};
use crate::ops::{BinaryOp, operator_func};
use crate::typecheck::{Dispatch, typecheck_opimpl};
use crate::vm::Vm;

pub fn resolve_binop(vm: &mut Vm, op: BinaryOp, l: &Operand, r: &Operand) -> Result<OpCall, ChromaError> {
    let opimpl = match op {
        BinaryOp::Eq => eq_opimpl(vm, l, r)?,
        BinaryOp::Ne => ne_opimpl(vm, l, r)?,
        _ => vm.binops.get_opimpl(op, &l.static_type, &r.static_type),
    };
    let errmsg = format!("cannot do `{{0}}` {} `{{1}}`", op.token());
    typecheck_opimpl(vm, opimpl, &[l.clone(), r.clone()], Dispatch::Multi, &errmsg)
}

/// `is` is a valid `==` when both sides share a reference type more
/// specific than `object`.
fn can_use_reference_eq(vm: &Vm, ltype: &TypeRef, rtype: &TypeRef) -> bool {
    let common = vm.union_type(ltype, rtype);
    !common.is(&vm.b.object) && common.is_reference()
}

fn eq_opimpl(vm: &mut Vm, l: &Operand, r: &Operand) -> Result<OpImpl, ChromaError> {
    let ltype = l.static_type.clone();
    if ltype.hooks.has_override(OpKind::Eq) {
        return ltype.hooks.resolve(vm, OpKind::Eq, &[l.clone(), r.clone()]);
    }
    if can_use_reference_eq(vm, &ltype, &r.static_type) {
        return Ok(OpImpl::Simple(operator_func(vm, "object_is")?));
    }
    Ok(vm.binops.get_opimpl(BinaryOp::Eq, &ltype, &r.static_type))
}

fn ne_opimpl(vm: &mut Vm, l: &Operand, r: &Operand) -> Result<OpImpl, ChromaError> {
    if can_use_reference_eq(vm, &l.static_type, &r.static_type) {
        return Ok(OpImpl::Simple(operator_func(vm, "object_isnot")?));
    }
    Ok(vm.binops.get_opimpl(BinaryOp::Ne, &l.static_type, &r.static_type))
}

pub fn resolve_unary(vm: &mut Vm, op: UnaryOp, v: &Operand) -> Result<OpCall, ChromaError> {
    let opimpl = match vm.unaryops.get(&(op, v.static_type.id)) {
        Some(func) => OpImpl::Simple(func.clone()),
        None => OpImpl::Null,
    };
    let errmsg = format!("cannot do {}`{{0}}`", op.token());
    typecheck_opimpl(vm, opimpl, &[v.clone()], Dispatch::Single, &errmsg)
}
