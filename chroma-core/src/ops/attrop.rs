#![forbid(unsafe_code)]

use crate::error::ChromaError;
use crate::object::{OpKind, TypeRef};
use crate::opimpl::{OpCall, OpImpl, Operand};
use crate::ops::operator_func;
use crate::typecheck::{Dispatch, typecheck_opimpl};
use crate::vm::Vm;

/// The type declaring member `name`, as seen from `ty`. An alias sees the
/// members of its origin unless it overrides `op`.
fn member_owner(ty: &TypeRef, op: OpKind, name: &str) -> Option<TypeRef> {
    if ty.member(name).is_some() {
        return Some(ty.clone());
    }
    match ty.alias_origin() {
        Some(origin) if !ty.hooks.has_override(op) => member_owner(origin, op, name),
        _ => None,
    }
}

/// `obj.attr`: declared members first, then the `op_GETATTR` hook.
pub fn getattr(vm: &mut Vm, obj: &Operand, attr: &Operand) -> Result<OpCall, ChromaError> {
    let ty = obj.static_type.clone();
    let name = attr.blue_str();
    let opimpl = if ty.is_dynamic() {
        OpImpl::Simple(operator_func(vm, "dynamic_getattr")?)
    } else if let Some(owner) = member_owner(&ty, OpKind::GetAttr, &name) {
        let getter = vm.member_accessor(&owner, &name, false)?;
        OpImpl::WithValues(getter, vec![obj.clone()])
    } else {
        ty.hooks.resolve(vm, OpKind::GetAttr, &[obj.clone(), attr.clone()])?
    };
    let errmsg = format!("type `{{0}}` has no attribute '{name}'");
    typecheck_opimpl(vm, opimpl, &[obj.clone(), attr.clone()], Dispatch::Single, &errmsg)
}

/// `obj.attr = value`.
pub fn setattr(vm: &mut Vm, obj: &Operand, attr: &Operand, value: &Operand) -> Result<OpCall, ChromaError> {
    let ty = obj.static_type.clone();
    let name = attr.blue_str();
    let operands = [obj.clone(), attr.clone(), value.clone()];
    let opimpl = if ty.is_dynamic() {
        OpImpl::Simple(operator_func(vm, "dynamic_setattr")?)
    } else if let Some(owner) = member_owner(&ty, OpKind::SetAttr, &name) {
        let setter = vm.member_accessor(&owner, &name, true)?;
        OpImpl::WithValues(setter, vec![obj.clone(), value.clone()])
    } else {
        ty.hooks.resolve(vm, OpKind::SetAttr, &operands)?
    };
    let errmsg = format!("type `{{0}}` does not support assignment to attribute '{name}'");
    typecheck_opimpl(vm, opimpl, &operands, Dispatch::Single, &errmsg)
}
