#![forbid(unsafe_code)]

use chroma_ast::Color;

use crate::error::ChromaError;
use crate::function::FuncParam;
use crate::object::OpKind;
use crate::opimpl::{OpCall, OpImpl, Operand};
use crate::typecheck::{Dispatch, typecheck_opimpl};
use crate::vm::Vm;

/// `func(args...)`.
///
/// Values of function type are called directly. Anything else goes through
/// the `op_CALL` hook of its static type, which for type objects is the hook
/// of their metatype.
pub fn call(vm: &mut Vm, func: &Operand, args: &[Operand]) -> Result<OpCall, ChromaError> {
    let ty = func.static_type.clone();
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(func.clone());
    all.extend(args.iter().cloned());

    let opimpl = if ty.is_dynamic() {
        dynamic_call_opimpl(vm, args)?
    } else if ty.functype().is_some() {
        OpImpl::WithValues(vm.direct_call_func(&ty)?, args.to_vec())
    } else {
        ty.hooks.resolve(vm, OpKind::Call, &all)?
    };
    typecheck_opimpl(vm, opimpl, &all, Dispatch::Single, "cannot call objects of type `{0}`")
}

/// Calling a `dynamic` value: pretend it is a function taking `dynamic`
/// arguments and returning `dynamic`. This is right when the value turns out
/// to be a function; the callee checks its own argument types at runtime.
fn dynamic_call_opimpl(vm: &mut Vm, args: &[Operand]) -> Result<OpImpl, ChromaError> {
    let params = (0..args.len())
        .map(|i| FuncParam::new(format!("v{i}"), vm.b.dynamic.clone()))
        .collect();
    let restype = vm.b.dynamic.clone();
    let functype = vm.functype(Color::Red, params, restype);
    Ok(OpImpl::WithValues(vm.direct_call_func(&functype)?, args.to_vec()))
}

/// `obj.method(args...)`, through the `op_CALL_METHOD` hook.
pub fn call_method(vm: &mut Vm, obj: &Operand, method: &Operand, args: &[Operand]) -> Result<OpCall, ChromaError> {
    let ty = obj.static_type.clone();
    let mut all = Vec::with_capacity(args.len() + 2);
    all.push(obj.clone());
    all.push(method.clone());
    all.extend(args.iter().cloned());
    let opimpl = ty.hooks.resolve(vm, OpKind::CallMethod, &all)?;
    typecheck_opimpl(vm, opimpl, &all, Dispatch::Single, "cannot call methods on type `{0}`")
}
