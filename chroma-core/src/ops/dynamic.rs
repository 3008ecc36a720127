#![forbid(unsafe_code)]

//! Operations on `dynamic` values: dispatch again at runtime, on the
//! dynamic types of the actual values.

use crate::error::ChromaError;
use crate::object::Value;
use crate::opimpl::Operand;
use crate::ops::{BinaryOp, attrop, binop};
use crate::vm::Vm;

pub(crate) fn dynamic_binop(vm: &mut Vm, op: BinaryOp, a: &Value, b: &Value) -> Result<Value, ChromaError> {
    // == and != on dynamic values never fail
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(a.universal_eq(b))),
        BinaryOp::Ne => return Ok(Value::Bool(!a.universal_eq(b))),
        _ => {}
    }
    let va = Operand::from_value(vm, a.clone(), "a", 0);
    let vb = Operand::from_value(vm, b.clone(), "b", 1);
    let opcall = binop::resolve_binop(vm, op, &va, &vb)?;
    opcall.call(vm, &[a.clone(), b.clone()])
}

pub(crate) fn dynamic_getattr(vm: &mut Vm, obj: &Value, attr: &Value) -> Result<Value, ChromaError> {
    let vo = Operand::from_value(vm, obj.clone(), "o", 0);
    let va = Operand::from_value(vm, attr.clone(), "a", 1);
    let opcall = attrop::getattr(vm, &vo, &va)?;
    opcall.call(vm, &[obj.clone(), attr.clone()])
}

pub(crate) fn dynamic_setattr(vm: &mut Vm, obj: &Value, attr: &Value, value: &Value) -> Result<Value, ChromaError> {
    let vo = Operand::from_value(vm, obj.clone(), "o", 0);
    let va = Operand::from_value(vm, attr.clone(), "a", 1);
    let vv = Operand::from_value(vm, value.clone(), "v", 2);
    let opcall = attrop::setattr(vm, &vo, &va, &vv)?;
    opcall.call(vm, &[obj.clone(), attr.clone(), value.clone()])
}
