#![forbid(unsafe_code)]

//! The `operator` module: concrete implementations of the operators, and
//! the dispatch tables pointing at them.

use chroma_ast::{Color, UnaryOp};

use crate::error::{ChromaError, ErrorKind};
use crate::object::{TypeRef, Value};
use crate::ops::{BinaryOp, dynamic};
use crate::registry::ModuleRegistry;
use crate::vm::Vm;

fn bad_args(name: &str, args: &[Value]) -> ChromaError {
    ChromaError::new(ErrorKind::Panic, format!("`operator::{name}` called with {args:?}"))
}

fn division_by_zero() -> ChromaError {
    ChromaError::new(ErrorKind::Panic, "division by zero")
}

fn floor_div(a: i32, b: i32) -> Result<i32, ChromaError> {
    if b == 0 {
        return Err(division_by_zero());
    }
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn i32_binop(op: BinaryOp, a: i32, b: i32) -> Result<Value, ChromaError> {
    Ok(match op {
        BinaryOp::Add => Value::I32(a.wrapping_add(b)),
        BinaryOp::Sub => Value::I32(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::I32(a.wrapping_mul(b)),
        BinaryOp::Div => Value::I32(floor_div(a, b)?),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
    })
}

fn f64_binop(op: BinaryOp, a: f64, b: f64) -> Result<Value, ChromaError> {
    Ok(match op {
        BinaryOp::Add => Value::F64(a + b),
        BinaryOp::Sub => Value::F64(a - b),
        BinaryOp::Mul => Value::F64(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            Value::F64(a / b)
        }
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
    })
}

fn is_comparison(op: BinaryOp) -> bool {
    !matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
}

pub(crate) fn register(vm: &mut Vm) {
    let b = vm.b.clone();
    let mut reg = ModuleRegistry::new("operator");

    // i32 and f64, plus the mixed combinations which convert to f64
    for op in BinaryOp::ALL {
        let restype = if is_comparison(op) { &b.bool } else { &b.i32 };
        let name = format!("i32_{}", op.name());
        let params = [("a", b.i32.clone()), ("b", b.i32.clone())];
        let fname = name.clone();
        let func = reg.builtin(vm, &name, Color::Red, &params, restype.clone(), move |_, args| match args {
            [Value::I32(x), Value::I32(y)] => i32_binop(op, *x, *y),
            _ => Err(bad_args(&fname, args)),
        });
        vm.binops.register(op, Some(&b.i32), Some(&b.i32), func);

        let restype = if is_comparison(op) { &b.bool } else { &b.f64 };
        let name = format!("f64_{}", op.name());
        let params = [("a", b.f64.clone()), ("b", b.f64.clone())];
        let fname = name.clone();
        let func = reg.builtin(vm, &name, Color::Red, &params, restype.clone(), move |_, args| match args {
            [Value::F64(x), Value::F64(y)] => f64_binop(op, *x, *y),
            _ => Err(bad_args(&fname, args)),
        });
        vm.binops.register(op, Some(&b.f64), Some(&b.f64), func.clone());
        vm.binops.register(op, Some(&b.f64), Some(&b.i32), func.clone());
        vm.binops.register(op, Some(&b.i32), Some(&b.f64), func);
    }

    reg.builtin(vm, "i32_to_f64", Color::Red, &[("a", b.i32.clone())], b.f64.clone(), |_, args| match args {
        [Value::I32(x)] => Ok(Value::F64(f64::from(*x))),
        _ => Err(bad_args("i32_to_f64", args)),
    });

    register_unary(vm, &mut reg, &b.i32, &b.i32, "i32_neg", UnaryOp::Neg, |v| match v {
        Value::I32(x) => Some(Value::I32(x.wrapping_neg())),
        _ => None,
    });
    register_unary(vm, &mut reg, &b.i32, &b.i32, "i32_pos", UnaryOp::Pos, |v| match v {
        Value::I32(x) => Some(Value::I32(*x)),
        _ => None,
    });
    register_unary(vm, &mut reg, &b.i32, &b.i32, "i32_invert", UnaryOp::Invert, |v| match v {
        Value::I32(x) => Some(Value::I32(!x)),
        _ => None,
    });
    register_unary(vm, &mut reg, &b.f64, &b.f64, "f64_neg", UnaryOp::Neg, |v| match v {
        Value::F64(x) => Some(Value::F64(-x)),
        _ => None,
    });
    register_unary(vm, &mut reg, &b.f64, &b.f64, "f64_pos", UnaryOp::Pos, |v| match v {
        Value::F64(x) => Some(Value::F64(*x)),
        _ => None,
    });
    register_unary(vm, &mut reg, &b.bool, &b.bool, "bool_not", UnaryOp::Not, |v| match v {
        Value::Bool(x) => Some(Value::Bool(!x)),
        _ => None,
    });

    // bool
    let bb = [("a", b.bool.clone()), ("b", b.bool.clone())];
    let func = reg.builtin(vm, "bool_eq", Color::Red, &bb, b.bool.clone(), |_, args| match args {
        [Value::Bool(x), Value::Bool(y)] => Ok(Value::Bool(x == y)),
        _ => Err(bad_args("bool_eq", args)),
    });
    vm.binops.register(BinaryOp::Eq, Some(&b.bool), Some(&b.bool), func);
    let func = reg.builtin(vm, "bool_ne", Color::Red, &bb, b.bool.clone(), |_, args| match args {
        [Value::Bool(x), Value::Bool(y)] => Ok(Value::Bool(x != y)),
        _ => Err(bad_args("bool_ne", args)),
    });
    vm.binops.register(BinaryOp::Ne, Some(&b.bool), Some(&b.bool), func);

    // str
    let ss = [("a", b.str.clone()), ("b", b.str.clone())];
    let func = reg.builtin(vm, "str_add", Color::Red, &ss, b.str.clone(), |_, args| match args {
        [Value::Str(x), Value::Str(y)] => Ok(Value::str(&format!("{x}{y}"))),
        _ => Err(bad_args("str_add", args)),
    });
    vm.binops.register(BinaryOp::Add, Some(&b.str), Some(&b.str), func);
    let si = [("a", b.str.clone()), ("b", b.i32.clone())];
    let func = reg.builtin(vm, "str_mul", Color::Red, &si, b.str.clone(), |_, args| match args {
        [Value::Str(x), Value::I32(n)] => Ok(Value::str(&x.repeat(usize::try_from(*n).unwrap_or(0)))),
        _ => Err(bad_args("str_mul", args)),
    });
    vm.binops.register(BinaryOp::Mul, Some(&b.str), Some(&b.i32), func);
    let func = reg.builtin(vm, "str_eq", Color::Red, &ss, b.bool.clone(), |_, args| match args {
        [Value::Str(x), Value::Str(y)] => Ok(Value::Bool(x == y)),
        _ => Err(bad_args("str_eq", args)),
    });
    vm.binops.register(BinaryOp::Eq, Some(&b.str), Some(&b.str), func);
    let func = reg.builtin(vm, "str_ne", Color::Red, &ss, b.bool.clone(), |_, args| match args {
        [Value::Str(x), Value::Str(y)] => Ok(Value::Bool(x != y)),
        _ => Err(bad_args("str_ne", args)),
    });
    vm.binops.register(BinaryOp::Ne, Some(&b.str), Some(&b.str), func);

    // identity
    let oo = [("a", b.object.clone()), ("b", b.object.clone())];
    reg.builtin(vm, "object_is", Color::Red, &oo, b.bool.clone(), |_, args| match args {
        [x, y] => Ok(Value::Bool(x.is_same(y))),
        _ => Err(bad_args("object_is", args)),
    });
    reg.builtin(vm, "object_isnot", Color::Red, &oo, b.bool.clone(), |_, args| match args {
        [x, y] => Ok(Value::Bool(!x.is_same(y))),
        _ => Err(bad_args("object_isnot", args)),
    });

    // dynamic
    let dd = [("a", b.dynamic.clone()), ("b", b.dynamic.clone())];
    for op in [
        BinaryOp::Add,
        BinaryOp::Mul,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
    ] {
        let name = format!("dynamic_{}", op.name());
        let fname = name.clone();
        let func = reg.builtin(vm, &name, Color::Red, &dd, b.dynamic.clone(), move |vm, args| match args {
            [x, y] => dynamic::dynamic_binop(vm, op, x, y),
            _ => Err(bad_args(&fname, args)),
        });
        vm.binops.register_partial(op, &b.dynamic, func);
    }
    let params = [("obj", b.dynamic.clone()), ("attr", b.str.clone())];
    reg.builtin(vm, "dynamic_getattr", Color::Red, &params, b.dynamic.clone(), |vm, args| match args {
        [obj, attr] => dynamic::dynamic_getattr(vm, obj, attr),
        _ => Err(bad_args("dynamic_getattr", args)),
    });
    let params = [
        ("obj", b.dynamic.clone()),
        ("attr", b.str.clone()),
        ("v", b.dynamic.clone()),
    ];
    reg.builtin(vm, "dynamic_setattr", Color::Red, &params, b.void.clone(), |vm, args| match args {
        [obj, attr, v] => dynamic::dynamic_setattr(vm, obj, attr, v),
        _ => Err(bad_args("dynamic_setattr", args)),
    });

    vm.install_module(reg);
}

fn register_unary<F>(
    vm: &mut Vm,
    reg: &mut ModuleRegistry,
    argtype: &TypeRef,
    restype: &TypeRef,
    name: &'static str,
    op: UnaryOp,
    f: F,
) where
    F: Fn(&Value) -> Option<Value> + 'static,
{
    let func = reg.builtin(vm, name, Color::Red, &[("a", argtype.clone())], restype.clone(), move |_, args| {
        match args {
            [v] => f(v).ok_or_else(|| bad_args(name, args)),
            _ => Err(bad_args(name, args)),
        }
    });
    vm.unaryops.insert((op, argtype.id), func);
}
