#![forbid(unsafe_code)]

//! Operands and operation implementations.
//!
//! The dispatch layer never sees values directly: every operand is an
//! `Operand`, which carries its static type and, for blue operands, the
//! value known at compile time. Resolving an operator produces an `OpImpl`,
//! which `typecheck_opimpl` turns into an `OpCall` ready to be executed or
//! redshifted.

use chroma_ast::{Color, Expr, ExprKind, Fqn, Loc};

use crate::error::{ChromaError, ErrorKind};
use crate::function::{FuncRef, FuncType};
use crate::object::{TypeRef, Value};
use crate::symtable::Symbol;
use crate::vm::Vm;

#[derive(Clone, Debug)]
pub struct Operand {
    pub prefix: &'static str,
    /// Position of this operand in the argument list of the operation.
    pub i: usize,
    pub static_type: TypeRef,
    pub loc: Loc,
    pub sym: Option<Symbol>,
    pub blueval: Option<Value>,
}

impl Operand {
    pub fn new(prefix: &'static str, i: usize, static_type: TypeRef, loc: Loc) -> Self {
        Self {
            prefix,
            i,
            static_type,
            loc,
            sym: None,
            blueval: None,
        }
    }

    /// A blue operand whose static type is the dynamic type of `value`.
    pub fn from_value(vm: &Vm, value: Value, prefix: &'static str, i: usize) -> Self {
        let static_type = vm.dynamic_type(&value);
        Self {
            prefix,
            i,
            static_type,
            loc: Loc::fake(),
            sym: None,
            blueval: Some(value),
        }
    }

    pub fn with_sym(mut self, sym: Option<Symbol>) -> Self {
        self.sym = sym;
        self
    }

    /// Attach the compile-time value. It must be an instance of the static
    /// type.
    pub fn with_blueval(mut self, vm: &Vm, value: Value) -> Result<Self, ChromaError> {
        if !vm.isinstance(&value, &self.static_type) {
            let got = vm.dynamic_type(&value);
            return Err(ChromaError::panic(
                format!(
                    "blue value of type `{}` does not match static type `{}`",
                    got.name, self.static_type.name
                ),
                &self.loc,
            ));
        }
        self.blueval = Some(value);
        Ok(self)
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.prefix, self.i)
    }

    pub fn color(&self) -> Color {
        if self.blueval.is_some() {
            Color::Blue
        } else {
            Color::Red
        }
    }

    pub fn is_blue(&self) -> bool {
        self.blueval.is_some()
    }

    /// The blue string value, e.g. an attribute name. `<unknown>` if the
    /// operand is red or not a string.
    pub fn blue_str(&self) -> String {
        match &self.blueval {
            Some(Value::Str(s)) => s.to_string(),
            _ => "<unknown>".to_string(),
        }
    }

    pub fn blue_type(&self) -> Result<TypeRef, ChromaError> {
        match &self.blueval {
            Some(Value::Type(t)) => Ok(t.clone()),
            _ => Err(ChromaError::type_error(
                "expected a blue type",
                format!("this is `{}`", self.static_type.name),
                &self.loc,
            )),
        }
    }
}

/// How a value is adapted to the type expected by a parameter or a local.
#[derive(Clone, Debug)]
pub enum TypeConverter {
    /// Runtime check that the value is an instance of the target type.
    DynamicCast(TypeRef),
    /// `i32` to `f64`.
    NumericConv { from: TypeRef, to: TypeRef },
    /// Between a type alias and its origin. Values are unchanged.
    AliasConv(TypeRef),
}

impl TypeConverter {
    pub fn target(&self) -> &TypeRef {
        match self {
            TypeConverter::DynamicCast(t) => t,
            TypeConverter::NumericConv { to, .. } => to,
            TypeConverter::AliasConv(t) => t,
        }
    }

    pub fn color(&self) -> Color {
        Color::Blue
    }

    pub fn convert(&self, vm: &Vm, value: Value, loc: &Loc) -> Result<Value, ChromaError> {
        match self {
            TypeConverter::DynamicCast(t) => {
                if vm.isinstance(&value, t) {
                    Ok(value)
                } else {
                    let got = vm.dynamic_type(&value);
                    Err(ChromaError::type_error(
                        "mismatched types",
                        format!("expected `{}`, got `{}`", t.name, got.name),
                        loc,
                    ))
                }
            }
            TypeConverter::NumericConv { .. } => match value {
                Value::I32(v) => Ok(Value::F64(f64::from(v))),
                other => Err(ChromaError::panic(
                    format!("numeric conversion expected `i32`, got {other:?}"),
                    loc,
                )),
            },
            TypeConverter::AliasConv(_) => Ok(value),
        }
    }

    /// Make the conversion explicit in redshifted code.
    pub fn redshift(&self, expr: Expr) -> Expr {
        match self {
            TypeConverter::NumericConv { .. } => {
                let loc = expr.loc.clone();
                let func = Expr::new(
                    loc.clone(),
                    ExprKind::FqnConst(Fqn::make_global("operator", "i32_to_f64")),
                );
                Expr::new(
                    loc,
                    ExprKind::Call {
                        func: Box::new(func),
                        args: vec![expr],
                    },
                )
            }
            _ => expr,
        }
    }
}

/// Result of resolving an operator, before typechecking.
#[derive(Clone, Debug)]
pub enum OpImpl {
    /// The operation is not supported.
    Null,
    /// Call the function with all the operands, in order.
    Simple(FuncRef),
    /// Call the function with the given operands.
    WithValues(FuncRef, Vec<Operand>),
}

impl OpImpl {
    pub fn is_null(&self) -> bool {
        matches!(self, OpImpl::Null)
    }
}

/// A resolved and typechecked operation.
#[derive(Clone, Debug)]
pub struct OpCall {
    pub func: FuncRef,
    pub args: Vec<Operand>,
    pub converters: Vec<Option<TypeConverter>>,
}

impl OpCall {
    pub fn is_direct_call(&self) -> bool {
        self.func.is_direct_call()
    }

    pub fn functype(&self) -> &FuncType {
        self.func.functype()
    }

    pub fn restype(&self) -> TypeRef {
        self.func.functype().restype.clone()
    }

    pub fn color(&self) -> Color {
        self.func.color()
    }

    /// The source range covered by the operands.
    pub fn loc(&self) -> Option<Loc> {
        let mut locs = self.args.iter().map(|a| &a.loc).filter(|l| !l.is_fake());
        let first = locs.next()?;
        Some(match locs.last() {
            Some(last) => first.combine(last),
            None => first.clone(),
        })
    }

    /// Execute the operation. `orig_args` are the values of the operands
    /// the operation was resolved against, in their original order.
    pub fn call(&self, vm: &mut Vm, orig_args: &[Value]) -> Result<Value, ChromaError> {
        self.call_raw(vm, orig_args).map_err(|e| match self.loc() {
            Some(loc) => e.at_loc_maybe(&loc),
            None => e,
        })
    }

    fn call_raw(&self, vm: &mut Vm, orig_args: &[Value]) -> Result<Value, ChromaError> {
        let func = if self.is_direct_call() {
            match orig_args.first() {
                Some(Value::Func(f)) => f.clone(),
                Some(other) => {
                    let t = vm.dynamic_type(other);
                    return Err(ChromaError::new(
                        ErrorKind::Type,
                        format!("cannot call objects of type `{}`", t.name),
                    ));
                }
                None => {
                    return Err(ChromaError::new(ErrorKind::Panic, "direct call without callee"));
                }
            }
        } else {
            self.func.clone()
        };
        let mut real_args = Vec::with_capacity(self.args.len());
        for (operand, conv) in self.args.iter().zip(&self.converters) {
            let value = orig_args.get(operand.i).cloned().ok_or_else(|| {
                ChromaError::panic(format!("missing operand `{}`", operand.name()), &operand.loc)
            })?;
            let value = match conv {
                Some(c) => c.convert(vm, value, &operand.loc)?,
                None => value,
            };
            real_args.push(value);
        }
        vm.call(&func, &real_args)
    }

    /// Same as `call`, but on expressions: pick and convert the argument
    /// expressions of the concrete call.
    pub fn redshift_args(&self, orig_args: &[Expr]) -> Result<Vec<Expr>, ChromaError> {
        let mut out = Vec::with_capacity(self.args.len());
        for (operand, conv) in self.args.iter().zip(&self.converters) {
            let expr = orig_args.get(operand.i).cloned().ok_or_else(|| {
                ChromaError::panic(format!("missing operand `{}`", operand.name()), &operand.loc)
            })?;
            out.push(match conv {
                Some(c) => c.redshift(expr),
                None => expr,
            });
        }
        Ok(out)
    }
}
