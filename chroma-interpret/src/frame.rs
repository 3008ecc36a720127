#![forbid(unsafe_code)]

use std::collections::HashMap;

use chroma_ast::Fqn;
use chroma_core::{ChromaError, ErrorKind, Value, Vm};
use tracing::trace;

use crate::code::{CodeObject, OpCode};

fn panic(message: impl Into<String>) -> ChromaError {
    ChromaError::new(ErrorKind::Panic, message)
}

/// Execution state of one `CodeObject` call.
pub struct Frame<'c> {
    code: &'c CodeObject,
    locals: HashMap<String, Value>,
    stack: Vec<Value>,
}

impl<'c> Frame<'c> {
    pub fn new(code: &'c CodeObject) -> Self {
        Self {
            code,
            locals: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Run the code with `args` bound to its parameters. Errors without a
    /// source location point at the function the code was lowered from.
    pub fn run(&mut self, vm: &mut Vm, args: &[Value]) -> Result<Value, ChromaError> {
        let loc = self.code.loc.clone();
        self.run_raw(vm, args).map_err(|e| e.at_loc_maybe(&loc))
    }

    fn run_raw(&mut self, vm: &mut Vm, args: &[Value]) -> Result<Value, ChromaError> {
        if args.len() != self.code.params.len() {
            return Err(ChromaError::new(
                ErrorKind::Type,
                format!(
                    "`{}` takes {} but {} were supplied",
                    self.code.name,
                    chroma_core::maybe_plural(self.code.params.len(), "argument"),
                    chroma_core::maybe_plural(args.len(), "argument"),
                ),
            ));
        }
        let code = self.code;
        for (name, arg) in code.params.iter().zip(args) {
            self.store_local(vm, name, arg.clone())?;
        }
        for op in &code.body {
            trace!(code = %code.name, %op, depth = self.stack.len(), "exec");
            if let Some(value) = self.exec(vm, op)? {
                return Ok(value);
            }
        }
        Err(panic(format!(
            "`{}`: reached the end of the code without a `return`",
            self.code.name
        )))
    }

    /// Execute one instruction. Returns the result of the call on `return`.
    fn exec(&mut self, vm: &mut Vm, op: &OpCode) -> Result<Option<Value>, ChromaError> {
        match op {
            OpCode::ConstLoad(v) => self.stack.push(v.clone()),
            OpCode::I32Add => self.i32_binop(i32::wrapping_add)?,
            OpCode::I32Sub => self.i32_binop(i32::wrapping_sub)?,
            OpCode::I32Mul => self.i32_binop(i32::wrapping_mul)?,
            OpCode::LocalGet(name) => {
                let v = self
                    .locals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| panic(format!("local `{name}` is not set")))?;
                self.stack.push(v);
            }
            OpCode::LocalSet(name) => {
                let v = self.pop()?;
                self.store_local(vm, name, v)?;
            }
            OpCode::GlobalGet(fqn) => {
                let v = vm.lookup_global(fqn).ok_or_else(|| global_missing(fqn))?;
                self.stack.push(v);
            }
            OpCode::GlobalSet(fqn) => {
                let v = self.pop()?;
                vm.store_global(fqn, v)?;
            }
            OpCode::Call(fqn, argc) => {
                let func = match vm.lookup_global(fqn) {
                    Some(Value::Func(f)) => f,
                    Some(other) => {
                        let t = vm.dynamic_type(&other);
                        return Err(ChromaError::new(
                            ErrorKind::Type,
                            format!("cannot call objects of type `{}`", t.name),
                        ));
                    }
                    None => return Err(global_missing(fqn)),
                };
                if self.stack.len() < *argc {
                    return Err(panic(format!(
                        "`call {fqn}` needs {argc} values, the stack has {}",
                        self.stack.len()
                    )));
                }
                let args = self.stack.split_off(self.stack.len() - argc);
                let res = vm.call(&func, &args)?;
                self.stack.push(res);
            }
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Return => {
                if self.stack.len() != 1 {
                    return Err(panic(format!(
                        "`return` expects exactly one value on the stack, found {}",
                        self.stack.len()
                    )));
                }
                return Ok(self.stack.pop());
            }
        }
        Ok(None)
    }

    fn pop(&mut self) -> Result<Value, ChromaError> {
        self.stack.pop().ok_or_else(|| panic("pop from an empty stack"))
    }

    /// Pops the right operand, then the left one.
    fn i32_binop(&mut self, f: fn(i32, i32) -> i32) -> Result<(), ChromaError> {
        let r = self.pop()?;
        let l = self.pop()?;
        match (&l, &r) {
            (Value::I32(a), Value::I32(b)) => {
                self.stack.push(Value::I32(f(*a, *b)));
                Ok(())
            }
            _ => Err(panic(format!("i32 arithmetic on {l:?} and {r:?}"))),
        }
    }

    fn store_local(&mut self, vm: &Vm, name: &str, value: Value) -> Result<(), ChromaError> {
        if let Some(ty) = self.code.locals_types.get(name) {
            if !vm.isinstance(&value, ty) {
                let got = vm.dynamic_type(&value);
                return Err(panic(format!(
                    "mismatched types for local `{name}`: expected `{}`, got `{}`",
                    ty.name, got.name
                )));
            }
        }
        self.locals.insert(name.to_string(), value);
        Ok(())
    }
}

fn global_missing(fqn: &Fqn) -> ChromaError {
    ChromaError::new(ErrorKind::Name, format!("global `{fqn}` does not exist"))
}

#[cfg(test)]
mod tests {
    use chroma_core::VmConfig;

    use super::*;
    use crate::asm::parse_code;

    fn code(params: &[&str], text: &str) -> CodeObject {
        let params = params.iter().map(|p| p.to_string()).collect();
        CodeObject::new("test", params, parse_code(text).expect("parse"))
    }

    fn run(code: &CodeObject, args: &[Value]) -> Result<Value, ChromaError> {
        let mut vm = Vm::new(VmConfig::default());
        Frame::new(code).run(&mut vm, args)
    }

    #[test]
    fn add_two_constants() {
        let c = code(&[], "const_load 3\nconst_load 4\ni32_add\nreturn\n");
        assert_eq!(run(&c, &[]).expect("run").as_i32(), Some(7));
    }

    #[test]
    fn operands_are_popped_right_first() {
        let c = code(&["x", "y"], "local_get x\nlocal_get y\ni32_sub\nreturn\n");
        let v = run(&c, &[Value::I32(10), Value::I32(3)]).expect("run");
        assert_eq!(v.as_i32(), Some(7));
    }

    #[test]
    fn calls_go_through_the_vm() {
        let c = code(&["x"], "local_get x\ncall builtins::abs 1\nreturn\n");
        assert_eq!(run(&c, &[Value::I32(-5)]).expect("run").as_i32(), Some(5));
    }

    #[test]
    fn locals_are_typed() {
        let mut vm = Vm::new(VmConfig::default());
        let mut types = std::collections::BTreeMap::new();
        types.insert("x".to_string(), vm.b.i32.clone());
        let c = code(&[], "const_load \"no\"\nlocal_set x\nconst_load None\nreturn\n").with_locals_types(types);
        let err = Frame::new(&c).run(&mut vm, &[]).expect_err("str in an i32 local");
        assert!(err.is(ErrorKind::Panic));
        assert!(err.message.contains("expected `i32`, got `str`"), "{err}");
    }

    #[test]
    fn return_checks_the_stack() {
        let c = code(&[], "const_load 1\nconst_load 2\nreturn\n");
        let err = run(&c, &[]).expect_err("two values");
        assert!(err.message.contains("found 2"), "{err}");

        let c = code(&[], "const_load 1\npop\n");
        let err = run(&c, &[]).expect_err("no return");
        assert!(err.message.contains("without a `return`"), "{err}");
    }

    #[test]
    fn errors_point_at_the_lowered_function() {
        let at = chroma_ast::Loc::new("t.chroma", 4, 6, 0, 12);
        let c = code(&[], "const_load 1\npop\n").with_loc(at.clone());
        let err = run(&c, &[]).expect_err("no return");
        assert_eq!(err.loc(), Some(&at));

        let c = code(&[], "const_load 1\npop\n");
        assert!(run(&c, &[]).expect_err("no return").loc().is_none());
    }
}
