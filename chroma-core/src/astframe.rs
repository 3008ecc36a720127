#![forbid(unsafe_code)]

//! Tree-walking execution of AST-backed functions.

use std::cell::RefCell;
use std::ops::ControlFlow;
use std::rc::Rc;

use chroma_ast::{Constant, Expr, ExprKind, FuncDef, Ident, Loc, NodeId, Qn, Stmt, StmtKind, VarDef};
use tracing::trace;

use crate::error::{ChromaError, ErrorKind};
use crate::function::{FuncParam, FuncRef, Namespace};
use crate::object::{ListObj, TypeRef, Value};
use crate::typecheck::{StoreTarget, TypeChecker};
use crate::vm::Vm;

pub struct AstFrame {
    func: FuncRef,
    funcdef: Rc<FuncDef>,
    closure: Vec<Rc<Namespace>>,
    pub(crate) t: TypeChecker,
    locals: Namespace,
}

impl AstFrame {
    pub fn new(vm: &Vm, func: FuncRef) -> Result<Self, ChromaError> {
        let ast = func.as_ast().ok_or_else(|| {
            ChromaError::new(
                ErrorKind::Panic,
                format!("cannot make a frame for builtin function `{}`", func.qn),
            )
        })?;
        let funcdef = ast.funcdef.clone();
        let closure = ast.closure.clone();
        let t = TypeChecker::new(vm, func.clone())?;
        Ok(Self {
            func,
            funcdef,
            closure,
            t,
            locals: Namespace::new(),
        })
    }

    pub fn func(&self) -> &FuncRef {
        &self.func
    }

    pub fn run(&mut self, vm: &mut Vm, args: &[Value]) -> Result<Value, ChromaError> {
        trace!(func = %self.func.qn, "enter frame");
        let sig = self.func.functype().clone();
        for (param, arg) in sig.params.iter().zip(args) {
            self.store_local(vm, &param.name, arg.clone(), &self.funcdef.loc.clone())?;
        }
        let body = self.funcdef.clone();
        if let ControlFlow::Break(value) = self.exec_body(vm, &body.body)? {
            return Ok(value);
        }
        let restype = &sig.restype;
        if restype.is_void() || restype.is_dynamic() {
            return Ok(Value::None);
        }
        Err(ChromaError::panic(
            "reached the end of the function without a `return`",
            &self.funcdef.loc,
        ))
    }

    fn exec_body(&mut self, vm: &mut Vm, body: &[Stmt]) -> Result<ControlFlow<Value>, ChromaError> {
        for stmt in body {
            if let ControlFlow::Break(value) = self.exec_stmt(vm, stmt)? {
                return Ok(ControlFlow::Break(value));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    pub fn exec_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> Result<ControlFlow<Value>, ChromaError> {
        self.exec_stmt_raw(vm, stmt).map_err(|e| e.at_loc_maybe(&stmt.loc))
    }

    fn exec_stmt_raw(&mut self, vm: &mut Vm, stmt: &Stmt) -> Result<ControlFlow<Value>, ChromaError> {
        self.t.check_stmt(vm, stmt)?;
        match &stmt.kind {
            StmtKind::Pass => {}
            StmtKind::Return(value) => {
                let v = self.eval_expr(vm, value)?;
                return Ok(ControlFlow::Break(v));
            }
            StmtKind::VarDef(vardef) => self.exec_vardef(vm, vardef)?,
            StmtKind::FuncDef(funcdef) => self.exec_funcdef(vm, funcdef)?,
            StmtKind::Assign { target, value } => {
                let v = self.eval_expr(vm, value)?;
                self.store(vm, (stmt.id, 0), target, v)?;
            }
            StmtKind::UnpackAssign { targets, value } => self.exec_unpack(vm, stmt, targets, value)?,
            StmtKind::SetAttr { target, attr, value } => {
                let args = [
                    self.eval_expr(vm, target)?,
                    Value::str(&attr.name),
                    self.eval_expr(vm, value)?,
                ];
                self.t.opimpl(stmt.id)?.call(vm, &args)?;
            }
            StmtKind::SetItem { target, index, value } => {
                let args = [
                    self.eval_expr(vm, target)?,
                    self.eval_expr(vm, index)?,
                    self.eval_expr(vm, value)?,
                ];
                self.t.opimpl(stmt.id)?.call(vm, &args)?;
            }
            StmtKind::If {
                test,
                then_body,
                else_body,
            } => {
                let body = if self.eval_bool(vm, test)? { then_body } else { else_body };
                return self.exec_body(vm, body);
            }
            StmtKind::While { test, body } => {
                while self.eval_bool(vm, test)? {
                    if let ControlFlow::Break(v) = self.exec_body(vm, body)? {
                        return Ok(ControlFlow::Break(v));
                    }
                }
            }
            StmtKind::StmtExpr(value) => {
                self.eval_expr(vm, value)?;
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// `var x: T` fixes the type of `x`; `var x: auto` leaves it to the first
    /// assignment.
    pub(crate) fn exec_vardef(&mut self, vm: &mut Vm, vardef: &VarDef) -> Result<(), ChromaError> {
        if vardef.ty.is_auto() {
            return Ok(());
        }
        let ty = self.eval_expr_type(vm, &vardef.ty)?;
        self.t.lazy_check_vardef(&vardef.name, ty, &vardef.loc)
    }

    /// Build the function object of a nested `def`. It captures a snapshot
    /// of the current locals.
    pub(crate) fn exec_funcdef(&mut self, vm: &mut Vm, funcdef: &Rc<FuncDef>) -> Result<(), ChromaError> {
        let functype = self.eval_functype(vm, funcdef)?;
        let mut closure = self.closure.clone();
        closure.push(Rc::new(self.locals.clone()));
        let qn = Qn::new(self.func.qn.modname.clone(), funcdef.name.clone());
        let func = vm.new_ast_func(qn, functype.clone(), funcdef.clone(), closure, None)?;
        self.t.lazy_check_funcdef(&funcdef.name, functype, &funcdef.prototype_loc)?;
        self.store_local(vm, &funcdef.name, Value::Func(func), &funcdef.prototype_loc)
    }

    /// The function type described by the prototype of `funcdef`.
    pub(crate) fn eval_functype(&mut self, vm: &mut Vm, funcdef: &FuncDef) -> Result<TypeRef, ChromaError> {
        let mut params = Vec::with_capacity(funcdef.args.len());
        for arg in &funcdef.args {
            let ty = self.eval_expr_type(vm, &arg.ty)?;
            params.push(FuncParam::new(arg.name.clone(), ty));
        }
        let restype = self.eval_expr_type(vm, &funcdef.return_type)?;
        Ok(vm.functype(funcdef.color, params, restype))
    }

    fn exec_unpack(&mut self, vm: &mut Vm, stmt: &Stmt, targets: &[Ident], value: &Expr) -> Result<(), ChromaError> {
        let items = match self.eval_expr(vm, value)? {
            Value::Tuple(items) => items,
            other => {
                let t = vm.dynamic_type(&other);
                return Err(ChromaError::panic(format!("cannot unpack `{}`", t.name), &value.loc));
            }
        };
        if items.len() != targets.len() {
            return Err(ChromaError::panic(
                format!(
                    "Wrong number of values to unpack: expected {}, got {}",
                    targets.len(),
                    items.len()
                ),
                &value.loc,
            ));
        }
        for (i, (target, item)) in targets.iter().zip(items.iter()).enumerate() {
            let conv = self.t.unpack_item(stmt.id, i).and_then(|e| self.t.expr_conv(e.id));
            let v = match conv {
                Some(c) => c.convert(vm, item.clone(), &target.loc)?,
                None => item.clone(),
            };
            self.store(vm, (stmt.id, i), target, v)?;
        }
        Ok(())
    }

    fn store(&mut self, vm: &mut Vm, key: (NodeId, usize), target: &Ident, value: Value) -> Result<(), ChromaError> {
        match self.t.store_target(key.0, key.1)?.clone() {
            StoreTarget::Global(fqn) => vm.store_global(&fqn, value),
            StoreTarget::Local => self.store_local(vm, &target.name, value, &target.loc),
        }
    }

    fn store_local(&mut self, vm: &Vm, name: &str, value: Value, loc: &Loc) -> Result<(), ChromaError> {
        if self.func.is_redshifted() {
            if let Some(ty) = self.t.locals_types.get(name) {
                if !vm.isinstance(&value, ty) {
                    let got = vm.dynamic_type(&value);
                    return Err(ChromaError::panic(
                        format!("local `{name}` is `{}`, got a value of type `{}`", ty.name, got.name),
                        loc,
                    ));
                }
            }
        }
        self.t.set_blue_local(name, value.clone());
        self.locals.insert(name.to_string(), value);
        Ok(())
    }

    fn load(&self, vm: &Vm, name: &str, loc: &Loc) -> Result<Value, ChromaError> {
        let sym = self.t.symtable().lookup(name).ok_or_else(|| {
            ChromaError::simple(
                ErrorKind::Name,
                format!("name `{name}` is not defined"),
                "not found in this scope",
                loc,
            )
        })?;
        if let Some(fqn) = &sym.fqn {
            return vm.lookup_global(fqn).ok_or_else(|| {
                ChromaError::simple(
                    ErrorKind::Name,
                    format!("name `{name}` is not defined yet"),
                    "used before its definition",
                    loc,
                )
            });
        }
        if sym.is_local() {
            return self.locals.get(name).cloned().ok_or_else(|| {
                ChromaError::simple(
                    ErrorKind::Name,
                    format!("local variable `{name}` is used before being assigned"),
                    "read here",
                    loc,
                )
            });
        }
        self.t.closure_lookup(&sym, loc)
    }

    fn eval_bool(&mut self, vm: &mut Vm, expr: &Expr) -> Result<bool, ChromaError> {
        match self.eval_expr(vm, expr)? {
            Value::Bool(b) => Ok(b),
            other => {
                let t = vm.dynamic_type(&other);
                Err(ChromaError::panic(format!("expected `bool`, got `{}`", t.name), &expr.loc))
            }
        }
    }

    /// Evaluate a type annotation. `None` stands for `void`.
    pub fn eval_expr_type(&mut self, vm: &mut Vm, expr: &Expr) -> Result<TypeRef, ChromaError> {
        match self.eval_expr(vm, expr)? {
            Value::Type(t) => Ok(t),
            Value::None => Ok(vm.b.void.clone()),
            other => {
                let t = vm.dynamic_type(&other);
                Err(ChromaError::type_error(
                    "expected a type",
                    format!("this is `{}`", t.name),
                    &expr.loc,
                ))
            }
        }
    }

    /// Evaluate `expr` and apply the conversion the typechecker recorded for
    /// it, if any.
    pub fn eval_expr(&mut self, vm: &mut Vm, expr: &Expr) -> Result<Value, ChromaError> {
        self.t.check_expr(vm, expr)?;
        let value = self.eval_expr_raw(vm, expr).map_err(|e| e.at_loc_maybe(&expr.loc))?;
        match self.t.expr_conv(expr.id) {
            Some(conv) => conv.convert(vm, value, &expr.loc),
            None => Ok(value),
        }
    }

    fn eval_expr_raw(&mut self, vm: &mut Vm, expr: &Expr) -> Result<Value, ChromaError> {
        match &expr.kind {
            ExprKind::Constant(c) => constant_value(c, &expr.loc),
            ExprKind::Name(name) => self.load(vm, name, &expr.loc),
            ExprKind::Auto => Err(ChromaError::panic("cannot evaluate `auto`", &expr.loc)),
            ExprKind::FqnConst(fqn) => vm
                .lookup_global(fqn)
                .ok_or_else(|| ChromaError::panic(format!("`{fqn}` is not a registered global"), &expr.loc)),
            ExprKind::BinOp { left, right, .. } | ExprKind::CompareOp { left, right, .. } => {
                let args = [self.eval_expr(vm, left)?, self.eval_expr(vm, right)?];
                self.t.opimpl(expr.id)?.call(vm, &args)
            }
            ExprKind::Unary { value, .. } => {
                let args = [self.eval_expr(vm, value)?];
                self.t.opimpl(expr.id)?.call(vm, &args)
            }
            ExprKind::GetItem { value, index } => {
                let args = [self.eval_expr(vm, value)?, self.eval_expr(vm, index)?];
                self.t.opimpl(expr.id)?.call(vm, &args)
            }
            ExprKind::GetAttr { value, attr } => {
                let args = [self.eval_expr(vm, value)?, Value::str(&attr.name)];
                self.t.opimpl(expr.id)?.call(vm, &args)
            }
            ExprKind::Call { func, args } => {
                if self.t.is_static_type_call(func) {
                    let (_, ty) = match args.as_slice() {
                        [arg] => self.t.check_expr(vm, arg)?,
                        _ => return Err(ChromaError::panic("bad STATIC_TYPE call", &expr.loc)),
                    };
                    return Ok(Value::Type(ty));
                }
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.eval_expr(vm, func)?);
                for arg in args {
                    values.push(self.eval_expr(vm, arg)?);
                }
                self.t.opimpl(expr.id)?.call(vm, &values)
            }
            ExprKind::CallMethod { target, method, args } => {
                let mut values = Vec::with_capacity(args.len() + 2);
                values.push(self.eval_expr(vm, target)?);
                values.push(Value::str(&method.name));
                for arg in args {
                    values.push(self.eval_expr(vm, arg)?);
                }
                self.t.opimpl(expr.id)?.call(vm, &values)
            }
            ExprKind::List(items) => {
                let (_, ty) = self.t.check_expr(vm, expr)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(vm, item)?);
                }
                Ok(Value::List(Rc::new(ListObj {
                    ty,
                    items: RefCell::new(values),
                })))
            }
            ExprKind::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(vm, item)?);
                }
                Ok(Value::Tuple(Rc::from(values)))
            }
        }
    }
}

pub(crate) fn constant_value(c: &Constant, loc: &Loc) -> Result<Value, ChromaError> {
    Ok(match c {
        Constant::None => Value::None,
        Constant::Int(v) => Value::I32(
            i32::try_from(*v).map_err(|_| ChromaError::panic("integer literal out of range", loc))?,
        ),
        Constant::Float(v) => Value::F64(*v),
        Constant::Bool(v) => Value::Bool(*v),
        Constant::Str(s) => Value::str(s),
    })
}
