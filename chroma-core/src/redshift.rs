#![forbid(unsafe_code)]

//! Redshift: specialize a red function by running its blue parts.
//!
//! The body is walked statement by statement, typechecking as the
//! interpreter would. Every blue expression is evaluated and replaced by its
//! value, every operation is replaced by a call to the function that
//! implements it, and implicit numeric conversions become explicit calls.
//! The result is an AST function whose body only contains red code and
//! constants, together with the concrete type of each local.

use std::collections::HashSet;
use std::rc::Rc;

use chroma_ast::{Color, Constant, Expr, ExprKind, Fqn, FuncDef, Loc, Qn, Stmt, StmtKind, VarDef};
use tracing::debug;

use crate::astframe::AstFrame;
use crate::error::{ChromaError, ErrorKind};
use crate::function::{FuncKind, FuncRef};
use crate::object::Value;
use crate::opimpl::OpCall;
use crate::vm::Vm;

/// Redshift `func`, returning the specialized function. The registry is not
/// touched, except for the constants the new body refers to.
pub fn redshift(vm: &mut Vm, func: &FuncRef) -> Result<FuncRef, ChromaError> {
    let Some(ast) = func.as_ast() else {
        return Err(ChromaError::new(
            ErrorKind::Type,
            format!("cannot redshift builtin function `{}`", func.qn),
        ));
    };
    if func.is_redshifted() {
        return Err(ChromaError::new(
            ErrorKind::Type,
            format!("function `{}` has already been redshifted", func.qn),
        ));
    }
    debug!(func = %func.qn, "redshift begin");
    let closure = ast.closure.clone();
    let funcdef = ast.funcdef.clone();
    let mut doppler = FuncDoppler::new(vm, func.clone())?;
    let body = doppler.shift_body(vm, &funcdef.body)?;
    let new_funcdef = FuncDef {
        body,
        ..FuncDef::clone(&funcdef)
    };
    let locals_types = doppler.frame.t.locals_types.clone();
    let new_func = vm.new_ast_func(
        func.qn.clone(),
        func.ty.clone(),
        Rc::new(new_funcdef),
        closure,
        Some(locals_types),
    )?;
    debug!(func = %func.qn, "redshift end");
    Ok(new_func)
}

impl Vm {
    /// Redshift every red AST function in the registry, including the ones
    /// which appear while redshifting others, and replace them in place.
    pub fn redshift_all(&mut self) -> Result<(), ChromaError> {
        let mut seen: HashSet<Fqn> = HashSet::new();
        loop {
            let todo: Vec<(Fqn, FuncRef)> = self
                .globals()
                .into_iter()
                .filter_map(|(fqn, v)| match v {
                    Value::Func(f) if is_redshiftable(&f) && !seen.contains(&fqn) => Some((fqn, f)),
                    _ => None,
                })
                .collect();
            if todo.is_empty() {
                return Ok(());
            }
            for (fqn, func) in todo {
                let new_func = redshift(self, &func)?;
                self.replace_global(&fqn, Value::Func(new_func));
                seen.insert(fqn);
            }
        }
    }
}

fn is_redshiftable(func: &FuncRef) -> bool {
    func.as_ast().is_some() && func.color() == Color::Red && !func.is_redshifted()
}

struct FuncDoppler {
    func: FuncRef,
    frame: AstFrame,
}

impl FuncDoppler {
    fn new(vm: &Vm, func: FuncRef) -> Result<Self, ChromaError> {
        let frame = AstFrame::new(vm, func.clone())?;
        Ok(Self { func, frame })
    }

    fn modname(&self) -> String {
        self.func.qn.modname.clone()
    }

    fn shift_body(&mut self, vm: &mut Vm, body: &[Stmt]) -> Result<Vec<Stmt>, ChromaError> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            out.push(self.shift_stmt(vm, stmt)?);
        }
        Ok(out)
    }

    fn shift_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> Result<Stmt, ChromaError> {
        self.frame.t.check_stmt(vm, stmt)?;
        let kind = match &stmt.kind {
            StmtKind::Pass => StmtKind::Pass,
            StmtKind::Return(value) => StmtKind::Return(self.shift_expr(vm, value)?),
            StmtKind::VarDef(vardef) => StmtKind::VarDef(self.shift_vardef(vm, vardef)?),
            StmtKind::Assign { target, value } => StmtKind::Assign {
                target: target.clone(),
                value: self.shift_expr(vm, value)?,
            },
            StmtKind::UnpackAssign { targets, value } => StmtKind::UnpackAssign {
                targets: targets.clone(),
                value: self.shift_expr(vm, value)?,
            },
            StmtKind::SetAttr { target, attr, value } => {
                let orig = vec![
                    self.shift_expr(vm, target)?,
                    str_const(&attr.name, &attr.loc),
                    self.shift_expr(vm, value)?,
                ];
                let opcall = self.frame.t.opimpl(stmt.id)?;
                StmtKind::StmtExpr(self.shift_opcall(vm, &opcall, orig, &stmt.loc)?)
            }
            StmtKind::SetItem { target, index, value } => {
                let orig = vec![
                    self.shift_expr(vm, target)?,
                    self.shift_expr(vm, index)?,
                    self.shift_expr(vm, value)?,
                ];
                let opcall = self.frame.t.opimpl(stmt.id)?;
                StmtKind::StmtExpr(self.shift_opcall(vm, &opcall, orig, &stmt.loc)?)
            }
            StmtKind::If {
                test,
                then_body,
                else_body,
            } => StmtKind::If {
                test: self.shift_expr(vm, test)?,
                then_body: self.shift_body(vm, then_body)?,
                else_body: self.shift_body(vm, else_body)?,
            },
            StmtKind::While { test, body } => StmtKind::While {
                test: self.shift_expr(vm, test)?,
                body: self.shift_body(vm, body)?,
            },
            StmtKind::StmtExpr(value) => StmtKind::StmtExpr(self.shift_expr(vm, value)?),
            StmtKind::FuncDef(funcdef) => {
                return Err(ChromaError::type_error(
                    "cannot redshift nested function definitions",
                    "defined inside a red function",
                    &funcdef.prototype_loc,
                ));
            }
        };
        Ok(Stmt::new(stmt.loc.clone(), kind))
    }

    /// The declared type becomes a constant; `auto` stays `auto`, its type
    /// is recorded in the locals types once the first assignment is seen.
    fn shift_vardef(&mut self, vm: &mut Vm, vardef: &VarDef) -> Result<VarDef, ChromaError> {
        self.frame.exec_vardef(vm, vardef)?;
        if vardef.ty.is_auto() {
            return Ok(vardef.clone());
        }
        let ty = self.frame.eval_expr_type(vm, &vardef.ty)?;
        Ok(VarDef {
            ty: make_const(vm, &self.modname(), Value::Type(ty), &vardef.ty.loc)?,
            ..vardef.clone()
        })
    }

    fn shift_expr(&mut self, vm: &mut Vm, expr: &Expr) -> Result<Expr, ChromaError> {
        let (color, _) = self.frame.t.check_expr(vm, expr)?;
        if color == Color::Blue {
            // the conversion, if any, is already applied to the value
            let value = self.frame.eval_expr(vm, expr)?;
            return make_const(vm, &self.modname(), value, &expr.loc);
        }
        let shifted = self.shift_red_expr(vm, expr)?;
        Ok(match self.frame.t.expr_conv(expr.id) {
            Some(conv) => conv.redshift(shifted),
            None => shifted,
        })
    }

    fn shift_red_expr(&mut self, vm: &mut Vm, expr: &Expr) -> Result<Expr, ChromaError> {
        let orig = match &expr.kind {
            ExprKind::Name(_) | ExprKind::FqnConst(_) | ExprKind::Constant(_) | ExprKind::Auto => {
                return Ok(expr.clone());
            }
            ExprKind::List(items) => {
                let items = self.shift_exprs(vm, items)?;
                return Ok(Expr::new(expr.loc.clone(), ExprKind::List(items)));
            }
            ExprKind::Tuple(items) => {
                let items = self.shift_exprs(vm, items)?;
                return Ok(Expr::new(expr.loc.clone(), ExprKind::Tuple(items)));
            }
            ExprKind::BinOp { left, right, .. } | ExprKind::CompareOp { left, right, .. } => {
                vec![self.shift_expr(vm, left)?, self.shift_expr(vm, right)?]
            }
            ExprKind::Unary { value, .. } => vec![self.shift_expr(vm, value)?],
            ExprKind::GetItem { value, index } => {
                vec![self.shift_expr(vm, value)?, self.shift_expr(vm, index)?]
            }
            ExprKind::GetAttr { value, attr } => {
                vec![self.shift_expr(vm, value)?, str_const(&attr.name, &attr.loc)]
            }
            ExprKind::Call { func, args } => {
                let mut orig = vec![self.shift_expr(vm, func)?];
                orig.extend(self.shift_exprs(vm, args)?);
                orig
            }
            ExprKind::CallMethod { target, method, args } => {
                let mut orig = vec![self.shift_expr(vm, target)?, str_const(&method.name, &method.loc)];
                orig.extend(self.shift_exprs(vm, args)?);
                orig
            }
        };
        let opcall = self.frame.t.opimpl(expr.id)?;
        self.shift_opcall(vm, &opcall, orig, &expr.loc)
    }

    fn shift_exprs(&mut self, vm: &mut Vm, exprs: &[Expr]) -> Result<Vec<Expr>, ChromaError> {
        exprs.iter().map(|e| self.shift_expr(vm, e)).collect()
    }

    /// Turn a resolved operation into a call to its implementation.
    fn shift_opcall(&mut self, vm: &mut Vm, opcall: &OpCall, orig: Vec<Expr>, loc: &Loc) -> Result<Expr, ChromaError> {
        let func = if opcall.is_direct_call() {
            match known_callee(vm, &orig) {
                Some(f) => f,
                None => {
                    return Err(ChromaError::type_error(
                        "cannot redshift indirect calls",
                        "the function called here is not known at compile time",
                        loc,
                    ));
                }
            }
        } else {
            opcall.func.clone()
        };
        let func = specialize_print(vm, &func, opcall).unwrap_or(func);
        let callee = make_const(vm, &self.modname(), Value::Func(func), loc)?;
        let args = opcall.redshift_args(&orig)?;
        Ok(Expr::new(
            loc.clone(),
            ExprKind::Call {
                func: Box::new(callee),
                args,
            },
        ))
    }
}

/// The callee of a direct call, if it is known at compile time. Blue callees
/// have already been shifted to a reference to a global.
fn known_callee(vm: &Vm, orig: &[Expr]) -> Option<FuncRef> {
    match &orig.first()?.kind {
        ExprKind::FqnConst(fqn) => vm.lookup_global(fqn).and_then(|v| v.as_func().cloned()),
        _ => None,
    }
}

/// `print(x)` becomes `print_i32(x)` & co. when the static type of `x` is
/// known.
fn specialize_print(vm: &Vm, func: &FuncRef, opcall: &OpCall) -> Option<FuncRef> {
    if func.qn != Qn::new("builtins", "print") || !matches!(func.kind, FuncKind::Builtin(_)) {
        return None;
    }
    let arg = opcall.args.first()?;
    let ty = &arg.static_type;
    let b = &vm.b;
    let name = [
        (&b.i32, "print_i32"),
        (&b.f64, "print_f64"),
        (&b.bool, "print_bool"),
        (&b.str, "print_str"),
        (&b.void, "print_void"),
    ]
    .into_iter()
    .find(|(t, _)| t.is(ty))
    .map(|(_, name)| name)?;
    vm.lookup_global(&Fqn::make_global("builtins", name))
        .and_then(|v| v.as_func().cloned())
}

fn str_const(s: &str, loc: &Loc) -> Expr {
    Expr::new(loc.clone(), ExprKind::Constant(Constant::Str(s.to_string())))
}

/// An expression evaluating to `value`: a literal for scalars and strings, a
/// reference to a global otherwise. Values which are not globals yet are
/// registered under a fresh name.
pub(crate) fn make_const(vm: &mut Vm, modname: &str, value: Value, loc: &Loc) -> Result<Expr, ChromaError> {
    let constant = match &value {
        Value::None => Some(Constant::None),
        Value::I32(v) => Some(Constant::Int(i64::from(*v))),
        Value::F64(v) => Some(Constant::Float(*v)),
        Value::Bool(v) => Some(Constant::Bool(*v)),
        Value::Str(s) => Some(Constant::Str(s.to_string())),
        _ => None,
    };
    if let Some(c) = constant {
        return Ok(Expr::new(loc.clone(), ExprKind::Constant(c)));
    }
    let fqn = match vm.reverse_lookup_global(&value) {
        Some(fqn) => fqn,
        None => {
            let (qn, try_global) = match &value {
                Value::Func(f) => (f.qn.clone(), f.as_ast().is_none()),
                Value::Type(t) => (Qn::new("builtins", t.name.clone()), true),
                _ => (Qn::new(modname, "const"), false),
            };
            let is_global = try_global && vm.lookup_global(&Fqn::make_global(&qn.modname, &qn.attr)).is_none();
            let fqn = vm.get_unique_fqn(&qn, is_global);
            debug!(fqn = %fqn, "new constant");
            vm.add_global(fqn.clone(), None, value)?;
            fqn
        }
    };
    Ok(Expr::new(loc.clone(), ExprKind::FqnConst(fqn)))
}
