#![forbid(unsafe_code)]

use std::rc::Rc;

use chroma_ast::{Constant, Expr, ExprKind, Fqn, Loc, Stmt, StmtKind};
use chroma_core::{ChromaError, SymTable, Value, Vm};
use tracing::debug;

use crate::code::{CodeObject, OpCode};

fn cannot_lower(what: &str, qn: &str, loc: &Loc) -> ChromaError {
    ChromaError::type_error(
        format!("cannot lower {what} to bytecode"),
        format!("in `{qn}`"),
        loc,
    )
}

/// Lower the redshifted function registered as `fqn`.
///
/// Only straight-line bodies are supported: `pass`, local declarations,
/// assignments, expression statements and `return`. Calls to the `i32`
/// arithmetic operators become opcodes, every other call is a `call`.
pub fn lower_function(vm: &Vm, fqn: &Fqn) -> Result<CodeObject, ChromaError> {
    let func = match vm.lookup_global(fqn) {
        Some(Value::Func(f)) => f,
        _ => {
            return Err(ChromaError::new(
                chroma_core::ErrorKind::Name,
                format!("`{fqn}` is not a function"),
            ));
        }
    };
    let qn = func.qn.to_string();
    let (Some(ast), true) = (func.as_ast(), func.is_redshifted()) else {
        return Err(cannot_lower(
            "functions that are not redshifted",
            &qn,
            &Loc::fake(),
        ));
    };
    let funcdef = ast.funcdef.clone();
    let mut lowerer = Lowerer {
        qn: qn.clone(),
        symtable: vm.symtable_for(&funcdef)?,
        code: Vec::new(),
    };
    for stmt in &funcdef.body {
        lowerer.stmt(stmt)?;
    }
    // void and dynamic functions return None when they fall off their end
    let restype = &func.functype().restype;
    if !matches!(lowerer.code.last(), Some(OpCode::Return)) && (restype.is_void() || restype.is_dynamic()) {
        lowerer.code.push(OpCode::ConstLoad(Value::None));
        lowerer.code.push(OpCode::Return);
    }
    debug!(func = %qn, ops = lowerer.code.len(), "lowered to bytecode");
    let params = funcdef.args.iter().map(|a| a.name.clone()).collect();
    let locals_types = ast.locals_types.clone().unwrap_or_default();
    Ok(CodeObject::new(qn, params, lowerer.code)
        .with_locals_types(locals_types)
        .with_loc(funcdef.loc.clone()))
}

struct Lowerer {
    qn: String,
    symtable: Rc<SymTable>,
    code: Vec<OpCode>,
}

impl Lowerer {
    fn stmt(&mut self, stmt: &Stmt) -> Result<(), ChromaError> {
        match &stmt.kind {
            StmtKind::Pass | StmtKind::VarDef(_) => {}
            StmtKind::Return(value) => {
                self.expr(value)?;
                self.code.push(OpCode::Return);
            }
            StmtKind::Assign { target, value } => {
                self.expr(value)?;
                let op = match self.global_fqn(&target.name) {
                    Some(fqn) => OpCode::GlobalSet(fqn),
                    None => OpCode::LocalSet(target.name.clone()),
                };
                self.code.push(op);
            }
            StmtKind::StmtExpr(value) => {
                self.expr(value)?;
                self.code.push(OpCode::Pop);
            }
            StmtKind::If { .. } | StmtKind::While { .. } => {
                return Err(cannot_lower("control flow", &self.qn, &stmt.loc));
            }
            StmtKind::UnpackAssign { .. } => return Err(cannot_lower("unpacking", &self.qn, &stmt.loc)),
            StmtKind::SetAttr { .. } | StmtKind::SetItem { .. } => {
                return Err(cannot_lower("unresolved stores", &self.qn, &stmt.loc));
            }
            StmtKind::FuncDef(_) => {
                return Err(cannot_lower("nested functions", &self.qn, &stmt.loc));
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), ChromaError> {
        match &expr.kind {
            ExprKind::Constant(c) => {
                let v = match c {
                    Constant::None => Value::None,
                    Constant::Int(v) => Value::I32(i32::try_from(*v).map_err(|_| {
                        ChromaError::type_error("integer constant out of range", "does not fit in `i32`", &expr.loc)
                    })?),
                    Constant::Float(v) => Value::F64(*v),
                    Constant::Bool(v) => Value::Bool(*v),
                    Constant::Str(s) => Value::str(s),
                };
                self.code.push(OpCode::ConstLoad(v));
            }
            ExprKind::Name(name) => {
                let op = match self.global_fqn(name) {
                    Some(fqn) => OpCode::GlobalGet(fqn),
                    None => OpCode::LocalGet(name.clone()),
                };
                self.code.push(op);
            }
            ExprKind::FqnConst(fqn) => self.code.push(OpCode::GlobalGet(fqn.clone())),
            ExprKind::Call { func, args } => {
                let ExprKind::FqnConst(target) = &func.kind else {
                    return Err(cannot_lower("indirect calls", &self.qn, &expr.loc));
                };
                for arg in args {
                    self.expr(arg)?;
                }
                let op = match (target.modname(), target.attr()) {
                    ("operator", "i32_add") => OpCode::I32Add,
                    ("operator", "i32_sub") => OpCode::I32Sub,
                    ("operator", "i32_mul") => OpCode::I32Mul,
                    _ => OpCode::Call(target.clone(), args.len()),
                };
                self.code.push(op);
            }
            _ => return Err(cannot_lower("this expression", &self.qn, &expr.loc)),
        }
        Ok(())
    }

    /// Names of a redshifted body are either locals or globals.
    fn global_fqn(&self, name: &str) -> Option<Fqn> {
        self.symtable.lookup(name).and_then(|sym| if sym.is_local() { None } else { sym.fqn })
    }
}
