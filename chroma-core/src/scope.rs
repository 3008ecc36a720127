#![forbid(unsafe_code)]

//! Scope analysis: build one `SymTable` per function and one per module.

use std::collections::HashMap;
use std::rc::Rc;

use chroma_ast::{Color, Decl, Expr, Fqn, FuncDef, Ident, Import, Loc, Module, NodeId, Stmt, StmtKind, VarKind};
use tracing::debug;

use crate::error::{ChromaError, ErrorKind};
use crate::symtable::SymTable;
use crate::vm::Vm;

/// Output of the analysis of one module.
pub struct Scopes {
    pub module: Rc<SymTable>,
    pub funcdefs: HashMap<NodeId, Rc<SymTable>>,
}

pub struct ScopeAnalyzer<'a> {
    vm: &'a Vm,
    modname: String,
    module: Rc<SymTable>,
    stack: Vec<Rc<SymTable>>,
    funcdefs: HashMap<NodeId, Rc<SymTable>>,
}

impl<'a> ScopeAnalyzer<'a> {
    /// `builtins` becomes the parent of the module scope.
    pub fn new(vm: &'a Vm, modname: &str, builtins: &Rc<SymTable>) -> Self {
        let module = SymTable::new(modname, Some(builtins));
        Self {
            vm,
            modname: modname.to_string(),
            module: module.clone(),
            stack: vec![module],
            funcdefs: HashMap::new(),
        }
    }

    pub fn analyze(mut self, module: &Module) -> Result<Scopes, ChromaError> {
        for decl in &module.decls {
            self.declare_decl(decl)?;
        }
        debug!(
            modname = %self.modname,
            functions = self.funcdefs.len(),
            "scope analysis done"
        );
        Ok(Scopes {
            module: self.module,
            funcdefs: self.funcdefs,
        })
    }

    fn scope(&self) -> &Rc<SymTable> {
        self.stack.last().unwrap_or(&self.module)
    }

    fn add_name(
        &mut self,
        name: &str,
        color: Color,
        loc: &Loc,
        type_loc: &Loc,
        fqn: Option<Fqn>,
    ) -> Result<(), ChromaError> {
        let scope = self.scope().clone();
        let fqn = match fqn {
            Some(fqn) => Some(fqn),
            None if Rc::ptr_eq(&scope, &self.module) => Some(Fqn::make_global(&self.modname, name)),
            None => None,
        };
        scope.declare(name, color, loc.clone(), type_loc.clone(), fqn)?;
        Ok(())
    }

    fn declare_decl(&mut self, decl: &Decl) -> Result<(), ChromaError> {
        match decl {
            Decl::FuncDef(gf) => self.declare_funcdef(&gf.funcdef),
            Decl::VarDef(gv) => {
                let color = match gv.vardef.kind {
                    VarKind::Var => Color::Red,
                    VarKind::Const => Color::Blue,
                };
                self.add_name(&gv.vardef.name, color, &gv.loc, &gv.vardef.ty.loc, None)
            }
            Decl::Import(imp) => self.declare_import(imp),
        }
    }

    fn declare_import(&mut self, imp: &Import) -> Result<(), ChromaError> {
        if self.vm.lookup_global(&imp.fqn).is_some() {
            return self.add_name(&imp.asname, Color::Blue, &imp.loc, &imp.loc, Some(imp.fqn.clone()));
        }
        let err = ChromaError::new(ErrorKind::Import, format!("cannot import `{}`", imp.fqn.dotted_name()));
        if !self.vm.has_module(imp.fqn.modname()) {
            Err(err.with_error(format!("module `{}` does not exist", imp.fqn.modname()), &imp.loc))
        } else {
            Err(err.with_error(
                format!(
                    "attribute `{}` does not exist in module `{}`",
                    imp.fqn.attr(),
                    imp.fqn.modname()
                ),
                &imp.loc_asname,
            ))
        }
    }

    fn declare_funcdef(&mut self, funcdef: &Rc<FuncDef>) -> Result<(), ChromaError> {
        self.add_name(
            &funcdef.name,
            Color::Blue,
            &funcdef.prototype_loc,
            &funcdef.prototype_loc,
            None,
        )?;
        let inner = SymTable::new(funcdef.name.clone(), Some(self.scope()));
        self.stack.push(inner.clone());
        self.funcdefs.insert(funcdef.id, inner);
        for arg in &funcdef.args {
            self.add_name(&arg.name, funcdef.color, &arg.loc, &arg.ty.loc, None)?;
        }
        let ret_loc = &funcdef.return_type.loc;
        self.add_name("@return", funcdef.color, ret_loc, ret_loc, None)?;
        let res = self.declare_body(&funcdef.body);
        self.stack.pop();
        res
    }

    fn declare_body(&mut self, body: &[Stmt]) -> Result<(), ChromaError> {
        for stmt in body {
            self.declare_stmt(stmt)?;
        }
        Ok(())
    }

    fn declare_stmt(&mut self, stmt: &Stmt) -> Result<(), ChromaError> {
        match &stmt.kind {
            StmtKind::VarDef(vd) => self.add_name(&vd.name, Color::Red, &vd.loc, &vd.ty.loc, None),
            StmtKind::FuncDef(fd) => self.declare_funcdef(fd),
            StmtKind::Assign { target, value } => self.declare_target_maybe(target, value),
            StmtKind::UnpackAssign { targets, value } => {
                for target in targets {
                    self.declare_target_maybe(target, value)?;
                }
                Ok(())
            }
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                self.declare_body(then_body)?;
                self.declare_body(else_body)
            }
            StmtKind::While { body, .. } => self.declare_body(body),
            StmtKind::Pass
            | StmtKind::Return(_)
            | StmtKind::SetAttr { .. }
            | StmtKind::SetItem { .. }
            | StmtKind::StmtExpr(_) => Ok(()),
        }
    }

    /// Assigning to an unknown name declares a red local. The value is the
    /// place where its type comes from.
    fn declare_target_maybe(&mut self, target: &Ident, value: &Expr) -> Result<(), ChromaError> {
        if self.scope().lookup(&target.name).is_none() {
            self.add_name(&target.name, Color::Red, &target.loc, &value.loc, None)?;
        }
        Ok(())
    }
}
