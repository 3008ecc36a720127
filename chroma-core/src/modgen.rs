#![forbid(unsafe_code)]

//! Module import: scope analysis, then execution of the top-level
//! declarations in a blue module frame.

use std::rc::Rc;

use chroma_ast::{Color, Constant, Decl, Expr, ExprKind, Fqn, FuncDef, GlobalFuncDef, GlobalVarDef, Loc, Module, NodeId, Qn};
use tracing::{debug, info};

use crate::astframe::AstFrame;
use crate::error::ChromaError;
use crate::function::Namespace;
use crate::object::Value;
use crate::opimpl::Operand;
use crate::scope::ScopeAnalyzer;
use crate::typecheck::convert_type_maybe;
use crate::vm::Vm;

const INIT: &str = "__INIT__";

impl Vm {
    /// Analyze and execute `module`, registering its globals under
    /// `modname`. A blue `__INIT__(mod)` function, if present, runs last.
    pub fn import_module(&mut self, modname: &str, module: &Module) -> Result<(), ChromaError> {
        info!(modname, filename = %module.filename, "importing module");
        self.register_module(modname, &module.filename)?;
        let builtins = self.builtins_scope();
        let scopes = ScopeAnalyzer::new(self, modname, &builtins).analyze(module)?;

        let loc = Loc::new(module.filename.clone(), 1, 1, 0, 0);
        let funcdef = Rc::new(FuncDef {
            id: NodeId::fresh(),
            loc: loc.clone(),
            prototype_loc: loc.clone(),
            color: Color::Blue,
            name: "@module".to_string(),
            args: Vec::new(),
            return_type: Expr::new(loc, ExprKind::Constant(Constant::None)),
            body: Vec::new(),
        });
        self.set_symtable(funcdef.id, scopes.module.clone());
        self.add_scopes(modname, scopes.module, scopes.funcdefs);

        let void = self.b.void.clone();
        let functype = self.functype(Color::Blue, Vec::new(), void);
        let modfunc = self.new_ast_func(Qn::new(modname, "@module"), functype, funcdef, Vec::new(), None)?;
        let mut frame = AstFrame::new(self, modfunc)?;

        for decl in &module.decls {
            match decl {
                Decl::FuncDef(gf) => self.gen_global_funcdef(&mut frame, modname, gf)?,
                Decl::VarDef(gv) => self.gen_global_vardef(&mut frame, modname, gv)?,
                // resolved by the scope analysis
                Decl::Import(_) => {}
            }
        }

        if let Some(Value::Func(init)) = self.lookup_global(&Fqn::make_global(modname, INIT)) {
            debug!(modname, "running __INIT__");
            self.call(&init, &[Value::Module(Rc::from(modname))])?;
        }
        Ok(())
    }

    fn gen_global_funcdef(&mut self, frame: &mut AstFrame, modname: &str, gf: &GlobalFuncDef) -> Result<(), ChromaError> {
        let funcdef = &gf.funcdef;
        if funcdef.name == INIT && funcdef.color != Color::Blue {
            return Err(ChromaError::type_error(
                "the `__INIT__` function must be `@blue`",
                "function defined here",
                &funcdef.prototype_loc,
            ));
        }
        let functype = frame.eval_functype(self, funcdef)?;
        let closure = vec![Rc::new(Namespace::new())];
        let func = self.new_ast_func(Qn::new(modname, funcdef.name.clone()), functype, funcdef.clone(), closure, None)?;
        self.add_global(Fqn::make_global(modname, funcdef.name.clone()), None, Value::Func(func))
    }

    fn gen_global_vardef(&mut self, frame: &mut AstFrame, modname: &str, gv: &GlobalVarDef) -> Result<(), ChromaError> {
        let vardef = &gv.vardef;
        let (_, static_type) = frame.t.check_expr(self, &gv.value)?;
        let mut value = frame.eval_expr(self, &gv.value)?;
        let ty = if vardef.ty.is_auto() {
            static_type
        } else {
            let ty = frame.eval_expr_type(self, &vardef.ty)?;
            let operand = Operand::new("v", 0, static_type, gv.value.loc.clone());
            if let Some(conv) = convert_type_maybe(self, &operand, &ty)? {
                value = conv.convert(self, value, &gv.value.loc)?;
            }
            ty
        };
        self.add_global(Fqn::make_global(modname, vardef.name.clone()), Some(ty), value)
    }
}
