#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::rc::Rc;

use chroma_ast::{Color, Constant, Expr, ExprKind, Fqn, Stmt, StmtKind};
use chroma_core::{Func, FuncRef, SymTable, TypeRef, Value, Vm};
use tracing::debug;

use crate::context::{CBackendError, CContext, declare};
use crate::runtime::{RUNTIME_MODULES, emit_runtime_h};

pub struct CArtifacts {
    pub runtime_h: String,
    pub module_c: String,
}

/// Emit C for the red part of module `modname`. Every red function of the
/// module must have been redshifted first.
pub fn emit_module(vm: &Vm, modname: &str) -> Result<CArtifacts, CBackendError> {
    let mut emitter = ModuleEmitter {
        ctx: CContext::new(vm),
        modname,
        strings: Vec::new(),
        externs: BTreeMap::new(),
    };
    let module_c = emitter.emit()?;
    Ok(CArtifacts {
        runtime_h: emit_runtime_h(),
        module_c,
    })
}

/// Runtime functions the header defines, or that are emitted inline.
fn runtime_provides(fqn: &Fqn) -> bool {
    match fqn.modname() {
        "builtins" => matches!(
            fqn.attr(),
            "abs" | "print_i32" | "print_f64" | "print_bool" | "print_str" | "print_void"
        ),
        "operator" => infix_op(fqn).is_some() || unary_op(fqn).is_some() || matches!(
            fqn.attr(),
            "i32_div" | "f64_div" | "i32_to_f64" | "str_add" | "str_mul" | "str_eq" | "str_ne"
        ),
        "rawbuffer" => matches!(
            fqn.attr(),
            "rb_alloc" | "rb_get_i32" | "rb_set_i32" | "rb_get_f64" | "rb_set_f64"
        ),
        _ => false,
    }
}

fn infix_op(fqn: &Fqn) -> Option<&'static str> {
    if fqn.modname() != "operator" {
        return None;
    }
    let (ty, op) = fqn.attr().split_once('_')?;
    if !matches!(ty, "i32" | "f64" | "bool") {
        return None;
    }
    let token = match op {
        "eq" => "==",
        "ne" => "!=",
        _ if ty == "bool" => return None,
        "add" => "+",
        "sub" => "-",
        "mul" => "*",
        "lt" => "<",
        "le" => "<=",
        "gt" => ">",
        "ge" => ">=",
        _ => return None,
    };
    Some(token)
}

fn unary_op(fqn: &Fqn) -> Option<&'static str> {
    if fqn.modname() != "operator" {
        return None;
    }
    match fqn.attr() {
        "i32_neg" | "f64_neg" => Some("-"),
        "i32_pos" | "f64_pos" => Some("+"),
        "i32_invert" => Some("~"),
        "bool_not" => Some("!"),
        _ => None,
    }
}

fn c_escape_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(char::from(b)),
            // octal escapes never swallow the following characters
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

fn i32_literal(v: i64) -> Result<String, CBackendError> {
    let v = i32::try_from(v).map_err(|_| CBackendError::new(format!("integer constant {v} does not fit in `i32`")))?;
    Ok(match v {
        i32::MIN => "INT32_MIN".to_string(),
        v if v < 0 => format!("({v})"),
        v => v.to_string(),
    })
}

fn f64_literal(v: f64) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY".to_string() } else { "(-INFINITY)".to_string() }
    } else if v < 0.0 {
        format!("({v:?})")
    } else {
        format!("{v:?}")
    }
}

struct ModuleEmitter<'vm, 'm> {
    ctx: CContext<'vm>,
    modname: &'m str,
    /// Contents of the static `chroma_Str` literals, by index.
    strings: Vec<String>,
    /// Prototypes of functions from other modules, by C name.
    externs: BTreeMap<String, String>,
}

impl ModuleEmitter<'_, '_> {
    fn vm(&self) -> &Vm {
        self.ctx.vm
    }

    fn emit(&mut self) -> Result<String, CBackendError> {
        let items = self.vm().module_items(self.modname);
        let scope = self.vm().module_scope(self.modname);

        let mut globals = String::new();
        let mut protos = String::new();
        let mut defs = String::new();
        let mut nfuncs = 0;
        for (fqn, value) in &items {
            match value {
                Value::Func(func) => {
                    if func.qn.modname != self.modname || func.is_blue() || func.as_ast().is_none() {
                        continue;
                    }
                    if !func.is_redshifted() {
                        return Err(CBackendError::new(format!(
                            "function `{}` must be redshifted before emitting C",
                            func.qn
                        )));
                    }
                    protos.push_str(&self.ctx.c_function_proto(fqn, func.functype())?);
                    protos.push_str(";\n");
                    defs.push_str(&self.emit_function(fqn, func)?);
                    defs.push('\n');
                    nfuncs += 1;
                }
                _ => {
                    let red = scope
                        .as_ref()
                        .and_then(|s| s.lookup(fqn.attr()))
                        .is_some_and(|sym| sym.color == Color::Red);
                    if red {
                        globals.push_str(&self.emit_global(fqn, value)?);
                    }
                }
            }
        }

        let mut out = String::new();
        out.push_str(&format!("// module `{}`\n", self.modname));
        out.push_str("#include \"chroma_runtime.h\"\n\n");
        if !self.strings.is_empty() {
            for (i, s) in self.strings.iter().enumerate() {
                out.push_str(&format!(
                    "static chroma_Str chroma_str_{i} = {{{}, \"{}\"}};\n",
                    s.len(),
                    c_escape_string_literal(s)
                ));
            }
            out.push('\n');
        }
        if !globals.is_empty() {
            out.push_str(&globals);
            out.push('\n');
        }
        for proto in self.externs.values() {
            out.push_str(proto);
            out.push_str(";\n");
        }
        out.push_str(&protos);
        out.push('\n');
        out.push_str(&defs);
        debug!(module = self.modname, functions = nfuncs, strings = self.strings.len(), "emitted C module");
        Ok(out)
    }

    fn emit_global(&mut self, fqn: &Fqn, value: &Value) -> Result<String, CBackendError> {
        let ty = self
            .vm()
            .global_type(fqn)
            .unwrap_or_else(|| self.vm().dynamic_type(value));
        let ctype = self.ctx.w2c(&ty)?;
        let init = match value {
            Value::I32(v) => i32_literal(i64::from(*v))?,
            Value::F64(v) => f64_literal(*v),
            Value::Bool(v) => v.to_string(),
            Value::Str(s) => self.str_literal(s),
            other => {
                return Err(CBackendError::new(format!(
                    "cannot emit the initial value {other:?} of `{fqn}`"
                )));
            }
        };
        Ok(format!("{} = {init};\n", declare(ctype, &fqn.c_name())))
    }

    fn str_literal(&mut self, s: &str) -> String {
        let i = match self.strings.iter().position(|known| known == s) {
            Some(i) => i,
            None => {
                self.strings.push(s.to_string());
                self.strings.len() - 1
            }
        };
        format!("&chroma_str_{i}")
    }

    fn emit_function(&mut self, fqn: &Fqn, func: &FuncRef) -> Result<String, CBackendError> {
        let Some(ast) = func.as_ast() else {
            return Err(CBackendError::new(format!("`{}` is not an AST function", func.qn)));
        };
        let funcdef = ast.funcdef.clone();
        let symtable = self
            .vm()
            .symtable_for(&funcdef)
            .map_err(|e| CBackendError::new(e.to_string()))?;
        let sig = func.functype();
        let mut f = FuncEmitter {
            m: self,
            func: func.clone(),
            symtable,
            locals_types: ast.locals_types.clone().unwrap_or_default(),
            returns_void: false,
            out: String::new(),
        };
        f.returns_void = f.m.ctx.is_void(&sig.restype);

        f.out.push_str(&f.m.ctx.c_function_proto(fqn, sig)?);
        f.out.push_str(" {\n");
        for (name, ty) in &f.locals_types {
            let is_param = funcdef.args.iter().any(|a| &a.name == name);
            if is_param || name == "@return" || f.m.ctx.is_void(ty) {
                continue;
            }
            let ctype = f.m.ctx.w2c(ty)?;
            f.out.push_str(&format!("  {};\n", declare(ctype, name)));
        }
        for stmt in &funcdef.body {
            f.stmt(stmt, 1)?;
        }
        if !f.returns_void {
            f.out.push_str("  abort(); /* reached the end of the function without a `return` */\n");
        }
        f.out.push_str("}\n");
        Ok(f.out)
    }
}

struct FuncEmitter<'e, 'vm, 'm> {
    m: &'e mut ModuleEmitter<'vm, 'm>,
    func: Rc<Func>,
    symtable: Rc<SymTable>,
    locals_types: BTreeMap<String, TypeRef>,
    returns_void: bool,
    out: String,
}

impl FuncEmitter<'_, '_, '_> {
    fn unsupported(&self, what: &str) -> CBackendError {
        CBackendError::new(format!("cannot emit {what} to C (in `{}`)", self.func.qn))
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn is_none(expr: &Expr) -> bool {
        matches!(expr.kind, ExprKind::Constant(Constant::None))
    }

    fn stmt(&mut self, stmt: &Stmt, depth: usize) -> Result<(), CBackendError> {
        match &stmt.kind {
            StmtKind::Pass | StmtKind::VarDef(_) => {}
            StmtKind::Return(value) => {
                if self.returns_void {
                    if !Self::is_none(value) {
                        let e = self.expr(value)?;
                        self.line(depth, &format!("{e};"));
                    }
                    self.line(depth, "return;");
                } else {
                    let e = self.expr(value)?;
                    self.line(depth, &format!("return {e};"));
                }
            }
            StmtKind::Assign { target, value } => {
                let void_local = self
                    .locals_types
                    .get(&target.name)
                    .is_some_and(|ty| self.m.ctx.is_void(ty));
                let e = self.expr_or_none(value)?;
                match (void_local, e) {
                    (true, Some(e)) => self.line(depth, &format!("{e};")),
                    (true, None) => {}
                    (false, Some(e)) => {
                        let name = self.name(&target.name);
                        self.line(depth, &format!("{name} = {e};"));
                    }
                    (false, None) => return Err(self.unsupported("`None` outside of a `void` position")),
                }
            }
            StmtKind::StmtExpr(value) => {
                if let Some(e) = self.expr_or_none(value)? {
                    self.line(depth, &format!("{e};"));
                }
            }
            StmtKind::If {
                test,
                then_body,
                else_body,
            } => {
                let test = self.expr(test)?;
                self.line(depth, &format!("if ({test}) {{"));
                for s in then_body {
                    self.stmt(s, depth + 1)?;
                }
                if !else_body.is_empty() {
                    self.line(depth, "} else {");
                    for s in else_body {
                        self.stmt(s, depth + 1)?;
                    }
                }
                self.line(depth, "}");
            }
            StmtKind::While { test, body } => {
                let test = self.expr(test)?;
                self.line(depth, &format!("while ({test}) {{"));
                for s in body {
                    self.stmt(s, depth + 1)?;
                }
                self.line(depth, "}");
            }
            StmtKind::UnpackAssign { .. } => return Err(self.unsupported("unpacking")),
            StmtKind::SetAttr { .. } | StmtKind::SetItem { .. } => {
                return Err(self.unsupported("unresolved stores"));
            }
            StmtKind::FuncDef(_) => return Err(self.unsupported("nested functions")),
        }
        Ok(())
    }

    /// Locals keep their name, globals use their C name.
    fn name(&self, name: &str) -> String {
        match self.symtable.lookup(name) {
            Some(sym) if !sym.is_local() => match sym.fqn {
                Some(fqn) => fqn.c_name(),
                None => name.to_string(),
            },
            _ => name.to_string(),
        }
    }

    /// `None` for the `None` constant, which has no C representation.
    fn expr_or_none(&mut self, expr: &Expr) -> Result<Option<String>, CBackendError> {
        if Self::is_none(expr) {
            Ok(None)
        } else {
            self.expr(expr).map(Some)
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<String, CBackendError> {
        match &expr.kind {
            ExprKind::Constant(c) => match c {
                Constant::None => Err(self.unsupported("`None` outside of a `void` position")),
                Constant::Int(v) => i32_literal(*v),
                Constant::Float(v) => Ok(f64_literal(*v)),
                Constant::Bool(v) => Ok(v.to_string()),
                Constant::Str(s) => Ok(self.m.str_literal(s)),
            },
            ExprKind::Name(name) => Ok(self.name(name)),
            ExprKind::FqnConst(fqn) => match self.m.vm().lookup_global(fqn) {
                Some(Value::Func(func)) => {
                    self.declare_callee(fqn, &func)?;
                    Ok(fqn.c_name())
                }
                _ => Err(self.unsupported(&format!("a reference to `{fqn}`"))),
            },
            ExprKind::Call { func, args } => {
                let ExprKind::FqnConst(target) = &func.kind else {
                    return Err(self.unsupported("indirect calls"));
                };
                self.call(target, args)
            }
            _ => Err(self.unsupported("this expression")),
        }
    }

    fn call(&mut self, target: &Fqn, args: &[Expr]) -> Result<String, CBackendError> {
        if let (Some(token), [l, r]) = (infix_op(target), args) {
            let l = self.expr(l)?;
            let r = self.expr(r)?;
            return Ok(format!("({l} {token} {r})"));
        }
        if let (Some(token), [v]) = (unary_op(target), args) {
            let v = self.expr(v)?;
            return Ok(format!("({token}{v})"));
        }
        if let ("operator", "i32_to_f64", [v]) = (target.modname(), target.attr(), args) {
            let v = self.expr(v)?;
            return Ok(format!("((double){v})"));
        }

        let func = match self.m.vm().lookup_global(target) {
            Some(Value::Func(func)) => func,
            _ => return Err(self.unsupported(&format!("a call to `{target}`"))),
        };
        self.declare_callee(target, &func)?;
        let params = func.functype().params.clone();
        // void arguments are evaluated for their effects only
        let mut effects = Vec::new();
        let mut cargs = Vec::new();
        for (arg, param) in args.iter().zip(&params) {
            if self.m.ctx.is_void(&param.ty) {
                if let Some(e) = self.expr_or_none(arg)? {
                    effects.push(e);
                }
            } else {
                cargs.push(self.expr(arg)?);
            }
        }
        let call = format!("{}({})", target.c_name(), cargs.join(", "));
        if effects.is_empty() {
            Ok(call)
        } else {
            Ok(format!("({}, {call})", effects.join(", ")))
        }
    }

    /// Functions of other modules need a prototype; the runtime header
    /// covers the builtin modules.
    fn declare_callee(&mut self, fqn: &Fqn, func: &Func) -> Result<(), CBackendError> {
        if RUNTIME_MODULES.contains(&fqn.modname()) {
            if runtime_provides(fqn) {
                return Ok(());
            }
            return Err(self.unsupported(&format!("a call to `{fqn}`, the C runtime does not provide it")));
        }
        if fqn.modname() != self.m.modname {
            let proto = self.m.ctx.c_function_proto(fqn, func.functype())?;
            self.m.externs.insert(fqn.c_name(), proto);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_escapes() {
        assert_eq!(c_escape_string_literal("a\"b\\c\n"), "a\\\"b\\\\c\\n");
        assert_eq!(c_escape_string_literal("\u{1}7"), "\\0017");
        assert_eq!(c_escape_string_literal("é"), "\\303\\251");
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(i32_literal(42).expect("i32"), "42");
        assert_eq!(i32_literal(-5).expect("i32"), "(-5)");
        assert_eq!(i32_literal(i64::from(i32::MIN)).expect("i32"), "INT32_MIN");
        assert!(i32_literal(1 << 40).is_err());
        assert_eq!(f64_literal(1.0), "1.0");
        assert_eq!(f64_literal(-0.5), "(-0.5)");
        assert_eq!(f64_literal(f64::INFINITY), "INFINITY");
        assert_eq!(f64_literal(f64::NAN), "NAN");
    }

    #[test]
    fn operator_tables() {
        let op = |attr: &str| Fqn::make_global("operator", attr);
        assert_eq!(infix_op(&op("i32_add")), Some("+"));
        assert_eq!(infix_op(&op("f64_ge")), Some(">="));
        assert_eq!(infix_op(&op("bool_eq")), Some("=="));
        assert_eq!(infix_op(&op("i32_div")), None);
        assert_eq!(infix_op(&op("f64_div")), None);
        assert_eq!(infix_op(&op("str_add")), None);
        assert_eq!(infix_op(&Fqn::make_global("test", "i32_add")), None);
        assert_eq!(unary_op(&op("bool_not")), Some("!"));
        assert!(runtime_provides(&op("i32_div")));
        assert!(!runtime_provides(&op("dynamic_add")));
        assert!(!runtime_provides(&Fqn::make_global("builtins", "print")));
    }
}
