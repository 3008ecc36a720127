#![forbid(unsafe_code)]

use chroma_ast::{BinOp, Color, Constant, Expr, ExprKind, Fqn, FuncDef, Stmt, StmtKind};
use chroma_core::{FuncRef, TypeRef, Value, Vm};
use tracing::debug;

/// How references to globals are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FqnFormat {
    /// Always `` `mod::attr` ``.
    Full,
    /// Like `Full`, but builtins are bare names and `i32`/`f64` operator
    /// calls print as infix operators.
    Short,
    /// Only the attribute name.
    No,
}

const ATOM: u8 = u8::MAX;
const UNARY: u8 = 13;

/// Infix spelling and precedence of the `operator` functions that come from
/// a binary operator.
fn infix_op(fqn: &Fqn) -> Option<(&'static str, u8)> {
    if fqn.modname() != "operator" || !fqn.suffix().is_empty() {
        return None;
    }
    let (ty, op) = fqn.attr().split_once('_')?;
    if !matches!(ty, "i32" | "f64") {
        return None;
    }
    Some(match op {
        "add" => ("+", 11),
        "sub" => ("-", 11),
        "mul" => ("*", 12),
        "div" => ("/", 12),
        "eq" => ("==", 10),
        "ne" => ("!=", 10),
        "lt" => ("<", 10),
        "le" => ("<=", 10),
        "gt" => (">", 10),
        "ge" => (">=", 10),
        _ => return None,
    })
}

fn fmt_constant(c: &Constant) -> String {
    match c {
        Constant::None => "None".to_string(),
        Constant::Int(v) => v.to_string(),
        Constant::Float(v) => format!("{v:?}"),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Str(s) => format!("{s:?}"),
    }
}

pub struct SourceBackend<'vm> {
    vm: &'vm Vm,
    fqn_format: FqnFormat,
    out: String,
    indent: usize,
}

impl<'vm> SourceBackend<'vm> {
    pub fn new(vm: &'vm Vm, fqn_format: FqnFormat) -> Self {
        Self {
            vm,
            fqn_format,
            out: String::new(),
            indent: 0,
        }
    }

    /// Every red AST function defined by `modname`, in definition order.
    /// Functions which were not redshifted print as written.
    pub fn dump_module(mut self, modname: &str) -> String {
        let mut nfuncs = 0;
        for (fqn, value) in self.vm.module_items(modname) {
            let Value::Func(func) = value else { continue };
            if func.qn.modname != modname || func.is_blue() || func.as_ast().is_none() {
                continue;
            }
            self.dump_func(&fqn, &func);
            self.out.push('\n');
            nfuncs += 1;
        }
        debug!(module = modname, functions = nfuncs, "dumped module source");
        self.out
    }

    fn dump_func(&mut self, fqn: &Fqn, func: &FuncRef) {
        let name = if fqn.suffix().is_empty() {
            fqn.attr().to_string()
        } else {
            self.fmt_fqn(fqn)
        };
        let sig = func.functype();
        let params = sig
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, self.fmt_type(&p.ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.fmt_type(&sig.restype);
        self.line(&format!("def {name}({params}) -> {ret}:"));
        if let Some(ast) = func.as_ast() {
            let funcdef = ast.funcdef.clone();
            self.block(&funcdef.body);
        }
    }

    fn fmt_type(&self, ty: &TypeRef) -> String {
        match self.vm.reverse_lookup_global(&Value::Type(ty.clone())) {
            Some(fqn) => self.fmt_fqn(&fqn),
            // list[T] & co. are not registered under their own name
            None => ty.name.clone(),
        }
    }

    fn fmt_fqn(&self, fqn: &Fqn) -> String {
        match self.fqn_format {
            FqnFormat::No => fqn.attr().to_string(),
            FqnFormat::Short if fqn.modname() == "builtins" && fqn.suffix().is_empty() => {
                fqn.attr().to_string()
            }
            _ => format!("`{fqn}`"),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) {
        self.indent += 1;
        if body.is_empty() {
            self.line("pass");
        }
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Pass => self.line("pass"),
            StmtKind::Return(value) => {
                let v = self.expr(value);
                self.line(&format!("return {v}"));
            }
            StmtKind::VarDef(vardef) => {
                let t = self.expr(&vardef.ty);
                self.line(&format!("{}: {t}", vardef.name));
            }
            StmtKind::Assign { target, value } => {
                let v = self.expr(value);
                self.line(&format!("{} = {v}", target.name));
            }
            StmtKind::UnpackAssign { targets, value } => {
                let targets = targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
                let v = self.expr(value);
                self.line(&format!("{targets} = {v}"));
            }
            StmtKind::SetAttr { target, attr, value } => {
                let t = self.atom(target);
                let v = self.expr(value);
                self.line(&format!("{t}.{} = {v}", attr.name));
            }
            StmtKind::SetItem { target, index, value } => {
                let t = self.atom(target);
                let i = self.expr(index);
                let v = self.expr(value);
                self.line(&format!("{t}[{i}] = {v}"));
            }
            StmtKind::If {
                test,
                then_body,
                else_body,
            } => {
                let test = self.expr(test);
                self.line(&format!("if {test}:"));
                self.block(then_body);
                if !else_body.is_empty() {
                    self.line("else:");
                    self.block(else_body);
                }
            }
            StmtKind::While { test, body } => {
                let test = self.expr(test);
                self.line(&format!("while {test}:"));
                self.block(body);
            }
            StmtKind::StmtExpr(value) => {
                let v = self.expr(value);
                self.line(&v);
            }
            StmtKind::FuncDef(funcdef) => self.nested_funcdef(funcdef),
        }
    }

    fn nested_funcdef(&mut self, funcdef: &FuncDef) {
        let params = funcdef
            .args
            .iter()
            .map(|a| format!("{}: {}", a.name, self.expr(&a.ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.expr(&funcdef.return_type);
        if funcdef.color == Color::Blue {
            self.line("@blue");
        }
        self.line(&format!("def {}({params}) -> {ret}:", funcdef.name));
        self.block(&funcdef.body);
    }

    /// The operator a call prints as, if any.
    fn call_as_infix<'e>(&self, expr: &'e Expr) -> Option<(&'static str, u8, &'e Expr, &'e Expr)> {
        if self.fqn_format != FqnFormat::Short {
            return None;
        }
        match &expr.kind {
            ExprKind::Call { func, args } => match (&func.kind, args.as_slice()) {
                (ExprKind::FqnConst(fqn), [l, r]) => {
                    let (op, prec) = infix_op(fqn)?;
                    Some((op, prec, l, r))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn precedence(&self, expr: &Expr) -> u8 {
        match &expr.kind {
            ExprKind::BinOp {
                op: BinOp::Add | BinOp::Sub,
                ..
            } => 11,
            ExprKind::BinOp { .. } => 12,
            ExprKind::CompareOp { .. } => 10,
            ExprKind::Unary { .. } => UNARY,
            ExprKind::Call { .. } => self.call_as_infix(expr).map_or(ATOM, |(_, prec, _, _)| prec),
            _ => ATOM,
        }
    }

    /// `expr`, parenthesized unless it binds tighter than any operator.
    fn atom(&self, expr: &Expr) -> String {
        self.operand(expr, ATOM)
    }

    fn operand(&self, expr: &Expr, min: u8) -> String {
        let s = self.expr(expr);
        if self.precedence(expr) < min { format!("({s})") } else { s }
    }

    /// Operators are left-associative; comparisons do not chain.
    fn infix(&self, op: &str, prec: u8, left: &Expr, right: &Expr) -> String {
        let lmin = if prec == 10 { prec + 1 } else { prec };
        let l = self.operand(left, lmin);
        let r = self.operand(right, prec + 1);
        format!("{l} {op} {r}")
    }

    fn exprs(&self, exprs: &[Expr]) -> String {
        exprs.iter().map(|e| self.expr(e)).collect::<Vec<_>>().join(", ")
    }

    fn expr(&self, expr: &Expr) -> String {
        if let Some((op, prec, l, r)) = self.call_as_infix(expr) {
            return self.infix(op, prec, l, r);
        }
        match &expr.kind {
            ExprKind::Constant(c) => fmt_constant(c),
            ExprKind::Name(name) => name.clone(),
            ExprKind::Auto => "auto".to_string(),
            ExprKind::FqnConst(fqn) => self.fmt_fqn(fqn),
            ExprKind::GetAttr { value, attr } => format!("{}.{}", self.atom(value), attr.name),
            ExprKind::GetItem { value, index } => format!("{}[{}]", self.atom(value), self.expr(index)),
            ExprKind::List(items) => format!("[{}]", self.exprs(items)),
            ExprKind::Tuple(items) if items.len() == 1 => format!("({},)", self.expr(&items[0])),
            ExprKind::Tuple(items) => format!("({})", self.exprs(items)),
            ExprKind::BinOp { op, left, right } => {
                let prec = self.precedence(expr);
                self.infix(op.token(), prec, left, right)
            }
            ExprKind::CompareOp { op, left, right } => self.infix(op.token(), 10, left, right),
            ExprKind::Call { func, args } => format!("{}({})", self.atom(func), self.exprs(args)),
            ExprKind::CallMethod { target, method, args } => {
                format!("{}.{}({})", self.atom(target), method.name, self.exprs(args))
            }
            ExprKind::Unary { op, value } => format!("{}{}", op.token(), self.operand(value, UNARY)),
        }
    }
}
