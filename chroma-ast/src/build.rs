#![forbid(unsafe_code)]

//! Terse constructors for AST trees, for hosts that synthesize code and for
//! tests. Every node gets `Loc::fake()` unless a `_at` variant is used.

use std::rc::Rc;

use crate::{
    BinOp, CmpOp, Color, Constant, Decl, Expr, ExprKind, Fqn, FuncArg, FuncDef, GlobalFuncDef,
    GlobalVarDef, Ident, Import, Loc, Module, NodeId, Stmt, StmtKind, UnaryOp, VarDef, VarKind,
};

pub fn module(filename: &str, decls: Vec<Decl>) -> Module {
    Module {
        filename: filename.to_string(),
        decls,
    }
}

fn funcdef(color: Color, name: &str, args: &[(&str, Expr)], ret: Expr, body: Vec<Stmt>) -> FuncDef {
    FuncDef {
        id: NodeId::fresh(),
        loc: Loc::fake(),
        prototype_loc: Loc::fake(),
        color,
        name: name.to_string(),
        args: args
            .iter()
            .map(|(n, ty)| FuncArg {
                loc: Loc::fake(),
                name: n.to_string(),
                ty: ty.clone(),
            })
            .collect(),
        return_type: ret,
        body,
    }
}

pub fn red_func(name: &str, args: &[(&str, Expr)], ret: Expr, body: Vec<Stmt>) -> FuncDef {
    funcdef(Color::Red, name, args, ret, body)
}

pub fn blue_func(name: &str, args: &[(&str, Expr)], ret: Expr, body: Vec<Stmt>) -> FuncDef {
    funcdef(Color::Blue, name, args, ret, body)
}

pub fn def(f: FuncDef) -> Decl {
    Decl::FuncDef(GlobalFuncDef {
        loc: f.loc.clone(),
        funcdef: Rc::new(f),
    })
}

fn global_var(kind: VarKind, name: &str, ty: Expr, value: Expr) -> Decl {
    Decl::VarDef(GlobalVarDef {
        loc: Loc::fake(),
        vardef: VarDef {
            loc: Loc::fake(),
            kind,
            name: name.to_string(),
            ty,
        },
        value,
    })
}

pub fn var(name: &str, ty: Expr, value: Expr) -> Decl {
    global_var(VarKind::Var, name, ty, value)
}

pub fn const_(name: &str, ty: Expr, value: Expr) -> Decl {
    global_var(VarKind::Const, name, ty, value)
}

pub fn import(modname: &str, attr: &str, asname: &str) -> Decl {
    Decl::Import(Import {
        loc: Loc::fake(),
        loc_asname: Loc::fake(),
        fqn: Fqn::make_global(modname, attr),
        asname: asname.to_string(),
    })
}

// statements

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(Loc::fake(), kind)
}

pub fn pass() -> Stmt {
    stmt(StmtKind::Pass)
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return(value))
}

pub fn vardef(name: &str, ty: Expr) -> Stmt {
    stmt(StmtKind::VarDef(VarDef {
        loc: Loc::fake(),
        kind: VarKind::Var,
        name: name.to_string(),
        ty,
    }))
}

pub fn assign(target: &str, value: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        target: Ident::new(Loc::fake(), target),
        value,
    })
}

pub fn setattr(target: Expr, attr: &str, value: Expr) -> Stmt {
    stmt(StmtKind::SetAttr {
        target,
        attr: Ident::new(Loc::fake(), attr),
        value,
    })
}

pub fn setitem(target: Expr, index: Expr, value: Expr) -> Stmt {
    stmt(StmtKind::SetItem {
        target,
        index,
        value,
    })
}

pub fn unpack(targets: &[&str], value: Expr) -> Stmt {
    stmt(StmtKind::UnpackAssign {
        targets: targets
            .iter()
            .map(|t| Ident::new(Loc::fake(), *t))
            .collect(),
        value,
    })
}

pub fn if_(test: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::If {
        test,
        then_body,
        else_body,
    })
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While { test, body })
}

pub fn expr_stmt(value: Expr) -> Stmt {
    stmt(StmtKind::StmtExpr(value))
}

pub fn funcdef_stmt(f: FuncDef) -> Stmt {
    stmt(StmtKind::FuncDef(Rc::new(f)))
}

// expressions

fn expr(kind: ExprKind) -> Expr {
    Expr::new(Loc::fake(), kind)
}

pub fn at(loc: Loc, mut e: Expr) -> Expr {
    e.loc = loc;
    e
}

pub fn none() -> Expr {
    expr(ExprKind::Constant(Constant::None))
}

pub fn int(v: i64) -> Expr {
    expr(ExprKind::Constant(Constant::Int(v)))
}

pub fn float(v: f64) -> Expr {
    expr(ExprKind::Constant(Constant::Float(v)))
}

pub fn boolean(v: bool) -> Expr {
    expr(ExprKind::Constant(Constant::Bool(v)))
}

pub fn str_(v: &str) -> Expr {
    expr(ExprKind::Constant(Constant::Str(v.to_string())))
}

pub fn name(n: &str) -> Expr {
    expr(ExprKind::Name(n.to_string()))
}

pub fn auto() -> Expr {
    expr(ExprKind::Auto)
}

pub fn fqn_const(fqn: Fqn) -> Expr {
    expr(ExprKind::FqnConst(fqn))
}

pub fn getattr(value: Expr, attr: &str) -> Expr {
    expr(ExprKind::GetAttr {
        value: Box::new(value),
        attr: Ident::new(Loc::fake(), attr),
    })
}

pub fn getitem(value: Expr, index: Expr) -> Expr {
    expr(ExprKind::GetItem {
        value: Box::new(value),
        index: Box::new(index),
    })
}

pub fn list(items: Vec<Expr>) -> Expr {
    expr(ExprKind::List(items))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Tuple(items))
}

pub fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binop(BinOp::Add, left, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binop(BinOp::Sub, left, right)
}

pub fn mul(left: Expr, right: Expr) -> Expr {
    binop(BinOp::Mul, left, right)
}

pub fn div(left: Expr, right: Expr) -> Expr {
    binop(BinOp::Div, left, right)
}

pub fn cmp(op: CmpOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::CompareOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    cmp(CmpOp::Eq, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    cmp(CmpOp::Lt, left, right)
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        func: Box::new(func),
        args,
    })
}

pub fn call_method(target: Expr, method: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::CallMethod {
        target: Box::new(target),
        method: Ident::new(Loc::fake(), method),
        args,
    })
}

pub fn unary(op: UnaryOp, value: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        value: Box::new(value),
    })
}

pub fn neg(value: Expr) -> Expr {
    unary(UnaryOp::Neg, value)
}

pub fn not_(value: Expr) -> Expr {
    unary(UnaryOp::Not, value)
}
