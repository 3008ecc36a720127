#![forbid(unsafe_code)]

//! Static typing of function bodies.
//!
//! The `TypeChecker` is lazy: the interpreter asks it to check each
//! statement and expression right before executing it, because the types of
//! locals only become known when their `VarDef` executes.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chroma_ast::{Color, Constant, Expr, ExprKind, Fqn, FuncDef, Ident, Loc, NodeId, Stmt, StmtKind};

use crate::error::{ChromaError, ErrorKind, Level, maybe_plural};
use crate::function::FuncRef;
use crate::object::{TypeKind, TypeRef, Value};
use crate::opimpl::{OpCall, OpImpl, Operand, TypeConverter};
use crate::ops::{BinaryOp, attrop, binop, callop, itemop};
use crate::symtable::{SymTable, Symbol};
use crate::vm::Vm;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The first operand decides: errors point at it and at its definition.
    Single,
    /// All operands decide: errors show the type of each.
    Multi,
}

/// Check `opimpl` against the operands it was resolved for, and compute the
/// conversion needed by each argument. `errmsg` may contain `{0}` and `{1}`,
/// replaced by the names of the operand types.
pub fn typecheck_opimpl(
    vm: &mut Vm,
    opimpl: OpImpl,
    orig: &[Operand],
    dispatch: Dispatch,
    errmsg: &str,
) -> Result<OpCall, ChromaError> {
    let (func, args) = match opimpl {
        OpImpl::Null => return Err(unsupported_op(orig, dispatch, errmsg)),
        OpImpl::Simple(func) => (func, orig.to_vec()),
        OpImpl::WithValues(func, args) => (func, args),
    };

    // for direct calls, point errors at the definition of the callee
    let def_loc = if func.is_direct_call() {
        orig.first().and_then(|o| o.sym.as_ref()).map(|s| s.loc.clone())
    } else {
        None
    };

    let sig = func.functype().clone();
    if args.len() != sig.arity() {
        return Err(wrong_argcount(orig, &args, sig.arity(), def_loc.as_ref()));
    }
    let mut converters = Vec::with_capacity(args.len());
    for (param, arg) in sig.params.iter().zip(&args) {
        match convert_type_maybe(vm, arg, &param.ty) {
            Ok(conv) => converters.push(conv),
            Err(mut err) => {
                if let Some(loc) = &def_loc {
                    err.add(Level::Note, "function defined here", loc);
                }
                return Err(err);
            }
        }
    }
    Ok(OpCall {
        func,
        args,
        converters,
    })
}

fn unsupported_op(orig: &[Operand], dispatch: Dispatch, errmsg: &str) -> ChromaError {
    let mut message = errmsg.to_string();
    for (i, op) in orig.iter().enumerate().take(2) {
        message = message.replace(&format!("{{{i}}}"), &op.static_type.name);
    }
    let mut err = ChromaError::new(ErrorKind::Type, message);
    match dispatch {
        Dispatch::Single => {
            if let Some(target) = orig.first() {
                err.add(Level::Error, format!("this is `{}`", target.static_type.name), &target.loc);
                if let Some(sym) = &target.sym {
                    err.add(Level::Note, format!("`{}` defined here", sym.name), &sym.loc);
                }
            }
        }
        Dispatch::Multi => {
            for op in orig {
                err.add(Level::Error, format!("this is `{}`", op.static_type.name), &op.loc);
            }
        }
    }
    err
}

fn wrong_argcount(orig: &[Operand], args: &[Operand], expected: usize, def_loc: Option<&Loc>) -> ChromaError {
    let got = args.len();
    let takes = maybe_plural(expected, "argument");
    let supplied = maybe_plural(got, "argument");
    let mut err = ChromaError::new(
        ErrorKind::Type,
        format!("this function takes {takes} but {supplied} were supplied"),
    );
    if got > expected {
        let diff = got - expected;
        let first = &args[expected].loc;
        let last = &args[got - 1].loc;
        err.add(
            Level::Error,
            format!("{} extra", maybe_plural(diff, "argument")),
            &first.combine(last),
        );
    } else {
        let diff = expected - got;
        let loc = orig.first().map(|o| o.loc.clone()).unwrap_or_else(Loc::fake);
        err.add(Level::Error, format!("{} missing", maybe_plural(diff, "argument")), &loc);
    }
    if let Some(loc) = def_loc {
        err.add(Level::Note, "function defined here", loc);
    }
    err
}

/// The conversion needed to pass `operand` where `exp` is expected, `None`
/// if no conversion is needed.
pub fn convert_type_maybe(
    vm: &Vm,
    operand: &Operand,
    exp: &TypeRef,
) -> Result<Option<TypeConverter>, ChromaError> {
    let got = &operand.static_type;
    if vm.issubclass(got, exp) {
        return Ok(None);
    }
    if let Some(origin) = exp.alias_origin() {
        if vm.issubclass(got, origin) {
            return Ok(Some(TypeConverter::AliasConv(exp.clone())));
        }
    }
    if let Some(origin) = got.alias_origin() {
        if vm.issubclass(origin, exp) {
            return Ok(Some(TypeConverter::AliasConv(exp.clone())));
        }
    }
    if vm.issubclass(exp, got) {
        return Ok(Some(TypeConverter::DynamicCast(exp.clone())));
    }
    if matches!(got.kind, TypeKind::I32) && matches!(exp.kind, TypeKind::F64) {
        return Ok(Some(TypeConverter::NumericConv {
            from: got.clone(),
            to: exp.clone(),
        }));
    }
    Err(ChromaError::type_error(
        "mismatched types",
        format!("expected `{}`, got `{}`", exp.name, got.name),
        &operand.loc,
    ))
}

/// Source of an operand: either an expression or a literal identifier, such
/// as the attribute name of `a.b`.
enum Src<'e> {
    Expr(&'e Expr),
    Str(&'e Ident),
}

/// Where an assignment target is stored, decided when the assignment is
/// first checked.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreTarget {
    Local,
    Global(Fqn),
}

pub struct TypeChecker {
    func: FuncRef,
    funcdef: Rc<FuncDef>,
    symtable: Rc<SymTable>,
    pub locals_types: BTreeMap<String, TypeRef>,
    expr_types: HashMap<NodeId, (Color, TypeRef)>,
    expr_conv: HashMap<NodeId, TypeConverter>,
    opimpls: HashMap<NodeId, OpCall>,
    unpack_items: HashMap<(NodeId, usize), Expr>,
    /// Keyed by statement and target index.
    store_targets: HashMap<(NodeId, usize), StoreTarget>,
    /// Current values of the locals of a blue function.
    blue_locals: BTreeMap<String, Value>,
}

impl TypeChecker {
    pub fn new(vm: &Vm, func: FuncRef) -> Result<Self, ChromaError> {
        let ast = func.as_ast().ok_or_else(|| {
            ChromaError::new(ErrorKind::Panic, format!("cannot typecheck builtin function `{}`", func.qn))
        })?;
        let funcdef = ast.funcdef.clone();
        let symtable = vm.symtable_for(&funcdef)?;
        let mut locals_types = ast.locals_types.clone().unwrap_or_default();
        let sig = func.functype();
        for param in &sig.params {
            locals_types.insert(param.name.clone(), param.ty.clone());
        }
        locals_types.insert("@return".to_string(), sig.restype.clone());
        Ok(Self {
            func,
            funcdef,
            symtable,
            locals_types,
            expr_types: HashMap::new(),
            expr_conv: HashMap::new(),
            opimpls: HashMap::new(),
            unpack_items: HashMap::new(),
            store_targets: HashMap::new(),
            blue_locals: BTreeMap::new(),
        })
    }

    pub fn symtable(&self) -> &Rc<SymTable> {
        &self.symtable
    }

    pub fn color(&self) -> Color {
        self.func.color()
    }

    pub fn lazy_check_vardef(&mut self, name: &str, ty: TypeRef, loc: &Loc) -> Result<(), ChromaError> {
        self.declare_local(name, ty, loc)
    }

    pub fn lazy_check_funcdef(&mut self, name: &str, functype: TypeRef, loc: &Loc) -> Result<(), ChromaError> {
        self.declare_local(name, functype, loc)
    }

    /// Declaring again with the same type is a no-op: a `VarDef` inside a
    /// loop executes many times.
    pub fn declare_local(&mut self, name: &str, ty: TypeRef, loc: &Loc) -> Result<(), ChromaError> {
        if let Some(prev) = self.locals_types.get(name) {
            if prev.is(&ty) {
                return Ok(());
            }
            return Err(ChromaError::type_error(
                format!("variable `{name}` already declared with type `{}`", prev.name),
                format!("this is `{}`", ty.name),
                loc,
            ));
        }
        self.locals_types.insert(name.to_string(), ty);
        Ok(())
    }

    pub(crate) fn set_blue_local(&mut self, name: &str, value: Value) {
        if self.color() == Color::Blue {
            self.blue_locals.insert(name.to_string(), value);
        }
    }

    pub fn expr_conv(&self, id: NodeId) -> Option<TypeConverter> {
        self.expr_conv.get(&id).cloned()
    }

    pub fn opimpl(&self, id: NodeId) -> Result<OpCall, ChromaError> {
        self.opimpls
            .get(&id)
            .cloned()
            .ok_or_else(|| ChromaError::new(ErrorKind::Panic, "operation was not typechecked"))
    }

    /// Target `i` of the assignment `stmt`.
    pub fn store_target(&self, stmt: NodeId, i: usize) -> Result<&StoreTarget, ChromaError> {
        self.store_targets
            .get(&(stmt, i))
            .ok_or_else(|| ChromaError::new(ErrorKind::Panic, "assignment was not typechecked"))
    }

    /// The synthesized `value[i]` expression checked for target `i` of an
    /// `UnpackAssign`.
    pub(crate) fn unpack_item(&self, stmt: NodeId, i: usize) -> Option<&Expr> {
        self.unpack_items.get(&(stmt, i))
    }

    pub(crate) fn is_static_type_call(&self, func: &Expr) -> bool {
        match &func.kind {
            ExprKind::Name(name) => self
                .symtable
                .lookup(name)
                .and_then(|s| s.fqn)
                .is_some_and(|fqn| fqn == Fqn::make_global("builtins", "STATIC_TYPE")),
            _ => false,
        }
    }

    fn name2sym(&self, expr: &Expr) -> Option<Symbol> {
        match &expr.kind {
            ExprKind::Name(name) => self.symtable.lookup(name),
            _ => None,
        }
    }

    /// Check `expr` against the declared type of local `name`, recording the
    /// conversion if one is needed.
    pub fn typecheck_local(&mut self, vm: &mut Vm, expr: &Expr, name: &str) -> Result<(), ChromaError> {
        let (_, got) = self.check_expr(vm, expr)?;
        let exp = self.locals_types.get(name).cloned().ok_or_else(|| {
            ChromaError::panic(format!("local `{name}` has no declared type"), &expr.loc)
        })?;
        let operand = Operand::new("v", 0, got, expr.loc.clone());
        match convert_type_maybe(vm, &operand, &exp) {
            Ok(Some(conv)) => {
                self.expr_conv.insert(expr.id, conv);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(mut err) => {
                let because = if name == "@return" {
                    "because of return type"
                } else {
                    "because of type declaration"
                };
                if let Some(sym) = self.symtable.lookup(name) {
                    err.add(Level::Note, format!("expected `{}` {because}", exp.name), &sym.type_loc);
                }
                Err(err)
            }
        }
    }

    pub fn typecheck_bool(&mut self, vm: &mut Vm, expr: &Expr) -> Result<(), ChromaError> {
        let (_, ty) = self.check_expr(vm, expr)?;
        if ty.is(&vm.b.bool) {
            return Ok(());
        }
        Err(ChromaError::type_error(
            "mismatched types",
            format!("expected `bool`, got `{}`", ty.name),
            &expr.loc,
        )
        .with_note("implicit conversion to `bool` is not implemented yet", &expr.loc))
    }

    pub fn check_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> Result<(), ChromaError> {
        match &stmt.kind {
            StmtKind::Pass | StmtKind::VarDef(_) | StmtKind::FuncDef(_) => Ok(()),
            StmtKind::Return(value) => self.typecheck_local(vm, value, "@return"),
            StmtKind::StmtExpr(value) => self.check_expr(vm, value).map(|_| ()),
            StmtKind::If { test, .. } | StmtKind::While { test, .. } => self.typecheck_bool(vm, test),
            StmtKind::Assign { target, value } => self.check_assign(vm, (stmt.id, 0), target, value),
            StmtKind::UnpackAssign { targets, value } => {
                let (_, ty) = self.check_expr(vm, value)?;
                if !ty.is(&vm.b.tuple) {
                    return Err(ChromaError::type_error(
                        format!("`{}` does not support unpacking", ty.name),
                        format!("this is `{}`", ty.name),
                        &value.loc,
                    ));
                }
                for (i, target) in targets.iter().enumerate() {
                    let item = self
                        .unpack_items
                        .entry((stmt.id, i))
                        .or_insert_with(|| {
                            let index = Expr::new(
                                value.loc.clone(),
                                ExprKind::Constant(Constant::Int(i as i64)),
                            );
                            Expr::new(
                                value.loc.clone(),
                                ExprKind::GetItem {
                                    value: Box::new(value.clone()),
                                    index: Box::new(index),
                                },
                            )
                        })
                        .clone();
                    self.check_assign(vm, (stmt.id, i), target, &item)?;
                }
                Ok(())
            }
            StmtKind::SetAttr {
                target,
                attr,
                value,
            } => {
                let (_, operands) = self.check_operands(
                    vm,
                    &[Src::Expr(target), Src::Str(attr), Src::Expr(value)],
                )?;
                let opcall = attrop::setattr(vm, &operands[0], &operands[1], &operands[2])?;
                self.opimpls.insert(stmt.id, opcall);
                Ok(())
            }
            StmtKind::SetItem {
                target,
                index,
                value,
            } => {
                let (_, operands) = self.check_operands(
                    vm,
                    &[Src::Expr(target), Src::Expr(index), Src::Expr(value)],
                )?;
                let opcall = itemop::setitem(vm, &operands[0], &operands[1], &operands[2])?;
                self.opimpls.insert(stmt.id, opcall);
                Ok(())
            }
        }
    }

    fn check_assign(
        &mut self,
        vm: &mut Vm,
        key: (NodeId, usize),
        target: &Ident,
        value: &Expr,
    ) -> Result<(), ChromaError> {
        if self.store_targets.contains_key(&key) {
            return Ok(());
        }
        let sym = self.symtable.lookup(&target.name).ok_or_else(|| {
            ChromaError::simple(
                ErrorKind::Name,
                format!("name `{}` is not defined", target.name),
                "not found in this scope",
                &target.loc,
            )
        })?;
        if sym.fqn.is_some() && sym.color == Color::Blue {
            return Err(ChromaError::type_error(
                "invalid assignment target",
                format!("`{}` is const", target.name),
                &target.loc,
            )
            .with_note("const declared here", &sym.loc)
            .with_note(format!("help: declare it as variable: `var {} ...`", target.name), &sym.loc));
        }
        if sym.is_local() {
            if !self.locals_types.contains_key(&target.name) {
                let (_, ty) = self.check_expr(vm, value)?;
                self.declare_local(&target.name, ty, &target.loc)?;
            }
            self.typecheck_local(vm, value, &target.name)?;
            self.store_targets.insert(key, StoreTarget::Local);
            return Ok(());
        }
        if let Some(fqn) = &sym.fqn {
            let (_, got) = self.check_expr(vm, value)?;
            if let Some(exp) = vm.global_type(fqn) {
                let operand = Operand::new("v", 0, got, value.loc.clone());
                if let Some(conv) = convert_type_maybe(vm, &operand, &exp)? {
                    self.expr_conv.insert(value.id, conv);
                }
            }
            self.store_targets.insert(key, StoreTarget::Global(fqn.clone()));
            return Ok(());
        }
        Err(ChromaError::type_error(
            "invalid assignment target",
            format!("`{}` belongs to an outer function", target.name),
            &target.loc,
        )
        .with_note("declared here", &sym.loc))
    }

    /// Return the color and static type of `expr`, computing them the first
    /// time and caching them afterwards.
    pub fn check_expr(&mut self, vm: &mut Vm, expr: &Expr) -> Result<(Color, TypeRef), ChromaError> {
        if let Some(res) = self.expr_types.get(&expr.id) {
            return Ok(res.clone());
        }
        let res = self.check_expr_uncached(vm, expr)?;
        self.expr_types.insert(expr.id, res.clone());
        Ok(res)
    }

    fn check_expr_uncached(&mut self, vm: &mut Vm, expr: &Expr) -> Result<(Color, TypeRef), ChromaError> {
        match &expr.kind {
            ExprKind::Constant(c) => self.check_constant(vm, c, &expr.loc),
            ExprKind::Name(name) => self.check_name(vm, name, &expr.loc),
            ExprKind::Auto => Err(ChromaError::type_error(
                "`auto` is only allowed as a declared type",
                "this is `auto`",
                &expr.loc,
            )),
            ExprKind::FqnConst(fqn) => {
                let value = vm.lookup_global(fqn).ok_or_else(|| {
                    ChromaError::panic(format!("`{fqn}` is not a registered global"), &expr.loc)
                })?;
                Ok((Color::Blue, vm.dynamic_type(&value)))
            }
            ExprKind::BinOp { op, left, right } => {
                self.check_binop(vm, expr.id, BinaryOp::from(*op), left, right)
            }
            ExprKind::CompareOp { op, left, right } => {
                self.check_binop(vm, expr.id, BinaryOp::from(*op), left, right)
            }
            ExprKind::Unary { op, value } => {
                let (colors, operands) = self.check_operands(vm, &[Src::Expr(value)])?;
                let opcall = binop::resolve_unary(vm, *op, &operands[0])?;
                let restype = opcall.restype();
                self.opimpls.insert(expr.id, opcall);
                Ok((colors[0], restype))
            }
            ExprKind::GetItem { value, index } => {
                let (colors, operands) = self.check_operands(vm, &[Src::Expr(value), Src::Expr(index)])?;
                let opcall = itemop::getitem(vm, &operands[0], &operands[1])?;
                let restype = opcall.restype();
                self.opimpls.insert(expr.id, opcall);
                Ok((colors[0].join(colors[1]), restype))
            }
            ExprKind::GetAttr { value, attr } => {
                let (colors, operands) = self.check_operands(vm, &[Src::Expr(value), Src::Str(attr)])?;
                let opcall = attrop::getattr(vm, &operands[0], &operands[1])?;
                let restype = opcall.restype();
                self.opimpls.insert(expr.id, opcall);
                Ok((colors[0], restype))
            }
            ExprKind::Call { func, args } => self.check_call(vm, expr, func, args),
            ExprKind::CallMethod {
                target,
                method,
                args,
            } => {
                let mut srcs = vec![Src::Expr(target), Src::Str(method)];
                srcs.extend(args.iter().map(Src::Expr));
                let (_, operands) = self.check_operands(vm, &srcs)?;
                let opcall = callop::call_method(vm, &operands[0], &operands[1], &operands[2..])?;
                let color = opcall.color();
                let restype = opcall.restype();
                self.opimpls.insert(expr.id, opcall);
                Ok((color, restype))
            }
            ExprKind::List(items) => {
                let Some((first, rest)) = items.split_first() else {
                    return Err(ChromaError::type_error(
                        "cannot infer the type of an empty list",
                        "this is empty",
                        &expr.loc,
                    ));
                };
                let (_, mut itemtype) = self.check_expr(vm, first)?;
                for item in rest {
                    let (_, t) = self.check_expr(vm, item)?;
                    itemtype = vm.union_type(&itemtype, &t);
                }
                let listtype = vm.make_list_type(&itemtype);
                // list literals build a fresh mutable object every time
                Ok((Color::Red, listtype))
            }
            ExprKind::Tuple(items) => {
                let mut color = Color::Blue;
                for item in items {
                    let (c, _) = self.check_expr(vm, item)?;
                    color = color.join(c);
                }
                Ok((color, vm.b.tuple.clone()))
            }
        }
    }

    fn check_constant(&self, vm: &Vm, c: &Constant, loc: &Loc) -> Result<(Color, TypeRef), ChromaError> {
        let ty = match c {
            Constant::None => vm.b.void.clone(),
            Constant::Int(v) => {
                if i32::try_from(*v).is_err() {
                    return Err(ChromaError::type_error(
                        "integer literal out of range",
                        "this does not fit in `i32`",
                        loc,
                    ));
                }
                vm.b.i32.clone()
            }
            Constant::Float(_) => vm.b.f64.clone(),
            Constant::Bool(_) => vm.b.bool.clone(),
            Constant::Str(_) => vm.b.str.clone(),
        };
        Ok((Color::Blue, ty))
    }

    fn check_name(&self, vm: &Vm, name: &str, loc: &Loc) -> Result<(Color, TypeRef), ChromaError> {
        let sym = self.symtable.lookup(name).ok_or_else(|| {
            ChromaError::simple(
                ErrorKind::Name,
                format!("name `{name}` is not defined"),
                "not found in this scope",
                loc,
            )
        })?;
        if let Some(fqn) = &sym.fqn {
            let ty = match vm.global_type(fqn) {
                Some(ty) => ty,
                None => {
                    let value = vm.lookup_global(fqn).ok_or_else(|| {
                        ChromaError::simple(
                            ErrorKind::Name,
                            format!("name `{name}` is not defined yet"),
                            "used before its definition",
                            loc,
                        )
                    })?;
                    vm.dynamic_type(&value)
                }
            };
            return Ok((sym.color, ty));
        }
        if sym.is_local() {
            let ty = self.locals_types.get(name).cloned().ok_or_else(|| {
                ChromaError::simple(
                    ErrorKind::Name,
                    format!("name `{name}` is used before its declaration"),
                    "read here",
                    loc,
                )
                .with_note("declared here", &sym.loc)
            })?;
            let color = match self.color() {
                Color::Blue => Color::Blue,
                Color::Red => sym.color,
            };
            return Ok((color, ty));
        }
        let value = self.closure_lookup(&sym, loc)?;
        Ok((Color::Blue, vm.dynamic_type(&value)))
    }

    /// Names of outer functions are read from the closure snapshot, which
    /// makes them blue.
    pub(crate) fn closure_lookup(&self, sym: &Symbol, loc: &Loc) -> Result<Value, ChromaError> {
        let closure = self.func.as_ast().map(|f| f.closure.as_slice()).unwrap_or(&[]);
        let level = sym.level as usize;
        let ns = closure
            .len()
            .checked_sub(level)
            .and_then(|i| closure.get(i))
            .ok_or_else(|| ChromaError::panic(format!("no closure frame for `{}`", sym.name), loc))?;
        ns.get(&sym.name).cloned().ok_or_else(|| {
            ChromaError::simple(
                ErrorKind::Name,
                format!("name `{}` is not defined yet", sym.name),
                "captured before its definition",
                loc,
            )
        })
    }

    fn check_binop(
        &mut self,
        vm: &mut Vm,
        id: NodeId,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(Color, TypeRef), ChromaError> {
        let (colors, operands) = self.check_operands(vm, &[Src::Expr(left), Src::Expr(right)])?;
        let opcall = binop::resolve_binop(vm, op, &operands[0], &operands[1])?;
        let restype = opcall.restype();
        self.opimpls.insert(id, opcall);
        Ok((colors[0].join(colors[1]), restype))
    }

    fn check_call(
        &mut self,
        vm: &mut Vm,
        expr: &Expr,
        func: &Expr,
        args: &[Expr],
    ) -> Result<(Color, TypeRef), ChromaError> {
        if self.is_static_type_call(func) {
            return match args {
                [arg] if matches!(arg.kind, ExprKind::Name(_)) => {
                    self.check_expr(vm, arg)?;
                    Ok((Color::Blue, vm.b.type_.clone()))
                }
                _ => Err(ChromaError::type_error(
                    "STATIC_TYPE works only on simple expressions",
                    "this is not a name",
                    &expr.loc,
                )),
            };
        }
        let mut srcs = vec![Src::Expr(func)];
        srcs.extend(args.iter().map(Src::Expr));
        let (colors, operands) = self.check_operands(vm, &srcs)?;
        let opcall = callop::call(vm, &operands[0], &operands[1..])?;
        let color = opcall.color();
        let restype = opcall.restype();

        // a red function cannot pass red values to blue code
        if color == Color::Blue && self.color() == Color::Red {
            if let Some(i) = colors.iter().skip(1).position(|c| *c == Color::Red) {
                let arg = &args[i];
                return Err(ChromaError::type_error(
                    "cannot call blue function with red arguments",
                    "this is red",
                    &arg.loc,
                )
                .with_note("blue function called here", &func.loc));
            }
        }
        self.opimpls.insert(expr.id, opcall);
        Ok((color, restype))
    }

    fn check_operands(&mut self, vm: &mut Vm, srcs: &[Src<'_>]) -> Result<(Vec<Color>, Vec<Operand>), ChromaError> {
        let mut colors = Vec::with_capacity(srcs.len());
        let mut operands = Vec::with_capacity(srcs.len());
        for (i, src) in srcs.iter().enumerate() {
            match src {
                Src::Expr(e) => {
                    let (color, ty) = self.check_expr(vm, e)?;
                    let mut operand = Operand::new("v", i, ty, e.loc.clone()).with_sym(self.name2sym(e));
                    if color == Color::Blue {
                        if let Some(value) = self.blue_value(vm, e) {
                            operand = operand.with_blueval(vm, value)?;
                        }
                    }
                    colors.push(color);
                    operands.push(operand);
                }
                Src::Str(ident) => {
                    let operand = Operand::new("v", i, vm.b.str.clone(), ident.loc.clone())
                        .with_blueval(vm, Value::str(&ident.name))?;
                    colors.push(Color::Blue);
                    operands.push(operand);
                }
            }
        }
        Ok((colors, operands))
    }

    /// The compile-time value of a blue operand, when it can be known without
    /// running code: literals, globals and closure variables.
    fn blue_value(&self, vm: &Vm, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Constant(c) => match c {
                Constant::None => Some(Value::None),
                Constant::Int(v) => i32::try_from(*v).ok().map(Value::I32),
                Constant::Float(v) => Some(Value::F64(*v)),
                Constant::Bool(v) => Some(Value::Bool(*v)),
                Constant::Str(s) => Some(Value::str(s)),
            },
            ExprKind::FqnConst(fqn) => vm.lookup_global(fqn),
            ExprKind::Name(name) => {
                let sym = self.symtable.lookup(name)?;
                if sym.is_local() && sym.fqn.is_none() {
                    return self.blue_locals.get(name).cloned();
                }
                if sym.color != Color::Blue {
                    return None;
                }
                match &sym.fqn {
                    Some(fqn) => vm.lookup_global(fqn),
                    None => self.closure_lookup(&sym, &expr.loc).ok(),
                }
            }
            _ => None,
        }
    }
}
