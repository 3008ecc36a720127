#![forbid(unsafe_code)]

//! Binary operator dispatch on the static types of both operands.
//!
//! Lookups are exact: there are no implicit conversions or supertypes. An
//! entry may leave one side unspecified; the lookup tries `(L, R)`, then
//! `(L, _)`, then `(_, R)`.

use std::collections::HashMap;

use chroma_ast::{BinOp, CmpOp};

use crate::function::FuncRef;
use crate::object::{TypeId, TypeRef};
use crate::opimpl::OpImpl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Suffix of the implementing builtins, e.g. `i32_add`.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
        }
    }

    pub const ALL: [BinaryOp; 10] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
    ];
}

impl From<BinOp> for BinaryOp {
    fn from(op: BinOp) -> Self {
        match op {
            BinOp::Add => BinaryOp::Add,
            BinOp::Sub => BinaryOp::Sub,
            BinOp::Mul => BinaryOp::Mul,
            BinOp::Div => BinaryOp::Div,
        }
    }
}

impl From<CmpOp> for BinaryOp {
    fn from(op: CmpOp) -> Self {
        match op {
            CmpOp::Eq => BinaryOp::Eq,
            CmpOp::NotEq => BinaryOp::Ne,
            CmpOp::Lt => BinaryOp::Lt,
            CmpOp::LtE => BinaryOp::Le,
            CmpOp::Gt => BinaryOp::Gt,
            CmpOp::GtE => BinaryOp::Ge,
        }
    }
}

type Key = (BinaryOp, Option<TypeId>, Option<TypeId>);

#[derive(Default)]
pub struct MultiMethodTable {
    impls: HashMap<Key, FuncRef>,
}

impl MultiMethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations for the same key replace earlier ones.
    pub fn register(&mut self, op: BinaryOp, ltype: Option<&TypeRef>, rtype: Option<&TypeRef>, func: FuncRef) {
        let key = (op, ltype.map(|t| t.id), rtype.map(|t| t.id));
        self.impls.insert(key, func);
    }

    /// Register `func` for `(T, _)` and `(_, T)`.
    pub fn register_partial(&mut self, op: BinaryOp, ty: &TypeRef, func: FuncRef) {
        self.register(op, Some(ty), None, func.clone());
        self.register(op, None, Some(ty), func);
    }

    pub fn lookup(&self, op: BinaryOp, ltype: &TypeRef, rtype: &TypeRef) -> Option<FuncRef> {
        let keys = [
            (op, Some(ltype.id), Some(rtype.id)),
            (op, Some(ltype.id), None),
            (op, None, Some(rtype.id)),
        ];
        keys.iter().find_map(|k| self.impls.get(k).cloned())
    }

    pub fn get_opimpl(&self, op: BinaryOp, ltype: &TypeRef, rtype: &TypeRef) -> OpImpl {
        match self.lookup(op, ltype, rtype) {
            Some(func) => OpImpl::Simple(func),
            None => OpImpl::Null,
        }
    }

    pub fn len(&self) -> usize {
        self.impls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chroma_ast::Fqn;

    use super::*;
    use crate::config::VmConfig;
    use crate::vm::Vm;

    fn operator(vm: &Vm, name: &str) -> FuncRef {
        vm.lookup_global(&Fqn::make_global("operator", name))
            .and_then(|v| v.as_func().cloned())
            .expect("operator function")
    }

    #[test]
    fn exact_entries_win_over_partial_ones() {
        let vm = Vm::new(VmConfig::default());
        let (i32t, f64t) = (vm.b.i32.clone(), vm.b.f64.clone());
        let mut table = MultiMethodTable::new();
        table.register(BinaryOp::Add, None, Some(&i32t), operator(&vm, "i32_mul"));
        table.register(BinaryOp::Add, Some(&i32t), None, operator(&vm, "i32_sub"));
        table.register(BinaryOp::Add, Some(&i32t), Some(&i32t), operator(&vm, "i32_add"));
        assert_eq!(table.len(), 3);

        let found = |l: &TypeRef, r: &TypeRef| table.lookup(BinaryOp::Add, l, r).map(|f| f.qn.attr.clone());
        assert_eq!(found(&i32t, &i32t).as_deref(), Some("i32_add"));
        assert_eq!(found(&i32t, &f64t).as_deref(), Some("i32_sub"));
        assert_eq!(found(&f64t, &i32t).as_deref(), Some("i32_mul"));
        assert_eq!(found(&f64t, &f64t), None);
        assert!(matches!(table.get_opimpl(BinaryOp::Sub, &i32t, &i32t), OpImpl::Null));
    }
}
