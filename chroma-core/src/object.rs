#![forbid(unsafe_code)]

//! Values and type descriptors.
//!
//! Types are interned: two `TypeRef`s denote the same type iff they have the
//! same `TypeId`. Every value has exactly one dynamic type, computed by
//! `Vm::dynamic_type`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::ChromaError;
use crate::function::{FuncRef, FuncType};
use crate::opimpl::{OpImpl, Operand};
use crate::vm::Vm;

pub type TypeRef = Rc<Type>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

/// Whether values of a type behave as values or as references. Equality on
/// reference types without an `op_EQ` override is identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Value,
    Reference,
}

pub enum TypeKind {
    Object,
    Type,
    Dynamic,
    Void,
    I32,
    F64,
    Bool,
    Str,
    NotImplemented,
    /// `list` itself for `None`, `list[T]` otherwise.
    List(Option<TypeRef>),
    Tuple,
    RawBuffer,
    Func(FuncType),
    Meta,
    Alias(TypeRef),
    Instance,
    Module,
}

#[derive(Clone, Debug)]
pub struct Member {
    pub name: String,
    pub ty: TypeRef,
}

pub struct Type {
    pub id: TypeId,
    pub name: String,
    pub base: Option<TypeRef>,
    pub kind: TypeKind,
    pub storage: Storage,
    pub members: Vec<Member>,
    pub hooks: OpHooks,
    pub metatype: Option<TypeRef>,
}

impl Type {
    pub fn is(&self, other: &Type) -> bool {
        self.id == other.id
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn functype(&self) -> Option<&FuncType> {
        match &self.kind {
            TypeKind::Func(ft) => Some(ft),
            _ => None,
        }
    }

    pub fn alias_origin(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::Alias(origin) => Some(origin),
            _ => None,
        }
    }

    pub fn list_item(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::List(item) => item.as_ref(),
            _ => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, TypeKind::Dynamic)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_reference(&self) -> bool {
        self.storage == Storage::Reference
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<type {}>", self.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub fn same_type(a: &TypeRef, b: &TypeRef) -> bool {
    a.is(b)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    GetAttr,
    SetAttr,
    Call,
    CallMethod,
    GetItem,
    SetItem,
    Eq,
}

impl OpKind {
    pub fn hook_name(self) -> &'static str {
        match self {
            OpKind::GetAttr => "op_GETATTR",
            OpKind::SetAttr => "op_SETATTR",
            OpKind::Call => "op_CALL",
            OpKind::CallMethod => "op_CALL_METHOD",
            OpKind::GetItem => "op_GETITEM",
            OpKind::SetItem => "op_SETITEM",
            OpKind::Eq => "op_EQ",
        }
    }
}

/// A per-type operator override. It receives the operands of the operation
/// (primary operand first) and returns the implementation to use.
pub type OpHook = Rc<dyn Fn(&mut Vm, &[Operand]) -> Result<OpImpl, ChromaError>>;

#[derive(Clone, Default)]
pub struct OpHooks {
    hooks: BTreeMap<OpKind, OpHook>,
}

impl OpHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, op: OpKind, hook: F) -> Self
    where
        F: Fn(&mut Vm, &[Operand]) -> Result<OpImpl, ChromaError> + 'static,
    {
        self.hooks.insert(op, Rc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn has_override(&self, op: OpKind) -> bool {
        self.hooks.contains_key(&op)
    }

    pub fn get(&self, op: OpKind) -> Option<OpHook> {
        self.hooks.get(&op).cloned()
    }

    /// Run the override for `op`, or return `OpImpl::Null` if there is none.
    pub fn resolve(&self, vm: &mut Vm, op: OpKind, operands: &[Operand]) -> Result<OpImpl, ChromaError> {
        match self.get(op) {
            Some(hook) => hook(vm, operands),
            None => Ok(OpImpl::Null),
        }
    }
}

impl fmt::Debug for OpHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.keys().map(|k| k.hook_name()))
            .finish()
    }
}

/// Description of a host-defined type, turned into a `TypeRef` by
/// `Vm::make_type`.
pub struct TypeBuilder {
    pub(crate) name: String,
    pub(crate) base: Option<TypeRef>,
    pub(crate) storage: Storage,
    pub(crate) members: Vec<Member>,
    pub(crate) hooks: OpHooks,
    pub(crate) meta_hooks: OpHooks,
}

impl TypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            storage: Storage::Reference,
            members: Vec::new(),
            hooks: OpHooks::new(),
            meta_hooks: OpHooks::new(),
        }
    }

    pub fn base(mut self, base: TypeRef) -> Self {
        self.base = Some(base);
        self
    }

    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn member(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.members.push(Member {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn hooks(mut self, hooks: OpHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn meta_hooks(mut self, hooks: OpHooks) -> Self {
        self.meta_hooks = hooks;
        self
    }
}

pub struct Instance {
    pub ty: TypeRef,
    fields: RefCell<BTreeMap<String, Value>>,
}

impl Instance {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            fields: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }
}

pub struct ListObj {
    pub ty: TypeRef,
    pub items: RefCell<Vec<Value>>,
}

pub struct RawBuffer {
    pub bytes: RefCell<Vec<u8>>,
}

#[derive(Clone)]
pub enum Value {
    None,
    NotImplemented,
    I32(i32),
    F64(f64),
    Bool(bool),
    Str(Rc<str>),
    Type(TypeRef),
    Func(FuncRef),
    List(Rc<ListObj>),
    Tuple(Rc<[Value]>),
    Instance(Rc<Instance>),
    Buffer(Rc<RawBuffer>),
    Module(Rc<str>),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncRef> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Object identity. Scalars are identical when they are equal.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Type(a), Value::Type(b)) => a.is(b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            _ => self.scalar_eq(other),
        }
    }

    /// Equality usable on any pair of values: scalars and strings by value,
    /// tuples element-wise, everything else by identity.
    pub fn universal_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.universal_eq(y))
            }
            _ => self.is_same(other),
        }
    }

    fn scalar_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::NotImplemented, Value::NotImplemented) => true,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::NotImplemented => f.write_str("NotImplemented"),
            Value::I32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Str(s) => f.write_str(s),
            Value::Type(t) => write!(f, "<type {}>", t.name),
            Value::Func(func) => write!(f, "<func {}>", func.qn),
            Value::List(l) => {
                let items = l.items.borrow();
                let parts: Vec<String> = items.iter().map(|v| format!("{v:?}")).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| format!("{v:?}")).collect();
                write!(f, "({})", parts.join(", "))
            }
            Value::Instance(obj) => write!(f, "<{} object>", obj.ty.name),
            Value::Buffer(buf) => write!(f, "<RawBuffer {} bytes>", buf.bytes.borrow().len()),
            Value::Module(name) => write!(f, "<module {name}>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => fmt::Display::fmt(other, f),
        }
    }
}
