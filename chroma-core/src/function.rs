#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chroma_ast::{Color, FuncDef, Qn};

use crate::error::ChromaError;
use crate::object::{TypeId, TypeRef, Value};
use crate::vm::Vm;

#[derive(Clone, Debug)]
pub struct FuncParam {
    pub name: String,
    pub ty: TypeRef,
}

impl FuncParam {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FuncType {
    pub color: Color,
    pub params: Vec<FuncParam>,
    pub restype: TypeRef,
}

impl FuncType {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `def(x: i32, y: i32) -> i32`, prefixed by `@blue ` for blue functions.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty.name))
            .collect();
        let sig = format!("def({}) -> {}", params.join(", "), self.restype.name);
        match self.color {
            Color::Blue => format!("@blue {sig}"),
            Color::Red => sig,
        }
    }

    pub(crate) fn key(&self) -> FuncTypeKey {
        FuncTypeKey {
            color: self.color,
            params: self
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.id))
                .collect(),
            restype: self.restype.id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FuncTypeKey {
    color: Color,
    params: Vec<(String, TypeId)>,
    restype: TypeId,
}

pub type Namespace = BTreeMap<String, Value>;

pub type BuiltinImpl = Rc<dyn Fn(&mut Vm, &[Value]) -> Result<Value, ChromaError>>;

pub struct AstFunc {
    pub funcdef: Rc<FuncDef>,
    /// Snapshots of the enclosing frames, outermost first.
    pub closure: Vec<Rc<Namespace>>,
    /// Concrete type of every local. Present iff the function was redshifted.
    pub locals_types: Option<BTreeMap<String, TypeRef>>,
}

pub enum FuncKind {
    Ast(AstFunc),
    Builtin(BuiltinImpl),
    /// A function type used as a callable: calling it calls the function
    /// value passed as operand 0.
    DirectCall,
}

pub type FuncRef = Rc<Func>;

pub struct Func {
    pub qn: Qn,
    pub ty: TypeRef,
    sig: FuncType,
    pub kind: FuncKind,
}

impl Func {
    pub(crate) fn new(qn: Qn, ty: TypeRef, sig: FuncType, kind: FuncKind) -> Self {
        Self { qn, ty, sig, kind }
    }

    pub fn functype(&self) -> &FuncType {
        &self.sig
    }

    pub fn color(&self) -> Color {
        self.sig.color
    }

    pub fn is_blue(&self) -> bool {
        self.sig.color == Color::Blue
    }

    pub fn as_ast(&self) -> Option<&AstFunc> {
        match &self.kind {
            FuncKind::Ast(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_direct_call(&self) -> bool {
        matches!(self.kind, FuncKind::DirectCall)
    }

    pub fn is_redshifted(&self) -> bool {
        self.as_ast().is_some_and(|f| f.locals_types.is_some())
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra = match &self.kind {
            FuncKind::Builtin(_) => " (builtin)",
            FuncKind::DirectCall => " (direct-call)",
            FuncKind::Ast(_) if self.is_redshifted() => " (redshifted)",
            FuncKind::Ast(_) if self.is_blue() => " (blue)",
            FuncKind::Ast(_) => "",
        };
        write!(f, "<func '{}'{}>", self.qn, extra)
    }
}
