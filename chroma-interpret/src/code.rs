#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use chroma_ast::{Fqn, Loc};
use chroma_core::{TypeRef, Value};

#[derive(Clone, Debug)]
pub enum OpCode {
    ConstLoad(Value),
    I32Add,
    I32Sub,
    I32Mul,
    LocalGet(String),
    LocalSet(String),
    GlobalGet(Fqn),
    GlobalSet(Fqn),
    /// Pop `argc` arguments and call the global function.
    Call(Fqn, usize),
    /// Discard the top of the stack.
    Pop,
    Return,
}

impl OpCode {
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::ConstLoad(_) => "const_load",
            OpCode::I32Add => "i32_add",
            OpCode::I32Sub => "i32_sub",
            OpCode::I32Mul => "i32_mul",
            OpCode::LocalGet(_) => "local_get",
            OpCode::LocalSet(_) => "local_set",
            OpCode::GlobalGet(_) => "global_get",
            OpCode::GlobalSet(_) => "global_set",
            OpCode::Call(..) => "call",
            OpCode::Pop => "pop",
            OpCode::Return => "return",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            OpCode::ConstLoad(v) => write!(f, " {v:?}"),
            OpCode::LocalGet(name) | OpCode::LocalSet(name) => write!(f, " {name}"),
            OpCode::GlobalGet(fqn) | OpCode::GlobalSet(fqn) => write!(f, " {fqn}"),
            OpCode::Call(fqn, argc) => write!(f, " {fqn} {argc}"),
            _ => Ok(()),
        }
    }
}

/// A function body in bytecode form.
#[derive(Clone, Debug)]
pub struct CodeObject {
    pub name: String,
    pub params: Vec<String>,
    /// Declared type of every local; stores to other names are unchecked.
    pub locals_types: BTreeMap<String, TypeRef>,
    pub body: Vec<OpCode>,
    /// Location of the function this code was lowered from; runtime errors
    /// point here.
    pub loc: Loc,
}

impl CodeObject {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Vec<OpCode>) -> Self {
        Self {
            name: name.into(),
            params,
            locals_types: BTreeMap::new(),
            body,
            loc: Loc::fake(),
        }
    }

    pub fn with_loc(mut self, loc: Loc) -> Self {
        self.loc = loc;
        self
    }

    pub fn with_locals_types(mut self, locals_types: BTreeMap<String, TypeRef>) -> Self {
        self.locals_types = locals_types;
        self
    }

    /// The body in the text form accepted by `parse_code`.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for op in &self.body {
            out.push_str(&op.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}({})", self.name, self.params.join(", "))?;
        f.write_str(&self.disassemble())
    }
}
