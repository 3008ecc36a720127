#![forbid(unsafe_code)]

pub mod build;
pub mod fqn;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use miette::SourceSpan;

pub use fqn::{Fqn, FqnError, Qn};

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Source location of a node. Lines are 1-based, columns are 0-based.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Loc {
    pub filename: String,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: u32,
    pub col_end: u32,
}

impl Loc {
    pub fn new(
        filename: impl Into<String>,
        line_start: u32,
        line_end: u32,
        col_start: u32,
        col_end: u32,
    ) -> Self {
        Self {
            filename: filename.into(),
            line_start,
            line_end,
            col_start,
            col_end,
        }
    }

    /// Placeholder for nodes synthesized by the compiler itself.
    pub fn fake() -> Self {
        Self::new("<fake>", 0, 0, 0, 0)
    }

    pub fn builtins() -> Self {
        Self::new("<builtins>", 0, 0, 0, 0)
    }

    pub fn is_fake(&self) -> bool {
        self.line_start == 0
    }

    /// A location covering both `self` and `other`.
    pub fn combine(&self, other: &Loc) -> Loc {
        let (line_start, col_start) =
            (self.line_start, self.col_start).min((other.line_start, other.col_start));
        let (line_end, col_end) = (self.line_end, self.col_end).max((other.line_end, other.col_end));
        Loc {
            filename: self.filename.clone(),
            line_start,
            line_end,
            col_start,
            col_end,
        }
    }

    pub fn to_span(&self, source: &str) -> Option<Span> {
        let start = byte_offset(source, self.line_start, self.col_start)?;
        let end = byte_offset(source, self.line_end, self.col_end)
            .unwrap_or(start)
            .max(start);
        Some(span_between(start, end))
    }
}

fn byte_offset(source: &str, line: u32, col: u32) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line as usize {
            let width = text.trim_end_matches('\n').len();
            return Some(offset + (col as usize).min(width));
        }
        offset += text.len();
    }
    None
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line_start, self.col_start)
    }
}

/// Identity of an AST node, used to key per-node caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Blue code runs at compile time, red code at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
        }
    }

    /// Blue only if both sides are blue.
    pub fn join(self, other: Color) -> Color {
        if self == Color::Blue && other == Color::Blue {
            Color::Blue
        } else {
            Color::Red
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub loc: Loc,
    pub name: String,
}

impl Ident {
    pub fn new(loc: Loc, name: impl Into<String>) -> Self {
        Self {
            loc,
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub filename: String,
    pub decls: Vec<Decl>,
}

impl Module {
    pub fn funcdefs(&self) -> impl Iterator<Item = &Rc<FuncDef>> {
        self.decls.iter().filter_map(|d| match d {
            Decl::FuncDef(gf) => Some(&gf.funcdef),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    FuncDef(GlobalFuncDef),
    VarDef(GlobalVarDef),
    Import(Import),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalFuncDef {
    pub loc: Loc,
    pub funcdef: Rc<FuncDef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVarDef {
    pub loc: Loc,
    pub vardef: VarDef,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub loc: Loc,
    pub loc_asname: Loc,
    pub fqn: Fqn,
    pub asname: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Const,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDef {
    pub loc: Loc,
    pub kind: VarKind,
    pub name: String,
    /// The declared type; `ExprKind::Auto` means "infer from the value".
    pub ty: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncArg {
    pub loc: Loc,
    pub name: String,
    pub ty: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    pub id: NodeId,
    pub loc: Loc,
    pub prototype_loc: Loc,
    pub color: Color,
    pub name: String,
    pub args: Vec<FuncArg>,
    pub return_type: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub loc: Loc,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(loc: Loc, kind: StmtKind) -> Self {
        Self {
            id: NodeId::fresh(),
            loc,
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Pass,
    Return(Expr),
    VarDef(VarDef),
    Assign {
        target: Ident,
        value: Expr,
    },
    SetAttr {
        target: Expr,
        attr: Ident,
        value: Expr,
    },
    SetItem {
        target: Expr,
        index: Expr,
        value: Expr,
    },
    UnpackAssign {
        targets: Vec<Ident>,
        value: Expr,
    },
    If {
        test: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    StmtExpr(Expr),
    FuncDef(Rc<FuncDef>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub loc: Loc,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(loc: Loc, kind: ExprKind) -> Self {
        Self {
            id: NodeId::fresh(),
            loc,
            kind,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.kind, ExprKind::Auto)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Name(String),
    /// The `auto` type placeholder of `VarDef`.
    Auto,
    /// A direct reference to a registered global, produced by redshift.
    FqnConst(Fqn),
    GetAttr {
        value: Box<Expr>,
        attr: Ident,
    },
    GetItem {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    CompareOp {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    CallMethod {
        target: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        value: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn token(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CmpOp {
    pub fn token(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Pos,
    Neg,
    Invert,
    Not,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not ",
        }
    }
}
