#![forbid(unsafe_code)]

mod astframe;
mod bluecache;
mod builtins;
mod config;
mod error;
mod function;
mod list;
mod modgen;
mod object;
mod opimpl;
pub mod ops;
mod redshift;
mod registry;
mod scope;
mod symtable;
mod typecheck;
mod vm;

pub use astframe::AstFrame;
pub use bluecache::BlueCache;
pub use builtins::Builtins;
pub use config::{ConfigError, VmConfig};
pub use error::{Annotation, ChromaError, ErrorKind, ErrorReport, Level, maybe_plural};
pub use function::{AstFunc, BuiltinImpl, Func, FuncKind, FuncParam, FuncRef, FuncType, Namespace};
pub use object::{
    Instance, ListObj, Member, OpHook, OpHooks, OpKind, RawBuffer, Storage, Type, TypeBuilder, TypeId, TypeKind,
    TypeRef, Value, same_type,
};
pub use opimpl::{OpCall, OpImpl, Operand, TypeConverter};
pub use redshift::redshift;
pub use registry::ModuleRegistry;
pub use scope::{ScopeAnalyzer, Scopes};
pub use symtable::{SymTable, Symbol};
pub use typecheck::{Dispatch, StoreTarget, TypeChecker, convert_type_maybe, typecheck_opimpl};
pub use vm::Vm;
