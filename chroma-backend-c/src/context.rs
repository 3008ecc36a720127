#![forbid(unsafe_code)]

use chroma_ast::Fqn;
use chroma_core::{FuncType, TypeKind, TypeRef, Vm};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("C backend error: {message}")]
#[diagnostic(code(chroma::backend_c))]
#[allow(unused_assignments)]
pub struct CBackendError {
    pub message: String,
}

impl CBackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Translation of chroma types and signatures to C.
pub struct CContext<'vm> {
    pub vm: &'vm Vm,
}

impl<'vm> CContext<'vm> {
    pub fn new(vm: &'vm Vm) -> Self {
        Self { vm }
    }

    /// The C type used to store values of `ty`. Aliases resolve to their
    /// origin.
    pub fn w2c(&self, ty: &TypeRef) -> Result<&'static str, CBackendError> {
        let mut ty = ty;
        while let Some(origin) = ty.alias_origin() {
            ty = origin;
        }
        match ty.kind {
            TypeKind::Void => Ok("void"),
            TypeKind::I32 => Ok("int32_t"),
            TypeKind::F64 => Ok("double"),
            TypeKind::Bool => Ok("bool"),
            TypeKind::Str => Ok("chroma_Str *"),
            TypeKind::RawBuffer => Ok("chroma_RawBuffer *"),
            _ => Err(CBackendError::new(format!("cannot translate type `{}` to C", ty.name))),
        }
    }

    pub fn is_void(&self, ty: &TypeRef) -> bool {
        matches!(self.w2c(ty), Ok("void"))
    }

    /// `int32_t chroma_test$add(int32_t x, int32_t y)`
    ///
    /// `void` parameters carry no data and are left out.
    pub fn c_function_proto(&self, fqn: &Fqn, sig: &FuncType) -> Result<String, CBackendError> {
        let restype = self.w2c(&sig.restype)?;
        let mut params = Vec::new();
        for p in &sig.params {
            let ctype = self.w2c(&p.ty)?;
            if ctype != "void" {
                params.push(declare(ctype, &p.name));
            }
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        Ok(format!("{} {}({params})", restype, fqn.c_name()))
    }
}

/// A declarator: pointer types keep their `*` next to the name.
pub(crate) fn declare(ctype: &str, name: &str) -> String {
    if ctype.ends_with('*') {
        format!("{ctype}{name}")
    } else {
        format!("{ctype} {name}")
    }
}

#[cfg(test)]
mod tests {
    use chroma_core::{FuncParam, OpHooks, VmConfig};

    use super::*;

    #[test]
    fn builtin_types() {
        let vm = Vm::new(VmConfig::default());
        let ctx = CContext::new(&vm);
        assert_eq!(ctx.w2c(&vm.b.i32).expect("i32"), "int32_t");
        assert_eq!(ctx.w2c(&vm.b.f64).expect("f64"), "double");
        assert_eq!(ctx.w2c(&vm.b.bool).expect("bool"), "bool");
        assert_eq!(ctx.w2c(&vm.b.void).expect("void"), "void");
        assert_eq!(ctx.w2c(&vm.b.str).expect("str"), "chroma_Str *");
        assert_eq!(ctx.w2c(&vm.b.raw_buffer).expect("rb"), "chroma_RawBuffer *");

        let err = ctx.w2c(&vm.b.dynamic).expect_err("dynamic");
        assert_eq!(err.message, "cannot translate type `dynamic` to C");
    }

    #[test]
    fn aliases_resolve_to_their_origin() {
        let mut vm = Vm::new(VmConfig::default());
        let origin = vm.b.f64.clone();
        let meters = vm.make_typedef("Meters", &origin, OpHooks::default());
        let ctx = CContext::new(&vm);
        assert_eq!(ctx.w2c(&meters).expect("alias"), "double");
    }

    #[test]
    fn prototypes() {
        let vm = Vm::new(VmConfig::default());
        let ctx = CContext::new(&vm);
        let sig = FuncType {
            color: chroma_ast::Color::Red,
            params: vec![FuncParam::new("s", vm.b.str.clone()), FuncParam::new("n", vm.b.i32.clone())],
            restype: vm.b.str.clone(),
        };
        let proto = ctx.c_function_proto(&Fqn::make_global("my.mod", "rep"), &sig).expect("proto");
        assert_eq!(proto, "chroma_Str * chroma_my_mod$rep(chroma_Str *s, int32_t n)");

        let sig = FuncType {
            color: chroma_ast::Color::Red,
            params: Vec::new(),
            restype: vm.b.void.clone(),
        };
        let proto = ctx.c_function_proto(&Fqn::make("test", "main", "1"), &sig).expect("proto");
        assert_eq!(proto, "void chroma_test$main$1(void)");

        let sig = FuncType {
            color: chroma_ast::Color::Red,
            params: vec![FuncParam::new("x", vm.b.void.clone())],
            restype: vm.b.void.clone(),
        };
        let proto = ctx.c_function_proto(&Fqn::make_global("builtins", "print_void"), &sig).expect("proto");
        assert_eq!(proto, "void chroma_builtins$print_void(void)");
    }
}
