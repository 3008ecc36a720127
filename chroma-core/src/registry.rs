#![forbid(unsafe_code)]

use chroma_ast::{Color, Qn};

use crate::error::ChromaError;
use crate::function::FuncRef;
use crate::object::{TypeRef, Value};
use crate::vm::Vm;

/// Content of a host-defined module, installed with `Vm::make_module`.
///
/// ```ignore
/// let mut reg = ModuleRegistry::new("ext");
/// reg.builtin(&mut vm, "double", Color::Red, &[("x", i32.clone())], i32, |_, args| ...);
/// vm.make_module(reg)?;
/// ```
pub struct ModuleRegistry {
    modname: String,
    content: Vec<(String, Value)>,
}

impl ModuleRegistry {
    pub fn new(modname: impl Into<String>) -> Self {
        Self {
            modname: modname.into(),
            content: Vec::new(),
        }
    }

    pub fn modname(&self) -> &str {
        &self.modname
    }

    pub fn add(&mut self, attr: &str, value: Value) {
        self.content.push((attr.to_string(), value));
    }

    pub fn add_type(&mut self, ty: &TypeRef) {
        self.add(&ty.name, Value::Type(ty.clone()));
    }

    pub fn builtin<F>(
        &mut self,
        vm: &mut Vm,
        attr: &str,
        color: Color,
        params: &[(&str, TypeRef)],
        restype: TypeRef,
        f: F,
    ) -> FuncRef
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Value, ChromaError> + 'static,
    {
        let func = vm.builtin_func(Qn::new(&self.modname, attr), color, params, restype, f);
        self.add(attr, Value::Func(func.clone()));
        func
    }

    pub fn items(&self) -> &[(String, Value)] {
        &self.content
    }

    pub(crate) fn into_items(self) -> (String, Vec<(String, Value)>) {
        (self.modname, self.content)
    }
}
