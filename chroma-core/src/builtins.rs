#![forbid(unsafe_code)]

//! Builtin types and the host-defined modules every VM starts with:
//! `builtins`, `types`, `rawbuffer` and the internal `__chroma__`.

use std::cell::RefCell;
use std::rc::Rc;

use chroma_ast::{Color, Fqn};

use crate::error::{ChromaError, ErrorKind};
use crate::function::FuncRef;
use crate::list;
use crate::object::{OpHooks, OpKind, RawBuffer, Storage, Type, TypeId, TypeKind, TypeRef, Value};
use crate::opimpl::{OpImpl, Operand};
use crate::registry::ModuleRegistry;
use crate::vm::Vm;

/// The builtin types, created before anything else.
#[derive(Clone, Debug)]
pub struct Builtins {
    pub object: TypeRef,
    pub type_: TypeRef,
    pub dynamic: TypeRef,
    pub void: TypeRef,
    pub i32: TypeRef,
    pub f64: TypeRef,
    pub bool: TypeRef,
    pub str: TypeRef,
    pub notimplemented: TypeRef,
    pub list: TypeRef,
    pub tuple: TypeRef,
    pub module: TypeRef,
    pub raw_buffer: TypeRef,
}

struct TypeFactory<'a> {
    next_id: &'a mut u32,
}

impl TypeFactory<'_> {
    fn make(
        &mut self,
        name: &str,
        base: Option<&TypeRef>,
        kind: TypeKind,
        storage: Storage,
        hooks: OpHooks,
        metatype: Option<TypeRef>,
    ) -> TypeRef {
        let id = TypeId(*self.next_id);
        *self.next_id += 1;
        Rc::new(Type {
            id,
            name: name.to_string(),
            base: base.cloned(),
            kind,
            storage,
            members: Vec::new(),
            hooks,
            metatype,
        })
    }

    fn simple(&mut self, name: &str, base: &TypeRef, kind: TypeKind, storage: Storage) -> TypeRef {
        self.make(name, Some(base), kind, storage, OpHooks::new(), None)
    }
}

/// Hook returning a function of the internal `__chroma__` module.
fn internal_hook(name: &'static str) -> impl Fn(&mut Vm, &[Operand]) -> Result<OpImpl, ChromaError> {
    move |vm, _| Ok(OpImpl::Simple(internal_func(vm, name)?))
}

pub(crate) fn internal_func(vm: &Vm, name: &str) -> Result<FuncRef, ChromaError> {
    match vm.lookup_global(&Fqn::make_global("__chroma__", name)) {
        Some(Value::Func(f)) => Ok(f),
        _ => Err(ChromaError::new(
            ErrorKind::Panic,
            format!("`__chroma__::{name}` is not registered"),
        )),
    }
}

impl Builtins {
    pub(crate) fn new(next_id: &mut u32) -> Self {
        let mut f = TypeFactory { next_id };
        let object = f.make("object", None, TypeKind::Object, Storage::Reference, OpHooks::new(), None);
        let type_ = f.simple("type", &object, TypeKind::Type, Storage::Reference);
        let dynamic = f.make("dynamic", None, TypeKind::Dynamic, Storage::Value, OpHooks::new(), None);
        let void = f.simple("void", &object, TypeKind::Void, Storage::Value);
        let i32 = f.simple("i32", &object, TypeKind::I32, Storage::Value);
        let f64 = f.simple("f64", &object, TypeKind::F64, Storage::Value);
        let bool = f.simple("bool", &object, TypeKind::Bool, Storage::Value);
        let str = f.simple("str", &object, TypeKind::Str, Storage::Value);
        let notimplemented = f.simple("NotImplementedType", &object, TypeKind::NotImplemented, Storage::Value);
        let tuple = f.make(
            "tuple",
            Some(&object),
            TypeKind::Tuple,
            Storage::Reference,
            OpHooks::new().with(OpKind::GetItem, internal_hook("tuple_getitem")),
            None,
        );
        let module = f.make(
            "module",
            Some(&object),
            TypeKind::Module,
            Storage::Reference,
            OpHooks::new()
                .with(OpKind::GetAttr, internal_hook("module_getattr"))
                .with(OpKind::SetAttr, internal_hook("module_setattr")),
            None,
        );
        let raw_buffer = f.simple("RawBuffer", &object, TypeKind::RawBuffer, Storage::Reference);
        // `list[T]` goes through the GETITEM hook of the metatype of `list`
        let meta_list = f.make(
            "Meta_list",
            Some(&type_),
            TypeKind::Meta,
            Storage::Reference,
            OpHooks::new().with(OpKind::GetItem, internal_hook("make_list_type")),
            None,
        );
        let list = f.make(
            "list",
            Some(&object),
            TypeKind::List(None),
            Storage::Reference,
            OpHooks::new(),
            Some(meta_list),
        );
        Self {
            object,
            type_,
            dynamic,
            void,
            i32,
            f64,
            bool,
            str,
            notimplemented,
            list,
            tuple,
            module,
            raw_buffer,
        }
    }
}

fn bad_args(name: &str, args: &[Value]) -> ChromaError {
    ChromaError::new(ErrorKind::Panic, format!("`{name}` called with {args:?}"))
}

pub(crate) fn register(vm: &mut Vm) {
    register_builtins(vm);
    register_types(vm);
    register_internal(vm);
    register_rawbuffer(vm);
}

fn register_builtins(vm: &mut Vm) {
    let b = vm.b.clone();
    let mut reg = ModuleRegistry::new("builtins");
    for ty in [&b.object, &b.type_, &b.dynamic, &b.void, &b.i32, &b.f64, &b.bool, &b.str, &b.list, &b.tuple] {
        reg.add_type(ty);
    }
    reg.add("None", Value::None);
    reg.add("True", Value::Bool(true));
    reg.add("False", Value::Bool(false));
    reg.add("NotImplemented", Value::NotImplemented);

    reg.builtin(vm, "abs", Color::Red, &[("x", b.i32.clone())], b.i32.clone(), |_, args| match args {
        [Value::I32(x)] => Ok(Value::I32(x.wrapping_abs())),
        _ => Err(bad_args("abs", args)),
    });
    reg.builtin(vm, "print", Color::Red, &[("x", b.dynamic.clone())], b.void.clone(), |vm, args| {
        for v in args {
            vm.write_stdout(&format!("{v}\n"));
        }
        Ok(Value::None)
    });
    for (name, ty) in [
        ("print_i32", &b.i32),
        ("print_f64", &b.f64),
        ("print_bool", &b.bool),
        ("print_str", &b.str),
        ("print_void", &b.void),
    ] {
        reg.builtin(vm, name, Color::Red, &[("x", ty.clone())], b.void.clone(), |vm, args| {
            for v in args {
                vm.write_stdout(&format!("{v}\n"));
            }
            Ok(Value::None)
        });
    }
    reg.builtin(vm, "STATIC_TYPE", Color::Blue, &[("expr", b.dynamic.clone())], b.type_.clone(), |_, _| {
        Err(ChromaError::new(
            ErrorKind::Panic,
            "STATIC_TYPE should never be called at runtime",
        ))
    });
    vm.install_module(reg);
}

fn register_types(vm: &mut Vm) {
    let b = vm.b.clone();
    let mut reg = ModuleRegistry::new("types");
    reg.add_type(&b.module);
    let params = [("name", b.str.clone()), ("origin", b.type_.clone())];
    reg.builtin(vm, "makeTypeDef", Color::Blue, &params, b.type_.clone(), |vm, args| match args {
        [Value::Str(name), Value::Type(origin)] => {
            let origin = origin.clone();
            Ok(Value::Type(vm.make_typedef(name, &origin, OpHooks::new())))
        }
        _ => Err(bad_args("makeTypeDef", args)),
    });
    vm.install_module(reg);
}

fn register_internal(vm: &mut Vm) {
    let b = vm.b.clone();
    let mut reg = ModuleRegistry::new("__chroma__");
    let meta_list = b.list.metatype.clone().unwrap_or_else(|| b.type_.clone());
    let params = [("list", meta_list), ("T", b.type_.clone())];
    reg.builtin(vm, "make_list_type", Color::Blue, &params, b.type_.clone(), |vm, args| match args {
        [_, Value::Type(item)] => {
            let item = item.clone();
            Ok(Value::Type(vm.make_list_type(&item)))
        }
        _ => Err(bad_args("make_list_type", args)),
    });

    let params = [("t", b.tuple.clone()), ("i", b.i32.clone())];
    reg.builtin(vm, "tuple_getitem", Color::Red, &params, b.dynamic.clone(), |_, args| match args {
        [Value::Tuple(items), Value::I32(i)] => list::index(items, *i)
            .cloned()
            .ok_or_else(|| ChromaError::new(ErrorKind::Panic, "tuple index out of range")),
        _ => Err(bad_args("tuple_getitem", args)),
    });

    let params = [("m", b.module.clone()), ("attr", b.str.clone())];
    reg.builtin(vm, "module_getattr", Color::Red, &params, b.dynamic.clone(), |vm, args| match args {
        [Value::Module(m), Value::Str(attr)] => vm
            .lookup_global(&Fqn::make_global(m.as_ref(), attr.as_ref()))
            .ok_or_else(|| {
                ChromaError::new(
                    ErrorKind::Name,
                    format!("module `{m}` has no attribute `{attr}`"),
                )
            }),
        _ => Err(bad_args("module_getattr", args)),
    });
    let params = [
        ("m", b.module.clone()),
        ("attr", b.str.clone()),
        ("v", b.dynamic.clone()),
    ];
    reg.builtin(vm, "module_setattr", Color::Red, &params, b.void.clone(), |vm, args| match args {
        [Value::Module(m), Value::Str(attr), v] => {
            vm.store_global(&Fqn::make_global(m.as_ref(), attr.as_ref()), v.clone())?;
            Ok(Value::None)
        }
        _ => Err(bad_args("module_setattr", args)),
    });
    vm.install_module(reg);
}

fn buffer_slot<'a>(buf: &'a mut [u8], offset: i32, size: usize) -> Result<&'a mut [u8], ChromaError> {
    let start = usize::try_from(offset).ok();
    match start.and_then(|s| buf.get_mut(s..s + size)) {
        Some(slot) => Ok(slot),
        None => Err(ChromaError::new(
            ErrorKind::Panic,
            format!("buffer access out of bounds: offset {offset}, size {size}"),
        )),
    }
}

fn register_rawbuffer(vm: &mut Vm) {
    let b = vm.b.clone();
    let rb = b.raw_buffer.clone();
    let mut reg = ModuleRegistry::new("rawbuffer");
    reg.add_type(&rb);

    reg.builtin(vm, "rb_alloc", Color::Red, &[("size", b.i32.clone())], rb.clone(), |_, args| match args {
        [Value::I32(size)] => {
            let size = usize::try_from(*size)
                .map_err(|_| ChromaError::new(ErrorKind::Panic, "negative buffer size"))?;
            Ok(Value::Buffer(Rc::new(RawBuffer {
                bytes: RefCell::new(vec![0; size]),
            })))
        }
        _ => Err(bad_args("rb_alloc", args)),
    });

    let params = [("rb", rb.clone()), ("offset", b.i32.clone()), ("v", b.i32.clone())];
    reg.builtin(vm, "rb_set_i32", Color::Red, &params, b.void.clone(), |_, args| match args {
        [Value::Buffer(buf), Value::I32(offset), Value::I32(v)] => {
            let mut bytes = buf.bytes.borrow_mut();
            buffer_slot(&mut bytes, *offset, 4)?.copy_from_slice(&v.to_le_bytes());
            Ok(Value::None)
        }
        _ => Err(bad_args("rb_set_i32", args)),
    });
    let params = [("rb", rb.clone()), ("offset", b.i32.clone())];
    reg.builtin(vm, "rb_get_i32", Color::Red, &params, b.i32.clone(), |_, args| match args {
        [Value::Buffer(buf), Value::I32(offset)] => {
            let mut bytes = buf.bytes.borrow_mut();
            let slot = buffer_slot(&mut bytes, *offset, 4)?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(slot);
            Ok(Value::I32(i32::from_le_bytes(raw)))
        }
        _ => Err(bad_args("rb_get_i32", args)),
    });
    let params = [("rb", rb.clone()), ("offset", b.i32.clone()), ("v", b.f64.clone())];
    reg.builtin(vm, "rb_set_f64", Color::Red, &params, b.void.clone(), |_, args| match args {
        [Value::Buffer(buf), Value::I32(offset), Value::F64(v)] => {
            let mut bytes = buf.bytes.borrow_mut();
            buffer_slot(&mut bytes, *offset, 8)?.copy_from_slice(&v.to_le_bytes());
            Ok(Value::None)
        }
        _ => Err(bad_args("rb_set_f64", args)),
    });
    let params = [("rb", rb.clone()), ("offset", b.i32.clone())];
    reg.builtin(vm, "rb_get_f64", Color::Red, &params, b.f64.clone(), |_, args| match args {
        [Value::Buffer(buf), Value::I32(offset)] => {
            let mut bytes = buf.bytes.borrow_mut();
            let slot = buffer_slot(&mut bytes, *offset, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(slot);
            Ok(Value::F64(f64::from_le_bytes(raw)))
        }
        _ => Err(bad_args("rb_get_f64", args)),
    });
    vm.install_module(reg);
}
