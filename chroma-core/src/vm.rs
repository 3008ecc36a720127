#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chroma_ast::{Color, Fqn, FuncDef, NodeId, Qn, UnaryOp};
use tracing::{debug, info, trace};

use crate::astframe::AstFrame;
use crate::bluecache::BlueCache;
use crate::builtins::{self, Builtins};
use crate::config::VmConfig;
use crate::error::{ChromaError, ErrorKind, maybe_plural};
use crate::function::{AstFunc, Func, FuncKind, FuncParam, FuncRef, FuncType, FuncTypeKey, Namespace};
use crate::list::ListMethod;
use crate::object::{Instance, Member, OpHooks, OpKind, Storage, Type, TypeBuilder, TypeId, TypeKind, TypeRef, Value};
use crate::opimpl::OpImpl;
use crate::ops::{self, MultiMethodTable};
use crate::registry::ModuleRegistry;
use crate::symtable::SymTable;

/// The virtual machine: owns every global, type and function, and runs
/// both blue and red code.
pub struct Vm {
    pub config: VmConfig,
    pub b: Builtins,
    globals: HashMap<Fqn, Value>,
    /// Registration order of `globals`.
    globals_order: Vec<Fqn>,
    /// Declared types of globals defined with an explicit type.
    global_types: HashMap<Fqn, TypeRef>,
    /// Module name to filename.
    modules: BTreeMap<String, String>,
    unique_counters: HashMap<Qn, u32>,
    next_type_id: u32,
    functypes: HashMap<FuncTypeKey, TypeRef>,
    direct_calls: HashMap<TypeId, FuncRef>,
    pub(crate) list_types: HashMap<TypeId, TypeRef>,
    pub(crate) list_methods: HashMap<(TypeId, ListMethod), FuncRef>,
    accessors: HashMap<(TypeId, String, bool), FuncRef>,
    constructors: HashMap<TypeId, FuncRef>,
    pub(crate) binops: MultiMethodTable,
    pub(crate) unaryops: HashMap<(UnaryOp, TypeId), FuncRef>,
    pub(crate) bluecache: BlueCache,
    symtables: HashMap<NodeId, Rc<SymTable>>,
    module_scopes: HashMap<String, Rc<SymTable>>,
    builtins_scope: Option<Rc<SymTable>>,
    call_depth: usize,
    /// Output of `print`, when `config.capture_stdout` is set.
    pub stdout: String,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm").finish_non_exhaustive()
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let mut next_type_id = 0;
        let b = Builtins::new(&mut next_type_id);
        let mut vm = Vm {
            config,
            b,
            globals: HashMap::new(),
            globals_order: Vec::new(),
            global_types: HashMap::new(),
            modules: BTreeMap::new(),
            unique_counters: HashMap::new(),
            next_type_id,
            functypes: HashMap::new(),
            direct_calls: HashMap::new(),
            list_types: HashMap::new(),
            list_methods: HashMap::new(),
            accessors: HashMap::new(),
            constructors: HashMap::new(),
            binops: MultiMethodTable::new(),
            unaryops: HashMap::new(),
            bluecache: BlueCache::default(),
            symtables: HashMap::new(),
            module_scopes: HashMap::new(),
            builtins_scope: None,
            call_depth: 0,
            stdout: String::new(),
        };
        builtins::register(&mut vm);
        ops::register(&mut vm);
        debug!(globals = vm.globals.len(), "vm initialized");
        vm
    }

    // ==== globals ====

    pub fn register_module(&mut self, modname: &str, filename: &str) -> Result<(), ChromaError> {
        if self.modules.contains_key(modname) {
            return Err(ChromaError::new(
                ErrorKind::Import,
                format!("module `{modname}` already exists"),
            ));
        }
        self.modules.insert(modname.to_string(), filename.to_string());
        Ok(())
    }

    pub fn has_module(&self, modname: &str) -> bool {
        self.modules.contains_key(modname)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Register a new global. `ty` is the declared type, if any.
    pub fn add_global(&mut self, fqn: Fqn, ty: Option<TypeRef>, value: Value) -> Result<(), ChromaError> {
        if self.globals.contains_key(&fqn) {
            return Err(ChromaError::new(
                ErrorKind::Scope,
                format!("global `{fqn}` already defined"),
            ));
        }
        trace!(fqn = %fqn, "add global");
        if let Some(ty) = ty {
            self.global_types.insert(fqn.clone(), ty);
        }
        self.globals_order.push(fqn.clone());
        self.globals.insert(fqn, value);
        Ok(())
    }

    pub fn lookup_global(&self, fqn: &Fqn) -> Option<Value> {
        self.globals.get(fqn).cloned()
    }

    pub fn global_type(&self, fqn: &Fqn) -> Option<TypeRef> {
        self.global_types.get(fqn).cloned()
    }

    /// Assign to an existing global, checking its declared type.
    pub fn store_global(&mut self, fqn: &Fqn, value: Value) -> Result<(), ChromaError> {
        if !self.globals.contains_key(fqn) {
            return Err(ChromaError::new(
                ErrorKind::Name,
                format!("global `{fqn}` does not exist"),
            ));
        }
        if let Some(ty) = self.global_types.get(fqn) {
            if !self.isinstance(&value, ty) {
                let got = self.dynamic_type(&value);
                return Err(ChromaError::new(
                    ErrorKind::Type,
                    format!("mismatched types: expected `{}`, got `{}`", ty.name, got.name),
                ));
            }
        }
        self.globals.insert(fqn.clone(), value);
        Ok(())
    }

    /// Swap the value of a global, e.g. a function with its redshifted
    /// version.
    pub(crate) fn replace_global(&mut self, fqn: &Fqn, value: Value) {
        if let Some(slot) = self.globals.get_mut(fqn) {
            *slot = value;
        }
    }

    /// The first registered global which is `value`.
    pub fn reverse_lookup_global(&self, value: &Value) -> Option<Fqn> {
        self.globals_order
            .iter()
            .find(|fqn| self.globals.get(*fqn).is_some_and(|v| v.is_same(value)))
            .cloned()
    }

    /// A name for a new global. Non-global names get the first free
    /// numeric suffix.
    pub fn get_unique_fqn(&mut self, qn: &Qn, is_global: bool) -> Fqn {
        if is_global {
            return Fqn::make_global(&qn.modname, &qn.attr);
        }
        loop {
            let n = self.unique_counters.entry(qn.clone()).or_insert(0);
            let fqn = Fqn::from_qn(qn, n.to_string());
            *n += 1;
            if !self.globals.contains_key(&fqn) {
                return fqn;
            }
        }
    }

    /// Every global, in registration order.
    pub fn globals(&self) -> Vec<(Fqn, Value)> {
        self.globals_order
            .iter()
            .filter_map(|fqn| self.globals.get(fqn).map(|v| (fqn.clone(), v.clone())))
            .collect()
    }

    /// Globals of `modname`, in registration order.
    pub fn module_items(&self, modname: &str) -> Vec<(Fqn, Value)> {
        self.globals_order
            .iter()
            .filter(|fqn| fqn.modname() == modname)
            .filter_map(|fqn| self.globals.get(fqn).map(|v| (fqn.clone(), v.clone())))
            .collect()
    }

    /// Install a host-defined module.
    pub fn make_module(&mut self, reg: ModuleRegistry) -> Result<(), ChromaError> {
        let (modname, items) = reg.into_items();
        self.register_module(&modname, &format!("<{modname}>"))?;
        for (attr, value) in items {
            self.add_global(Fqn::make_global(&modname, &attr), None, value)?;
        }
        info!(modname = %modname, "host module installed");
        Ok(())
    }

    /// Like `make_module`, for the modules the VM starts with, whose names
    /// never clash.
    pub(crate) fn install_module(&mut self, reg: ModuleRegistry) {
        let (modname, items) = reg.into_items();
        self.modules.insert(modname.clone(), format!("<{modname}>"));
        for (attr, value) in items {
            let fqn = Fqn::make_global(&modname, &attr);
            self.globals_order.push(fqn.clone());
            self.globals.insert(fqn, value);
        }
    }

    // ==== scopes ====

    pub(crate) fn builtins_scope(&mut self) -> Rc<SymTable> {
        if let Some(scope) = &self.builtins_scope {
            return scope.clone();
        }
        let scope = SymTable::from_builtins(self);
        self.builtins_scope = Some(scope.clone());
        scope
    }

    pub(crate) fn add_scopes(&mut self, modname: &str, module: Rc<SymTable>, funcdefs: HashMap<NodeId, Rc<SymTable>>) {
        self.module_scopes.insert(modname.to_string(), module);
        self.symtables.extend(funcdefs);
    }

    pub(crate) fn set_symtable(&mut self, id: NodeId, table: Rc<SymTable>) {
        self.symtables.insert(id, table);
    }

    pub fn module_scope(&self, modname: &str) -> Option<Rc<SymTable>> {
        self.module_scopes.get(modname).cloned()
    }

    pub fn symtable_for(&self, funcdef: &FuncDef) -> Result<Rc<SymTable>, ChromaError> {
        self.symtables.get(&funcdef.id).cloned().ok_or_else(|| {
            ChromaError::panic(
                format!("no symbol table for function `{}`", funcdef.name),
                &funcdef.loc,
            )
        })
    }

    // ==== types ====

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn alloc_type(
        &mut self,
        name: String,
        base: Option<TypeRef>,
        kind: TypeKind,
        storage: Storage,
        members: Vec<Member>,
        hooks: OpHooks,
        metatype: Option<TypeRef>,
    ) -> TypeRef {
        let id = TypeId(self.next_type_id);
        self.next_type_id += 1;
        Rc::new(Type {
            id,
            name,
            base,
            kind,
            storage,
            members,
            hooks,
            metatype,
        })
    }

    /// Create a host-defined type. A type with members and no meta-level
    /// CALL hook can be instantiated by calling it with no arguments.
    pub fn make_type(&mut self, builder: TypeBuilder) -> TypeRef {
        let TypeBuilder {
            name,
            base,
            storage,
            members,
            hooks,
            mut meta_hooks,
        } = builder;
        if !members.is_empty() && !meta_hooks.has_override(OpKind::Call) {
            meta_hooks = meta_hooks.with(OpKind::Call, |vm, operands| {
                let Some(cls) = operands.first() else {
                    return Ok(OpImpl::Null);
                };
                let ty = cls.blue_type()?;
                Ok(OpImpl::Simple(vm.instance_constructor(&ty)))
            });
        }
        let metatype = (!meta_hooks.is_empty()).then(|| {
            let base = self.b.type_.clone();
            self.alloc_type(
                format!("Meta_{name}"),
                Some(base),
                TypeKind::Meta,
                Storage::Reference,
                Vec::new(),
                meta_hooks,
                None,
            )
        });
        let base = base.unwrap_or_else(|| self.b.object.clone());
        let t = self.alloc_type(name, Some(base), TypeKind::Instance, storage, members, hooks, metatype);
        debug!(name = %t.name, "new type");
        t
    }

    /// An alias of `origin`: values convert freely between the two, but the
    /// alias may carry its own operator hooks.
    pub fn make_typedef(&mut self, name: &str, origin: &TypeRef, hooks: OpHooks) -> TypeRef {
        let base = self.b.object.clone();
        self.alloc_type(
            name.to_string(),
            Some(base),
            TypeKind::Alias(origin.clone()),
            origin.storage,
            Vec::new(),
            hooks,
            None,
        )
    }

    /// The interned type of functions with this signature.
    pub fn functype(&mut self, color: Color, params: Vec<FuncParam>, restype: TypeRef) -> TypeRef {
        let ft = FuncType { color, params, restype };
        let key = ft.key();
        if let Some(t) = self.functypes.get(&key) {
            return t.clone();
        }
        let name = ft.signature();
        let base = self.b.object.clone();
        let t = self.alloc_type(name, Some(base), TypeKind::Func(ft), Storage::Reference, Vec::new(), OpHooks::new(), None);
        self.functypes.insert(key, t.clone());
        t
    }

    pub fn dynamic_type(&self, value: &Value) -> TypeRef {
        let b = &self.b;
        match value {
            Value::None => b.void.clone(),
            Value::NotImplemented => b.notimplemented.clone(),
            Value::I32(_) => b.i32.clone(),
            Value::F64(_) => b.f64.clone(),
            Value::Bool(_) => b.bool.clone(),
            Value::Str(_) => b.str.clone(),
            Value::Type(t) => t.metatype.clone().unwrap_or_else(|| b.type_.clone()),
            Value::Func(f) => f.ty.clone(),
            Value::List(l) => l.ty.clone(),
            Value::Tuple(_) => b.tuple.clone(),
            Value::Instance(obj) => obj.ty.clone(),
            Value::Buffer(_) => b.raw_buffer.clone(),
            Value::Module(_) => b.module.clone(),
        }
    }

    /// Walk the base chain of `sub`. Everything is a subclass of `dynamic`.
    pub fn issubclass(&self, sub: &TypeRef, sup: &TypeRef) -> bool {
        if sup.is_dynamic() {
            return true;
        }
        let mut cur = Some(sub.clone());
        while let Some(t) = cur {
            if t.is(sup) {
                return true;
            }
            cur = t.base.clone();
        }
        false
    }

    pub fn isinstance(&self, value: &Value, ty: &TypeRef) -> bool {
        if let Some(origin) = ty.alias_origin() {
            return self.isinstance(value, origin);
        }
        self.issubclass(&self.dynamic_type(value), ty)
    }

    /// The most specific common ancestor of `a` and `b`.
    pub fn union_type(&self, a: &TypeRef, b: &TypeRef) -> TypeRef {
        if a.is_dynamic() || b.is_dynamic() {
            return self.b.dynamic.clone();
        }
        let mut cur = Some(a.clone());
        while let Some(t) = cur {
            if self.issubclass(b, &t) {
                return t;
            }
            cur = t.base.clone();
        }
        self.b.object.clone()
    }

    // ==== functions ====

    pub fn builtin_func<F>(
        &mut self,
        qn: Qn,
        color: Color,
        params: &[(&str, TypeRef)],
        restype: TypeRef,
        f: F,
    ) -> FuncRef
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Value, ChromaError> + 'static,
    {
        let params: Vec<FuncParam> = params.iter().map(|(n, t)| FuncParam::new(*n, t.clone())).collect();
        let sig = FuncType {
            color,
            params: params.clone(),
            restype: restype.clone(),
        };
        let ty = self.functype(color, params, restype);
        Rc::new(Func::new(qn, ty, sig, FuncKind::Builtin(Rc::new(f))))
    }

    pub fn new_ast_func(
        &mut self,
        qn: Qn,
        ty: TypeRef,
        funcdef: Rc<FuncDef>,
        closure: Vec<Rc<Namespace>>,
        locals_types: Option<BTreeMap<String, TypeRef>>,
    ) -> Result<FuncRef, ChromaError> {
        let sig = ty.functype().cloned().ok_or_else(|| {
            ChromaError::panic(format!("`{}` is not a function type", ty.name), &funcdef.loc)
        })?;
        let kind = FuncKind::Ast(AstFunc {
            funcdef,
            closure,
            locals_types,
        });
        Ok(Rc::new(Func::new(qn, ty, sig, kind)))
    }

    /// The placeholder used to call values of function type `functype`.
    pub fn direct_call_func(&mut self, functype: &TypeRef) -> Result<FuncRef, ChromaError> {
        if let Some(f) = self.direct_calls.get(&functype.id) {
            return Ok(f.clone());
        }
        let sig = functype.functype().cloned().ok_or_else(|| {
            ChromaError::new(
                ErrorKind::Panic,
                format!("`{}` is not a function type", functype.name),
            )
        })?;
        let func = Rc::new(Func::new(
            Qn::new("__chroma__", "direct_call"),
            functype.clone(),
            sig,
            FuncKind::DirectCall,
        ));
        self.direct_calls.insert(functype.id, func.clone());
        Ok(func)
    }

    /// `T::__get_x__(self: T) -> X` or `T::__set_x__(self: T, v: X) -> void`.
    pub(crate) fn member_accessor(&mut self, ty: &TypeRef, name: &str, is_set: bool) -> Result<FuncRef, ChromaError> {
        let key = (ty.id, name.to_string(), is_set);
        if let Some(f) = self.accessors.get(&key) {
            return Ok(f.clone());
        }
        let member = ty.member(name).cloned().ok_or_else(|| {
            ChromaError::new(
                ErrorKind::Panic,
                format!("type `{}` has no member `{name}`", ty.name),
            )
        })?;
        let field = name.to_string();
        let func = if is_set {
            let qn = Qn::new(&ty.name, format!("__set_{name}__"));
            let params = [("self", ty.clone()), ("v", member.ty.clone())];
            let void = self.b.void.clone();
            self.builtin_func(qn, Color::Red, &params, void, move |_, args| match args {
                [Value::Instance(obj), v] => {
                    obj.set_field(&field, v.clone());
                    Ok(Value::None)
                }
                _ => Err(ChromaError::new(ErrorKind::Panic, format!("cannot set member `{field}`"))),
            })
        } else {
            let qn = Qn::new(&ty.name, format!("__get_{name}__"));
            self.builtin_func(qn, Color::Red, &[("self", ty.clone())], member.ty.clone(), move |_, args| {
                match args {
                    [Value::Instance(obj)] => obj.get_field(&field).ok_or_else(|| {
                        ChromaError::new(ErrorKind::Panic, format!("member `{field}` is not initialized"))
                    }),
                    _ => Err(ChromaError::new(ErrorKind::Panic, format!("cannot get member `{field}`"))),
                }
            })
        };
        self.accessors.insert(key, func.clone());
        Ok(func)
    }

    /// `new(cls: Meta_T) -> T`, which builds an instance with every member
    /// set to the zero value of its type.
    pub(crate) fn instance_constructor(&mut self, ty: &TypeRef) -> FuncRef {
        if let Some(f) = self.constructors.get(&ty.id) {
            return f.clone();
        }
        let meta = ty.metatype.clone().unwrap_or_else(|| self.b.type_.clone());
        let t = ty.clone();
        let qn = Qn::new(&ty.name, "__new__");
        let func = self.builtin_func(qn, Color::Red, &[("cls", meta)], ty.clone(), move |vm, _| {
            let obj = Instance::new(t.clone());
            for m in &t.members {
                obj.set_field(&m.name, vm.zero_value(&m.ty));
            }
            Ok(Value::Instance(Rc::new(obj)))
        });
        self.constructors.insert(ty.id, func.clone());
        func
    }

    pub fn zero_value(&self, ty: &TypeRef) -> Value {
        match &ty.kind {
            TypeKind::I32 => Value::I32(0),
            TypeKind::F64 => Value::F64(0.0),
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Str => Value::str(""),
            TypeKind::Alias(origin) => self.zero_value(origin),
            _ => Value::None,
        }
    }

    // ==== calls ====

    pub fn call(&mut self, func: &FuncRef, args: &[Value]) -> Result<Value, ChromaError> {
        let sig = func.functype();
        if args.len() != sig.arity() {
            return Err(ChromaError::new(
                ErrorKind::Type,
                format!(
                    "this function takes {} but {} were supplied",
                    maybe_plural(sig.arity(), "argument"),
                    maybe_plural(args.len(), "argument")
                ),
            ));
        }
        if func.as_ast().is_some() {
            for (param, arg) in sig.params.iter().zip(args) {
                if !self.isinstance(arg, &param.ty) {
                    let got = self.dynamic_type(arg);
                    return Err(ChromaError::new(
                        ErrorKind::Type,
                        format!(
                            "mismatched types: `{}` expects `{}` for `{}`, got `{}`",
                            func.qn, param.ty.name, param.name, got.name
                        ),
                    ));
                }
            }
        }
        let use_cache = func.is_blue() && self.config.blue_cache;
        if use_cache {
            if let Some(v) = self.bluecache.lookup(func, args) {
                return Ok(v);
            }
        }
        if self.call_depth >= self.config.max_call_depth {
            return Err(ChromaError::new(ErrorKind::Panic, "maximum recursion depth exceeded"));
        }
        self.call_depth += 1;
        let res = match &func.kind {
            FuncKind::Ast(_) => match AstFrame::new(self, func.clone()) {
                Ok(mut frame) => frame.run(self, args),
                Err(err) => Err(err),
            },
            FuncKind::Builtin(f) => {
                let f = f.clone();
                f(self, args)
            }
            FuncKind::DirectCall => Err(ChromaError::new(
                ErrorKind::Panic,
                "direct-call placeholders cannot be called",
            )),
        };
        self.call_depth -= 1;
        let value = res?;
        if use_cache {
            self.bluecache.record(func, args.to_vec(), value.clone());
        }
        Ok(value)
    }

    /// Call the global function named `fqn`, e.g. `"test::foo"`.
    pub fn call_global(&mut self, fqn: &str, args: &[Value]) -> Result<Value, ChromaError> {
        let fqn = Fqn::parse(fqn).map_err(|e| ChromaError::new(ErrorKind::Name, e.to_string()))?;
        match self.lookup_global(&fqn) {
            Some(Value::Func(f)) => self.call(&f, args),
            Some(other) => {
                let t = self.dynamic_type(&other);
                Err(ChromaError::new(
                    ErrorKind::Type,
                    format!("cannot call objects of type `{}`", t.name),
                ))
            }
            None => Err(ChromaError::new(
                ErrorKind::Name,
                format!("global `{fqn}` does not exist"),
            )),
        }
    }

    pub fn bluecache(&self) -> &BlueCache {
        &self.bluecache
    }

    pub fn write_stdout(&mut self, text: &str) {
        if self.config.capture_stdout {
            self.stdout.push_str(text);
        } else {
            print!("{text}");
        }
    }

    /// Return the captured output and clear it.
    pub fn take_stdout(&mut self) -> String {
        std::mem::take(&mut self.stdout)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new(VmConfig::default())
    }
}
