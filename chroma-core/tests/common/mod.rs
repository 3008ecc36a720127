#![allow(dead_code)]

use chroma_ast::Module;
use chroma_core::{ChromaError, ErrorKind, Value, Vm, VmConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Run the module as written.
    Interp,
    /// Redshift every red function first.
    Doppler,
}

pub const MODES: [Mode; 2] = [Mode::Interp, Mode::Doppler];

pub fn new_vm() -> Vm {
    Vm::new(VmConfig::default())
}

/// Import `module` as `test` in a fresh VM prepared by `setup`, and redshift
/// it in doppler mode.
pub fn load_with(mode: Mode, setup: impl Fn(&mut Vm), module: &Module) -> Result<Vm, ChromaError> {
    let mut vm = new_vm();
    setup(&mut vm);
    vm.import_module("test", module)?;
    if mode == Mode::Doppler {
        vm.redshift_all()?;
    }
    Ok(vm)
}

pub fn load(mode: Mode, module: &Module) -> Vm {
    load_with(mode, |_| {}, module).expect("load module")
}

/// Run `check` once per mode on a freshly loaded VM.
pub fn for_each_mode(module: &Module, mut check: impl FnMut(&mut Vm, Mode)) {
    for mode in MODES {
        let mut vm = load(mode, module);
        check(&mut vm, mode);
    }
}

pub fn call(vm: &mut Vm, fqn: &str, args: &[Value]) -> Value {
    vm.call_global(fqn, args).expect("call")
}

pub fn call_i32(vm: &mut Vm, fqn: &str, args: &[Value]) -> i32 {
    call(vm, fqn, args).as_i32().expect("i32 result")
}

pub fn call_f64(vm: &mut Vm, fqn: &str, args: &[Value]) -> f64 {
    call(vm, fqn, args).as_f64().expect("f64 result")
}

/// The error of loading `module` in `mode`, or of calling `test::foo`.
pub fn load_and_call_err(mode: Mode, module: &Module, args: &[Value]) -> ChromaError {
    let res = load_with(mode, |_| {}, module).and_then(|mut vm| vm.call_global("test::foo", args));
    match res {
        Ok(v) => panic!("expected an error, got {v:?}"),
        Err(e) => e,
    }
}

pub fn assert_error(err: &ChromaError, kind: ErrorKind, message: &str) {
    assert!(err.is(kind), "expected {kind:?}, got {err:?}");
    assert!(
        err.to_string().contains(message),
        "expected message containing {message:?}, got {:?}",
        err.to_string()
    );
}

pub fn assert_annotation(err: &ChromaError, message: &str) {
    assert!(
        err.annotations.iter().any(|a| a.message.contains(message)),
        "expected an annotation containing {message:?}, got {:?}",
        err.annotations
    );
}
