mod common;

use chroma_ast::build as b;
use chroma_ast::{Fqn, Module};
use chroma_core::{Value, Vm, VmConfig};
use common::{MODES, Mode, call_i32, for_each_mode};

fn counter(vm: &Vm) -> Option<i32> {
    vm.lookup_global(&Fqn::make_global("test", "counter")).and_then(|v| v.as_i32())
}

/// `bump` is blue and has a side effect on `counter`.
fn bump_module() -> Module {
    // var counter: i32 = 0
    // @blue
    // def bump(x: i32) -> i32:
    //     counter = counter + 1
    //     return x
    // def foo() -> i32:
    //     return bump(1) + bump(1) + bump(2)
    b::module(
        "cache.chroma",
        vec![
            b::var("counter", b::name("i32"), b::int(0)),
            b::def(b::blue_func(
                "bump",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![
                    b::assign("counter", b::add(b::name("counter"), b::int(1))),
                    b::ret(b::name("x")),
                ],
            )),
            b::def(b::red_func(
                "foo",
                &[],
                b::name("i32"),
                vec![b::ret(b::add(
                    b::add(
                        b::call(b::name("bump"), vec![b::int(1)]),
                        b::call(b::name("bump"), vec![b::int(1)]),
                    ),
                    b::call(b::name("bump"), vec![b::int(2)]),
                ))],
            )),
        ],
    )
}

#[test]
fn blue_calls_run_once_per_arguments() {
    for_each_mode(&bump_module(), |vm, mode| {
        assert_eq!(call_i32(vm, "test::foo", &[]), 4, "{mode:?}");
        assert_eq!(call_i32(vm, "test::foo", &[]), 4, "{mode:?}");
        assert_eq!(counter(vm), Some(2), "{mode:?}");
        assert!(!vm.bluecache().is_empty());
    });
}

#[test]
fn disabling_the_cache_reruns_blue_calls() {
    let config = VmConfig {
        blue_cache: false,
        ..VmConfig::default()
    };
    let mut vm = Vm::new(config.clone());
    vm.import_module("test", &bump_module()).expect("import");
    assert_eq!(call_i32(&mut vm, "test::foo", &[]), 4);
    assert_eq!(counter(&vm), Some(3));
    assert_eq!(call_i32(&mut vm, "test::foo", &[]), 4);
    assert_eq!(counter(&vm), Some(6));
    assert!(vm.bluecache().is_empty());

    // redshifting runs the blue calls once, the specialized code never again
    let mut vm = Vm::new(config);
    vm.import_module("test", &bump_module()).expect("import");
    vm.redshift_all().expect("redshift");
    assert_eq!(counter(&vm), Some(3));
    assert_eq!(call_i32(&mut vm, "test::foo", &[]), 4);
    assert_eq!(counter(&vm), Some(3));
}

#[test]
fn init_runs_when_the_module_is_imported() {
    // from types import module
    // var counter: i32 = 0
    // @blue
    // def __INIT__(mod: module) -> void:
    //     mod.counter = 42
    // def foo() -> i32:
    //     return counter
    let module = b::module(
        "init.chroma",
        vec![
            b::import("types", "module", "module"),
            b::var("counter", b::name("i32"), b::int(0)),
            b::def(b::blue_func(
                "__INIT__",
                &[("mod", b::name("module"))],
                b::name("void"),
                vec![b::setattr(b::name("mod"), "counter", b::int(42))],
            )),
            b::def(b::red_func("foo", &[], b::name("i32"), vec![b::ret(b::name("counter"))])),
        ],
    );
    for mode in MODES {
        let mut vm = common::load(mode, &module);
        assert_eq!(counter(&vm), Some(42), "{mode:?}");
        assert_eq!(call_i32(&mut vm, "test::foo", &[]), 42, "{mode:?}");
        if mode == Mode::Doppler {
            // red globals are read at runtime, not folded
            vm.store_global(&Fqn::make_global("test", "counter"), Value::I32(7))
                .expect("store");
            assert_eq!(call_i32(&mut vm, "test::foo", &[]), 7);
        }
    }
}
