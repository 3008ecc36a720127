mod common;

use chroma_ast::build as b;
use chroma_ast::{Constant, ExprKind, Fqn, Stmt, StmtKind};
use chroma_core::{ErrorKind, StoreTarget, TypeChecker, Value, Vm, VmConfig};
use common::{Mode, assert_error, call, call_f64, call_i32, for_each_mode};

fn body_of(vm: &Vm, fqn: &str) -> Vec<Stmt> {
    let fqn = Fqn::parse(fqn).expect("fqn");
    let value = vm.lookup_global(&fqn).expect("global");
    let func = value.as_func().expect("function");
    func.as_ast().expect("ast function").funcdef.body.clone()
}

#[test]
fn add_two_numbers() {
    let module = b::module(
        "add.chroma",
        vec![b::def(b::red_func(
            "add",
            &[("x", b::name("i32")), ("y", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::add(b::name("x"), b::name("y")))],
        ))],
    );
    for_each_mode(&module, |vm, mode| {
        assert_eq!(call_i32(vm, "test::add", &[Value::I32(3), Value::I32(4)]), 7, "{mode:?}");
    });
}

#[test]
fn blue_calls_are_folded_by_redshift() {
    let module = b::module(
        "fold.chroma",
        vec![
            b::def(b::blue_func("get_N", &[], b::name("i32"), vec![b::ret(b::int(21))])),
            b::def(b::red_func(
                "foo",
                &[],
                b::name("i32"),
                vec![b::ret(b::mul(b::call(b::name("get_N"), vec![]), b::int(2)))],
            )),
        ],
    );
    for_each_mode(&module, |vm, mode| {
        assert_eq!(call_i32(vm, "test::foo", &[]), 42);
        if mode == Mode::Doppler {
            let body = body_of(vm, "test::foo");
            match &body[0].kind {
                StmtKind::Return(e) => assert_eq!(e.kind, ExprKind::Constant(Constant::Int(42))),
                other => panic!("unexpected statement {other:?}"),
            }
        }
    });
}

#[test]
fn redshift_makes_numeric_conversions_explicit() {
    let module = b::module(
        "conv.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("x", b::name("i32"))],
            b::name("f64"),
            vec![b::ret(b::add(b::name("x"), b::float(1.5)))],
        ))],
    );
    for_each_mode(&module, |vm, mode| {
        assert_eq!(call_f64(vm, "test::foo", &[Value::I32(2)]), 3.5);
        if mode == Mode::Doppler {
            let body = body_of(vm, "test::foo");
            let StmtKind::Return(e) = &body[0].kind else {
                panic!("expected a return");
            };
            let ExprKind::Call { func, args } = &e.kind else {
                panic!("expected a call, got {e:?}");
            };
            assert_eq!(func.kind, ExprKind::FqnConst(Fqn::make_global("operator", "f64_add")));
            match &args[0].kind {
                ExprKind::Call { func, .. } => {
                    assert_eq!(func.kind, ExprKind::FqnConst(Fqn::make_global("operator", "i32_to_f64")));
                }
                other => panic!("expected a conversion, got {other:?}"),
            }
        }
    });
}

#[test]
fn integer_division_floors() {
    let module = b::module(
        "div.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("x", b::name("i32")), ("y", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::div(b::name("x"), b::name("y")))],
        ))],
    );
    for_each_mode(&module, |vm, _| {
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(-7), Value::I32(2)]), -4);
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(7), Value::I32(2)]), 3);
        let err = vm
            .call_global("test::foo", &[Value::I32(1), Value::I32(0)])
            .expect_err("division by zero");
        assert_error(&err, ErrorKind::Panic, "division by zero");
    });
}

#[test]
fn loops_and_branches() {
    // def foo(n: i32) -> i32:
    //     var i: i32
    //     var total: i32
    //     i = 0
    //     total = 0
    //     while i < n:
    //         i = i + 1
    //         if i == 3:
    //             pass
    //         else:
    //             total = total + i
    //     return total
    let module = b::module(
        "loop.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("n", b::name("i32"))],
            b::name("i32"),
            vec![
                b::vardef("i", b::name("i32")),
                b::vardef("total", b::name("i32")),
                b::assign("i", b::int(0)),
                b::assign("total", b::int(0)),
                b::while_(
                    b::lt(b::name("i"), b::name("n")),
                    vec![
                        b::assign("i", b::add(b::name("i"), b::int(1))),
                        b::if_(
                            b::eq(b::name("i"), b::int(3)),
                            vec![b::pass()],
                            vec![b::assign("total", b::add(b::name("total"), b::name("i")))],
                        ),
                    ],
                ),
                b::ret(b::name("total")),
            ],
        ))],
    );
    for_each_mode(&module, |vm, _| {
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(5)]), 12);
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(0)]), 0);
    });
}

#[test]
fn recursion() {
    let fact = b::red_func(
        "fact",
        &[("n", b::name("i32"))],
        b::name("i32"),
        vec![b::if_(
            b::lt(b::name("n"), b::int(2)),
            vec![b::ret(b::int(1))],
            vec![b::ret(b::mul(
                b::name("n"),
                b::call(b::name("fact"), vec![b::sub(b::name("n"), b::int(1))]),
            ))],
        )],
    );
    let module = b::module("fact.chroma", vec![b::def(fact)]);
    for_each_mode(&module, |vm, _| {
        assert_eq!(call_i32(vm, "test::fact", &[Value::I32(5)]), 120);
    });
}

#[test]
fn red_globals_are_mutable() {
    let module = b::module(
        "counter.chroma",
        vec![
            b::var("counter", b::name("i32"), b::int(0)),
            b::def(b::red_func(
                "inc",
                &[],
                b::name("i32"),
                vec![
                    b::assign("counter", b::add(b::name("counter"), b::int(1))),
                    b::ret(b::name("counter")),
                ],
            )),
        ],
    );
    for_each_mode(&module, |vm, _| {
        assert_eq!(call_i32(vm, "test::inc", &[]), 1);
        assert_eq!(call_i32(vm, "test::inc", &[]), 2);
        let counter = vm.lookup_global(&Fqn::make_global("test", "counter")).expect("counter");
        assert_eq!(counter.as_i32(), Some(2));
    });
}

#[test]
fn typed_globals_convert_their_initializer() {
    let module = b::module(
        "globals.chroma",
        vec![
            b::const_("X", b::name("f64"), b::int(3)),
            b::const_("Y", b::auto(), b::str_("hello")),
        ],
    );
    for_each_mode(&module, |vm, _| {
        let x = vm.lookup_global(&Fqn::make_global("test", "X")).expect("X");
        assert_eq!(x.as_f64(), Some(3.0));
        let y = vm.lookup_global(&Fqn::make_global("test", "Y")).expect("Y");
        assert_eq!(y.as_str(), Some("hello"));
    });
}

#[test]
fn generic_functions_are_memoized() {
    // @blue
    // def make_adder(T: type) -> dynamic:
    //     def add(x: T, y: T) -> T:
    //         return x + y
    //     return add
    //
    // def foo(x: i32, y: i32) -> i32:
    //     return make_adder(i32)(x, y)
    let inner = b::red_func(
        "add",
        &[("x", b::name("T")), ("y", b::name("T"))],
        b::name("T"),
        vec![b::ret(b::add(b::name("x"), b::name("y")))],
    );
    let make_adder = b::blue_func(
        "make_adder",
        &[("T", b::name("type"))],
        b::name("dynamic"),
        vec![b::funcdef_stmt(inner), b::ret(b::name("add"))],
    );
    let foo = b::red_func(
        "foo",
        &[("x", b::name("i32")), ("y", b::name("i32"))],
        b::name("i32"),
        vec![b::ret(b::call(
            b::call(b::name("make_adder"), vec![b::name("i32")]),
            vec![b::name("x"), b::name("y")],
        ))],
    );
    let module = b::module("generic.chroma", vec![b::def(make_adder), b::def(foo)]);
    for_each_mode(&module, |vm, mode| {
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(3), Value::I32(4)]), 7);
        let i32_type = Value::Type(vm.b.i32.clone());
        let a = call(vm, "test::make_adder", std::slice::from_ref(&i32_type));
        let b2 = call(vm, "test::make_adder", &[i32_type]);
        assert!(a.is_same(&b2), "{mode:?}: make_adder(i32) is not memoized");
        if mode == Mode::Doppler {
            // the specialization was registered and redshifted too
            let spec = vm.lookup_global(&Fqn::parse("test::add#0").expect("fqn")).expect("specialization");
            assert!(spec.as_func().expect("func").is_redshifted());
        }
    });
}

#[test]
fn closures_capture_blue_values() {
    let scale = b::red_func(
        "scale",
        &[("x", b::name("i32"))],
        b::name("i32"),
        vec![b::ret(b::mul(b::name("x"), b::name("k")))],
    );
    let make_scale = b::blue_func(
        "make_scale",
        &[("k", b::name("i32"))],
        b::name("dynamic"),
        vec![b::funcdef_stmt(scale), b::ret(b::name("scale"))],
    );
    let foo = b::red_func(
        "foo",
        &[("x", b::name("i32"))],
        b::name("i32"),
        vec![b::ret(b::call(
            b::call(b::name("make_scale"), vec![b::int(3)]),
            vec![b::name("x")],
        ))],
    );
    let module = b::module("closure.chroma", vec![b::def(make_scale), b::def(foo)]);
    for_each_mode(&module, |vm, _| {
        assert_eq!(call_i32(vm, "test::foo", &[Value::I32(5)]), 15);
    });
}

#[test]
fn static_type_does_not_evaluate_its_argument() {
    let module = b::module(
        "static.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("x", b::name("f64"))],
            b::name("type"),
            vec![b::ret(b::call(b::name("STATIC_TYPE"), vec![b::name("x")]))],
        ))],
    );
    for_each_mode(&module, |vm, _| {
        let v = call(vm, "test::foo", &[Value::F64(1.0)]);
        assert_eq!(v.as_type().expect("a type").name, "f64");
    });
}

#[test]
fn print_is_specialized_by_argument_type() {
    let module = b::module(
        "print.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("x", b::name("i32"))],
            b::none(),
            vec![
                b::expr_stmt(b::call(b::name("print"), vec![b::name("x")])),
                b::expr_stmt(b::call(b::name("print"), vec![b::str_("hello")])),
                b::expr_stmt(b::call(b::name("print"), vec![b::float(0.5)])),
                b::expr_stmt(b::call(b::name("print"), vec![b::boolean(true)])),
            ],
        ))],
    );
    for_each_mode(&module, |vm, mode| {
        assert!(matches!(call(vm, "test::foo", &[Value::I32(42)]), Value::None));
        assert_eq!(vm.take_stdout(), "42\nhello\n0.5\nTrue\n");
        if mode == Mode::Doppler {
            let body = body_of(vm, "test::foo");
            let StmtKind::StmtExpr(e) = &body[0].kind else {
                panic!("expected an expression statement");
            };
            let ExprKind::Call { func, .. } = &e.kind else {
                panic!("expected a call");
            };
            assert_eq!(func.kind, ExprKind::FqnConst(Fqn::make_global("builtins", "print_i32")));
        }
    });
}

#[test]
fn unbounded_recursion_panics() {
    let module = b::module(
        "loop.chroma",
        vec![b::def(b::red_func(
            "foo",
            &[("n", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::call(b::name("foo"), vec![b::name("n")]))],
        ))],
    );
    let config = VmConfig::from_toml_str("max_call_depth = 16\n").expect("config");
    let mut vm = Vm::new(config);
    vm.import_module("test", &module).expect("import");
    let err = vm.call_global("test::foo", &[Value::I32(1)]).expect_err("recursion");
    assert_error(&err, ErrorKind::Panic, "maximum recursion depth exceeded");
}

#[test]
fn assignment_targets_are_resolved_once() {
    // var counter: i32 = 0
    // def bump() -> void:
    //     counter = counter + 1
    //     y = counter
    let module = b::module(
        "store.chroma",
        vec![
            b::var("counter", b::name("i32"), b::int(0)),
            b::def(b::red_func(
                "bump",
                &[],
                b::name("void"),
                vec![
                    b::assign("counter", b::add(b::name("counter"), b::int(1))),
                    b::assign("y", b::name("counter")),
                ],
            )),
        ],
    );
    let mut vm = Vm::new(VmConfig::default());
    vm.import_module("test", &module).expect("import");
    let func = vm
        .lookup_global(&Fqn::make_global("test", "bump"))
        .and_then(|v| v.as_func().cloned())
        .expect("bump");
    let body = body_of(&vm, "test::bump");
    let mut t = TypeChecker::new(&vm, func).expect("typechecker");
    assert!(t.store_target(body[0].id, 0).is_err());
    for stmt in &body {
        t.check_stmt(&mut vm, stmt).expect("check");
    }
    assert_eq!(
        t.store_target(body[0].id, 0).expect("counter"),
        &StoreTarget::Global(Fqn::make_global("test", "counter"))
    );
    assert_eq!(t.store_target(body[1].id, 0).expect("y"), &StoreTarget::Local);

    for_each_mode(&module, |vm, _| {
        for _ in 0..3 {
            call(vm, "test::bump", &[]);
        }
        let counter = vm.lookup_global(&Fqn::make_global("test", "counter")).expect("counter");
        assert_eq!(counter.as_i32(), Some(3));
    });
}
