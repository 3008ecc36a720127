mod common;

use chroma_ast::build as b;
use chroma_ast::{Fqn, Loc};
use chroma_core::{ErrorKind, Value, redshift};
use common::{MODES, assert_annotation, assert_error, load, load_and_call_err, load_with, new_vm};

fn foo(args: &[(&str, &str)], ret: &str, body: Vec<chroma_ast::Stmt>) -> chroma_ast::Decl {
    let args: Vec<(&str, chroma_ast::Expr)> = args.iter().map(|(n, t)| (*n, b::name(t))).collect();
    b::def(b::red_func("foo", &args, b::name(ret), body))
}

#[test]
fn mismatched_return_type() {
    let module = b::module("e.chroma", vec![foo(&[], "i32", vec![b::ret(b::str_("hello"))])]);
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[]);
        assert_error(&err, ErrorKind::Type, "mismatched types");
        assert_annotation(&err, "expected `i32`, got `str`");
    }
}

#[test]
fn undefined_names() {
    let module = b::module("e.chroma", vec![foo(&[], "i32", vec![b::ret(b::name("nope"))])]);
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[]);
        assert_error(&err, ErrorKind::Name, "name `nope` is not defined");
        assert_annotation(&err, "not found in this scope");
    }
}

#[test]
fn duplicate_declarations() {
    let module = b::module(
        "e.chroma",
        vec![foo(
            &[],
            "void",
            vec![b::vardef("x", b::name("i32")), b::vardef("x", b::name("f64"))],
        )],
    );
    let err = load_with(common::Mode::Interp, |_| {}, &module).expect_err("duplicate");
    assert_error(&err, ErrorKind::Scope, "variable `x` already declared");
    assert_annotation(&err, "this is the previous declaration");
}

#[test]
fn importing_missing_things() {
    let module = b::module("e.chroma", vec![b::import("nowhere", "thing", "thing")]);
    let err = load_with(common::Mode::Interp, |_| {}, &module).expect_err("missing module");
    assert_error(&err, ErrorKind::Import, "cannot import `nowhere.thing`");
    assert_annotation(&err, "module `nowhere` does not exist");

    let module = b::module("e.chroma", vec![b::import("builtins", "nothing", "nothing")]);
    let err = load_with(common::Mode::Interp, |_| {}, &module).expect_err("missing attribute");
    assert_error(&err, ErrorKind::Import, "cannot import `builtins.nothing`");
    assert_annotation(&err, "attribute `nothing` does not exist in module `builtins`");
}

#[test]
fn consts_cannot_be_assigned() {
    let module = b::module(
        "e.chroma",
        vec![
            b::const_("X", b::name("i32"), b::int(1)),
            foo(&[], "i32", vec![b::assign("X", b::int(2)), b::ret(b::name("X"))]),
        ],
    );
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[]);
        assert_error(&err, ErrorKind::Type, "invalid assignment target");
        assert_annotation(&err, "`X` is const");
    }
}

#[test]
fn blue_functions_reject_red_arguments() {
    let module = b::module(
        "e.chroma",
        vec![
            b::def(b::blue_func(
                "twice",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::mul(b::name("x"), b::int(2)))],
            )),
            foo(
                &[("x", "i32")],
                "i32",
                vec![b::ret(b::call(b::name("twice"), vec![b::name("x")]))],
            ),
        ],
    );
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[Value::I32(1)]);
        assert_error(&err, ErrorKind::Type, "cannot call blue function with red arguments");
        assert_annotation(&err, "blue function called here");
    }
}

#[test]
fn init_must_be_blue() {
    let module = b::module(
        "e.chroma",
        vec![b::def(b::red_func(
            "__INIT__",
            &[("mod", b::name("dynamic"))],
            b::name("void"),
            vec![b::pass()],
        ))],
    );
    let err = load_with(common::Mode::Interp, |_| {}, &module).expect_err("red __INIT__");
    assert_error(&err, ErrorKind::Type, "the `__INIT__` function must be `@blue`");
}

#[test]
fn wrong_number_of_arguments() {
    let module = b::module(
        "e.chroma",
        vec![
            b::def(b::red_func(
                "inc",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::add(b::name("x"), b::int(1)))],
            )),
            foo(&[], "i32", vec![b::ret(b::call(b::name("inc"), vec![b::int(1), b::int(2)]))]),
        ],
    );
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[]);
        assert_error(&err, ErrorKind::Type, "this function takes 1 argument but 2 arguments were supplied");
        assert_annotation(&err, "1 argument extra");
        assert_annotation(&err, "function defined here");
    }

    let mut vm = load(common::Mode::Interp, &module);
    let err = vm.call_global("test::inc", &[]).expect_err("no arguments");
    assert_error(&err, ErrorKind::Type, "takes 1 argument but 0 arguments were supplied");
}

#[test]
fn unsupported_binary_operations() {
    let module = b::module(
        "e.chroma",
        vec![foo(&[("x", "i32")], "str", vec![b::ret(b::add(b::str_("a"), b::name("x")))])],
    );
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[Value::I32(1)]);
        assert_error(&err, ErrorKind::Type, "cannot do `str` + `i32`");
        assert_annotation(&err, "this is `str`");
        assert_annotation(&err, "this is `i32`");
    }
}

#[test]
fn arguments_are_checked_at_the_boundary() {
    let module = b::module(
        "e.chroma",
        vec![foo(&[("x", "i32")], "i32", vec![b::ret(b::name("x"))])],
    );
    let mut vm = load(common::Mode::Interp, &module);
    let err = vm.call_global("test::foo", &[Value::str("no")]).expect_err("str argument");
    assert_error(&err, ErrorKind::Type, "`test::foo` expects `i32` for `x`, got `str`");
}

#[test]
fn redshift_guards() {
    let module = b::module(
        "e.chroma",
        vec![foo(&[("x", "i32")], "i32", vec![b::ret(b::name("x"))])],
    );
    let mut vm = new_vm();
    vm.import_module("test", &module).expect("import");

    let abs = vm
        .lookup_global(&Fqn::make_global("builtins", "abs"))
        .and_then(|v| v.as_func().cloned())
        .expect("builtins::abs");
    let err = redshift(&mut vm, &abs).expect_err("builtin");
    assert_error(&err, ErrorKind::Type, "cannot redshift builtin function `builtins::abs`");

    let foo = vm
        .lookup_global(&Fqn::make_global("test", "foo"))
        .and_then(|v| v.as_func().cloned())
        .expect("test::foo");
    let shifted = redshift(&mut vm, &foo).expect("first redshift");
    assert!(shifted.is_redshifted());
    let err = redshift(&mut vm, &shifted).expect_err("second redshift");
    assert_error(&err, ErrorKind::Type, "has already been redshifted");
}

#[test]
fn redshift_rejects_indirect_calls() {
    // var f: dynamic = inc
    // def foo(x: i32) -> i32:
    //     return f(x)
    let module = b::module(
        "e.chroma",
        vec![
            b::def(b::red_func(
                "inc",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::add(b::name("x"), b::int(1)))],
            )),
            b::var("f", b::name("dynamic"), b::name("inc")),
            foo(&[("x", "i32")], "i32", vec![b::ret(b::call(b::name("f"), vec![b::name("x")]))]),
        ],
    );
    let mut vm = load(common::Mode::Interp, &module);
    assert_eq!(vm.call_global("test::foo", &[Value::I32(1)]).expect("call").as_i32(), Some(2));
    let err = vm.redshift_all().expect_err("indirect call");
    assert_error(&err, ErrorKind::Type, "cannot redshift indirect calls");
}

#[test]
fn errors_render_with_their_location() {
    let source = "def foo() -> i32:\n    return nope\n";
    let nope = b::at(Loc::new("e.chroma", 2, 2, 11, 15), b::name("nope"));
    let module = b::module("e.chroma", vec![foo(&[], "i32", vec![b::ret(nope)])]);
    let err = load_and_call_err(common::Mode::Interp, &module, &[]);
    assert_eq!(err.loc().map(|l| l.filename.as_str()), Some("e.chroma"));
    let text = err.render(source, false);
    assert!(text.contains("NameError: name `nope` is not defined"), "{text}");
    assert!(text.contains("not found in this scope"), "{text}");
    assert!(text.contains("return nope"), "{text}");
}

#[test]
fn runtime_errors_point_at_the_failing_expression() {
    let source = "def foo(x: i32) -> i32:\n    return 1 / x\n";
    let at = Loc::new("e.chroma", 2, 2, 11, 16);
    let div = b::at(at.clone(), b::div(b::int(1), b::name("x")));
    let module = b::module("e.chroma", vec![foo(&[("x", "i32")], "i32", vec![b::ret(div)])]);
    for mode in MODES {
        let err = load_and_call_err(mode, &module, &[Value::I32(0)]);
        assert_error(&err, ErrorKind::Panic, "division by zero");
        assert_eq!(err.loc(), Some(&at), "{mode:?}");
        let text = err.render(source, false);
        assert!(text.contains("return 1 / x"), "{text}");
    }
}
