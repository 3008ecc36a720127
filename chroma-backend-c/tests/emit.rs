use chroma_ast::build as b;
use chroma_ast::{CmpOp, Module};
use chroma_backend_c::{CArtifacts, emit_module};
use chroma_core::{Vm, VmConfig};

fn redshifted(modules: &[(&str, &Module)]) -> Vm {
    let mut vm = Vm::new(VmConfig::default());
    for (modname, module) in modules {
        vm.import_module(modname, module).expect("import");
    }
    vm.redshift_all().expect("redshift");
    vm
}

fn emit(module: &Module) -> CArtifacts {
    let vm = redshifted(&[("test", module)]);
    emit_module(&vm, "test").expect("emit")
}

#[test]
fn functions_are_named_after_their_fqn() {
    let module = b::module(
        "add.chroma",
        vec![b::def(b::red_func(
            "add",
            &[("x", b::name("i32")), ("y", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::add(b::name("x"), b::name("y")))],
        ))],
    );
    let c = emit(&module).module_c;
    assert!(c.contains("#include \"chroma_runtime.h\"\n"), "{c}");
    assert!(c.contains("int32_t chroma_test$add(int32_t x, int32_t y);\n"), "{c}");
    assert!(
        c.contains(
            "int32_t chroma_test$add(int32_t x, int32_t y) {\n  return (x + y);\n  \
             abort(); /* reached the end of the function without a `return` */\n}\n"
        ),
        "{c}"
    );
}

#[test]
fn blue_code_is_folded_away() {
    // @blue
    // def K() -> i32:
    //     return 10
    // def foo(x: i32) -> i32:
    //     y = x * K()
    //     return abs(y - 1)
    let module = b::module(
        "fold.chroma",
        vec![
            b::def(b::blue_func("K", &[], b::name("i32"), vec![b::ret(b::int(10))])),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![
                    b::assign("y", b::mul(b::name("x"), b::call(b::name("K"), vec![]))),
                    b::ret(b::call(b::name("abs"), vec![b::sub(b::name("y"), b::int(1))])),
                ],
            )),
        ],
    );
    let c = emit(&module).module_c;
    assert!(
        c.contains("  int32_t y;\n  y = (x * 10);\n  return chroma_builtins$abs((y - 1));\n"),
        "{c}"
    );
    assert!(!c.contains("chroma_test$K"), "{c}");
    assert!(!c.contains("@return"), "{c}");
}

#[test]
fn globals_strings_and_control_flow() {
    // var counter: i32 = 0
    // var greeting: str = "hi\n"
    // def run(n: i32) -> void:
    //     i = 0
    //     while i < n:
    //         counter = counter + 1
    //         i = i + 1
    //     if counter > 10:
    //         print("big")
    //     else:
    //         print(greeting)
    let module = b::module(
        "loop.chroma",
        vec![
            b::var("counter", b::name("i32"), b::int(0)),
            b::var("greeting", b::name("str"), b::str_("hi\n")),
            b::def(b::red_func(
                "run",
                &[("n", b::name("i32"))],
                b::name("void"),
                vec![
                    b::assign("i", b::int(0)),
                    b::while_(
                        b::lt(b::name("i"), b::name("n")),
                        vec![
                            b::assign("counter", b::add(b::name("counter"), b::int(1))),
                            b::assign("i", b::add(b::name("i"), b::int(1))),
                        ],
                    ),
                    b::if_(
                        b::cmp(CmpOp::Gt, b::name("counter"), b::int(10)),
                        vec![b::expr_stmt(b::call(b::name("print"), vec![b::str_("big")]))],
                        vec![b::expr_stmt(b::call(b::name("print"), vec![b::name("greeting")]))],
                    ),
                ],
            )),
        ],
    );
    let c = emit(&module).module_c;
    assert!(c.contains("static chroma_Str chroma_str_0 = {3, \"hi\\n\"};\n"), "{c}");
    assert!(c.contains("static chroma_Str chroma_str_1 = {3, \"big\"};\n"), "{c}");
    assert!(c.contains("int32_t chroma_test$counter = 0;\n"), "{c}");
    assert!(c.contains("chroma_Str *chroma_test$greeting = &chroma_str_0;\n"), "{c}");
    assert!(c.contains("void chroma_test$run(int32_t n) {\n  int32_t i;\n  i = 0;\n"), "{c}");
    assert!(
        c.contains(
            "  while ((i < n)) {\n    chroma_test$counter = (chroma_test$counter + 1);\n    i = (i + 1);\n  }\n"
        ),
        "{c}"
    );
    assert!(
        c.contains(
            "  if ((chroma_test$counter > 10)) {\n    chroma_builtins$print_str(&chroma_str_1);\n  } else {\n    \
             chroma_builtins$print_str(chroma_test$greeting);\n  }\n}\n"
        ),
        "{c}"
    );
    // void functions fall off their end
    assert!(!c.contains("abort()"), "{c}");
}

#[test]
fn numeric_conversions_and_runtime_calls() {
    // def mix(x: f64, n: i32) -> f64:
    //     return x + n
    // def half(n: i32) -> i32:
    //     return n / 2
    let module = b::module(
        "num.chroma",
        vec![
            b::def(b::red_func(
                "mix",
                &[("x", b::name("f64")), ("n", b::name("i32"))],
                b::name("f64"),
                vec![b::ret(b::add(b::name("x"), b::name("n")))],
            )),
            b::def(b::red_func(
                "half",
                &[("n", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::div(b::name("n"), b::int(2)))],
            )),
        ],
    );
    let c = emit(&module).module_c;
    assert!(c.contains("return (x + ((double)n));\n"), "{c}");
    assert!(c.contains("return chroma_operator$i32_div(n, 2);\n"), "{c}");
}

#[test]
fn calls_across_modules_get_prototypes() {
    let lib = b::module(
        "lib.chroma",
        vec![b::def(b::red_func(
            "twice",
            &[("x", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::mul(b::name("x"), b::int(2)))],
        ))],
    );
    let main = b::module(
        "main.chroma",
        vec![
            b::import("lib", "twice", "twice"),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::call(b::name("twice"), vec![b::neg(b::name("x"))]))],
            )),
        ],
    );
    let vm = redshifted(&[("lib", &lib), ("test", &main)]);
    let c = emit_module(&vm, "test").expect("emit").module_c;
    assert!(c.contains("int32_t chroma_lib$twice(int32_t x);\n"), "{c}");
    assert!(c.contains("return chroma_lib$twice((-x));\n"), "{c}");
    assert!(!c.contains("(x * 2)"), "{c}");

    let c = emit_module(&vm, "lib").expect("emit").module_c;
    assert!(c.contains("return (x * 2);\n"), "{c}");
}

#[test]
fn runtime_header_defines_the_builtins() {
    let module = b::module("empty.chroma", vec![]);
    let h = emit(&module).runtime_h;
    assert!(h.starts_with("#pragma once\n"));
    for name in [
        "typedef struct chroma_Str",
        "typedef struct chroma_RawBuffer",
        "chroma_builtins$abs",
        "chroma_builtins$print_str",
        "chroma_operator$i32_div",
        "chroma_operator$str_add",
        "chroma_rawbuffer$rb_get_f64",
    ] {
        assert!(h.contains(name), "missing {name}");
    }
}

#[test]
fn modules_must_be_redshifted() {
    let module = b::module(
        "id.chroma",
        vec![b::def(b::red_func(
            "id",
            &[("x", b::name("i32"))],
            b::name("i32"),
            vec![b::ret(b::name("x"))],
        ))],
    );
    let mut vm = Vm::new(VmConfig::default());
    vm.import_module("test", &module).expect("import");
    let err = emit_module(&vm, "test").err().expect("not redshifted");
    assert_eq!(err.message, "function `test::id` must be redshifted before emitting C");
}

#[test]
fn untranslatable_types() {
    let module = b::module(
        "dyn.chroma",
        vec![b::def(b::red_func(
            "id",
            &[("x", b::name("dynamic"))],
            b::name("dynamic"),
            vec![b::ret(b::name("x"))],
        ))],
    );
    let vm = redshifted(&[("test", &module)]);
    let err = emit_module(&vm, "test").err().expect("dynamic");
    assert_eq!(err.message, "cannot translate type `dynamic` to C");
    assert_eq!(err.to_string(), "C backend error: cannot translate type `dynamic` to C");
}
