mod common;

use std::rc::Rc;

use chroma_ast::build as b;
use chroma_ast::{Color, Fqn};
use chroma_core::{
    ChromaError, ErrorKind, FuncRef, Instance, ModuleRegistry, OpHooks, OpImpl, OpKind, TypeBuilder, Value, Vm,
};
use common::{MODES, Mode, assert_error, call_i32, load_with};

fn ext_func(vm: &Vm, name: &str) -> FuncRef {
    vm.lookup_global(&Fqn::make_global("ext", name))
        .and_then(|v| v.as_func().cloned())
        .expect("ext function")
}

fn bad_args() -> ChromaError {
    ChromaError::new(ErrorKind::Panic, "bad arguments")
}

/// `ext.Adder`: instances are callable with two `i32`.
fn setup_adder(vm: &mut Vm) {
    let i32t = vm.b.i32.clone();
    let hooks = OpHooks::new().with(OpKind::Call, |vm, _| Ok(OpImpl::Simple(ext_func(vm, "adder_call"))));
    let adder = vm.make_type(TypeBuilder::new("Adder").hooks(hooks));
    let mut reg = ModuleRegistry::new("ext");
    reg.add_type(&adder);
    reg.add("adder", Value::Instance(Rc::new(Instance::new(adder.clone()))));
    let params = [("self", adder), ("x", i32t.clone()), ("y", i32t.clone())];
    reg.builtin(vm, "adder_call", Color::Red, &params, i32t, |_, args| match args {
        [_, Value::I32(x), Value::I32(y)] => Ok(Value::I32(x.wrapping_add(*y))),
        _ => Err(bad_args()),
    });
    vm.make_module(reg).expect("ext module");
}

#[test]
fn call_hook_on_instances() {
    let module = b::module(
        "adder.chroma",
        vec![
            b::import("ext", "adder", "adder"),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32")), ("y", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::call(b::name("adder"), vec![b::name("x"), b::name("y")]))],
            )),
        ],
    );
    for mode in MODES {
        let mut vm = load_with(mode, setup_adder, &module).expect("load");
        assert_eq!(call_i32(&mut vm, "test::foo", &[Value::I32(5), Value::I32(7)]), 12, "{mode:?}");
    }
}

/// `ext.Point`: `Point(x, y)` goes through a custom meta `op_CALL`.
fn setup_point(vm: &mut Vm) {
    let i32t = vm.b.i32.clone();
    let meta_hooks = OpHooks::new().with(OpKind::Call, |vm, _| Ok(OpImpl::Simple(ext_func(vm, "make_point"))));
    let point = vm.make_type(
        TypeBuilder::new("Point")
            .member("x", i32t.clone())
            .member("y", i32t.clone())
            .meta_hooks(meta_hooks),
    );
    let meta = point.metatype.clone().expect("Point has a metatype");
    assert_eq!(meta.name, "Meta_Point");
    let mut reg = ModuleRegistry::new("ext");
    reg.add_type(&point);
    let params = [("cls", meta), ("x", i32t.clone()), ("y", i32t)];
    let ty = point.clone();
    reg.builtin(vm, "make_point", Color::Red, &params, point, move |_, args| match args {
        [_, x, y] => {
            let obj = Instance::new(ty.clone());
            obj.set_field("x", x.clone());
            obj.set_field("y", y.clone());
            Ok(Value::Instance(Rc::new(obj)))
        }
        _ => Err(bad_args()),
    });
    vm.make_module(reg).expect("ext module");
}

#[test]
fn meta_call_hook_builds_instances() {
    // def foo(x: i32, y: i32) -> i32:
    //     p = Point(x, y)
    //     return p.x * p.y + p.x
    let module = b::module(
        "point.chroma",
        vec![
            b::import("ext", "Point", "Point"),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32")), ("y", b::name("i32"))],
                b::name("i32"),
                vec![
                    b::assign("p", b::call(b::name("Point"), vec![b::name("x"), b::name("y")])),
                    b::ret(b::add(
                        b::mul(b::getattr(b::name("p"), "x"), b::getattr(b::name("p"), "y")),
                        b::getattr(b::name("p"), "x"),
                    )),
                ],
            )),
        ],
    );
    for mode in MODES {
        let mut vm = load_with(mode, setup_point, &module).expect("load");
        assert_eq!(call_i32(&mut vm, "test::foo", &[Value::I32(4), Value::I32(8)]), 36, "{mode:?}");
    }
}

fn setup_vec2(vm: &mut Vm) {
    let f64t = vm.b.f64.clone();
    let vec2 = vm.make_type(TypeBuilder::new("Vec2").member("x", f64t.clone()).member("y", f64t));
    let mut reg = ModuleRegistry::new("ext");
    reg.add_type(&vec2);
    vm.make_module(reg).expect("ext module");
}

#[test]
fn types_with_members_get_a_default_constructor() {
    // def foo() -> f64:
    //     v = Vec2()
    //     v.x = 3.0
    //     v.y = 4
    //     return v.x * v.x + v.y * v.y
    let module = b::module(
        "vec2.chroma",
        vec![
            b::import("ext", "Vec2", "Vec2"),
            b::def(b::red_func(
                "foo",
                &[],
                b::name("f64"),
                vec![
                    b::assign("v", b::call(b::name("Vec2"), vec![])),
                    b::setattr(b::name("v"), "x", b::float(3.0)),
                    b::setattr(b::name("v"), "y", b::int(4)),
                    b::ret(b::add(
                        b::mul(b::getattr(b::name("v"), "x"), b::getattr(b::name("v"), "x")),
                        b::mul(b::getattr(b::name("v"), "y"), b::getattr(b::name("v"), "y")),
                    )),
                ],
            )),
        ],
    );
    for mode in MODES {
        let mut vm = load_with(mode, setup_vec2, &module).expect("load");
        let v = vm.call_global("test::foo", &[]).expect("call");
        assert_eq!(v.as_f64(), Some(25.0), "{mode:?}");
    }
}

/// `ext.calc`: `calc.add(a, b)` and `calc.mul(a, b)` through `op_CALL_METHOD`.
fn setup_calc(vm: &mut Vm) {
    let i32t = vm.b.i32.clone();
    let hooks = OpHooks::new().with(OpKind::CallMethod, |vm, operands| {
        let target = match operands[1].blue_str().as_str() {
            "add" => "calc_add",
            "mul" => "calc_mul",
            _ => return Ok(OpImpl::Null),
        };
        let mut args = vec![operands[0].clone()];
        args.extend(operands[2..].iter().cloned());
        Ok(OpImpl::WithValues(ext_func(vm, target), args))
    });
    let calc = vm.make_type(TypeBuilder::new("Calc").hooks(hooks));
    let mut reg = ModuleRegistry::new("ext");
    reg.add("calc", Value::Instance(Rc::new(Instance::new(calc.clone()))));
    let params = [("self", calc), ("a", i32t.clone()), ("b", i32t.clone())];
    reg.builtin(vm, "calc_add", Color::Red, &params, i32t.clone(), |_, args| match args {
        [_, Value::I32(a), Value::I32(b)] => Ok(Value::I32(a + b)),
        _ => Err(bad_args()),
    });
    reg.builtin(vm, "calc_mul", Color::Red, &params, i32t, |_, args| match args {
        [_, Value::I32(a), Value::I32(b)] => Ok(Value::I32(a * b)),
        _ => Err(bad_args()),
    });
    vm.make_module(reg).expect("ext module");
}

#[test]
fn call_method_hook_dispatches_on_the_method_name() {
    // def foo(a: i32, b: i32, c: i32) -> i32:
    //     return calc.mul(calc.add(a, b), c) + calc.mul(a, 10)
    let module = b::module(
        "calc.chroma",
        vec![
            b::import("ext", "calc", "calc"),
            b::def(b::red_func(
                "foo",
                &[("a", b::name("i32")), ("b", b::name("i32")), ("c", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(b::add(
                    b::call_method(
                        b::name("calc"),
                        "mul",
                        vec![
                            b::call_method(b::name("calc"), "add", vec![b::name("a"), b::name("b")]),
                            b::name("c"),
                        ],
                    ),
                    b::call_method(b::name("calc"), "mul", vec![b::name("a"), b::int(10)]),
                ))],
            )),
        ],
    );
    for mode in MODES {
        let mut vm = load_with(mode, setup_calc, &module).expect("load");
        let args = [Value::I32(5), Value::I32(1), Value::I32(2)];
        assert_eq!(call_i32(&mut vm, "test::foo", &args), 62, "{mode:?}");
    }
}

#[test]
fn unknown_methods_are_type_errors() {
    let module = b::module(
        "calc.chroma",
        vec![
            b::import("ext", "calc", "calc"),
            b::def(b::red_func(
                "foo",
                &[],
                b::name("i32"),
                vec![b::ret(b::call_method(b::name("calc"), "sub", vec![b::int(1), b::int(2)]))],
            )),
        ],
    );
    for mode in MODES {
        let err = load_with(mode, setup_calc, &module)
            .and_then(|mut vm| vm.call_global("test::foo", &[]))
            .expect_err("unknown method");
        assert_error(&err, ErrorKind::Type, "cannot call methods on type `Calc`");
    }
}

#[test]
fn typedefs_convert_to_and_from_their_origin() {
    // from types import makeTypeDef
    // const Meters = makeTypeDef("Meters", i32)
    // def to_meters(x: i32) -> Meters:
    //     return x
    // def foo(x: i32) -> i32:
    //     m = to_meters(x)
    //     return m
    let module = b::module(
        "typedef.chroma",
        vec![
            b::import("types", "makeTypeDef", "makeTypeDef"),
            b::const_(
                "Meters",
                b::auto(),
                b::call(b::name("makeTypeDef"), vec![b::str_("Meters"), b::name("i32")]),
            ),
            b::def(b::red_func(
                "to_meters",
                &[("x", b::name("i32"))],
                b::name("Meters"),
                vec![b::ret(b::name("x"))],
            )),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32"))],
                b::name("i32"),
                vec![
                    b::assign("m", b::call(b::name("to_meters"), vec![b::name("x")])),
                    b::ret(b::name("m")),
                ],
            )),
        ],
    );
    for mode in MODES {
        let mut vm = load_with(mode, |_| {}, &module).expect("load");
        assert_eq!(call_i32(&mut vm, "test::foo", &[Value::I32(9)]), 9, "{mode:?}");
        let meters = vm.lookup_global(&Fqn::make_global("test", "Meters")).expect("Meters");
        let meters = meters.as_type().expect("a type").clone();
        assert_eq!(meters.alias_origin().map(|t| t.name.as_str()), Some("i32"));
        if mode == Mode::Doppler {
            let foo = vm.lookup_global(&Fqn::make_global("test", "foo")).expect("foo");
            assert!(foo.as_func().expect("func").is_redshifted());
        }
    }
}
