use chroma_ast::build as b;
use chroma_ast::{Expr, Module};
use chroma_core::Value;
use proptest::{
    prelude::{any, prop},
    test_runner::{Config, TestCaseError, TestRunner},
};

mod common;
use common::{MODES, load};

/// A small arithmetic function of `x` and `y`, shaped by `ops`. A blue
/// helper is mixed in so that redshift has something to fold.
fn program_from_ops(ops: &[u8], k: i32) -> Module {
    let mut expr: Expr = b::name("x");
    for (i, op) in ops.iter().enumerate() {
        let operand = if i % 2 == 0 {
            b::name("y")
        } else {
            b::call(b::name("K"), vec![])
        };
        expr = match op % 4 {
            0 => b::add(expr, operand),
            1 => b::sub(expr, operand),
            2 => b::mul(expr, operand),
            _ => b::neg(expr),
        };
    }
    b::module(
        "prop.chroma",
        vec![
            b::def(b::blue_func("K", &[], b::name("i32"), vec![b::ret(b::int(i64::from(k)))])),
            b::def(b::red_func(
                "foo",
                &[("x", b::name("i32")), ("y", b::name("i32"))],
                b::name("i32"),
                vec![b::ret(expr)],
            )),
        ],
    )
}

#[test]
fn redshifted_code_matches_the_interpreter() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let strat = (
        any::<i32>(),
        any::<i32>(),
        -100..100i32,
        prop::collection::vec(any::<u8>(), 0..8),
    );
    let res = runner.run(&strat, |(x, y, k, ops)| {
        let module = program_from_ops(&ops, k);
        let mut results = Vec::new();
        for mode in MODES {
            let mut vm = load(mode, &module);
            let v = vm
                .call_global("test::foo", &[Value::I32(x), Value::I32(y)])
                .map_err(|e| TestCaseError::fail(format!("{mode:?}: {e}")))?;
            results.push(v.as_i32());
        }
        if results[0] != results[1] {
            return Err(TestCaseError::fail(format!("interp {:?} != doppler {:?}", results[0], results[1])));
        }
        Ok(())
    });
    if let Err(e) = res {
        panic!("{e}");
    }
}
