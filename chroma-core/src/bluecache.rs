#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::rc::Rc;

use chroma_ast::Qn;
use tracing::trace;

use crate::function::FuncRef;
use crate::object::Value;

struct Entry {
    func: FuncRef,
    args: Vec<Value>,
    result: Value,
}

/// Results of blue calls. Arguments match by value for scalars and strings
/// and by identity for everything else, so `make_list(i32)` called twice
/// returns the very same object.
#[derive(Default)]
pub struct BlueCache {
    entries: HashMap<Qn, Vec<Entry>>,
}

impl BlueCache {
    pub fn lookup(&self, func: &FuncRef, args: &[Value]) -> Option<Value> {
        let bucket = self.entries.get(&func.qn)?;
        let hit = bucket.iter().find(|e| {
            Rc::ptr_eq(&e.func, func)
                && e.args.len() == args.len()
                && e.args.iter().zip(args).all(|(a, b)| a.universal_eq(b))
        })?;
        trace!(func = %func.qn, "blue cache hit");
        Some(hit.result.clone())
    }

    pub fn record(&mut self, func: &FuncRef, args: Vec<Value>, result: Value) {
        self.entries.entry(func.qn.clone()).or_default().push(Entry {
            func: func.clone(),
            args,
            result,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
