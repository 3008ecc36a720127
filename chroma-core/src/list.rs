#![forbid(unsafe_code)]

//! `list[T]`: one interned type per item type, all inheriting from `list`.

use chroma_ast::{Color, Qn};
use tracing::debug;

use crate::error::{ChromaError, ErrorKind};
use crate::function::FuncRef;
use crate::object::{OpHooks, OpKind, Storage, TypeKind, TypeRef, Value};
use crate::opimpl::{OpImpl, Operand};
use crate::vm::Vm;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ListMethod {
    GetItem,
    SetItem,
    Eq,
}

/// Negative indices count from the end.
pub(crate) fn resolve_index(len: usize, i: i32) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = i64::from(i);
    let i = if i < 0 { i + len } else { i };
    if (0..len).contains(&i) {
        usize::try_from(i).ok()
    } else {
        None
    }
}

pub(crate) fn index<T>(items: &[T], i: i32) -> Option<&T> {
    resolve_index(items.len(), i).and_then(|i| items.get(i))
}

fn method_hook(which: ListMethod) -> impl Fn(&mut Vm, &[Operand]) -> Result<OpImpl, ChromaError> {
    move |vm, operands| {
        let Some(target) = operands.first() else {
            return Ok(OpImpl::Null);
        };
        let listtype = target.static_type.clone();
        Ok(OpImpl::Simple(vm.list_method(&listtype, which)?))
    }
}

fn list_error(message: impl Into<String>) -> ChromaError {
    ChromaError::new(ErrorKind::Panic, message)
}

impl Vm {
    /// The type `list[item]`. Asking twice for the same item type returns
    /// the same type.
    pub fn make_list_type(&mut self, item: &TypeRef) -> TypeRef {
        if let Some(t) = self.list_types.get(&item.id) {
            return t.clone();
        }
        let hooks = OpHooks::new()
            .with(OpKind::GetItem, method_hook(ListMethod::GetItem))
            .with(OpKind::SetItem, method_hook(ListMethod::SetItem))
            .with(OpKind::Eq, method_hook(ListMethod::Eq));
        let base = self.b.list.clone();
        let t = self.alloc_type(
            format!("list[{}]", item.name),
            Some(base),
            TypeKind::List(Some(item.clone())),
            Storage::Reference,
            Vec::new(),
            hooks,
            None,
        );
        debug!(name = %t.name, "new list type");
        self.list_types.insert(item.id, t.clone());
        t
    }

    pub(crate) fn list_method(&mut self, listtype: &TypeRef, which: ListMethod) -> Result<FuncRef, ChromaError> {
        if let Some(f) = self.list_methods.get(&(listtype.id, which)) {
            return Ok(f.clone());
        }
        let item = listtype.list_item().cloned().ok_or_else(|| {
            list_error(format!("`{}` is not a specialized list type", listtype.name))
        })?;
        let lt = listtype.clone();
        let b = self.b.clone();
        let func = match which {
            ListMethod::GetItem => self.builtin_func(
                Qn::new("__chroma__", "list_getitem"),
                Color::Red,
                &[("l", lt), ("i", b.i32.clone())],
                item,
                |_, args| match args {
                    [Value::List(l), Value::I32(i)] => index(&l.items.borrow(), *i)
                        .cloned()
                        .ok_or_else(|| list_error("list index out of range")),
                    _ => Err(list_error("bad arguments to list_getitem")),
                },
            ),
            ListMethod::SetItem => self.builtin_func(
                Qn::new("__chroma__", "list_setitem"),
                Color::Red,
                &[("l", lt), ("i", b.i32.clone()), ("v", item)],
                b.void.clone(),
                |_, args| match args {
                    [Value::List(l), Value::I32(i), v] => {
                        let mut items = l.items.borrow_mut();
                        let slot = resolve_index(items.len(), *i)
                            .and_then(|i| items.get_mut(i))
                            .ok_or_else(|| list_error("list index out of range"))?;
                        *slot = v.clone();
                        Ok(Value::None)
                    }
                    _ => Err(list_error("bad arguments to list_setitem")),
                },
            ),
            ListMethod::Eq => self.builtin_func(
                Qn::new("__chroma__", "list_eq"),
                Color::Red,
                &[("a", lt.clone()), ("b", lt)],
                b.bool.clone(),
                |_, args| match args {
                    [Value::List(a), Value::List(b)] => {
                        let a = a.items.borrow();
                        let b = b.items.borrow();
                        let eq = a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.universal_eq(y));
                        Ok(Value::Bool(eq))
                    }
                    _ => Err(list_error("bad arguments to list_eq")),
                },
            ),
        };
        self.list_methods.insert((listtype.id, which), func.clone());
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_the_end() {
        let items = [10, 20, 30];
        assert_eq!(index(&items, 0), Some(&10));
        assert_eq!(index(&items, -1), Some(&30));
        assert_eq!(index(&items, 3), None);
        assert_eq!(index(&items, -4), None);
    }
}
