#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use chroma_ast::{Color, Fqn, Loc};

use crate::error::{ChromaError, ErrorKind};
use crate::vm::Vm;

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub color: Color,
    pub loc: Loc,
    /// Location of the declared type, used in "because of type declaration"
    /// notes.
    pub type_loc: Loc,
    /// 0 for the table the symbol was found in, 1 for its parent, and so on.
    pub level: u32,
    /// Set for module-level and builtin names.
    pub fqn: Option<Fqn>,
}

impl Symbol {
    pub fn is_local(&self) -> bool {
        self.level == 0
    }

    /// A name that lives in an enclosing scope and is stored in the VM
    /// globals. Module-level names seen from the module scope itself are
    /// local.
    pub fn is_global(&self) -> bool {
        self.level != 0 && self.fqn.is_some()
    }

    /// A copy of this symbol with `update` applied.
    pub fn replace(&self, update: impl FnOnce(&mut Symbol)) -> Symbol {
        let mut sym = self.clone();
        update(&mut sym);
        sym
    }
}

/// The names declared by one scope, with a link to the enclosing scope.
#[derive(Debug)]
pub struct SymTable {
    pub name: String,
    symbols: RefCell<BTreeMap<String, Symbol>>,
    parent: Option<Weak<SymTable>>,
}

impl SymTable {
    pub fn new(name: impl Into<String>, parent: Option<&Rc<SymTable>>) -> Rc<SymTable> {
        Rc::new(SymTable {
            name: name.into(),
            symbols: RefCell::new(BTreeMap::new()),
            parent: parent.map(Rc::downgrade),
        })
    }

    /// Every global registered in the `builtins` module, as blue symbols.
    pub fn from_builtins(vm: &Vm) -> Rc<SymTable> {
        let table = SymTable::new("builtins", None);
        {
            let mut symbols = table.symbols.borrow_mut();
            for (fqn, _) in vm.module_items("builtins") {
                let name = fqn.attr().to_string();
                symbols.insert(
                    name.clone(),
                    Symbol {
                        name,
                        color: Color::Blue,
                        loc: Loc::builtins(),
                        type_loc: Loc::builtins(),
                        level: 0,
                        fqn: Some(fqn),
                    },
                );
            }
        }
        table
    }

    pub fn parent(&self) -> Option<Rc<SymTable>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn declare(
        &self,
        name: &str,
        color: Color,
        loc: Loc,
        type_loc: Loc,
        fqn: Option<Fqn>,
    ) -> Result<Symbol, ChromaError> {
        let mut symbols = self.symbols.borrow_mut();
        if let Some(prev) = symbols.get(name) {
            return Err(ChromaError::scope(
                format!("variable `{name}` already declared"),
                "this is the new declaration",
                &loc,
            )
            .with_note("this is the previous declaration", &prev.loc));
        }
        let sym = Symbol {
            name: name.to_string(),
            color,
            loc,
            type_loc,
            level: 0,
            fqn,
        };
        symbols.insert(name.to_string(), sym.clone());
        Ok(sym)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.borrow().contains_key(name)
    }

    /// Find `name` in this table or any ancestor, with `level` set to the
    /// number of tables walked.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(sym) = self.symbols.borrow().get(name) {
            return Some(sym.clone());
        }
        let mut level = 1;
        let mut cur = self.parent();
        while let Some(table) = cur {
            if let Some(sym) = table.symbols.borrow().get(name) {
                return Some(sym.replace(|s| s.level = level));
            }
            level += 1;
            cur = table.parent();
        }
        None
    }

    /// Like `lookup`, restricted to this table.
    pub fn lookup_local(&self, name: &str) -> Result<Symbol, ChromaError> {
        self.symbols.borrow().get(name).cloned().ok_or_else(|| {
            ChromaError::new(
                ErrorKind::Scope,
                format!("no symbol `{name}` in scope `{}`", self.name),
            )
        })
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.borrow().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> Loc {
        Loc::new("t.chroma", line, line, 0, 1)
    }

    #[test]
    fn lookup_walks_parents_and_counts_levels() {
        let outer = SymTable::new("outer", None);
        outer.declare("x", Color::Blue, loc(1), loc(1), None).expect("declare");
        let inner = SymTable::new("inner", Some(&outer));
        inner.declare("y", Color::Red, loc(2), loc(2), None).expect("declare");

        let y = inner.lookup("y").expect("y");
        assert!(y.is_local());
        let x = inner.lookup("x").expect("x");
        assert_eq!(x.level, 1);
        assert!(!x.is_local());
        assert!(inner.lookup("z").is_none());
    }

    #[test]
    fn globals_live_in_enclosing_scopes() {
        let module = SymTable::new("m", None);
        let fqn = Fqn::make_global("m", "x");
        let x = module.declare("x", Color::Red, loc(1), loc(1), Some(fqn.clone())).expect("declare");
        assert_eq!(x.level, 0);
        assert!(x.is_local());
        assert!(!x.is_global());

        let func = SymTable::new("m::f", Some(&module));
        func.declare("y", Color::Red, loc(2), loc(2), None).expect("declare");
        let x = func.lookup("x").expect("x");
        assert!(x.is_global());
        assert_eq!(x.fqn, Some(fqn));
        assert!(!func.lookup("y").expect("y").is_global());
    }

    #[test]
    fn replace_returns_an_updated_copy() {
        let t = SymTable::new("f", None);
        let x = t.declare("x", Color::Red, loc(1), loc(1), None).expect("declare");
        let blue = x.replace(|s| {
            s.color = Color::Blue;
            s.level = 2;
        });
        assert_eq!((blue.color, blue.level), (Color::Blue, 2));
        assert_eq!(blue.name, "x");
        assert_eq!(t.lookup("x").expect("x").color, Color::Red);
    }

    #[test]
    fn redeclaration_in_same_table_is_a_scope_error() {
        let t = SymTable::new("f", None);
        t.declare("x", Color::Red, loc(1), loc(1), None).expect("declare");
        let err = t.declare("x", Color::Red, loc(2), loc(2), None).unwrap_err();
        assert!(err.is(ErrorKind::Scope));
        assert_eq!(err.message, "variable `x` already declared");
        assert_eq!(err.annotations[1].loc, loc(1));
    }

    #[test]
    fn nested_tables_may_shadow() {
        let outer = SymTable::new("outer", None);
        outer.declare("x", Color::Blue, loc(1), loc(1), None).expect("declare");
        let inner = SymTable::new("inner", Some(&outer));
        inner.declare("x", Color::Red, loc(2), loc(2), None).expect("shadow");
        assert_eq!(inner.lookup("x").expect("x").color, Color::Red);
    }

    #[test]
    fn strict_local_lookup_ignores_parents() {
        let outer = SymTable::new("outer", None);
        outer.declare("x", Color::Blue, loc(1), loc(1), None).expect("declare");
        let inner = SymTable::new("inner", Some(&outer));
        let err = inner.lookup_local("x").unwrap_err();
        assert!(err.is(ErrorKind::Scope));
    }
}
