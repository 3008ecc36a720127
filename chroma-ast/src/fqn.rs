#![forbid(unsafe_code)]

//! Qualified names.
//!
//! A `Qn` names a definition by module and attribute. An `Fqn` adds a
//! suffix that tells apart several objects sharing the same `Qn`, e.g. the
//! specializations of a generic function. The empty suffix is the global,
//! canonical instance.
//!
//! Textual form: `mod::attr` or `mod::attr#suffix`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FqnError {
    #[error("invalid qualified name `{0}`: expected exactly one `::`")]
    BadSeparator(String),
    #[error("invalid qualified name `{0}`: expected at most one `#`")]
    BadSuffix(String),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qn {
    pub modname: String,
    pub attr: String,
}

impl Qn {
    pub fn new(modname: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            modname: modname.into(),
            attr: attr.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, FqnError> {
        let mut parts = s.split("::");
        match (parts.next(), parts.next(), parts.next()) {
            (Some(modname), Some(attr), None) => Ok(Qn::new(modname, attr)),
            _ => Err(FqnError::BadSeparator(s.to_string())),
        }
    }

    pub fn fullname(&self) -> String {
        format!("{}::{}", self.modname, self.attr)
    }
}

impl fmt::Display for Qn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.modname, self.attr)
    }
}

/// Fully qualified name. Equality, ordering and hashing only look at the
/// full textual form.
#[derive(Clone, Debug)]
pub struct Fqn {
    modname: String,
    attr: String,
    suffix: String,
    fullname: String,
}

impl Fqn {
    pub fn make(modname: impl Into<String>, attr: impl Into<String>, suffix: impl Into<String>) -> Self {
        let modname = modname.into();
        let attr = attr.into();
        let suffix = suffix.into();
        let fullname = if suffix.is_empty() {
            format!("{modname}::{attr}")
        } else {
            format!("{modname}::{attr}#{suffix}")
        };
        Self {
            modname,
            attr,
            suffix,
            fullname,
        }
    }

    pub fn make_global(modname: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::make(modname, attr, "")
    }

    pub fn from_qn(qn: &Qn, suffix: impl Into<String>) -> Self {
        Self::make(qn.modname.clone(), qn.attr.clone(), suffix)
    }

    pub fn parse(s: &str) -> Result<Self, FqnError> {
        let (qn, suffix) = match s.split_once('#') {
            Some((qn, suffix)) => {
                if suffix.contains('#') {
                    return Err(FqnError::BadSuffix(s.to_string()));
                }
                (qn, suffix)
            }
            None => (s, ""),
        };
        let qn = Qn::parse(qn).map_err(|_| FqnError::BadSeparator(s.to_string()))?;
        Ok(Self::make(qn.modname, qn.attr, suffix))
    }

    pub fn modname(&self) -> &str {
        &self.modname
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn is_global(&self) -> bool {
        self.suffix.is_empty()
    }

    pub fn qn(&self) -> Qn {
        Qn::new(self.modname.clone(), self.attr.clone())
    }

    /// Name used in dotted, user-facing contexts: `mod.attr`.
    pub fn dotted_name(&self) -> String {
        format!("{}.{}", self.modname, self.attr)
    }

    /// Name of this object in generated C code.
    ///
    /// Dots in the module name become underscores, so `a.b::c` and `a_b::c`
    /// map to the same C name. This collision is a known limitation.
    pub fn c_name(&self) -> String {
        let modname = self.modname.replace('.', "_");
        if self.suffix.is_empty() {
            format!("chroma_{modname}${}", self.attr)
        } else {
            format!("chroma_{modname}${}${}", self.attr, self.suffix)
        }
    }
}

impl PartialEq for Fqn {
    fn eq(&self, other: &Self) -> bool {
        self.fullname == other.fullname
    }
}

impl Eq for Fqn {}

impl Hash for Fqn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fullname.hash(state);
    }
}

impl PartialOrd for Fqn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fqn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fullname.cmp(&other.fullname)
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_global_and_suffixed() {
        let a = Fqn::parse("a.b.c::xxx").expect("parse");
        assert_eq!(a.modname(), "a.b.c");
        assert_eq!(a.attr(), "xxx");
        assert_eq!(a.suffix(), "");
        assert!(a.is_global());

        let b = Fqn::parse("builtins::i32#0").expect("parse");
        assert_eq!(b.attr(), "i32");
        assert_eq!(b.suffix(), "0");
        assert_eq!(b.to_string(), "builtins::i32#0");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(Fqn::parse("nomodule"), Err(FqnError::BadSeparator(_))));
        assert!(matches!(Fqn::parse("a::b::c"), Err(FqnError::BadSeparator(_))));
        assert!(matches!(Fqn::parse("a::b#1#2"), Err(FqnError::BadSuffix(_))));
    }

    #[test]
    fn equality_is_textual() {
        assert_eq!(Fqn::make_global("mod", "foo"), Fqn::make("mod", "foo", ""));
        assert_ne!(Fqn::make_global("mod", "foo"), Fqn::make("mod", "foo", "1"));
    }

    #[test]
    fn c_names() {
        assert_eq!(Fqn::make_global("builtins", "abs").c_name(), "chroma_builtins$abs");
        assert_eq!(Fqn::make("a.b.c", "xxx", "2").c_name(), "chroma_a_b_c$xxx$2");
        // accepted collision between dotted and underscored module names
        assert_eq!(
            Fqn::make_global("a.b", "c").c_name(),
            Fqn::make_global("a_b", "c").c_name()
        );
    }

    fn ident() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,8}"
    }

    proptest! {
        #[test]
        fn parse_inverts_display(
            parts in prop::collection::vec(ident(), 1..4),
            attr in ident(),
            suffix in "[a-z0-9]{0,3}",
        ) {
            let fqn = Fqn::make(parts.join("."), attr, suffix);
            let parsed = Fqn::parse(&fqn.to_string()).expect("parse");
            prop_assert_eq!(&parsed, &fqn);
            prop_assert_eq!(parsed.suffix(), fqn.suffix());
            prop_assert_eq!(parsed.c_name(), fqn.c_name());
        }
    }
}
