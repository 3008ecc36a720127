#![forbid(unsafe_code)]

//! Prints the red functions of a module back as chroma source. Mostly useful
//! to look at what redshift produced.

mod dump;

pub use dump::{FqnFormat, SourceBackend};
