//! Compiles RPCL (`.x`) files into Rust for `onc-rpc-core`.
//!
//! Meant to be called from a build script:
//!
//! ```no_run
//! let out = std::path::Path::new(&std::env::var("OUT_DIR").unwrap()).join("test_x.rs");
//! onc_rpcgen::compile_file("rpcl/test.x", out).unwrap();
//! ```
//!
//! and pulled in with `include!(concat!(env!("OUT_DIR"), "/test_x.rs"));`.
//! The generated code names `serde`, `bytes` and `onc_rpc_core`, so the
//! including crate depends on all three.
//!
//! | RPCL | Rust |
//! |---|---|
//! | `const N = 1;` | `pub const N: i32` (`u32` or `i64` when it does not fit) |
//! | `struct`, `enum` | struct / fieldless enum with serde impls |
//! | `union U switch (int d)` | enum `U` with one variant per arm, plus `UOther` for the `default` arm |
//! | `typedef` | type alias |
//! | `opaque x[N]`, `opaque x<>` | `xdr::FixedOpaque<N>`, `xdr::Opaque` |
//! | `string s<>` | `String` |
//! | `T x[N]`, `T x<>`, `T *x` | `[T; N]`, `Vec<T>`, `Option<Box<T>>` |
//! | `program` / `version` | number constants, a `{Version}Client`, a `{Version}Service` trait and a `dispatch_{version}` function |
//!
//! Union arms take the camel-cased name of their field; void arms are named
//! after their case value (`Case3`, `CaseMinus1`, or the enum member).
//! Each arm carries exactly one `case` label.

use std::{fs, io, path::Path};

use thiserror::Error;
use tracing::debug;

pub mod ast;
mod codegen;
mod parser;

pub use parser::parse;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error, {0}")]
    Io(#[from] io::Error),
    #[error("syntax error at line {line}, column {column}, near {near:?}")]
    Syntax {
        line: usize,
        column: usize,
        near: String,
    },
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("unknown constant {0:?}")]
    UnknownConstant(String),
    #[error("{0:?} is defined more than once")]
    Duplicate(String),
    #[error("value {value} of {name:?} is out of range")]
    OutOfRange { name: String, value: i64 },
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// Compiles RPCL source into Rust source.
pub fn compile(source: &str) -> Result<String, Error> {
    let spec = parse(source)?;
    Ok(codegen::generate(&spec)?.to_string())
}

/// Compiles the `.x` file at `input` and writes the Rust source to `output`.
pub fn compile_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<(), Error> {
    let input = input.as_ref();
    let source = fs::read_to_string(input)?;
    let code = compile(&source)?;
    fs::write(
        output.as_ref(),
        format!("// Generated by onc-rpcgen from {}.\n{code}\n", input.display()),
    )?;
    debug!(input = %input.display(), output = %output.as_ref().display(), "compiled rpcl");
    Ok(())
}
