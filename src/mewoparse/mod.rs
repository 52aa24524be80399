//! Core parsing and execution modules for mewo.
//!
//! This module contains all the functionality for:
//! - Parsing Mewofiles into a flat statement list
//! - Interpolating `${...}` expressions and evaluating conditions
//! - Executing labels and dispatching shell commands
//! - The command-line surface around the engine

pub mod ast;
pub mod cli;
pub mod condition;
pub mod directives;
pub mod display;
pub mod error;
pub mod executor;
pub mod file;
pub mod json;
pub mod logging;
pub mod output;
pub mod parser;
pub mod path;
pub mod platform;
pub mod runtime;
pub mod scan;
pub mod template;
pub mod value;
pub mod vars;

pub use ast::{Ast, AttrKind, Attribute, Stmt, StmtKind};
pub use error::{AppError, ErrorKind, MewoError, MewoResult};
pub use parser::Parser;
pub use runtime::{ExecOptions, Runtime};
pub use value::Value;
