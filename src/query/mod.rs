//! SQL-like query language: tokenizer, parser, evaluator and executor.

pub mod ast;
pub(crate) mod eval;
pub(crate) mod exec;
pub mod lexer;
pub mod parser;
pub mod result;

pub use ast::{ParsedStatement, SelectQuery, Statement};
pub use parser::parse;
pub use result::{ResultSet, Row};
