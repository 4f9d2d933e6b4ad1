//! Dicta: a small statically typed scripting language with typed
//! containers (`List`, `Pair`, `Dict`) and `from .. where .. select`
//! queries over dictionaries.
//!
//! Source text flows through [`lexer`], [`parser`] and [`interpreter`];
//! [`run_source`] drives all three.

pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod source;
pub mod value;

pub use interpreter::{Interpreter, Limits, RuntimeError};
pub use lexer::{LexError, Token, TokenKind};
pub use parser::ParseError;
pub use source::Position;
pub use value::Value;

use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Failure from any phase of running a program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn position(&self) -> Position {
        match self {
            Error::Syntax(err) => err.position(),
            Error::Runtime(err) => err.position(),
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    lexer::Lexer::new(source).tokenize()
}

pub fn parse_source(source: &str) -> Result<ast::Program, ParseError> {
    parser::Parser::new(source)?.parse_program()
}

/// Parses and runs a program with default limits, returning `main`'s result.
pub fn run_source(source: &str) -> Result<Value, Error> {
    run_source_with_limits(source, Limits::default())
}

pub fn run_source_with_limits(source: &str, limits: Limits) -> Result<Value, Error> {
    let program = parse_source(source)?;
    let mut interpreter = Interpreter::with_limits(limits);
    Ok(interpreter.run(&program)?)
}
