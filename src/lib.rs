//! A small stack machine: a tokenizer, a fetch-dispatch interpreter, a
//! constant-folding peephole optimizer, and an interactive loop.
//!
//! ```text
//! 2 3 + 4 * println      →  20
//! "hi" dup println println
//! ```

pub mod demos;
pub mod diagnostic;
pub mod interrupt;
pub mod lexer;
pub mod logging;
pub mod optimizer;
pub mod program;
pub mod repl;
pub mod vm;

pub use lexer::{LexError, parse, tokenize};
pub use optimizer::{Folding, fold, fold_in_place};
pub use program::{Cell, Op, Program, Span, Value};
pub use vm::{Halt, Machine, Stack, VmError};

/// Any failure a driver can hit: bad source, a fatal run, or the streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] LexError),
    #[error(transparent)]
    Runtime(#[from] VmError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
