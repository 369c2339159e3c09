//! lsh, a small interactive job-control shell.
//!
//! A line goes through the [`lexer`], is classified by the [`parser`] into a built-in,
//! a single command or a pipeline, and is then run by the [`launcher`] or the
//! [`pipeline`] engine. The [`job`] module owns the terminal and the two signal
//! handlers; [`Interpreter`] ties everything together into the prompt loop.
//!
//! Supported syntax is deliberately small: words separated by blanks, `|` between
//! commands, `> FILE`, `2> FILE`, `< FILE > FILE` and a trailing `&`. There is no
//! quoting, globbing or variable expansion.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod interpreter;
mod io_adapters;
pub mod job;
pub mod launcher;
pub mod lexer;
pub mod parser;
pub mod pipeline;
mod session;

pub use builtin::Builtin;
pub use config::{Args, Config};
pub use interpreter::Interpreter;
pub use io_adapters::{LineReader, MemWriter, ReadOutcome, ScriptedReader, TerminalReader};
pub use session::Session;
