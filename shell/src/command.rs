use crate::builtin::Builtin;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Status reported when a program cannot be found.
pub const STATUS_NOT_FOUND: ExitCode = 127;

/// Status reported when a program was found but could not be executed.
pub const STATUS_CANNOT_EXECUTE: ExitCode = 126;

/// Status reported for a line that does not parse.
pub const STATUS_SYNTAX_ERROR: ExitCode = 2;

/// One external command ready to be launched.
///
/// `argv[0]` is the program name; it is never empty once the parser hands the
/// command over for execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    /// File to use as standard input.
    pub stdin: Option<PathBuf>,
    /// File to create/truncate and use as standard output.
    pub stdout: Option<PathBuf>,
    /// File to create/truncate and use as standard error.
    pub stderr: Option<PathBuf>,
    pub background: bool,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    /// The program (or built-in) name.
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// Two or more commands where stage `i` writes into stage `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// What a single input line asks the shell to do.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandLine {
    /// Nothing but whitespace.
    Empty,
    /// A built-in with the arguments that precede the first control operator.
    Builtin { builtin: Builtin, args: Vec<String> },
    /// An external command, optionally redirected or sent to the background.
    Simple(Command),
    Pipeline(Pipeline),
}
