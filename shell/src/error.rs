//! Error taxonomy of the shell.
//!
//! Every per-command error is reported to the user as a single `lsh: ...` line and the
//! interactive loop keeps going. Only [`StartupError`] is fatal.

use crate::command::{ExitCode, STATUS_NOT_FOUND, STATUS_SYNTAX_ERROR};
use std::path::PathBuf;
use thiserror::Error;

/// Malformed pipe or redirection syntax.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing redirection target after `{0}`")]
    MissingTarget(&'static str),

    #[error("malformed input/output redirection: {0}")]
    MalformedRedirection(String),

    #[error("unknown command shape")]
    UnknownShape,

    #[error("`&` must be the last token")]
    MisplacedBackground,

    #[error("empty pipeline stage")]
    EmptyPipelineStage,

    #[error("background pipelines are not supported")]
    BackgroundPipeline,

    #[error("input redirection is only allowed on the first pipeline stage")]
    InputNotOnFirstStage,

    #[error("output redirection is only allowed on the last pipeline stage")]
    OutputNotOnLastStage,
}

/// A command could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("{name}: argument contains a NUL byte")]
    InvalidArgument { name: String },

    #[error("{}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create pipe: {0}")]
    Pipe(#[source] nix::Error),

    #[error("could not block child signals: {0}")]
    SignalMask(#[source] nix::Error),

    #[error("child process could not be created: {0}")]
    Fork(#[source] nix::Error),

    #[error("waiting for process {pid} failed: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

impl LaunchError {
    /// The exit status a command that failed this way reports.
    pub fn status(&self) -> ExitCode {
        match self {
            LaunchError::NotFound(_) => STATUS_NOT_FOUND,
            _ => 1,
        }
    }
}

/// A built-in reported a failure. Never fatal.
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("cd: {0}: directory does not exist")]
    NoSuchDirectory(String),

    #[error("cd: no target and HOME not set")]
    NoHome,

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// The shell cannot run interactively. Aborts before the loop begins.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to make the shell run in interactive mode: standard input is not a terminal")]
    NotInteractive,

    #[error("the shell's process is not the process group's leader")]
    NotGroupLeader,

    #[error("could not {action}: {source}")]
    Terminal {
        action: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("could not install handler for {signal}: {source}")]
    Handler {
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::Error,
    },
}

/// Everything the dispatcher may have to report for one input line.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Builtin(#[from] BuiltinError),
}

impl ShellError {
    /// Status recorded for a line that failed with this error.
    pub fn status(&self) -> ExitCode {
        match self {
            ShellError::Parse(_) => STATUS_SYNTAX_ERROR,
            ShellError::Launch(err) => err.status(),
            ShellError::Builtin(_) => 1,
        }
    }
}
