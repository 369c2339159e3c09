use crate::command::ExitCode;
use crate::config::Config;
use crate::env::Environment;
use crate::error::StartupError;
use crate::job::{SIGNALS, SignalState, TerminalControl};
use nix::unistd::Pid;

/// Everything one shell session carries between commands.
///
/// Passed by reference to the components that need it. The signal handlers never see
/// this struct; they only get the static [`SignalState`].
pub struct Session {
    pub config: Config,
    pub env: Environment,
    pub last_status: ExitCode,
    terminal: Option<TerminalControl>,
    signals: &'static SignalState,
}

impl Session {
    /// A session without terminal control, used when embedding the interpreter.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            env: Environment::new(),
            last_status: 0,
            terminal: None,
            signals: &SIGNALS,
        }
    }

    /// A session that owns the controlling terminal and has its handlers installed.
    pub fn interactive(config: Config) -> Result<Self, StartupError> {
        let terminal = TerminalControl::acquire()?;
        Ok(Self {
            terminal: Some(terminal),
            ..Self::new(config)
        })
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_some()
    }

    /// Process group that owns the terminal while the shell is prompting.
    pub fn foreground_group(&self) -> Option<Pid> {
        self.terminal.as_ref().map(TerminalControl::pgid)
    }

    pub fn signals(&self) -> &'static SignalState {
        self.signals
    }

    /// Restores terminal ownership and modes after a foreground job.
    pub fn reclaim_terminal(&self) {
        if let Some(terminal) = &self.terminal {
            terminal.reclaim();
        }
    }
}
