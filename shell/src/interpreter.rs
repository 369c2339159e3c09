use crate::command::{CommandLine, ExitCode};
use crate::error::ShellError;
use crate::io_adapters::{LineReader, ReadOutcome};
use crate::launcher::{run_background, run_foreground};
use crate::lexer::split_into_tokens;
use crate::parser;
use crate::pipeline;
use crate::session::Session;
use std::fmt;
use std::io::Write;
use tracing::{debug, warn};

const BANNER: &str = "Welcome to lsh. Type `help` to list the built-in commands.";

/// The interactive loop: prompt, read, classify, run, repeat.
///
/// Input comes from any [`LineReader`] and output goes to any writer, so the whole loop
/// can be driven from a script.
///
/// Example
/// ```
/// use lsh::{Config, Interpreter, MemWriter, ScriptedReader, Session};
/// let reader = ScriptedReader::new(["help", "exit"]);
/// let (out, captured) = MemWriter::with_handle();
/// let mut sh = Interpreter::new(Session::new(Config::default()), Box::new(reader))
///     .with_output(Box::new(out), Box::new(std::io::sink()));
/// sh.repl().unwrap();
/// assert!(String::from_utf8_lossy(&captured.borrow()).contains("- cd"));
/// ```
pub struct Interpreter {
    session: Session,
    reader: Box<dyn LineReader>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Interpreter {
    /// Creates an interpreter that prints to the process's standard streams.
    pub fn new(session: Session, reader: Box<dyn LineReader>) -> Self {
        Self {
            session,
            reader,
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }

    /// Redirects the shell's own messages. Launched programs still write to the
    /// inherited descriptors.
    pub fn with_output(mut self, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until `exit` or end of input.
    ///
    /// Per-command failures are reported and the loop goes on; only a failing line
    /// reader ends it with an error.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        if self.session.config.banner {
            self.say(format_args!("{BANNER}"));
        }

        while !self.session.env.should_exit {
            self.report_notices();
            let prompt = self.prompt();
            if let Err(err) = self.stdout.flush() {
                warn!(%err, "could not flush output");
            }
            match self.reader.read_line(&prompt)? {
                ReadOutcome::Line(line) => {
                    self.execute_line(&line);
                }
                ReadOutcome::Interrupted => debug!("prompt interrupted"),
                ReadOutcome::Eof => break,
            }
        }
        Ok(())
    }

    /// Executes one input line and records its status.
    pub fn execute_line(&mut self, line: &str) -> ExitCode {
        let tokens = split_into_tokens(line, self.session.config.limits);
        let status = match self.dispatch(&tokens) {
            Ok(status) => status,
            Err(err) => {
                self.complain(&err);
                err.status()
            }
        };
        self.session.last_status = status;
        status
    }

    fn dispatch(&mut self, tokens: &[String]) -> Result<ExitCode, ShellError> {
        match parser::parse(tokens)? {
            CommandLine::Empty => Ok(self.session.last_status),
            CommandLine::Builtin { builtin, args } => {
                Ok(builtin.run(&args, &mut *self.stdout, &mut self.session.env)?)
            }
            CommandLine::Simple(command) if command.background => {
                let pid = run_background(&command, &self.session)?;
                self.say(format_args!("lsh: process created with PID: {pid}"));
                Ok(0)
            }
            CommandLine::Simple(command) => Ok(run_foreground(&command, &self.session)?),
            CommandLine::Pipeline(pipeline) => {
                let report = pipeline::run(&pipeline, &self.session);
                for err in &report.errors {
                    self.complain(err);
                }
                Ok(report.status)
            }
        }
    }

    /// Prints what the signal handlers recorded since the last prompt.
    ///
    /// Also collects finished children itself, so background jobs are reaped even
    /// when no child handler is installed.
    fn report_notices(&mut self) {
        let signals = self.session.signals();
        signals.reap_finished();
        if let Some(pid) = signals.take_interrupted() {
            self.say(format_args!("lsh: process {pid} received a SIGINT signal"));
        }
        for pid in signals.take_finished() {
            self.say(format_args!("lsh: background process {pid} finished"));
        }
    }

    /// `<user>@<host> <cwd> > `
    fn prompt(&self) -> String {
        let env = &self.session.env;
        let user = env
            .get_var("LOGNAME")
            .or_else(|| env.get_var("USER"))
            .unwrap_or_else(|| "user".to_string());
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        format!("{user}@{host} {} > ", env.current_dir.display())
    }

    fn say(&mut self, message: fmt::Arguments) {
        if let Err(err) = writeln!(self.stdout, "{message}") {
            warn!(%err, "could not write to stdout");
        }
    }

    fn complain(&mut self, err: &dyn std::error::Error) {
        if let Err(err) = writeln!(self.stderr, "lsh: {err}") {
            warn!(%err, "could not write to stderr");
        }
    }
}
