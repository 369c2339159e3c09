use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Result as IoResult, Write};
use std::rc::Rc;

/// What one prompt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C at the prompt: the partial line is discarded.
    Interrupted,
    /// Ctrl-D or closed input: the session ends.
    Eof,
}

/// Source of input lines for the interactive loop.
pub trait LineReader {
    /// Shows `prompt` and reads one line.
    ///
    /// An error means input can no longer be read at all.
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<ReadOutcome>;
}

/// Line editor on the controlling terminal.
pub struct TerminalReader {
    editor: DefaultEditor,
}

impl TerminalReader {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for TerminalReader {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err.into()),
        }
    }
}

/// Replays a fixed script, then reports end of input.
///
/// Every prompt it is shown is recorded so the caller can inspect it afterwards.
pub struct ScriptedReader {
    script: VecDeque<ReadOutcome>,
    prompts: Rc<RefCell<Vec<String>>>,
}

impl ScriptedReader {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_outcomes(lines.into_iter().map(|line| ReadOutcome::Line(line.into())))
    }

    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ReadOutcome>) -> Self {
        Self {
            script: outcomes.into_iter().collect(),
            prompts: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle to the prompts shown so far.
    pub fn prompts(&self) -> Rc<RefCell<Vec<String>>> {
        self.prompts.clone()
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<ReadOutcome> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.script.pop_front().unwrap_or(ReadOutcome::Eof))
    }
}

/// Memory-backed writer for capturing shell output.
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self {
            buf: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Convenience: create writer and return (writer, rc_handle).
    pub fn with_handle() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let mw = MemWriter::new();
        let rc = mw.buf.clone();
        (mw, rc)
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_reader_replays_then_ends() {
        let mut reader = ScriptedReader::new(["ls", "exit"]);
        let prompts = reader.prompts();

        assert_eq!(reader.read_line("a> ").unwrap(), ReadOutcome::Line("ls".into()));
        assert_eq!(reader.read_line("b> ").unwrap(), ReadOutcome::Line("exit".into()));
        assert_eq!(reader.read_line("c> ").unwrap(), ReadOutcome::Eof);
        assert_eq!(reader.read_line("d> ").unwrap(), ReadOutcome::Eof);
        assert_eq!(*prompts.borrow(), vec!["a> ", "b> ", "c> ", "d> "]);
    }

    #[test]
    fn mem_writer_shares_its_buffer() {
        let (mut writer, handle) = MemWriter::with_handle();
        write!(writer, "hello {}", 42).unwrap();
        assert_eq!(handle.borrow().as_slice(), b"hello 42");
    }
}
