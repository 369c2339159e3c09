//! A module implementing lexical analysis (tokenization) of one input line.
//!
//! Tokens are separated by spaces, tabs and newlines. Nothing else is special:
//! quotes and backslashes are ordinary characters and operators such as `|` or `>`
//! are only recognized by the parser when they stand alone as a whole token.

use tracing::warn;

/// Limits applied while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of characters read from one line; the rest is dropped.
    pub max_line_length: usize,
    /// Maximum number of tokens kept from one line.
    pub max_args: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: 1024,
            max_args: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn make_tokens(mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match (self.state, is_separator(ch)) {
                (LexingState::Start, true) => {}
                (LexingState::Start, false) => {
                    self.buffer.push(ch);
                    self.state = LexingState::ReadingWord;
                }
                (LexingState::ReadingWord, true) => {
                    out.push(std::mem::take(&mut self.buffer));
                    self.state = LexingState::Start;
                }
                (LexingState::ReadingWord, false) => self.buffer.push(ch),
            }
        }

        if self.state == LexingState::ReadingWord {
            out.push(self.buffer);
        }
        out
    }
}

fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

/// Truncates `line` to at most `max` characters, on a character boundary.
fn truncate_line(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => {
            warn!(max, "input line truncated");
            &line[..idx]
        }
        None => line,
    }
}

/// The main entry point to perform lexical analysis.
///
/// Returns the whitespace separated tokens of `line` in order. A line made only of
/// whitespace yields an empty vector. Lines and token lists longer than `limits`
/// are truncated rather than rejected.
pub fn split_into_tokens(line: &str, limits: Limits) -> Vec<String> {
    let line = truncate_line(line, limits.max_line_length);
    let mut tokens = LexingFSM::new(line).make_tokens();
    if tokens.len() > limits.max_args {
        warn!(max = limits.max_args, found = tokens.len(), "too many arguments, extra ones dropped");
        tokens.truncate(limits.max_args);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        split_into_tokens(line, Limits::default())
    }

    #[test]
    fn splits_on_spaces_tabs_and_newlines() {
        assert_eq!(tokens("ls  -l\t/tmp\n"), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(tokens("").is_empty());
        assert!(tokens(" \t \n").is_empty());
    }

    #[test]
    fn quotes_and_backslashes_are_literal() {
        assert_eq!(
            tokens(r#"echo "a b" c\ d"#),
            vec!["echo", "\"a", "b\"", "c\\", "d"]
        );
    }

    #[test]
    fn operators_are_only_split_on_whitespace() {
        assert_eq!(tokens("ls|wc"), vec!["ls|wc"]);
        assert_eq!(tokens("ls | wc 2> err"), vec!["ls", "|", "wc", "2>", "err"]);
    }

    #[test]
    fn long_line_is_truncated() {
        let limits = Limits {
            max_line_length: 8,
            max_args: 256,
        };
        assert_eq!(split_into_tokens("echo abcdefgh", limits), vec!["echo", "abc"]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let limits = Limits {
            max_line_length: 3,
            max_args: 256,
        };
        assert_eq!(split_into_tokens("ééééé", limits), vec!["ééé"]);
    }

    #[test]
    fn extra_tokens_are_dropped() {
        let limits = Limits {
            max_line_length: 1024,
            max_args: 2,
        };
        assert_eq!(split_into_tokens("a b c d", limits), vec!["a", "b"]);
    }
}
