//! Classification of a token sequence into a [`CommandLine`].
//!
//! Grammar, one token per operator:
//!
//! ```text
//! line      := <empty> | builtin | pipeline | command
//! pipeline  := stage ('|' stage)+
//! command   := argv [ '&' | '>' FILE | '2>' FILE | '<' FILE '>' FILE ]
//! ```
//!
//! Built-ins are recognized first and only receive the words before the first
//! operator. Input redirection is only accepted in the `< FILE > FILE` shape, and
//! background execution cannot be combined with redirection or pipes.

use crate::builtin::Builtin;
use crate::command::{Command, CommandLine, Pipeline};
use crate::error::ParseError;
use std::path::PathBuf;

/// Control operators recognized when they form a whole token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,
    RedirectOut,
    RedirectIn,
    RedirectErr,
    Background,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Operator> {
        match token {
            "|" => Some(Operator::Pipe),
            ">" => Some(Operator::RedirectOut),
            "<" => Some(Operator::RedirectIn),
            "2>" => Some(Operator::RedirectErr),
            "&" => Some(Operator::Background),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::RedirectOut => ">",
            Operator::RedirectIn => "<",
            Operator::RedirectErr => "2>",
            Operator::Background => "&",
        }
    }
}

fn is_operator(token: &str) -> bool {
    Operator::from_token(token).is_some()
}

/// Walks the tokens of one command, left to right.
struct CommandParser<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> CommandParser<'a> {
    fn new(tokens: &'a [String]) -> Self {
        CommandParser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn consume(&mut self) -> Option<&'a str> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes a file operand for `op`.
    fn expect_target(&mut self, op: Operator) -> Result<PathBuf, ParseError> {
        match self.consume() {
            Some(token) if !is_operator(token) => Ok(PathBuf::from(token)),
            _ => Err(ParseError::MissingTarget(op.as_str())),
        }
    }

    /// Fails if anything is left after a complete redirection.
    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.consume() {
            None => Ok(()),
            Some(token) => Err(ParseError::MalformedRedirection(format!(
                "unexpected `{token}`"
            ))),
        }
    }

    fn parse_command(mut self) -> Result<Command, ParseError> {
        let mut argv = Vec::new();
        while let Some(token) = self.peek() {
            if is_operator(token) {
                break;
            }
            argv.push(token.to_string());
            self.pos += 1;
        }
        if argv.is_empty() {
            return Err(ParseError::UnknownShape);
        }

        let mut command = Command::new(argv);
        let Some(op) = self.consume().and_then(Operator::from_token) else {
            return Ok(command);
        };

        match op {
            Operator::Background => {
                if self.peek().is_some() {
                    return Err(ParseError::MisplacedBackground);
                }
                command.background = true;
            }
            Operator::RedirectOut => {
                command.stdout = Some(self.expect_target(op)?);
                self.expect_end()?;
            }
            Operator::RedirectErr => {
                command.stderr = Some(self.expect_target(op)?);
                self.expect_end()?;
            }
            Operator::RedirectIn => {
                let input = self.consume();
                let arrow = self.consume();
                let output = self.consume();
                match (input, arrow, output) {
                    (Some(input), Some(">"), Some(output))
                        if !is_operator(input) && !is_operator(output) =>
                    {
                        command.stdin = Some(PathBuf::from(input));
                        command.stdout = Some(PathBuf::from(output));
                    }
                    (Some(_), Some(found), Some(_)) if found != ">" => {
                        return Err(ParseError::MalformedRedirection(format!(
                            "expected `>` and found `{found}`"
                        )));
                    }
                    _ => {
                        return Err(ParseError::MalformedRedirection(
                            "expected `< FILE > FILE`".to_string(),
                        ));
                    }
                }
                self.expect_end()?;
            }
            Operator::Pipe => return Err(ParseError::UnknownShape),
        }
        Ok(command)
    }
}

/// Parses one command (no `|` tokens) with its redirection or background marker.
pub fn parse_command(tokens: &[String]) -> Result<Command, ParseError> {
    CommandParser::new(tokens).parse_command()
}

fn parse_pipeline(tokens: &[String]) -> Result<Pipeline, ParseError> {
    let segments: Vec<&[String]> = tokens.split(|t| t == Operator::Pipe.as_str()).collect();
    let last = segments.len() - 1;

    let mut stages = Vec::with_capacity(segments.len());
    for (i, segment) in segments.into_iter().enumerate() {
        if segment.is_empty() {
            return Err(ParseError::EmptyPipelineStage);
        }
        let stage = parse_command(segment)?;
        if stage.background {
            return Err(ParseError::BackgroundPipeline);
        }
        if stage.stdin.is_some() && i != 0 {
            return Err(ParseError::InputNotOnFirstStage);
        }
        if stage.stdout.is_some() && i != last {
            return Err(ParseError::OutputNotOnLastStage);
        }
        stages.push(stage);
    }
    Ok(Pipeline { stages })
}

/// Classifies a full token sequence.
pub fn parse(tokens: &[String]) -> Result<CommandLine, ParseError> {
    let Some(first) = tokens.first() else {
        return Ok(CommandLine::Empty);
    };

    if let Some(builtin) = Builtin::lookup(first) {
        let args = tokens[1..]
            .iter()
            .take_while(|t| !is_operator(t))
            .cloned()
            .collect();
        return Ok(CommandLine::Builtin { builtin, args });
    }

    if tokens.iter().any(|t| t == Operator::Pipe.as_str()) {
        return parse_pipeline(tokens).map(CommandLine::Pipeline);
    }

    parse_command(tokens).map(CommandLine::Simple)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn simple(line: &str) -> Command {
        match parse(&toks(line)).unwrap() {
            CommandLine::Simple(command) => command,
            other => panic!("expected a simple command, got {other:?}"),
        }
    }

    #[test]
    fn empty_line() {
        assert_eq!(parse(&[]).unwrap(), CommandLine::Empty);
    }

    #[test]
    fn plain_command() {
        let cmd = simple("ls -l /tmp");
        assert_eq!(cmd, Command::new(toks("ls -l /tmp")));
    }

    #[test]
    fn builtin_ignores_operators() {
        assert_eq!(
            parse(&toks("cd /tmp & > x")).unwrap(),
            CommandLine::Builtin {
                builtin: Builtin::ChangeDirectory,
                args: vec!["/tmp".to_string()],
            }
        );
        assert_eq!(
            parse(&toks("help | wc")).unwrap(),
            CommandLine::Builtin {
                builtin: Builtin::ShowHelp,
                args: vec![],
            }
        );
    }

    #[test]
    fn background() {
        let cmd = simple("sleep 2 &");
        assert!(cmd.background);
        assert_eq!(cmd.argv, toks("sleep 2"));
    }

    #[test]
    fn background_must_be_last() {
        assert_eq!(
            parse(&toks("sleep 2 & echo")),
            Err(ParseError::MisplacedBackground)
        );
        assert_eq!(
            parse(&toks("sleep 2 & > out")),
            Err(ParseError::MisplacedBackground)
        );
    }

    #[test]
    fn output_and_error_redirection() {
        let cmd = simple("echo hello > f");
        assert_eq!(cmd.stdout, Some(PathBuf::from("f")));
        assert_eq!(cmd.argv, toks("echo hello"));

        let cmd = simple("ls nope 2> err.txt");
        assert_eq!(cmd.stderr, Some(PathBuf::from("err.txt")));
        assert_eq!(cmd.stdout, None);
    }

    #[test]
    fn redirection_needs_exactly_one_target() {
        assert_eq!(
            parse(&toks("echo hello >")),
            Err(ParseError::MissingTarget(">"))
        );
        assert_eq!(
            parse(&toks("echo hello 2>")),
            Err(ParseError::MissingTarget("2>"))
        );
        assert!(matches!(
            parse(&toks("echo hello > a b")),
            Err(ParseError::MalformedRedirection(_))
        ));
        assert_eq!(
            parse(&toks("echo > &")),
            Err(ParseError::MissingTarget(">"))
        );
    }

    #[test]
    fn redirection_cannot_be_backgrounded() {
        assert!(matches!(
            parse(&toks("echo hi > f &")),
            Err(ParseError::MalformedRedirection(_))
        ));
    }

    #[test]
    fn input_needs_output_shape() {
        let cmd = simple("sort < in.txt > out.txt");
        assert_eq!(cmd.stdin, Some(PathBuf::from("in.txt")));
        assert_eq!(cmd.stdout, Some(PathBuf::from("out.txt")));
        assert_eq!(cmd.argv, toks("sort"));

        assert!(matches!(
            parse(&toks("sort < in.txt")),
            Err(ParseError::MalformedRedirection(_))
        ));
        assert_eq!(
            parse(&toks("sort < in.txt 2> out.txt")),
            Err(ParseError::MalformedRedirection(
                "expected `>` and found `2>`".to_string()
            ))
        );
    }

    #[test]
    fn missing_command() {
        assert_eq!(parse(&toks("> out")), Err(ParseError::UnknownShape));
        assert_eq!(parse(&toks("&")), Err(ParseError::UnknownShape));
    }

    #[test]
    fn pipeline_stages() {
        let CommandLine::Pipeline(pipeline) = parse(&toks("printf foo | cat | wc -c")).unwrap()
        else {
            panic!("expected a pipeline");
        };
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.stages[0].argv, toks("printf foo"));
        assert_eq!(pipeline.stages[2].argv, toks("wc -c"));
    }

    #[test]
    fn pipeline_with_edge_redirections() {
        let CommandLine::Pipeline(pipeline) = parse(&toks("ls 2> e | sort > out")).unwrap() else {
            panic!("expected a pipeline");
        };
        assert_eq!(pipeline.stages[0].stderr, Some(PathBuf::from("e")));
        assert_eq!(pipeline.stages[1].stdout, Some(PathBuf::from("out")));
    }

    #[test]
    fn pipeline_errors() {
        assert_eq!(parse(&toks("| wc")), Err(ParseError::EmptyPipelineStage));
        assert_eq!(parse(&toks("ls |")), Err(ParseError::EmptyPipelineStage));
        assert_eq!(parse(&toks("ls | | wc")), Err(ParseError::EmptyPipelineStage));
        assert_eq!(parse(&toks("ls | wc &")), Err(ParseError::BackgroundPipeline));
        assert_eq!(
            parse(&toks("ls > f | wc")),
            Err(ParseError::OutputNotOnLastStage)
        );
    }
}
