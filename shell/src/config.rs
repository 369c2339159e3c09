use crate::lexer::Limits;
use argh::FromArgs;

/// Default `tracing` filter when neither `LSH_LOG` nor `--log-filter` is given.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "LSH_LOG";

#[derive(FromArgs, Debug)]
/// lsh - a small interactive shell with pipes, redirection and background jobs.
pub struct Args {
    /// do not print the welcome banner.
    #[argh(switch, short = 'q')]
    pub quiet: bool,

    /// maximum number of characters read from one input line.
    #[argh(option, default = "Limits::default().max_line_length")]
    pub max_line_length: usize,

    /// maximum number of words kept from one input line.
    #[argh(option, default = "Limits::default().max_args")]
    pub max_args: usize,

    /// tracing filter directive, e.g. `debug` or `lsh=trace`.
    #[argh(option)]
    pub log_filter: Option<String>,
}

/// Runtime settings of one shell session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub limits: Limits,
    pub banner: bool,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            banner: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            limits: Limits {
                max_line_length: args.max_line_length.max(1),
                max_args: args.max_args.max(1),
            },
            banner: !args.quiet,
            log_filter: args
                .log_filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
