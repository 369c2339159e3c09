use lsh::config::{Args, Config, LOG_ENV};
use lsh::{Interpreter, Session, TerminalReader};
use std::{env, process};
use tracing::{error, info};

fn init_logging(config: &Config) {
    let filter = env::var(LOG_ENV).unwrap_or_else(|_| config.log_filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    let config = Config::from(args);
    init_logging(&config);

    let session = match Session::interactive(config) {
        Ok(session) => session,
        Err(err) => {
            error!(%err, "startup failed");
            eprintln!("lsh error: {err}");
            process::exit(1);
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        interactive = session.is_interactive(),
        pgid = ?session.foreground_group(),
        "starting lsh"
    );

    let reader = TerminalReader::new()?;
    Interpreter::new(session, Box::new(reader)).repl()?;
    Ok(())
}
