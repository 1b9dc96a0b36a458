mod changes;
mod cli;
mod commands;
mod config;
mod paths;
mod provision;
mod resource;
mod transport;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use declarative::NOTHING_CHANGED;
use std::io;
use std::process;

/// Return code for failures that carry no engine error
const UNKNOWN_ERROR: i32 = 253;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match run(&ctx, cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            ui::error(&format!("{err:#}"));
            process::exit(returncode(&err));
        }
    }
}

fn run(ctx: &Context, command: Commands) -> Result<i32> {
    match command {
        Commands::Expand { file } => commands::expand::run(ctx, &file).map(|()| 0),
        Commands::Test { file } => commands::check::run(ctx, &file).map(|()| 0),
        Commands::Up(args) => {
            let changed = commands::up::run(ctx, args)?;
            Ok(if changed { 0 } else { NOTHING_CHANGED })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(0)
        }
    }
}

/// Exit code of a failed command, taken from the engine error if there is one.
fn returncode(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<declarative::Error>())
        .map_or(UNKNOWN_ERROR, declarative::Error::returncode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use std::path::PathBuf;

    #[test]
    fn test_returncode_from_engine_error() {
        let err: anyhow::Error = declarative::Error::InvalidUser("nobody-here".to_string()).into();
        assert_eq!(returncode(&err), 141);

        let wrapped = Err::<(), _>(declarative::Error::SavedEventsAndNoInstruction(
            PathBuf::from("/var/lib/converge/events.saved"),
        ))
        .context("Provisioning failed")
        .unwrap_err();
        assert_eq!(returncode(&wrapped), 148);
    }

    #[test]
    fn test_returncode_for_other_errors() {
        assert_eq!(returncode(&anyhow::anyhow!("boom")), UNKNOWN_ERROR);
    }
}
