use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a machine to a declared set of resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every declared resource with its policy and arguments
    Expand {
        /// Declaration file (.toml or .json)
        file: PathBuf,
    },

    /// Validate a declaration without changing anything
    Test {
        /// Declaration file (.toml or .json)
        file: PathBuf,
    },

    /// Bring this machine in line with a declaration
    Up(UpArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Up
// ============================================================================

#[derive(Parser)]
pub struct UpArgs {
    /// Declaration file (.toml or .json)
    pub file: PathBuf,

    /// Show what would change without changing it
    #[arg(short, long)]
    pub simulate: bool,

    /// Continue with events saved by an aborted run
    #[arg(long, conflicts_with = "no_resume")]
    pub resume: bool,

    /// Discard events saved by an aborted run
    #[arg(long)]
    pub no_resume: bool,

    /// Directory holding saved events
    #[arg(long, env = "CONVERGE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_up_flags() {
        let cli = Cli::try_parse_from(["converge", "-vv", "up", "site.toml", "--simulate", "--resume"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Up(args) = cli.command else {
            panic!("expected up");
        };
        assert!(args.simulate);
        assert!(args.resume);
        assert!(!args.no_resume);
        assert_eq!(args.file, PathBuf::from("site.toml"));
    }

    #[test]
    fn test_resume_conflicts_with_no_resume() {
        let result = Cli::try_parse_from(["converge", "up", "site.toml", "--resume", "--no-resume"]);
        assert!(result.is_err());
    }
}
