//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Settings file holding the boot counter
    #[arg(short, long, global = true)]
    pub settings: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the pipeline, reading button pin numbers from stdin (one per line)
    Run,
    /// Press one button and wait until its actions are dispatched
    Press {
        /// Button pin number
        pin: u32,
    },
    /// Print the effective configuration and the boot count
    Status,
    /// Print the application version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_takes_pin() {
        let cli = Cli::try_parse_from(["tapnet", "press", "3"]).unwrap();
        assert_eq!(cli.command, Commands::Press { pin: 3 });
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["tapnet", "run", "--verbose", "--config", "tapnet.toml"]).unwrap();
        assert_eq!(cli.command, Commands::Run);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("tapnet.toml"));
    }

    #[test]
    fn test_press_rejects_non_numeric_pin() {
        assert!(Cli::try_parse_from(["tapnet", "press", "two"]).is_err());
    }
}
