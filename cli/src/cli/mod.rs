mod daemon;

pub use daemon::DaemonCommands;

use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Show current battery statistics
    Stats {
        /// Keep printing updates as the daemon publishes them
        #[arg(short, long)]
        watch: bool,

        /// Print JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Re-read the config file and restart the battery provider
    Reload,

    /// Push a reading to the networked provider
    Push {
        #[arg(long)]
        soc: f32,

        #[arg(long)]
        voltage: f32,

        #[arg(long, allow_hyphen_values = true)]
        current: f32,

        #[arg(long, allow_hyphen_values = true)]
        temperature: Option<f32>,

        #[arg(long)]
        manufacturer: Option<String>,
    },

    Config {
        #[arg(long)]
        path: bool,

        #[arg(long)]
        reset: bool,
    },

    Logs {
        #[arg(short, long, default_value_t = 50)]
        lines: usize,

        #[arg(short, long)]
        follow: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "voltlink", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_push_accepts_negative_current() {
        let cli = Cli::try_parse_from([
            "voltlink", "push", "--soc", "40", "--voltage", "48.1", "--current", "-12.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Push { current, .. } => assert_eq!(current, -12.5),
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_daemon_start_foreground() {
        let cli =
            Cli::try_parse_from(["voltlink", "--log-level", "debug", "daemon", "start", "-f"])
                .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                command: DaemonCommands::Start { foreground: true }
            }
        ));
    }
}
