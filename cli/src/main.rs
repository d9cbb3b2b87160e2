mod cli;
mod commands;
mod config;
mod daemon;
mod logging;

use clap::Parser;
use color_eyre::eyre::Result;
use voltlink_protocol::ReadingPayload;

use cli::{Cli, Commands};
use config::{ensure_dirs, LogLevel, UserConfig};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = UserConfig::load();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command {
        Commands::Daemon { command } => {
            commands::daemon::run(command, config.log_level, log_level_override)
        }
        Commands::Stats { watch, json } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::stats::run(watch, json)
        }
        Commands::Reload => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::stats::reload()
        }
        Commands::Push {
            soc,
            voltage,
            current,
            temperature,
            manufacturer,
        } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::stats::push(ReadingPayload {
                soc_percent: soc,
                voltage_v: voltage,
                current_a: current,
                temperature_c: temperature,
                manufacturer,
            })
        }
        Commands::Config { path, reset } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(path, reset)
        }
        Commands::Logs { lines, follow } => commands::logs::run(lines, follow),
    }
}
