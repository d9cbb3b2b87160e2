use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use voltlink_protocol::DaemonStatus;

use crate::cli::DaemonCommands;
use crate::config::LogLevel;
use crate::daemon::{is_daemon_running, run_daemon, socket_path, DaemonClient};
use crate::logging::{self, LogMode};

pub fn run(
    command: DaemonCommands,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    match command {
        DaemonCommands::Start { foreground } => {
            if is_daemon_running() {
                println!("Daemon is already running.");
                return Ok(());
            }

            if foreground {
                let _guard = logging::init(log_level, LogMode::Both, log_level_override);
                println!("Starting daemon in foreground...");
                println!("Press Ctrl+C to stop.");
                run_daemon(true, log_level, log_level_override).map_err(|e| eyre!("{}", e))?;
            } else {
                println!("Starting daemon...");
                run_daemon(false, log_level, log_level_override).map_err(|e| eyre!("{}", e))?;
                std::thread::sleep(Duration::from_millis(500));

                let mut started = false;
                for _ in 0..3 {
                    if is_daemon_running() {
                        started = true;
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(200));
                }

                if started {
                    println!("Daemon started successfully.");
                    println!("Socket: {:?}", socket_path());
                } else {
                    println!("Daemon may have failed to start. Check logs:");
                    println!("  voltlink logs");
                }
            }
        }
        DaemonCommands::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }

            let mut client = DaemonClient::connect().map_err(|e| eyre!("{}", e))?;
            client.shutdown().map_err(|e| eyre!("{}", e))?;
            println!("Daemon stopped.");
        }
        DaemonCommands::Status => {
            println!("Daemon Status");
            println!("{}", "-".repeat(40));

            if !is_daemon_running() {
                println!("Running:      no");
                return Ok(());
            }

            let mut client =
                DaemonClient::connect_with_version_check().map_err(|e| eyre!("{}", e))?;
            let status = client.get_status().map_err(|e| eyre!("{}", e))?;
            print!("{}", format_status(&status));
        }
    }

    Ok(())
}

fn format_status(status: &DaemonStatus) -> String {
    let uptime = humantime::format_duration(Duration::from_secs(status.uptime_secs));
    let mut out = String::new();

    out.push_str("Running:      yes\n");
    out.push_str(&format!("Version:      {}\n", status.version));
    out.push_str(&format!("Uptime:       {}\n", uptime));
    out.push_str(&format!("Subscribers:  {}\n", status.subscriber_count));
    out.push_str(&format!(
        "Battery:      {}\n",
        if status.battery_enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    out.push_str(&format!(
        "Provider:     {}\n",
        status.provider.as_deref().unwrap_or("none")
    ));
    if let Some(port) = status.hardware_port {
        out.push_str(&format!("Port:         UART{}\n", port));
    }
    for claim in &status.claimed_ports {
        out.push_str(&format!("Claimed:      UART{} ({})\n", claim.port, claim.owner));
    }
    if let Some(error) = &status.last_error {
        out.push_str(&format!("Last error:   {}\n", error));
    }

    out
}

#[cfg(test)]
mod tests {
    use voltlink_protocol::PortOwner;

    use super::*;

    #[test]
    fn test_format_status_lists_claims_and_error() {
        let status = DaemonStatus {
            running: true,
            uptime_secs: 3725,
            version: "0.3.0".to_string(),
            battery_enabled: true,
            claimed_ports: vec![PortOwner {
                port: 2,
                owner: "reserved".to_string(),
            }],
            last_error: Some("Serial BMS needs UART2, which is in use by reserved".to_string()),
            ..DaemonStatus::default()
        };

        let text = format_status(&status);
        assert!(text.contains("Uptime:       1h 2m 5s"));
        assert!(text.contains("Provider:     none"));
        assert!(text.contains("Claimed:      UART2 (reserved)"));
        assert!(text.contains("Last error:   Serial BMS needs UART2"));
        assert!(!text.contains("Port:"));
    }
}
