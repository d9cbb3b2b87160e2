use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{runtime_dir, LogLevel};

static INIT: OnceLock<()> = OnceLock::new();

/// Only the daemon writes log files; commands log to stderr.
const LOG_FILE_PREFIX: &str = "voltlink-daemon";
const LOG_FILES_KEPT: usize = 7;
const QUIET_TARGETS: &[&str] = &["mio=warn", "tokio_util=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Background daemon.
    File,
    /// One-shot commands.
    Stderr,
    /// Daemon in the foreground.
    Both,
}

pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

pub fn init(level: LogLevel, mode: LogMode, cli_override: Option<LogLevel>) -> LogGuard {
    let mut guard = None;

    INIT.get_or_init(|| {
        let Some(level) = cli_override.unwrap_or(level).as_tracing_level() else {
            return;
        };

        let file_writer = match mode {
            LogMode::Stderr => None,
            LogMode::File | LogMode::Both => daemon_log_writer(&runtime_dir()),
        };
        let file_layer = file_writer.map(|(writer, file_guard)| {
            guard = Some(file_guard);
            fmt::layer()
                .with_writer(writer)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
        });
        let stderr_layer = (mode != LogMode::File).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
        });

        tracing_subscriber::registry()
            .with(build_env_filter(level))
            .with(file_layer)
            .with(stderr_layer)
            .init();
    });

    LogGuard { _guard: guard }
}

fn build_env_filter(level: Level) -> EnvFilter {
    QUIET_TARGETS.iter().fold(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
        |filter, directive| match directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        },
    )
}

fn daemon_log_writer(dir: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: cannot create log directory {:?}: {}", dir, e);
        return None;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_FILES_KEPT)
        .build(dir)
        .ok()?;
    Some(tracing_appender::non_blocking(appender))
}

/// Newest daemon log file in the runtime dir.
pub fn latest_log_file() -> Option<PathBuf> {
    latest_log_file_in(&runtime_dir())
}

fn latest_log_file_in(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max()
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    struct ScratchDir(PathBuf);

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_latest_log_file_ignores_other_files() {
        let scratch = ScratchDir(
            std::env::temp_dir().join(format!("voltlink-logs-{}", std::process::id())),
        );
        let dir = &scratch.0;
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("voltlink.sock.bak"), b"").unwrap();
        fs::write(dir.join("other.2026-01-01.log"), b"").unwrap();
        assert_eq!(latest_log_file_in(dir), None);

        fs::write(dir.join("voltlink-daemon.2026-01-01.log"), b"started").unwrap();
        assert_eq!(
            latest_log_file_in(dir),
            Some(dir.join("voltlink-daemon.2026-01-01.log"))
        );
    }

    #[test]
    fn test_daemon_log_writer_creates_dir() {
        let scratch = ScratchDir(
            std::env::temp_dir().join(format!("voltlink-logdir-{}", std::process::id())),
        );
        let dir = scratch.0.join("nested");
        let writer = daemon_log_writer(&dir);
        assert!(writer.is_some());
        assert!(dir.is_dir());
        drop(writer);
    }

    #[test]
    fn test_log_level_off_installs_nothing() {
        let guard = init(LogLevel::Off, LogMode::Stderr, None);
        assert!(guard._guard.is_none());
    }
}
