//! Tracing configuration and log routing.
//!
//! Logs go to stdout with a compact formatter and are mirrored to a file. When
//! `REPO_CHAT_LOG_FILE` is set, logs are appended to that path; otherwise a file logger is
//! created under `logs/repo-chat.log`. The file writer is non-blocking so request handlers
//! never wait on disk.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then `debug` in debug mode and `info`
/// otherwise.
pub fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

fn default_directive(config: &Config) -> String {
    match config.log_level.as_deref() {
        Some(level) => level.to_lowercase(),
        None if config.debug => "debug".to_string(),
        None => "info".to_string(),
    }
}

/// Returns `None` when the log file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    if let Ok(path) = std::env::var("REPO_CHAT_LOG_FILE") {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        }
    } else {
        if let Err(err) = std::fs::create_dir_all("logs") {
            eprintln!("Failed to create logs directory: {err}");
            return None;
        }
        let file_appender = tracing_appender::rolling::never("logs", "repo-chat.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_wins_over_debug_mode() {
        let config = Config {
            log_level: Some("WARN".into()),
            debug: true,
            ..Config::default()
        };
        assert_eq!(default_directive(&config), "warn");
    }

    #[test]
    fn debug_mode_raises_default_verbosity() {
        let config = Config {
            debug: true,
            ..Config::default()
        };
        assert_eq!(default_directive(&config), "debug");
        assert_eq!(default_directive(&Config::default()), "info");
    }
}
