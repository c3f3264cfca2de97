//! Core business logic module
//!
//! This module contains the bridge channel client, the script handoff
//! channel, the import coordinator, and the supporting pieces that wire
//! them into one session.

pub mod backoff;
pub mod capture;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod handoff;
pub mod health;
pub mod host;
pub mod models;
pub mod service;
pub mod session;
pub mod version;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod channel_integration_tests;

#[cfg(test)]
mod handoff_integration_tests;



// Re-export commonly used types
pub use config::AppConfig;
pub use session::Session;
use std::path::PathBuf;

pub fn local_logging_enabled() -> bool {
    cfg!(feature = "local-logging")
}

pub fn resolve_log_dir() -> Result<PathBuf, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to resolve current directory: {e}"))?;
    Ok(cwd.join("log"))
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clip_bridge=info".into());

    #[cfg(feature = "local-logging")]
    {
        use std::sync::OnceLock;
        use tracing_appender::non_blocking::WorkerGuard;

        static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

        let log_dir = match resolve_log_dir() {
            Ok(dir) => dir,
            Err(err) => {
                eprintln!("{err}");
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .try_init();
                return;
            }
        };

        if let Err(err) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create log directory: {err}");
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init();
            return;
        }

        let file_appender = tracing_appender::rolling::never(&log_dir, "bridge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .try_init();
        return;
    }

    #[cfg(not(feature = "local-logging"))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    }
}
