//! Logging
//!
//! `init_logging` installs the global tracing subscriber. Engine events are
//! emitted through an [`EventSink`] handed to each component.

pub mod events;
pub mod sink;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub use events::EngineEvent;
pub use sink::{EventSink, FanoutSink, MemorySink, StoreSink, TracingSink};

/// Keeps the non-blocking file writer alive; drop it last
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with console and optional daily-rolling file output
pub fn init_logging(config: &LoggingConfig) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.level)));

    let mut guard = None;
    let file_layer = config.dir.as_ref().and_then(|dir| {
        // `rolling::daily` panics if it cannot create the file, so preflight
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let probe = dir.join(".aate_write_test");
        if let Err(e) = std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let _ = std::fs::remove_file(&probe);

        let appender = tracing_appender::rolling::daily(dir, "aate.log");
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let (text_layer, json_layer) = if config.json {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && file_logging_enabled {
        if let Some(dir) = config.dir.as_ref() {
            eprintln!("Logging to: {}/aate.log", dir.display());
        }
    }

    LoggingGuard { _file: guard }
}
