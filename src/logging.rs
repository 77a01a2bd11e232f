//! Structured logging setup using the tracing stack
//!
//! Output format is controlled by the `LOG_FORMAT` environment variable
//! (`json`, `pretty`, or `compact`; JSON by default) and the level by
//! `LOG_LEVEL`, with `RUST_LOG` taking precedence for filtering.

use std::env;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Structured JSON for production and log aggregation
    Json,
    /// Human-readable with colors and indentation
    Pretty,
    /// Terminal-friendly with minimal spacing
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize logging with explicit settings
pub fn init_logging(level: Level, format: LogFormat) {
    let mut filter = EnvFilter::new(level.to_string())
        // Reduce noise from dependencies
        .add_directive("rustls=warn".parse().expect("valid directive"))
        .add_directive("tokio=warn".parse().expect("valid directive"));

    if let Ok(rust_log) = env::var("RUST_LOG") {
        filter = EnvFilter::new(rust_log);
    }

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            subscriber.with(fmt::layer().json()).init();
        }
        LogFormat::Pretty => {
            subscriber.with(fmt::layer().pretty().with_ansi(true)).init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_ansi(true))
                .init();
        }
    }
}

/// Initialize logging from `LOG_LEVEL` and `LOG_FORMAT`
pub fn init_default_logging() {
    let level = env::var("LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    init_logging(level, format);
}
