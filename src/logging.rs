//! Subscriber setup for the CLI and embedding services
//!
//! Session and progression events are logged under the `liftrs` target.
//! `RUST_LOG` overrides the configured level.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const DEFAULT_LOG_FILE: &str = "liftrs.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Console format; file output is always JSON
    pub format: LogFormat,

    /// Also write to this file
    pub file_path: Option<PathBuf>,

    /// Roll the log file daily instead of appending to one file
    pub rotation: bool,

    /// Log span enter/close events, e.g. around progression runs
    pub include_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: true,
            include_spans: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Map a `-v` count onto a level, starting from warn
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn directive(&self) -> String {
        format!("liftrs={}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

fn file_writer(path: &Path, rotation: bool) -> anyhow::Result<BoxMakeWriter> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;

    if rotation {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_LOG_FILE);
        Ok(BoxMakeWriter::new(tracing_appender::rolling::daily(
            directory, file_name,
        )))
    } else {
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BoxMakeWriter::new(Mutex::new(file)))
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_line_number(true)
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(config.include_spans)
            .with_span_list(config.include_spans)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_span_events(span_events).boxed(),
    };

    let file = match &config.file_path {
        Some(path) => Some(
            fmt::layer()
                .json()
                .with_writer(file_writer(path, config.rotation)?)
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::debug!(level = ?config.level, format = ?config.format, file = ?config.file_path, "Logging initialized");
    Ok(())
}
