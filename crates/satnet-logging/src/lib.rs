//! Structured logging for the satellite routing simulator
//!
//! # Features
//!
//! - **JSONL Output**: structured JSON lines on the console (default) or in a file
//! - **Pretty Output**: human-readable console output for development
//! - **Node Context**: `node_id`/`role` attached to spans while a node's callback runs
//! - **File Output**: single truncated file per run, or hourly/daily rotation
//!
//! # Quick Start
//!
//! ```ignore
//! use satnet_logging::{LogConfig, SatnetSubscriberBuilder};
//!
//! // JSONL to the console
//! let _guard = SatnetSubscriberBuilder::new().init()?;
//!
//! // Pretty console output plus a JSONL file
//! let _guard = SatnetSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_file_output(FileConfig { directory: run_dir.join("logs"), ..Default::default() })
//!     .init()?;
//! ```
//!
//! Keep the returned guard alive for as long as file output is needed.

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextExtension, NodeContextLayer, node_span};

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors from setting up logging
#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot create log output {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("a global subscriber is already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Builder for configuring and initializing the logging subscriber
///
/// By default, console output uses JSONL format. Use
/// [`LogConfig::development()`] for human-readable output.
pub struct SatnetSubscriberBuilder {
    config: LogConfig,
}

impl SatnetSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// `RUST_LOG` when set, otherwise the configured directives
    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let mut filter = EnvFilter::new(&self.config.default_level);
        for directive in self.config.directives().into_iter().skip(1) {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    /// Single files are truncated per run; rotating files append
    fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
        fs::create_dir_all(&file_config.directory).map_err(|source| LogError::Io {
            path: file_config.directory.clone(),
            source,
        })?;
        let rotation = match file_config.rotation {
            RotationStrategy::Never => {
                let path = file_config.single_file_path();
                let file = File::create(&path).map_err(|source| LogError::Io { path, source })?;
                return Ok(tracing_appender::non_blocking(file));
            }
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        };
        let appender =
            RollingFileAppender::new(rotation, &file_config.directory, &file_config.prefix);
        Ok(tracing_appender::non_blocking(appender))
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard when file output is configured. Fails
    /// if a global subscriber is already set.
    pub fn init(self) -> Result<Option<WorkerGuard>, LogError> {
        let env_filter = self.env_filter()?;
        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });

        let json_console = (console.enabled && !console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(jsonl.include_spans)
                .flatten_event(jsonl.flatten_events)
                .with_file(jsonl.include_location)
                .with_line_number(jsonl.include_location)
                .with_thread_ids(jsonl.include_thread_info)
        });

        let (file_layer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = Self::file_writer(file_config)?;
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location)
                    .with_thread_ids(jsonl.include_thread_info)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new())
            .with(pretty_console)
            .with(json_console)
            .with(file_layer)
            .try_init()?;

        Ok(guard)
    }
}

impl Default for SatnetSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LogError> {
    SatnetSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for tests; a subscriber set by an earlier test is kept
pub fn init_testing() {
    let _ = SatnetSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
