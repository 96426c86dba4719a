//! Logging system configuration and initialization
//!
//! - `init_logging_with_config` installs the process-wide subscriber
//!   (console, optional non-blocking log file, JSON or plain format).
//! - [`RunLogScope`] is a dedicated subscriber for one site run. It appends
//!   to that site's log file and echoes to the console. The orchestrator
//!   future is run under it, so concurrent runs never mix their files.
//!
//! `RUST_LOG` overrides the configured level and module filters.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{Dispatch, info};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const PROCESS_LOG_FILE: &str = "catalog-watch.log";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log path {0:?} has no file name")]
    NoFileName(PathBuf),

    #[error("Invalid log filter directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    #[error("A global subscriber is already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("No logging output configured")]
    NoOutput,
}

/// Local wall-clock timestamps with milliseconds
#[derive(Debug, Clone, Copy, Default)]
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Keeps the process log file writer alive; flushes on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Build the level filter: `RUST_LOG` if set, else the configured level plus
/// per-module directives. Noisy dependencies stay quiet unless TRACE is asked for.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)?;
    if !config.level.to_lowercase().contains("trace") {
        filter = filter
            .add_directive("sqlx::query=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("h2=warn".parse()?);

        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter = filter.add_directive(format!("{module}={level}").parse()?);
        }
    }
    Ok(filter)
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::Layer::new()
            .json()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .boxed()
    } else {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .boxed()
    }
}

fn file_layer(writer: non_blocking::NonBlocking, json: bool) -> BoxedLayer {
    if json {
        fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::Layer::new()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .with_ansi(false)
            .boxed()
    }
}

/// Open an append-mode non-blocking writer on `path`, creating its directory.
fn append_writer(path: &Path) -> Result<(non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::NoFileName(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    Ok(non_blocking(rolling::never(dir, file_name)))
}

/// Install the process-wide subscriber.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        layers.push(console_layer(config.json_format));
    }
    if config.file_output {
        let dir = match &config.log_dir {
            Some(dir) => dir.clone(),
            None => crate::infrastructure::config::paths::data_dir()
                .map(|dir| dir.join("logs"))
                .unwrap_or_else(|_| PathBuf::from("logs")),
        };
        let (writer, guard) = append_writer(&dir.join(PROCESS_LOG_FILE))?;
        layers.push(file_layer(writer, config.json_format));
        file_guard = Some(guard);
    }
    if layers.is_empty() {
        return Err(LoggingError::NoOutput);
    }

    Registry::default()
        .with(build_env_filter(config)?)
        .with(layers)
        .try_init()?;

    info!("📋 Logging initialized (level: {}, json: {})", config.level, config.json_format);
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Logging sink scoped to one orchestrator run.
///
/// Events emitted while the scope's [`Dispatch`] is current go to the site
/// log file (appended, plain text) and, if console output is enabled, to
/// stdout. The file writer is flushed when the scope is dropped.
pub struct RunLogScope {
    dispatch: Dispatch,
    path: PathBuf,
    _guard: WorkerGuard,
}

impl RunLogScope {
    pub fn open(log_path: &Path, config: &LoggingConfig) -> Result<Self, LoggingError> {
        let (writer, guard) = append_writer(log_path)?;

        let mut layers: Vec<BoxedLayer> = vec![file_layer(writer, false)];
        if config.console_output {
            layers.push(console_layer(config.json_format));
        }

        let subscriber = Registry::default()
            .with(build_env_filter(config)?)
            .with(layers);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path: log_path.to_path_buf(),
            _guard: guard,
        })
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }
}

impl std::fmt::Debug for RunLogScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogScope").field("path", &self.path).finish_non_exhaustive()
    }
}
