use crate::env::{env_or, parse_flag, JOBLOG_CONSOLE_ENV, JOBLOG_CONSOLE_LEVEL_ENV, JOBLOG_ROOT_ENV};
use crate::format::LineFormatter;
use crate::identity::ProcessIdentity;
use crate::lifecycle::{install_panic_hook, JobGuard};
use crate::path::LogFilePath;
use crate::resource::{platform_provider, ResourceSnapshotProvider};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Metadata, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{MakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

static STARTED: AtomicBool = AtomicBool::new(false);

/// Sink configuration.
///
/// **Fields**
/// - `log_root`: directory the dated `YYYY/YYYYMM/YYYYMMDD` tree goes under.
/// - `file_level`: minimum level written to the log file.
/// - `console_level`: minimum level written to stderr.
/// - `enable_console`: if `false`, only the file sink is installed.
#[derive(Clone, Debug)]
pub struct JoblogConfig {
    pub log_root: PathBuf,
    pub file_level: LevelFilter,
    pub console_level: LevelFilter,
    pub enable_console: bool,
}

impl Default for JoblogConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("logs"),
            file_level: LevelFilter::DEBUG,
            console_level: LevelFilter::INFO,
            enable_console: true,
        }
    }
}

impl JoblogConfig {
    /// Defaults overridden by `JOBLOG_ROOT`, `JOBLOG_CONSOLE_LEVEL` and
    /// `JOBLOG_CONSOLE`. Values that do not parse keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let log_root = PathBuf::from(env_or(JOBLOG_ROOT_ENV, "logs"));
        let console_level = std::env::var(JOBLOG_CONSOLE_LEVEL_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.console_level);
        let enable_console = std::env::var(JOBLOG_CONSOLE_ENV)
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.enable_console);

        Self {
            log_root,
            console_level,
            enable_console,
            ..defaults
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("joblog already started in this process")]
    AlreadyStarted,

    #[error("cannot create log directory {}: {}", .path.display(), .source)]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open log file {}: {}", .path.display(), .source)]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("set global subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the two-sink subscriber: everything from `file_level` up goes to
/// `file`, everything from `console_level` up to `console`.
///
/// Each event is rendered once by [`LineFormatter`] and the same bytes are
/// written to both sinks, so their prefixes always agree.
pub fn build_subscriber<F, C>(
    file: F,
    console: C,
    config: &JoblogConfig,
    formatter: LineFormatter,
) -> impl Subscriber + Send + Sync + 'static
where
    F: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    C: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let file_level = config.file_level;
    let console_level = config.console_level;
    let enable_console = config.enable_console;

    let file = MakeWriterExt::with_filter(file, move |meta: &Metadata<'_>| {
        *meta.level() <= file_level
    });
    let console = MakeWriterExt::with_filter(console, move |meta: &Metadata<'_>| {
        enable_console && *meta.level() <= console_level
    });

    let root_level = if enable_console {
        file_level.max(console_level)
    } else {
        file_level
    };

    let layer = tracing_subscriber::fmt::layer()
        .event_format(formatter)
        .with_writer(file.and(console))
        .with_ansi(false)
        .with_filter(root_level);

    Registry::default().with(layer)
}

/// Start job logging with [`JoblogConfig::default`].
///
/// Equivalent to calling [`start_with_config`] with the default
/// configuration: logs under `./logs`, debug and up to the file, info and
/// up to stderr.
pub fn start() -> Result<JobGuard, InitError> {
    start_with_config(JoblogConfig::default())
}

/// Initialize job logging for this process.
///
/// Registration is not synchronized: callers must not race two `start`
/// calls from different threads.
///
/// **Effects**
///
/// Creates the dated log directory, installs the file and console sinks
/// as the global `tracing` subscriber, installs a panic hook, and logs the
/// start lines.
///
/// **Returns**
/// - A [`JobGuard`] that logs the exit summary when dropped. Keep it
///   alive for the whole of `main`.
/// - `Err(..)` if already started, or the log directory or file cannot be
///   created. Nothing has been logged in that case.
pub fn start_with_config(config: JoblogConfig) -> Result<JobGuard, InitError> {
    if STARTED.swap(true, Ordering::SeqCst) {
        return Err(InitError::AlreadyStarted);
    }
    let result = install(config);
    if result.is_err() {
        STARTED.store(false, Ordering::SeqCst);
    }
    result
}

fn install(config: JoblogConfig) -> Result<JobGuard, InitError> {
    let identity = ProcessIdentity::resolve();
    let path = LogFilePath::new(&config.log_root, Utc::now(), &identity);
    path.create_dir().map_err(|source| InitError::CreateDir {
        path: path.dir().to_path_buf(),
        source,
    })?;
    let file = open_log_file(&path)?;

    let resources: Arc<dyn ResourceSnapshotProvider> = platform_provider();
    let formatter = LineFormatter::new(Arc::clone(&resources));
    let subscriber = build_subscriber(Mutex::new(file), io::stderr, &config, formatter);
    tracing::subscriber::set_global_default(subscriber)?;

    install_panic_hook();
    Ok(JobGuard::begin(identity, path.file().to_path_buf(), resources))
}

fn open_log_file(path: &LogFilePath) -> Result<File, InitError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.file())
        .map_err(|source| InitError::OpenFile {
            path: path.file().to_path_buf(),
            source,
        })
}
