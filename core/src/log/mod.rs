//! Logging setup for applications embedding the render core.
//!
//! The render system only emits `tracing` events. Hosts that have no subscriber of their own can
//! call [`init`] once at startup to get a stderr sink plus a rolling log file. Later calls return
//! the handle installed by the first one.

use std::cmp;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, util::SubscriberInitExt};

const DEFAULT_ENV_FILTER_VARS: [&str; 2] = ["RENDER_CORE_LOG", "RUST_LOG"];

static LOG_HANDLE: OnceLock<LogHandle> = OnceLock::new();

/// Level filter accepted by [`LogConfig`].
pub use tracing_subscriber::filter::LevelFilter as LogLevel;

/// How often the log file is rotated.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogRolling {
    Hourly,
    Daily,
    /// Single append-only file.
    Never,
}

impl LogRolling {
    fn to_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            LogRolling::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            LogRolling::Daily => tracing_appender::rolling::Rotation::DAILY,
            LogRolling::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub directory: PathBuf,
    /// Log files are named `<prefix>.<date>.log`.
    pub file_prefix: String,
    /// Number of rolled files to keep. `None` keeps everything.
    pub retention: Option<usize>,
    pub file_level: LevelFilter,
    pub console_level: LevelFilter,
    /// Forward `log` crate records (e.g. from a document backend) into `tracing`.
    pub capture_log: bool,
    /// Filter directive such as `render_core=trace`. Defaults to `RENDER_CORE_LOG` or `RUST_LOG`.
    pub env_filter: Option<String>,
    pub rolling: LogRolling,
}

impl Default for LogConfig {
    fn default() -> Self {
        let directory = default_log_directory();
        let file_prefix = "render".to_string();
        let retention = Some(7);
        let file_level = LevelFilter::DEBUG;
        let console_level =
            if cfg!(debug_assertions) { LevelFilter::INFO } else { LevelFilter::WARN };

        Self {
            directory,
            file_prefix,
            retention,
            file_level,
            console_level,
            capture_log: true,
            env_filter: env_directive(),
            rolling: LogRolling::Daily,
        }
    }
}

impl LogConfig {
    pub fn with_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.directory = path.into();
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }
}

/// Keeps the background file writer alive.
#[derive(Debug)]
pub struct LogHandle {
    _guard: tracing_appender::non_blocking::WorkerGuard,
    directory: PathBuf,
    file_prefix: String,
}

impl LogHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }
}

/// Install the global subscriber. Only the first call's configuration takes effect.
pub fn init(config: LogConfig) -> Result<&'static LogHandle> {
    if let Some(handle) = LOG_HANDLE.get() {
        return Ok(handle);
    }

    let handle = setup(config)?;
    Ok(LOG_HANDLE.get_or_init(|| handle))
}

fn setup(config: LogConfig) -> Result<LogHandle> {
    if config.capture_log {
        install_log_tracer(config.file_level, config.console_level)?;
    }

    fs::create_dir_all(&config.directory)
        .with_context(|| format!("creating log directory at {}", config.directory.display()))?;

    if let Some(retention) = config.retention.filter(|r| *r > 0) {
        prune_old_logs(&config.directory, &config.file_prefix, retention)
            .context("pruning old log files")?;
    }

    let rolling = tracing_appender::rolling::Builder::new()
        .rotation(config.rolling.to_rotation())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(config.directory.clone())
        .context("creating rolling log appender")?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling);

    let directive = config
        .env_filter
        .filter(|directive| !directive.trim().is_empty())
        .or_else(env_directive)
        .unwrap_or_else(|| if cfg!(debug_assertions) { "debug" } else { "info" }.to_string());

    let env_filter = EnvFilter::try_new(directive).context("parsing env filter directive")?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_file(true)
        .with_line_number(true)
        .with_filter(config.file_level);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(config.console_level);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(LogHandle { _guard: guard, directory: config.directory, file_prefix: config.file_prefix })
}

fn env_directive() -> Option<String> {
    DEFAULT_ENV_FILTER_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|directive| !directive.trim().is_empty())
}

fn install_log_tracer(file_level: LevelFilter, console_level: LevelFilter) -> Result<()> {
    // More verbose filters compare greater.
    let max_level = bridge_level(cmp::max(file_level, console_level));
    // Fails only if another logger is installed, in which case its records stay where they go.
    let _ = tracing_log::LogTracer::builder().with_max_level(max_level).init();
    Ok(())
}

/// Cap for records forwarded from the `log` facade.
fn bridge_level(max_level: LevelFilter) -> log::LevelFilter {
    match max_level {
        LevelFilter::OFF => log::LevelFilter::Off,
        LevelFilter::ERROR => log::LevelFilter::Error,
        LevelFilter::WARN => log::LevelFilter::Warn,
        LevelFilter::INFO => log::LevelFilter::Info,
        LevelFilter::DEBUG => log::LevelFilter::Debug,
        LevelFilter::TRACE => log::LevelFilter::Trace,
    }
}

/// Delete the oldest log files starting with `prefix` until at most `retention` remain.
fn prune_old_logs(dir: &Path, prefix: &str, retention: usize) -> Result<usize> {
    let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("reading log directory at {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| has_prefix(&entry.path(), prefix))
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(|meta| meta.is_file())?;
            Some((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), entry.path()))
        })
        .collect();

    let excess = logs.len().saturating_sub(retention);
    logs.sort();
    let removed =
        logs.iter().take(excess).filter(|(_, path)| fs::remove_file(path).is_ok()).count();
    Ok(removed)
}

fn has_prefix(path: &Path, prefix: &str) -> bool {
    path.file_name().and_then(OsStr::to_str).is_some_and(|name| name.starts_with(prefix))
}

fn default_log_directory() -> PathBuf {
    directories::ProjectDirs::from("org", "RenderCore", "render-core")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("render-core-logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_forwards_the_most_verbose_level() {
        assert_eq!(bridge_level(LevelFilter::OFF), log::LevelFilter::Off);
        assert_eq!(bridge_level(LevelFilter::WARN), log::LevelFilter::Warn);
        assert_eq!(
            bridge_level(cmp::max(LevelFilter::INFO, LevelFilter::TRACE)),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn init_is_idempotent() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config =
            LogConfig::default().with_directory(temp.path().join("logs")).with_prefix("test-log");

        let first = init(config.clone()).expect("init once");
        assert!(first.directory().exists());
        assert_eq!(first.file_prefix(), "test-log");

        let second = init(config.with_prefix("ignored")).expect("init twice");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn pruning_keeps_the_newest_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        for day in 1..=4 {
            fs::write(temp.path().join(format!("render.2024-01-0{day}.log")), b"x").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        fs::write(temp.path().join("other.log"), b"x").unwrap();

        assert_eq!(prune_old_logs(temp.path(), "render", 2).unwrap(), 2);

        let mut left: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, ["other.log", "render.2024-01-03.log", "render.2024-01-04.log"]);
    }
}
