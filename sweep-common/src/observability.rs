//! Tracing setup for scanner binaries and workers.
//!
//! Scans are long-lived batch jobs, so events go to a per-component log
//! file (`sweep.log`, `sweep-worker.log`, …) under one shared directory;
//! stderr output is opt-in for interactive runs. The returned [`LogGuard`]
//! owns the background writer: keep it alive for the life of the process
//! or buffered events are lost on exit.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The queue backend is chatty at debug level; keep it quiet unless the
/// operator asks for it via `RUST_LOG`.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Component name; becomes the log file stem.
    pub component: &'static str,
    /// Explicit log directory. Falls back to `SWEEP_LOG_DIR`, then to
    /// `~/.local/share/<component>`.
    pub dir: Option<PathBuf>,
    /// Emit JSON lines instead of the human format.
    pub json: bool,
    /// Duplicate events to stderr.
    pub stderr: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            component: "sweep",
            dir: None,
            json: false,
            stderr: false,
        }
    }
}

/// Keeps the non-blocking log writer alive; drop ends the log stream.
pub struct LogGuard {
    path: PathBuf,
    _writer: WorkerGuard,
}

impl LogGuard {
    /// The log file the component writes to (without the date suffix the
    /// daily roller appends).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Install the global `tracing` subscriber and open the component's log
/// file. If a subscriber is already installed (embedding callers, test
/// harnesses) the existing one is kept and only the file sink handle is
/// returned.
pub fn init_logging(opts: LogOptions) -> anyhow::Result<LogGuard> {
    let dir = resolve_dir(&opts);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let file_name = format!("{}.log", opts.component);
    let (writer, guard) = non_blocking(rolling::daily(&dir, &file_name));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = if opts.json {
        let base = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer));
        if opts.stderr {
            base.with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            base.try_init()
        }
    } else {
        let base = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(writer).with_ansi(false));
        if opts.stderr {
            base.with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
        } else {
            base.try_init()
        }
    };
    if installed.is_err() {
        // another subscriber won the race; our file sink still works for
        // anything routed to it, and the guard keeps it flushing
    }

    Ok(LogGuard {
        path: dir.join(file_name),
        _writer: guard,
    })
}

fn resolve_dir(opts: &LogOptions) -> PathBuf {
    if let Some(dir) = &opts.dir {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("SWEEP_LOG_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => Path::new(&home)
            .join(".local")
            .join("share")
            .join(opts.component),
        Err(_) => Path::new(".").join(opts.component),
    }
}
