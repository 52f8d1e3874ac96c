use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_LOG_FILTER: &str = "warn,cha=info";
const DEFAULT_LOG_FILE_PATH: &str = "logs/cha.log";
const FALLBACK_LOG_FILE_NAME: &str = "cha.log";

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

static FILE_WRITER_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

/// Where diagnostics go. Chat output always stays on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogOutput {
    Stderr,
    File,
    Both,
    Off,
}

impl LogOutput {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
            Self::Off => "off",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    output: LogOutput,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            format: parse_log_format(get_var("LOG_FORMAT").as_deref()),
            output: parse_log_output(get_var("LOG_OUTPUT").as_deref()),
            file_path: parse_log_file_path(get_var("LOG_FILE_PATH").as_deref()),
        }
    }
}

fn normalized(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_ascii_lowercase()
}

fn parse_log_format(raw: Option<&str>) -> LogFormat {
    match normalized(raw).as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn parse_log_output(raw: Option<&str>) -> LogOutput {
    match normalized(raw).as_str() {
        "file" => LogOutput::File,
        "both" => LogOutput::Both,
        "off" | "none" => LogOutput::Off,
        _ => LogOutput::Stderr,
    }
}

fn parse_log_file_path(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH))
}

fn rolling_file_writer(
    path: &Path,
) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| std::ffi::OsStr::new(FALLBACK_LOG_FILE_NAME));

    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Picks the writer for `settings`, degrading to stderr when the log file
/// cannot be opened.
fn build_writer(settings: &LogSettings) -> (BoxMakeWriter, Option<WorkerGuard>) {
    let include_stderr = match settings.output {
        LogOutput::Stderr | LogOutput::Off => {
            return (BoxMakeWriter::new(std::io::stderr), None);
        }
        LogOutput::File => false,
        LogOutput::Both => true,
    };

    match rolling_file_writer(&settings.file_path) {
        Ok((file_writer, guard)) if include_stderr => (
            BoxMakeWriter::new(std::io::stderr.and(file_writer)),
            Some(guard),
        ),
        Ok((file_writer, guard)) => (BoxMakeWriter::new(file_writer), Some(guard)),
        Err(err) => {
            eprintln!(
                "cha: failed to initialize LOG_OUTPUT={} at '{}': {}; {}",
                settings.output.as_str(),
                settings.file_path.display(),
                err,
                if include_stderr {
                    "using stderr only"
                } else {
                    "using stderr instead"
                }
            );
            (BoxMakeWriter::new(std::io::stderr), None)
        }
    }
}

fn install(format: LogFormat, env_filter: EnvFilter, writer: BoxMakeWriter) -> InitResult {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .try_init(),
    }
}

/// Flushes buffered file output when dropped.
#[must_use = "dropping the guard flushes and stops file logging"]
pub struct LogGuard {
    _private: (),
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        flush();
    }
}

/// Installs the global subscriber from `RUST_LOG`, `LOG_FORMAT`, `LOG_OUTPUT`
/// and `LOG_FILE_PATH`.
///
/// Keep the returned guard alive until exit.
pub fn init() -> LogGuard {
    let guard = LogGuard { _private: () };
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());
    if settings.output == LogOutput::Off {
        return guard;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (writer, worker_guard) = build_writer(&settings);
    if install(settings.format, env_filter, writer).is_ok()
        && let Ok(mut slot) = FILE_WRITER_GUARD.lock()
    {
        *slot = worker_guard;
    }
    guard
}

/// Writes out everything the file writer has buffered and stops it.
///
/// For paths that leave via `process::exit`, where no destructor runs.
pub fn flush() {
    let worker_guard = match FILE_WRITER_GUARD.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    drop(worker_guard);
}
