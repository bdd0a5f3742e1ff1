//! Tracing setup for the service and its workers.
//!
//! Stdout follows `RUST_LOG` (default `info`). The file log starts from the same directives but
//! keeps `jobdesk::ingestion` and `jobdesk::queue` at `info` unless `RUST_LOG` names them or an
//! enclosing module: abandoned and dead-lettered deliveries never reach a submitter, so the file
//! is where they surface. The file log also records each `delivery` span when it closes, with
//! its message id, delivery count, and timings.
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const DEFAULT_DIRECTIVES: &str = "info";
const LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "jobdesk.log";

/// Targets the file log keeps at `info` or finer.
pub const PIPELINE_TARGETS: [&str; 2] = ["jobdesk::ingestion", "jobdesk::queue"];

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Append to the file named by `JOBDESK_LOG_FILE`.
    File(PathBuf),
    /// Daily-rolling files under a directory.
    Daily {
        /// Directory holding the rolled files.
        directory: PathBuf,
        /// File name prefix; the date is appended.
        prefix: String,
    },
}

impl LogDestination {
    /// Resolve from the raw value of `JOBDESK_LOG_FILE`; blank means the default rolling log.
    pub fn from_env_value(value: Option<String>) -> Self {
        match value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty()) {
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::Daily {
                directory: PathBuf::from(LOG_DIR),
                prefix: LOG_FILE_NAME.to_string(),
            },
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                tracing_appender::non_blocking(file)
            }
            Self::Daily { directory, prefix } => {
                std::fs::create_dir_all(directory)?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }
}

/// Install the stdout and file layers as the global subscriber.
///
/// File logging is skipped, with a note on stderr, when its destination cannot be opened.
pub fn init_tracing() {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(parse_filter(&directives));

    let destination = LogDestination::from_env_value(std::env::var("JOBDESK_LOG_FILE").ok());
    let file_layer = match destination.open() {
        Ok(writer) => Some(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .compact()
                .with_filter(parse_filter(&file_directives(&directives))),
        ),
        Err(err) => {
            eprintln!("File logging disabled ({destination:?}): {err}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Directives for the file log: `base` plus an `info` floor for each pipeline target that
/// `base` leaves unnamed.
pub fn file_directives(base: &str) -> String {
    let mut directives: Vec<&str> = base
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .collect();
    if directives.is_empty() {
        directives.push(DEFAULT_DIRECTIVES);
    }

    let floors: Vec<String> = PIPELINE_TARGETS
        .iter()
        .filter(|pipeline| {
            !directives
                .iter()
                .filter_map(|directive| directive_target(directive))
                .any(|target| covers(target, pipeline))
        })
        .map(|pipeline| format!("{pipeline}=info"))
        .collect();

    let mut rendered: Vec<String> = directives.into_iter().map(str::to_string).collect();
    rendered.extend(floors);
    rendered.join(",")
}

/// Target named by a directive, or `None` for a bare level such as `warn`.
fn directive_target(directive: &str) -> Option<&str> {
    let target = directive.split(['=', '[']).next()?.trim();
    let bare_level = target.parse::<tracing::Level>().is_ok() || target.eq_ignore_ascii_case("off");
    (!target.is_empty() && !bare_level).then_some(target)
}

fn covers(target: &str, pipeline: &str) -> bool {
    pipeline == target
        || pipeline
            .strip_prefix(target)
            .is_some_and(|rest| rest.starts_with("::"))
}

fn parse_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log directives `{directives}`: {err}");
        EnvFilter::new(DEFAULT_DIRECTIVES)
    })
}
