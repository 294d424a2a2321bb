//! provides logging helpers

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// When set, logs go to a daily rolling file at this path instead of stderr.
pub const LOG_PATH_ENV_VAR: &str = "GIT_KUBE_WATCH_LOG_PATH";

const MAX_LOG_FILES: usize = 3;

/// initiate the global tracing subscriber
///
/// `RUST_LOG` overrides `default_level`. The returned guard must be held for
/// the lifetime of the process when file logging is active, otherwise
/// buffered lines are lost on exit.
pub fn init(default_level: filter::LevelFilter) -> Option<WorkerGuard> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match env::var(LOG_PATH_ENV_VAR).ok().and_then(rolling_appender) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let fmt_layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter);
            registry().with(fmt_layer).init();
            Some(guard)
        }
        None => {
            let fmt_layer = layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter);
            registry().with(fmt_layer).init();
            None
        }
    }
}

fn rolling_appender(log_path: String) -> Option<RollingFileAppender> {
    let path = Path::new(&log_path);
    let dir = path.parent()?;
    let file = path.file_name()?.to_str()?;

    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("failed to create rolling file appender at {log_path}: {e}, logging to stderr");
            None
        }
    }
}
