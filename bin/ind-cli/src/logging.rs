use anyhow::anyhow;
use ind_client::config::LoggingConfig;
use std::{ffi::OsStr, path::Path};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::Targets, prelude::*};

/// Object representing our logging. Should be kept around as our logging
/// writers return guards that should live for the lifetime of the program. Do
/// not do anything with the guards. Just make sure they are not dropped!
#[derive(Default)]
pub struct LoggingGuards {
    _all_layer_guard: Option<WorkerGuard>,
    _ind_layer_guard: Option<WorkerGuard>,
}

/// Initialize our logging with different logging layers:
/// 1) Log messages at `stdout_log_level` or higher from our ind* crates to
/// standard error. Standard out is reserved for command output.
/// 2) (OPTIONAL) Log all messages (TRACE or higher) from our ind* crates to
/// the path specified by `ind_logs_file_name`.
/// 3) (OPTIONAL) Log all messages (TRACE or higher) from any crate to the path
/// specified by `all_logs_file_name`.
///
/// Returns an object which should be kept around for the lifetime of the
/// program.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuards> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(our_targets_filter(config.stdout_log_level));

    let logging_guards = match &config.log_files {
        Some(file_config) => {
            let (all_logs_dir, all_logs_file) = get_paths(&file_config.all_logs_file_name)?;
            let (ind_logs_dir, ind_logs_file) = get_paths(&file_config.ind_logs_file_name)?;

            // This layer logs all events into a file.
            let all_appender = tracing_appender::rolling::hourly(all_logs_dir, all_logs_file);
            let (non_blocking, _all_layer_guard) = tracing_appender::non_blocking(all_appender);
            let all_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking);

            // Log all events generated by our crates into a file.
            let ind_appender = tracing_appender::rolling::hourly(ind_logs_dir, ind_logs_file);
            let (non_blocking, _ind_layer_guard) = tracing_appender::non_blocking(ind_appender);
            let ind_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(our_targets_filter(Level::TRACE));

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(ind_layer)
                .with(all_layer)
                .init();

            LoggingGuards {
                _all_layer_guard: Some(_all_layer_guard),
                _ind_layer_guard: Some(_ind_layer_guard),
            }
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            LoggingGuards::default()
        }
    };

    Ok(logging_guards)
}

/// Return the path directory and the file name. Needed for passing to
/// tracing_appender.
fn get_paths(path: &Path) -> anyhow::Result<(&Path, &OsStr)> {
    let invalid = || anyhow!("Invalid log file path: {}", path.display());
    let dir = path.parent().ok_or_else(invalid)?;
    let file_name = path.file_name().ok_or_else(invalid)?;
    Ok((dir, file_name))
}

/// Create filters for logging events originating from our ind* crates.
fn our_targets_filter(level: Level) -> Targets {
    Targets::new()
        .with_target("ind_cli", level)
        .with_target("ind_client", level)
        .with_target("ind_protocol", level)
}
