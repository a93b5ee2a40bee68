//! Diagnostics for the portal client.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Logging**: console plus daily rolling file via `tracing-appender`
//! - **Log rotation helpers**: pruning old rolling files

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "portal";

const DEFAULT_FILTER: &str = "info,agency_portal_lib=debug";

/// Returns version, build timestamp, git SHA, and platform info.
pub fn about() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Default log directory under the user's data dir.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("agency-portal").join("logs")
}

/// Initialise structured logging (console + rolling file).
///
/// `RUST_LOG` overrides the default filter. Keep the returned guard alive
/// for as long as logs should be flushed to disk.
pub fn init_logging(log_dir: Option<&Path>) -> Result<WorkerGuard, String> {
    let log_dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(default_log_dir);
    fs::create_dir_all(&log_dir)
        .map_err(|e| format!("create log dir {}: {e}", log_dir.display()))?;
    prune_old_logs(&log_dir);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("install tracing subscriber: {e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        log_dir = %log_dir.display(),
        "Agency portal logging initialised"
    );
    Ok(guard)
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
/// Returns how many files were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    if !log_dir.exists() {
        return 0;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")))
                .unwrap_or(false);
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune log file"),
        }
    }
    removed
}
