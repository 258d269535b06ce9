//! Structured file logging with daily rotation to platform-standard directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

const LOG_PREFIX: &str = "promptsync";
const RETENTION_DAYS: u64 = 7;

/// Handle for swapping the level filter after configuration is loaded.
pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Kept alive for the whole process.
pub struct LoggingContext {
    /// Flushes buffered lines when dropped.
    pub _guard: WorkerGuard,
    pub session_id: String,
    pub log_directory: PathBuf,
    reload_handle: ReloadHandle,
    /// Whether `RUST_LOG` was set; it wins over the configured level.
    env_override: bool,
}

impl LoggingContext {
    /// Apply the configured level unless `RUST_LOG` is set.
    pub fn apply_level(&self, level: &str) {
        if self.env_override {
            debug!(level, "log_level_kept_from_env");
            return;
        }
        let filter = match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(level, error = %e, "invalid_log_level");
                return;
            }
        };
        match self.reload_handle.reload(filter) {
            Ok(()) => debug!(level, "log_level_applied"),
            Err(e) => warn!(error = %e, "log_level_reload_failed"),
        }
    }
}

/// Generates a 6-character random hex session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Initializes the logging system. The returned context must be held for
/// the application lifetime.
pub fn init() -> Result<LoggingContext> {
    let session_id = generate_session_id();
    let log_dir = log_directory()?;

    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().ok();
    let env_override = env_filter.is_some();
    let (filter_layer, reload_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    info!(session_id = %session_id, version = env!("CARGO_PKG_VERSION"), "session_start");

    Ok(LoggingContext {
        _guard: guard,
        session_id,
        log_directory: log_dir,
        reload_handle,
        env_override,
    })
}

/// macOS: `~/Library/Logs/promptsync/`, elsewhere the platform state or
/// data-local directory.
fn log_directory() -> Result<PathBuf> {
    if cfg!(target_os = "macos") {
        return dirs::home_dir()
            .map(|home| home.join("Library").join("Logs").join(LOG_PREFIX))
            .context("Failed to determine home directory");
    }

    let project_dirs = ProjectDirs::from("dev", "promptsync", "promptsync")
        .context("Failed to determine platform directories")?;
    Ok(project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_local_dir())
        .join("logs"))
}

/// Delete `promptsync.*` files in `log_dir` older than the retention period.
/// Problems are logged and never stop startup.
pub fn cleanup_old_logs(log_dir: &Path) -> u32 {
    cleanup_logs_older_than(
        log_dir,
        Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60),
        SystemTime::now(),
    )
}

fn cleanup_logs_older_than(log_dir: &Path, retention: Duration, now: SystemTime) -> u32 {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "log_cleanup_read_dir_failed");
            return 0;
        }
    };

    let mut deleted_count = 0u32;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.starts_with("promptsync.") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file_name, error = %e, "log_cleanup_metadata_failed");
                continue;
            }
        };

        // Files from the future are left alone.
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age > retention {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %file_name, age_days = age.as_secs() / 86400, "old_log_deleted");
                    deleted_count += 1;
                }
                Err(e) => warn!(file = %file_name, error = %e, "old_log_delete_failed"),
            }
        }
    }

    if deleted_count > 0 {
        debug!(count = deleted_count, "log_cleanup_completed");
    }
    deleted_count
}
