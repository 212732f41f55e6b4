//! 日志管理模块
//!
//! 基于 tracing 初始化日志输出：stderr + 可选的日志文件。
//! 日志文件超过大小上限时轮转，过期的轮转文件会被清理。
use chrono::{Duration, Local, Utc};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "poetsync.log";

/// 初始化全局日志
///
/// 重复调用不会覆盖已安装的 subscriber，返回是否由本次调用完成安装
pub fn init_logging(config: &LoggingConfig, log_dir: Option<&Path>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if config.file_logging {
        log_dir
            .and_then(|dir| open_log_file(dir, config))
            .map(|file| {
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
            })
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .is_ok()
}

/// 打开日志文件，必要时先轮转并清理旧文件
fn open_log_file(dir: &Path, config: &LoggingConfig) -> Option<fs::File> {
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("无法创建日志目录 {}: {}", dir.display(), e);
        return None;
    }

    let path = dir.join(LOG_FILE_NAME);
    rotate_log_file_if_needed(&path, config.max_file_size);
    prune_old_logs(&path, config.retention_days);

    OpenOptions::new().create(true).append(true).open(&path).ok()
}

/// 超过大小上限时把当前日志重命名为带时间戳的轮转文件
pub fn rotate_log_file_if_needed(path: &Path, max_file_size: u64) -> Option<PathBuf> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.len() <= max_file_size {
        return None;
    }

    let suffix = Local::now().format("%Y%m%d-%H%M%S");
    let rotated = path.with_file_name(format!(
        "{}.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        suffix
    ));

    fs::rename(path, &rotated).ok()?;
    Some(rotated)
}

/// 删除超过保留天数的轮转文件，返回删除数量
pub fn prune_old_logs(path: &Path, retention_days: u32) -> usize {
    let Some(dir) = path.parent() else {
        return 0;
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let cutoff = Utc::now() - Duration::days(retention_days as i64);
    let prefix = format!(
        "{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut removed = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with(&prefix) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let modified = chrono::DateTime::<Utc>::from(modified);
        if modified < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}
