pub mod dao;
pub mod schema;
pub mod store;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use store::{PoetStore, SqlitePoetStore};

pub type DbConnection = Arc<Mutex<Connection>>;

/// 数据库存储的日期格式
pub const DB_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 数据库错误
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("数据库错误: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("数据库锁已损坏")]
    LockPoisoned,
}

/// 打开本地诗歌库并确保表结构存在
pub fn open_database(path: &Path) -> Result<DbConnection, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    reset_store_permissions(path);
    schema::create_tables(&conn)?;

    tracing::info!("[数据库] 已打开: {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// 重新设置数据库文件权限为属主/属组可读写
///
/// 部分平台会在更新后重置文件权限，每次写入前调用
pub fn reset_store_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660)) {
                tracing::warn!("[数据库] 设置文件权限失败 {}: {}", path.display(), e);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

pub fn format_db_date(date: &NaiveDateTime) -> String {
    date.format(DB_DATE_FORMAT).to_string()
}

/// 解析数据库中的日期，兼容旧版本写入的 ISO 格式
pub fn parse_db_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, DB_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.naive_utc())
        })
}
