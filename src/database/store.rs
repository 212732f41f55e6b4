//! 本地诗歌库访问接口
//!
//! 目录模型只通过 `PoetStore` 读取本地安装状态，
//! 写入由脚本安装器独占的连接完成。

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::dao::{PoetDao, PoetRecord};
use super::{DatabaseError, DbConnection};

/// 本地诗歌库读取接口
pub trait PoetStore: Send + Sync {
    /// 诗人是否已安装
    fn contains_poet(&self, poet_id: i64) -> bool;

    /// 诗人最后一次安装/更新的时间
    fn poet_last_update(&self, poet_id: i64) -> Option<NaiveDateTime>;

    /// 所有已安装诗人 ID
    fn installed_poets(&self) -> Vec<i64>;

    fn poet_name(&self, poet_id: i64) -> Option<String>;

    /// 重新加载缓存（安装或卸载完成后调用）
    fn refresh(&self);
}

/// 基于 SQLite 的实现，读取结果缓存在内存中
pub struct SqlitePoetStore {
    db: DbConnection,
    cache: RwLock<BTreeMap<i64, PoetRecord>>,
}

impl SqlitePoetStore {
    pub fn new(db: DbConnection) -> Result<Self, DatabaseError> {
        let store = Self {
            db,
            cache: RwLock::new(BTreeMap::new()),
        };
        store.reload()?;
        Ok(store)
    }

    fn reload(&self) -> Result<usize, DatabaseError> {
        let poets = {
            let conn = self.db.lock().map_err(|_| DatabaseError::LockPoisoned)?;
            PoetDao::list(&conn)?
        };
        let count = poets.len();
        *self.cache.write() = poets.into_iter().map(|p| (p.id, p)).collect();
        Ok(count)
    }

    pub fn connection(&self) -> &DbConnection {
        &self.db
    }
}

impl PoetStore for SqlitePoetStore {
    fn contains_poet(&self, poet_id: i64) -> bool {
        self.cache.read().contains_key(&poet_id)
    }

    fn poet_last_update(&self, poet_id: i64) -> Option<NaiveDateTime> {
        self.cache
            .read()
            .get(&poet_id)
            .and_then(|p| p.last_update)
    }

    fn installed_poets(&self) -> Vec<i64> {
        self.cache.read().keys().copied().collect()
    }

    fn poet_name(&self, poet_id: i64) -> Option<String> {
        self.cache.read().get(&poet_id).map(|p| p.name.clone())
    }

    fn refresh(&self) {
        match self.reload() {
            Ok(count) => tracing::debug!("[数据库] 已刷新缓存，共 {} 位诗人", count),
            Err(e) => tracing::warn!("[数据库] 刷新缓存失败，保留旧数据: {}", e),
        }
    }
}
