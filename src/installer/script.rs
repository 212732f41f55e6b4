//! 诗人脚本安装器
//!
//! 内容包是一个压缩包，其中 `script.sql` 为按 `;\n` 分隔的 SQL 语句序列。
//! 安装流程: 解压 → 清理旧数据 → 逐条执行 → 更新 lastUpdate
//!
//! 单条语句失败只记录日志并继续执行后续语句，
//! 只有解压失败或缺少脚本文件才视为安装失败。

use chrono::NaiveDateTime;
use rusqlite::{Batch, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::extractor::{ArchiveExtractor, Extractor};
use super::types::{InstallError, ScriptReport};
use crate::database::dao::PoetDao;
use crate::database::{reset_store_permissions, schema};

/// 内容包中脚本文件的相对路径
pub const SCRIPT_FILE_NAME: &str = "script.sql";

/// 语句分隔符
pub const STATEMENT_SEPARATOR: &str = ";\n";

/// 按分隔符切分脚本
///
/// 最后一个分隔符之后的内容不会被执行，空白片段会被跳过
pub fn split_statements(script: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut rest = script;
    while let Some(pos) = rest.find(STATEMENT_SEPARATOR) {
        let statement = &rest[..pos];
        if !statement.trim().is_empty() {
            statements.push(statement);
        }
        rest = &rest[pos + STATEMENT_SEPARATOR.len()..];
    }
    statements
}

/// 只执行片段中的第一条语句，片段中没有语句时返回 false
fn execute_first(conn: &Connection, fragment: &str) -> rusqlite::Result<bool> {
    let mut batch = Batch::new(conn, fragment);
    match batch.next()? {
        Some(mut stmt) => {
            stmt.raw_query().next()?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// 临时解压目录，离开作用域时删除
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(parent: &Path) -> Result<Self, InstallError> {
        let path = parent.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.0) {
            tracing::warn!("[安装器] 清理临时目录失败 {}: {}", self.0.display(), e);
        }
    }
}

/// 脚本安装器
///
/// 持有本地诗歌库的独占连接，首次使用时打开，之后复用
pub struct ScriptInstaller {
    db_path: PathBuf,
    temp_dir: PathBuf,
    extractor: Arc<dyn Extractor>,
    conn: Option<Connection>,
}

impl ScriptInstaller {
    pub fn new(db_path: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            db_path,
            temp_dir,
            extractor: Arc::new(ArchiveExtractor::new()),
            conn: None,
        }
    }

    /// 替换解压器
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 从内容包安装
    ///
    /// `remove_source` 为 true 时无论成功与否都会删除原始文件
    pub fn install_file(
        &mut self,
        path: &Path,
        poet_id: i64,
        date: Option<NaiveDateTime>,
        remove_source: bool,
    ) -> Result<ScriptReport, InstallError> {
        let scratch = ScratchDir::create(&self.temp_dir)?;

        let extracted = self.extractor.extract(path, scratch.path());
        if remove_source {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("[安装器] 删除下载文件失败 {}: {}", path.display(), e);
            }
        }
        extracted?;

        let script_path = scratch.path().join(SCRIPT_FILE_NAME);
        let script = match fs::read_to_string(&script_path) {
            Ok(script) => script,
            Err(e) => {
                tracing::error!(
                    "[安装器] 读取脚本失败 {}: {}",
                    script_path.display(),
                    e
                );
                return Err(InstallError::ScriptMissing(path.display().to_string()));
            }
        };

        self.install(&script, poet_id, date)
    }

    /// 执行安装脚本，整组替换诗人数据
    ///
    /// 旧数据先单独清理；脚本语句在一个事务中执行，
    /// 脚本自带的 `COMMIT` / `ROLLBACK` 会提前结束该事务，之后的语句逐条自动提交
    pub fn install(
        &mut self,
        script: &str,
        poet_id: i64,
        date: Option<NaiveDateTime>,
    ) -> Result<ScriptReport, InstallError> {
        let script = script.replace("\r\n", "\n");
        let conn = self.connection()?;

        let mut report = ScriptReport::default();
        match PoetDao::remove(conn, poet_id) {
            Ok(rows) => report.purged_rows = rows,
            Err(e) => tracing::warn!("[安装器] 清理诗人 {} 旧数据失败: {}", poet_id, e),
        }

        let tx = conn.unchecked_transaction()?;
        for statement in split_statements(&script) {
            match execute_first(&tx, statement) {
                Ok(true) => report.executed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("[安装器] 语句执行失败（继续执行）: {}", e);
                }
            }
        }

        if let Err(e) = PoetDao::set_last_update(&tx, poet_id, date.as_ref()) {
            tracing::warn!("[安装器] 更新诗人 {} lastUpdate 失败: {}", poet_id, e);
        }

        if tx.is_autocommit() {
            tracing::debug!("[安装器] 脚本已自行结束事务");
        } else {
            tx.commit()?;
        }

        tracing::info!(
            "[安装器] 诗人 {} 安装完成: 成功 {} 条, 失败 {} 条",
            poet_id,
            report.executed,
            report.failed
        );
        Ok(report)
    }

    /// 删除诗人的全部数据并压缩数据库，返回删除的行数
    pub fn remove(&mut self, poet_id: i64) -> Result<usize, InstallError> {
        let conn = self.connection()?;
        let removed = PoetDao::remove(conn, poet_id)?;
        PoetDao::vacuum(conn)?;

        tracing::info!("[安装器] 诗人 {} 已删除 ({} 行)", poet_id, removed);
        Ok(removed)
    }

    /// 获取连接，每次都会先重置数据库文件权限
    fn connection(&mut self) -> Result<&Connection, InstallError> {
        reset_store_permissions(&self.db_path);

        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                if let Some(parent) = self.db_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(&self.db_path)?;
                schema::create_tables(&conn)?;
                reset_store_permissions(&self.db_path);
                tracing::debug!("[安装器] 已打开数据库: {}", self.db_path.display());
                conn
            }
        };

        Ok(&*self.conn.insert(conn))
    }
}
