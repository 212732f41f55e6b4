//! 诗人分类数据访问对象
//!
//! 一个诗人的全部内容（分类、诗、诗句）按诗人 ID 归组，
//! 安装与卸载都以整组替换的方式进行。

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{format_db_date, parse_db_date};

/// 本地已安装诗人
#[derive(Debug, Clone, PartialEq)]
pub struct PoetRecord {
    pub id: i64,
    pub name: String,
    pub cat_id: Option<i64>,
    pub last_update: Option<NaiveDateTime>,
}

pub struct PoetDao;

impl PoetDao {
    /// 列出所有已安装诗人
    pub fn list(conn: &Connection) -> Result<Vec<PoetRecord>, rusqlite::Error> {
        let mut stmt = conn.prepare("SELECT id, name, cat_id, lastUpdate FROM poet ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            let last_update: Option<String> = row.get(3)?;
            Ok(PoetRecord {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                cat_id: row.get(2)?,
                last_update: last_update.as_deref().and_then(parse_db_date),
            })
        })?;

        rows.collect()
    }

    pub fn contains(conn: &Connection, poet_id: i64) -> Result<bool, rusqlite::Error> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM poet WHERE id = ?1",
            params![poet_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 获取诗人最后更新时间，未安装或未记录时返回 None
    pub fn last_update(
        conn: &Connection,
        poet_id: i64,
    ) -> Result<Option<NaiveDateTime>, rusqlite::Error> {
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT lastUpdate FROM poet WHERE id = ?1",
                params![poet_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value.flatten().as_deref().and_then(parse_db_date))
    }

    pub fn set_last_update(
        conn: &Connection,
        poet_id: i64,
        date: Option<&NaiveDateTime>,
    ) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "UPDATE poet SET lastUpdate = ?1 WHERE id = ?2",
            params![date.map(format_db_date), poet_id],
        )
    }

    pub fn name(conn: &Connection, poet_id: i64) -> Result<Option<String>, rusqlite::Error> {
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT name FROM poet WHERE id = ?1",
                params![poet_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// 删除诗人的全部内容，返回删除的行数
    ///
    /// 删除顺序: 诗句 → 诗 → 分类 → 诗人
    pub fn remove(conn: &Connection, poet_id: i64) -> Result<usize, rusqlite::Error> {
        let mut removed = conn.execute(
            "DELETE FROM verse WHERE poem_id IN (
                SELECT poem.id FROM poem
                JOIN cat ON poem.cat_id = cat.id
                WHERE cat.poet_id = ?1
            )",
            params![poet_id],
        )?;
        removed += conn.execute(
            "DELETE FROM poem WHERE cat_id IN (SELECT id FROM cat WHERE poet_id = ?1)",
            params![poet_id],
        )?;
        removed += conn.execute("DELETE FROM cat WHERE poet_id = ?1", params![poet_id])?;
        removed += conn.execute("DELETE FROM poet WHERE id = ?1", params![poet_id])?;

        Ok(removed)
    }

    /// 压缩数据库文件，回收删除后的空间
    pub fn vacuum(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("VACUUM")
    }

    /// 统计属于某个诗人的全部行数
    pub fn count_rows(conn: &Connection, poet_id: i64) -> Result<usize, rusqlite::Error> {
        let count: i64 = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM poet WHERE id = ?1)
              + (SELECT COUNT(*) FROM cat WHERE poet_id = ?1)
              + (SELECT COUNT(*) FROM poem WHERE cat_id IN (SELECT id FROM cat WHERE poet_id = ?1))
              + (SELECT COUNT(*) FROM verse WHERE poem_id IN (
                    SELECT poem.id FROM poem JOIN cat ON poem.cat_id = cat.id
                    WHERE cat.poet_id = ?1))",
            params![poet_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
