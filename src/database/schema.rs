use rusqlite::Connection;

/// 创建诗歌库表结构
///
/// 内容包中的脚本直接写入这些表，列名需与内容包保持一致
pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS poet (
            id INTEGER PRIMARY KEY,
            name TEXT,
            cat_id INTEGER,
            description TEXT,
            lastUpdate TEXT
        );

        CREATE TABLE IF NOT EXISTS cat (
            id INTEGER PRIMARY KEY,
            poet_id INTEGER,
            text TEXT,
            parent_id INTEGER,
            url TEXT
        );

        CREATE TABLE IF NOT EXISTS poem (
            id INTEGER PRIMARY KEY,
            cat_id INTEGER,
            title TEXT,
            url TEXT
        );

        CREATE TABLE IF NOT EXISTS verse (
            poem_id INTEGER,
            vorder INTEGER,
            position INTEGER,
            text TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_cat_poet ON cat(poet_id);
        CREATE INDEX IF NOT EXISTS idx_poem_cat ON poem(cat_id);
        CREATE INDEX IF NOT EXISTS idx_verse_poem ON verse(poem_id);",
    )
}
