use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Error as SqlxError, Transaction,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// 数据库操作错误类型
#[derive(Error, Debug)]
pub enum DbError {
    #[error("数据库连接错误: {0}")]
    Connection(#[from] SqlxError),
    #[error("数据库迁移错误: {0}")]
    Migration(String),
    #[error("事务操作错误: {0}")]
    Transaction(String),
}

/// 数据库迁移信息
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub version: i64,
    pub sql: &'static str,
}

static MIGRATIONS: &[MigrationInfo] = &[
    MigrationInfo {
        version: 1,
        sql: r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            summary TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'draft'
                CHECK (status IN ('draft', 'published', 'archived')),
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            view_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (post_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author TEXT NOT NULL,
            email TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'spam')),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    },
    MigrationInfo {
        version: 2,
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category_id);
        CREATE INDEX IF NOT EXISTS idx_comments_status ON comments(status, created_at DESC);
        "#,
    },
    MigrationInfo {
        version: 3,
        sql: r#"
        ALTER TABLE posts ADD COLUMN content TEXT NOT NULL DEFAULT '';
        ALTER TABLE comments ADD COLUMN parent_id INTEGER REFERENCES comments(id) ON DELETE CASCADE;
        CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
        "#,
    },
];

/// 获取可执行文件所在目录的数据库路径
fn get_default_db_path() -> String {
    let exe_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    let exe_dir = exe_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."));
    let db_path = exe_dir.join("klog.db");

    format!("sqlite://{}?mode=rwc", db_path.display())
}

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, DbError> {
    let database_url = config
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(get_default_db_path);

    tracing::info!("📂 数据库路径: {}", database_url);

    let options = SqliteConnectOptions::from_str(&database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect_with(options)
        .await?;

    tracing::info!("✅ 数据库连接池创建成功");
    Ok(pool)
}

/// 执行结构化的数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    let mut tx = start_transaction(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at DATETIME DEFAULT CURRENT_TIMESTAMP)"
    )
    .execute(&mut *tx)
    .await?;

    let last_applied: i64 =
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&mut *tx)
            .await?
            .unwrap_or(0);

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > last_applied) {
        tracing::info!("应用数据库迁移版本: {}", migration.version);

        sqlx::query(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("版本 {}: {}", migration.version, e)))?;

        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;

        applied += 1;
    }

    tx.commit().await?;

    tracing::info!("✅ 数据库迁移完成，应用了 {} 个迁移", applied);
    Ok(())
}

/// 开始数据库事务
pub async fn start_transaction(
    pool: &SqlitePool,
) -> Result<Transaction<'_, sqlx::Sqlite>, DbError> {
    pool.begin()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))
}

const SEED_CATEGORIES: &[(&str, &str, &str)] = &[
    ("技术", "tech", "编程、架构与工具"),
    ("生活", "life", "日常记录"),
    ("随笔", "notes", "零散的想法"),
];

const SEED_TAGS: &[(&str, &str)] = &[
    ("Rust", "rust"),
    ("HTMX", "htmx"),
    ("SQLite", "sqlite"),
    ("读书", "reading"),
    ("旅行", "travel"),
];

const SEED_POST_COUNT: i64 = 47;
const SEED_COMMENT_COUNT: i64 = 64;

/// 插入示例数据
///
/// 表中已有文章时跳过，文章数量足够多以便演示多页分页
pub async fn seed_data(pool: &SqlitePool) -> Result<(), DbError> {
    let mut tx = start_transaction(pool).await?;

    let post_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(&mut *tx)
        .await?;

    if post_count > 0 {
        tx.commit().await?;
        return Ok(());
    }

    for (name, slug, description) in SEED_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (name, slug, description) VALUES (?, ?, ?)")
            .bind(*name)
            .bind(*slug)
            .bind(*description)
            .execute(&mut *tx)
            .await?;
    }

    for (name, slug) in SEED_TAGS {
        sqlx::query("INSERT OR IGNORE INTO tags (name, slug) VALUES (?, ?)")
            .bind(*name)
            .bind(*slug)
            .execute(&mut *tx)
            .await?;
    }

    let category_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM categories ORDER BY id")
        .fetch_all(&mut *tx)
        .await?;
    let tag_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tags ORDER BY id")
        .fetch_all(&mut *tx)
        .await?;

    let now = Utc::now();
    let statuses = ["published", "published", "draft", "archived"];

    for i in 1..=SEED_POST_COUNT {
        let created_at = (now - ChronoDuration::hours(i * 20))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        // 每隔几篇留一篇未分类的文章
        let category_id = (i % 5 != 0)
            .then(|| category_ids.get(i as usize % category_ids.len().max(1)).copied())
            .flatten();

        let post_id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (title, slug, summary, content, status, category_id, view_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(format!("示例文章 #{}", i))
        .bind(format!("sample-post-{}", i))
        .bind(format!("这是第 {} 篇示例文章的摘要", i))
        .bind(format!("# 示例文章 #{}\n\n正文内容。", i))
        .bind(statuses[i as usize % statuses.len()])
        .bind(category_id)
        .bind(i * 37 % 500)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        for tag_id in tag_ids.iter().filter(|id| (post_id + **id) % 3 == 0) {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(*tag_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tracing::info!("✅ 插入文章示例数据");

    let comment_statuses = ["pending", "approved", "approved", "spam"];
    for i in 1..=SEED_COMMENT_COUNT {
        let created_at = (now - ChronoDuration::minutes(i * 95))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        sqlx::query(
            "INSERT INTO comments (post_id, author, email, content, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind((i % SEED_POST_COUNT) + 1)
        .bind(format!("读者{}", i))
        .bind(format!("reader{}@example.com", i))
        .bind(format!("第 {} 条评论：写得不错！", i))
        .bind(comment_statuses[i as usize % comment_statuses.len()])
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
    }

    tracing::info!("✅ 插入评论示例数据");

    tx.commit().await?;
    Ok(())
}

/// 运行迁移并写入示例数据
pub async fn init_db(pool: &SqlitePool) -> Result<(), DbError> {
    run_migrations(pool).await?;
    seed_data(pool).await
}

/// 测试用的内存数据库，只保留一个连接以免数据库被回收
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("内存数据库地址")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("无法创建内存数据库");

    init_db(&pool).await.expect("无法初始化内存数据库");
    pool
}
