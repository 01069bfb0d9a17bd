pub mod models;
pub use models::*;

use crate::error::Result;
pub use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use std::time::Duration;

/// 打开（必要时创建）数据库文件并执行迁移
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // SQLite 连接字符串格式: sqlite:path，Windows 路径需要转换反斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| crate::error::SyncError::Usage(format!("无效的数据库路径: {:?}", db_path)))?
        .replace('\\', "/");

    let pool = SqlitePoolOptions::new()
        .max_connections(5) // SQLite 单文件，不需要太多连接
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// 内存数据库（测试用），单连接保证所有查询看到同一份数据
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
