//! 持久化层：SQLite 会话 / 消息 / 检查点
//!
//! 单文件数据库，连接池上限 5；缓存表与会话表共用同一个池。

pub mod session;
pub mod types;

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use session::SessionStore;
pub use types::{MessageRecord, Role, SessionRecord, SessionStatus};

/// 打开（必要时创建）SQLite 数据库并返回连接池
pub async fn connect(db_path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
}
