//! 会话 / 消息 / 检查点存储
//!
//! 终态（completed / abandoned）记录不可变：所有写操作都带 `status = 'active'` 条件，
//! 对终态会话的写入命中 0 行并返回 SessionNotActive。放弃会话只改状态，从不删行。

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::TutorError;
use crate::store::types::{MessageRecord, Role, SessionRecord, SessionStatus};
use crate::tutor::state::Checkpoint;

/// 会话存储
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 初始化数据库表
    pub async fn init_tables(&self) -> Result<(), TutorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subtopic_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'completed', 'abandoned')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                questions_attempted INTEGER NOT NULL DEFAULT 0,
                questions_correct INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id INTEGER PRIMARY KEY,
                state_data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 新建活跃会话，返回会话 id
    pub async fn create_session(&self, subtopic_id: i64) -> Result<i64, TutorError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO sessions (subtopic_id, status, created_at, updated_at)
             VALUES (?, 'active', ?, ?)",
        )
        .bind(subtopic_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<SessionRecord>, TutorError> {
        let row = sqlx::query(
            "SELECT id, subtopic_id, status, created_at, updated_at,
                    questions_attempted, questions_correct
             FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_session(&r)).transpose()
    }

    /// 最近更新的活跃会话（恢复入口）
    pub async fn load_active_session(&self) -> Result<Option<SessionRecord>, TutorError> {
        let row = sqlx::query(
            "SELECT id, subtopic_id, status, created_at, updated_at,
                    questions_attempted, questions_correct
             FROM sessions WHERE status = 'active'
             ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_session(&r)).transpose()
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, TutorError> {
        let id: i64 = row.get("id");
        let status_str: String = row.get("status");
        let status = SessionStatus::parse(&status_str)
            .ok_or_else(|| TutorError::StateConsistency(id))?;
        Ok(SessionRecord {
            id,
            subtopic_id: row.get("subtopic_id"),
            status,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            questions_attempted: row.get("questions_attempted"),
            questions_correct: row.get("questions_correct"),
        })
    }

    /// 更新答题计数；终态会话返回 SessionNotActive
    pub async fn update_counters(
        &self,
        session_id: i64,
        attempted: i64,
        correct: i64,
    ) -> Result<(), TutorError> {
        let result = sqlx::query(
            "UPDATE sessions
             SET questions_attempted = ?, questions_correct = ?, updated_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(attempted)
        .bind(correct)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::SessionNotActive(session_id));
        }
        Ok(())
    }

    /// 活跃会话转入终态；已是终态时返回 SessionNotActive
    pub async fn set_status(
        &self,
        session_id: i64,
        status: SessionStatus,
    ) -> Result<(), TutorError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = ?, updated_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::SessionNotActive(session_id));
        }
        Ok(())
    }

    pub async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), TutorError> {
        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 会话全部消息，按插入顺序
    pub async fn messages(&self, session_id: i64) -> Result<Vec<MessageRecord>, TutorError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM messages
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let role_str: String = row.get("role");
            let role = Role::parse(&role_str)
                .ok_or_else(|| TutorError::StateConsistency(session_id))?;
            out.push(MessageRecord {
                role,
                content: row.get("content"),
                timestamp: row.get("created_at"),
            });
        }
        Ok(out)
    }

    /// 检查点整体序列化为 JSON 覆盖写入
    pub async fn save_checkpoint(
        &self,
        session_id: i64,
        checkpoint: &Checkpoint,
    ) -> Result<(), TutorError> {
        let state_data = serde_json::to_string(checkpoint)
            .map_err(|_| TutorError::StateConsistency(session_id))?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (session_id, state_data, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(&state_data)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 缺失返回 Ok(None)；JSON 损坏返回 StateConsistency
    pub async fn load_checkpoint(
        &self,
        session_id: i64,
    ) -> Result<Option<Checkpoint>, TutorError> {
        let row = sqlx::query("SELECT state_data FROM checkpoints WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(r) => {
                let state_data: String = r.get("state_data");
                let checkpoint = serde_json::from_str(&state_data)
                    .map_err(|_| TutorError::StateConsistency(session_id))?;
                Ok(Some(checkpoint))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::state::{Checkpoint, ControlState};

    async fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::connect(&dir.path().join("test.db"))
            .await
            .unwrap();
        let store = SessionStore::new(pool);
        store.init_tables().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn checkpoint_roundtrip_preserves_state() {
        let (store, _dir) = test_store().await;
        let session_id = store.create_session(12).await.unwrap();

        let mut cp = Checkpoint::new(12, "Expanding brackets");
        cp.control_state = ControlState::Socratic;
        cp.questions_attempted = 2;
        cp.questions_correct = 1;
        cp.hints_given = 1;
        cp.last_question = Some("Expand 3(y - 4)".to_string());

        store.save_checkpoint(session_id, &cp).await.unwrap();
        let loaded = store.load_checkpoint(session_id).await.unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[tokio::test]
    async fn active_session_is_most_recent() {
        let (store, _dir) = test_store().await;
        let first = store.create_session(1).await.unwrap();
        let second = store.create_session(2).await.unwrap();

        // 更新第一条使其 updated_at 更新
        store.update_counters(first, 1, 0).await.unwrap();

        let active = store.load_active_session().await.unwrap().unwrap();
        assert_eq!(active.id, first);

        store
            .set_status(first, SessionStatus::Abandoned)
            .await
            .unwrap();
        let active = store.load_active_session().await.unwrap().unwrap();
        assert_eq!(active.id, second);
    }

    #[tokio::test]
    async fn terminal_sessions_reject_writes() {
        let (store, _dir) = test_store().await;
        let session_id = store.create_session(3).await.unwrap();
        store
            .set_status(session_id, SessionStatus::Completed)
            .await
            .unwrap();

        let err = store.update_counters(session_id, 5, 5).await.unwrap_err();
        assert!(matches!(err, TutorError::SessionNotActive(_)));
        let err = store
            .set_status(session_id, SessionStatus::Abandoned)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::SessionNotActive(_)));

        // 终态记录本身仍可读
        let record = store.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn abandoned_session_keeps_messages() {
        let (store, _dir) = test_store().await;
        let session_id = store.create_session(4).await.unwrap();
        store
            .append_message(session_id, Role::Student, "hello")
            .await
            .unwrap();
        store
            .append_message(session_id, Role::Tutor, "welcome")
            .await
            .unwrap();

        store
            .set_status(session_id, SessionStatus::Abandoned)
            .await
            .unwrap();

        let messages = store.messages(session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Student);
        assert_eq!(messages[1].content, "welcome");
    }

    #[tokio::test]
    async fn corrupt_checkpoint_surfaces_state_error() {
        let (store, _dir) = test_store().await;
        let session_id = store.create_session(5).await.unwrap();

        sqlx::query(
            "INSERT INTO checkpoints (session_id, state_data, updated_at) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind("{not valid json")
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.load_checkpoint(session_id).await.unwrap_err();
        assert!(matches!(err, TutorError::StateConsistency(_)));
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let (store, _dir) = test_store().await;
        let session_id = store.create_session(6).await.unwrap();
        assert!(store.load_checkpoint(session_id).await.unwrap().is_none());
    }
}
