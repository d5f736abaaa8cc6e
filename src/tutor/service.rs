//! 会话服务：持久化边界
//!
//! 引擎本身不落盘；服务负责轮次成功后的原子收尾：写学生消息、写导师消息、
//! 更新计数、必要时置终态、覆盖写检查点。轮次失败时什么都不写，
//! 学生原样重发即可重试。

use std::sync::Arc;

use crate::cache::{ArtifactContent, ArtifactKind, ContentCache, GeneratedArtifact};
use crate::error::TutorError;
use crate::llm::{ImageClient, LlmClient};
use crate::store::types::{MessageRecord, Role, SessionRecord, SessionStatus};
use crate::store::SessionStore;
use crate::tutor::engine::TutorEngine;
use crate::tutor::prompts;
use crate::tutor::state::Checkpoint;

/// 进入 / 恢复会话时返回的视图
#[derive(Debug)]
pub struct SessionView {
    pub session: SessionRecord,
    pub transcript: Vec<MessageRecord>,
    pub calculator_visible: bool,
}

/// 一轮成功后的回复
#[derive(Debug)]
pub struct TurnReply {
    pub message: String,
    pub calculator_visible: bool,
    pub completed: bool,
}

/// 辅导会话服务
pub struct TutorService {
    store: SessionStore,
    cache: Arc<ContentCache>,
    engine: TutorEngine,
    llm: Arc<dyn LlmClient>,
    images: Option<Arc<dyn ImageClient>>,
    prompt_version: String,
}

impl TutorService {
    pub fn new(
        store: SessionStore,
        cache: Arc<ContentCache>,
        engine: TutorEngine,
        llm: Arc<dyn LlmClient>,
        images: Option<Arc<dyn ImageClient>>,
        prompt_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            engine,
            llm,
            images,
            prompt_version: prompt_version.into(),
        }
    }

    /// 开始新会话：建会话、讲解走缓存门控、示意图后台生成
    pub async fn start(
        &self,
        subtopic_id: i64,
        subtopic_name: &str,
    ) -> Result<SessionView, TutorError> {
        let session_id = self.store.create_session(subtopic_id).await?;
        let checkpoint = Checkpoint::new(subtopic_id, subtopic_name);

        let llm = Arc::clone(&self.llm);
        let name = subtopic_name.to_string();
        let version = self.prompt_version.clone();
        let exposition = self
            .cache
            .get_or_generate(subtopic_id, ArtifactKind::Exposition, move || async move {
                let text = llm.complete(&prompts::exposition_prompt(&name)).await?;
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Text(text),
                    generator: llm.model_id().to_string(),
                    version,
                })
            })
            .await?;

        let exposition_text = exposition
            .as_text()
            .unwrap_or_default()
            .to_string();
        self.store
            .append_message(session_id, Role::Tutor, &exposition_text)
            .await?;
        self.store.save_checkpoint(session_id, &checkpoint).await?;

        self.spawn_diagram(subtopic_id, subtopic_name);

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(TutorError::SessionNotFound(session_id))?;
        let transcript = self.store.messages(session_id).await?;
        Ok(SessionView {
            session,
            transcript,
            calculator_visible: checkpoint.calculator_visible,
        })
    }

    /// 示意图预热：后台生成，失败只告警，不影响会话
    fn spawn_diagram(&self, subtopic_id: i64, subtopic_name: &str) {
        let Some(images) = self.images.clone() else {
            return;
        };
        let cache = Arc::clone(&self.cache);
        let prompt = prompts::diagram_prompt(subtopic_name);
        let version = self.prompt_version.clone();

        tokio::spawn(async move {
            let result = cache
                .get_or_generate(subtopic_id, ArtifactKind::Diagram, move || async move {
                    let bytes = images.generate(&prompt).await?;
                    Ok(GeneratedArtifact {
                        content: ArtifactContent::Binary(bytes),
                        generator: images.model_id().to_string(),
                        version,
                    })
                })
                .await;
            if let Err(e) = result {
                tracing::warn!("diagram generation failed for subtopic {}: {}", subtopic_id, e);
            }
        });
    }

    /// 恢复已有会话；检查点缺失或损坏返回 StateConsistency
    pub async fn resume(&self, session_id: i64) -> Result<SessionView, TutorError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(TutorError::SessionNotFound(session_id))?;
        if session.status != SessionStatus::Active {
            return Err(TutorError::SessionNotActive(session_id));
        }

        let checkpoint = self
            .store
            .load_checkpoint(session_id)
            .await?
            .ok_or(TutorError::StateConsistency(session_id))?;
        let transcript = self.store.messages(session_id).await?;

        Ok(SessionView {
            session,
            transcript,
            calculator_visible: checkpoint.calculator_visible,
        })
    }

    /// 最近更新的活跃会话（启动时的恢复入口）
    pub async fn active_session(&self) -> Result<Option<SessionRecord>, TutorError> {
        self.store.load_active_session().await
    }

    /// 放弃会话：只改状态，消息与检查点全部保留
    pub async fn abandon(&self, session_id: i64) -> Result<(), TutorError> {
        self.store
            .set_status(session_id, SessionStatus::Abandoned)
            .await
    }

    /// 取示意图，只查缓存不生成
    pub async fn diagram(&self, subtopic_id: i64) -> Result<Option<Vec<u8>>, TutorError> {
        let content = self
            .cache
            .get(subtopic_id, ArtifactKind::Diagram)
            .await
            .map_err(TutorError::from)?;
        Ok(content.map(|c| c.as_bytes().to_vec()))
    }

    /// 学生发言一轮；失败时不落任何数据，重发同一消息即重试
    pub async fn student_turn(
        &self,
        session_id: i64,
        text: &str,
    ) -> Result<TurnReply, TutorError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(TutorError::SessionNotFound(session_id))?;
        if session.status != SessionStatus::Active {
            return Err(TutorError::SessionNotActive(session_id));
        }

        let checkpoint = self
            .store
            .load_checkpoint(session_id)
            .await?
            .ok_or(TutorError::StateConsistency(session_id))?;
        let transcript = self.store.messages(session_id).await?;

        let outcome = self.engine.run_turn(&checkpoint, &transcript, text).await?;

        // 成功后才落盘；顺序：消息 → 计数 → 终态 → 检查点
        self.store
            .append_message(session_id, Role::Student, text)
            .await?;
        self.store
            .append_message(session_id, Role::Tutor, &outcome.reply)
            .await?;
        self.store
            .update_counters(
                session_id,
                outcome.checkpoint.questions_attempted as i64,
                outcome.checkpoint.questions_correct as i64,
            )
            .await?;
        if outcome.completed {
            self.store
                .set_status(session_id, SessionStatus::Completed)
                .await?;
        }
        self.store
            .save_checkpoint(session_id, &outcome.checkpoint)
            .await?;

        Ok(TurnReply {
            message: outcome.reply,
            calculator_visible: outcome.checkpoint.calculator_visible,
            completed: outcome.completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::tutor::engine::TutorOptions;
    use crate::tutor::intent::ReadinessClassifier;
    use crate::tutor::state::ControlState;

    async fn service_with(llm: MockLlm) -> (TutorService, sqlx::SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::connect(&dir.path().join("tutor.db"))
            .await
            .unwrap();

        let store = SessionStore::new(pool.clone());
        store.init_tables().await.unwrap();
        let cache = Arc::new(ContentCache::new(pool.clone(), 1024 * 1024));
        cache.init_tables().await.unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        let engine = TutorEngine::new(
            Arc::clone(&llm),
            ReadinessClassifier::default(),
            TutorOptions::default(),
        );
        let service = TutorService::new(store, cache, engine, llm, None, "v1");
        (service, pool, dir)
    }

    #[tokio::test]
    async fn start_serves_exposition_from_cache() {
        let llm = MockLlm::with_responses(["Expanding brackets means multiplying through."]);
        let (service, _pool, _dir) = service_with(llm).await;

        let first = service.start(12, "Expanding brackets").await.unwrap();
        assert_eq!(first.transcript.len(), 1);
        assert_eq!(first.transcript[0].role, Role::Tutor);

        // 第二个会话命中缓存，脚本已耗尽也不报错
        let second = service.start(12, "Expanding brackets").await.unwrap();
        assert_eq!(
            second.transcript[0].content,
            "Expanding brackets means multiplying through."
        );
        assert_ne!(first.session.id, second.session.id);
    }

    #[tokio::test]
    async fn resume_restores_control_state() {
        let llm = MockLlm::with_responses([
            "Here is how fractions work.",
            "What is 1/2 + 1/4?",
            "NON_NUMERICAL",
        ]);
        let (service, pool, _dir) = service_with(llm).await;

        let view = service.start(7, "Fractions").await.unwrap();
        let session_id = view.session.id;
        service
            .student_turn(session_id, "I'm ready for a question")
            .await
            .unwrap();

        // 模拟重启：从同一数据库重建存储
        let store = SessionStore::new(pool.clone());
        let checkpoint = store.load_checkpoint(session_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.control_state, ControlState::Questioning);
        assert_eq!(checkpoint.last_question.as_deref(), Some("What is 1/2 + 1/4?"));

        let resumed = service.resume(session_id).await.unwrap();
        assert_eq!(resumed.transcript.len(), 3);
    }

    #[tokio::test]
    async fn failed_turn_persists_nothing() {
        let llm = MockLlm::with_responses(["Intro text."]);
        let (service, pool, _dir) = service_with(llm).await;

        let view = service.start(3, "Angles").await.unwrap();
        let session_id = view.session.id;

        // 脚本耗尽，下一轮生成必然失败
        let err = service
            .student_turn(session_id, "I'm ready to practice")
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let store = SessionStore::new(pool);
        let messages = store.messages(session_id).await.unwrap();
        assert_eq!(messages.len(), 1); // 只有开场讲解
        let checkpoint = store.load_checkpoint(session_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.control_state, ControlState::Exposition);
        assert_eq!(checkpoint.questions_attempted, 0);
    }

    #[tokio::test]
    async fn abandon_keeps_history_and_blocks_turns() {
        let llm = MockLlm::with_responses(["Intro."]);
        let (service, pool, _dir) = service_with(llm).await;

        let view = service.start(9, "Ratios").await.unwrap();
        let session_id = view.session.id;
        service.abandon(session_id).await.unwrap();

        let err = service.student_turn(session_id, "hello").await.unwrap_err();
        assert!(matches!(err, TutorError::SessionNotActive(_)));

        let store = SessionStore::new(pool);
        assert_eq!(store.messages(session_id).await.unwrap().len(), 1);
        assert!(store.load_checkpoint(session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resume_without_checkpoint_is_state_error() {
        let llm = MockLlm::with_responses(["Intro."]);
        let (service, pool, _dir) = service_with(llm).await;

        let view = service.start(4, "Sequences").await.unwrap();
        let session_id = view.session.id;

        sqlx::query("DELETE FROM checkpoints WHERE session_id = ?")
            .bind(session_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = service.resume(session_id).await.unwrap_err();
        assert!(matches!(err, TutorError::StateConsistency(_)));
    }
}
