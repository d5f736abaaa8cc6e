//! 错误分类与传播策略
//!
//! 生成失败只向调用方返回可重试信号，不转移状态、不落盘；校验失败降级（文本路径继续）；
//! 只有检查点缺失/损坏会向上传播，触发「放弃并重开」路径。

use thiserror::Error;

use crate::cache::CacheError;
use crate::llm::LlmError;

/// 辅导核心的错误类型
#[derive(Error, Debug)]
pub enum TutorError {
    /// 生成后端失败（不可用 / 超时 / 输出不合法）；检查点未被修改，同一轮可安全重试
    #[error("generation failed: {0}")]
    Generation(String),

    /// 缓存产物校验失败（完整性 / 大小 / 格式），内容未落盘
    #[error("artifact validation failed: {0}")]
    Validation(String),

    /// 活跃会话的检查点缺失或损坏；唯一安全恢复路径是放弃并重开
    #[error("checkpoint missing or corrupt for session {0}")]
    StateConsistency(i64),

    #[error("session {0} not found")]
    SessionNotFound(i64),

    /// 会话处于终态（completed / abandoned），不接受进一步操作
    #[error("session {0} is not active")]
    SessionNotActive(i64),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl TutorError {
    /// 原样重试同一轮是否可能恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, TutorError::Generation(_))
    }
}

impl From<LlmError> for TutorError {
    fn from(e: LlmError) -> Self {
        TutorError::Generation(e.to_string())
    }
}

impl From<CacheError> for TutorError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Generation(inner) => TutorError::Generation(inner.to_string()),
            CacheError::Validation(msg) => TutorError::Validation(msg),
            CacheError::Db(inner) => TutorError::Db(inner),
        }
    }
}
