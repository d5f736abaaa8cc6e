//! 生成后端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient（文本）或 ImageClient（图片）。
//! 错误不区分具体后端，只区分「请求失败 / 超时 / 空输出」三类，调用方据此决定是否重试。

use async_trait::async_trait;

use thiserror::Error;

/// 生成后端错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 请求失败（网络 / API 错误 / 配额）
    #[error("llm request failed: {0}")]
    Request(String),

    /// 单次请求超时
    #[error("llm request timed out after {0}s")]
    Timeout(u64),

    /// 后端返回了空内容
    #[error("llm returned empty content")]
    Empty,
}

/// 文本生成客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单提示词完成，返回完整文本
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// 后端模型标识，写入缓存条目的 generator 字段
    fn model_id(&self) -> &str;
}

/// 图片生成客户端 trait：返回解码后的原始字节
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, LlmError>;

    fn model_id(&self) -> &str;
}
