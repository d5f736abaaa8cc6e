//! 内容缓存：generate-or-retrieve 门控
//!
//! 同一 (subject_id, kind) 的产物只生成一次；命中直接返回，未命中才调用生成器，
//! 生成结果先过校验再落盘。失效操作见 [`ContentCache`]。

pub mod store;
pub mod validate;

use thiserror::Error;

use crate::llm::LlmError;

pub use store::{CacheStats, ContentCache, GeneratedArtifact};

/// 缓存产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// 子主题讲解文本
    Exposition,
    /// 白板示意图（PNG / JPEG 字节）
    Diagram,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Exposition => "exposition",
            ArtifactKind::Diagram => "diagram",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ArtifactKind::Diagram)
    }
}

/// 缓存产物内容
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
}

impl ArtifactContent {
    pub fn len(&self) -> usize {
        match self {
            ArtifactContent::Text(s) => s.len(),
            ArtifactContent::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactContent::Text(s) => Some(s),
            ArtifactContent::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArtifactContent::Text(s) => s.as_bytes(),
            ArtifactContent::Binary(b) => b,
        }
    }
}

/// 缓存层错误：生成失败、产物校验失败、存储错误
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    /// 产物未通过校验，未落盘
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
