//! Bloom - AI 辅导系统核心
//!
//! 模块划分：
//! - **cache**: 内容缓存（generate-or-retrieve 门控，按产物类型校验）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 错误分类（生成失败 / 校验失败 / 状态一致性）
//! - **llm**: 生成后端抽象与实现（OpenAI 兼容文本 / 图片 / Mock）
//! - **store**: 会话、消息、检查点持久化（SQLite）
//! - **tutor**: 辅导状态机（意图识别、提示词、编排引擎、会话服务）

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod tutor;

pub use error::TutorError;
