//! 辅导状态机
//!
//! - **state**: 控制状态与检查点
//! - **intent**: 就绪意图识别（关键词匹配）
//! - **prompts**: 各阶段提示词模板
//! - **engine**: 纯状态转换引擎（不落盘）
//! - **service**: 持久化边界与会话生命周期

pub mod engine;
pub mod intent;
pub mod prompts;
pub mod service;
pub mod state;

pub use engine::{TutorEngine, TutorOptions, TurnOutcome};
pub use intent::ReadinessClassifier;
pub use service::{SessionView, TurnReply, TutorService};
pub use state::{Checkpoint, ControlState, Evaluation, Verdict};
