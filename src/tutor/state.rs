//! 辅导状态机的状态与检查点
//!
//! 检查点是会话的全部可变状态，整体序列化为 JSON 存入 checkpoints 表；
//! 引擎只在轮次成功后整体覆盖写入，失败的轮次不留任何痕迹。

use serde::{Deserialize, Serialize};

/// 控制状态：当前辅导对话所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// 讲解：自由问答，等待学生表达练习意愿
    Exposition,
    /// 出题：生成练习题并等待作答
    Questioning,
    /// 评估：判定学生答案
    Evaluation,
    /// 诊断：静默分析错因
    Diagnosis,
    /// 苏格拉底引导：只提问不给答案
    Socratic,
}

/// 评估结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Partial,
    Incorrect,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::Correct)
    }
}

/// 一次评估的结论与反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub feedback: String,
}

/// 会话检查点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub subtopic_id: i64,
    pub subtopic_name: String,
    pub control_state: ControlState,
    pub questions_attempted: u32,
    pub questions_correct: u32,
    /// 当前题目已给出的苏格拉底提示数，出新题时清零
    pub hints_given: u32,
    pub calculator_visible: bool,
    pub last_question: Option<String>,
    pub last_student_answer: Option<String>,
    pub last_evaluation: Option<Evaluation>,
    pub last_diagnosis: Option<String>,
}

impl Checkpoint {
    pub fn new(subtopic_id: i64, subtopic_name: impl Into<String>) -> Self {
        Self {
            subtopic_id,
            subtopic_name: subtopic_name.into(),
            control_state: ControlState::Exposition,
            questions_attempted: 0,
            questions_correct: 0,
            hints_given: 0,
            calculator_visible: false,
            last_question: None,
            last_student_answer: None,
            last_evaluation: None,
            last_diagnosis: None,
        }
    }
}
