//! 辅导编排引擎
//!
//! 纯状态转换：输入检查点 + 历史 + 学生消息，输出新检查点 + 单条回复。
//! 引擎不接触数据库；任何生成失败直接返回错误，调用方拿到的原检查点未被修改，
//! 重试同一轮是安全的。
//!
//! 状态链在一轮内自动推进（评估 → 诊断 → 引导），直到需要学生输入才挂起；
//! 每轮恰好产出一条导师消息。

use std::sync::Arc;

use crate::error::TutorError;
use crate::llm::LlmClient;
use crate::store::types::MessageRecord;
use crate::tutor::intent::ReadinessClassifier;
use crate::tutor::prompts;
use crate::tutor::state::{Checkpoint, ControlState, Evaluation, Verdict};

/// 引擎参数
#[derive(Debug, Clone)]
pub struct TutorOptions {
    /// 完成子主题所需答对题数
    pub completion_threshold: u32,
    /// 单题苏格拉底提示上限，超出后给完整解答
    pub hint_cap: u32,
    /// 拼入提示词的最近消息条数
    pub context_window: usize,
}

impl Default for TutorOptions {
    fn default() -> Self {
        Self {
            completion_threshold: 3,
            hint_cap: 3,
            context_window: 5,
        }
    }
}

/// 一轮的结果：新检查点、给学生的单条回复、是否完成子主题
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub checkpoint: Checkpoint,
    pub reply: String,
    pub completed: bool,
}

/// 状态链的单步结果
enum Step {
    /// 继续推进状态链
    Continue,
    /// 挂起等待学生输入，携带本轮回复
    Suspend(String),
}

/// 辅导编排引擎
pub struct TutorEngine {
    llm: Arc<dyn LlmClient>,
    classifier: ReadinessClassifier,
    opts: TutorOptions,
}

// 状态链长度上限，防止提示词异常导致死循环
const MAX_CHAIN_STEPS: usize = 8;

impl TutorEngine {
    pub fn new(llm: Arc<dyn LlmClient>, classifier: ReadinessClassifier, opts: TutorOptions) -> Self {
        Self {
            llm,
            classifier,
            opts,
        }
    }

    /// 执行一轮：消费学生消息，推进状态链直到挂起
    pub async fn run_turn(
        &self,
        checkpoint: &Checkpoint,
        transcript: &[MessageRecord],
        input: &str,
    ) -> Result<TurnOutcome, TutorError> {
        let mut cp = checkpoint.clone();
        let context = prompts::recent_context(transcript, self.opts.context_window, input);

        // 入口路由：学生消息在当前状态下意味着什么
        match cp.control_state {
            ControlState::Exposition => {
                if self.classifier.is_ready(input) {
                    cp.control_state = ControlState::Questioning;
                } else {
                    let reply = self
                        .llm
                        .complete(&prompts::followup_prompt(&cp.subtopic_name, &context))
                        .await?;
                    return Ok(TurnOutcome {
                        checkpoint: cp,
                        reply,
                        completed: false,
                    });
                }
            }
            ControlState::Questioning | ControlState::Socratic => {
                cp.last_student_answer = Some(input.to_string());
                cp.control_state = ControlState::Evaluation;
            }
            // 中间状态只会因上一轮中途失败而残留，按「学生在作答」处理
            ControlState::Evaluation | ControlState::Diagnosis => {
                cp.last_student_answer = Some(input.to_string());
                cp.control_state = ControlState::Evaluation;
            }
        }

        let mut completed = false;
        let mut pending_feedback: Option<String> = None;

        for _ in 0..MAX_CHAIN_STEPS {
            let step = match cp.control_state {
                ControlState::Questioning => {
                    self.step_questioning(&mut cp, &context, &mut pending_feedback)
                        .await?
                }
                ControlState::Evaluation => {
                    self.step_evaluation(&mut cp, &context, &mut pending_feedback, &mut completed)
                        .await?
                }
                ControlState::Diagnosis => self.step_diagnosis(&mut cp).await?,
                ControlState::Socratic => self.step_socratic(&mut cp, &context).await?,
                // 只能经由挂起回到讲解，不会在链中出现
                ControlState::Exposition => {
                    return Err(TutorError::StateConsistency(cp.subtopic_id));
                }
            };

            if let Step::Suspend(reply) = step {
                return Ok(TurnOutcome {
                    checkpoint: cp,
                    reply,
                    completed,
                });
            }
        }

        Err(TutorError::Generation(
            "state chain exceeded step limit".to_string(),
        ))
    }

    /// 出题并挂起；若上一题刚答对，把反馈并入同一条消息
    async fn step_questioning(
        &self,
        cp: &mut Checkpoint,
        context: &str,
        pending_feedback: &mut Option<String>,
    ) -> Result<Step, TutorError> {
        let question = self
            .llm
            .complete(&prompts::question_prompt(&cp.subtopic_name, context))
            .await?;

        // 计算器判定是辅助功能，失败不阻塞出题
        cp.calculator_visible = match self
            .llm
            .complete(&prompts::calculator_prompt(&question))
            .await
        {
            Ok(answer) => answer.trim().eq_ignore_ascii_case("NUMERICAL"),
            Err(e) => {
                tracing::warn!("calculator classification failed, hiding calculator: {}", e);
                false
            }
        };

        cp.questions_attempted += 1;
        cp.hints_given = 0;
        cp.last_question = Some(question.clone());
        cp.last_diagnosis = None;

        let reply = match pending_feedback.take() {
            Some(feedback) => format!("✓ {}\n\n{}", feedback, question),
            None => question,
        };
        Ok(Step::Suspend(reply))
    }

    async fn step_evaluation(
        &self,
        cp: &mut Checkpoint,
        context: &str,
        pending_feedback: &mut Option<String>,
        completed: &mut bool,
    ) -> Result<Step, TutorError> {
        let question = match cp.last_question.clone() {
            Some(q) => q,
            // 没有待答题目（如中断后恢复）：退回讲解，按自由提问处理
            None => {
                cp.control_state = ControlState::Exposition;
                let reply = self
                    .llm
                    .complete(&prompts::followup_prompt(&cp.subtopic_name, context))
                    .await?;
                return Ok(Step::Suspend(reply));
            }
        };

        let answer = cp.last_student_answer.clone().unwrap_or_default();
        let raw = self
            .llm
            .complete(&prompts::evaluation_prompt(&cp.subtopic_name, &question, &answer))
            .await?;
        let evaluation = parse_verdict(&raw)?;
        cp.last_evaluation = Some(evaluation.clone());

        if evaluation.verdict.is_correct() {
            cp.questions_correct += 1;
            if cp.questions_correct >= self.opts.completion_threshold {
                *completed = true;
                cp.control_state = ControlState::Exposition;
                cp.last_question = None;
                let reply = format!(
                    "✓ {}\n\nExcellent work! You've answered {} questions correctly and \
                     completed \"{}\". Well done!",
                    evaluation.feedback, cp.questions_correct, cp.subtopic_name
                );
                return Ok(Step::Suspend(reply));
            }
            *pending_feedback = Some(evaluation.feedback);
            cp.control_state = ControlState::Questioning;
            return Ok(Step::Continue);
        }

        // 答错：提示用尽则给完整解答并回到讲解，否则进入诊断
        if cp.hints_given >= self.opts.hint_cap {
            let solution = self
                .llm
                .complete(&prompts::solution_prompt(&cp.subtopic_name, &question))
                .await?;
            cp.control_state = ControlState::Exposition;
            cp.last_question = None;
            cp.hints_given = 0;
            return Ok(Step::Suspend(solution));
        }

        cp.control_state = ControlState::Diagnosis;
        Ok(Step::Continue)
    }

    /// 静默诊断：产出内部错因记录，不回复学生
    async fn step_diagnosis(&self, cp: &mut Checkpoint) -> Result<Step, TutorError> {
        let question = cp.last_question.clone().unwrap_or_default();
        let answer = cp.last_student_answer.clone().unwrap_or_default();
        let feedback = cp
            .last_evaluation
            .as_ref()
            .map(|e| e.feedback.clone())
            .unwrap_or_default();

        let diagnosis = self
            .llm
            .complete(&prompts::diagnosis_prompt(
                &cp.subtopic_name,
                &question,
                &answer,
                &feedback,
            ))
            .await?;
        tracing::debug!("diagnosis for subtopic {}: {}", cp.subtopic_id, diagnosis);
        cp.last_diagnosis = Some(diagnosis);
        cp.control_state = ControlState::Socratic;
        Ok(Step::Continue)
    }

    async fn step_socratic(&self, cp: &mut Checkpoint, context: &str) -> Result<Step, TutorError> {
        let question = cp.last_question.clone().unwrap_or_default();
        let diagnosis = cp.last_diagnosis.clone().unwrap_or_default();

        let hint = self
            .llm
            .complete(&prompts::socratic_prompt(
                &cp.subtopic_name,
                &question,
                &diagnosis,
                context,
            ))
            .await?;
        cp.hints_given += 1;
        Ok(Step::Suspend(hint))
    }
}

/// 解析评估输出：容忍 ```json 围栏与前后杂文，只取 JSON 块
pub fn parse_verdict(output: &str) -> Result<Evaluation, TutorError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        &trimmed[start..=end]
    } else {
        return Err(TutorError::Generation(format!(
            "evaluation output has no JSON: {}",
            trimmed
        )));
    };

    let parsed: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| TutorError::Generation(format!("invalid evaluation JSON: {}", e)))?;

    let verdict = match parsed.get("verdict").and_then(|v| v.as_str()) {
        Some("correct") => Verdict::Correct,
        Some("partial") => Verdict::Partial,
        Some("incorrect") => Verdict::Incorrect,
        other => {
            return Err(TutorError::Generation(format!(
                "unknown verdict: {:?}",
                other
            )))
        }
    };
    let feedback = parsed
        .get("feedback")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Evaluation { verdict, feedback })
}
