//! 提示词模板
//!
//! 所有提示词为英文；每个阶段一个构建函数，上下文由 recent_context 统一拼装。
//! 评估提示要求 JSON 输出且必须核对解题方法而不只是最终数值。

use crate::store::types::MessageRecord;

/// 拼装最近 window 条消息 + 当前输入，作为提示词的对话上下文段
pub fn recent_context(transcript: &[MessageRecord], window: usize, current_input: &str) -> String {
    let start = transcript.len().saturating_sub(window);
    let mut out = String::new();
    for msg in &transcript[start..] {
        out.push_str(msg.role.as_str());
        out.push_str(": ");
        out.push_str(&msg.content);
        out.push('\n');
    }
    if !current_input.is_empty() {
        out.push_str("student: ");
        out.push_str(current_input);
        out.push('\n');
    }
    out
}

/// 子主题首次讲解（进入会话时缓存生成）
pub fn exposition_prompt(subtopic_name: &str) -> String {
    format!(
        "You are a friendly GCSE maths tutor. Give a clear, encouraging explanation of \
         the subtopic \"{subtopic_name}\" for a student seeing it for the first time. \
         Use a worked example. Keep it under 250 words and end by inviting questions \
         or offering a practice question."
    )
}

/// 讲解阶段的自由问答
pub fn followup_prompt(subtopic_name: &str, context: &str) -> String {
    format!(
        "You are a friendly GCSE maths tutor teaching \"{subtopic_name}\". \
         Continue the conversation below. Answer the student's latest message directly \
         and accurately. Stay on topic. Do not set a practice question unless asked.\n\n\
         Conversation:\n{context}"
    )
}

/// 出一道练习题
pub fn question_prompt(subtopic_name: &str, context: &str) -> String {
    format!(
        "You are a GCSE maths tutor teaching \"{subtopic_name}\". \
         Write ONE practice question on this subtopic, suitable for the student's level \
         shown in the conversation. Output only the question text, no answer, no hints.\n\n\
         Conversation:\n{context}"
    )
}

/// 判定学生答案；要求核对方法而不只是结果
pub fn evaluation_prompt(subtopic_name: &str, question: &str, answer: &str) -> String {
    format!(
        "You are a GCSE maths tutor marking a student's answer on \"{subtopic_name}\".\n\
         Question: {question}\n\
         Student answer: {answer}\n\n\
         Work the question yourself first, then compare the student's method and result. \
         A correct final number with wrong working is \"partial\". Respond with ONLY a JSON \
         object: {{\"verdict\": \"correct\" | \"partial\" | \"incorrect\", \
         \"feedback\": \"one or two sentences for the student\"}}"
    )
}

/// 静默错因诊断（输出不展示给学生）
pub fn diagnosis_prompt(subtopic_name: &str, question: &str, answer: &str, feedback: &str) -> String {
    format!(
        "A GCSE maths student answered incorrectly on \"{subtopic_name}\".\n\
         Question: {question}\n\
         Student answer: {answer}\n\
         Marker feedback: {feedback}\n\n\
         In one or two sentences, name the specific misconception or error the student \
         most likely made. This is an internal note, not shown to the student."
    )
}

/// 苏格拉底引导：只提问不给答案
pub fn socratic_prompt(
    subtopic_name: &str,
    question: &str,
    diagnosis: &str,
    context: &str,
) -> String {
    format!(
        "You are a GCSE maths tutor using the Socratic method on \"{subtopic_name}\".\n\
         The student is stuck on: {question}\n\
         Likely misconception: {diagnosis}\n\n\
         Ask exactly ONE short guiding question that nudges the student toward spotting \
         their own error. Never state the answer or any step of the solution.\n\n\
         Conversation:\n{context}"
    )
}

/// 提示次数用尽后的完整解答
pub fn solution_prompt(subtopic_name: &str, question: &str) -> String {
    format!(
        "You are a GCSE maths tutor teaching \"{subtopic_name}\". The student could not \
         solve this question after several hints:\n{question}\n\n\
         Give a full worked solution, step by step, in an encouraging tone. End by \
         suggesting the student re-reads the explanation before trying another question."
    )
}

/// 判断题目是否需要计算器
pub fn calculator_prompt(question: &str) -> String {
    format!(
        "Does solving this GCSE maths question require arithmetic a student would \
         reasonably use a calculator for?\n{question}\n\n\
         Answer with exactly one word: NUMERICAL or NON_NUMERICAL."
    )
}

/// 白板示意图
pub fn diagram_prompt(subtopic_name: &str) -> String {
    format!(
        "A clean whiteboard-style diagram illustrating the GCSE maths subtopic \
         \"{subtopic_name}\". Simple line art, clear labels, white background, \
         no people, no photographic elements."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Role;

    fn msg(role: Role, content: &str) -> MessageRecord {
        MessageRecord {
            role,
            content: content.to_string(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn context_window_keeps_only_recent_messages() {
        let transcript = vec![
            msg(Role::Tutor, "first"),
            msg(Role::Student, "second"),
            msg(Role::Tutor, "third"),
        ];
        let ctx = recent_context(&transcript, 2, "latest");
        assert!(!ctx.contains("first"));
        assert!(ctx.contains("second"));
        assert!(ctx.contains("third"));
        assert!(ctx.ends_with("student: latest\n"));
    }

    #[test]
    fn evaluation_prompt_demands_json_and_method_check() {
        let p = evaluation_prompt("Fractions", "What is 1/2 + 1/4?", "3/4");
        assert!(p.contains("\"verdict\""));
        assert!(p.contains("method"));
    }
}
