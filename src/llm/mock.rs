//! Mock 客户端（用于测试与无 Key 环境）
//!
//! 两种用法：测试里用 with_responses 预置逐次返回的脚本；无 Key 环境用 Default，
//! 按提示词关键字给出能跑通流程的离线回复。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ImageClient, LlmClient, LlmError};

/// Mock 文本客户端：按脚本出队返回，脚本空时走离线启发式
pub struct MockLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    scripted: bool,
    calls: AtomicUsize,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            scripted: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockLlm {
    /// 预置脚本：第 n 次 complete 返回第 n 条
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            scripted: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// 每次调用都失败的客户端
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(LlmError::Request(
                "mock backend down".to_string(),
            ))])),
            scripted: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// 已发生的 complete 调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 离线启发式：按提示词关键字给出形状正确的回复
    fn heuristic(&self, prompt: &str) -> String {
        if prompt.contains("verdict") {
            r#"{"verdict": "correct", "feedback": "Well reasoned."}"#.to_string()
        } else if prompt.contains("NUMERICAL") {
            "NON_NUMERICAL".to_string()
        } else {
            "Let's keep working through this topic together.".to_string()
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(e)) => {
                // failing() 的脚本只有一条，重复返回
                self.script.lock().unwrap().push_back(Err(e.clone()));
                Err(e)
            }
            Some(Ok(text)) => Ok(text),
            None if self.scripted => Err(LlmError::Request("mock script exhausted".to_string())),
            None => Ok(self.heuristic(prompt)),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

/// Mock 图片客户端：返回一张最小合法 PNG
pub struct MockImageClient;

/// 1x1 PNG，够过结构校验
pub(crate) fn tiny_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    // IHDR: 1x1, 8-bit grayscale
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&[
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x00, 0x00, 0x00, 0x00,
    ]);
    bytes.extend_from_slice(&[0x3A, 0x7E, 0x9B, 0x55]);
    // IDAT（单像素，zlib 存储块）
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x0A]);
    bytes.extend_from_slice(b"IDAT");
    bytes.extend_from_slice(&[0x78, 0x01, 0x01, 0x01, 0x00, 0xFE, 0xFF, 0x00, 0x00, 0x01]);
    bytes.extend_from_slice(&[0x00, 0x01, 0x73, 0x75]);
    // IEND
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    bytes.extend_from_slice(b"IEND");
    bytes.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
    bytes
}

#[async_trait]
impl ImageClient for MockImageClient {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, LlmError> {
        Ok(tiny_png())
    }

    fn model_id(&self) -> &str {
        "mock-image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_come_back_in_order() {
        let llm = MockLlm::with_responses(["first", "second"]);
        assert_eq!(llm.complete("x").await.unwrap(), "first");
        assert_eq!(llm.complete("x").await.unwrap(), "second");
        assert!(llm.complete("x").await.is_err());
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn heuristic_answers_match_prompt_shape() {
        let llm = MockLlm::default();
        let verdict = llm.complete("Return JSON with a verdict field").await.unwrap();
        assert!(verdict.contains("correct"));
        let calc = llm.complete("Answer NUMERICAL or NON_NUMERICAL").await.unwrap();
        assert_eq!(calc, "NON_NUMERICAL");
    }
}
