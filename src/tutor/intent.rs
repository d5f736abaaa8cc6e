//! 就绪意图识别
//!
//! 讲解阶段判断学生是否想要开始练习：小写化后做关键词子串匹配，
//! 不走 LLM，零延迟且可按部署配置词表。

/// 默认就绪关键词（非穷尽）
pub fn default_keywords() -> Vec<String> {
    ["ready", "question", "practice", "try", "test", "quiz"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// 就绪分类器
pub struct ReadinessClassifier {
    keywords: Vec<String>,
}

impl ReadinessClassifier {
    pub fn new(keywords: Vec<String>) -> Self {
        let keywords = if keywords.is_empty() {
            default_keywords()
        } else {
            keywords
        };
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// 学生消息是否表达了「想要练习」的意图
    pub fn is_ready(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl Default for ReadinessClassifier {
    fn default() -> Self {
        Self::new(default_keywords())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_phrases_match() {
        let c = ReadinessClassifier::default();
        assert!(c.is_ready("I'm ready for a question"));
        assert!(c.is_ready("Can I PRACTICE now?"));
        assert!(c.is_ready("let me try one"));
        assert!(!c.is_ready("can you explain that again?"));
        assert!(!c.is_ready("what does expanding mean"));
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let c = ReadinessClassifier::new(vec!["go".to_string()]);
        assert!(c.is_ready("let's go"));
        assert!(!c.is_ready("I want to practice"));
    }
}
