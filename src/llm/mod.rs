//! LLM 层：生成后端抽象与实现（OpenAI 兼容文本 / 图片 / Mock）

pub mod images;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use images::OpenAiImageClient;
pub use mock::{MockImageClient, MockLlm};
pub use openai::OpenAiChatClient;
pub use traits::{ImageClient, LlmClient, LlmError};

/// 根据配置与环境变量选择文本后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    if provider == "deepseek" && deepseek_key.is_some() {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Arc::new(OpenAiChatClient::new(
            Some(
                cfg.llm
                    .base_url
                    .as_deref()
                    .unwrap_or("https://api.deepseek.com/v1"),
            ),
            &cfg.llm.model,
            deepseek_key.as_deref(),
            cfg.llm.timeouts.request,
            cfg.llm.max_retries,
        ))
    } else if openai_key.is_some() {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiChatClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            openai_key.as_deref(),
            cfg.llm.timeouts.request,
            cfg.llm.max_retries,
        ))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Arc::new(MockLlm::default())
    }
}

/// 图片后端：未启用返回 None；无 Key 时退回 Mock，保证离线也能出示意图
pub fn create_image_client_from_config(cfg: &AppConfig) -> Option<Arc<dyn ImageClient>> {
    if !cfg.images.enabled {
        return None;
    }

    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            tracing::info!("Using OpenAI image backend ({})", cfg.images.model);
            Some(Arc::new(OpenAiImageClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.images.model,
                &key,
                cfg.llm.timeouts.request,
            )))
        }
        Err(_) => {
            tracing::warn!("No API key set, using Mock image backend");
            Some(Arc::new(MockImageClient))
        }
    }
}
