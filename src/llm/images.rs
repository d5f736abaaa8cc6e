//! 图片生成客户端（OpenAI 兼容 images/generations 端点）
//!
//! 直接走 reqwest，请求 b64_json 响应并解码为原始字节；字节的格式与大小校验在 cache::validate 中做。

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::llm::{ImageClient, LlmError};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

/// OpenAI 兼容图片客户端
pub struct OpenAiImageClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiImageClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ImageClient for OpenAiImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, LlmError> {
        let url = format!("{}/images/generations", self.base_url);
        let body = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            response_format: "b64_json",
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(0)
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!(
                "image endpoint returned {}: {}",
                status, text
            )));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let b64 = parsed
            .data
            .first()
            .and_then(|d| d.b64_json.as_deref())
            .ok_or(LlmError::Empty)?;

        BASE64
            .decode(b64)
            .map_err(|e| LlmError::Request(format!("invalid base64 in image response: {}", e)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
