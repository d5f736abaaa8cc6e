//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BLOOM__*` 覆盖（双下划线表示嵌套，如 `BLOOM__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tutor: TutorSection,
    #[serde(default)]
    pub images: ImagesSection,
}

/// [app] 段：应用名与数据库路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// SQLite 数据库文件路径
    pub db_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            db_path: PathBuf::from("bloom.db"),
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    /// 单次生成的最大尝试次数（指数退避）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [tutor] 段：完成门槛、提示上限、上下文窗口、就绪关键词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TutorSection {
    /// 子主题完成所需的答对题数
    pub completion_threshold: u32,
    /// 苏格拉底提示上限，超出后直接给完整解答
    pub hint_cap: u32,
    /// 拼入提示词的最近消息条数
    pub context_window: usize,
    /// 讲解阶段「想要练习题」的意图关键词（非穷尽，可按部署调整）
    pub readiness_keywords: Vec<String>,
}

impl Default for TutorSection {
    fn default() -> Self {
        Self {
            completion_threshold: 3,
            hint_cap: 3,
            context_window: 5,
            readiness_keywords: crate::tutor::intent::default_keywords(),
        }
    }
}

/// [images] 段：白板示意图生成
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesSection {
    pub enabled: bool,
    pub model: String,
    /// 提示词模板版本，写入缓存条目，便于按版本选择性失效
    pub prompt_version: String,
    /// 缓存图片的大小上限（字节）
    pub max_bytes: usize,
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-image-1".to_string(),
            prompt_version: "v1".to_string(),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BLOOM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BLOOM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BLOOM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
