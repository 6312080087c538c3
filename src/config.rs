//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__POLLER__INTERVAL_MS=500`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::assistant::http::{DEFAULT_BASE_URL, DEFAULT_BETA_HEADER, DEFAULT_REQUEST_TIMEOUT_SECS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub assistant: AssistantSection,
    pub poller: PollerSection,
}

/// [assistant] 段：远端端点、凭证与助手 ID
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantSection {
    pub base_url: String,
    /// 未设置时回退到环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    /// beta 标记头的值；空字符串表示不发送
    pub beta_header: String,
    pub request_timeout_secs: u64,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            assistant_id: None,
            beta_header: DEFAULT_BETA_HEADER.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// [poller] 段：轮询间隔与次数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    pub interval_ms: u64,
    /// 0 表示不限
    pub max_polls: u32,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_polls: 0,
        }
    }
}

impl AppConfig {
    /// 配置中的 API Key，缺省时读 OPENAI_API_KEY；空串视为未设置
    pub fn api_key(&self) -> Option<String> {
        self.assistant
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms.max(1))
    }

    pub fn max_polls(&self) -> Option<u32> {
        (self.poller.max_polls > 0).then_some(self.poller.max_polls)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.request_timeout_secs)
    }
}

/// 加载 [assistant] / [poller] 配置，缺省段落取默认值
///
/// 来源依次叠加，后者覆盖前者：
/// 1. 首个存在的 config/default.toml、../config/default.toml、default.toml
/// 2. 调用方给出的配置文件（不存在时跳过）
/// 3. 环境变量，如 `HIVE__ASSISTANT__ASSISTANT_ID`、`HIVE__POLLER__MAX_POLLS`
///
/// API Key 不必写进文件：`AppConfig::api_key` 会回退到 OPENAI_API_KEY。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let bundled = ["config/default", "../config/default", "default"]
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{name}.toml")).exists());
    if let Some(name) = bundled {
        tracing::debug!("Loading config from {}.toml", name);
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        tracing::debug!("Loading config overrides from {}", path.display());
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
