//! OpenAI Assistants 兼容的 HTTP 客户端
//!
//! 通过 reqwest 调用 `/threads` 系列端点；默认请求头携带 Bearer 凭证、JSON Content-Type 与 beta 标记。
//! 凭证在构造时注入，轮换凭证即重新构造客户端（及新的编排器）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::assistant::{
    AssistantClient, Message, MessageList, NewMessage, Run, StartRunRequest, Thread,
};
use crate::core::classifier::{classify, RawFailure};
use crate::core::AssistantError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// beta 标记头（`OpenAI-Beta`），HeaderName 要求小写
pub const BETA_HEADER_NAME: &str = "openai-beta";
pub const DEFAULT_BETA_HEADER: &str = "assistants=v2";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// HTTP 客户端构造参数
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub base_url: String,
    pub api_key: String,
    pub beta_header: Option<String>,
    pub request_timeout: Duration,
}

impl HttpClientOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            beta_header: Some(DEFAULT_BETA_HEADER.to_string()),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_beta_header(mut self, value: Option<String>) -> Self {
        self.beta_header = value;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

pub struct HttpAssistantClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAssistantClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpAssistantClient {
    /// 非法凭证（含换行等无法放入请求头的字符）或非法 base_url 返回 InvalidRequest
    pub fn new(options: HttpClientOptions) -> Result<Self, AssistantError> {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            tracing::warn!("Invalid assistant base_url {}: {}", base_url, e);
            AssistantError::InvalidRequest
        })?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", options.api_key))
            .map_err(|_| AssistantError::InvalidRequest)?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(beta) = options.beta_header.as_deref().filter(|b| !b.is_empty()) {
            let value = HeaderValue::from_str(beta).map_err(|_| AssistantError::InvalidRequest)?;
            headers.insert(HeaderName::from_static(BETA_HEADER_NAME), value);
        }

        let client = Client::builder()
            .timeout(options.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| classify(RawFailure::from(&e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<String, AssistantError> {
        let mut url = self.base_url.clone();
        for segment in segments {
            if segment.is_empty() || segment.contains('/') {
                return Err(classify(RawFailure::Request {
                    message: format!("invalid path segment {:?}", segment),
                }));
            }
            url.push('/');
            url.push_str(segment);
        }
        Ok(url)
    }

    /// 发送请求并解析 JSON 响应体
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssistantError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            classify(RawFailure::Body {
                message: e.to_string(),
            })
        })
    }

    /// 发送请求，2xx 时返回原始响应体，否则按状态码分类
    async fn send(&self, request: RequestBuilder) -> Result<String, AssistantError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify(RawFailure::from(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.text().await.unwrap_or_default();
            let err = classify(RawFailure::Status {
                status: status.as_u16(),
                retry_after,
                body,
            });
            tracing::warn!("Assistant request failed: HTTP {} ({})", status.as_u16(), err);
            return Err(err);
        }

        response
            .text()
            .await
            .map_err(|e| classify(RawFailure::from(&e)))
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn create_thread(&self) -> Result<Thread, AssistantError> {
        let url = self.url(&["threads"])?;
        self.send_json(self.client.post(url).json(&serde_json::json!({})))
            .await
    }

    async fn post_message(&self, thread_id: &str, message: &NewMessage) -> Result<(), AssistantError> {
        let url = self.url(&["threads", thread_id, "messages"])?;
        self.send(self.client.post(url).json(message)).await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        if assistant_id.is_empty() {
            return Err(classify(RawFailure::Request {
                message: "empty assistant id".to_string(),
            }));
        }
        let url = self.url(&["threads", thread_id, "runs"])?;
        self.send_json(self.client.post(url).json(&StartRunRequest { assistant_id }))
            .await
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let url = self.url(&["threads", thread_id, "runs", run_id])?;
        self.send_json(self.client.get(url)).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, AssistantError> {
        let url = self.url(&["threads", thread_id, "messages"])?;
        let list: MessageList = self.send_json(self.client.get(url)).await?;
        if list.has_more {
            tracing::debug!(
                "Thread {} has more messages after {:?}; only the first page is merged",
                thread_id,
                list.last_id
            );
        }
        Ok(list.data)
    }
}
