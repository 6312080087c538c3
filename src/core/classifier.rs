//! 错误分类：将底层传输 / HTTP 失败映射为封闭的 AssistantError 集合
//!
//! HttpAssistantClient 的每个操作都经由这里出错，UI 看到的提示因此与具体失败的调用无关。
//!
//! 映射规则：
//! - 传输层失败（连接、超时、读取响应体）→ Network
//! - 429 → RateLimited（Retry-After 整数秒，缺失或无法解析时为 1）
//! - 500 → ServerError
//! - 其它非 2xx：响应体可解析为 `{error: {message}}` 时 → RemoteError(message)，否则 → InvalidResponse(status)
//! - 2xx 但响应体无法解析 → Decode
//! - 请求无法构造（非法 ID、非法 base_url）→ InvalidRequest

use crate::assistant::ApiErrorEnvelope;
use crate::core::AssistantError;

/// 429 未携带 Retry-After 时的默认退避秒数
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// 待分类的原始失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// 请求未得到 HTTP 响应（连接失败、超时、读取中断）
    Transport { message: String, timeout: bool },
    /// 收到非 2xx 响应
    Status {
        status: u16,
        retry_after: Option<String>,
        body: String,
    },
    /// 2xx 响应体无法解析
    Body { message: String },
    /// 请求在发出前即无法构造
    Request { message: String },
}

impl From<&reqwest::Error> for RawFailure {
    fn from(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            RawFailure::Request {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            RawFailure::Body {
                message: err.to_string(),
            }
        } else {
            RawFailure::Transport {
                message: err.to_string(),
                timeout: err.is_timeout(),
            }
        }
    }
}

/// 纯映射：RawFailure → AssistantError
pub fn classify(failure: RawFailure) -> AssistantError {
    let classified = match &failure {
        RawFailure::Transport { .. } => AssistantError::Network,
        RawFailure::Status {
            status,
            retry_after,
            body,
        } => classify_status(*status, retry_after.as_deref(), body),
        RawFailure::Body { .. } => AssistantError::Decode,
        RawFailure::Request { .. } => AssistantError::InvalidRequest,
    };
    tracing::debug!(kind = classified.kind(), ?failure, "classified assistant failure");
    classified
}

fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> AssistantError {
    match status {
        200..=299 => AssistantError::Unknown,
        429 => AssistantError::RateLimited(parse_retry_after(retry_after)),
        500 => AssistantError::ServerError,
        _ => match remote_error_message(body) {
            Some(message) => AssistantError::RemoteError(message),
            None => AssistantError::InvalidResponse(status),
        },
    }
}

/// Retry-After 只接受整数秒；HTTP-date 形式按缺失处理
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn remote_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|env| env.error.message)
}
