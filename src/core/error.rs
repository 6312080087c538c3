//! 错误类型：远端调用错误（封闭集合）与编排层错误
//!
//! AssistantError 由 ErrorClassifier 统一产出；ConversationError 在其之上补充 Run 终态失败、取消、忙碌等编排语义。
//! 每个变体的 Display 即为面向用户的唯一提示文案。

use thiserror::Error;

use crate::assistant::RunStatus;

/// 远端 Assistants API 调用失败的领域分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssistantError {
    #[error("Network error: could not reach the assistant service")]
    Network,

    #[error("Rate limited: try again in {0}s")]
    RateLimited(u64),

    #[error("The assistant service had an internal error")]
    ServerError,

    #[error("Invalid response from the assistant service (HTTP {0})")]
    InvalidResponse(u16),

    #[error("Could not decode the assistant service response")]
    Decode,

    #[error("Assistant service error: {0}")]
    RemoteError(String),

    #[error("Invalid request")]
    InvalidRequest,

    #[error("Unknown error")]
    Unknown,
}

impl AssistantError {
    /// 简短的机器可读标识（日志字段用）
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::Network => "network",
            AssistantError::RateLimited(_) => "rate_limited",
            AssistantError::ServerError => "server_error",
            AssistantError::InvalidResponse(_) => "invalid_response",
            AssistantError::Decode => "decode",
            AssistantError::RemoteError(_) => "remote_error",
            AssistantError::InvalidRequest => "invalid_request",
            AssistantError::Unknown => "unknown",
        }
    }

    /// 稍后重发可能成功的错误（网络、限流、服务端 500）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AssistantError::Network | AssistantError::RateLimited(_) | AssistantError::ServerError
        )
    }

    /// 限流时服务端建议的等待秒数
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AssistantError::RateLimited(secs) => Some(*secs),
            _ => None,
        }
    }
}

/// 编排过程中的错误（发送、Run 跟踪、结果归并）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversationError {
    #[error(transparent)]
    Api(#[from] AssistantError),

    #[error("Run {} ended with status '{}'{}", .run_id, .status, last_error_suffix(.last_error))]
    RunEnded {
        run_id: String,
        status: RunStatus,
        last_error: Option<String>,
    },

    #[error("Run tracking was cancelled")]
    Cancelled,

    #[error("Run {run_id} did not finish after {polls} status checks")]
    PollLimitExceeded { run_id: String, polls: u32 },

    #[error("A message is already being processed")]
    Busy,

    #[error("Run {run_id} is still active on this thread")]
    RunStillActive { run_id: String },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ConversationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConversationError::Api(e) => e.kind(),
            ConversationError::RunEnded { .. } => "run_ended",
            ConversationError::Cancelled => "cancelled",
            ConversationError::PollLimitExceeded { .. } => "poll_limit_exceeded",
            ConversationError::Busy => "busy",
            ConversationError::RunStillActive { .. } => "run_still_active",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_helpers() {
        let err = AssistantError::RateLimited(7);
        assert_eq!(err.retry_after(), Some(7));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Rate limited: try again in 7s");
    }

    #[test]
    fn test_non_transient_errors() {
        assert!(!AssistantError::Decode.is_transient());
        assert!(!AssistantError::InvalidResponse(404).is_transient());
        assert!(!AssistantError::RemoteError("bad".into()).is_transient());
        assert_eq!(AssistantError::InvalidResponse(404).retry_after(), None);
    }

    #[test]
    fn test_api_error_is_transparent() {
        let err = ConversationError::from(AssistantError::ServerError);
        assert_eq!(err.to_string(), AssistantError::ServerError.to_string());
        assert_eq!(err.kind(), "server_error");
    }

    #[test]
    fn test_run_ended_message_includes_last_error() {
        let err = ConversationError::RunEnded {
            run_id: "run_1".into(),
            status: RunStatus::Failed,
            last_error: Some("rate_limit_exceeded".into()),
        };
        assert_eq!(
            err.to_string(),
            "Run run_1 ended with status 'failed': rate_limit_exceeded"
        );

        let err = ConversationError::RunEnded {
            run_id: "run_2".into(),
            status: RunStatus::Cancelled,
            last_error: None,
        };
        assert_eq!(err.to_string(), "Run run_2 ended with status 'cancelled'");
    }
}
