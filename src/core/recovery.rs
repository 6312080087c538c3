//! 错误恢复建议
//!
//! 编排器从不自动重试；RecoveryEngine 只根据 ConversationError 给出建议动作，随错误事件交给展示层决定。

use serde::Serialize;

use crate::core::{AssistantError, ConversationError};

/// 展示层可采取的恢复动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// 直接重发
    Resend,
    /// 限流：等待后重发
    RetryAfter { secs: u64 },
    /// 没有可用线程，需要重新创建
    RecreateThread,
    /// 上一个 Run 尚未结束
    WaitForRun,
    /// 重试无意义（请求本身非法）
    Abort,
}

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// has_thread：出错时编排器是否已持有线程
    pub fn handle(&self, err: &ConversationError, has_thread: bool) -> RecoveryAction {
        match err {
            ConversationError::Api(AssistantError::InvalidRequest) => RecoveryAction::Abort,
            ConversationError::Api(_) if !has_thread => RecoveryAction::RecreateThread,
            ConversationError::Api(AssistantError::RateLimited(secs)) => {
                RecoveryAction::RetryAfter { secs: *secs }
            }
            ConversationError::Api(_) => RecoveryAction::Resend,
            ConversationError::RunEnded { .. } | ConversationError::Cancelled => {
                RecoveryAction::Resend
            }
            ConversationError::PollLimitExceeded { .. }
            | ConversationError::Busy
            | ConversationError::RunStillActive { .. } => RecoveryAction::WaitForRun,
        }
    }
}
