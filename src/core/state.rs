//! 状态定义：LoadingState 与 ConversationSnapshot 投影
//!
//! UI 只持有轻量的 ConversationSnapshot（阶段、线程、消息视图、错误）；完整状态由编排器维护并投影。

use serde::Serialize;

use crate::assistant::Message;

/// 编排器的加载阶段；code 与 label 供进度 UI 使用
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Idle,
    CreatingThread,
    ThreadCreated,
    RunningAssistant,
    ProcessingResponse,
    CompletingRun,
    SendingMessage,
}

impl LoadingState {
    pub fn code(self) -> u8 {
        match self {
            LoadingState::Idle => 0,
            LoadingState::CreatingThread => 1,
            LoadingState::ThreadCreated => 2,
            LoadingState::RunningAssistant => 3,
            LoadingState::ProcessingResponse => 4,
            LoadingState::CompletingRun => 5,
            LoadingState::SendingMessage => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoadingState::Idle => "Idle",
            LoadingState::CreatingThread => "Creating thread...",
            LoadingState::ThreadCreated => "Thread created",
            LoadingState::RunningAssistant => "Running assistant...",
            LoadingState::ProcessingResponse => "Processing response...",
            LoadingState::CompletingRun => "Completing run...",
            LoadingState::SendingMessage => "Sending message...",
        }
    }

    pub fn is_idle(self) -> bool {
        self == LoadingState::Idle
    }
}

impl Default for LoadingState {
    fn default() -> Self {
        LoadingState::Idle
    }
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversationSnapshot {
    pub loading: LoadingState,
    pub thread_id: Option<String>,
    pub thread_ready: bool,
    /// 正在跟踪（或上次未确认结束）的 Run
    pub active_run: Option<String>,
    /// 最新在前
    pub messages: Vec<Message>,
    pub error_message: Option<String>,
}

impl ConversationSnapshot {
    /// 输入框是否应锁定（有请求在途）
    pub fn input_locked(&self) -> bool {
        !self.loading.is_idle()
    }
}
