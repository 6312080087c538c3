//! 会话过程事件：通过 broadcast 通道推送给展示层（阶段变化、消息追加、Run 状态、错误）

use serde::Serialize;

use crate::assistant::Message;
use crate::core::{LoadingState, RecoveryAction};

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// 远端线程已创建
    ThreadCreated { thread_id: String },
    /// 加载阶段变化
    LoadingChanged { state: LoadingState, label: String },
    /// 消息进入本地视图（乐观写入的用户消息或归并的助手消息）
    MessageAppended { message: Message },
    /// 轮询观察到 Run 状态变化
    RunStatus { run_id: String, status: String },
    /// 错误（每次失败恰好一条），附带恢复建议
    Error { text: String, recovery: RecoveryAction },
}
