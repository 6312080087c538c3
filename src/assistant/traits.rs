//! Assistants 客户端抽象
//!
//! 所有实现（HTTP / Mock）实现 AssistantClient 的五个远端操作；失败统一为 AssistantError，内部不做重试。

use async_trait::async_trait;

use crate::assistant::{Message, NewMessage, Run, Thread};
use crate::core::AssistantError;

#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// 创建新的会话线程
    async fn create_thread(&self) -> Result<Thread, AssistantError>;

    /// 向线程追加一条消息；成功仅表示已被接受，不代表已处理
    async fn post_message(&self, thread_id: &str, message: &NewMessage) -> Result<(), AssistantError>;

    /// 在线程上启动一次 Run，返回的初始状态为非终态（通常是 queued）
    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError>;

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, AssistantError>;
}
