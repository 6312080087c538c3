//! 会话运行时：命令通道驱动单个编排器
//!
//! 负责：根据配置选择 Assistants 后端、建立 cmd / state / events 三通道，
//! 并在后台任务中消费展示层命令（Send / Cancel / RetryThread / Shutdown）。
//! 发送在途时继续接收命令：重复 Send 被拒绝（Busy 事件），Cancel 取消本次发送（post 期间收到则不再启动 Run，之后则停止轮询），Shutdown 取消后退出。
//! 在途的 send_message future 不会被中途丢弃，因此编排器总能回到 Idle。

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::assistant::{AssistantClient, HttpAssistantClient, HttpClientOptions, MockAssistantClient};
use crate::config::AppConfig;
use crate::core::{
    AssistantError, ConversationError, ConversationEvent, ConversationOrchestrator,
    ConversationSnapshot, OrchestratorOptions, RecoveryEngine,
};
use crate::memory::MessageLog;

/// 从展示层发往运行时的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 发送用户消息
    Send(String),
    /// 取消当前 Run 的跟踪
    Cancel,
    /// 初次建线程失败后重试
    RetryThread,
    /// 拆除会话
    Shutdown,
}

/// 展示层持有的会话句柄
pub struct ConversationHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub state: watch::Receiver<ConversationSnapshot>,
    pub events: broadcast::Receiver<ConversationEvent>,
    task: JoinHandle<()>,
}

impl ConversationHandle {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Send(text.into()));
    }

    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    pub fn retry_thread(&self) {
        let _ = self.commands.send(Command::RetryThread);
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.state.borrow().clone()
    }

    /// 请求拆除并等待后台任务退出
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("Conversation task ended abnormally: {}", e);
        }
    }
}

/// 根据配置选择后端：有 API Key 与 assistant_id 时用 HTTP，否则退回 Mock
pub fn create_client_from_config(cfg: &AppConfig) -> Result<Arc<dyn AssistantClient>, AssistantError> {
    let has_assistant = cfg
        .assistant
        .assistant_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());

    match cfg.api_key() {
        Some(api_key) if has_assistant => {
            let beta = Some(cfg.assistant.beta_header.clone()).filter(|b| !b.is_empty());
            let options = HttpClientOptions::new(api_key)
                .with_base_url(cfg.assistant.base_url.clone())
                .with_beta_header(beta)
                .with_timeout(cfg.request_timeout());
            let client = HttpAssistantClient::new(options)?;
            tracing::info!("Using Assistants API at {}", client.base_url());
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("No API key or assistant_id configured, using Mock assistant");
            Ok(Arc::new(MockAssistantClient::new()))
        }
    }
}

/// 创建会话运行时：后台任务先建线程，再循环消费命令
pub fn spawn_conversation(
    client: Arc<dyn AssistantClient>,
    log: Arc<dyn MessageLog>,
    options: OrchestratorOptions,
) -> ConversationHandle {
    let orchestrator = ConversationOrchestrator::new(client, log, options);
    let state = orchestrator.watch();
    let events = orchestrator.subscribe();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();

    let task = tokio::spawn(run_conversation(orchestrator, cmd_rx));

    ConversationHandle {
        commands: cmd_tx,
        state,
        events,
        task,
    }
}

async fn run_conversation(
    mut orchestrator: ConversationOrchestrator,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let supervisor = orchestrator.supervisor();
    let events_tx = orchestrator.event_sender();
    let recovery = RecoveryEngine::new();

    let _ = orchestrator.create_thread().await;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Send(text) => {
                let mut shutting_down = false;
                let turn = orchestrator.send_message(&text);
                tokio::pin!(turn);
                loop {
                    tokio::select! {
                        result = &mut turn => {
                            if let Err(e) = result {
                                tracing::debug!("Send finished with error: {}", e);
                            }
                            break;
                        }
                        Some(cmd) = cmd_rx.recv() => match cmd {
                            Command::Send(_) | Command::RetryThread => {
                                let err = ConversationError::Busy;
                                let _ = events_tx.send(ConversationEvent::Error {
                                    text: err.to_string(),
                                    recovery: recovery.handle(&err, true),
                                });
                            }
                            Command::Cancel => {
                                supervisor.cancel_run();
                            }
                            Command::Shutdown => {
                                supervisor.shutdown();
                                shutting_down = true;
                            }
                        }
                    }
                }
                if shutting_down {
                    break;
                }
            }
            Command::RetryThread => {
                let _ = orchestrator.create_thread().await;
            }
            Command::Cancel => {
                tracing::debug!("Cancel ignored: no run in flight");
            }
            Command::Shutdown => break,
        }
    }

    orchestrator.shutdown();
    tracing::info!("Conversation runtime stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_falls_back_to_mock_without_assistant_id() {
        let mut cfg = AppConfig::default();
        cfg.assistant.api_key = Some("sk-test".into());
        let client = create_client_from_config(&cfg);
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.assistant.api_key = Some("sk-test".into());
        cfg.assistant.assistant_id = Some("asst_1".into());
        cfg.assistant.base_url = "::not a url::".into();
        assert_eq!(
            create_client_from_config(&cfg).err(),
            Some(AssistantError::InvalidRequest)
        );
    }
}
