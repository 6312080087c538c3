//! 会话编排器：单个会话的状态机
//!
//! 负责：创建线程、乐观写入用户消息、post_message → start_run、交给 RunPoller 跟踪、
//! Run 完成后拉取消息并把新的助手消息归并进 MessageLog 与内存视图。
//!
//! 所有操作都取 `&mut self`，同一编排器内的步骤严格串行；任何出口（成功或失败）都会回到 Idle。
//! 状态以 watch 通道投影给展示层，过程事件走 broadcast 通道。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::assistant::{AssistantClient, Message, MessageRole, NewMessage, Run, Thread};
use crate::config::AppConfig;
use crate::core::poller::DEFAULT_POLL_INTERVAL;
use crate::core::{
    ConversationError, ConversationEvent, ConversationSnapshot, LoadingState, RecoveryEngine,
    RunPoller, SessionSupervisor,
};
use crate::memory::MessageLog;

/// 客户端消息 ID 生成器
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// 生成器连续撞 ID 的上限，超过后退回 UUID
const MAX_ID_ATTEMPTS: usize = 16;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn default_id_generator() -> IdGenerator {
    Arc::new(|| format!("msg_local_{}", uuid::Uuid::new_v4().simple()))
}

/// 编排器构造参数
#[derive(Clone)]
pub struct OrchestratorOptions {
    pub assistant_id: String,
    pub poll_interval: Duration,
    pub max_polls: Option<u32>,
    pub id_generator: IdGenerator,
}

impl std::fmt::Debug for OrchestratorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorOptions")
            .field("assistant_id", &self.assistant_id)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish_non_exhaustive()
    }
}

impl OrchestratorOptions {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
            id_generator: default_id_generator(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.assistant.assistant_id.clone().unwrap_or_default())
            .with_poll_interval(cfg.poll_interval())
            .with_max_polls(cfg.max_polls())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn with_id_generator(mut self, generator: IdGenerator) -> Self {
        self.id_generator = generator;
        self
    }
}

/// send_message 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// 空输入或尚无线程：未做任何事
    Ignored,
    /// Run 完成，appended 为本次归并的助手消息（created_at 升序）
    Completed { appended: Vec<Message> },
}

pub struct ConversationOrchestrator {
    client: Arc<dyn AssistantClient>,
    log: Arc<dyn MessageLog>,
    poller: RunPoller,
    recovery: RecoveryEngine,
    supervisor: SessionSupervisor,
    assistant_id: String,
    id_generator: IdGenerator,

    thread: Option<Thread>,
    /// 正在跟踪或未确认结束的 Run
    active_run: Option<Run>,
    loading: LoadingState,
    thread_ready: bool,
    /// 内存视图，最新在前
    messages: Vec<Message>,
    error_message: Option<String>,

    state_tx: watch::Sender<ConversationSnapshot>,
    events_tx: broadcast::Sender<ConversationEvent>,
}

impl ConversationOrchestrator {
    /// 只装配，不发请求；需要先订阅事件再建线程时用它，然后调用 create_thread
    pub fn new(
        client: Arc<dyn AssistantClient>,
        log: Arc<dyn MessageLog>,
        options: OrchestratorOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConversationSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let poller = RunPoller::new(client.clone(), options.poll_interval)
            .with_max_polls(options.max_polls)
            .with_events(events_tx.clone());

        Self {
            client,
            log,
            poller,
            recovery: RecoveryEngine::new(),
            supervisor: SessionSupervisor::new(),
            assistant_id: options.assistant_id,
            id_generator: options.id_generator,
            thread: None,
            active_run: None,
            loading: LoadingState::Idle,
            thread_ready: false,
            messages: Vec::new(),
            error_message: None,
            state_tx,
            events_tx,
        }
    }

    /// 装配并立即创建线程；创建失败时错误已上报，返回的编排器处于 Idle 且无线程
    pub async fn start(
        client: Arc<dyn AssistantClient>,
        log: Arc<dyn MessageLog>,
        options: OrchestratorOptions,
    ) -> Self {
        let mut orchestrator = Self::new(client, log, options);
        let _ = orchestrator.create_thread().await;
        orchestrator
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    pub fn active_run(&self) -> Option<&Run> {
        self.active_run.as_ref()
    }

    pub fn loading(&self) -> LoadingState {
        self.loading
    }

    pub fn is_thread_ready(&self) -> bool {
        self.thread_ready
    }

    /// 内存视图，最新在前
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            loading: self.loading,
            thread_id: self.thread.as_ref().map(|t| t.id.clone()),
            thread_ready: self.thread_ready,
            active_run: self.active_run.as_ref().map(|r| r.id.clone()),
            messages: self.messages.clone(),
            error_message: self.error_message.clone(),
        }
    }

    pub fn watch(&self) -> watch::Receiver<ConversationSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<ConversationEvent> {
        self.events_tx.clone()
    }

    /// 取消句柄副本（运行时在 send_message 执行期间用它取消轮询）
    pub fn supervisor(&self) -> SessionSupervisor {
        self.supervisor.clone()
    }

    /// 取消当前轮询；send_message 随即以 Cancelled 结束并回到 Idle
    pub fn cancel_run(&self) -> bool {
        self.supervisor.cancel_run()
    }

    /// 拆除：取消任何在途轮询，之后的 Run 跟踪立即以 Cancelled 结束
    pub fn shutdown(&self) {
        tracing::debug!("Orchestrator shutting down");
        self.supervisor.shutdown();
    }

    /// 创建远端线程；已有线程时为 no-op
    pub async fn create_thread(&mut self) -> Result<(), ConversationError> {
        if self.thread.is_some() {
            return Ok(());
        }
        if !self.loading.is_idle() {
            return Err(ConversationError::Busy);
        }

        self.set_loading(LoadingState::CreatingThread);
        let thread = match self.client.create_thread().await {
            Ok(thread) => thread,
            Err(e) => return Err(self.fail(e.into())),
        };

        tracing::info!("Thread {} created", thread.id);
        let thread_id = thread.id.clone();
        self.thread = Some(thread);
        self.thread_ready = true;
        self.error_message = None;
        self.set_loading(LoadingState::ThreadCreated);
        self.emit(ConversationEvent::ThreadCreated {
            thread_id: thread_id.clone(),
        });

        self.load_local_messages(&thread_id).await;
        self.set_loading(LoadingState::Idle);
        Ok(())
    }

    /// 日志里已有的本线程消息：按 created_at 升序排序后反转为最新在前
    async fn load_local_messages(&mut self, thread_id: &str) {
        let mut local = self.log.query(thread_id).await;
        local.sort_by_key(|m| m.created_at);
        local.reverse();
        tracing::debug!("Loaded {} local messages for thread {}", local.len(), thread_id);
        self.messages = local;
        self.publish();
    }

    /// 发送一条用户消息并跟踪到 Run 结束
    ///
    /// 空输入或无线程时直接返回 Ignored（无状态变化、无 API 调用）；已有请求在途时返回 Busy。
    /// post / start_run 失败时乐观写入的用户消息保留。
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome, ConversationError> {
        let text = text.trim();
        let Some(thread_id) = self.thread.as_ref().map(|t| t.id.clone()) else {
            tracing::debug!("send_message ignored: no thread");
            return Ok(SendOutcome::Ignored);
        };
        if text.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        if !self.loading.is_idle() {
            tracing::debug!("send_message rejected: {}", self.loading.label());
            return Err(ConversationError::Busy);
        }
        if !self.thread_ready {
            self.validate_thread(&thread_id).await?;
        }

        self.error_message = None;
        let message = self.append_user_message(&thread_id, text).await;
        self.set_loading(LoadingState::SendingMessage);

        match self.run_turn(&thread_id, &message).await {
            Ok(appended) => {
                self.set_loading(LoadingState::Idle);
                Ok(SendOutcome::Completed { appended })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run_turn(
        &mut self,
        thread_id: &str,
        message: &Message,
    ) -> Result<Vec<Message>, ConversationError> {
        // 取消句柄覆盖 post → start_run → 轮询，发送途中收到的取消同样生效
        let token = self.supervisor.begin_run();
        let tracked = self.start_and_track(thread_id, message, &token).await;
        self.supervisor.end_run();
        let run_id = tracked?;

        self.set_loading(LoadingState::CompletingRun);
        let remote = self.client.list_messages(thread_id).await?;

        self.set_loading(LoadingState::ProcessingResponse);
        let fresh = select_new_assistant_messages(remote, &self.messages);
        let candidates = fresh.len();
        // 只有日志接受的消息才进入视图
        let accepted = self.log.add_all(fresh).await;
        if accepted.len() < candidates {
            tracing::warn!(
                "Run {}: {} assistant messages rejected by the log (id already stored)",
                run_id,
                candidates - accepted.len()
            );
        }
        tracing::info!("Run {} merged {} assistant messages", run_id, accepted.len());
        for m in &accepted {
            self.push_view(m.clone());
        }
        Ok(accepted)
    }

    /// post_message → start_run → 轮询到终态，返回 run_id
    async fn start_and_track(
        &mut self,
        thread_id: &str,
        message: &Message,
        token: &CancellationToken,
    ) -> Result<String, ConversationError> {
        self.client
            .post_message(thread_id, &NewMessage::from(message))
            .await?;
        if token.is_cancelled() {
            tracing::info!("Send on thread {} cancelled before the run started", thread_id);
            return Err(ConversationError::Cancelled);
        }

        let run = self.client.start_run(thread_id, &self.assistant_id).await?;
        tracing::info!("Run {} started on thread {} ({})", run.id, thread_id, run.status);

        let run_id = run.id.clone();
        self.active_run = Some(run);
        self.set_loading(LoadingState::RunningAssistant);

        let polled = self.poller.poll(thread_id, &run_id, token).await;
        match polled {
            Ok(_) | Err(ConversationError::RunEnded { .. }) => self.active_run = None,
            // 取消或查询失败时远端 Run 可能仍在进行，保留以便下次发送前校验
            Err(_) => {}
        }
        polled.map(|_| run_id)
    }

    /// 出错后重新发送前的线程校验：若上一个 Run 可能仍在进行，先确认它已到终态
    async fn validate_thread(&mut self, thread_id: &str) -> Result<(), ConversationError> {
        if let Some(run) = self.active_run.clone() {
            tracing::debug!("Validating thread {}: checking run {}", thread_id, run.id);
            match self.client.get_run_status(thread_id, &run.id).await {
                Ok(latest) if latest.status.is_terminal() => {
                    self.active_run = None;
                }
                Ok(latest) => {
                    self.active_run = Some(latest);
                    return Err(self.fail(ConversationError::RunStillActive { run_id: run.id }));
                }
                Err(e) => return Err(self.fail(e.into())),
            }
        }
        self.thread_ready = true;
        self.publish();
        Ok(())
    }

    /// 乐观写入用户消息：id 与本地视图或日志中已有的冲突时重新生成，直到日志接受
    async fn append_user_message(&mut self, thread_id: &str, text: &str) -> Message {
        let created_at = chrono::Utc::now().timestamp();
        let mut attempts = 0;
        let message = loop {
            let id = if attempts < MAX_ID_ATTEMPTS {
                (self.id_generator)()
            } else {
                (default_id_generator())()
            };
            attempts += 1;

            let taken = self.messages.iter().any(|m| m.id == id) || self.log.contains(&id).await;
            if !taken {
                let message = Message::user(id.as_str(), thread_id, text, created_at);
                if self.log.add(message.clone()).await {
                    break message;
                }
            }
            tracing::debug!("Generated message id {} collides, re-rolling", id);
        };
        self.push_view(message.clone());
        message
    }

    fn push_view(&mut self, message: Message) {
        self.messages.insert(0, message.clone());
        self.emit(ConversationEvent::MessageAppended { message });
        self.publish();
    }

    /// 统一的失败出口：清除 thread_ready、上报一次错误、回到 Idle
    fn fail(&mut self, err: ConversationError) -> ConversationError {
        tracing::warn!(kind = err.kind(), "Conversation step failed: {}", err);
        self.thread_ready = false;
        self.error_message = Some(err.to_string());
        let recovery = self.recovery.handle(&err, self.thread.is_some());
        self.emit(ConversationEvent::Error {
            text: err.to_string(),
            recovery,
        });
        self.set_loading(LoadingState::Idle);
        err
    }

    fn set_loading(&mut self, state: LoadingState) {
        if self.loading != state {
            tracing::debug!("Loading state {:?} -> {:?}", self.loading, state);
        }
        self.loading = state;
        self.emit(ConversationEvent::LoadingChanged {
            state,
            label: state.label().to_string(),
        });
        self.publish();
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.events_tx.send(event);
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }
}

impl Drop for ConversationOrchestrator {
    fn drop(&mut self) {
        self.supervisor.shutdown();
    }
}

/// 从远端消息中挑出需要归并的：仅助手消息、且本地视图中不存在，按 created_at 升序（稳定排序）
pub fn select_new_assistant_messages(remote: Vec<Message>, local: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<String> = local.iter().map(|m| m.id.clone()).collect();
    let mut fresh: Vec<Message> = remote
        .into_iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    fresh.sort_by_key(|m| m.created_at);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::assistant::MockAssistantClient;
    use crate::memory::InMemoryMessageLog;

    #[test]
    fn test_filter_keeps_only_new_assistant_messages() {
        let local = vec![Message::user("u1", "t", "hi", 1)];
        let remote = vec![
            Message::assistant("a1", "t", "hello", 2),
            Message::user("u1", "t", "hi", 1),
        ];
        let fresh = select_new_assistant_messages(remote, &local);
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn test_filter_skips_known_ids_and_sorts_ascending() {
        let local = vec![Message::assistant("a1", "t", "old", 1)];
        // 远端列表默认最新在前
        let remote = vec![
            Message::assistant("a4", "t", "four", 40),
            Message::assistant("a3", "t", "three", 30),
            Message::assistant("a2", "t", "two", 20),
            Message::assistant("a1", "t", "old", 1),
            Message::user("u9", "t", "not mine", 25),
        ];
        let fresh = select_new_assistant_messages(remote, &local);
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a3", "a4"]);
    }

    #[test]
    fn test_filter_dedups_within_batch() {
        let remote = vec![
            Message::assistant("a1", "t", "x", 1),
            Message::assistant("a1", "t", "x", 1),
        ];
        assert_eq!(select_new_assistant_messages(remote, &[]).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_id_rerolls_on_collision() {
        let mock = Arc::new(MockAssistantClient::new());
        let log = Arc::new(InMemoryMessageLog::new());
        log.add(Message::user("id_0", "thread_mock_1", "earlier", 1)).await;

        let counter = Arc::new(AtomicUsize::new(0));
        let generator: IdGenerator = {
            let counter = counter.clone();
            Arc::new(move || format!("id_{}", counter.fetch_add(1, Ordering::SeqCst)))
        };
        let options = OrchestratorOptions::new("asst_1").with_id_generator(generator);
        let mut orchestrator = ConversationOrchestrator::start(mock.clone(), log, options).await;
        assert_eq!(orchestrator.messages().len(), 1);

        orchestrator.send_message("again").await.unwrap();
        let user = orchestrator
            .messages()
            .iter()
            .find(|m| m.role == MessageRole::User && m.text() == "again")
            .unwrap();
        assert_eq!(user.id, "id_1");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_id_rerolls_when_taken_in_shared_log() {
        let mock = Arc::new(MockAssistantClient::new());
        let log = Arc::new(InMemoryMessageLog::new());
        // 另一线程已占用 id_0，不在本线程视图中
        log.add(Message::user("id_0", "other_thread", "elsewhere", 1)).await;

        let counter = Arc::new(AtomicUsize::new(0));
        let generator: IdGenerator = {
            let counter = counter.clone();
            Arc::new(move || format!("id_{}", counter.fetch_add(1, Ordering::SeqCst)))
        };
        let options = OrchestratorOptions::new("asst_1").with_id_generator(generator);
        let mut orchestrator = ConversationOrchestrator::start(mock, log.clone(), options).await;
        assert!(orchestrator.messages().is_empty());

        orchestrator.send_message("mine").await.unwrap();

        let stored = log.query("thread_mock_1").await;
        assert_eq!(stored[0].id, "id_1");
        assert_eq!(stored[0].text(), "mine");
        assert_eq!(log.query("other_thread").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_generator_falls_back_to_uuid() {
        let mock = Arc::new(MockAssistantClient::new());
        let log = Arc::new(InMemoryMessageLog::new());
        let options = OrchestratorOptions::new("asst_1")
            .with_id_generator(Arc::new(|| "same".to_string()));
        let mut orchestrator = ConversationOrchestrator::start(mock, log.clone(), options).await;

        orchestrator.send_message("one").await.unwrap();
        orchestrator.send_message("two").await.unwrap();

        let users: Vec<_> = log
            .query("thread_mock_1")
            .await
            .into_iter()
            .filter(|m| m.role == MessageRole::User)
            .collect();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "same");
        assert!(users[1].id.starts_with("msg_local_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_messages_are_most_recent_first() {
        let mock = Arc::new(MockAssistantClient::new());
        let log = Arc::new(InMemoryMessageLog::new());
        log.add(Message::assistant("a2", "thread_mock_1", "second", 20)).await;
        log.add(Message::user("u1", "thread_mock_1", "first", 10)).await;
        log.add(Message::user("x1", "other_thread", "elsewhere", 15)).await;

        let orchestrator =
            ConversationOrchestrator::start(mock, log, OrchestratorOptions::new("asst_1")).await;
        let ids: Vec<_> = orchestrator.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "u1"]);
        assert_eq!(orchestrator.loading(), LoadingState::Idle);
        assert!(orchestrator.is_thread_ready());
    }

    #[tokio::test]
    async fn test_drop_cancels_supervisor() {
        let mock = Arc::new(MockAssistantClient::new());
        let log = Arc::new(InMemoryMessageLog::new());
        let orchestrator = ConversationOrchestrator::new(mock, log, OrchestratorOptions::new("a"));
        let supervisor = orchestrator.supervisor();
        drop(orchestrator);
        assert!(supervisor.is_shut_down());
    }
}
