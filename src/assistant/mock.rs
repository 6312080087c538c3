//! Mock Assistants 客户端（用于测试与无 API Key 的本地运行）
//!
//! 每个操作有一个结果队列，测试可预先压入成功或失败；队列为空时走默认行为：
//! 线程 / Run 按序号生成 ID，Run 状态直接 completed，list_messages 为每条已发送的用户消息回显一条助手消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::assistant::{AssistantClient, Message, NewMessage, Run, RunStatus, Thread};
use crate::core::AssistantError;

/// 各操作的调用次数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub create_thread: usize,
    pub post_message: usize,
    pub start_run: usize,
    pub get_run_status: usize,
    pub list_messages: usize,
}

impl MockCalls {
    pub fn total(&self) -> usize {
        self.create_thread + self.post_message + self.start_run + self.get_run_status + self.list_messages
    }
}

#[derive(Default)]
struct Scripts {
    threads: VecDeque<Result<Thread, AssistantError>>,
    posts: VecDeque<Result<(), AssistantError>>,
    runs: VecDeque<Result<Run, AssistantError>>,
    statuses: VecDeque<Result<RunStatus, AssistantError>>,
    messages: VecDeque<Result<Vec<Message>, AssistantError>>,
    posted: Vec<(String, NewMessage)>,
}

#[derive(Default)]
pub struct MockAssistantClient {
    scripts: Mutex<Scripts>,
    create_thread_calls: AtomicUsize,
    post_message_calls: AtomicUsize,
    start_run_calls: AtomicUsize,
    get_run_status_calls: AtomicUsize,
    list_messages_calls: AtomicUsize,
}

impl std::fmt::Debug for MockAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAssistantClient")
            .field("calls", &self.calls())
            .finish()
    }
}

impl MockAssistantClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn scripts(&self) -> std::sync::MutexGuard<'_, Scripts> {
        // 测试线程 panic 导致的中毒不影响脚本数据本身
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_create_thread(&self, result: Result<Thread, AssistantError>) {
        self.scripts().threads.push_back(result);
    }

    pub fn push_post_message(&self, result: Result<(), AssistantError>) {
        self.scripts().posts.push_back(result);
    }

    pub fn push_start_run(&self, result: Result<Run, AssistantError>) {
        self.scripts().runs.push_back(result);
    }

    pub fn push_run_status(&self, result: Result<RunStatus, AssistantError>) {
        self.scripts().statuses.push_back(result);
    }

    pub fn push_run_statuses(&self, statuses: impl IntoIterator<Item = RunStatus>) {
        let mut scripts = self.scripts();
        scripts.statuses.extend(statuses.into_iter().map(Ok));
    }

    pub fn push_list_messages(&self, result: Result<Vec<Message>, AssistantError>) {
        self.scripts().messages.push_back(result);
    }

    pub fn calls(&self) -> MockCalls {
        MockCalls {
            create_thread: self.create_thread_calls.load(Ordering::SeqCst),
            post_message: self.post_message_calls.load(Ordering::SeqCst),
            start_run: self.start_run_calls.load(Ordering::SeqCst),
            get_run_status: self.get_run_status_calls.load(Ordering::SeqCst),
            list_messages: self.list_messages_calls.load(Ordering::SeqCst),
        }
    }

    /// 所有被接受的 post_message 请求：(thread_id, 消息)
    pub fn posted(&self) -> Vec<(String, NewMessage)> {
        self.scripts().posted.clone()
    }

    fn echo_replies(&self, thread_id: &str) -> Vec<Message> {
        let base = chrono::Utc::now().timestamp();
        self.scripts()
            .posted
            .iter()
            .filter(|(t, _)| t == thread_id)
            .enumerate()
            .map(|(i, (_, posted))| {
                Message::assistant(
                    format!("msg_mock_{}_{}", thread_id, i + 1),
                    thread_id,
                    format!("Echo from Mock: {}", posted.text()),
                    base + i as i64,
                )
            })
            .collect()
    }
}

#[async_trait]
impl AssistantClient for MockAssistantClient {
    async fn create_thread(&self) -> Result<Thread, AssistantError> {
        let n = self.create_thread_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.scripts().threads.pop_front();
        scripted.unwrap_or_else(|| Ok(Thread::new(format!("thread_mock_{n}"))))
    }

    async fn post_message(&self, thread_id: &str, message: &NewMessage) -> Result<(), AssistantError> {
        self.post_message_calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts();
        let result = scripts.posts.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            scripts.posted.push((thread_id.to_string(), message.clone()));
        }
        result
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        let n = self.start_run_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.scripts().runs.pop_front();
        scripted.unwrap_or_else(|| {
            let mut run = Run::new(format!("run_mock_{n}"), thread_id, RunStatus::Queued);
            run.assistant_id = Some(assistant_id.to_string());
            Ok(run)
        })
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        self.get_run_status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripts().statuses.pop_front();
        let status = scripted.unwrap_or(Ok(RunStatus::Completed))?;
        Ok(Run::new(run_id, thread_id, status))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, AssistantError> {
        self.list_messages_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripts().messages.pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.echo_replies(thread_id)),
        }
    }
}
