//! 消息日志：按 id 去重、按 thread_id 分区的追加式存储
//!
//! 编排器只依赖 MessageLog trait；持久化方式由注入的实现决定，本 crate 只提供内存实现。
//! 同一 id 重复写入是 no-op，这是多个编排器共享同一日志时唯一的安全网。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::assistant::Message;

/// 消息日志接口
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// 写入一条消息；id 已存在时不写入并返回 false
    async fn add(&self, message: Message) -> bool;

    /// 按给定顺序批量写入，返回实际写入的消息（保持原顺序）
    async fn add_all(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut accepted = Vec::with_capacity(messages.len());
        for message in messages {
            if self.add(message.clone()).await {
                accepted.push(message);
            }
        }
        accepted
    }

    /// 某线程的全部消息，按写入顺序
    async fn query(&self, thread_id: &str) -> Vec<Message>;

    async fn contains(&self, id: &str) -> bool;
}

#[derive(Debug, Default)]
struct LogInner {
    by_thread: HashMap<String, Vec<Message>>,
    ids: HashSet<String>,
}

impl LogInner {
    fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.by_thread
            .entry(message.thread_id.clone())
            .or_default()
            .push(message);
        true
    }
}

/// 内存消息日志
#[derive(Debug, Default)]
pub struct InMemoryMessageLog {
    inner: RwLock<LogInner>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有线程的消息总数
    pub async fn len(&self) -> usize {
        self.inner.read().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn add(&self, message: Message) -> bool {
        let id = message.id.clone();
        let inserted = self.inner.write().await.insert(message);
        if !inserted {
            tracing::debug!("Message {} already in log, skipped", id);
        }
        inserted
    }

    async fn add_all(&self, messages: Vec<Message>) -> Vec<Message> {
        // 整批在同一把写锁内完成
        let mut inner = self.inner.write().await;
        let mut accepted = Vec::with_capacity(messages.len());
        for message in messages {
            if inner.insert(message.clone()) {
                accepted.push(message);
            } else {
                tracing::debug!("Message {} already in log, skipped", message.id);
            }
        }
        accepted
    }

    async fn query(&self, thread_id: &str) -> Vec<Message> {
        self.inner
            .read()
            .await
            .by_thread
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.ids.contains(id)
    }
}
