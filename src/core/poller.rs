//! Run 轮询器
//!
//! 以固定间隔调用 get_run_status，直到 Run 进入终态或被取消。
//! 定时器归 poll 的 future 所有：成功、终态失败、状态查询失败、取消，任一出口都会随 future 结束而停止，不留后台任务。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::assistant::{AssistantClient, Run, RunStatus};
use crate::core::{ConversationError, ConversationEvent};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct RunPoller {
    client: Arc<dyn AssistantClient>,
    interval: Duration,
    /// None 表示不限次数
    max_polls: Option<u32>,
    events: Option<broadcast::Sender<ConversationEvent>>,
}

impl RunPoller {
    pub fn new(client: Arc<dyn AssistantClient>, interval: Duration) -> Self {
        // tokio interval 不接受 0
        let interval = interval.max(Duration::from_millis(1));
        Self {
            client,
            interval,
            max_polls: None,
            events: None,
        }
    }

    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls.filter(|n| *n > 0);
        self
    }

    /// 每次观察到状态变化时推送 RunStatus 事件
    pub fn with_events(mut self, events: broadcast::Sender<ConversationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 轮询直到终态：completed → Ok；failed / cancelled → RunEnded；
    /// 单次状态查询失败立即返回 Api 错误，不做透明重试。首次查询发生在一个间隔之后。
    pub async fn poll(
        &self,
        thread_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Run, ConversationError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls: u32 = 0;
        let mut last_status: Option<RunStatus> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Polling of run {} cancelled after {} checks", run_id, polls);
                    return Err(ConversationError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            polls += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Polling of run {} cancelled during status check", run_id);
                    return Err(ConversationError::Cancelled);
                }
                result = self.client.get_run_status(thread_id, run_id) => result,
            };

            let run = result.map_err(|e| {
                tracing::warn!("Run {} status check #{} failed: {}", run_id, polls, e);
                ConversationError::Api(e)
            })?;

            if last_status.as_ref() != Some(&run.status) {
                tracing::debug!("Run {} status: {}", run_id, run.status);
                if let Some(events) = &self.events {
                    let _ = events.send(ConversationEvent::RunStatus {
                        run_id: run_id.to_string(),
                        status: run.status.to_string(),
                    });
                }
                last_status = Some(run.status.clone());
            }

            match &run.status {
                RunStatus::Completed => {
                    tracing::info!("Run {} completed after {} checks", run_id, polls);
                    return Ok(run);
                }
                status if status.is_terminal() => {
                    tracing::warn!("Run {} ended with status {}", run_id, status);
                    return Err(ConversationError::RunEnded {
                        run_id: run.id.clone(),
                        status: status.clone(),
                        last_error: run.last_error.as_ref().map(|e| e.message.clone()),
                    });
                }
                _ => {}
            }

            if let Some(max) = self.max_polls {
                if polls >= max {
                    tracing::warn!("Run {} still {} after {} checks, giving up", run_id, run.status, polls);
                    return Err(ConversationError::PollLimitExceeded {
                        run_id: run_id.to_string(),
                        polls,
                    });
                }
            }
        }
    }
}
