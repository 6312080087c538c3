//! Hive - 助手线程编排引擎
//!
//! 入口：初始化日志、加载配置、创建会话运行时，逐行读取标准输入驱动对话。
//! 行命令：`/quit` 退出、`/cancel` 取消当前 Run 跟踪、`/retry` 重新创建线程，其它内容作为消息发送。

use std::sync::Arc;

use anyhow::Context;
use hive::assistant::MessageRole;
use hive::config::{load_config, AppConfig};
use hive::core::{create_client_from_config, spawn_conversation, ConversationEvent, OrchestratorOptions};
use hive::memory::{InMemoryMessageLog, MessageLog};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let client = create_client_from_config(&cfg).context("Failed to create assistant client")?;
    let log: Arc<dyn MessageLog> = Arc::new(InMemoryMessageLog::new());
    let options = OrchestratorOptions::from_config(&cfg);

    let mut handle = spawn_conversation(client, log, options);
    // 取走建线程之前就已订阅的接收端，避免漏掉最早的事件
    let fresh = handle.events.resubscribe();
    let mut events = std::mem::replace(&mut handle.events, fresh);
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => tracing::debug!("Event printer lagged by {}", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/cancel" => handle.cancel(),
                    "/retry" => handle.retry_thread(),
                    text => handle.send(text),
                }
            }
        }
    }

    handle.shutdown().await;
    printer.abort();
    Ok(())
}

fn print_event(event: &ConversationEvent) {
    match event {
        ConversationEvent::ThreadCreated { thread_id } => println!("· thread {thread_id}"),
        ConversationEvent::LoadingChanged { state, label } if !state.is_idle() => {
            println!("· {label}")
        }
        ConversationEvent::LoadingChanged { .. } => {}
        ConversationEvent::MessageAppended { message } => {
            let who = match message.role {
                MessageRole::User => "you",
                MessageRole::Assistant => "assistant",
            };
            println!("[{who}] {}", message.text());
        }
        ConversationEvent::RunStatus { run_id, status } => println!("· run {run_id}: {status}"),
        ConversationEvent::Error { text, recovery } => {
            println!("! {text} ({recovery:?})");
        }
    }
}
