//! 会话监管：轮询取消句柄
//!
//! 根 token 在编排器拆除时取消；每次发送（post → start_run → 轮询）派生一个子 token，用户取消只影响当前 Run。
//! 可 Clone，运行时在编排器被借用期间仍能通过副本取消。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    /// 拆除时触发
    root: CancellationToken,
    /// 当前 Run 的 token
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 为新的 Run 跟踪派生子 token；已拆除时返回的 token 处于取消状态
    pub fn begin_run(&self) -> CancellationToken {
        let token = self.root.child_token();
        *self.current() = Some(token.clone());
        token
    }

    /// Run 跟踪结束后释放子 token
    pub fn end_run(&self) {
        self.current().take();
    }

    /// 取消当前 Run 跟踪（无在途 Run 时为 no-op），返回是否有 Run 被取消
    pub fn cancel_run(&self) -> bool {
        match self.current().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_run_active(&self) -> bool {
        self.current().is_some()
    }

    /// 拆除：取消根 token 及所有子 token
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
