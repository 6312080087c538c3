//! 记忆层：消息日志（去重存储，按线程查询）

pub mod message_log;

pub use message_log::{InMemoryMessageLog, MessageLog};
