//! Assistants 层：数据模型、客户端抽象与实现（HTTP / Mock）

pub mod http;
pub mod mock;
pub mod traits;
pub mod types;

pub use http::{HttpAssistantClient, HttpClientOptions, DEFAULT_BASE_URL, DEFAULT_BETA_HEADER};
pub use mock::{MockAssistantClient, MockCalls};
pub use traits::AssistantClient;
pub use types::{
    ApiErrorBody, ApiErrorEnvelope, ContentBlock, Message, MessageList, MessageRole, NewContentBlock,
    NewMessage, Run, RunLastError, RunStatus, StartRunRequest, TextContent, Thread,
};
