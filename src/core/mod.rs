//! 核心编排层：错误分类、状态投影、Run 轮询、会话编排器与命令运行时

pub mod classifier;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod poller;
pub mod recovery;
pub mod runtime;
pub mod session_supervisor;
pub mod state;

pub use classifier::{classify, RawFailure};
pub use error::{AssistantError, ConversationError};
pub use events::ConversationEvent;
pub use orchestrator::{
    select_new_assistant_messages, ConversationOrchestrator, IdGenerator, OrchestratorOptions,
    SendOutcome,
};
pub use poller::{RunPoller, DEFAULT_POLL_INTERVAL};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use runtime::{create_client_from_config, spawn_conversation, Command, ConversationHandle};
pub use session_supervisor::SessionSupervisor;
pub use state::{ConversationSnapshot, LoadingState};
