//! # rlm runtime
//!
//! The pieces a recursive language model loop is built from.
//!
//! ## Core Concepts
//! - **Execution Environment**: a persistent Python namespace living in its own
//!   process, fed one code fragment at a time
//! - **Metadata Snapshot**: the one-line status the model sees instead of the
//!   full task input
//! - **Transcript**: the append-only message history sent to the backend
//! - **Backend**: one model request per turn, transport retries, reply parsing
//! - **Provider**: trait-based LLM communication (OpenAI-compatible endpoints)
//! - **Sentinel**: how a finished answer is recognised

pub mod backend;
pub mod environment;
pub mod error;
pub mod provider;
pub mod sentinel;
pub mod transcript;

pub use backend::{Backend, Response, RetryPolicy, CODE_FENCE_TAG, CODE_TOOL_NAME};
pub use environment::{
    EnvironmentConfig, ExecutionEnvironment, ExecutionResult, KernelConfig, SnapshotConfig,
    SubTaskRunner, ANSWER_VAR, CONTEXT_VAR, HOOK_NAME,
};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role, ScriptedProvider,
    ToolCall, ToolDefinition, Usage,
};
pub use sentinel::Sentinel;
pub use transcript::Transcript;
