//! Scripted provider - replays canned replies in order
//!
//! Each call to `complete` pops the next scripted outcome and records the
//! request it was given. Nested orchestrators sharing one provider consume the
//! same queue, which makes strict call ordering observable in tests.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::backend::{CODE_FENCE_TAG, CODE_TOOL_NAME};

type Outcome = std::result::Result<CompletionResponse, ProviderError>;

/// Provider that answers from a fixed script
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw outcome
    pub fn push(self, outcome: Outcome) -> Self {
        lock(&self.replies).push_back(outcome);
        self
    }

    /// Queue a plain text reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(CompletionResponse::text(text)))
    }

    /// Queue a reply carrying one executable fence
    pub fn code(self, code: &str) -> Self {
        self.reply(format!("```{}\n{}\n```", CODE_FENCE_TAG, code))
    }

    /// Queue a reply carrying a `run_python` tool call
    pub fn tool_code(self, id: &str, code: &str) -> Self {
        let arguments = serde_json::json!({ "code": code }).to_string();
        self.push(Ok(CompletionResponse::tools(vec![ToolCall::new(id, CODE_TOOL_NAME, arguments)])))
    }

    /// Queue a connection failure
    pub fn transport_error(self, message: impl Into<String>) -> Self {
        self.push(Err(ProviderError::Network(message.into())))
    }

    /// Queue a non-success status
    pub fn api_error(self, status: u16, body: impl Into<String>) -> Self {
        self.push(Err(ProviderError::Api { status, body: body.into() }))
    }

    /// Every request seen so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Number of `complete` calls made
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Outcomes not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        lock(&self.requests).push(request);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records_requests() {
        let provider = ScriptedProvider::new()
            .reply("first")
            .transport_error("reset")
            .code("print(1)");

        let req = || CompletionRequest::new(vec![ChatMessage::user("q")]);

        let first = provider.complete(req()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));

        let second = provider.complete(req()).await.unwrap_err();
        assert!(second.is_transport());

        let third = provider.complete(req()).await.unwrap();
        assert_eq!(third.content.as_deref(), Some("```repl\nprint(1)\n```"));

        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let provider = ScriptedProvider::new();
        let err = provider
            .complete(CompletionRequest::new(Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Other("script exhausted".into()));
    }

    #[test]
    fn test_tool_code_encodes_arguments() {
        let provider = ScriptedProvider::new().tool_code("call_1", "x = \"a\"");
        let outcome = lock(&provider.replies).pop_front().unwrap().unwrap();
        let args: serde_json::Value = outcome.tool_calls[0].parse_arguments().unwrap();
        assert_eq!(args["code"], "x = \"a\"");
    }
}
