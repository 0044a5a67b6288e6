//! # Backend Adapter
//!
//! Turns a transcript into exactly one model request, retries transport
//! failures on a fixed schedule, and splits the reply into message and code.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, ProviderError, ToolCall,
    ToolDefinition, Usage,
};
use crate::transcript::Transcript;

/// Fence tag that marks code the model wants executed.
///
/// Generic fences (```` ```python ````, bare ```` ``` ````) are explanatory and
/// never run.
pub const CODE_FENCE_TAG: &str = "repl";

/// Name of the structured tool the model may call instead of fencing code
pub const CODE_TOOL_NAME: &str = "run_python";

/// Fixed-delay retry schedule for transport failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Sleep between attempts
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// One parsed model reply
#[derive(Debug, Clone)]
pub struct Response {
    /// Free text preceding the executable fence (the whole text if none)
    pub message: String,
    /// Whether the reply asked for code execution
    pub has_code: bool,
    /// Code to execute, empty when `has_code` is false
    pub code: String,
    /// Set when the code arrived as a structured tool call
    pub tool_call_id: Option<String>,
    /// The reply as it should be replayed in the transcript
    pub assistant: ChatMessage,
    pub usage: Usage,
}

impl Response {
    /// Split a completion into message and code.
    ///
    /// A `run_python` tool call wins over a fenced block. Only the selected
    /// tool call is kept in `assistant`, so every replayed call gets exactly
    /// one tool result.
    pub fn from_completion(completion: CompletionResponse) -> Self {
        let content = completion.content.unwrap_or_default();

        if let Some(call) = completion
            .tool_calls
            .into_iter()
            .find(|tc| tc.name == CODE_TOOL_NAME)
        {
            let code = tool_code(&call);
            let assistant = ChatMessage::assistant_with_tools(
                (!content.is_empty()).then(|| content.clone()),
                vec![call.clone()],
            );
            return Self {
                message: content.trim().to_string(),
                has_code: true,
                code,
                tool_call_id: Some(call.id),
                assistant,
                usage: completion.usage,
            };
        }

        let (message, has_code, code) = match find_code_fence(&content) {
            Some((start, code)) => (content[..start].trim().to_string(), true, code),
            None => (content.trim().to_string(), false, String::new()),
        };

        Self {
            message,
            has_code,
            code,
            tool_call_id: None,
            assistant: ChatMessage::assistant(content),
            usage: completion.usage,
        }
    }

    /// True when the model produced neither text nor code
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && !self.has_code
    }
}

fn tool_code(call: &ToolCall) -> String {
    #[derive(Deserialize)]
    struct Arguments {
        #[serde(default)]
        code: String,
    }

    match call.parse_arguments::<Arguments>() {
        Ok(args) => args.code,
        // Some models send the bare source instead of a JSON object.
        Err(_) => call.arguments.clone(),
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(&format!(r"(?is)```{}\b(.*?)(?:```|\z)", CODE_FENCE_TAG))
            .expect("fence pattern is valid")
    })
}

/// Locate the first executable fence: byte offset where it starts, and its body.
///
/// An unterminated fence runs to the end of the text.
pub fn find_code_fence(text: &str) -> Option<(usize, String)> {
    let captures = fence_regex().captures(text)?;
    let start = captures.get(0)?.start();
    let body = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    Some((start, body.to_string()))
}

/// The tool declaration offered alongside every request
pub fn code_tool() -> ToolDefinition {
    ToolDefinition::new(
        CODE_TOOL_NAME,
        "Execute Python code in the persistent REPL and return a metadata snapshot of the result.",
    )
    .with_parameters(serde_json::json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "description": "Python source to execute" }
        },
        "required": ["code"]
    }))
}

/// Request builder + retry loop around one provider
pub struct Backend {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    retry: RetryPolicy,
    offer_tool: bool,
}

impl Backend {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            retry: RetryPolicy::default(),
            offer_tool: true,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Whether to declare the `run_python` tool (fences work either way)
    pub fn with_code_tool(mut self, offer: bool) -> Self {
        self.offer_tool = offer;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    fn build_request(&self, transcript: &Transcript) -> CompletionRequest {
        let mut request = CompletionRequest::new(transcript.messages().to_vec())
            .with_model(
                self.model
                    .clone()
                    .unwrap_or_else(|| self.provider.default_model().to_string()),
            )
            .with_temperature(0.0);
        if self.offer_tool {
            request = request.with_tools(vec![code_tool()]);
        }
        request
    }

    /// Send the transcript and parse the single reply.
    ///
    /// Transport failures are retried up to `max_attempts` in total with a
    /// fixed delay; the last one is returned as a persistent error. Any status
    /// error is returned at once.
    pub async fn generate(&self, transcript: &Transcript) -> Result<Response> {
        let request = self.build_request(transcript);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, provider = self.provider.name(), "requesting completion");

            match self.provider.complete(request.clone()).await {
                Ok(completion) => return Ok(Response::from_completion(completion)),
                Err(err) if err.is_transport() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = self.retry.delay_ms,
                        error = %err,
                        "transport failure, retrying"
                    );
                    tokio::time::sleep(self.retry.delay()).await;
                }
                Err(err) => return Err(fatal(err, attempt)),
            }
        }
    }
}

fn fatal(err: ProviderError, attempts: u32) -> Error {
    let error = match err {
        ProviderError::Network(message) => Error::network_failed(message).persist(),
        ProviderError::Timeout(message) => Error::timeout(message).persist(),
        ProviderError::Api { status, body } => Error::backend_rejected(status, body),
        ProviderError::Parse(message) => Error::parse_failed(message),
        ProviderError::Other(message) => Error::unexpected(message),
    };
    error
        .with_operation("backend::generate")
        .with_context("attempts", attempts.to_string())
}
