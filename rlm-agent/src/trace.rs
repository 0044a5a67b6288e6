//! Per-iteration audit records

use rlm_runtime::{ExecutionResult, Response};
use serde::Serialize;

/// What happened in one iteration. Read by callers, never by the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationTrace {
    /// 1-based within one `run()`
    pub iteration: usize,
    /// Nesting level of the orchestrator that produced it
    pub depth: usize,
    pub message: String,
    pub code: String,
    /// True when no code ran
    pub success: bool,
    pub error: Option<String>,
}

impl IterationTrace {
    pub fn new(iteration: usize, depth: usize, response: &Response, execution: Option<&ExecutionResult>) -> Self {
        Self {
            iteration,
            depth,
            message: response.message.clone(),
            code: response.code.clone(),
            success: execution.map_or(true, |e| e.success),
            error: execution.and_then(|e| e.error.clone()),
        }
    }
}
