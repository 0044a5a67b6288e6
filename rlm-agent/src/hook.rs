//! Recursion Hook: `sub_rlm(prompt)` runs a nested orchestrator to completion

use async_trait::async_trait;
use rlm_runtime::{Error, LlmProvider, SubTaskRunner, HOOK_NAME};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RlmConfig;
use crate::orchestrator::{Orchestrator, RunOutcome};

/// Builds a child orchestrator one level deeper for each call.
///
/// Children share the provider handle only; each gets its own kernel and
/// transcript.
pub struct RecursionHook {
    provider: Arc<dyn LlmProvider>,
    config: RlmConfig,
    depth: usize,
}

impl RecursionHook {
    /// `depth` is the level of the orchestrator whose namespace holds the hook
    pub fn new(provider: Arc<dyn LlmProvider>, config: RlmConfig, depth: usize) -> Self {
        Self { provider, config, depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[async_trait]
impl SubTaskRunner for RecursionHook {
    async fn run_subtask(&self, prompt: String) -> Result<String, String> {
        if self.depth >= self.config.max_depth {
            let err = Error::recursion_limit(self.config.max_depth);
            warn!(depth = self.depth, "{}", err.message());
            return Err(err.message().to_string());
        }

        let depth = self.depth + 1;
        info!(depth, prompt_len = prompt.len(), "starting sub-task");

        let mut child = Orchestrator::with_depth(prompt, self.provider.clone(), self.config.clone(), depth)
            .await
            .map_err(|e| format!("{} could not start: {}", HOOK_NAME, e))?;
        let outcome = child.run().await;
        if let Err(e) = child.shutdown().await {
            warn!(depth, error = %e, "sub-task kernel did not exit cleanly");
        }

        match outcome {
            Ok(RunOutcome::Answered(answer)) => {
                info!(depth, iterations = child.iterations(), "sub-task answered");
                Ok(answer)
            }
            Ok(RunOutcome::Exhausted(diagnostic)) => Err(format!("{} failed: {}", HOOK_NAME, diagnostic)),
            Err(e) => Err(format!("{} failed: {}", HOOK_NAME, e)),
        }
    }
}
