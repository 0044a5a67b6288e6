//! Orchestrator - drives the request/execute/record loop
//!
//! Each iteration asks the backend for one reply, runs its code (if any) in the
//! persistent environment, appends the reply and a fresh metadata snapshot to
//! the transcript, then checks whether an answer exists.

use rlm_runtime::provider::from_config;
use rlm_runtime::{
    Backend, ChatMessage, ExecutionEnvironment, LlmProvider, Response, Result, Sentinel,
    SubTaskRunner, Transcript, ANSWER_VAR,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{RlmConfig, TerminationMode};
use crate::hook::RecursionHook;
use crate::prompt::system_prompt;
use crate::trace::IterationTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Answered,
    Exhausted,
}

/// How a `run()` ended, short of a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Answered(String),
    /// Carries the diagnostic text
    Exhausted(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Answered(_))
    }

    /// `(success, answer-or-diagnostic)`
    pub fn into_parts(self) -> (bool, String) {
        match self {
            RunOutcome::Answered(answer) => (true, answer),
            RunOutcome::Exhausted(diagnostic) => (false, diagnostic),
        }
    }
}

pub struct Orchestrator {
    backend: Backend,
    environment: ExecutionEnvironment,
    transcript: Transcript,
    config: RlmConfig,
    depth: usize,
    state: OrchestratorState,
    traces: Vec<IterationTrace>,
    iterations: usize,
}

impl Orchestrator {
    /// Build the provider from `config.provider` and start a root orchestrator.
    pub async fn new(task: impl Into<String>, config: RlmConfig) -> Result<Self> {
        config.validate()?;
        let provider = from_config(&config.provider)?;
        Self::with_provider(task, provider, config).await
    }

    /// Start a root orchestrator on an existing provider
    pub async fn with_provider(
        task: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        config: RlmConfig,
    ) -> Result<Self> {
        Self::with_depth(task, provider, config, 0).await
    }

    pub(crate) async fn with_depth(
        task: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        config: RlmConfig,
        depth: usize,
    ) -> Result<Self> {
        let hook: Arc<dyn SubTaskRunner> =
            Arc::new(RecursionHook::new(provider.clone(), config.clone(), depth));
        let environment = ExecutionEnvironment::start(task, config.environment(), Some(hook)).await?;
        let transcript = Transcript::seeded(system_prompt(config.termination), environment.snapshot());
        let backend = Backend::new(provider).with_retry(config.retry.clone());

        debug!(depth, context_len = environment.context().len(), "orchestrator ready");
        Ok(Self {
            backend,
            environment,
            transcript,
            config,
            depth,
            state: OrchestratorState::Running,
            traces: Vec::new(),
            iterations: 0,
        })
    }

    /// Loop until an answer exists or the iteration ceiling is reached.
    ///
    /// Transport and backend-status failures abort the run as `Err`; running
    /// out of iterations is `Ok(RunOutcome::Exhausted)`.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.state = OrchestratorState::Running;
        self.iterations = 0;
        let max_iterations = self.config.max_iterations;

        for iteration in 1..=max_iterations {
            self.iterations = iteration;

            let response = self
                .backend
                .generate(&self.transcript)
                .await
                .map_err(|e| e.with_context("iteration", iteration.to_string()))?;

            let execution = if response.has_code {
                Some(self.environment.execute(&response.code).await?)
            } else {
                None
            };

            let trace = IterationTrace::new(iteration, self.depth, &response, execution.as_ref());
            info!(
                iteration,
                depth = self.depth,
                has_code = response.has_code,
                success = trace.success,
                message_len = trace.message.len(),
                "iteration complete"
            );
            if let Some(error) = &trace.error {
                debug!(iteration, depth = self.depth, %error, "fragment fault");
            }
            self.traces.push(trace);

            if !response.is_empty() {
                self.transcript.push(response.assistant.clone());
            }
            self.transcript
                .push_status(self.environment.snapshot(), response.tool_call_id.as_deref());

            if let Some(answer) = self.check_termination(&response).await? {
                info!(iteration, depth = self.depth, "answer found");
                self.state = OrchestratorState::Answered;
                return Ok(RunOutcome::Answered(answer));
            }
        }

        self.state = OrchestratorState::Exhausted;
        let diagnostic = format!(
            "terminated without {} value after {} iterations",
            ANSWER_VAR, max_iterations
        );
        info!(depth = self.depth, "{}", diagnostic);
        Ok(RunOutcome::Exhausted(diagnostic))
    }

    async fn check_termination(&mut self, response: &Response) -> Result<Option<String>> {
        match self.config.termination {
            TerminationMode::Binding => Ok(self.environment.final_value().map(String::from)),
            TerminationMode::Pattern => match Sentinel::scan(response.assistant.text()) {
                Some(Sentinel::Answer(answer)) => Ok(Some(answer)),
                Some(Sentinel::Variable(name)) => {
                    let value = self.environment.get_variable(&name).await?;
                    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
                }
                None => Ok(None),
            },
        }
    }

    /// Rebind the Task Context and show the model a fresh snapshot.
    ///
    /// Every other binding survives, including `FINAL`.
    pub async fn reset_prompt(&mut self, text: impl Into<String>) -> Result<()> {
        self.environment.reset_context(text).await?;
        self.transcript.push(ChatMessage::user(self.environment.snapshot()));
        self.state = OrchestratorState::Running;
        Ok(())
    }

    /// Clear the Answer Sentinel only
    pub async fn reset_answer(&mut self) -> Result<()> {
        self.environment.reset_answer().await?;
        self.state = OrchestratorState::Running;
        Ok(())
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn traces(&self) -> &[IterationTrace] {
        &self.traces
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Iterations used by the last `run()`
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut ExecutionEnvironment {
        &mut self.environment
    }

    /// Stop the kernel process
    pub async fn shutdown(&mut self) -> Result<()> {
        self.environment.shutdown().await
    }
}
