//! # Execution Environment
//!
//! One persistent Python namespace per instance, living in a child process.
//! Fragments run one at a time against it; faults come back as data, never as
//! errors, and the last output is kept in bounded tails for the snapshot.
//!
//! The namespace is seeded with three bindings:
//! - `context`: the Task Context
//! - `FINAL`: the Answer Sentinel, unset until a fragment assigns it
//! - `sub_rlm(prompt)`: the Recursion Hook, served by a [`SubTaskRunner`]

mod fence;
mod kernel;
mod snapshot;

pub use fence::strip_fences;
pub use snapshot::{shorten, tail, SnapshotConfig, SNAPSHOT_TAG};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use kernel::{HostMessage, Kernel, KernelEvent};
use snapshot::Snapshot;

/// Name of the Task Context binding
pub const CONTEXT_VAR: &str = "context";
/// Name of the Answer Sentinel binding
pub const ANSWER_VAR: &str = "FINAL";
/// Name of the Recursion Hook binding
pub const HOOK_NAME: &str = "sub_rlm";

/// Outcome of one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_tail: String,
    pub stderr_tail: String,
    /// `"<Kind>: <message>\n<traceback>"` when the fragment raised
    pub error: Option<String>,
}

/// Serves `sub_rlm(prompt)` calls made by running code.
///
/// `Err` is raised inside the calling fragment as `RuntimeError(text)`.
#[async_trait]
pub trait SubTaskRunner: Send + Sync {
    async fn run_subtask(&self, prompt: String) -> std::result::Result<String, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Interpreter command
    pub python: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            python: "python3".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub snapshot: SnapshotConfig,
    pub kernel: KernelConfig,
}

pub struct ExecutionEnvironment {
    kernel: Option<Kernel>,
    config: EnvironmentConfig,
    context: String,
    hook: Option<Arc<dyn SubTaskRunner>>,
    last_code: String,
    stdout_tail: String,
    stderr_tail: String,
    final_value: Option<String>,
}

impl ExecutionEnvironment {
    /// Spawn a kernel with `context` bound and the hook installed.
    pub async fn start(
        context: impl Into<String>,
        config: EnvironmentConfig,
        hook: Option<Arc<dyn SubTaskRunner>>,
    ) -> Result<Self> {
        let context = context.into();
        let kernel = spawn_kernel(&config.kernel, &context).await?;
        Ok(Self {
            kernel: Some(kernel),
            config,
            context,
            hook,
            last_code: String::new(),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            final_value: None,
        })
    }

    fn kernel(&mut self) -> Result<&mut Kernel> {
        self.kernel.as_mut().ok_or_else(|| {
            Error::kernel_unavailable(&self.config.kernel.python, "kernel is not running")
        })
    }

    /// Run one fragment against the namespace.
    ///
    /// A raised fault (including `SystemExit`) or a crashed interpreter yields
    /// `success: false`. Only a broken host/kernel exchange is an `Err`.
    pub async fn execute(&mut self, code: &str) -> Result<ExecutionResult> {
        let code = strip_fences(code);
        debug!(code_len = code.len(), "executing fragment");

        let result = match self.run_fragment(&code).await {
            Ok((result, final_value)) => {
                self.final_value = final_value;
                result
            }
            Err(err) if err.kind() == ErrorKind::ChannelClosed => self.recover(err).await?,
            Err(err) => return Err(err.with_operation("environment::execute")),
        };

        self.last_code = code;
        self.stdout_tail = tail(&result.stdout, self.config.snapshot.stdout_tail_chars);
        let mut stderr = result.stderr.clone();
        if let Some(error) = &result.error {
            stderr.push_str(error);
        }
        self.stderr_tail = tail(&stderr, self.config.snapshot.stderr_tail_chars);

        debug!(stdout = %result.stdout, stderr = %result.stderr, "fragment output");
        Ok(ExecutionResult {
            stdout_tail: self.stdout_tail.clone(),
            stderr_tail: self.stderr_tail.clone(),
            ..result
        })
    }

    async fn run_fragment(&mut self, code: &str) -> Result<(ExecutionResult, Option<String>)> {
        let hook = self.hook.clone();
        let kernel = self.kernel()?;
        kernel.send(&HostMessage::Exec { code }).await?;

        loop {
            match kernel.recv().await? {
                KernelEvent::ExecResult {
                    ok,
                    stdout,
                    stderr,
                    error,
                    final_value,
                } => {
                    let result = ExecutionResult {
                        success: ok,
                        stdout,
                        stderr,
                        stdout_tail: String::new(),
                        stderr_tail: String::new(),
                        error,
                    };
                    return Ok((result, final_value));
                }
                KernelEvent::HookCall { prompt } => {
                    let reply = match &hook {
                        Some(hook) => hook.run_subtask(prompt).await,
                        None => Err(format!("{} is not available in this environment", HOOK_NAME)),
                    };
                    let message = match reply {
                        Ok(value) => HostMessage::HookResult { ok: true, value: Some(value), error: None },
                        Err(error) => HostMessage::HookResult { ok: false, value: None, error: Some(error) },
                    };
                    kernel.send(&message).await?;
                }
                KernelEvent::ProtocolError { message } => {
                    return Err(Error::kernel_protocol(message));
                }
                other => {
                    return Err(Error::kernel_protocol(format!(
                        "unexpected {:?} while a fragment was running",
                        other
                    )));
                }
            }
        }
    }

    /// Replace a dead kernel with a fresh one and report the loss.
    async fn recover(&mut self, cause: Error) -> Result<ExecutionResult> {
        let exit = match self.kernel.take() {
            Some(kernel) => kernel.reap().await,
            None => "not running".to_string(),
        };
        warn!(%exit, error = %cause, "kernel died during fragment, respawning");

        self.final_value = None;
        self.kernel = Some(spawn_kernel(&self.config.kernel, &self.context).await?);

        Ok(ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            error: Some(format!(
                "KernelCrash: interpreter exited while running the fragment ({}); \
                 the namespace was reset, only `{}` and `{}` are bound",
                exit, CONTEXT_VAR, HOOK_NAME
            )),
        })
    }

    /// Render the one-line metadata snapshot for the current state
    pub fn snapshot(&self) -> String {
        Snapshot {
            context: &self.context,
            final_set: self.final_value.is_some(),
            last_code: &self.last_code,
            stdout_tail: &self.stdout_tail,
            stderr_tail: &self.stderr_tail,
        }
        .render(&self.config.snapshot)
    }

    /// Rebind the Task Context, leaving every other binding alone
    pub async fn reset_context(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let kernel = self.kernel()?;
        kernel.send(&HostMessage::SetContext { text: &text }).await?;
        self.final_value = expect_ack(kernel.recv().await?)?;
        self.context = text;
        Ok(())
    }

    /// Clear the Answer Sentinel, leaving every other binding alone
    pub async fn reset_answer(&mut self) -> Result<()> {
        let kernel = self.kernel()?;
        kernel.send(&HostMessage::ResetAnswer).await?;
        self.final_value = expect_ack(kernel.recv().await?)?;
        Ok(())
    }

    /// `str()` of the Answer Sentinel after the last exchange; empty counts as unset
    pub fn final_value(&self) -> Option<&str> {
        self.final_value.as_deref()
    }

    /// `str()` of any binding
    pub async fn get_variable(&mut self, name: &str) -> Result<Option<String>> {
        let kernel = self.kernel()?;
        kernel.send(&HostMessage::Get { name }).await?;
        match kernel.recv().await? {
            KernelEvent::Value { found, value } => Ok(if found { value } else { None }),
            other => Err(unexpected_reply("value", other)),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Close the kernel and wait for it to exit
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.kernel.take() {
            Some(kernel) => kernel.shutdown().await,
            None => Ok(()),
        }
    }
}

async fn spawn_kernel(config: &KernelConfig, context: &str) -> Result<Kernel> {
    let init = HostMessage::Init {
        context_var: CONTEXT_VAR,
        context,
        answer_var: ANSWER_VAR,
        hook_name: HOOK_NAME,
    };
    Kernel::spawn(config, &init).await
}

fn expect_ack(event: KernelEvent) -> Result<Option<String>> {
    match event {
        KernelEvent::Ack { final_value } => Ok(final_value),
        other => Err(unexpected_reply("ack", other)),
    }
}

fn unexpected_reply(expected: &str, got: KernelEvent) -> Error {
    match got {
        KernelEvent::ProtocolError { message } => Error::kernel_protocol(message),
        other => Error::kernel_protocol(format!("expected {}, got {:?}", expected, other)),
    }
    .with_operation("environment::exchange")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    async fn start(context: &str, hook: Option<Arc<dyn SubTaskRunner>>) -> Option<ExecutionEnvironment> {
        match ExecutionEnvironment::start(context, EnvironmentConfig::default(), hook).await {
            Ok(env) => Some(env),
            Err(err) if err.kind() == ErrorKind::KernelUnavailable => {
                eprintln!("skipping: python3 unavailable ({})", err);
                None
            }
            Err(err) => panic!("unexpected start failure: {:?}", err),
        }
    }

    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubTaskRunner for Echo {
        async fn run_subtask(&self, prompt: String) -> std::result::Result<String, String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            if prompt == "fail" {
                Err("child exhausted".into())
            } else {
                Ok(prompt.to_uppercase())
            }
        }
    }

    #[tokio::test]
    async fn test_context_is_bound_and_output_captured() {
        let Some(mut env) = start("hello world", None).await else { return };
        let result = env.execute("print(len(context))").await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "11\n");
        assert_eq!(result.stdout_tail, "11\n");
        assert!(result.error.is_none());
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_becomes_data_with_partial_output() {
        let Some(mut env) = start("ctx", None).await else { return };
        let result = env
            .execute("print('before')\nimport sys\nprint('warn', file=sys.stderr)\n1 / 0")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.stdout, "before\n");
        assert_eq!(result.stderr, "warn\n");
        let error = result.error.unwrap();
        assert!(error.starts_with("ZeroDivisionError: division by zero"));
        assert!(error.contains("Traceback"));
        assert!(result.stderr_tail.contains("ZeroDivisionError"));
        assert!(env.snapshot().contains("ZeroDivisionError"));

        let exit = env.execute("raise SystemExit(2)").await.unwrap();
        assert!(!exit.success);
        assert!(exit.error.unwrap().starts_with("SystemExit: 2"));

        let after = env.execute("print('still alive')").await.unwrap();
        assert!(after.success);
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bindings_persist_and_resets_are_narrow() {
        let Some(mut env) = start("first", None).await else { return };
        env.execute("helper = lambda s: s[::-1]\nFINAL = 'done'").await.unwrap();
        assert_eq!(env.final_value(), Some("done"));
        assert!(env.snapshot().contains("final=set"));

        env.reset_context("second").await.unwrap();
        assert_eq!(env.context(), "second");
        assert_eq!(env.final_value(), Some("done"));
        let result = env.execute("print(helper(context))").await.unwrap();
        assert_eq!(result.stdout, "dnoces\n");

        env.reset_answer().await.unwrap();
        assert_eq!(env.final_value(), None);
        assert_eq!(env.get_variable(ANSWER_VAR).await.unwrap(), None);
        assert!(env.get_variable("helper").await.unwrap().is_some());
        assert_eq!(env.get_variable("context").await.unwrap().as_deref(), Some("second"));
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_answer_is_read_as_text_and_empty_is_unset() {
        let Some(mut env) = start("", None).await else { return };
        env.execute("FINAL = 4").await.unwrap();
        assert_eq!(env.final_value(), Some("4"));
        env.execute("FINAL = ''").await.unwrap();
        assert_eq!(env.final_value(), None);
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lone_surrogates_do_not_break_the_exchange() {
        let Some(mut env) = start("", None).await else { return };
        let result = env
            .execute("FINAL = 'ok'\nprint('\\ud800')\nname = b'\\xff'.decode('utf-8', 'surrogateescape')")
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stdout, "\\ud800\n");
        assert_eq!(env.final_value(), Some("ok"));

        let name = env.get_variable("name").await.unwrap();
        assert_eq!(name.as_deref(), Some("\\udcff"));

        let result = env.execute("print('still alive')").await.unwrap();
        assert_eq!(result.stdout, "still alive\n");
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fences_are_stripped_before_running() {
        let Some(mut env) = start("", None).await else { return };
        let result = env.execute("```python\nprint('fenced')\n```").await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "fenced\n");
        assert!(env.snapshot().contains("last_code_ran=\"print('fenced')\""));
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_hook_round_trip() {
        let echo = Arc::new(Echo { prompts: Mutex::new(Vec::new()) });
        let Some(mut env) = start("", Some(echo.clone())).await else { return };

        let result = env.execute("FINAL = sub_rlm('sub-task')").await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(env.final_value(), Some("SUB-TASK"));

        let caught = env
            .execute("try:\n    sub_rlm('fail')\nexcept RuntimeError as e:\n    print('caught', e)")
            .await
            .unwrap();
        assert_eq!(caught.stdout, "caught child exhausted\n");
        assert_eq!(*echo.prompts.lock().unwrap(), vec!["sub-task", "fail"]);
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_hook_raises_inside_fragment() {
        let Some(mut env) = start("", None).await else { return };
        let result = env.execute("sub_rlm('x')").await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("RuntimeError"));
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_crash_respawns_with_context() {
        let Some(mut env) = start("kept", None).await else { return };
        env.execute("x = 1").await.unwrap();

        let crash = env.execute("import os\nos._exit(7)").await.unwrap();
        assert!(!crash.success);
        assert!(crash.error.unwrap().contains("namespace was reset"));

        let result = env.execute("print(context, 'x' in globals())").await.unwrap();
        assert_eq!(result.stdout, "kept False\n");
        env.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_kernel_unavailable() {
        let config = EnvironmentConfig {
            kernel: KernelConfig { python: "definitely-not-a-python-binary".into() },
            ..Default::default()
        };
        let err = ExecutionEnvironment::start("", config, None).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::KernelUnavailable);
    }
}
