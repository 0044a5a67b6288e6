//! Host side of the Python kernel process
//!
//! The kernel reads one JSON object per line on stdin and answers one per line
//! on stdout. Everything a fragment prints is captured inside the kernel and
//! travels back inside `exec_result`.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::KernelConfig;
use crate::error::{kernel_gone, serialization_error, Error, Result};

const KERNEL_SOURCE: &str = include_str!("kernel.py");

/// Bytes of raw kernel stderr kept for crash reports
const STDERR_KEEP: usize = 4096;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum HostMessage<'a> {
    Init {
        context_var: &'a str,
        context: &'a str,
        answer_var: &'a str,
        hook_name: &'a str,
    },
    Exec {
        code: &'a str,
    },
    SetContext {
        text: &'a str,
    },
    ResetAnswer,
    Get {
        name: &'a str,
    },
    HookResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum KernelEvent {
    Ready,
    ExecResult {
        ok: bool,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, rename = "final")]
        final_value: Option<String>,
    },
    HookCall {
        prompt: String,
    },
    Ack {
        #[serde(default, rename = "final")]
        final_value: Option<String>,
    },
    Value {
        found: bool,
        #[serde(default)]
        value: Option<String>,
    },
    ProtocolError {
        message: String,
    },
}

pub(crate) struct Kernel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Arc<Mutex<String>>,
    stderr_task: JoinHandle<()>,
}

impl Kernel {
    /// Start the interpreter and wait until it has applied `init`.
    pub async fn spawn(config: &KernelConfig, init: &HostMessage<'_>) -> Result<Self> {
        let mut child = Command::new(&config.python)
            .arg("-u")
            .arg("-c")
            .arg(KERNEL_SOURCE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::kernel_unavailable(&config.python, format!("failed to spawn interpreter: {}", e))
                    .with_operation("kernel::spawn")
                    .set_source(e)
            })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                return Err(Error::kernel_unavailable(&config.python, "interpreter pipes unavailable")
                    .with_operation("kernel::spawn"))
            }
        };

        let buffer = Arc::new(Mutex::new(String::new()));
        let stderr_task = tokio::spawn(drain_stderr(stderr, buffer.clone()));

        let mut kernel = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr: buffer,
            stderr_task,
        };

        kernel.send(init).await?;
        let first = kernel.recv().await;
        match first {
            Ok(KernelEvent::Ready) => {
                debug!(pid = ?kernel.child.id(), "kernel ready");
                Ok(kernel)
            }
            Ok(other) => Err(Error::kernel_protocol(format!("expected ready, got {:?}", other))
                .with_operation("kernel::spawn")),
            Err(err) => {
                let exit = kernel.reap().await;
                Err(Error::kernel_unavailable(&config.python, "interpreter exited during startup")
                    .with_operation("kernel::spawn")
                    .with_context("exit", exit)
                    .set_source(err))
            }
        }
    }

    pub async fn send(&mut self, message: &HostMessage<'_>) -> Result<()> {
        let mut line = serde_json::to_string(message).map_err(serialization_error)?;
        line.push('\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| kernel_gone("kernel stdin already closed"))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::from(e).with_operation("kernel::send"))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::from(e).with_operation("kernel::send"))?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<KernelEvent> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| Error::from(e).with_operation("kernel::recv"))?
                .ok_or_else(|| kernel_gone("kernel closed its output"))?;

            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line).map_err(|e| {
                Error::kernel_protocol(format!("malformed kernel message: {}", e))
                    .with_operation("kernel::recv")
                    .with_context("line", line.chars().take(200).collect::<String>())
            });
        }
    }

    /// Raw stderr the interpreter wrote outside any fragment
    pub fn stderr_output(&self) -> String {
        self.stderr
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Kill the process if needed and describe how it ended.
    pub async fn reap(mut self) -> String {
        self.stdin.take();
        let _ = self.child.start_kill();
        let status = match self.child.wait().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("unknown exit ({})", e),
        };
        // The pipe closes with the process, so the drain finishes on its own.
        let _ = (&mut self.stderr_task).await;
        let stderr = self.stderr_output();
        if stderr.trim().is_empty() {
            status
        } else {
            format!("{}; stderr: {}", status, stderr.trim())
        }
    }

    /// Close stdin and wait for a clean exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stdin.take();
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::from(e).with_operation("kernel::shutdown"))?;
        debug!(%status, "kernel exited");
        self.stderr_task.abort();
        Ok(())
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr, buffer: Arc<Mutex<String>>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "rlm::kernel", "{}", line);
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.push_str(&line);
                    buffer.push('\n');
                    if buffer.len() > STDERR_KEEP {
                        let mut cut = buffer.len() - STDERR_KEEP;
                        while !buffer.is_char_boundary(cut) {
                            cut += 1;
                        }
                        buffer.drain(..cut);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "kernel stderr unreadable");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_messages_are_tagged() {
        let json = serde_json::to_value(HostMessage::Exec { code: "x = 1" }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "exec", "code": "x = 1"}));

        let json = serde_json::to_value(HostMessage::ResetAnswer).unwrap();
        assert_eq!(json, serde_json::json!({"type": "reset_answer"}));

        let json = serde_json::to_value(HostMessage::HookResult {
            ok: false,
            value: None,
            error: Some("boom".into()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "hook_result", "ok": false, "error": "boom"}));
    }

    #[test]
    fn test_kernel_events_parse() {
        let event: KernelEvent = serde_json::from_str(
            r#"{"type": "exec_result", "ok": true, "stdout": "4\n", "stderr": "", "error": null, "final": "4"}"#,
        )
        .unwrap();
        match event {
            KernelEvent::ExecResult { ok, stdout, final_value, .. } => {
                assert!(ok);
                assert_eq!(stdout, "4\n");
                assert_eq!(final_value.as_deref(), Some("4"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let event: KernelEvent = serde_json::from_str(r#"{"type": "hook_call", "prompt": "sub-task"}"#).unwrap();
        assert!(matches!(event, KernelEvent::HookCall { prompt } if prompt == "sub-task"));
    }
}
