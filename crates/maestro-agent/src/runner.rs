//! Subprocess-backed agent turn execution.
//!
//! The assistant CLI is invoked with its working directory set to the turn's
//! workspace. The system prompt travels in `MAESTRO_SYSTEM_PROMPT`, a model
//! override in `MAESTRO_MODEL`, and the input text on stdin; structured
//! events stream back on stdout (JSON or plain mode, see
//! [`crate::parser::EventParser`]).
//!
//! Cancellation delivers an interrupt, waits out a grace period, then
//! terminates. A soft wall-clock timeout injects the same sequence and maps
//! to `SubprocessTimeout`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use maestro_core::MaestroError;
use maestro_core::text::tail_str;
use maestro_credentials::{AMBIENT_KEY_VAR, CredentialMode};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::events::CliEvent;
use crate::mcp::{self, McpEndpoint};
use crate::parser::EventParser;
use crate::prompt::{build_system_prompt, resolve_tool_policy};
use crate::turn::{ToolInvocation, ToolOutcome, TurnRequest, TurnResult};

/// Default soft wall-clock timeout per turn.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// Default grace period between interrupt and terminate.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// Maximum stderr bytes retained for error reporting.
const STDERR_CAP: usize = 8 * 1024;

/// Stderr tail bytes carried into `AgentFailed`.
const STDERR_TAIL: usize = 512;

/// Issues agent turns against the external assistant CLI.
#[derive(Clone, Debug)]
pub struct CliAgentRunner {
    cli_command: String,
    cli_args: Vec<String>,
    mcp: Option<McpEndpoint>,
    turn_timeout: Duration,
    interrupt_grace: Duration,
}

enum ReadOutcome {
    Eof,
    Cancelled,
    TimedOut,
}

impl CliAgentRunner {
    /// Runner invoking `cli_command` with `cli_args` for each turn.
    #[must_use]
    pub fn new(cli_command: impl Into<String>, cli_args: Vec<String>) -> Self {
        Self {
            cli_command: cli_command.into(),
            cli_args,
            mcp: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
        }
    }

    /// Point tool-enabled turns at an MCP endpoint.
    #[must_use]
    pub fn with_mcp(mut self, endpoint: McpEndpoint) -> Self {
        self.mcp = Some(endpoint);
        self
    }

    /// Override the per-turn wall-clock timeout.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Override the interrupt grace period.
    #[must_use]
    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    /// Run one agent turn to completion.
    #[instrument(skip_all, fields(agent = %req.agent.name))]
    pub async fn run_turn(&self, req: TurnRequest) -> Result<TurnResult, MaestroError> {
        let start = Instant::now();
        let tools_enabled = resolve_tool_policy(&req.agent);
        let system_prompt = build_system_prompt(&req.agent, tools_enabled, req.instruction.as_ref());

        if tools_enabled {
            if let (Some(workspace), Some(endpoint)) = (&req.workspace, &self.mcp) {
                let _ = mcp::write_config(workspace, endpoint).await?;
            }
        }

        let mut cmd = Command::new(&self.cli_command);
        let _ = cmd
            .args(&self.cli_args)
            .env("MAESTRO_SYSTEM_PROMPT", &system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workspace) = &req.workspace {
            let _ = cmd.current_dir(workspace);
        }
        if let Some(model) = &req.agent.model {
            let _ = cmd.env("MAESTRO_MODEL", model);
        }
        if let CredentialMode::ApiKey(key) = &req.credentials {
            let _ = cmd.env(AMBIENT_KEY_VAR, key);
        }

        let mut child = cmd.spawn().map_err(|e| MaestroError::AgentFailed {
            agent_name: req.agent.name.clone(),
            exit_code: -1,
            stderr_tail: format!("spawn failed: {e}"),
        })?;

        // Deliver the input and close stdin so the CLI sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(req.input.as_bytes()).await {
                warn!(error = %e, "stdin write failed");
            }
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MaestroError::Internal("child stdout missing".into()))?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut collected = Vec::with_capacity(1024);
            if let Some(mut stderr) = stderr {
                let mut buf = [0_u8; 1024];
                while let Ok(n) = stderr.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    if collected.len() < STDERR_CAP {
                        collected.extend_from_slice(&buf[..n]);
                    }
                }
            }
            String::from_utf8_lossy(&collected).into_owned()
        });

        let mut parser = EventParser::new();
        let mut result = TurnResult::default();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let deadline = tokio::time::sleep(self.turn_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            line.clear();
            tokio::select! {
                biased;
                () = req.cancel.cancelled() => break ReadOutcome::Cancelled,
                () = &mut deadline => break ReadOutcome::TimedOut,
                read = reader.read_line(&mut line) => match read {
                    Ok(0) => break ReadOutcome::Eof,
                    Ok(_) => {
                        for event in parser.feed(&line) {
                            apply_event(&mut result, event, req.events.as_ref());
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdout read failed");
                        break ReadOutcome::Eof;
                    }
                },
            }
        };

        match outcome {
            ReadOutcome::Cancelled => {
                debug!("turn cancelled; interrupting subprocess");
                self.interrupt_and_reap(&mut child).await;
                Err(MaestroError::Cancelled)
            }
            ReadOutcome::TimedOut => {
                warn!(timeout_secs = self.turn_timeout.as_secs(), "turn timed out");
                self.interrupt_and_reap(&mut child).await;
                Err(MaestroError::SubprocessTimeout {
                    timeout_secs: self.turn_timeout.as_secs(),
                })
            }
            ReadOutcome::Eof => {
                if let Some(event) = parser.flush() {
                    apply_event(&mut result, event, req.events.as_ref());
                }
                let status = child
                    .wait()
                    .await
                    .map_err(|e| MaestroError::Internal(format!("wait failed: {e}")))?;
                let stderr = stderr_task.await.unwrap_or_default();
                result.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                if !status.success() && result.text.is_empty() {
                    return Err(MaestroError::AgentFailed {
                        agent_name: req.agent.name.clone(),
                        exit_code: status.code().unwrap_or(-1),
                        stderr_tail: tail_str(&stderr, STDERR_TAIL).to_owned(),
                    });
                }
                debug!(
                    tokens = result.tokens,
                    tool_calls = result.tool_calls.len(),
                    elapsed_ms = result.elapsed_ms,
                    "turn complete"
                );
                Ok(result)
            }
        }
    }

    /// Interrupt the subprocess, wait out the grace period, then terminate.
    async fn interrupt_and_reap(&self, child: &mut Child) {
        send_interrupt(child);
        let reaped = tokio::time::timeout(self.interrupt_grace, child.wait()).await;
        if reaped.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) {}

fn apply_event(
    result: &mut TurnResult,
    event: CliEvent,
    forward: Option<&mpsc::UnboundedSender<CliEvent>>,
) {
    if let Some(tx) = forward {
        let _ = tx.send(event.clone());
    }
    match event {
        CliEvent::Text { text } => result.text.push_str(&text),
        CliEvent::ToolCall { name, arguments } => {
            result.tool_calls.push(ToolInvocation { name, arguments });
        }
        CliEvent::ToolResult { name, payload } => {
            result.tool_results.push(ToolOutcome { name, payload });
        }
        CliEvent::Usage {
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
            cost_usd,
        } => {
            result.tokens +=
                input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens;
            result.cost_usd += cost_usd;
        }
        CliEvent::Error { message } => {
            warn!(message, "cli reported error");
        }
        CliEvent::SystemNote { message } => {
            debug!(message, "parser note");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
