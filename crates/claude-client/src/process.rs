use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::types::{InvokeOptions, PermissionMode, ToolChoice, ToolSchema};
use crate::wire::StreamMessage;
use crate::{ClaudeClientError, Result};

/// Kill the child if stdout exceeds this without a terminal result.
pub(crate) const STDOUT_BYTE_CAP: usize = 32 * 1024 * 1024;
/// Only the tail of stderr is kept for error reporting.
const STDERR_TAIL_CAP: usize = 4096;
/// Wait after SIGTERM before escalating to SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

// ─── ClaudeProcess ────────────────────────────────────────────────────────

/// A running `claude --print --output-format stream-json` subprocess.
///
/// Reads one JSONL message per call to `next_message`; callers drive the
/// read loop. `EventStream` wraps this in an async `Stream`.
pub(crate) struct ClaudeProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_tail: Arc<Mutex<String>>,
    stderr_task: tokio::task::JoinHandle<()>,
    bytes_read: usize,
}

impl ClaudeProcess {
    /// Spawn the resolved binary, write the prompt to its stdin, and close
    /// the pipe so the CLI sees EOF.
    ///
    /// `CLAUDECODE` is removed from the environment so this works both from
    /// a terminal and from inside a running Claude session.
    pub(crate) async fn spawn(
        path: &std::path::Path,
        prompt: &str,
        opts: &InvokeOptions,
    ) -> Result<Self> {
        let mut cmd = build_command(path, opts);
        cmd.env_remove("CLAUDECODE");
        Self::from_command(cmd, Some(prompt)).await
    }

    /// Spawn an arbitrary command as a mock Claude process.
    /// Used in unit tests to inject a command that emits fixed JSON lines.
    #[cfg(test)]
    pub(crate) async fn spawn_command(cmd: Command, stdin: Option<&str>) -> Result<Self> {
        Self::from_command(cmd, stdin).await
    }

    async fn from_command(mut cmd: Command, stdin: Option<&str>) -> Result<Self> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(ClaudeClientError::Io)?;

        if let Some(prompt) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // The child may exit before reading the whole prompt; a
                // broken pipe here is not an error.
                match pipe.write_all(prompt.as_bytes()).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(ClaudeClientError::Io(e)),
                }
                drop(pipe);
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeClientError::Process("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClaudeClientError::Process("stderr not captured".into()))?;

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        let tail = stderr_tail.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut buf = tail.lock().expect("stderr tail lock");
                buf.push_str(&line);
                buf.push('\n');
                if buf.len() > STDERR_TAIL_CAP {
                    let cut = buf.len() - STDERR_TAIL_CAP;
                    buf.drain(..cut);
                }
            }
        });

        let lines = BufReader::new(stdout).lines();
        Ok(ClaudeProcess {
            child,
            lines,
            stderr_tail,
            stderr_task,
            bytes_read: 0,
        })
    }

    /// Read the next non-empty JSONL line from stdout and deserialize it.
    ///
    /// Returns `Ok(None)` on EOF (process exited).
    pub(crate) async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        loop {
            match self.lines.next_line().await {
                Err(e) => return Err(ClaudeClientError::Io(e)),
                Ok(None) => return Ok(None),
                Ok(Some(line)) => {
                    self.bytes_read += line.len() + 1;
                    if self.bytes_read > STDOUT_BYTE_CAP {
                        return Err(ClaudeClientError::OutputCapExceeded {
                            limit_bytes: STDOUT_BYTE_CAP,
                        });
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return serde_json::from_str(trimmed).map(Some).map_err(|e| {
                        ClaudeClientError::Parse {
                            line: trimmed.to_owned(),
                            source: e,
                        }
                    });
                }
            }
        }
    }

    /// Wait for a natural exit.
    pub(crate) async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(ClaudeClientError::Io)
    }

    /// The captured stderr tail (at most 4 KiB). Waits briefly for the
    /// drain task so output written just before exit is included.
    pub(crate) async fn stderr_tail(&mut self) -> String {
        let _ = tokio::time::timeout(Duration::from_millis(250), &mut self.stderr_task).await;
        self.stderr_tail
            .lock()
            .expect("stderr tail lock")
            .trim_end()
            .to_string()
    }

    /// Terminate the child: SIGTERM, a 2 s grace period, then SIGKILL.
    /// Best-effort; errors are logged and ignored.
    pub(crate) async fn shutdown(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    if tokio::time::timeout(KILL_GRACE, self.child.wait())
                        .await
                        .is_ok()
                    {
                        return;
                    }
                    tracing::warn!(pid, "claude subprocess ignored SIGTERM, killing");
                }
            }
        }
        let _ = self.child.kill().await;
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(path: &std::path::Path, opts: &InvokeOptions) -> Command {
    let mut cmd = Command::new(path);

    // Non-interactive streaming mode, partial chunks included so text is
    // delivered as it is generated.
    cmd.arg("--print")
        .arg("--output-format")
        .arg("stream-json")
        .arg("--include-partial-messages");

    cmd.arg("--model").arg(&opts.model);
    cmd.arg("--max-turns").arg(opts.max_turns.to_string());

    if opts.permission_mode != PermissionMode::Default {
        cmd.arg("--permission-mode")
            .arg(opts.permission_mode.as_str());
    }

    if let Some(sp) = &opts.system_prompt {
        cmd.arg("--system-prompt").arg(sp);
    }

    // Client-side tools are advertised through the system prompt; the CLI
    // has no flag for foreign function schemas.
    if let Some(block) = tools_prompt(&opts.tools, &opts.tool_choice) {
        cmd.arg("--append-system-prompt").arg(block);
    }

    if let Some(resume) = &opts.resume_session_id {
        cmd.arg("--resume").arg(resume);
    }

    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }

    for (k, v) in &opts.env_overrides {
        cmd.env(k, v);
    }

    if opts.max_thinking_tokens > 0 {
        cmd.env("MAX_THINKING_TOKENS", opts.max_thinking_tokens.to_string());
    }

    cmd
}

/// Render advertised tool schemas as a system-prompt block.
///
/// Returns `None` when there is nothing to advertise (no tools, or the
/// caller forbade tool use).
fn tools_prompt(tools: &[ToolSchema], choice: &ToolChoice) -> Option<String> {
    if tools.is_empty() || *choice == ToolChoice::None {
        return None;
    }

    let selected: Vec<&ToolSchema> = match choice {
        ToolChoice::Function(name) => tools.iter().filter(|t| &t.name == name).collect(),
        _ => tools.iter().collect(),
    };
    if selected.is_empty() {
        return None;
    }

    let mut block = String::from(
        "# Client-executed functions\n\n\
         The caller executes these functions on its side. To call one, emit a \
         tool_use block with the function name and JSON arguments matching \
         its schema, then stop.\n",
    );
    for tool in &selected {
        block.push_str(&format!("\n## {}\n", tool.name));
        if let Some(desc) = &tool.description {
            block.push_str(&format!("{desc}\n"));
        }
        block.push_str(&format!("Arguments (JSON Schema): {}\n", tool.parameters));
    }
    if let ToolChoice::Function(name) = choice {
        block.push_str(&format!(
            "\nYou MUST respond by calling the function `{name}`.\n"
        ));
    }
    Some(block)
}

// ─── Tests ────────────────────────────────────────────────────────────────
