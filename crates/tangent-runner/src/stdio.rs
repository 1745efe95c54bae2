//! The stdio runner: executes a local script or program under a generated
//! wrapper shell script (`spec.md` §4.D).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use tangent_domain::config::RunnerSecurityType;
use tangent_domain::{Error, Result};

use crate::writer::{OutputStream, OutputWriter};
use crate::{RunArgs, RunContext, Runner};

/// Runtimes the stdio runner knows how to invoke a script under. `Binary`
/// means the script itself is the executable — no interpreter is
/// prepended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Bash,
    Python,
    Node,
    Npx,
    Npm,
    Binary,
}

impl Runtime {
    fn interpreter_key(&self) -> Option<&'static str> {
        match self {
            Runtime::Bash => Some("bash"),
            Runtime::Python => Some("python"),
            Runtime::Node => Some("node"),
            Runtime::Npx => Some("npx"),
            Runtime::Npm => Some("npm"),
            Runtime::Binary => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(rename = "type")]
    pub kind: RunnerSecurityType,
}

/// Per-skill configuration carried in the skill's `RunnerRef.config` map
/// (`spec.md` §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioRunnerConfig {
    pub runtime: Runtime,
    pub script: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub security: SecurityConfig,
}

/// Join `rel` onto `base` and reject the result if it would escape `base`
/// (`spec.md` §4.D step 1).
fn clean_join(base: &Path, rel: &str) -> Result<PathBuf> {
    let joined = base.join(rel);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    if !normalized.starts_with(base) {
        return Err(Error::ExecutionFailed(format!(
            "script path escapes script directory: {rel}"
        )));
    }
    Ok(normalized)
}

/// Single-quote a string for embedding in a shell command line.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub struct StdioRunner {
    id: String,
    config: StdioRunnerConfig,
    script_dir: PathBuf,
    scratch_root: PathBuf,
    interpreters: HashMap<String, String>,
    kill_grace: Duration,
    writers: RwLock<Vec<Arc<dyn OutputWriter>>>,
}

impl StdioRunner {
    pub fn new(
        id: impl Into<String>,
        config: StdioRunnerConfig,
        script_dir: PathBuf,
        runner_config: &tangent_domain::config::RunnerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            script_dir,
            scratch_root: PathBuf::from(&runner_config.scratch_root),
            interpreters: runner_config.interpreters.clone(),
            kill_grace: Duration::from_millis(runner_config.kill_grace_ms),
            writers: RwLock::new(Vec::new()),
        }
    }

    fn resolve_interpreter(&self) -> Result<Option<String>> {
        match self.config.runtime.interpreter_key() {
            None => Ok(None),
            Some(key) => self
                .interpreters
                .get(key)
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    Error::ExecutionFailed(format!("no interpreter configured for runtime {key}"))
                }),
        }
    }

    fn wrapper_script_body(&self, script_path: &Path, interpreter: Option<&str>, args_json: &str) -> String {
        let quoted_args = shell_quote(args_json);
        let quoted_script = shell_quote(&script_path.to_string_lossy());
        let command = match interpreter {
            Some(bin) => format!("exec {} {} {}", shell_quote(bin), quoted_script, quoted_args),
            None => format!("exec {} {}", quoted_script, quoted_args),
        };
        format!("#!/bin/bash\nset -euo pipefail\n{command}\n")
    }
}

#[async_trait]
impl Runner for StdioRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn add_writers(&self, mut writers: Vec<Arc<dyn OutputWriter>>) {
        self.writers.write().append(&mut writers);
    }

    async fn run(&self, ctx: RunContext, args: RunArgs) -> Result<()> {
        let script_path = clean_join(&self.script_dir, &self.config.script)?;
        tokio::fs::metadata(&script_path)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("script not found: {e}")))?;

        let scratch_dir = self.scratch_root.join(&ctx.session_id);
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to create scratch dir: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&scratch_dir, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| Error::ExecutionFailed(format!("failed to chmod scratch dir: {e}")))?;
        }

        let args_json = serde_json::to_string(&args)
            .map_err(|e| Error::ExecutionFailed(format!("failed to encode run args: {e}")))?;
        let interpreter = self.resolve_interpreter()?;
        let wrapper_body = self.wrapper_script_body(&script_path, interpreter.as_deref(), &args_json);
        let wrapper_path = scratch_dir.join("wrapper.sh");
        tokio::fs::write(&wrapper_path, wrapper_body)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to write wrapper script: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&wrapper_path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| Error::ExecutionFailed(format!("failed to chmod wrapper script: {e}")))?;
        }

        let mut cmd = Command::new("/bin/bash");
        cmd.arg(&wrapper_path);
        cmd.current_dir(&scratch_dir);
        cmd.env("HOME", &scratch_dir);
        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ExecutionFailed(format!("failed to spawn runner: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let writers = self.writers.read().clone();
        let stderr_tail = Arc::new(parking_lot::Mutex::new(String::new()));

        let stdout_task = tokio::spawn(fan_out_lines(stdout, OutputStream::Stdout, writers.clone(), None));
        let stderr_task = tokio::spawn(fan_out_lines(
            stderr,
            OutputStream::Stderr,
            writers,
            Some(stderr_tail.clone()),
        ));

        tracing::debug!(
            session_id = %ctx.session_id,
            invocation_id = %ctx.invocation_id,
            runner_id = %self.id,
            "stdio runner started"
        );
        let started = Instant::now();

        let exit_status = tokio::select! {
            result = child.wait() => {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                result.map_err(|e| Error::ExecutionFailed(format!("wait failed: {e}")))?
            }
            _ = ctx.cancellation.cancelled() => {
                let _ = child.start_kill();
                let wait = tokio::time::timeout(self.kill_grace, child.wait()).await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                match wait {
                    Ok(Ok(status)) => status,
                    _ => {
                        return Err(Error::ExecutionFailed("runner did not exit within the kill grace period".into()));
                    }
                }
            }
        };

        tracing::debug!(
            session_id = %ctx.session_id,
            invocation_id = %ctx.invocation_id,
            runner_id = %self.id,
            exit_code = ?exit_status.code(),
            duration_ms = started.elapsed().as_millis() as u64,
            "stdio runner completed"
        );

        if !exit_status.success() {
            let excerpt = stderr_tail.lock().clone();
            return Err(Error::ExecutionFailed(format!(
                "runner exited with code {:?}: {excerpt}",
                exit_status.code()
            )));
        }

        Ok(())
    }
}

/// Read lines from `pipe`, writing each to every writer concurrently, and
/// optionally keeping a bounded tail for error reporting.
async fn fan_out_lines<R: tokio::io::AsyncRead + Unpin>(
    pipe: Option<R>,
    stream: OutputStream,
    writers: Vec<Arc<dyn OutputWriter>>,
    tail: Option<Arc<parking_lot::Mutex<String>>>,
) {
    const TAIL_MAX_CHARS: usize = 4096;
    let Some(pipe) = pipe else { return };
    let mut reader = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(tail) = &tail {
            let mut t = tail.lock();
            t.push_str(&line);
            t.push('\n');
            if t.len() > TAIL_MAX_CHARS {
                let drop = t.len() - TAIL_MAX_CHARS;
                t.drain(..drop);
            }
        }
        let sends = writers.iter().map(|w| w.write_line(stream, &line));
        futures_util::future::join_all(sends).await;
    }
}
