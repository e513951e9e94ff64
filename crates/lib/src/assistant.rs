//! Assistant invoker: run the external assistant CLI once per prompt.
//!
//! No shell is used; the prompt is passed as the final argument so it cannot be
//! interpreted as shell syntax. Output is read on separate tasks while the child
//! runs, and the whole run is bounded by a wall-clock timeout.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Reply used when the assistant exits cleanly without printing anything.
pub const NO_OUTPUT: &str = "(No output)";

/// Appended to a reply whose stdout went over [`MAX_OUTPUT_BYTES`].
pub const TRUNCATED_NOTICE: &str = "[output truncated]";

const READ_CHUNK_SIZE: usize = 8192;
/// Per-stream capture limit. Bytes past it are read and discarded so the child never blocks on a full pipe.
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;
/// How long to keep reading output after the child is gone. A grandchild that
/// inherited the pipes can otherwise hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The program could not be started (not found, not executable, bad working directory).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Non-zero exit with no usable stdout. Carries stderr, or a generic exit message.
    #[error("{0}")]
    Failed(String),
    #[error("assistant timed out after {0:?}")]
    Timeout(Duration),
    #[error("waiting for assistant: {0}")]
    Io(#[from] io::Error),
}

/// Something that turns a prompt into reply text.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, InvokeError>;
}

/// Runs `<command> <args...> --print --max-turns <n> <prompt>` in the working directory.
#[derive(Debug, Clone)]
pub struct CliAssistant {
    command: String,
    args: Vec<String>,
    max_turns: u32,
    timeout: Duration,
    working_dir: PathBuf,
}

impl CliAssistant {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            max_turns: 3,
            timeout: Duration::from_secs(300),
            working_dir: working_dir.into(),
        }
    }

    /// Build from a resolved config (env overrides already applied).
    pub fn from_config(config: &Config) -> Self {
        Self {
            command: config.assistant.command.clone(),
            args: config.assistant.args.clone(),
            max_turns: config.assistant.max_turns,
            timeout: config.assistant.timeout(),
            working_dir: config.relay.working_directory.clone(),
        }
    }

    /// Arguments placed before the fixed flags (e.g. `-c <script>` when the command is a shell).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Full argument list for one prompt.
    pub fn argv(&self, prompt: &str) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push("--print".to_string());
        argv.push("--max-turns".to_string());
        argv.push(self.max_turns.to_string());
        argv.push(prompt.to_string());
        argv
    }

    fn build_command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.argv(prompt))
            .current_dir(&self.working_dir)
            .env("NO_COLOR", "1")
            .env("FORCE_COLOR", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down tool subprocesses too.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl Assistant for CliAssistant {
    async fn invoke(&self, prompt: &str) -> Result<String, InvokeError> {
        let run_id = uuid::Uuid::new_v4();
        log::info!(
            "assistant run {}: starting {} in {} ({} chars of prompt)",
            run_id,
            self.command,
            self.working_dir.display(),
            prompt.chars().count()
        );
        let mut child = self.build_command(prompt).spawn().map_err(|source| {
            log::warn!("assistant run {}: spawn failed: {}", run_id, source);
            InvokeError::Spawn {
                program: self.command.clone(),
                source,
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr pipe was unexpectedly not available"))?;
        let stdout = Capture::spawn(stdout);
        let stderr = Capture::spawn(stderr);

        // Either the wait finishes or the deadline elapses; whichever wins decides the outcome.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                log::warn!(
                    "assistant run {}: no exit after {:?}, killing pid {:?}",
                    run_id,
                    self.timeout,
                    child.id()
                );
                kill_process_group(&child);
                if let Err(e) = child.kill().await {
                    log::warn!("assistant run {}: kill failed: {}", run_id, e);
                }
                tokio::join!(stdout.finish(DRAIN_GRACE), stderr.finish(DRAIN_GRACE));
                return Err(InvokeError::Timeout(self.timeout));
            }
        };

        let ((out, out_truncated), (err, _)) =
            tokio::join!(stdout.finish(DRAIN_GRACE), stderr.finish(DRAIN_GRACE));
        log::info!(
            "assistant run {}: exited with {} ({} bytes stdout, {} bytes stderr)",
            run_id,
            status,
            out.len(),
            err.len()
        );
        if !status.success() && !out.trim().is_empty() {
            log::warn!(
                "assistant run {}: non-zero exit but stdout present, using partial output",
                run_id
            );
        }
        let reply = settle(status.code(), &out, &err)?;
        if out_truncated {
            log::warn!(
                "assistant run {}: stdout over {} bytes, reply truncated",
                run_id,
                MAX_OUTPUT_BYTES
            );
            return Ok(format!("{}\n\n{}", reply, TRUNCATED_NOTICE));
        }
        Ok(reply)
    }
}

/// SIGKILL the child's whole process group (it leads one, see `build_command`).
#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            log::debug!("killpg {} failed: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &tokio::process::Child) {}

/// Map exit code and captured output to the invocation outcome.
///
/// Non-zero exit with non-empty stdout counts as success: partial assistant
/// output is still worth returning.
fn settle(code: Option<i32>, stdout: &str, stderr: &str) -> Result<String, InvokeError> {
    let out = stdout.trim();
    if code == Some(0) {
        return Ok(if out.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            out.to_string()
        });
    }
    if !out.is_empty() {
        return Ok(out.to_string());
    }
    let err = stderr.trim();
    if !err.is_empty() {
        return Err(InvokeError::Failed(err.to_string()));
    }
    Err(InvokeError::Failed(match code {
        Some(c) => format!("exited with code {}", c),
        None => "terminated by signal".to_string(),
    }))
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Output of one pipe, accumulated as it arrives.
struct Capture {
    buf: Arc<Mutex<Captured>>,
    task: JoinHandle<io::Result<()>>,
}

impl Capture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> Self {
        let buf = Arc::new(Mutex::new(Captured::default()));
        let task = tokio::spawn(read_into(reader, buf.clone(), MAX_OUTPUT_BYTES));
        Self { buf, task }
    }

    /// Wait (bounded by `grace`) for end of stream, then return what was read and
    /// whether it hit the capture limit.
    async fn finish(self, grace: Duration) -> (String, bool) {
        let Capture { buf, mut task } = self;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => log::debug!("assistant output read error: {}", e),
            Ok(Err(e)) => log::debug!("assistant output reader failed: {}", e),
            Err(_) => {
                log::warn!("assistant output still open after exit, abandoning reader");
                task.abort();
            }
        }
        let captured = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
        (
            String::from_utf8_lossy(&captured.bytes).into_owned(),
            captured.truncated,
        )
    }
}

async fn read_into<R: AsyncRead + Unpin>(
    mut reader: R,
    buf: Arc<Mutex<Captured>>,
    cap: usize,
) -> io::Result<()> {
    let mut tmp = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = buf.lock().unwrap_or_else(|e| e.into_inner());
        let room = cap.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&tmp[..n.min(room)]);
    }
}
