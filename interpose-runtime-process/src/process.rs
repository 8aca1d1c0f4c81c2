//! One OS process per invocation.

use async_trait::async_trait;
use interpose_types::{CallContext, Completion, ModuleRuntime, RawOutput, RuntimeError, RuntimeKind};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

/// Bytes of stderr kept as the diagnostic of a failed module.
const DIAGNOSTIC_LIMIT: u64 = 4 * 1024;

/// Runs a module as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ProcessRuntime {
    /// A runtime that executes `program` with no arguments.
    ///
    /// The child's environment is cleared, so `program` should be an
    /// absolute path unless `PATH` is set with [`ProcessRuntime::env`].
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Expose one environment variable to the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run the child in `dir`.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The program this runtime executes.
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, ctx: &CallContext) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
            if let Some(bytes) = ctx.limits.memory_bytes {
                // SAFETY: the hook only calls setrlimit, which is
                // async-signal-safe, and touches no shared state.
                unsafe {
                    cmd.pre_exec(move || limit_address_space(bytes));
                }
            }
        }
        #[cfg(not(unix))]
        {
            if ctx.limits.memory_bytes.is_some() {
                tracing::warn!(program = %self.program.display(), "interpose.process.memory_cap_unsupported");
            }
        }

        cmd
    }
}

#[async_trait]
impl ModuleRuntime for ProcessRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Process
    }

    async fn call(&self, input: Vec<u8>, ctx: &CallContext) -> Result<RawOutput, RuntimeError> {
        let mut child = self
            .command(ctx)
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {e}", self.program.display())))?;
        let _group = GroupKill(child.id());

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(RuntimeError::Cancelled),
            result = drive(&mut child, input, ctx.limits.max_output_bytes) => result,
        };

        match outcome {
            Ok(raw) => Ok(raw),
            Err(e) => {
                kill_and_reap(&mut child, ctx.grace).await;
                Err(e)
            }
        }
    }
}

/// Kills the child's process group when dropped.
///
/// Covers every way `call` can end: success, abnormal exit, error, and the
/// call future being dropped mid-flight. Descendants the module left
/// behind die with the group even after the leader has been reaped.
#[cfg_attr(not(unix), allow(dead_code))]
struct GroupKill(Option<u32>);

impl Drop for GroupKill {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.0 {
                // SAFETY: plain syscall; ESRCH for an empty group is ignored.
                unsafe {
                    libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
                }
            }
        }
    }
}

/// Feed stdin, collect stdout and stderr, and wait for exit.
async fn drive(child: &mut Child, input: Vec<u8>, limit: usize) -> Result<RawOutput, RuntimeError> {
    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RuntimeError::Spawn("child stdout not captured".into()))?;
    let stderr = child.stderr.take();

    let write = async move {
        if let Some(mut stdin) = stdin {
            // A module may exit without reading its input.
            match stdin.write_all(&input).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }
        Ok::<_, RuntimeError>(())
    };

    let ((), stdout, diagnostic) = tokio::try_join!(
        write,
        read_capped(stdout, limit),
        read_diagnostic(stderr)
    )?;
    let status = child.wait().await?;

    if status.success() {
        return Ok(RawOutput::success(stdout));
    }

    let diagnostic = if diagnostic.is_empty() {
        format!("module {status}")
    } else {
        diagnostic
    };
    Ok(RawOutput {
        completion: Completion::Abnormal { diagnostic },
        stdout,
    })
}

/// Read to EOF, failing as soon as more than `limit` bytes arrive.
async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> Result<Vec<u8>, RuntimeError> {
    let mut buf = Vec::new();
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(RuntimeError::OutputTooLarge { limit });
    }
    Ok(buf)
}

/// Keep the head of stderr and discard the rest so the child never blocks.
async fn read_diagnostic<R: AsyncRead + Unpin>(reader: Option<R>) -> Result<String, RuntimeError> {
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };
    let mut head = Vec::new();
    (&mut reader).take(DIAGNOSTIC_LIMIT).read_to_end(&mut head).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(String::from_utf8_lossy(&head).trim().to_string())
}

/// Kill the child (and its process group on Unix) and wait for it to exit.
async fn kill_and_reap(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // The child leads its own group; take any descendants down with it.
            // SAFETY: plain syscall on a pid we have not reaped yet.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "interpose.process.kill_failed");
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        tracing::warn!(
            pid = ?child.id(),
            grace_ms = grace.as_millis() as u64,
            "interpose.process.reap_timeout"
        );
    }
}

#[cfg(unix)]
fn limit_address_space(bytes: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit for the duration of the call.
    if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
