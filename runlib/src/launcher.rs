use crate::errors::{JobError, Result};
use crate::types::{OutputBlob, Pid};

use bytes::BytesMut;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Immutable description of the external compiler, supplied by the
/// surrounding application at startup.
#[derive(Clone, Debug)]
pub struct ToolConfig {
    pub binary: PathBuf,
    pub module_paths: PathBuf,
    /// Pass `--diagnostics-format=json` so failures come back as a
    /// machine-readable report.
    pub json_diagnostics: bool,
}

impl ToolConfig {
    pub fn new(binary: impl Into<PathBuf>, module_paths: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            module_paths: module_paths.into(),
            json_diagnostics: true,
        }
    }
}

/// One tracked in-flight execution of the external tool.
///
/// Owns the child process, the merged output channel, and the scratch
/// file holding the submitted source. Dropping the Job deletes the
/// scratch file, on every exit path.
pub struct Job {
    pid: Pid,
    child: Child,
    output: mpsc::UnboundedReceiver<OutputBlob>,
    scratch: NamedTempFile,
}

/// Stage `source` into a scratch file and start one compiler process
/// for it, with stdout and stderr captured into a single channel.
///
/// Must be called from within a tokio runtime.
pub fn launch(config: &ToolConfig, source: &str) -> Result<Job> {
    let mut scratch = tempfile::Builder::new()
        .suffix(".ic")
        .tempfile()
        .map_err(JobError::Scratch)?;
    scratch
        .write_all(source.as_bytes())
        .and_then(|_| scratch.flush())
        .map_err(JobError::Scratch)?;

    // stdbuf launches fine even when the compiler is gone, so check
    // the binary up front; a dead path must fail the submission
    // without registering anything.
    if !config.binary.is_file() {
        return Err(JobError::Launch {
            program: config.binary.display().to_string(),
            source: io::ErrorKind::NotFound.into(),
        });
    }

    // The compiler block-buffers its stdout on a pipe. stdbuf's
    // line-buffering environment carries through the exec chain, so
    // output reaches the readers between polls instead of all at exit.
    let mut command = Command::new("stdbuf");
    command.arg("-oL").arg(&config.binary);
    command.arg("--module-paths").arg(&config.module_paths);
    if config.json_diagnostics {
        command.arg("--diagnostics-format=json");
    }
    let mut child = command
        .arg(scratch.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| JobError::Launch {
            program: config.binary.display().to_string(),
            source,
        })?;
    let pid = child.id().expect("pid of freshly spawned child");

    // Both streams feed the same channel; it closes once both readers
    // hit EOF, which happens promptly after the child exits.
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        pipe_output(stdout, output_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        pipe_output(stderr, output_tx);
    }

    Ok(Job {
        pid,
        child,
        output: output_rx,
        scratch,
    })
}

fn pipe_output<R>(mut stream: R, tx: mpsc::UnboundedSender<OutputBlob>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            match stream.read_buf(&mut buf).await {
                Ok(n) if n > 0 => {
                    // move the bytes out of buf and into a message
                    let _ = tx.send(buf.split().freeze());
                }
                _ => {
                    break;
                }
            }
        }
    });
}

impl Job {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Non-blocking check of the child's exit status.
    pub(crate) fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|source| JobError::Status {
            pid: self.pid,
            source,
        })
    }

    /// Everything the reader tasks have buffered so far. Never waits
    /// for the child; an empty result is normal.
    pub(crate) fn drain_available(&mut self, buf: &mut Vec<u8>) {
        while let Ok(blob) = self.output.try_recv() {
            buf.extend_from_slice(&blob);
        }
    }

    /// Collect the output tail once the child has exited. The channel
    /// closes when both streams hit EOF; the per-receive timeout keeps
    /// a poll bounded if a grandchild inherited the pipes.
    pub(crate) async fn drain_to_eof(&mut self, buf: &mut Vec<u8>) {
        loop {
            match timeout(Duration::from_millis(50), self.output.recv()).await {
                Ok(Some(blob)) => buf.extend_from_slice(&blob),
                Ok(None) | Err(_) => break,
            }
        }
    }
}
