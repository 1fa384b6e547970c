use crate::errors::{JobError, Result};
use crate::launcher::{self, Job, ToolConfig};
use crate::types::Pid;

use serde_json::Value;
use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::Mutex;

/// Result of one poll of a tracked job.
#[derive(Debug)]
pub enum PollOutcome {
    /// Still executing; carries only the newly drained increment.
    Running { output: String },
    /// Exited zero; carries the output drained by this final poll.
    Succeeded { output: String },
    /// Exited non-zero. The diagnostics are the tool's JSON report
    /// when its output parses as JSON, the raw text verbatim when it
    /// does not.
    Failed { diagnostics: Value },
}

/// In-memory table of live jobs, keyed by child pid.
///
/// A pid has an entry iff every poll so far has observed its process
/// running. The poll that first observes termination removes the entry
/// and reports the terminal outcome exactly once; any later poll for
/// that pid gets `UnknownProcess`, never a stale or duplicate result.
#[derive(Default)]
pub struct JobTable {
    jobs: Mutex<HashMap<Pid, Job>>,
}

enum Checked {
    Running(Vec<u8>),
    Exited(Job, ExitStatus),
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `source` and start one compiler process for it.
    ///
    /// On launch failure nothing is registered and the error is the
    /// caller's to surface.
    pub fn submit(&self, config: &ToolConfig, source: &str) -> Result<Pid> {
        let job = launcher::launch(config, source)?;
        let pid = job.pid();
        self.jobs.lock().unwrap().insert(pid, job);
        log::info!("started process {}", pid);
        Ok(pid)
    }

    /// Drain whatever output is buffered for `pid` and report its
    /// status, without ever waiting on the child.
    pub async fn poll(&self, pid: Pid) -> Result<PollOutcome> {
        let (mut job, status) = match self.check(pid)? {
            Checked::Running(drained) => {
                return Ok(PollOutcome::Running {
                    output: String::from_utf8_lossy(&drained).into_owned(),
                })
            }
            Checked::Exited(job, status) => (job, status),
        };

        // The entry is already gone, so a concurrent poll for this pid
        // sees UnknownProcess rather than a second terminal report.
        // `job` drops at the end of this function, deleting the
        // scratch file.
        let mut drained = Vec::new();
        job.drain_to_eof(&mut drained).await;
        let output = String::from_utf8_lossy(&drained).into_owned();
        log::info!("process {} finished with code {:?}", pid, status.code());
        if status.success() {
            Ok(PollOutcome::Succeeded { output })
        } else {
            let diagnostics = match serde_json::from_str(&output) {
                Ok(value) => value,
                Err(_) => {
                    log::error!("failure output is not JSON: {}", output);
                    Value::String(output)
                }
            };
            Ok(PollOutcome::Failed { diagnostics })
        }
    }

    /// One locked pass: check the exit status, drain buffered output,
    /// and remove the entry if the process has terminated.
    ///
    /// The status check comes first: if it fails, nothing has been
    /// drained yet, so the buffered increment stays in the channel for
    /// the next poll instead of being dropped. The terminal path skips
    /// the non-blocking drain entirely and leaves collection to
    /// `drain_to_eof`.
    fn check(&self, pid: Pid) -> Result<Checked> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&pid).ok_or(JobError::UnknownProcess)?;
        match job.try_wait()? {
            None => {
                let mut drained = Vec::new();
                job.drain_available(&mut drained);
                Ok(Checked::Running(drained))
            }
            Some(status) => {
                let job = jobs.remove(&pid).expect("entry present under lock");
                Ok(Checked::Exited(job, status))
            }
        }
    }

    /// Forget every live job, abandoning still-running children.
    /// Scratch files are deleted as the entries drop.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.is_empty() {
            log::info!("dropping {} unfinished job(s)", jobs.len());
        }
        jobs.clear();
    }

    #[cfg(test)]
    pub(crate) fn scratch_path(&self, pid: Pid) -> Option<std::path::PathBuf> {
        self.jobs
            .lock()
            .unwrap()
            .get(&pid)
            .map(|job| job.scratch_path().to_path_buf())
    }
}
