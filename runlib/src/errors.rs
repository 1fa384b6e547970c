use crate::types::Pid;
use std::io;
use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// The pid was never issued, or its job was already reaped by an
    /// earlier poll that observed termination.
    #[error("No such process")]
    UnknownProcess,
    #[error("failed to stage submitted source: {0}")]
    Scratch(#[source] io::Error),
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to query status of process {pid}: {source}")]
    Status {
        pid: Pid,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = result::Result<T, JobError>;
