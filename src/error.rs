// src/error.rs
use thiserror::Error;

use crate::status::JobStatus;

/// Payload validation failures. Client-correctable; produced before any
/// other component is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FastaError {
    #[error("fasta payload is empty")]
    EmptyPayload,
    #[error("line {0}: expected a '>' header before sequence data")]
    MissingHeader(usize),
    #[error("found empty sequence for record '{0}'")]
    EmptySequence(String),
    #[error("line {line}: invalid character '{ch}' in sequence")]
    InvalidCharacter { line: usize, ch: char },
}

/// Metadata store failures. `NotFound` on `get` is not an error; see
/// [`crate::store::GetOutcome`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    AlreadyExists(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
    #[error("completed_at supplied for non-terminal target {0}")]
    InvalidTimestamp(JobStatus),
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Malformed queue envelope; treated as a poison message at the queue
/// boundary rather than a mid-pipeline panic.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message envelope is missing a job_id")]
    MissingJobId,
    #[error("message envelope job_id '{0}' is not a valid job id")]
    UnsafeJobId(String),
    #[error("message envelope for job {0} carries no payload")]
    EmptyPayload(String),
}

/// Failures of the external compute step.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("search i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("search tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },
    #[error("search exceeded the {0}s deadline")]
    Timeout(u64),
}

/// Submission outcomes that are not a fresh or existing record.
/// Duplicate submission is deliberately absent: it is a success path.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid fasta payload: {0}")]
    Validation(#[from] FastaError),
    #[error("failed to publish job {0} to the queue")]
    BrokerRejected(String),
    #[error(transparent)]
    BrokerUnavailable(#[from] BrokerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
