//! # Failure Recovery
//!
//! Detection of dead workers and stalled jobs, retry-with-backoff decisions
//! and startup recovery of jobs left incomplete by a previous run.

pub mod backoff;
pub mod events;
pub mod manager;

pub use backoff::BackoffPolicy;
pub use events::{RecoveryEvent, RequeueReply};
pub use manager::{
    FailureOutcome, FailureRecoveryManager, RecoveryReport, RecoveryStats, REASON_CIRCUIT_OPEN,
    REASON_JOB_TIMEOUT, REASON_RETRIES_EXHAUSTED, REASON_WORKER_FAILED,
};
