//! A generic, durable-queue-backed job executor framework (spec §4.5.1,
//! §4.5.8, §5), adapted from the teacher's `automations` crate.
//!
//! The teacher's original framework supports task hierarchies (`Spawn` /
//! `Send` / `Yield` between parent and child tasks), because Flow's
//! publication/evolution jobs fan out into sub-tasks. Portable-resource jobs
//! never spawn children, so [`PollOutcome`] here is narrower than the
//! teacher's `Action` enum — this is a deliberate simplification, not an
//! oversight.

pub mod queue;
pub mod server;

/// Jobs are keyed by the target resource's URI, which is how spec §5's
/// "at most one in-flight async job per resourceID" is enforced: the queue's
/// lease contract guarantees only one lease is outstanding per key at a time.
pub type JobId = String;

/// The result of one `Executor::poll` call.
#[derive(Debug)]
pub enum PollOutcome {
    /// Sleep for at-most the given duration, then poll again.
    Sleep(std::time::Duration),
    /// Suspend the job until explicitly woken (e.g. spec §4.5.8's
    /// crash-recovery resume, or a cancellation request).
    Suspend,
    /// The job is complete and is removed from the queue.
    Done,
}

/// The core trait implemented by executors of a particular job kind (one per
/// verb: put, patch, delete — spec §4.5.1).
#[async_trait::async_trait]
pub trait Executor: Send + Sync + 'static {
    type State: Default + serde::de::DeserializeOwned + serde::Serialize + Send;

    /// Advances the job by one step. Implementations MUST be idempotent
    /// (spec §4.5.8: "handlers MUST be idempotent") since a poll may be
    /// retried after a crash that occurred after a prior poll's side effect
    /// but before its state was persisted.
    async fn poll(
        &self,
        job_id: &JobId,
        state: &mut Self::State,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<PollOutcome>;
}
