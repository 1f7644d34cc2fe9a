//! The durable job queue contract. A production deployment would back this
//! with a SQL table shaped like the teacher's `internal.tasks` (dequeue via
//! `FOR UPDATE SKIP LOCKED`, heartbeat-based lease expiry); [`MemoryQueue`]
//! is the in-process reference implementation used by tests and by the
//! default build.

use crate::JobId;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A job handed to the server for polling, with its decoded state and lease.
pub struct LeasedJob {
    pub job_id: JobId,
    pub state: serde_json::Value,
}

#[derive(Clone)]
struct Entry {
    state: serde_json::Value,
    wake_at: Option<Instant>,
    leased: bool,
    last_heartbeat: Option<Instant>,
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job if absent, or wakes it immediately if already present
    /// but not currently leased (re-entrant PUT/PATCH/DELETE on the same
    /// resourceID while a prior job is suspended).
    async fn enqueue(&self, job_id: JobId, initial_state: serde_json::Value);

    /// Dequeues up to `limit` jobs that are ready (wake_at elapsed) and not
    /// currently leased, or whose lease has expired (heartbeat older than
    /// `heartbeat_timeout`). Marks each as leased.
    async fn dequeue_ready(&self, limit: usize, heartbeat_timeout: Duration) -> Vec<LeasedJob>;

    async fn heartbeat(&self, job_id: &JobId);

    /// Removes the job entirely (terminal `Done`).
    async fn complete(&self, job_id: &JobId);

    /// Persists `state` and reschedules the job to wake after `delay`,
    /// releasing its lease.
    async fn sleep(&self, job_id: &JobId, state: serde_json::Value, delay: Duration);

    /// Persists `state` and suspends the job until [`JobQueue::enqueue`] is
    /// called again for the same id, releasing its lease.
    async fn suspend(&self, job_id: &JobId, state: serde_json::Value);

    /// True if any job is present with this id (leased or not) — used to
    /// test spec §8 invariant 6 (at-most-one-in-flight).
    async fn contains(&self, job_id: &JobId) -> bool;
}

#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<HashMap<JobId, Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job_id: JobId, initial_state: serde_json::Value) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(job_id)
            .and_modify(|e| {
                if !e.leased {
                    e.wake_at = Some(Instant::now());
                }
            })
            .or_insert(Entry {
                state: initial_state,
                wake_at: Some(Instant::now()),
                leased: false,
                last_heartbeat: None,
            });
    }

    async fn dequeue_ready(&self, limit: usize, heartbeat_timeout: Duration) -> Vec<LeasedJob> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let mut ready: Vec<JobId> = entries
            .iter()
            .filter(|(_, e)| {
                let wake_ready = e.wake_at.is_some_and(|w| w <= now);
                let lease_expired = e.leased
                    && e.last_heartbeat
                        .is_some_and(|hb| now.duration_since(hb) > heartbeat_timeout);
                (!e.leased && wake_ready) || lease_expired
            })
            .map(|(id, _)| id.clone())
            .collect();
        ready.truncate(limit);

        ready
            .into_iter()
            .map(|job_id| {
                let e = entries.get_mut(&job_id).unwrap();
                e.leased = true;
                e.last_heartbeat = Some(now);
                LeasedJob {
                    job_id: job_id.clone(),
                    state: e.state.clone(),
                }
            })
            .collect()
    }

    async fn heartbeat(&self, job_id: &JobId) {
        if let Some(e) = self.entries.lock().await.get_mut(job_id) {
            e.last_heartbeat = Some(Instant::now());
        }
    }

    async fn complete(&self, job_id: &JobId) {
        self.entries.lock().await.remove(job_id);
    }

    async fn sleep(&self, job_id: &JobId, state: serde_json::Value, delay: Duration) {
        if let Some(e) = self.entries.lock().await.get_mut(job_id) {
            e.state = state;
            e.wake_at = Some(Instant::now() + delay);
            e.leased = false;
            e.last_heartbeat = None;
        }
    }

    async fn suspend(&self, job_id: &JobId, state: serde_json::Value) {
        if let Some(e) = self.entries.lock().await.get_mut(job_id) {
            e.state = state;
            e.wake_at = None;
            e.leased = false;
            e.last_heartbeat = None;
        }
    }

    async fn contains(&self, job_id: &JobId) -> bool {
        self.entries.lock().await.contains_key(job_id)
    }
}
