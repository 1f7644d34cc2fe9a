//! The polling loop: semaphore-gated concurrency, per-job heartbeats racing
//! the executor's own progress, and jittered idle sleep — the same shape as
//! the teacher's `automations::server::serve`, minus the coroutine-based
//! dequeue stream (a plain loop suffices without task spawn/send fan-out).

use crate::queue::JobQueue;
use crate::{Executor, JobId, PollOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Server<E: Executor, Q: JobQueue + 'static> {
    executor: Arc<E>,
    queue: Arc<Q>,
}

impl<E: Executor, Q: JobQueue + 'static> Server<E, Q> {
    pub fn new(executor: E, queue: Arc<Q>) -> Self {
        Self {
            executor: Arc::new(executor),
            queue,
        }
    }

    /// Serves jobs until `shutdown` resolves, then awaits in-flight jobs to
    /// finish their current poll before returning.
    pub async fn serve(
        self,
        permits: usize,
        dequeue_interval: Duration,
        heartbeat_timeout: Duration,
        shutdown: impl std::future::Future<Output = ()>,
    ) {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(permits));
        let cancel = CancellationToken::new();
        tokio::pin!(shutdown);

        loop {
            let available = semaphore.available_permits();
            if available == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                    () = &mut shutdown => break,
                }
                continue;
            }

            let leased = tokio::select! {
                leased = self.queue.dequeue_ready(available, heartbeat_timeout) => leased,
                () = &mut shutdown => break,
            };
            if leased.is_empty() {
                let jitter = 0.9 + rand::random::<f64>() * 0.2;
                tokio::select! {
                    _ = tokio::time::sleep(dequeue_interval.mul_f64(jitter)) => {}
                    () = &mut shutdown => break,
                }
                continue;
            }

            for job in leased {
                let permit = semaphore.clone().acquire_owned().await.unwrap();
                let executor = self.executor.clone();
                let queue = self.queue.clone();
                let cancel = cancel.clone();
                let heartbeat_timeout = heartbeat_timeout;

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(err) =
                        run_one(executor, queue.as_ref(), job, heartbeat_timeout, &cancel).await
                    {
                        tracing::warn!(?err, "job executor failed; will be retried after heartbeat timeout");
                    }
                });
            }
        }

        cancel.cancel();
        tracing::info!("job polling loop stopped; awaiting in-flight jobs");
        let _ = semaphore.acquire_many_owned(permits as u32).await.unwrap();
    }
}

async fn run_one<E: Executor, Q: JobQueue>(
    executor: Arc<E>,
    queue: &Q,
    job: crate::queue::LeasedJob,
    heartbeat_timeout: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let crate::queue::LeasedJob { job_id, state } = job;

    let mut decoded: E::State = if state.is_null() {
        E::State::default()
    } else {
        serde_json::from_value(state)?
    };

    let mut heartbeats = tokio::time::interval(heartbeat_timeout / 2);
    heartbeats.tick().await; // discard immediate first tick

    let poll_fut = executor.poll(&job_id, &mut decoded, cancel);
    tokio::pin!(poll_fut);

    let outcome = loop {
        tokio::select! {
            outcome = &mut poll_fut => break outcome,
            _ = heartbeats.tick() => {
                queue.heartbeat(&job_id).await;
            }
        }
    }?;

    let encoded = serde_json::to_value(&decoded)?;
    match outcome {
        PollOutcome::Done => queue.complete(&job_id).await,
        PollOutcome::Sleep(delay) => queue.sleep(&job_id, encoded, delay).await,
        PollOutcome::Suspend => queue.suspend(&job_id, encoded).await,
    }
    Ok(())
}

pub fn job_id(resource_id: &str) -> JobId {
    resource_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        polls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Executor for CountingExecutor {
        type State = usize;

        async fn poll(
            &self,
            _job_id: &JobId,
            state: &mut Self::State,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<PollOutcome> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            *state += 1;
            if *state >= 3 {
                Ok(PollOutcome::Done)
            } else {
                Ok(PollOutcome::Sleep(Duration::from_millis(1)))
            }
        }
    }

    #[tokio::test]
    async fn job_runs_to_completion() {
        let queue = Arc::new(MemoryQueue::new());
        queue.enqueue("r0".into(), serde_json::json!(0)).await;

        let polls = Arc::new(AtomicUsize::new(0));
        let server = Server::new(
            CountingExecutor {
                polls: polls.clone(),
            },
            queue.clone(),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(server.serve(4, Duration::from_millis(1), Duration::from_secs(5), async {
            let _ = rx.await;
        }));

        // Give the loop time to drain the job to completion.
        for _ in 0..200 {
            if !queue.contains(&"r0".to_string()).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!queue.contains(&"r0".to_string()).await);
        assert!(polls.load(Ordering::SeqCst) >= 3);

        let _ = tx.send(());
        let _ = handle.await;
    }
}
