//! A fixed-size pool of long-lived workers pulling jobs from one shared
//! queue. Deliberately NOT a goroutine-per-job-plus-semaphore design: the
//! kernel-level subprocess footprint this pool produces is bounded exactly
//! by `worker_count`, regardless of how many jobs are queued.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Emitted after each completed job. Tick policy: every job when
/// `total <= 10`, otherwise every 5th job plus the final one.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTick {
    pub completed: usize,
    pub total: usize,
}

fn should_tick(completed: usize, total: usize) -> bool {
    total <= 10 || completed % 5 == 0 || completed == total
}

pub struct PoolHandles<R> {
    pub results: mpsc::Receiver<R>,
    pub progress: mpsc::Receiver<ProgressTick>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl<R> PoolHandles<R> {
    /// Wait for every worker task to exit. Callers should drain `results`
    /// (and optionally `progress`) concurrently with this to avoid
    /// deadlocking on a full channel.
    pub async fn join(self) {
        for handle in self.workers {
            if let Err(e) = handle.await {
                debug!(error = %e, "worker task panicked");
            }
        }
    }
}

/// Spawn `worker_count` long-lived workers draining `jobs` through
/// `process`. `cancel` is a shared watch channel: setting it to `true`
/// aborts all workers, which propagate the same receiver into `process` so
/// an in-flight AI invocation can be cut short.
pub fn spawn<J, R, F, Fut>(
    jobs: Vec<J>,
    worker_count: usize,
    cancel: watch::Receiver<bool>,
    process: F,
) -> PoolHandles<R>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J, watch::Receiver<bool>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = jobs.len();
    let worker_count = worker_count.max(1);

    let (job_tx, job_rx) = async_channel::bounded::<J>(total.max(1));
    for job in jobs {
        // Capacity is sized to `total` up front, so this never blocks or drops.
        let _ = job_tx.try_send(job);
    }
    job_tx.close();

    let (result_tx, result_rx) = mpsc::channel(worker_count);
    let (progress_tx, progress_rx) = mpsc::channel(worker_count.max(1));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let progress_tx = progress_tx.clone();
        let process = process.clone();
        let completed = completed.clone();
        let cancel = cancel.clone();
        workers.push(tokio::spawn(worker_loop(
            id, job_rx, result_tx, progress_tx, completed, total, cancel, process,
        )));
    }
    // Drop the pool's own senders so the channels close once every worker's
    // clone has been dropped, i.e. once every worker has exited.
    drop(result_tx);
    drop(progress_tx);
    drop(job_rx);

    PoolHandles {
        results: result_rx,
        progress: progress_rx,
        workers,
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<J, R, F, Fut>(
    id: usize,
    job_rx: async_channel::Receiver<J>,
    result_tx: mpsc::Sender<R>,
    progress_tx: mpsc::Sender<ProgressTick>,
    completed: Arc<AtomicUsize>,
    total: usize,
    mut cancel: watch::Receiver<bool>,
    process: F,
) where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J, watch::Receiver<bool>) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
{
    loop {
        if *cancel.borrow() {
            debug!(worker = id, "worker exiting: cancelled");
            break;
        }

        let job = tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            job = job_rx.recv() => job,
        };

        let job = match job {
            Ok(job) => job,
            Err(_) => break, // queue drained and closed
        };

        let result = process(job, cancel.clone()).await;
        if result_tx.send(result).await.is_err() {
            break;
        }

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if should_tick(done, total) {
            let _ = progress_tx.send(ProgressTick { completed: done, total }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn processes_every_job_exactly_once() {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let jobs: Vec<u32> = (0..20).collect();
        let mut handles = spawn(jobs, 4, cancel_rx, |job, _cancel| async move { job * 2 });

        let mut seen = Vec::new();
        while let Some(r) = handles.results.recv().await {
            seen.push(r);
        }
        handles.join().await;

        seen.sort();
        let expected: Vec<u32> = (0..20).map(|n| n * 2).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn tick_policy_fires_every_job_under_eleven() {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let jobs: Vec<u32> = (0..5).collect();
        let mut handles = spawn(jobs, 2, cancel_rx, |job, _cancel| async move { job });

        let mut ticks = Vec::new();
        while let Some(r) = handles.results.recv().await {
            let _ = r;
        }
        while let Ok(t) = handles.progress.try_recv() {
            ticks.push(t);
        }
        handles.join().await;
        assert_eq!(ticks.len(), 5);
    }

    #[tokio::test]
    async fn cancellation_stops_workers_before_queue_drains() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let jobs: Vec<u32> = (0..100).collect();
        let mut handles = spawn(jobs, 2, cancel_rx, |job, mut cancel| async move {
            // Simulate a slow in-flight invocation that checks cancellation.
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                _ = cancel.changed() => {}
            }
            job
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel_tx.send(true).unwrap();

        let mut count = 0;
        while handles.results.recv().await.is_some() {
            count += 1;
        }
        handles.join().await;
        assert!(count < 100);
    }
}
