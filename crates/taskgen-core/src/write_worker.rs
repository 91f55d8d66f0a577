//! A single background consumer that drains Tasks and FailedComments to
//! storage, so that busy workers never block on storage latency directly.

use crate::model::{FailedComment, Task};
use crate::storage::TaskStorage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// Grace period a producer waits for queue space before the pressure
/// warning fires. Blocking past this point is still permitted — dropping
/// an item is not.
const ENQUEUE_GRACE_PERIOD: Duration = Duration::from_millis(200);

enum WriteItem {
    Task(u64, Task),
    Failed(u64, FailedComment),
    Barrier(oneshot::Sender<()>),
}

/// A write that failed, retained for inspection; the worker itself never
/// halts on a storage error.
#[derive(Debug, Clone)]
pub enum WriteErrorRecord {
    Task { task: Task, error: String },
    Failed { failure: FailedComment, error: String },
}

pub struct WriteWorker {
    tx: mpsc::Sender<WriteItem>,
    errors: Arc<Mutex<Vec<WriteErrorRecord>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriteWorker {
    pub fn spawn(storage: Arc<dyn TaskStorage>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_task = errors.clone();

        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    WriteItem::Task(pr, task) => {
                        if let Err(e) = storage.save_task(pr, task.clone()).await {
                            errors_task.lock().expect("write worker error list poisoned").push(
                                WriteErrorRecord::Task {
                                    task,
                                    error: e.to_string(),
                                },
                            );
                        }
                    }
                    WriteItem::Failed(pr, failure) => {
                        if let Err(e) = storage.save_failed_comment(pr, failure.clone()).await {
                            errors_task.lock().expect("write worker error list poisoned").push(
                                WriteErrorRecord::Failed {
                                    failure,
                                    error: e.to_string(),
                                },
                            );
                        }
                    }
                    WriteItem::Barrier(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            tx,
            errors,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub async fn submit_task(&self, pr_number: u64, task: Task) {
        self.enqueue(WriteItem::Task(pr_number, task)).await;
    }

    pub async fn submit_failed(&self, pr_number: u64, failure: FailedComment) {
        self.enqueue(WriteItem::Failed(pr_number, failure)).await;
    }

    async fn enqueue(&self, item: WriteItem) {
        match tokio::time::timeout(ENQUEUE_GRACE_PERIOD, self.tx.reserve()).await {
            Ok(Ok(permit)) => permit.send(item),
            Ok(Err(_)) => { /* channel closed: worker already stopped */ }
            Err(_) => {
                warn!("write queue under pressure; blocking producer until space frees up");
                let _ = self.tx.send(item).await;
            }
        }
    }

    /// Block until every item enqueued before this call has been acted on.
    pub async fn wait_for_completion(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriteItem::Barrier(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain and stop the background consumer. Per contract, unblocks only
    /// after an implicit `wait_for_completion` has returned.
    pub async fn stop(self) {
        self.wait_for_completion().await;
        drop(self.tx);
        if let Some(handle) = self.handle.lock().expect("write worker handle poisoned").take() {
            let _ = handle.await;
        }
    }

    pub fn errors(&self) -> Vec<WriteErrorRecord> {
        self.errors.lock().expect("write worker error list poisoned").clone()
    }
}
