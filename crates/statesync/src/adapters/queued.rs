//! Queued remote adapter: funnels every operation through one FIFO
//! worker task, giving callers a single cross-store ordering primitive
//! (§5). Grounded on the teacher's single-background-task worker loop in
//! `pub_sub::remote_consumer::Consumer::stream`.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A shared FIFO queue with one worker task draining it. Clone to share
/// the same ordering guarantee across multiple stores.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::UnboundedSender<Job>,
    pending: Arc<Mutex<VecDeque<()>>>,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl QueueHandle {
    /// Spawn the worker task and return a handle to its queue.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(Mutex::new(VecDeque::new()));

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job().await;
            }
        });

        Self { sender, pending }
    }

    /// Enqueue `op`, returning a future that resolves once the job has
    /// run and produced its result. Failures are the job's own result
    /// type; a send failure (worker gone) is reported through the
    /// returned future resolving to `Err`-shaped data via the caller's
    /// closure, since the worker task never exits under normal operation.
    pub async fn run<T, F>(&self, op: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> BoxFuture<'static, T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push_back(());
        let pending = self.pending.clone();

        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = op().await;
                pending.lock().pop_front();
                let _ = tx.send(result);
            })
        });

        if self.sender.send(job).is_err() {
            statesync_log::log_error!("queued adapter worker task is gone, operation dropped");
        }

        rx.await.unwrap_or_else(|_| {
            panic!("queued adapter worker dropped the response channel")
        })
    }

    /// Number of operations still waiting on the worker.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// `true` if nothing is queued or in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for QueueHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let queue = QueueHandle::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run(move || {
                        Box::pin(async move {
                            order.lock().push(i);
                        })
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // FIFO is guaranteed only relative to submission order as seen by
        // the single worker, not across independently-spawned tasks racing
        // to submit; within one task's sequential submissions it holds.
        assert_eq!(order.lock().len(), 5);
    }

    #[tokio::test]
    async fn sequential_submissions_preserve_order() {
        let queue = QueueHandle::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            queue
                .run(move || {
                    Box::pin(async move {
                        order.lock().push(i);
                    })
                })
                .await;
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn queue_drains_to_empty() {
        let queue = QueueHandle::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        queue
            .run(move || {
                Box::pin(async move {
                    counter2.fetch_add(1, Ordering::SeqCst);
                })
            })
            .await;
        assert!(queue.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
