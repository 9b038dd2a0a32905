//! Bounded task queue with priorities
//!
//! Runs at most K jobs at a time, sized to stay under external API rate
//! limits. Pending jobs start highest-priority first, FIFO among equals;
//! completion order is unconstrained. A failed or panicking job settles its
//! own handle and leaves siblings untouched. Must be used from within a
//! tokio runtime.

use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::{oneshot, Notify};

type BoxedJob<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Error type for jobs that never produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The job panicked while running
    #[error("task '{label}' panicked: {message}")]
    Panicked { label: String, message: String },
    /// The queue dropped the job before it could settle
    #[error("task '{label}' was lost before completion")]
    Lost { label: String },
}

/// Awaitable handle for one enqueued job.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: String,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// The observability label the job was enqueued with.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the job's result.
    pub async fn join(self) -> Result<T, TaskError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Lost { label: self.label }),
        }
    }
}

struct QueuedTask<T> {
    priority: u8,
    seq: u64,
    label: String,
    job: BoxedJob<T>,
    done: oneshot::Sender<Result<T, TaskError>>,
}

// Heap order: higher priority first, then lower sequence number (FIFO).
// Only the ordering key takes part in comparisons.
impl<T> PartialEq for QueuedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for QueuedTask<T> {}

impl<T> PartialOrd for QueuedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueuedTask<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner<T> {
    pending: BinaryHeap<QueuedTask<T>>,
    running: usize,
    next_seq: u64,
}

/// A concurrency-limited priority queue for asynchronous jobs.
pub struct TaskQueue<T> {
    concurrency: usize,
    inner: Arc<Mutex<Inner<T>>>,
    settled: Arc<Notify>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            concurrency: self.concurrency,
            inner: Arc::clone(&self.inner),
            settled: Arc::clone(&self.settled),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create a queue running at most `concurrency` jobs at a time.
    /// A ceiling of zero is clamped to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            inner: Arc::new(Mutex::new(Inner {
                pending: BinaryHeap::new(),
                running: 0,
                next_seq: 0,
            })),
            settled: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a job. Returns a handle that resolves with the job's output;
    /// the label is for observability only.
    pub fn add<F>(&self, label: &str, priority: u8, job: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        {
            let mut inner = lock(&self.inner);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.push(QueuedTask {
                priority,
                seq,
                label: label.to_string(),
                job: Box::pin(job),
                done,
            });
        }
        Self::pump(self.concurrency, &self.inner, &self.settled);
        TaskHandle {
            label: label.to_string(),
            rx,
        }
    }

    /// Number of jobs waiting to start.
    pub fn pending(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        lock(&self.inner).running
    }

    /// Wait until no job is running or pending.
    pub async fn idle(&self) {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            // Register before checking so a completion between the check
            // and the await cannot be missed
            settled.as_mut().enable();
            {
                let inner = lock(&self.inner);
                if inner.running == 0 && inner.pending.is_empty() {
                    return;
                }
            }
            settled.await;
        }
    }

    /// Start pending jobs while capacity allows.
    fn pump(concurrency: usize, inner: &Arc<Mutex<Inner<T>>>, settled: &Arc<Notify>) {
        loop {
            let task = {
                let mut guard = lock(inner);
                if guard.running >= concurrency {
                    return;
                }
                match guard.pending.pop() {
                    Some(task) => {
                        guard.running += 1;
                        task
                    }
                    None => return,
                }
            };

            let inner = Arc::clone(inner);
            let settled = Arc::clone(settled);
            tokio::spawn(async move {
                let QueuedTask {
                    label, job, done, ..
                } = task;
                // Run the job as its own task so a panic is contained and
                // surfaces through the JoinError
                let outcome = match tokio::spawn(job).await {
                    Ok(value) => Ok(value),
                    Err(err) => Err(TaskError::Panicked {
                        label,
                        message: err.to_string(),
                    }),
                };
                let _ = done.send(outcome);

                lock(&inner).running -= 1;
                settled.notify_waiters();
                Self::pump(concurrency, &inner, &settled);
            });
        }
    }
}

/// Poison-proof lock: a panicked job cannot wedge the queue.
fn lock<T>(inner: &Arc<Mutex<Inner<T>>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
