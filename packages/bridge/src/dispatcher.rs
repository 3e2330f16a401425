//! Bounded worker pool executing blocking driver calls.
//!
//! Callers never touch the blocking driver from their own task. Every
//! driver call is boxed into a job, queued on a flume channel, and executed
//! by one of a fixed set of worker OS threads. The result travels back into
//! the caller's async context over a oneshot channel.
//!
//! Backpressure: with a bounded queue, submission fails fast with
//! [`SqlError::Overloaded`] once the queue is full. It never blocks the
//! issuing task. Workers drain whatever is queued and exit when the last
//! handle to the dispatcher is dropped.

use std::thread;

use tokio::sync::oneshot;

use crate::SqlError;

type Job = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_QUEUE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker threads executing blocking calls
    pub workers: usize,
    /// Maximum queued jobs before submissions fail fast; `None` queues
    /// without bound
    pub queue_capacity: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(4, usize::from),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
        }
    }
}

pub struct Dispatcher {
    sender: flume::Sender<Job>,
    workers: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers)
            .field("queued", &self.sender.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// # Panics
    ///
    /// * If the OS refuses to spawn a worker thread
    #[must_use]
    pub fn new(config: &DispatcherConfig) -> Self {
        let (sender, receiver) = config
            .queue_capacity
            .map_or_else(flume::unbounded, flume::bounded);

        let workers = config.workers.max(1);

        for index in 0..workers {
            let receiver: flume::Receiver<Job> = receiver.clone();
            thread::Builder::new()
                .name(format!("sqlbridge-worker-{index}"))
                .spawn(move || {
                    log::trace!("worker {index} started");
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                    log::trace!("worker {index} stopped");
                })
                .expect("Failed to spawn dispatcher worker thread");
        }

        Self { sender, workers }
    }

    /// Queue one blocking job, returning a receiver for its result.
    ///
    /// # Errors
    ///
    /// * `Overloaded` if the queue is full or the pool has shut down
    pub fn submit<T, F>(&self, job: F) -> Result<oneshot::Receiver<T>, SqlError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let boxed: Job = Box::new(move || {
            // The receiver may have been dropped; nothing to deliver to then
            drop(tx.send(job()));
        });

        self.sender.try_send(boxed).map_err(|e| {
            match e {
                flume::TrySendError::Full(_) => log::debug!("submit: queue full"),
                flume::TrySendError::Disconnected(_) => log::error!("submit: workers gone"),
            }
            SqlError::Overloaded
        })?;

        Ok(rx)
    }
}
