//! A concurrent job executor built on a fixed pool of worker threads.
//!
//! Work arrives over a crossbeam channel and is picked up by whichever worker
//! is free; submission order is FIFO, completion order is not deterministic.
//! Three submission surfaces exist:
//!
//! - [`Executor::execute`] - fire and forget.
//! - [`Executor::spawn`] - returns a [`JobFuture`] receipt the caller can
//!   block on (or poll) for the job's result.
//! - [`Executor::scope`] - borrows non-`'static` data into jobs and blocks
//!   until every job spawned in the scope has finished.
//!
//! # Panic propagation
//!
//! A panicking scoped job does not kill its worker thread. The panic payload
//! is captured, the worker moves on, and the payload is re-raised on the
//! thread waiting for the scope to finish. Frame execution treats a panic in
//! any system as fatal, so it has to surface on the calling thread rather
//! than silently shrinking the pool.

use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};
use crossbeam::sync::WaitGroup;

type Work = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Work),
    Shutdown,
}

/// A fixed pool of worker threads consuming jobs from a shared channel.
pub struct Executor {
    sender: Sender<Message>,
    workers: Vec<Worker>,
}

struct Worker {
    handle: Option<thread::JoinHandle<()>>,
}

impl Executor {
    /// Create an executor with the given number of worker threads.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool size must be greater than 0");

        let (sender, receiver) = unbounded();
        let workers = (0..size).map(|id| Worker::new(id, receiver.clone())).collect();

        Executor { sender, workers }
    }

    /// Create an executor with a single worker thread.
    pub fn single_threaded() -> Self {
        Self::new(1)
    }

    /// The number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Submit a job with no result. Jobs are dequeued in FIFO order.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Message::Run(Box::new(f))).unwrap();
    }

    /// Post a job and get a receipt that resolves to its result.
    pub fn spawn<F, T>(&self, f: F) -> JobFuture<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam::channel::bounded(1);

        self.execute(move || {
            let _ = tx.send(f());
        });

        JobFuture { receiver: rx }
    }

    /// Block until every receipt has resolved, collecting the results in
    /// submission order.
    pub fn complete<T, I>(&self, futures: I) -> Result<Vec<T>, JobError>
    where
        I: IntoIterator<Item = JobFuture<T>>,
    {
        futures.into_iter().map(JobFuture::wait).collect()
    }

    /// Run a batch of jobs that may borrow from the caller's environment.
    ///
    /// Every job spawned through the [`Scope`] is guaranteed to have finished
    /// by the time this returns. If any job panicked, the first captured
    /// panic is re-raised here once the whole batch has drained.
    pub fn scope<'env, F, R>(&'env self, f: F) -> R
    where
        F: FnOnce(&Scope<'env>) -> R,
    {
        let panics = Arc::new(Mutex::new(None));
        let wait = WaitGroup::new();

        let scope = Scope {
            executor: self,
            wait: wait.clone(),
            panics: Arc::clone(&panics),
            _env: PhantomData,
        };

        let result = f(&scope);

        // The scope's own WaitGroup handle drops here; `wait` then blocks
        // until every job's clone has dropped too, panicked or not.
        drop(scope);
        wait.wait();

        if let Some(payload) = panics.lock().unwrap().take() {
            resume_unwind(payload);
        }
        result
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for _ in &self.workers {
            self.sender.send(Message::Shutdown).unwrap();
        }

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                handle.join().unwrap();
            }
        }
    }
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Message>) -> Self {
        let handle = thread::Builder::new()
            .name(format!("helix-worker-{id}"))
            .spawn(move || {
                loop {
                    match receiver.recv() {
                        Ok(Message::Run(work)) => work(),
                        Ok(Message::Shutdown) | Err(_) => break,
                    }
                }
            })
            .unwrap();

        Worker { handle: Some(handle) }
    }
}

/// A scope for jobs that borrow non-`'static` data.
///
/// Created by [`Executor::scope`]; all jobs spawned here complete before the
/// scope call returns.
pub struct Scope<'env> {
    executor: &'env Executor,
    wait: WaitGroup,
    panics: Arc<Mutex<Option<Box<dyn std::any::Any + Send>>>>,
    _env: PhantomData<std::cell::Cell<&'env ()>>,
}

impl<'env> Scope<'env> {
    /// Spawn a job that may borrow from the environment.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'env,
    {
        let wait = self.wait.clone();
        let panics = Arc::clone(&self.panics);

        let work: Box<dyn FnOnce() + Send + 'env> = Box::new(move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
                let mut slot = panics.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(payload);
                }
            }
            drop(wait);
        });

        // Safety: the closure's borrows live for 'env. `Executor::scope`
        // blocks on the WaitGroup until this job has run (or panicked and
        // been captured) before returning, so the erased lifetime can never
        // outlive the data it borrows.
        let work: Work = unsafe { std::mem::transmute(work) };
        self.executor.sender.send(Message::Run(work)).unwrap();
    }
}

/// A receipt for a posted job. Blocks on [`wait`](JobFuture::wait) or polls
/// with [`try_wait`](JobFuture::try_wait).
pub struct JobFuture<T> {
    receiver: Receiver<T>,
}

impl<T> JobFuture<T> {
    /// Block until the job completes and return its result.
    pub fn wait(self) -> Result<T, JobError> {
        self.receiver.recv().map_err(|_| JobError::Lost)
    }

    /// Check for the result without blocking. `Ok(None)` means the job has
    /// not finished yet.
    pub fn try_wait(&self) -> Result<Option<T>, JobError> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(crossbeam::channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam::channel::TryRecvError::Disconnected) => Err(JobError::Lost),
        }
    }
}

/// Error type for job receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// The job's result can no longer arrive (the executor was dropped or
    /// the job panicked before sending).
    Lost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn executes_posted_jobs() {
        // Given
        let executor = Executor::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        // When
        let futures: Vec<_> = (0..10)
            .map(|_| {
                let counter = Arc::clone(&counter);
                executor.spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        executor.complete(futures).unwrap();

        // Then
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn spawn_returns_result() {
        // Given
        let executor = Executor::new(2);

        // When
        let future = executor.spawn(|| 42);

        // Then
        assert_eq!(future.wait().unwrap(), 42);
    }

    #[test]
    fn complete_preserves_submission_order() {
        // Given
        let executor = Executor::new(4);

        // When
        let futures: Vec<_> = (0..10).map(|i| executor.spawn(move || i * 2)).collect();
        let results = executor.complete(futures).unwrap();

        // Then
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn try_wait_polls_without_blocking() {
        // Given
        let executor = Executor::new(1);
        let future = executor.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            7
        });

        // Then - not ready immediately
        assert_eq!(future.try_wait().unwrap(), None);

        // When
        thread::sleep(Duration::from_millis(200));

        // Then
        assert_eq!(future.try_wait().unwrap(), Some(7));
    }

    #[test]
    fn scope_borrows_environment() {
        // Given
        let executor = Executor::new(4);
        let mut data = vec![1, 2, 3, 4];

        // When
        executor.scope(|s| {
            for item in &mut data {
                s.spawn(move || {
                    *item *= 2;
                });
            }
        });

        // Then - all jobs completed before scope returned
        assert_eq!(data, vec![2, 4, 6, 8]);
    }

    #[test]
    fn scope_waits_for_slow_jobs() {
        // Given
        let executor = Executor::new(1);
        let completed = Arc::new(AtomicUsize::new(0));

        // When
        executor.scope(|s| {
            for _ in 0..5 {
                let completed = Arc::clone(&completed);
                s.spawn(move || {
                    thread::sleep(Duration::from_millis(10));
                    completed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        // Then
        assert_eq!(completed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn scope_propagates_panics() {
        // Given
        let executor = Executor::new(2);
        let survivors = Arc::new(AtomicUsize::new(0));

        // When
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            executor.scope(|s| {
                s.spawn(|| panic!("system failure"));
                let survivors = Arc::clone(&survivors);
                s.spawn(move || {
                    survivors.fetch_add(1, Ordering::SeqCst);
                });
            });
        }));

        // Then - the panic surfaced on the caller, the sibling still ran
        assert!(outcome.is_err());
        assert_eq!(survivors.load(Ordering::SeqCst), 1);

        // Then - the pool survived and remains usable
        assert_eq!(executor.spawn(|| 1).wait().unwrap(), 1);
    }

    #[test]
    fn shutdown_drains_pending_jobs() {
        // Given
        let executor = Executor::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        let done_clone = Arc::clone(&done);
        executor.execute(move || {
            thread::sleep(Duration::from_millis(50));
            done_clone.fetch_add(1, Ordering::SeqCst);
        });

        // When
        drop(executor);

        // Then
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
