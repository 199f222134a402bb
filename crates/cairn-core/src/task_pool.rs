//! Background task pool.
//!
//! Worker threads that drive an async executor. Asset loads are blocking
//! calls, so most callers submit plain closures through [`TaskPool::spawn_job`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_executor::{Executor, Task};

/// A boxed unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads executing spawned tasks.
///
/// # Example
///
/// ```ignore
/// use cairn_core::task_pool::TaskPool;
///
/// let pool = TaskPool::new(4);
/// let task = pool.spawn(async { 42 });
/// assert_eq!(pollster::block_on(task), 42);
/// ```
pub struct TaskPool {
    executor: Arc<Executor<'static>>,
    threads: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TaskPool {
    /// Create a new task pool with the specified number of threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or a worker thread cannot be spawned.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "TaskPool must have at least one thread");

        let executor = Arc::new(Executor::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(num_threads);

        for i in 0..num_threads {
            let exec = executor.clone();
            let shutdown_flag = shutdown.clone();

            let handle = thread::Builder::new()
                .name(format!("cairn-io-{}", i))
                .spawn(move || {
                    while !shutdown_flag.load(Ordering::Relaxed) {
                        if !exec.try_tick() {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                })
                .expect("Failed to spawn task pool thread");

            threads.push(handle);
        }

        tracing::debug!("TaskPool created with {} threads", num_threads);

        Self {
            executor,
            threads,
            shutdown,
        }
    }

    /// Create a pool that leaves one core free for the main thread.
    pub fn default_threads() -> Self {
        let num_threads = num_cpus::get().saturating_sub(1).max(1);
        Self::new(num_threads)
    }

    /// Spawn an async task on the pool.
    pub fn spawn<T>(&self, future: impl Future<Output = T> + Send + 'static) -> Task<T>
    where
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    /// Run a blocking closure on one of the workers without waiting for it.
    pub fn spawn_job(&self, job: Job) {
        self.executor.spawn(async move { job() }).detach();
    }

    /// Get the number of threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Stop the workers and join them.
    ///
    /// Tasks already running finish; queued tasks are abandoned.
    pub fn shutdown(mut self) {
        tracing::debug!("Shutting down TaskPool with {} threads", self.threads.len());

        self.shutdown.store(true, Ordering::Relaxed);

        for handle in std::mem::take(&mut self.threads) {
            if let Err(e) = handle.join() {
                tracing::error!("Task pool thread panicked: {:?}", e);
            }
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
