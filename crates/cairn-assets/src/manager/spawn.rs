//! Asynchronous loads.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::AssetManager;
use crate::Asset;
use crate::error::AssetResult;
use crate::handle::Handle;
use crate::loader::LoadContext;
use crate::scope::AssetScope;

/// A boxed unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs a job somewhere other than the calling thread.
pub trait Spawner: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Spawns one OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, job: Job) {
        std::thread::spawn(job);
    }
}

/// Runs jobs on a shared [`TaskPool`](cairn_core::task_pool::TaskPool).
#[cfg(feature = "task-pool")]
#[derive(Clone)]
pub struct PoolSpawner(pub Arc<cairn_core::task_pool::TaskPool>);

#[cfg(feature = "task-pool")]
impl Spawner for PoolSpawner {
    fn spawn(&self, job: Job) {
        self.0.spawn_job(job);
    }
}

#[cfg(feature = "task-pool")]
impl Spawner for cairn_core::task_pool::TaskPool {
    fn spawn(&self, job: Job) {
        self.spawn_job(job);
    }
}

/// Decrements the outstanding counter when the job finishes or is dropped unrun.
struct Outstanding(Arc<AssetManager>);

impl Outstanding {
    fn begin(manager: &Arc<AssetManager>) -> Self {
        manager.outstanding.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(manager))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AssetManager {
    /// Load with the registered loader on `spawner`, then call `callback`.
    ///
    /// The outstanding counter covers the load and the callback.
    pub fn load_async<T, S>(
        self: &Arc<Self>,
        spawner: &S,
        name: &str,
        scope: AssetScope,
        cache_id: &str,
        callback: impl FnOnce(Option<Handle<T>>) + Send + 'static,
    ) where
        T: Asset,
        S: Spawner + ?Sized,
    {
        let guard = Outstanding::begin(self);
        let name = name.to_string();
        let cache_id = cache_id.to_string();

        spawner.spawn(Box::new(move || {
            let manager = &guard.0;
            let handle = manager.load::<T>(&name, scope, &cache_id);
            callback(handle);
            drop(guard);
        }));
    }

    /// Like [`load_async`](Self::load_async) with an explicit construction closure.
    pub fn load_async_with<T, S, F>(
        self: &Arc<Self>,
        spawner: &S,
        name: &str,
        scope: AssetScope,
        cache_id: &str,
        construct: F,
        callback: impl FnOnce(Option<Handle<T>>) + Send + 'static,
    ) where
        T: Asset,
        S: Spawner + ?Sized,
        F: FnOnce(LoadContext<'_>) -> AssetResult<T> + Send + 'static,
    {
        let guard = Outstanding::begin(self);
        let name = name.to_string();
        let cache_id = cache_id.to_string();

        spawner.spawn(Box::new(move || {
            let manager = &guard.0;
            let handle = manager.load_with(&name, scope, &cache_id, construct);
            callback(handle);
            drop(guard);
        }));
    }

    /// Number of asynchronous loads whose callback has not returned yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}
