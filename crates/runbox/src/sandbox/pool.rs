//! Warm pools of pre-started containers
//!
//! One background task per language keeps a bounded buffer of idle,
//! hardened containers so most executions skip container start-up. The
//! buffer is a best-effort cache: consumers take from it without blocking
//! and fall back to creating a container themselves when it is empty.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, PoolConfig};
use crate::sandbox::{
    ContainerEngine, ContainerId, ContainerSpec, hardened_spec, provision, terminate,
};

/// Bounded buffer of idle containers for one language
#[derive(Debug)]
pub struct WarmPool {
    language: String,
    capacity: usize,
    idle: Mutex<VecDeque<ContainerId>>,
}

impl WarmPool {
    /// Create an empty pool
    pub fn new(language: impl Into<String>, capacity: usize) -> Self {
        Self {
            language: language.into(),
            capacity,
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Add an idle container without blocking
    ///
    /// Hands the container back if the pool is already full.
    pub fn try_push(&self, id: ContainerId) -> Result<(), ContainerId> {
        let mut idle = self.idle();
        if idle.len() >= self.capacity {
            return Err(id);
        }
        idle.push_back(id);
        Ok(())
    }

    /// Take an idle container without blocking
    pub fn try_take(&self) -> Option<ContainerId> {
        self.idle().pop_front()
    }

    /// Remove every idle container from the pool
    pub fn drain(&self) -> Vec<ContainerId> {
        self.idle().drain(..).collect()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn len(&self) -> usize {
        self.idle().len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<ContainerId>> {
        // The deque is always left consistent, so a poisoned lock is still usable
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one warm pool filled per configured language
///
/// Background tasks run until [`shutdown()`](Self::shutdown) is called or the
/// manager is dropped. On the way out each task removes the idle containers
/// of its pool.
#[derive(Debug)]
pub struct PoolManager<E: ContainerEngine> {
    engine: Arc<E>,
    pools: HashMap<String, Arc<WarmPool>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: ContainerEngine> PoolManager<E> {
    /// Start one maintenance task per language
    ///
    /// Must be called from within a tokio runtime. A pool size of zero
    /// starts nothing and every acquisition falls through to ad-hoc creation.
    pub fn start(engine: Arc<E>, config: &Config) -> Self {
        let shutdown = CancellationToken::new();
        let mut pools = HashMap::new();
        let mut tasks = Vec::new();

        if config.pool.size > 0 {
            for (language, profile) in &config.languages {
                let pool = Arc::new(WarmPool::new(language.clone(), config.pool.size));
                let task = tokio::spawn(maintain(
                    Arc::clone(&engine),
                    Arc::clone(&pool),
                    hardened_spec(profile, None),
                    config.pool.clone(),
                    shutdown.child_token(),
                ));
                pools.insert(language.clone(), pool);
                tasks.push(task);
            }
            info!(
                languages = pools.len(),
                size = config.pool.size,
                "warm pools started"
            );
        }

        Self {
            engine,
            pools,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Get the pool for a language
    pub fn pool(&self, language: &str) -> Option<&WarmPool> {
        self.pools.get(language).map(|pool| pool.as_ref())
    }

    /// Take an idle container for a language without blocking
    pub fn try_acquire(&self, language: &str) -> Option<ContainerId> {
        self.pools.get(language)?.try_take()
    }

    /// Whether the maintenance tasks are still meant to run
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop every maintenance task and remove all idle containers
    ///
    /// Waits for the tasks to finish, including any container creation in
    /// flight. Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(error) = task.await {
                warn!(%error, "pool maintenance task failed");
            }
        }

        // Tasks drain their own pools; this catches anything pushed after that
        for pool in self.pools.values() {
            for id in pool.drain() {
                terminate(&*self.engine, &id).await;
            }
        }
        debug!("warm pools stopped");
    }
}

impl<E: ContainerEngine> Drop for PoolManager<E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Maintenance loop for one language
#[instrument(skip_all, fields(language = pool.language(), capacity = pool.capacity()))]
async fn maintain<E: ContainerEngine>(
    engine: Arc<E>,
    pool: Arc<WarmPool>,
    spec: ContainerSpec,
    settings: PoolConfig,
    shutdown: CancellationToken,
) {
    debug!("pool maintenance started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(settings.poll_interval()) => {}
        }

        if pool.is_full() {
            continue;
        }

        // Creation is not raced against shutdown so a half-created container
        // is never abandoned; cancellation is checked once it exists.
        match provision(&*engine, &spec).await {
            Ok(id) => {
                if shutdown.is_cancelled() {
                    terminate(&*engine, &id).await;
                    break;
                }
                if let Err(id) = pool.try_push(id) {
                    debug!(container = %id, "pool filled concurrently, discarding container");
                    terminate(&*engine, &id).await;
                } else {
                    debug!(idle = pool.len(), "warm container added");
                }
            }
            Err(error) => {
                warn!(%error, "failed to create warm container, backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(settings.retry_backoff()) => {}
                }
            }
        }
    }

    for id in pool.drain() {
        terminate(&*engine, &id).await;
    }
    debug!("pool maintenance stopped");
}
