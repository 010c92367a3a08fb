//! Exclusive ownership of an acquired container

use std::sync::Arc;

use tracing::warn;

use crate::sandbox::{ContainerEngine, ContainerId, terminate};

/// A container claimed by one execution
///
/// A leased container is never returned to a pool. Call
/// [`release()`](Self::release) when done to remove it. If the lease is
/// dropped unreleased (e.g., the future owning it was dropped), removal is
/// scheduled on the current tokio runtime instead.
#[derive(Debug)]
pub struct Lease<E: ContainerEngine> {
    engine: Arc<E>,
    id: ContainerId,
    released: bool,
}

impl<E: ContainerEngine> Lease<E> {
    pub fn new(engine: Arc<E>, id: ContainerId) -> Self {
        Self {
            engine,
            id,
            released: false,
        }
    }

    /// Get the leased container ID
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Remove the container
    pub async fn release(mut self) {
        terminate(&*self.engine, &self.id).await;
        self.released = true;
    }
}

impl<E: ContainerEngine> Drop for Lease<E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let id = self.id.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(container = %id, "lease dropped without release, scheduling removal");
                let engine = Arc::clone(&self.engine);
                handle.spawn(async move {
                    terminate(&*engine, &id).await;
                });
            }
            Err(_) => {
                warn!(container = %id, "lease dropped outside a runtime, container leaked");
            }
        }
    }
}
