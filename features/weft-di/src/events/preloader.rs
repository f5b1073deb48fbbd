use std::sync::Arc;

use futures::future::AbortHandle;
use parking_lot::Mutex;

use crate::{
    bootstrap::executor::Executor,
    resolution::{observers::TypeSafeObserverResolver, resolvable::EventDescriptor},
};

/// Warms the observer resolution cache in the background
///
/// Results are advisory, an event resolved before the preloader got to it is simply
/// resolved twice. Pending work is dropped on [ObserverPreloader::cancel].
#[derive(Default)]
pub struct ObserverPreloader {
    pending: Mutex<Vec<AbortHandle>>,
}

impl ObserverPreloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Without a pool in the executor preloading does nothing
    pub fn preload(
        &self,
        executor: &Executor,
        resolver: &Arc<TypeSafeObserverResolver>,
        events: Vec<EventDescriptor>,
    ) {
        if !executor.is_parallel() {
            return;
        }
        tracing::trace!("Preloading observers of {} events", events.len());

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_aborted());
        for event in events {
            let resolver = resolver.clone();
            let handle = executor.spawn_background(async move {
                resolver.resolve(&event);
            });
            pending.extend(handle);
        }
    }

    /// Drops every preload which has not started yet
    pub fn cancel(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if !pending.is_empty() {
            tracing::debug!("Cancelling {} observer preloads", pending.len());
        }
        for handle in pending {
            handle.abort();
        }
    }
}

impl Drop for ObserverPreloader {
    fn drop(&mut self) {
        self.cancel();
    }
}
