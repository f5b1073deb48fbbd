use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};

use crate::{context::ContextualInstance, errors::InjectError, manager::BeanManager};

/// Instances of one context (or one request, session, conversation), keyed by contextual id
///
/// Creation and destruction are serialized per key. The lock is reentrant so a callback
/// reaching back into its own component does not deadlock.
#[derive(Default)]
pub struct BeanStore {
    instances: DashMap<Arc<str>, ContextualInstance>,
    locks: DashMap<Arc<str>, Arc<ReentrantMutex<()>>>,
    /// Creation order, instances are destroyed in reverse
    order: Mutex<Vec<Arc<str>>>,
}

impl BeanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ContextualInstance> {
        self.instances.get(key).map(|i| i.value().clone())
    }

    pub fn get_or_create(
        &self,
        key: &Arc<str>,
        create: impl FnOnce() -> Result<ContextualInstance, InjectError>,
    ) -> Result<ContextualInstance, InjectError> {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }

        let lock = self.locks.entry(key.clone()).or_default().value().clone();
        let _guard = lock.lock();
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }

        let created = create()?;
        self.instances.insert(key.clone(), created.clone());
        self.order.lock().push(key.clone());
        Ok(created)
    }

    /// Runs the instance's destruction while it is still stored, then removes it
    ///
    /// Absent keys are a no-op, so destroying twice destroys once.
    pub fn destroy(&self, key: &str, manager: &BeanManager) -> Result<(), InjectError> {
        let lock = self.locks.entry(Arc::from(key)).or_default().value().clone();
        let _guard = lock.lock();
        let Some(instance) = self.get(key) else {
            return Ok(());
        };
        let destroyed = instance.component.destroy(&instance, manager);
        self.instances.remove(key);
        self.order.lock().retain(|k| &**k != key);
        self.locks.remove(key);
        destroyed
    }

    /// Destroys everything, most recently created first, logging failures
    pub fn destroy_all(&self, manager: &BeanManager) {
        let order = self.order.lock().clone();
        for key in order.iter().rev() {
            if let Err(e) = self.destroy(key, manager) {
                tracing::warn!("Destroying {key} failed: {e}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
