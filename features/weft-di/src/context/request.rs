use std::{
    any::Any,
    sync::Arc,
    thread::{self, ThreadId},
};

use dashmap::DashMap;

use crate::{
    component::Component,
    context::{
        creational::CreationalContext,
        store::BeanStore,
        Context, ContextualInstance, ScopeEvents, ScopeTransition,
    },
    errors::InjectError,
    ids::ContextualStore,
    manager::BeanManager,
    metadata::builtin,
    types::value,
};

/// Request scope, bound to the activating thread
pub struct RequestContext {
    contextual: Arc<ContextualStore>,
    requests: DashMap<ThreadId, Arc<BeanStore>>,
    events: Arc<ScopeEvents>,
}

impl RequestContext {
    pub fn new(contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>) -> Self {
        Self {
            contextual,
            requests: DashMap::new(),
            events,
        }
    }

    /// Starts a request on this thread, false if one is already active
    pub fn activate(&self) -> bool {
        if !self.start() {
            return false;
        }
        self.events.fire(
            ScopeTransition::Initialized,
            builtin::REQUEST_SCOPED,
            value(format!("{:?}", thread::current().id())),
        );
        true
    }

    /// Ends the request of this thread, destroying its instances
    pub fn deactivate(&self, manager: &BeanManager) {
        if self.end(manager) {
            self.events.fire(
                ScopeTransition::Destroyed,
                builtin::REQUEST_SCOPED,
                value(format!("{:?}", thread::current().id())),
            );
        }
    }

    /// Activates a request without events, if none is active
    ///
    /// The request ends when the returned guard drops.
    pub fn activate_silently(self: &Arc<Self>, manager: &BeanManager) -> Option<RequestActivation> {
        self.start().then(|| RequestActivation {
            context: self.clone(),
            manager: manager.clone(),
        })
    }

    fn start(&self) -> bool {
        let mut started = false;
        self.requests.entry(thread::current().id()).or_insert_with(|| {
            started = true;
            Arc::new(BeanStore::new())
        });
        started
    }

    fn end(&self, manager: &BeanManager) -> bool {
        let Ok(store) = self.current() else {
            return false;
        };
        store.destroy_all(manager);
        self.requests.remove(&thread::current().id());
        true
    }

    fn current(&self) -> Result<Arc<BeanStore>, InjectError> {
        self.requests
            .get(&thread::current().id())
            .map(|s| s.value().clone())
            .ok_or_else(|| InjectError::ContextNotActive {
                scope: builtin::REQUEST_SCOPED.to_string(),
            })
    }
}

/// Ends a silently activated request when dropped
pub struct RequestActivation {
    context: Arc<RequestContext>,
    manager: BeanManager,
}

impl Drop for RequestActivation {
    fn drop(&mut self) {
        self.context.end(&self.manager);
    }
}

impl Context for RequestContext {
    fn scope(&self) -> &str {
        builtin::REQUEST_SCOPED
    }

    fn is_active(&self) -> bool {
        self.requests.contains_key(&thread::current().id())
    }

    fn get(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
    ) -> Result<ContextualInstance, InjectError> {
        let store = self.current()?;
        let key = self.contextual.put_if_absent(component);
        store.get_or_create(&key, || {
            let cc = CreationalContext::new(manager, Some(component.clone()));
            component.create(manager, &cc)
        })
    }

    fn get_if_exists(
        &self,
        component: &Arc<Component>,
    ) -> Result<Option<ContextualInstance>, InjectError> {
        let store = self.current()?;
        let key = self.contextual.put_if_absent(component);
        Ok(store.get(&key))
    }

    fn destroy(&self, component: &Arc<Component>, manager: &BeanManager) -> Result<(), InjectError> {
        let Ok(store) = self.current() else {
            return Ok(());
        };
        let key = self.contextual.put_if_absent(component);
        store.destroy(&key, manager)
    }

    fn invalidate(&self, manager: &BeanManager) {
        let stores = self
            .requests
            .iter()
            .map(|s| s.value().clone())
            .collect::<Vec<_>>();
        for store in &stores {
            store.destroy_all(manager);
        }
        self.requests.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
