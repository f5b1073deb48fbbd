use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    component::Component,
    context::{
        creational::CreationalContext,
        ensure_active,
        store::BeanStore,
        Context, ContextualInstance, ScopeEvents, ScopeTransition,
    },
    errors::InjectError,
    ids::ContextualStore,
    manager::BeanManager,
    metadata::builtin,
    types::value,
};

/// One instance per component for the whole container: singleton and application scope
pub struct SharedContext {
    scope: &'static str,
    contextual: Arc<ContextualStore>,
    store: BeanStore,
    active: AtomicBool,
    events: Arc<ScopeEvents>,
}

impl SharedContext {
    pub fn singleton(contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>) -> Self {
        Self::new(builtin::SINGLETON, contextual, events)
    }

    pub fn application(contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>) -> Self {
        Self::new(builtin::APPLICATION_SCOPED, contextual, events)
    }

    fn new(scope: &'static str, contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>) -> Self {
        Self {
            scope,
            contextual,
            store: BeanStore::new(),
            active: AtomicBool::new(true),
            events,
        }
    }

    /// Announces the scope once the container is ready
    pub fn announce(&self) {
        if self.scope == builtin::APPLICATION_SCOPED {
            self.events
                .fire(ScopeTransition::Initialized, self.scope, value(self.scope.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Context for SharedContext {
    fn scope(&self) -> &str {
        self.scope
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn get(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
    ) -> Result<ContextualInstance, InjectError> {
        ensure_active(self)?;
        let key = self.contextual.put_if_absent(component);
        self.store.get_or_create(&key, || {
            let cc = CreationalContext::new(manager, Some(component.clone()));
            component.create(manager, &cc)
        })
    }

    fn get_if_exists(
        &self,
        component: &Arc<Component>,
    ) -> Result<Option<ContextualInstance>, InjectError> {
        ensure_active(self)?;
        let key = self.contextual.put_if_absent(component);
        Ok(self.store.get(&key))
    }

    fn destroy(&self, component: &Arc<Component>, manager: &BeanManager) -> Result<(), InjectError> {
        let key = self.contextual.put_if_absent(component);
        self.store.destroy(&key, manager)
    }

    fn invalidate(&self, manager: &BeanManager) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        // Still active while destroying, pre destroy callbacks may look their component up
        self.store.destroy_all(manager);
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.scope == builtin::APPLICATION_SCOPED {
            self.events
                .fire(ScopeTransition::Destroyed, self.scope, value(self.scope.to_string()));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
