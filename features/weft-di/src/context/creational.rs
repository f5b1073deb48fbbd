use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use parking_lot::Mutex;

use crate::{
    component::{Component, InjectionPoint},
    context::ContextualInstance,
    errors::InjectError,
    interception::handler::InterceptorInstances,
    manager::{BeanManager, WeakManager},
    reference::Reference,
};

/// Tracks the dependent instances created for one instance
///
/// Contexts form a tree following the creation of dependent instances. Releasing a
/// context destroys its dependents, most recently created first.
pub struct CreationalContext {
    manager: WeakManager,
    component: Option<Arc<Component>>,
    parent: Option<Arc<CreationalContext>>,
    injection_point: Option<InjectionPoint>,
    delegate: Option<Reference>,
    dependents: Mutex<Vec<ContextualInstance>>,
    interceptors: OnceLock<Arc<InterceptorInstances>>,
    released: AtomicBool,
}

impl CreationalContext {
    pub fn new(manager: &BeanManager, component: Option<Arc<Component>>) -> Arc<Self> {
        Arc::new(Self::with(manager.downgrade(), component, None, None, None))
    }

    fn with(
        manager: WeakManager,
        component: Option<Arc<Component>>,
        parent: Option<Arc<CreationalContext>>,
        injection_point: Option<InjectionPoint>,
        delegate: Option<Reference>,
    ) -> Self {
        Self {
            manager,
            component,
            parent,
            injection_point,
            delegate,
            dependents: Mutex::new(Vec::new()),
            interceptors: OnceLock::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Context for a dependent instance of `component`
    pub fn child(self: &Arc<Self>, component: Arc<Component>) -> Arc<Self> {
        Arc::new(Self::with(
            self.manager.clone(),
            Some(component),
            Some(self.clone()),
            None,
            None,
        ))
    }

    /// Context for an instance injected into `injection_point`
    pub fn child_for(self: &Arc<Self>, component: Arc<Component>, injection_point: &InjectionPoint) -> Arc<Self> {
        Arc::new(Self::with(
            self.manager.clone(),
            Some(component),
            Some(self.clone()),
            Some(injection_point.clone()),
            None,
        ))
    }

    /// Context for a decorator, whose delegate injection point receives `delegate`
    pub fn child_with_delegate(self: &Arc<Self>, component: Arc<Component>, delegate: Reference) -> Arc<Self> {
        Arc::new(Self::with(
            self.manager.clone(),
            Some(component),
            Some(self.clone()),
            None,
            Some(delegate),
        ))
    }

    pub fn manager(&self) -> Result<BeanManager, InjectError> {
        self.manager.upgrade()
    }

    pub fn component(&self) -> Option<&Arc<Component>> {
        self.component.as_ref()
    }

    pub fn parent(&self) -> Option<&Arc<CreationalContext>> {
        self.parent.as_ref()
    }

    /// The injection point the instance is created for
    pub fn injection_point(&self) -> Option<&InjectionPoint> {
        self.injection_point.as_ref()
    }

    pub fn delegate(&self) -> Option<&Reference> {
        self.delegate.as_ref()
    }

    pub fn add_dependent(&self, instance: ContextualInstance) {
        self.dependents.lock().push(instance);
    }

    pub fn dependents(&self) -> Vec<ContextualInstance> {
        self.dependents.lock().clone()
    }

    pub(crate) fn set_interceptors(&self, instances: Arc<InterceptorInstances>) {
        // A context belongs to exactly one instance, set during its construction
        let _ = self.interceptors.set(instances);
    }

    pub(crate) fn interceptors(&self) -> Option<&Arc<InterceptorInstances>> {
        self.interceptors.get()
    }

    /// Destroys every dependent instance, a second release does nothing
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let dependents = std::mem::take(&mut *self.dependents.lock());
        if dependents.is_empty() {
            return;
        }
        let Ok(manager) = self.manager.upgrade() else {
            tracing::warn!(
                "Cannot destroy {} dependent instances, the container is gone",
                dependents.len()
            );
            return;
        };
        for dependent in dependents.iter().rev() {
            if let Err(e) = dependent.component.destroy(dependent, &manager) {
                tracing::warn!("Destroying dependent {} failed: {e}", dependent.component.id);
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}
