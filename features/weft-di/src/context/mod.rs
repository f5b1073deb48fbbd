//! Contexts own the instances of their scope
//!
//! Every scope has one [Context]. Normal scoped references look their instance up on each
//! call, pseudo scoped and dependent references hold the instance directly.

pub mod conversation;
pub mod creational;
pub mod dependent;
pub mod registry;
pub mod request;
pub mod session;
pub mod shared;
pub mod store;

use std::{any::Any, fmt::Debug, sync::{Arc, OnceLock}};

use crate::{
    component::Component,
    context::creational::CreationalContext,
    errors::InjectError,
    interception::{decorators::invoke_target, handler::MethodHandler},
    manager::{BeanManager, WeakManager},
    metadata::{
        annotation::{Annotation, AnnotationValue},
        builtin::{self, members},
        reflection::Type,
    },
    types::Value,
};

/// An instance together with everything needed to destroy it
#[derive(Clone)]
pub struct ContextualInstance {
    pub component: Arc<Component>,
    /// None for null products of dependent producers
    pub instance: Option<Value>,
    pub handler: Option<Arc<MethodHandler>>,
    pub cc: Arc<CreationalContext>,
}

impl Debug for ContextualInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextualInstance")
            .field("component", &self.component.id)
            .field("null", &self.instance.is_none())
            .field("intercepted", &self.handler.is_some())
            .finish()
    }
}

impl ContextualInstance {
    pub fn new(
        component: Arc<Component>,
        instance: Option<Value>,
        handler: Option<Arc<MethodHandler>>,
        cc: Arc<CreationalContext>,
    ) -> Self {
        Self {
            component,
            instance,
            handler,
            cc,
        }
    }

    /// Calls a business method, through the handler if the instance has one
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError> {
        if let Some(handler) = &self.handler {
            return handler.invoke(method, args);
        }
        let instance = self.instance.as_ref().ok_or_else(|| InjectError::NullReference {
            component: self.component.id.to_string(),
        })?;
        let Some(class) = &self.component.class else {
            return Err(InjectError::callback(
                method,
                format!("{} has no class to invoke methods on", self.component.id).into(),
            ));
        };
        invoke_target(class, instance, method, &args)
    }
}

/// Owns the instances of one scope
pub trait Context: Send + Sync {
    fn scope(&self) -> &str;

    fn is_active(&self) -> bool;

    /// The existing instance, or a new one
    fn get(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
    ) -> Result<ContextualInstance, InjectError>;

    fn get_if_exists(
        &self,
        component: &Arc<Component>,
    ) -> Result<Option<ContextualInstance>, InjectError>;

    /// Destroys the instance, nothing happens if there is none
    fn destroy(&self, component: &Arc<Component>, manager: &BeanManager) -> Result<(), InjectError>;

    /// Destroys every instance, used at shutdown
    fn invalidate(&self, _manager: &BeanManager) {}

    fn as_any(&self) -> &dyn Any;
}

/// Fails with [InjectError::ContextNotActive] unless the context is active
pub(crate) fn ensure_active(context: &dyn Context) -> Result<(), InjectError> {
    if context.is_active() {
        Ok(())
    } else {
        Err(InjectError::ContextNotActive {
            scope: context.scope().to_string(),
        })
    }
}

/// Whether a scope started or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTransition {
    Initialized,
    Destroyed,
}

/// Qualifier of the events fired when a scope starts or ends
pub fn scope_qualifier(transition: ScopeTransition, scope: &str) -> Annotation {
    let annotation_type = match transition {
        ScopeTransition::Initialized => builtin::INITIALIZED,
        ScopeTransition::Destroyed => builtin::DESTROYED,
    };
    Annotation::marker(annotation_type).with(members::VALUE, AnnotationValue::class(scope))
}

/// Fires scope events through the manager owning the context
///
/// Contexts are created before their manager, which is attached once it exists.
#[derive(Default)]
pub struct ScopeEvents {
    manager: OnceLock<WeakManager>,
}

impl ScopeEvents {
    pub fn attach(&self, manager: WeakManager) {
        let _ = self.manager.set(manager);
    }

    /// `payload` is the scope's key, a session id for example
    pub fn fire(&self, transition: ScopeTransition, scope: &str, payload: Value) {
        let Some(manager) = self.manager.get().and_then(|m| m.upgrade().ok()) else {
            return;
        };
        tracing::trace!("Scope {scope} {transition:?}");
        if let Err(e) = manager.fire_event(payload, Type::object(), &[scope_qualifier(transition, scope)]) {
            tracing::warn!("Observer of {transition:?} {scope} failed: {e}");
        }
    }
}
