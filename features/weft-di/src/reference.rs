//! What injection hands out
//!
//! A [Reference] is either the instance itself (dependent and pseudo scoped components),
//! a client proxy (normal scoped components) or the delegate of a decorator.
//! Constructors, initializers and producer parameters receive references wrapped
//! into a [Value], [Reference::from_values] unwraps them.

use std::{fmt::Debug, sync::Arc};

use crate::{
    component::Component,
    context::ContextualInstance,
    errors::InjectError,
    interception::{decorators::Delegate, proxy::ProxyObject},
    types::{downcast, DynError, Injectable, Value},
};

#[derive(Clone)]
pub enum Reference {
    Contextual(ContextualInstance),
    Proxy {
        component: Arc<Component>,
        proxy: Arc<dyn ProxyObject>,
    },
    Delegate(Arc<Delegate>),
}

impl Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Contextual(instance) => f
                .debug_tuple("Contextual")
                .field(&instance.component.id)
                .finish(),
            Reference::Proxy { component, .. } => {
                f.debug_tuple("Proxy").field(&component.id).finish()
            }
            Reference::Delegate(_) => f.write_str("Delegate"),
        }
    }
}

impl Reference {
    pub fn from_value(value: &Value) -> Result<&Reference, DynError> {
        value
            .downcast_ref::<Reference>()
            .ok_or_else(|| "injected value is not a reference".into())
    }

    pub fn from_values(values: &[Value]) -> Result<Vec<Reference>, DynError> {
        values
            .iter()
            .map(|v| Reference::from_value(v).cloned())
            .collect()
    }

    pub fn into_value(self) -> Value {
        Arc::new(self)
    }

    /// The component behind the reference, None for delegates
    pub fn component(&self) -> Option<&Arc<Component>> {
        match self {
            Reference::Contextual(instance) => Some(&instance.component),
            Reference::Proxy { component, .. } => Some(component),
            Reference::Delegate(_) => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Reference::Proxy { .. })
    }

    /// A dependent producer returned null
    pub fn is_null(&self) -> bool {
        matches!(self, Reference::Contextual(instance) if instance.instance.is_none())
    }

    /// The underlying instance, for proxies the one in the currently active context
    pub fn instance(&self) -> Result<Value, InjectError> {
        let instance = match self {
            Reference::Contextual(instance) => instance.instance.clone(),
            Reference::Proxy { proxy, .. } => proxy.handler()?.target()?,
            Reference::Delegate(delegate) => Some(delegate.instance().clone()),
        };
        instance.ok_or_else(|| InjectError::NullReference {
            component: self
                .component()
                .map(|c| c.id.to_string())
                .unwrap_or_else(|| "delegate".to_string()),
        })
    }

    /// The underlying instance as `T`
    ///
    /// Calls made directly on the returned value bypass interceptors and decorators,
    /// use [Reference::invoke] for business methods.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        let instance = self.instance()?;
        downcast::<T>(&instance).map_err(|required| InjectError::DowncastFailed {
            required: required.to_string(),
            actual: self
                .component()
                .map(|c| c.class_name())
                .unwrap_or_else(|| "delegate".to_string()),
        })
    }

    /// Calls a business method, through interceptors and decorators
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError> {
        match self {
            Reference::Contextual(instance) => instance.invoke(method, args),
            Reference::Proxy { proxy, .. } => proxy.invoke(method, args),
            Reference::Delegate(delegate) => delegate.invoke(method, &args),
        }
    }
}
