//! Client proxies
//!
//! References to normal scoped components are proxies. Every call looks the current
//! instance up in the component's context, so a proxy injected once keeps following
//! the active request, session or conversation.

use std::{
    fmt::Debug,
    sync::{Arc, OnceLock},
};

use crate::{
    component::Component,
    context::ContextualInstance,
    errors::{InjectError, ProxyError},
    manager::WeakManager,
    metadata::reflection::Type,
    types::Value,
};

/// Receives every call made on a proxy
pub trait ProxyHandler: Send + Sync {
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError>;

    /// The instance calls are currently forwarded to
    fn target(&self) -> Result<Option<Value>, InjectError>;
}

/// A proxy created by a [ProxyFactory]
pub trait ProxyObject: Send + Sync {
    fn proxied_types(&self) -> &[Type];

    /// The handler can be set once
    fn set_handler(&self, handler: Arc<dyn ProxyHandler>) -> Result<(), ProxyError>;

    fn handler(&self) -> Result<Arc<dyn ProxyHandler>, ProxyError>;

    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError> {
        self.handler()?.invoke(method, args)
    }
}

/// Creates proxy objects for a set of types
pub trait ProxyFactory: Send + Sync {
    fn create(&self, types: &[Type]) -> Result<Arc<dyn ProxyObject>, ProxyError>;
}

/// Proxy dispatching by method name
pub struct DynamicProxy {
    types: Vec<Type>,
    handler: OnceLock<Arc<dyn ProxyHandler>>,
}

impl Debug for DynamicProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicProxy")
            .field("types", &self.types)
            .field("handler", &self.handler.get().is_some())
            .finish()
    }
}

impl DynamicProxy {
    pub fn new(types: &[Type]) -> Self {
        Self {
            types: types.to_vec(),
            handler: OnceLock::new(),
        }
    }

    fn describe(&self) -> Vec<String> {
        self.types.iter().map(|t| t.to_string()).collect()
    }
}

impl ProxyObject for DynamicProxy {
    fn proxied_types(&self) -> &[Type] {
        &self.types
    }

    fn set_handler(&self, handler: Arc<dyn ProxyHandler>) -> Result<(), ProxyError> {
        self.handler
            .set(handler)
            .map_err(|_| ProxyError::HandlerAlreadySet {
                proxied: self.describe(),
            })
    }

    fn handler(&self) -> Result<Arc<dyn ProxyHandler>, ProxyError> {
        self.handler
            .get()
            .cloned()
            .ok_or_else(|| ProxyError::HandlerNotSet {
                proxied: self.describe(),
            })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicProxyFactory;

impl ProxyFactory for DynamicProxyFactory {
    fn create(&self, types: &[Type]) -> Result<Arc<dyn ProxyObject>, ProxyError> {
        Ok(Arc::new(DynamicProxy::new(types)))
    }
}

/// Forwards calls to the instance in the component's context
pub struct ClientProxyHandler {
    manager: WeakManager,
    component: Arc<Component>,
}

impl ClientProxyHandler {
    pub fn new(manager: WeakManager, component: Arc<Component>) -> Self {
        Self { manager, component }
    }

    fn contextual(&self) -> Result<ContextualInstance, InjectError> {
        let manager = self.manager.upgrade()?;
        manager.contextual_instance(&self.component)
    }
}

impl ProxyHandler for ClientProxyHandler {
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError> {
        self.contextual()?.invoke(method, args)
    }

    fn target(&self) -> Result<Option<Value>, InjectError> {
        Ok(self.contextual()?.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl ProxyHandler for Echo {
        fn invoke(&self, method: &str, _: Vec<Value>) -> Result<Option<Value>, InjectError> {
            Ok(Some(Arc::new(method.to_string())))
        }

        fn target(&self) -> Result<Option<Value>, InjectError> {
            Ok(None)
        }
    }

    #[test]
    fn calls_before_a_handler_is_set_fail() {
        let proxy = DynamicProxyFactory.create(&[Type::class("Foo")]).unwrap();
        assert!(matches!(
            proxy.invoke("bar", vec![]),
            Err(InjectError::Proxy(ProxyError::HandlerNotSet { .. }))
        ));

        proxy.set_handler(Arc::new(Echo)).unwrap();
        let result = proxy.invoke("bar", vec![]).unwrap().unwrap();
        assert_eq!(
            result.downcast_ref::<String>().map(|s| s.as_str()),
            Some("bar")
        );

        assert!(matches!(
            proxy.set_handler(Arc::new(Echo)),
            Err(ProxyError::HandlerAlreadySet { .. })
        ));
    }
}
