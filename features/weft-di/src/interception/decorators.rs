use std::sync::Arc;

use crate::{
    component::Component,
    context::creational::CreationalContext,
    errors::{InjectError, ProxyError},
    manager::BeanManager,
    metadata::{annotated::MethodBody, enhanced::EnhancedAnnotatedType},
    reference::Reference,
    types::Value,
};

/// Where a decorator's delegate leads: the next decorator or the target
pub enum Delegate {
    Decorator {
        instance: Value,
        class: Arc<EnhancedAnnotatedType>,
        next: Arc<Delegate>,
    },
    Target {
        instance: Value,
        class: Arc<EnhancedAnnotatedType>,
    },
}

impl Delegate {
    pub fn instance(&self) -> &Value {
        match self {
            Delegate::Decorator { instance, .. } | Delegate::Target { instance, .. } => instance,
        }
    }

    /// Decorators only implement some methods, the rest fall through to the next delegate
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Option<Value>, InjectError> {
        match self {
            Delegate::Decorator {
                instance,
                class,
                next,
            } => match class.method(method) {
                Some(m) if matches!(m.member.body, MethodBody::Invoke(_)) => {
                    m.invoke(Some(instance.as_ref()), args)
                }
                _ => next.invoke(method, args),
            },
            Delegate::Target { instance, class } => invoke_target(class, instance, method, args),
        }
    }
}

/// Calls a business method on the target itself
pub fn invoke_target(
    class: &EnhancedAnnotatedType,
    instance: &Value,
    method: &str,
    args: &[Value],
) -> Result<Option<Value>, InjectError> {
    let Some(target) = class.method(method) else {
        return Err(ProxyError::NoSuchMethod {
            class: class.name().to_string(),
            method: method.to_string(),
        }
        .into());
    };
    target.invoke(Some(instance.as_ref()), args)
}

/// The decorators of one instance, first decorator outermost
pub struct DecoratorChain {
    first: Arc<Delegate>,
}

impl DecoratorChain {
    /// Creates one instance per decorator as dependents of `cc`
    ///
    /// The chain is built from the target outwards so every delegate is complete
    /// before the decorator receiving it is created.
    pub fn build(
        manager: &BeanManager,
        decorators: &[Arc<Component>],
        target: &Value,
        class: &Arc<EnhancedAnnotatedType>,
        cc: &Arc<CreationalContext>,
    ) -> Result<Option<Self>, InjectError> {
        if decorators.is_empty() {
            return Ok(None);
        }

        let mut next = Arc::new(Delegate::Target {
            instance: target.clone(),
            class: class.clone(),
        });
        for decorator in decorators.iter().rev() {
            let Some(decorator_class) = decorator.class.clone() else {
                return Err(InjectError::NullReference {
                    component: decorator.id.to_string(),
                });
            };
            let child = cc.child_with_delegate(decorator.clone(), Reference::Delegate(next.clone()));
            let created = decorator.create(manager, &child)?;
            let instance = created.instance.clone().ok_or_else(|| InjectError::NullReference {
                component: decorator.id.to_string(),
            })?;
            cc.add_dependent(created);
            tracing::trace!("Decorating {} with {}", class.name(), decorator.id);

            next = Arc::new(Delegate::Decorator {
                instance,
                class: decorator_class,
                next,
            });
        }
        Ok(Some(Self { first: next }))
    }

    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Option<Value>, InjectError> {
        self.first.invoke(method, args)
    }
}
