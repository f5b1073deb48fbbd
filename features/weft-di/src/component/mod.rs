//! Components: the units the container creates, injects and destroys
//!
//! A [Component] carries its resolution [attributes](ComponentAttributes) and a
//! [Producer] implementing the kind specific lifecycle. [Component::create] and
//! [Component::destroy] drive the common part: null and passivation checks, the
//! interception handler, lifecycle callbacks and releasing dependents.

pub mod attributes;
pub mod builtin;
pub mod injection_point;
pub mod managed;
pub mod producers;
pub mod synthetic;

use std::{any::Any, collections::BTreeSet, fmt::Debug, sync::Arc};

pub use attributes::ComponentAttributes;
pub use injection_point::InjectionPoint;

use crate::{
    context::{creational::CreationalContext, ContextualInstance},
    errors::{IllegalProductError, InjectError},
    ids::{ArchiveId, ComponentIdentifier},
    interception::{handler::MethodHandler, metadata::ClassMetadata},
    manager::BeanManager,
    metadata::{annotated::AnyRef, enhanced::EnhancedAnnotatedType, reflection::Type},
    resolution::qualifiers::QualifierInstance,
    types::{runtime_type_id, Unshared, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Managed,
    ProducerMethod,
    ProducerField,
    /// Registered by an extension or the builder
    Synthetic,
    /// Wraps an instance created outside the container
    ExternalAdapter,
    BuiltIn,
}

/// Facts only interceptors have
#[derive(Debug, Clone)]
pub struct InterceptorInfo {
    /// Bindings the interceptor matches, including inherited ones
    pub bindings: BTreeSet<QualifierInstance>,
    pub metadata: Arc<ClassMetadata>,
}

/// Facts only decorators have
#[derive(Debug, Clone)]
pub struct DecoratorInfo {
    pub delegate: InjectionPoint,
    /// Types of the decorator which are interfaces implemented by the delegate
    pub decorated_types: BTreeSet<Type>,
}

#[derive(Debug, Clone)]
pub enum ComponentRole {
    Plain,
    Interceptor(InterceptorInfo),
    Decorator(DecoratorInfo),
}

/// What [Producer::produce] created
pub enum Product {
    /// Still exclusively owned, fields and initializers are injected next
    Unshared(Unshared),
    /// Complete as produced
    Shared(Value),
    Null,
}

/// The kind specific part of a component's lifecycle
pub trait Producer: Send + Sync {
    fn produce(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError>;

    /// Injects fields and calls initializers, only called for [Product::Unshared]
    fn inject(
        &self,
        _instance: &mut AnyRef,
        _component: &Arc<Component>,
        _manager: &BeanManager,
        _cc: &Arc<CreationalContext>,
    ) -> Result<(), InjectError> {
        Ok(())
    }

    /// Handler routing business method calls through interceptors and decorators
    fn method_handler(
        &self,
        _component: &Arc<Component>,
        _instance: &Value,
        _manager: &BeanManager,
        _cc: &Arc<CreationalContext>,
    ) -> Result<Option<Arc<MethodHandler>>, InjectError> {
        Ok(None)
    }

    fn post_construct(&self, _instance: &ContextualInstance) -> Result<(), InjectError> {
        Ok(())
    }

    fn pre_destroy(&self, _instance: &ContextualInstance) -> Result<(), InjectError> {
        Ok(())
    }

    fn dispose(
        &self,
        _instance: &ContextualInstance,
        _manager: &BeanManager,
    ) -> Result<(), InjectError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// A component known to the container
pub struct Component {
    pub id: ComponentIdentifier,
    pub kind: ComponentKind,
    pub archive: ArchiveId,
    pub role: ComponentRole,
    pub attributes: ComponentAttributes,
    /// The class instances are of, when it is known
    pub class: Option<Arc<EnhancedAnnotatedType>>,
    pub injection_points: Vec<InjectionPoint>,
    pub proxyable: bool,
    pub passivation_capable: bool,
    pub normal_scoped: bool,
    pub passivating_scope: bool,
    pub specializes: Option<ComponentIdentifier>,
    /// The component declaring a producer member
    pub declaring: Option<ComponentIdentifier>,
    pub producer: Arc<dyn Producer>,
}

impl Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("scope", &self.attributes.scope)
            .finish()
    }
}

impl Component {
    /// Creates a new contextual instance
    pub fn create(
        self: &Arc<Self>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<ContextualInstance, InjectError> {
        tracing::trace!("Creating instance of {}", self.id);

        let instance = match self.producer.produce(self, manager, cc)? {
            Product::Unshared(mut owned) => {
                self.producer.inject(owned.as_mut(), self, manager, cc)?;
                let shared: Value = Arc::from(owned);
                Some(shared)
            }
            Product::Shared(shared) => Some(shared),
            Product::Null => None,
        };

        let Some(instance) = instance else {
            if !self.attributes.is_dependent() {
                return Err(IllegalProductError::NullProduct {
                    component: self.id.to_string(),
                    scope: self.attributes.scope.to_string(),
                }
                .into());
            }
            return Ok(ContextualInstance::new(self.clone(), None, None, cc.clone()));
        };

        self.check_product_passivation(manager, &instance)?;

        let handler = self.producer.method_handler(self, &instance, manager, cc)?;
        let contextual = ContextualInstance::new(self.clone(), Some(instance), handler, cc.clone());
        {
            let _request = manager.activate_request_silently();
            self.producer.post_construct(&contextual)?;
        }
        Ok(contextual)
    }

    /// Runs `@PreDestroy`, disposes and releases the dependents of the instance
    ///
    /// Every step runs even if an earlier one failed, the first error is returned.
    pub fn destroy(
        &self,
        instance: &ContextualInstance,
        manager: &BeanManager,
    ) -> Result<(), InjectError> {
        tracing::trace!("Destroying instance of {}", self.id);
        let pre_destroy = self.producer.pre_destroy(instance);
        let dispose = self.producer.dispose(instance, manager);
        instance.cc.release();
        pre_destroy.and(dispose)
    }

    pub fn is_alternative(&self) -> bool {
        self.attributes.alternative
    }

    pub fn is_interceptor(&self) -> bool {
        matches!(self.role, ComponentRole::Interceptor(_))
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self.role, ComponentRole::Decorator(_))
    }

    /// Name of the class instances are of, or the first non-Object type
    pub fn class_name(&self) -> String {
        if let Some(class) = &self.class {
            return class.name().to_string();
        }
        self.attributes
            .types
            .iter()
            .find(|t| !t.is_object())
            .map(|t| t.to_string())
            .unwrap_or_else(|| self.id.to_string())
    }

    fn check_product_passivation(
        &self,
        manager: &BeanManager,
        instance: &Value,
    ) -> Result<(), InjectError> {
        if !self.passivating_scope
            || !matches!(
                self.kind,
                ComponentKind::ProducerMethod | ComponentKind::ProducerField
            )
        {
            return Ok(());
        }
        let transformer = manager.transformer();
        let type_id = runtime_type_id(instance);
        if transformer.is_serializable(type_id) == Some(false) {
            let class = transformer
                .name_of(type_id)
                .map(|n| n.to_string())
                .unwrap_or_else(|| self.class_name());
            return Err(IllegalProductError::NonSerializableProduct {
                component: self.id.to_string(),
                class,
            }
            .into());
        }
        Ok(())
    }
}
