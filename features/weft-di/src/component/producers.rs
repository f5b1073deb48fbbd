//! Producer methods and fields, with their optional disposer

use std::{
    any::Any,
    sync::{Arc, OnceLock},
};

use crate::{
    component::{Component, InjectionPoint, Producer, Product},
    context::{creational::CreationalContext, ContextualInstance},
    errors::{DefinitionError, IllegalProductError, InjectError},
    ids::ComponentIdentifier,
    manager::BeanManager,
    metadata::{
        annotated::AnyRef,
        builtin,
        enhanced::{EnhancedField, EnhancedMethod},
        store::MetaAnnotationStore,
    },
    types::Value,
};

/// Runs `f` against an instance of the declaring component
///
/// Static members get no receiver. A dependent receiver only lives for the call.
fn with_receiver<R>(
    manager: &BeanManager,
    declaring: &ComponentIdentifier,
    is_static: bool,
    f: impl FnOnce(Option<&AnyRef>) -> Result<R, InjectError>,
) -> Result<R, InjectError> {
    if is_static {
        return f(None);
    }
    let component = manager
        .component(declaring)
        .ok_or_else(|| InjectError::NullReference {
            component: declaring.to_string(),
        })?;
    let cc = manager.create_creational_context(Some(component.clone()));
    let reference = manager.get_reference(&component, &cc)?;
    let receiver = reference.instance();
    let result = receiver.and_then(|receiver| f(Some(receiver.as_ref())));
    if component.attributes.is_dependent() {
        cc.release();
    }
    result
}

fn parameter_points(
    store: &MetaAnnotationStore,
    method: &EnhancedMethod,
    id: &ComponentIdentifier,
) -> Vec<InjectionPoint> {
    let member = &method.member;
    member
        .parameters
        .iter()
        .filter(|p| !p.annotations.contains(builtin::DISPOSES))
        .map(|p| {
            InjectionPoint::parameter(store, &member.declaring, &member.qualified_name(), p)
                .owned_by(id)
        })
        .collect()
}

/// Removes the product of a producer
pub struct Disposer {
    method: EnhancedMethod,
    /// The `@Disposes` parameter, only used to match the producer
    disposed: InjectionPoint,
    points: Vec<InjectionPoint>,
}

impl Disposer {
    pub fn new(
        store: &MetaAnnotationStore,
        method: EnhancedMethod,
        declaring: &ComponentIdentifier,
    ) -> Result<Self, DefinitionError> {
        let member = method.member.clone();
        let disposed = match member.parameters_annotated(builtin::DISPOSES).as_slice() {
            [disposed] => InjectionPoint::parameter(
                store,
                &member.declaring,
                &member.qualified_name(),
                disposed,
            ),
            other => {
                return Err(DefinitionError::InvalidMember {
                    member: member.qualified_name(),
                    reason: format!(
                        "a disposer needs exactly one @Disposes parameter, found {}",
                        other.len()
                    ),
                })
            }
        };
        if member
            .parameters
            .iter()
            .any(|p| p.annotations.contains(builtin::OBSERVES))
        {
            return Err(DefinitionError::InvalidMember {
                member: member.qualified_name(),
                reason: "a disposer cannot observe events".to_string(),
            });
        }
        let points = parameter_points(store, &method, declaring);
        Ok(Self {
            method,
            disposed,
            points,
        })
    }

    pub fn disposed(&self) -> &InjectionPoint {
        &self.disposed
    }

    pub fn name(&self) -> String {
        self.method.member.qualified_name()
    }

    /// Injected parameters, the disposed one excluded
    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.points
    }

    fn dispose(
        &self,
        declaring: &ComponentIdentifier,
        product: &Value,
        manager: &BeanManager,
    ) -> Result<(), InjectError> {
        let member = &self.method.member;
        let cc = manager.create_creational_context(None);
        let mut injected = self.points.iter();
        let mut args = Vec::with_capacity(member.parameters.len());
        for parameter in &member.parameters {
            if parameter.annotations.contains(builtin::DISPOSES) {
                args.push(product.clone());
                continue;
            }
            let Some(ip) = injected.next() else {
                break;
            };
            args.push(manager.get_injectable_reference(ip, &cc)?.into_value());
        }

        let result = with_receiver(manager, declaring, member.modifiers.is_static, |receiver| {
            self.method.invoke(receiver, &args).map(|_| ())
        });
        cc.release();
        result
    }
}

/// Rejects dependencies which would make a passivating product unserializable
fn check_passivation_dependencies(
    component: &Component,
    points: &[InjectionPoint],
    args: &[Value],
) -> Result<(), InjectError> {
    if !component.passivating_scope {
        return Ok(());
    }
    for (ip, arg) in points.iter().zip(args) {
        if ip.transient {
            continue;
        }
        let Some(dependency) = crate::reference::Reference::from_value(arg)
            .ok()
            .and_then(|r| r.component())
        else {
            continue;
        };
        if !dependency.passivation_capable {
            return Err(IllegalProductError::NonSerializableDependency {
                component: component.id.to_string(),
                injection_point: ip.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn product(value: Option<Value>) -> Product {
    match value {
        Some(value) => Product::Shared(value),
        None => Product::Null,
    }
}

pub struct ProducerMethodProducer {
    declaring: ComponentIdentifier,
    method: EnhancedMethod,
    points: Vec<InjectionPoint>,
    disposer: OnceLock<Arc<Disposer>>,
}

impl ProducerMethodProducer {
    pub fn new(
        store: &MetaAnnotationStore,
        declaring: ComponentIdentifier,
        method: EnhancedMethod,
        id: &ComponentIdentifier,
    ) -> Self {
        let points = parameter_points(store, &method, id);
        Self {
            declaring,
            method,
            points,
            disposer: OnceLock::new(),
        }
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.points
    }

    pub fn method(&self) -> &EnhancedMethod {
        &self.method
    }

    /// Links the disposer, a producer has at most one
    pub fn set_disposer(&self, disposer: Arc<Disposer>) -> Result<(), DefinitionError> {
        let name = disposer.name();
        self.disposer.set(disposer).map_err(|_| DefinitionError::MultipleDisposers {
            member: self.method.member.qualified_name(),
            disposers: vec![self
                .disposer
                .get()
                .map(|d| d.name())
                .unwrap_or_default(), name],
        })
    }

    pub fn disposer(&self) -> Option<&Arc<Disposer>> {
        self.disposer.get()
    }
}

impl Producer for ProducerMethodProducer {
    fn produce(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let args = self
            .points
            .iter()
            .map(|ip| Ok(manager.get_injectable_reference(ip, cc)?.into_value()))
            .collect::<Result<Vec<_>, InjectError>>()?;
        check_passivation_dependencies(component, &self.points, &args)?;

        let member = &self.method.member;
        let produced = with_receiver(manager, &self.declaring, member.modifiers.is_static, |receiver| {
            self.method.invoke(receiver, &args)
        })?;
        Ok(product(produced))
    }

    fn dispose(&self, instance: &ContextualInstance, manager: &BeanManager) -> Result<(), InjectError> {
        match (self.disposer.get(), &instance.instance) {
            (Some(disposer), Some(product)) => disposer.dispose(&self.declaring, product, manager),
            _ => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ProducerFieldProducer {
    declaring: ComponentIdentifier,
    field: EnhancedField,
    disposer: OnceLock<Arc<Disposer>>,
}

impl ProducerFieldProducer {
    pub fn new(declaring: ComponentIdentifier, field: EnhancedField) -> Self {
        Self {
            declaring,
            field,
            disposer: OnceLock::new(),
        }
    }

    pub fn field(&self) -> &EnhancedField {
        &self.field
    }

    pub fn set_disposer(&self, disposer: Arc<Disposer>) -> Result<(), DefinitionError> {
        let name = disposer.name();
        self.disposer.set(disposer).map_err(|_| DefinitionError::MultipleDisposers {
            member: self.field.member.qualified_name(),
            disposers: vec![self
                .disposer
                .get()
                .map(|d| d.name())
                .unwrap_or_default(), name],
        })
    }

    pub fn disposer(&self) -> Option<&Arc<Disposer>> {
        self.disposer.get()
    }
}

impl Producer for ProducerFieldProducer {
    fn produce(
        &self,
        _component: &Arc<Component>,
        manager: &BeanManager,
        _cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let member = &self.field.member;
        let produced = with_receiver(manager, &self.declaring, member.modifiers.is_static, |receiver| {
            self.field.get(receiver)
        })?;
        Ok(product(produced))
    }

    fn dispose(&self, instance: &ContextualInstance, manager: &BeanManager) -> Result<(), InjectError> {
        match (self.disposer.get(), &instance.instance) {
            (Some(disposer), Some(product)) => disposer.dispose(&self.declaring, product, manager),
            _ => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
