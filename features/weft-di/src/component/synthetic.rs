//! Components registered programmatically, by extensions or the builder

use std::{any::Any, collections::BTreeSet, sync::Arc};

use crate::{
    component::{
        Component, ComponentAttributes, ComponentKind, ComponentRole, InjectionPoint, Producer,
        Product,
    },
    context::{creational::CreationalContext, ContextualInstance},
    errors::{DefinitionError, InjectError},
    factories::{DynSyntheticFactory, SyntheticFactory},
    ids::{ArchiveId, ComponentIdentifier},
    manager::BeanManager,
    metadata::{
        annotation::Annotation,
        builtin,
        reflection::{Type, TypeHierarchy},
        transformer::ClassTransformer,
    },
    reference::Reference,
    resolution::qualifiers::{normalize_component_qualifiers, QualifierInstance},
    types::{Injectable, TypeInfo, Value},
};

/// Creates instances through a [DynSyntheticFactory]
pub struct SyntheticProducer {
    factory: Arc<dyn DynSyntheticFactory>,
    points: Vec<InjectionPoint>,
}

impl Producer for SyntheticProducer {
    fn produce(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let dependencies = self
            .points
            .iter()
            .map(|ip| manager.get_injectable_reference(ip, cc))
            .collect::<Result<Vec<Reference>, InjectError>>()?;
        let created = self
            .factory
            .create(manager, &dependencies)
            .map_err(|e| InjectError::callback(component.id.as_str(), e))?;
        Ok(match created {
            Some(instance) => Product::Shared(instance),
            None => Product::Null,
        })
    }

    fn dispose(&self, instance: &ContextualInstance, _manager: &BeanManager) -> Result<(), InjectError> {
        let Some(value) = &instance.instance else {
            return Ok(());
        };
        self.factory
            .destroy(value)
            .map_err(|e| InjectError::callback(instance.component.id.as_str(), e))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Hands out an instance which was created outside the container
pub struct ExternalProducer {
    instance: Value,
}

impl Producer for ExternalProducer {
    fn produce(
        &self,
        _component: &Arc<Component>,
        _manager: &BeanManager,
        _cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        Ok(Product::Shared(self.instance.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

enum Source {
    Factory(Arc<dyn DynSyntheticFactory>),
    Instance(Value, TypeInfo),
}

/// Describes a component which has no class to read its attributes from
pub struct SyntheticComponent {
    source: Source,
    types: Vec<Type>,
    qualifiers: Vec<Annotation>,
    scope: Option<Arc<str>>,
    name: Option<Arc<str>>,
    stereotypes: BTreeSet<Arc<str>>,
    alternative: bool,
    priority: Option<i64>,
    passivation_capable: bool,
    id: Option<String>,
}

impl SyntheticComponent {
    fn new(source: Source) -> Self {
        Self {
            source,
            types: Vec::new(),
            qualifiers: Vec::new(),
            scope: None,
            name: None,
            stereotypes: BTreeSet::new(),
            alternative: false,
            priority: None,
            passivation_capable: false,
            id: None,
        }
    }

    /// Instances are created by the factory, dependent unless scoped otherwise
    pub fn from_factory<F: SyntheticFactory>(factory: F) -> Self {
        Self::new(Source::Factory(Arc::new(factory)))
    }

    pub fn from_dyn_factory(factory: Arc<dyn DynSyntheticFactory>) -> Self {
        Self::new(Source::Factory(factory))
    }

    /// Adapts an existing instance, singleton unless scoped otherwise
    pub fn from_instance<T: Injectable>(instance: T) -> Self {
        Self::new(Source::Instance(Arc::new(instance), TypeInfo::of::<T>()))
    }

    /// Adds a bean type, by default the class registered for the Rust type is used
    pub fn with_type(mut self, ty: Type) -> Self {
        self.types.push(ty);
        self
    }

    pub fn qualified(mut self, qualifier: Annotation) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn scoped(mut self, scope: &str) -> Self {
        self.scope = Some(Arc::from(scope));
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn stereotype(mut self, stereotype: &str) -> Self {
        self.stereotypes.insert(Arc::from(stereotype));
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    /// Enables the alternative for the whole deployment
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn passivation_capable(mut self) -> Self {
        self.passivation_capable = true;
        self
    }

    /// Fixes the identifier, by default it is derived from the attributes
    pub fn identified_by(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn supplies(&self) -> TypeInfo {
        match &self.source {
            Source::Factory(factory) => factory.supplies(),
            Source::Instance(_, info) => *info,
        }
    }

    pub(crate) fn build(
        self,
        archive: &ArchiveId,
        transformer: &ClassTransformer,
    ) -> Result<Arc<Component>, DefinitionError> {
        let store = transformer.store();
        let supplies = self.supplies();

        let declared = if self.types.is_empty() {
            let class = transformer
                .name_of(supplies.type_id)
                .map(Type::Class)
                .unwrap_or_else(|| Type::class(supplies.type_name));
            vec![class]
        } else {
            self.types
        };
        if let Some(wildcard) = declared.iter().find(|t| t.contains_wildcard()) {
            return Err(DefinitionError::WildcardProducerType {
                member: supplies.type_name.to_string(),
                ty: wildcard.to_string(),
            });
        }
        let types = declared
            .iter()
            .flat_map(|t| transformer.closure(t))
            .collect::<BTreeSet<_>>();

        let mut qualifiers = self
            .qualifiers
            .iter()
            .map(|q| store.qualifier_instance(q))
            .collect::<BTreeSet<_>>();
        if let Some(name) = &self.name {
            qualifiers.insert(QualifierInstance::named(name));
        }
        let qualifiers = normalize_component_qualifiers(qualifiers);

        let external = matches!(self.source, Source::Instance(..));
        let scope = self.scope.unwrap_or_else(|| {
            Arc::from(if external {
                builtin::SINGLETON
            } else {
                builtin::DEPENDENT
            })
        });
        if !store.is_scope(&scope) {
            return Err(DefinitionError::InvalidAnnotation {
                annotation: scope.to_string(),
                reason: "is not a scope".to_string(),
            });
        }

        let descriptor = self.id.unwrap_or_else(|| {
            let types = declared.iter().map(Type::to_string).collect::<Vec<_>>();
            let qualifiers = qualifiers.iter().map(|q| q.to_string()).collect::<Vec<_>>();
            format!("{};{};{}", types.join(","), qualifiers.join(","), scope)
        });
        let (id, kind) = if external {
            (
                ComponentIdentifier::external(archive, &descriptor),
                ComponentKind::ExternalAdapter,
            )
        } else {
            (
                ComponentIdentifier::synthetic(archive, &descriptor),
                ComponentKind::Synthetic,
            )
        };

        let declaring: Arc<str> = Arc::from(descriptor.as_str());
        let (producer, injection_points): (Arc<dyn Producer>, Vec<InjectionPoint>) = match self.source {
            Source::Factory(factory) => {
                let points = factory
                    .dependencies()
                    .into_iter()
                    .enumerate()
                    .map(|(position, param)| {
                        InjectionPoint::parameter(
                            store,
                            &declaring,
                            "create",
                            &param.into_parameter(position),
                        )
                        .owned_by(&id)
                    })
                    .collect::<Vec<_>>();
                (
                    Arc::new(SyntheticProducer {
                        factory,
                        points: points.clone(),
                    }),
                    points,
                )
            }
            Source::Instance(instance, _) => (Arc::new(ExternalProducer { instance }), Vec::new()),
        };

        let passivation_capable = self.passivation_capable
            || transformer.is_serializable(supplies.type_id) == Some(true);
        tracing::trace!("Synthesized {id}");
        Ok(Arc::new(Component {
            id,
            kind,
            archive: archive.clone(),
            role: ComponentRole::Plain,
            attributes: ComponentAttributes {
                types,
                qualifiers,
                scope: scope.clone(),
                name: self.name,
                stereotypes: self.stereotypes,
                alternative: self.alternative,
                priority: self.priority,
            },
            class: None,
            injection_points,
            proxyable: true,
            passivation_capable,
            normal_scoped: store.is_normal_scope(&scope),
            passivating_scope: store.is_passivating_scope(&scope),
            specializes: None,
            declaring: None,
            producer,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::store::MetaAnnotationStore;

    struct Clock;

    #[test]
    fn external_instances_default_to_singleton() {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        let component = SyntheticComponent::from_instance(Clock)
            .with_type(Type::class("Clock"))
            .build(&ArchiveId::new("app"), &transformer)
            .unwrap();

        assert_eq!(component.kind, ComponentKind::ExternalAdapter);
        assert_eq!(&*component.attributes.scope, builtin::SINGLETON);
        assert!(component.attributes.types.contains(&Type::class("Clock")));
        assert!(component.attributes.types.contains(&Type::object()));
        assert!(component
            .attributes
            .qualifiers
            .contains(&QualifierInstance::default_qualifier()));
    }

    #[test]
    fn identifiers_are_derived_from_attributes() {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        let archive = ArchiveId::new("app");
        let build = || {
            SyntheticComponent::from_instance(Clock)
                .with_type(Type::class("Clock"))
                .named("clock")
                .build(&archive, &transformer)
                .unwrap()
        };
        assert_eq!(build().id, build().id);
        assert_eq!(build().attributes.name.as_deref(), Some("clock"));
    }

    #[test]
    fn wildcard_types_are_rejected() {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        let result = SyntheticComponent::from_instance(Clock)
            .with_type(Type::parameterized("List", vec![Type::wildcard()]))
            .build(&ArchiveId::new("app"), &transformer);
        assert!(matches!(result, Err(DefinitionError::WildcardProducerType { .. })));
    }
}
