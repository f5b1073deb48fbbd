//! Turns discovered classes into components, producers and observers
//!
//! Deployment runs in phases, each one a fork-join over independent items:
//!
//! 1. every class is enhanced and its attributes are read and offered to extensions
//! 2. specialization is resolved (sequential, it links classes to each other)
//! 3. managed components, interceptors and decorators are built
//! 4. producers, disposers and observers of every managed component are built
//!
//! Every phase completes for all items before the next one starts. Problems of one phase
//! are collected and reported together, a phase with problems ends the deployment.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    bootstrap::executor::Executor,
    component::{
        attributes::{read_attributes, AttributeSource},
        managed::ManagedProducer,
        producers::{Disposer, ProducerFieldProducer, ProducerMethodProducer},
        Component, ComponentAttributes, ComponentKind, ComponentRole, DecoratorInfo,
        InjectionPoint, InterceptorInfo, Producer,
    },
    errors::{DefinitionError, Problems},
    events::{
        lifecycle::{ProcessBean, ProcessBeanAttributes},
        notifier::ObserverNotifier,
        observer::ObserverMethod,
    },
    ids::{ArchiveId, ComponentIdentifier},
    manager::ContainerServices,
    metadata::{
        annotated::AnnotatedType,
        annotation::AnnotationSet,
        builtin,
        enhanced::{EnhancedAnnotatedType, EnhancedField, EnhancedMethod},
        reflection::Type,
    },
    resolution::{
        assignability::{is_assignable, matches_any},
        qualifiers::normalize_component_qualifiers,
    },
};

/// What deploying a set of classes produced, sorted by identifier
#[derive(Default)]
pub(crate) struct Deployed {
    pub components: Vec<Arc<Component>>,
    pub observers: Vec<Arc<ObserverMethod>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassRole {
    Plain,
    Interceptor,
    Decorator,
}

/// A class which passed attribute processing
#[derive(Clone)]
struct ClassDefinition {
    archive: ArchiveId,
    id: ComponentIdentifier,
    class: Arc<EnhancedAnnotatedType>,
    role: ClassRole,
    attributes: ComponentAttributes,
    specializes: Option<ComponentIdentifier>,
}

enum ProducerHandle {
    Method(Arc<ProducerMethodProducer>),
    Field(Arc<ProducerFieldProducer>),
}

impl ProducerHandle {
    fn set_disposer(&self, disposer: Arc<Disposer>) -> Result<(), DefinitionError> {
        match self {
            ProducerHandle::Method(p) => p.set_disposer(disposer),
            ProducerHandle::Field(p) => p.set_disposer(disposer),
        }
    }

    fn disposer(&self) -> Option<&Arc<Disposer>> {
        match self {
            ProducerHandle::Method(p) => p.disposer(),
            ProducerHandle::Field(p) => p.disposer(),
        }
    }

    fn into_producer(self) -> Arc<dyn Producer> {
        match self {
            ProducerHandle::Method(p) => p,
            ProducerHandle::Field(p) => p,
        }
    }
}

/// A producer member whose attributes are known, not yet linked to its disposer
struct ProducerDefinition {
    id: ComponentIdentifier,
    kind: ComponentKind,
    attributes: ComponentAttributes,
    points: Vec<InjectionPoint>,
    passivation_capable: bool,
    proxyable: bool,
    handle: ProducerHandle,
}

/// Creates the components of a deployment
pub(crate) struct BeanDeployer<'a> {
    executor: &'a Executor,
    services: Arc<ContainerServices>,
    notifier: ObserverNotifier,
}

impl<'a> BeanDeployer<'a> {
    pub fn new(
        executor: &'a Executor,
        services: Arc<ContainerServices>,
        notifier: ObserverNotifier,
    ) -> Self {
        Self {
            executor,
            services,
            notifier,
        }
    }

    /// Deploys the classes of every archive
    pub fn deploy(&self, classes: Vec<(ArchiveId, Arc<AnnotatedType>)>) -> Result<Deployed, Problems> {
        let discovered = classes.len();

        let services = self.services.clone();
        let notifier = self.notifier.clone();
        let definitions = self
            .executor
            .invoke_all(classes, move |(archive, ty)| {
                define_class(&services, &notifier, archive, ty)
            })?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let definitions = resolve_specialization(definitions)?;

        let services = self.services.clone();
        let mut components = self
            .executor
            .invoke_all(definitions, move |definition| build_class_component(&services, definition))?;
        components.sort_by(|a, b| a.id.cmp(&b.id));

        let declaring = components
            .iter()
            .filter(|c| matches!(c.role, ComponentRole::Plain))
            .cloned()
            .collect::<Vec<_>>();
        let services = self.services.clone();
        let notifier = self.notifier.clone();
        let members = self.executor.invoke_all(declaring, move |component| {
            deploy_members(&services, &notifier, &component)
        })?;

        let mut deployed = Deployed {
            components,
            observers: Vec::new(),
        };
        for (producers, observers) in members {
            deployed.components.extend(producers);
            deployed.observers.extend(observers.into_iter().map(Arc::new));
        }
        deployed.components.sort_by(|a, b| a.id.cmp(&b.id));
        deployed.observers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut problems = Problems::new();
        for component in &deployed.components {
            let mut event = ProcessBean::new(component.clone());
            problems.extend(self.notifier.fire_lifecycle_event(&mut event));
        }
        if !problems.is_empty() {
            problems.normalize();
            return Err(problems);
        }

        tracing::debug!(
            "Deployed {} classes into {} components and {} observers",
            discovered,
            deployed.components.len(),
            deployed.observers.len()
        );
        Ok(deployed)
    }
}

/// `com.acme.FooBar` is named `fooBar`
fn default_name(class: &str) -> String {
    let simple = class.rsplit(['.', ':']).next().unwrap_or(class);
    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `getFoo` is named `foo`, other methods by their name
fn producer_name(method: &str) -> String {
    match method.strip_prefix("get") {
        Some(property) if property.starts_with(|c: char| c.is_uppercase()) => default_name(property),
        _ => method.to_string(),
    }
}

fn is_bean_defining(class: &EnhancedAnnotatedType) -> bool {
    !class.scopes.is_empty()
        || !class.stereotypes.is_empty()
        || class.is_annotated(builtin::INTERCEPTOR)
        || class.is_annotated(builtin::DECORATOR)
}

fn fire_attributes(
    notifier: &ObserverNotifier,
    id: &ComponentIdentifier,
    kind: ComponentKind,
    attributes: ComponentAttributes,
) -> Result<Option<ComponentAttributes>, Problems> {
    let mut event = ProcessBeanAttributes::new(id.clone(), kind, attributes);
    let problems = notifier.fire_lifecycle_event(&mut event);
    let (attributes, mut reported) = event.into_result();
    reported.extend(problems);
    if !reported.is_empty() {
        return Err(reported);
    }
    if attributes.is_none() {
        tracing::debug!("{id} was vetoed");
    }
    Ok(attributes)
}

/// Decides whether the class is a managed component and reads its attributes
fn define_class(
    services: &ContainerServices,
    notifier: &ObserverNotifier,
    archive: ArchiveId,
    ty: Arc<AnnotatedType>,
) -> Result<Option<ClassDefinition>, Problems> {
    let class = services.transformer.enhance(&ty)?;
    let modifiers = class.annotated.modifiers;
    let role = if class.is_annotated(builtin::INTERCEPTOR) {
        ClassRole::Interceptor
    } else if class.is_annotated(builtin::DECORATOR) {
        ClassRole::Decorator
    } else {
        ClassRole::Plain
    };

    if modifiers.is_interface
        || (modifiers.is_abstract && role != ClassRole::Decorator)
        || class.is_annotated(builtin::VETOED)
    {
        tracing::trace!("{} is not a managed component", class.name());
        return Ok(None);
    }
    if class.injectable_constructors().is_empty() && !is_bean_defining(&class) {
        tracing::trace!("{} has no usable constructor and is skipped", class.name());
        return Ok(None);
    }

    let id = ComponentIdentifier::managed(&archive, class.name());
    let attributes = read_attributes(
        &services.store,
        &*services.transformer,
        AttributeSource {
            member: class.name().to_string(),
            annotations: &class.annotated.annotations,
            base_type: class.annotated.as_type(),
            default_name: default_name(class.name()),
        },
    )?;
    let Some(attributes) = fire_attributes(notifier, &id, ComponentKind::Managed, attributes)? else {
        return Ok(None);
    };

    Ok(Some(ClassDefinition {
        archive,
        id,
        class,
        role,
        attributes,
        specializes: None,
    }))
}

/// Links specializing classes to the component of their direct superclass
///
/// A specializing component inherits the qualifiers and the name of the component it
/// specializes. Shallow classes are handled first so that chains inherit transitively.
fn resolve_specialization(
    mut definitions: Vec<ClassDefinition>,
) -> Result<Vec<ClassDefinition>, Problems> {
    definitions.sort_by(|a, b| {
        a.class
            .hierarchy
            .len()
            .cmp(&b.class.hierarchy.len())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut by_class: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
    for (index, definition) in definitions.iter().enumerate() {
        by_class
            .entry(definition.class.name().clone())
            .or_default()
            .push(index);
    }

    let mut problems = Problems::new();
    for index in 0..definitions.len() {
        if !definitions[index].class.is_annotated(builtin::SPECIALIZES) {
            continue;
        }
        let definition = &definitions[index];
        let superclass = definition
            .class
            .direct_superclass()
            .and_then(|s| by_class.get(&s.name))
            .and_then(|candidates| {
                // Prefer the superclass component of the same archive
                candidates
                    .iter()
                    .find(|c| definitions[**c].archive == definition.archive)
                    .or_else(|| candidates.first())
                    .copied()
            });
        let Some(specialized) = superclass else {
            problems.push(DefinitionError::SpecializationWithoutSuper {
                class: definition.class.name().to_string(),
            });
            continue;
        };

        let inherited = definitions[specialized].attributes.clone();
        let target = definitions[specialized].id.clone();
        let definition = &mut definitions[index];
        tracing::debug!("{} specializes {target}", definition.id);
        definition.specializes = Some(target);
        let mut qualifiers = definition.attributes.qualifiers.clone();
        qualifiers.extend(inherited.qualifiers);
        definition.attributes.qualifiers = normalize_component_qualifiers(qualifiers);
        if inherited.name.is_some() {
            definition.attributes.name = inherited.name;
        }
    }

    if problems.is_empty() {
        Ok(definitions)
    } else {
        problems.normalize();
        Err(problems)
    }
}

fn build_class_component(
    services: &ContainerServices,
    definition: ClassDefinition,
) -> Result<Arc<Component>, Problems> {
    let store = &services.store;
    let class = definition.class;
    let attributes = definition.attributes;
    let normal_scoped = store.is_normal_scope(&attributes.scope);

    if normal_scoped {
        if let Some(field) = class
            .fields
            .iter()
            .find(|f| f.member.modifiers.is_public && !f.member.modifiers.is_static)
        {
            return Err(DefinitionError::PublicFieldOnNormalScope {
                class: class.name().to_string(),
                field: field.member.name.to_string(),
            }
            .into());
        }
    }

    let producer = ManagedProducer::new(store, class.clone(), &definition.id)?;
    let injection_points = producer.injection_points();

    let role = match definition.role {
        ClassRole::Plain => ComponentRole::Plain,
        ClassRole::Interceptor => {
            let stereotype_bindings = class
                .stereotypes
                .iter()
                .filter_map(|s| store.model(&s.annotation_type).stereotype.clone())
                .flat_map(|s| s.interceptor_bindings);
            let bindings = class
                .interceptor_bindings
                .iter()
                .cloned()
                .chain(stereotype_bindings)
                .flat_map(|b| store.binding_closure(&b))
                .collect::<BTreeSet<_>>();
            if bindings.is_empty() {
                return Err(DefinitionError::InterceptorWithoutBindings {
                    class: class.name().to_string(),
                }
                .into());
            }
            let metadata = services.interceptor_metadata.class_metadata(&class)?;
            ComponentRole::Interceptor(InterceptorInfo { bindings, metadata })
        }
        ClassRole::Decorator => {
            let delegates = injection_points
                .iter()
                .filter(|ip| ip.delegate)
                .cloned()
                .collect::<Vec<_>>();
            let [delegate] = delegates.as_slice() else {
                return Err(DefinitionError::DecoratorDelegate {
                    class: class.name().to_string(),
                    found: delegates.len(),
                }
                .into());
            };
            let transformer = &*services.transformer;
            let decorated_types = attributes
                .types
                .iter()
                .filter(|t| !t.is_object())
                .filter(|t| {
                    t.raw_name()
                        .and_then(|raw| transformer.get(raw))
                        .is_some_and(|c| c.modifiers.is_interface)
                })
                .filter(|t| is_assignable(transformer, t, &delegate.required))
                .cloned()
                .collect();
            ComponentRole::Decorator(DecoratorInfo {
                delegate: delegate.clone(),
                decorated_types,
            })
        }
    };

    tracing::trace!("Built {}", definition.id);
    Ok(Arc::new(Component {
        id: definition.id,
        kind: ComponentKind::Managed,
        archive: definition.archive,
        role,
        passivation_capable: class.annotated.modifiers.serializable,
        passivating_scope: store.is_passivating_scope(&attributes.scope),
        normal_scoped,
        proxyable: class.proxyable,
        attributes,
        class: Some(class),
        injection_points,
        specializes: definition.specializes,
        declaring: None,
        producer: Arc::new(producer),
    }))
}

/// Producers, disposers and observers declared by a managed component
fn deploy_members(
    services: &ContainerServices,
    notifier: &ObserverNotifier,
    component: &Arc<Component>,
) -> Result<(Vec<Arc<Component>>, Vec<ObserverMethod>), Problems> {
    let Some(class) = &component.class else {
        return Ok((Vec::new(), Vec::new()));
    };
    let mut problems = Problems::new();

    let mut producers = Vec::new();
    for method in class.methods_annotated(builtin::PRODUCES) {
        match define_producer_method(services, notifier, component, method) {
            Ok(Some(definition)) => producers.push(definition),
            Ok(None) => {}
            Err(p) => problems.extend(p),
        }
    }
    for field in class.fields_annotated(builtin::PRODUCES) {
        match define_producer_field(services, notifier, component, field) {
            Ok(Some(definition)) => producers.push(definition),
            Ok(None) => {}
            Err(p) => problems.extend(p),
        }
    }

    for method in class.methods_with_parameter_annotated(builtin::DISPOSES) {
        if let Err(e) = link_disposer(services, component, method, &producers) {
            problems.push(e);
        }
    }

    let mut observers = Vec::new();
    for method in class.methods_with_parameter_annotated(builtin::OBSERVES) {
        match ObserverMethod::from_method(&services.store, component, method) {
            Ok(observer) => observers.push(observer),
            Err(e) => problems.push(e),
        }
    }

    if !problems.is_empty() {
        return Err(problems);
    }

    let store = &services.store;
    let components = producers
        .into_iter()
        .map(|definition| {
            let mut injection_points = definition.points;
            if let Some(disposer) = definition.handle.disposer() {
                injection_points.extend(disposer.injection_points().iter().cloned());
            }
            let scope = &definition.attributes.scope;
            Arc::new(Component {
                id: definition.id,
                kind: definition.kind,
                archive: component.archive.clone(),
                role: ComponentRole::Plain,
                normal_scoped: store.is_normal_scope(scope),
                passivating_scope: store.is_passivating_scope(scope),
                attributes: definition.attributes,
                class: None,
                injection_points,
                proxyable: definition.proxyable,
                passivation_capable: definition.passivation_capable,
                specializes: None,
                declaring: Some(component.id.clone()),
                producer: definition.handle.into_producer(),
            })
        })
        .collect();
    Ok((components, observers))
}

/// Reads and checks the attributes of a producer member
fn producer_attributes(
    services: &ContainerServices,
    member: String,
    annotations: &AnnotationSet,
    ty: &Type,
    default_name: String,
) -> Result<ComponentAttributes, DefinitionError> {
    if ty.contains_wildcard() {
        return Err(DefinitionError::WildcardProducerType {
            member,
            ty: ty.to_string(),
        });
    }
    let attributes = read_attributes(
        &services.store,
        &*services.transformer,
        AttributeSource {
            member: member.clone(),
            annotations,
            base_type: ty.clone(),
            default_name,
        },
    )?;
    if ty.contains_variable() && !attributes.is_dependent() {
        return Err(DefinitionError::TypeVariableProducer {
            member,
            ty: ty.to_string(),
            scope: attributes.scope.to_string(),
        });
    }
    Ok(attributes)
}

/// Products are passivation capable unless their class is known not to be serializable
fn product_facts(services: &ContainerServices, ty: &Type) -> (bool, bool) {
    let class = ty.raw_name().and_then(|raw| services.transformer.get(raw));
    let passivation_capable = class.as_ref().map_or(true, |c| c.modifiers.serializable);
    let proxyable = class.as_ref().map_or(true, |c| !c.modifiers.is_final);
    (passivation_capable, proxyable)
}

fn define_producer_method(
    services: &ContainerServices,
    notifier: &ObserverNotifier,
    declaring: &Component,
    method: &EnhancedMethod,
) -> Result<Option<ProducerDefinition>, Problems> {
    let member = &method.member;
    let Some(ty) = &member.return_type else {
        return Err(DefinitionError::InvalidMember {
            member: member.qualified_name(),
            reason: "a producer method must return a value".to_string(),
        }
        .into());
    };
    if member
        .parameters
        .iter()
        .any(|p| p.annotations.contains(builtin::DISPOSES) || p.annotations.contains(builtin::OBSERVES))
    {
        return Err(DefinitionError::InvalidMember {
            member: member.qualified_name(),
            reason: "a producer method cannot dispose or observe".to_string(),
        }
        .into());
    }

    let id = ComponentIdentifier::producer_method(&declaring.id, &member.signature());
    let attributes = producer_attributes(
        services,
        member.qualified_name(),
        &member.annotations,
        ty,
        producer_name(&member.name),
    )?;
    let Some(attributes) = fire_attributes(notifier, &id, ComponentKind::ProducerMethod, attributes)?
    else {
        return Ok(None);
    };

    let producer = Arc::new(ProducerMethodProducer::new(
        &services.store,
        declaring.id.clone(),
        method.clone(),
        &id,
    ));
    let (passivation_capable, proxyable) = product_facts(services, ty);
    Ok(Some(ProducerDefinition {
        id,
        kind: ComponentKind::ProducerMethod,
        attributes,
        points: producer.injection_points().to_vec(),
        passivation_capable,
        proxyable,
        handle: ProducerHandle::Method(producer),
    }))
}

fn define_producer_field(
    services: &ContainerServices,
    notifier: &ObserverNotifier,
    declaring: &Component,
    field: &EnhancedField,
) -> Result<Option<ProducerDefinition>, Problems> {
    let member = &field.member;
    let id = ComponentIdentifier::producer_field(&declaring.id, &member.name);
    let attributes = producer_attributes(
        services,
        member.qualified_name(),
        &member.annotations,
        &member.ty,
        member.name.to_string(),
    )?;
    let Some(attributes) = fire_attributes(notifier, &id, ComponentKind::ProducerField, attributes)?
    else {
        return Ok(None);
    };

    let (passivation_capable, proxyable) = product_facts(services, &member.ty);
    Ok(Some(ProducerDefinition {
        id,
        kind: ComponentKind::ProducerField,
        attributes,
        points: Vec::new(),
        passivation_capable,
        proxyable,
        handle: ProducerHandle::Field(Arc::new(ProducerFieldProducer::new(
            declaring.id.clone(),
            field.clone(),
        ))),
    }))
}

/// Links a disposer to every producer of the same class it matches
fn link_disposer(
    services: &ContainerServices,
    declaring: &Component,
    method: &EnhancedMethod,
    producers: &[ProducerDefinition],
) -> Result<(), DefinitionError> {
    let disposer = Arc::new(Disposer::new(&services.store, method.clone(), &declaring.id)?);
    let disposed = disposer.disposed();

    let mut matched = false;
    for producer in producers {
        let types = producer.attributes.types.iter().cloned().collect::<Vec<_>>();
        if matches_any(&*services.transformer, &disposed.required, &types)
            && disposed.qualifiers.is_subset(&producer.attributes.qualifiers)
        {
            producer.handle.set_disposer(disposer.clone())?;
            matched = true;
        }
    }
    if !matched {
        return Err(DefinitionError::UnmatchedDisposer {
            member: disposer.name(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_decapitalize_the_simple_name() {
        assert_eq!(default_name("com.acme.PaymentService"), "paymentService");
        assert_eq!(default_name("Foo"), "foo");
        assert_eq!(default_name("weft::demo::Clock"), "clock");
    }

    #[test]
    fn getters_produce_property_names() {
        assert_eq!(producer_name("getPrice"), "price");
        assert_eq!(producer_name("price"), "price");
        assert_eq!(producer_name("getaway"), "getaway");
    }
}
