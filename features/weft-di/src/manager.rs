//! The [BeanManager]: what applications and extensions use to talk to the container
//!
//! Every archive of a deployment gets its own manager, seeing the components of the
//! archives it can access. The managers of one deployment share [ContainerServices]:
//! contexts, metadata caches and client proxies.

use std::{
    any::{type_name, TypeId},
    fmt::Debug,
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use parking_lot::RwLock;
use weft_config::ContainerConfiguration;

use crate::{
    bootstrap::{deployment::Enablement, services::ServiceRegistry},
    component::{
        builtin::{self as builtin_components, Lookup},
        Component, ComponentKind, InjectionPoint,
    },
    context::{
        conversation::ConversationContext, creational::CreationalContext,
        registry::Contexts, request::{RequestActivation, RequestContext},
        session::SessionContext, Context, ContextualInstance,
    },
    errors::{InjectError, ResolutionError},
    events::observer::ObserverMethod,
    ids::{ArchiveId, ComponentIdentifier, ContextualStore, DeploymentId},
    interception::{
        metadata::InterceptorMetadataReader,
        model::{InterceptionModel, InterceptionModelBuilder},
        proxy::{ClientProxyHandler, ProxyFactory, ProxyObject},
    },
    metadata::{
        annotation::Annotation, reflection::Type, store::MetaAnnotationStore,
        transformer::ClassTransformer,
    },
    reference::Reference,
    resolution::{
        observers::TypeSafeObserverResolver,
        qualifiers::QualifierSet,
        resolvable::{Candidates, EventDescriptor, Resolvable},
        resolver::TypeSafeBeanResolver,
    },
    resolver::Resolver,
    types::{value, Injectable, Value},
};

/// State shared by every manager of a deployment
pub(crate) struct ContainerServices {
    pub id: DeploymentId,
    pub configuration: ContainerConfiguration,
    pub store: Arc<MetaAnnotationStore>,
    pub transformer: Arc<ClassTransformer>,
    pub registry: Arc<ServiceRegistry>,
    pub contextual: Arc<ContextualStore>,
    pub contexts: Contexts,
    pub interceptor_metadata: InterceptorMetadataReader,
    pub proxy_factory: Arc<dyn ProxyFactory>,
    /// One client proxy per normal scoped component
    pub proxies: DashMap<ComponentIdentifier, Arc<dyn ProxyObject>>,
    pub instance_component: Arc<Component>,
    /// Every component of every archive
    pub components: DashMap<ComponentIdentifier, Arc<Component>>,
}

impl ContainerServices {
    pub fn new(
        id: DeploymentId,
        configuration: ContainerConfiguration,
        registry: Arc<ServiceRegistry>,
        proxy_factory: Arc<dyn ProxyFactory>,
    ) -> Self {
        let store = Arc::new(MetaAnnotationStore::new());
        let transformer = Arc::new(ClassTransformer::new(store.clone()));
        let contextual = Arc::new(ContextualStore::new());
        let contexts = Contexts::new(contextual.clone(), configuration.lazy_conversation_context);
        Self {
            id,
            configuration,
            store,
            transformer,
            registry,
            contextual,
            contexts,
            interceptor_metadata: InterceptorMetadataReader::new(),
            proxy_factory,
            proxies: DashMap::new(),
            instance_component: builtin_components::instance_component(),
            components: DashMap::new(),
        }
    }
}

pub(crate) struct ManagerInner {
    archive: ArchiveId,
    services: Arc<ContainerServices>,
    resolver: TypeSafeBeanResolver,
    observer_resolver: Arc<TypeSafeObserverResolver>,
    enablement: RwLock<Enablement>,
    /// Components and observers declared in this manager's archive
    own_components: RwLock<Vec<Arc<Component>>>,
    own_observers: RwLock<Vec<Arc<ObserverMethod>>>,
    models: DashMap<ComponentIdentifier, Option<Arc<InterceptionModel>>>,
    decorators: DashMap<ComponentIdentifier, Vec<Arc<Component>>>,
}

/// Entry point into a container, bound to one archive
///
/// Cheap to clone, every clone talks to the same container.
#[derive(Clone)]
pub struct BeanManager(Arc<ManagerInner>);

/// A manager reference which does not keep the container alive
#[derive(Clone)]
pub struct WeakManager(Weak<ManagerInner>);

impl WeakManager {
    pub fn upgrade(&self) -> Result<BeanManager, InjectError> {
        self.0
            .upgrade()
            .map(BeanManager)
            .ok_or(InjectError::ContainerUnavailable)
    }
}

impl Debug for BeanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanManager")
            .field("deployment", &self.0.services.id)
            .field("archive", &self.0.archive)
            .finish()
    }
}

impl BeanManager {
    pub(crate) fn new(archive: ArchiveId, services: Arc<ContainerServices>) -> Self {
        let transformer = services.transformer.clone();
        BeanManager(Arc::new(ManagerInner {
            archive,
            resolver: TypeSafeBeanResolver::new(transformer.clone()),
            observer_resolver: Arc::new(TypeSafeObserverResolver::new(transformer)),
            services,
            enablement: RwLock::new(Enablement::default()),
            own_components: RwLock::new(Vec::new()),
            own_observers: RwLock::new(Vec::new()),
            models: DashMap::new(),
            decorators: DashMap::new(),
        }))
    }

    pub fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.0))
    }

    pub fn deployment(&self) -> &DeploymentId {
        &self.0.services.id
    }

    pub fn archive(&self) -> &ArchiveId {
        &self.0.archive
    }

    pub fn configuration(&self) -> &ContainerConfiguration {
        &self.0.services.configuration
    }

    pub fn store(&self) -> &Arc<MetaAnnotationStore> {
        &self.0.services.store
    }

    pub fn transformer(&self) -> &Arc<ClassTransformer> {
        &self.0.services.transformer
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.0.services.registry
    }

    pub fn interceptor_metadata(&self) -> &InterceptorMetadataReader {
        &self.0.services.interceptor_metadata
    }

    pub(crate) fn container_services(&self) -> &Arc<ContainerServices> {
        &self.0.services
    }

    /// Two handles to the same manager
    pub fn same(&self, other: &BeanManager) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // Resolution

    /// Every component matching the lookup
    pub fn resolve(&self, resolvable: &Resolvable) -> Candidates<Component> {
        self.0.resolver.resolve(resolvable)
    }

    pub fn resolve_unique(&self, resolvable: &Resolvable) -> Result<Arc<Component>, ResolutionError> {
        self.0.resolver.resolve_unique(resolvable)
    }

    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<Component>, ResolutionError> {
        self.0.resolver.resolve_by_name(name)
    }

    /// A lookup of `required` with the given qualifiers, `@Default` if there are none
    pub fn resolvable(&self, required: Type, qualifiers: &[Annotation]) -> Resolvable {
        Resolvable::from_annotations(self.store(), required, qualifiers)
    }

    /// Components deployed from classes, producers and extensions visible to this manager,
    /// sorted by identifier
    ///
    /// The container's built-in components are resolvable but not listed.
    pub fn components(&self) -> Candidates<Component> {
        self.0
            .resolver
            .components()
            .iter()
            .filter(|c| c.kind != ComponentKind::BuiltIn)
            .cloned()
            .collect()
    }

    pub fn interceptors(&self) -> Candidates<Component> {
        self.0.resolver.interceptors()
    }

    pub fn decorators(&self) -> Candidates<Component> {
        self.0.resolver.decorators()
    }

    pub fn observers(&self) -> Candidates<ObserverMethod> {
        self.0.observer_resolver.observers()
    }

    /// Any component of the deployment, visible to this manager or not
    pub fn component(&self, id: &ComponentIdentifier) -> Option<Arc<Component>> {
        self.0.services.components.get(id).map(|c| c.value().clone())
    }

    /// The type the container knows a Rust type as
    pub fn type_of<T: Injectable>(&self) -> Type {
        match self.transformer().name_of(TypeId::of::<T>()) {
            Some(name) => Type::class(name),
            None => Type::class(type_name::<T>()),
        }
    }

    // Instances

    pub fn create_creational_context(
        &self,
        component: Option<Arc<Component>>,
    ) -> Arc<CreationalContext> {
        CreationalContext::new(self, component)
    }

    /// A reference to the component
    ///
    /// Normal scoped components are referenced through their client proxy. Dependent
    /// instances are created as dependents of `cc`.
    pub fn get_reference(
        &self,
        component: &Arc<Component>,
        cc: &Arc<CreationalContext>,
    ) -> Result<Reference, InjectError> {
        if component.normal_scoped {
            return Ok(Reference::Proxy {
                component: component.clone(),
                proxy: self.client_proxy(component)?,
            });
        }
        if component.attributes.is_dependent() {
            return Ok(Reference::Contextual(self.create_dependent(component, cc)?));
        }
        Ok(Reference::Contextual(self.contextual_instance(component)?))
    }

    /// What the container injects into the injection point
    pub fn get_injectable_reference(
        &self,
        ip: &InjectionPoint,
        cc: &Arc<CreationalContext>,
    ) -> Result<Reference, InjectError> {
        if ip.delegate {
            return cc.delegate().cloned().ok_or_else(|| {
                InjectError::callback(
                    ip.to_string(),
                    "delegate injection points are only injected into decorators".into(),
                )
            });
        }
        if ip.is_programmatic_lookup() {
            let component = &self.0.services.instance_component;
            let child = cc.child_for(component.clone(), ip);
            let lookup = component.create(self, &child)?;
            cc.add_dependent(lookup.clone());
            return Ok(Reference::Contextual(lookup));
        }

        let component = self.resolve_unique(&ip.resolvable())?;
        if component.normal_scoped {
            return self.get_reference(&component, cc);
        }
        if component.attributes.is_dependent() {
            let child = cc.child_for(component.clone(), ip);
            let instance = component.create(self, &child)?;
            cc.add_dependent(instance.clone());
            return Ok(Reference::Contextual(instance));
        }
        Ok(Reference::Contextual(self.contextual_instance(&component)?))
    }

    /// Creates a dependent instance owned by `cc`
    pub fn create_dependent(
        &self,
        component: &Arc<Component>,
        cc: &Arc<CreationalContext>,
    ) -> Result<ContextualInstance, InjectError> {
        let child = cc.child(component.clone());
        let instance = component.create(self, &child)?;
        cc.add_dependent(instance.clone());
        Ok(instance)
    }

    /// The instance in the component's context, created if there is none
    pub fn contextual_instance(
        &self,
        component: &Arc<Component>,
    ) -> Result<ContextualInstance, InjectError> {
        self.context(&component.attributes.scope)?
            .get(component, self)
    }

    /// A reference to the single component of type `T`
    pub fn get<T: Injectable>(&self, qualifiers: &[Annotation]) -> Result<Reference, InjectError> {
        let component = self.resolve_unique(&self.resolvable(self.type_of::<T>(), qualifiers))?;
        let cc = self.create_creational_context(Some(component.clone()));
        self.get_reference(&component, &cc)
    }

    /// Resolves anything implementing [Resolver], e.g. `Arc<T>`, `Option<Arc<T>>` or `Lazy<T>`
    pub fn select<R: Resolver>(&self, qualifiers: &[Annotation]) -> Result<R, InjectError> {
        R::resolve(self, qualifiers)
    }

    /// A programmatic lookup, resolved when used
    pub fn lookup(&self, required: Type, qualifiers: &[Annotation]) -> Lookup {
        let resolvable = self.resolvable(required.clone(), qualifiers);
        Lookup::new(
            self,
            required,
            resolvable.qualifiers,
            self.create_creational_context(None),
        )
    }

    fn client_proxy(&self, component: &Arc<Component>) -> Result<Arc<dyn ProxyObject>, InjectError> {
        let services = &self.0.services;
        if let Some(proxy) = services.proxies.get(&component.id) {
            return Ok(proxy.value().clone());
        }

        // Only the proxy winning the insert gets a handler
        let types = component.attributes.types.iter().cloned().collect::<Vec<_>>();
        let created = services.proxy_factory.create(&types)?;
        let proxy = services
            .proxies
            .entry(component.id.clone())
            .or_insert_with(|| created.clone())
            .value()
            .clone();
        if Arc::ptr_eq(&proxy, &created) {
            tracing::trace!("Created client proxy for {}", component.id);
            proxy.set_handler(Arc::new(ClientProxyHandler::new(
                self.downgrade(),
                component.clone(),
            )))?;
        }
        Ok(proxy)
    }

    // Contexts

    /// The context of a scope, which may be inactive
    pub fn context(&self, scope: &str) -> Result<Arc<dyn Context>, InjectError> {
        self.0.services.contexts.get(scope)
    }

    pub fn request(&self) -> &Arc<RequestContext> {
        self.0.services.contexts.request()
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        self.0.services.contexts.session()
    }

    pub fn conversation(&self) -> &Arc<ConversationContext> {
        self.0.services.contexts.conversation()
    }

    pub(crate) fn contexts(&self) -> &Contexts {
        &self.0.services.contexts
    }

    /// Activates a request without firing scope events, if none is active on this thread
    pub fn activate_request_silently(&self) -> Option<RequestActivation> {
        self.request().activate_silently(self)
    }

    // Events

    /// Notifies every observer of the event, in priority order
    ///
    /// The first failing observer aborts the notification.
    pub fn fire_event(
        &self,
        event: Value,
        event_type: Type,
        qualifiers: &[Annotation],
    ) -> Result<(), InjectError> {
        let qualifiers: QualifierSet = qualifiers
            .iter()
            .map(|q| self.store().qualifier_instance(q))
            .collect();
        let descriptor = EventDescriptor::new(event_type, qualifiers);
        let observers = self.0.observer_resolver.resolve(&descriptor);
        tracing::trace!("Firing {descriptor} to {} observers", observers.len());
        for observer in observers.iter() {
            observer.notify(self, &event)?;
        }
        Ok(())
    }

    /// [BeanManager::fire_event] with the event type taken from `E`
    pub fn fire<E: Injectable>(&self, event: E, qualifiers: &[Annotation]) -> Result<(), InjectError> {
        let event_type = self.type_of::<E>();
        self.fire_event(value(event), event_type, qualifiers)
    }

    pub(crate) fn observer_resolver(&self) -> &Arc<TypeSafeObserverResolver> {
        &self.0.observer_resolver
    }

    // Interception

    /// The interception model of a managed component, None for everything else
    pub fn interception_model(
        &self,
        component: &Arc<Component>,
    ) -> Result<Option<Arc<InterceptionModel>>, InjectError> {
        if component.kind != ComponentKind::Managed
            || component.is_interceptor()
            || component.is_decorator()
        {
            return Ok(None);
        }
        let Some(class) = &component.class else {
            return Ok(None);
        };
        if let Some(cached) = self.0.models.get(&component.id) {
            return Ok(cached.clone());
        }

        let interceptors = self.interceptors();
        let model = InterceptionModelBuilder::new(
            self.store(),
            self.interceptor_metadata(),
            &interceptors,
        )
        .build(class)?;
        let model = Some(Arc::new(model));
        Ok(self
            .0
            .models
            .entry(component.id.clone())
            .or_insert(model)
            .clone())
    }

    /// Enabled decorators of a managed component, outermost first
    pub fn decorators_for(&self, component: &Arc<Component>) -> Vec<Arc<Component>> {
        if component.kind != ComponentKind::Managed
            || component.is_interceptor()
            || component.is_decorator()
        {
            return Vec::new();
        }
        if let Some(cached) = self.0.decorators.get(&component.id) {
            return cached.clone();
        }
        let decorators = self
            .0
            .resolver
            .resolve_decorators(&component.attributes.types, &component.attributes.qualifiers);
        self.0
            .decorators
            .entry(component.id.clone())
            .or_insert(decorators)
            .clone()
    }

    // Bootstrap

    pub(crate) fn set_enablement(&self, enablement: Enablement) {
        *self.0.enablement.write() = enablement;
    }

    pub(crate) fn enablement(&self) -> Enablement {
        self.0.enablement.read().clone()
    }

    pub(crate) fn add_component(&self, component: Arc<Component>) {
        self.0
            .services
            .components
            .insert(component.id.clone(), component.clone());
        self.0.own_components.write().push(component);
    }

    /// Removes components which were vetoed or specialized away
    pub(crate) fn retain_components(&self, keep: impl Fn(&Component) -> bool) {
        self.0.own_components.write().retain(|c| {
            let kept = keep(c);
            if !kept {
                self.0.services.components.remove(&c.id);
            }
            kept
        });
    }

    pub(crate) fn own_components(&self) -> Vec<Arc<Component>> {
        self.0.own_components.read().clone()
    }

    pub(crate) fn add_observer(&self, observer: Arc<ObserverMethod>) {
        self.0.own_observers.write().push(observer);
    }

    pub(crate) fn own_observers(&self) -> Vec<Arc<ObserverMethod>> {
        self.0.own_observers.read().clone()
    }

    /// Replaces what this manager sees and flushes every cache
    pub(crate) fn refresh(
        &self,
        mut visible: Vec<Arc<Component>>,
        observers: Vec<Arc<ObserverMethod>>,
    ) {
        visible.extend(builtin_components::components());
        let enablement = self.enablement();
        self.0.resolver.set_universe(visible, &enablement);
        self.0.observer_resolver.set_observers(observers);
        self.clear_caches();
    }

    /// Flushes resolution results, models and decorator lists
    pub(crate) fn clear_caches(&self) {
        self.0.resolver.clear();
        self.0.observer_resolver.clear();
        self.0.models.clear();
        self.0.decorators.clear();
    }
}
