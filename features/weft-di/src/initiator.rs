//! The bootstrap state machine
//!
//! A deployment is booted in strictly ordered phases. Each phase completes for every
//! archive before the next one starts, work inside a phase may run on the executor.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    sync::Arc,
};

use weft_config::ContainerConfiguration;

use crate::{
    bootstrap::{
        deployer::{BeanDeployer, Deployed},
        deployment::{Archive, DeploymentDescriptor, DeploymentStructure, Enablement},
        executor::Executor,
        services::{ResourceLoader, ServiceRegistry},
        validator::Validator,
    },
    component::Component,
    errors::{BootstrapError, Problem, Problems},
    events::{
        fast::FastProcessAnnotatedTypeResolver,
        lifecycle::{
            AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery,
            BeforeBeanDiscovery, BeforeShutdown, ProcessAnnotatedType,
        },
        notifier::ObserverNotifier,
        observer::ObserverMethod,
        preloader::ObserverPreloader,
    },
    ids::{ArchiveId, DeploymentId},
    interception::proxy::{DynamicProxyFactory, ProxyFactory},
    manager::{BeanManager, ContainerServices},
    metadata::annotated::AnnotatedType,
    resolution::resolvable::EventDescriptor,
};

/// Where the bootstrap of a container stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerState {
    Stopped,
    Starting,
    Discovered,
    Deployed,
    Validated,
    Initialized,
    Shutdown,
}
impl Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContainerState::Stopped => "stopped",
            ContainerState::Starting => "starting",
            ContainerState::Discovered => "discovered",
            ContainerState::Deployed => "deployed",
            ContainerState::Validated => "validated",
            ContainerState::Initialized => "initialized",
            ContainerState::Shutdown => "shut down",
        };
        f.write_str(name)
    }
}

/// Everything that exists once [ContainerInitiator::start_container] succeeded
struct Booting {
    descriptor: DeploymentDescriptor,
    services: Arc<ContainerServices>,
    loader: Arc<dyn ResourceLoader>,
    executor: Executor,
    notifier: ObserverNotifier,
    structure: DeploymentStructure,
    /// One manager per archive
    managers: BTreeMap<ArchiveId, BeanManager>,
    /// Sees every component of the deployment, used for lifecycle events and scope events
    deployment_manager: BeanManager,
    /// Classes which survived discovery, in discovery order
    discovered: Vec<(ArchiveId, Arc<AnnotatedType>)>,
    preloader: Option<ObserverPreloader>,
}

impl Booting {
    fn default_archive(&self) -> ArchiveId {
        self.managers
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| self.deployment_manager.archive().clone())
    }

    /// The manager of an archive, the first archive's for unknown ones
    fn manager_or_default(&self, archive: &ArchiveId) -> &BeanManager {
        if let Some(manager) = self.managers.get(archive) {
            return manager;
        }
        tracing::warn!("Unknown archive {archive}, using the default archive instead");
        self.managers
            .values()
            .next()
            .unwrap_or(&self.deployment_manager)
    }

    fn all_managers(&self) -> impl Iterator<Item = &BeanManager> {
        self.managers
            .values()
            .chain(std::iter::once(&self.deployment_manager))
    }

    /// Every manager sees the components and observers of the archives it can access
    fn refresh_visibility(&self) {
        let accessibility = self.structure.accessibility();
        for (archive, manager) in &self.managers {
            let visible = accessibility
                .get(archive)
                .cloned()
                .unwrap_or_else(|| BTreeSet::from([archive.clone()]));
            let mut components = Vec::new();
            let mut observers = Vec::new();
            for accessible in &visible {
                if let Some(other) = self.managers.get(accessible) {
                    components.extend(other.own_components());
                    observers.extend(other.own_observers());
                }
            }
            manager.refresh(components, observers);
        }

        let (components, observers) = self.everything();
        self.deployment_manager.refresh(components, observers);
    }

    fn everything(&self) -> (Vec<Arc<Component>>, Vec<Arc<ObserverMethod>>) {
        let mut components = Vec::new();
        let mut observers = Vec::new();
        for manager in self.managers.values() {
            components.extend(manager.own_components());
            observers.extend(manager.own_observers());
        }
        (components, observers)
    }

    fn clear_caches(&self) {
        for manager in self.all_managers() {
            manager.clear_caches();
        }
    }

    fn enable_everywhere(&self, alternatives: &[Arc<str>], interceptors: &[Arc<str>], decorators: &[Arc<str>]) {
        for manager in self.all_managers() {
            let mut enablement = manager.enablement();
            extend_unique(&mut enablement.alternatives, alternatives);
            extend_unique(&mut enablement.interceptors, interceptors);
            extend_unique(&mut enablement.decorators, decorators);
            manager.set_enablement(enablement);
        }
    }

    /// Adds an archive an extension brought in during discovery
    ///
    /// An archive whose id is already known merges its classes and links into it. Returns
    /// the classes still to discover.
    fn add_archive(&mut self, archive: Archive) -> Vec<(ArchiveId, Arc<str>)> {
        for ty in &archive.types {
            self.services.transformer.register(ty.clone());
        }
        let classes = archive
            .classes
            .iter()
            .map(|c| (archive.id.clone(), c.clone()))
            .collect();

        let mut enablement = self.deployment_manager.enablement();
        extend_unique(&mut enablement.alternatives, &archive.enablement.alternatives);
        extend_unique(&mut enablement.interceptors, &archive.enablement.interceptors);
        extend_unique(&mut enablement.decorators, &archive.enablement.decorators);
        self.deployment_manager.set_enablement(enablement);

        match self.descriptor.archives.iter_mut().find(|a| a.id == archive.id) {
            Some(known) => {
                tracing::debug!(
                    "Extending archive {} with {} classes",
                    known.id,
                    archive.classes.len()
                );
                for link in archive.accessible {
                    if !known.accessible.contains(&link) {
                        known.accessible.push(link);
                    }
                }
                known.classes.extend(archive.classes);
                known.types.extend(archive.types);
                self.structure.add(known);
            }
            None => {
                tracing::debug!(
                    "Adding archive {} with {} classes",
                    archive.id,
                    archive.classes.len()
                );
                let manager = BeanManager::new(archive.id.clone(), self.services.clone());
                manager.set_enablement(archive.enablement.clone());
                self.managers.insert(archive.id.clone(), manager);
                self.structure.add(&archive);
                self.descriptor.archives.push(archive);
            }
        }
        classes
    }

    /// Loads and processes classes on the executor
    fn discover(
        &self,
        classes: Vec<(ArchiveId, Arc<str>)>,
        fast: Option<Arc<FastProcessAnnotatedTypeResolver>>,
        strict: bool,
    ) -> Result<Vec<(ArchiveId, Arc<AnnotatedType>)>, BootstrapError> {
        let services = self.services.clone();
        let notifier = self.notifier.clone();
        let discovered = self
            .executor
            .invoke_all(classes, move |(archive, name)| {
                discover_class(&services, &notifier, fast.as_deref(), strict, archive, &name)
            })
            .map_err(to_bootstrap_error)?;
        Ok(discovered.into_iter().flatten().collect())
    }

    fn cancel_preloading(&mut self) {
        if let Some(preloader) = self.preloader.take() {
            preloader.cancel();
        }
    }
}

fn extend_unique(target: &mut Vec<Arc<str>>, additions: &[Arc<str>]) {
    for addition in additions {
        if !target.contains(addition) {
            target.push(addition.clone());
        }
    }
}

/// Boots a deployment phase by phase
///
/// [ContainerInitiator::initialize] runs every phase, the phases are public so that a
/// host can interleave its own work.
pub struct ContainerInitiator {
    configuration: ContainerConfiguration,
    registry: Arc<ServiceRegistry>,
    state: ContainerState,
    booting: Option<Booting>,
}

impl ContainerInitiator {
    pub fn new(configuration: ContainerConfiguration, registry: ServiceRegistry) -> Self {
        Self {
            configuration,
            registry: Arc::new(registry),
            state: ContainerState::Stopped,
            booting: None,
        }
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn configuration(&self) -> &ContainerConfiguration {
        &self.configuration
    }

    pub fn deployment(&self) -> Option<&DeploymentId> {
        self.booting.as_ref().map(|b| &b.descriptor.id)
    }

    /// The manager seeing every component, available once the container started
    pub fn manager(&self) -> Option<&BeanManager> {
        self.booting.as_ref().map(|b| &b.deployment_manager)
    }

    pub fn manager_for(&self, archive: &ArchiveId) -> Option<&BeanManager> {
        self.booting.as_ref()?.managers.get(archive)
    }

    pub fn managers(&self) -> Option<&BTreeMap<ArchiveId, BeanManager>> {
        self.booting.as_ref().map(|b| &b.managers)
    }

    /// Runs every phase
    ///
    /// Returns false if the deployment has nothing to boot. On failure whatever was
    /// created is torn down and the container is left shut down.
    pub fn initialize(&mut self, descriptor: DeploymentDescriptor) -> Result<bool, BootstrapError> {
        if descriptor.is_empty() {
            tracing::debug!("Deployment {} is empty, nothing to boot", descriptor.id);
            return Ok(false);
        }
        self.boot(descriptor)?;
        Ok(true)
    }

    /// Runs every phase, even for an empty deployment
    pub(crate) fn boot(&mut self, descriptor: DeploymentDescriptor) -> Result<(), BootstrapError> {
        let id = descriptor.id.clone();
        let result = self
            .start_container(descriptor)
            .and_then(|_| self.start_initialization())
            .and_then(|_| self.deploy_beans())
            .and_then(|_| self.validate_beans())
            .and_then(|_| self.end_initialization());

        if let Err(e) = result {
            tracing::error!("Bootstrap of deployment {id} failed: {e}");
            self.abort();
            return Err(e);
        }
        Ok(())
    }

    fn expect_state(
        &self,
        expected: ContainerState,
        operation: &'static str,
    ) -> Result<(), BootstrapError> {
        if self.state != expected {
            return Err(BootstrapError::IllegalState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn booting(&self, operation: &'static str) -> Result<&Booting, BootstrapError> {
        self.booting.as_ref().ok_or(BootstrapError::IllegalState {
            operation,
            state: self.state.to_string(),
        })
    }

    fn booting_mut(&mut self, operation: &'static str) -> Result<&mut Booting, BootstrapError> {
        let state = self.state.to_string();
        self.booting
            .as_mut()
            .ok_or(BootstrapError::IllegalState { operation, state })
    }

    /// Creates the shared services, the executor and one manager per archive
    pub fn start_container(&mut self, descriptor: DeploymentDescriptor) -> Result<(), BootstrapError> {
        self.expect_state(ContainerState::Stopped, "start the container")?;

        let loader = self.registry.require::<Arc<dyn ResourceLoader>>()?;
        let proxy_factory = self
            .registry
            .get::<Arc<dyn ProxyFactory>>()
            .unwrap_or_else(|| Arc::new(DynamicProxyFactory));

        let services = Arc::new(ContainerServices::new(
            descriptor.id.clone(),
            self.configuration.clone(),
            self.registry.clone(),
            proxy_factory,
        ));
        services.transformer.set_loader(loader.clone());
        for definition in &descriptor.annotations {
            services.store.register(definition.clone());
        }

        let executor = Executor::new(&self.configuration)?;

        let mut managers = BTreeMap::new();
        let mut merged = Enablement::default();
        for archive in &descriptor.archives {
            for ty in &archive.types {
                services.transformer.register(ty.clone());
            }
            let manager = BeanManager::new(archive.id.clone(), services.clone());
            manager.set_enablement(archive.enablement.clone());
            extend_unique(&mut merged.alternatives, &archive.enablement.alternatives);
            extend_unique(&mut merged.interceptors, &archive.enablement.interceptors);
            extend_unique(&mut merged.decorators, &archive.enablement.decorators);
            managers.insert(archive.id.clone(), manager);
        }

        let deployment_manager = BeanManager::new(
            ArchiveId::new(format!("{}#deployment", descriptor.id)),
            services.clone(),
        );
        deployment_manager.set_enablement(merged);
        services.contexts.attach(deployment_manager.downgrade());

        tracing::debug!(
            "Starting container {} with {} archives and {} extensions",
            descriptor.id,
            descriptor.archives.len(),
            descriptor.extensions.len()
        );

        self.booting = Some(Booting {
            structure: DeploymentStructure::new(&descriptor.archives),
            notifier: ObserverNotifier::new(descriptor.extensions.clone()),
            descriptor,
            services,
            loader,
            executor,
            managers,
            deployment_manager,
            discovered: Vec::new(),
            preloader: None,
        });
        self.state = ContainerState::Starting;
        Ok(())
    }

    /// Fires BeforeBeanDiscovery, discovers the classes of every archive and fires
    /// AfterTypeDiscovery
    pub fn start_initialization(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(ContainerState::Starting, "start the initialization")?;
        let strict = self.configuration.strict_discovery;
        let booting = self.booting_mut("start the initialization")?;

        let mut before = BeforeBeanDiscovery::new(booting.default_archive());
        booting
            .notifier
            .fire_lifecycle_event(&mut before)
            .into_result()?;
        for definition in before.annotations {
            booting.services.store.register(definition);
        }
        for archive in before.archives {
            // Their classes are picked up with the descriptor's below
            booting.add_archive(archive);
        }

        let mut classes = Vec::new();
        for archive in &booting.descriptor.archives {
            classes.extend(archive.classes.iter().map(|c| (archive.id.clone(), c.clone())));
        }
        for (archive, ty) in before.types {
            let archive = booting.manager_or_default(&archive).archive().clone();
            let ty = booting.services.transformer.register(ty);
            classes.push((archive, ty.name.clone()));
        }

        let fast = FastProcessAnnotatedTypeResolver::new(
            booting.notifier.extensions(),
            booting.loader.clone(),
            booting.services.store.clone(),
        );
        let fast = (!fast.is_empty()).then(|| Arc::new(fast));

        let mut requested = classes.len();
        booting.discovered = booting.discover(classes, fast.clone(), strict)?;

        let mut after = AfterTypeDiscovery::new(booting.default_archive());
        booting
            .notifier
            .fire_lifecycle_event(&mut after)
            .into_result()?;
        let mut added = Vec::new();
        for archive in after.archives {
            added.extend(booting.add_archive(archive));
        }
        requested += added.len();
        let late = booting.discover(added, fast, strict)?;
        booting.discovered.extend(late);
        for (archive, ty) in after.types {
            let archive = booting.manager_or_default(&archive).archive().clone();
            let ty = booting.services.transformer.register(ty);
            booting.discovered.push((archive, ty));
        }
        booting.enable_everywhere(&after.alternatives, &after.interceptors, &after.decorators);
        booting.refresh_visibility();

        tracing::debug!(
            "Discovered {} of {} classes",
            booting.discovered.len(),
            requested
        );
        self.state = ContainerState::Discovered;
        Ok(())
    }

    /// Creates every component, fires AfterBeanDiscovery and starts preloading observers
    pub fn deploy_beans(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(ContainerState::Discovered, "deploy beans")?;
        let preload = self.configuration.preloader_enabled;
        let booting = self.booting_mut("deploy beans")?;

        let classes = std::mem::take(&mut booting.discovered);
        let deployer = BeanDeployer::new(
            &booting.executor,
            booting.services.clone(),
            booting.notifier.clone(),
        );
        let Deployed {
            components,
            observers,
        } = deployer.deploy(classes).map_err(to_bootstrap_error)?;

        for component in components {
            booting.manager_or_default(&component.archive).add_component(component);
        }
        for observer in observers {
            booting.manager_or_default(&observer.archive).add_observer(observer);
        }
        booting.refresh_visibility();

        let mut after = AfterBeanDiscovery::new(booting.default_archive());
        let mut problems = booting.notifier.fire_lifecycle_event(&mut after);
        for (archive, synthetic) in after.components {
            let manager = booting.manager_or_default(&archive);
            match synthetic.build(manager.archive(), &booting.services.transformer) {
                Ok(component) => manager.add_component(component),
                Err(e) => problems.push(e),
            }
        }
        for observer in after.observers {
            booting
                .manager_or_default(&observer.archive)
                .add_observer(Arc::new(observer));
        }
        for context in after.contexts {
            booting.services.contexts.add(context);
        }
        problems.into_result()?;

        // Refreshing flushes every cache, the bean addition window closes here
        booting.refresh_visibility();

        let (components, observers) = booting.everything();
        if preload && booting.executor.is_parallel() {
            let preloader = ObserverPreloader::new();
            let events = observers
                .iter()
                .map(|o| EventDescriptor::new(o.observed_type.clone(), o.qualifiers.clone()))
                .collect::<BTreeSet<_>>();
            preloader.preload(
                &booting.executor,
                booting.deployment_manager.observer_resolver(),
                events.into_iter().collect(),
            );
            booting.preloader = Some(preloader);
        }

        tracing::debug!(
            "Deployed {} components and {} observers",
            components.len(),
            observers.len()
        );
        self.state = ContainerState::Deployed;
        Ok(())
    }

    /// Validates the deployment and fires AfterDeploymentValidation
    pub fn validate_beans(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(ContainerState::Deployed, "validate beans")?;
        let booting = self.booting("validate beans")?;

        Validator::new(&booting.executor, &booting.managers)
            .validate_deployment()
            .map_err(to_bootstrap_error)?;

        let mut after = AfterDeploymentValidation::new(booting.deployment_manager.clone());
        let problems = booting.notifier.fire_lifecycle_event(&mut after);
        booting.clear_caches();
        problems.into_result()?;

        tracing::debug!("Deployment {} validated", booting.descriptor.id);
        self.state = ContainerState::Validated;
        Ok(())
    }

    /// Drops per boot metadata and announces the application scope
    pub fn end_initialization(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(ContainerState::Validated, "end the initialization")?;
        let booting = self.booting_mut("end the initialization")?;

        booting.cancel_preloading();
        booting.services.transformer.clear();
        booting.services.store.clear();
        booting.services.interceptor_metadata.clear();
        booting.clear_caches();

        booting.services.contexts.application().announce();

        tracing::info!(
            "Container {} initialized with {} components",
            booting.descriptor.id,
            booting.services.components.len()
        );
        self.state = ContainerState::Initialized;
        Ok(())
    }

    /// Fires BeforeShutdown, destroys every contextual instance and stops the executor
    ///
    /// Shutting down a container which never started or was already shut down does nothing.
    pub fn shutdown(&mut self) {
        if matches!(self.state, ContainerState::Stopped | ContainerState::Shutdown) {
            return;
        }
        let Some(booting) = self.booting.as_mut() else {
            self.state = ContainerState::Shutdown;
            return;
        };

        tracing::debug!("Shutting down container {}", booting.descriptor.id);
        let mut before = BeforeShutdown::new(booting.deployment_manager.clone());
        for problem in booting.notifier.fire_lifecycle_event(&mut before).errors {
            tracing::warn!("Problem during shutdown: {problem}");
        }

        booting.cancel_preloading();
        booting
            .services
            .contexts
            .invalidate(&booting.deployment_manager);
        booting.executor.shutdown();
        self.state = ContainerState::Shutdown;
    }

    /// Tears down a failed bootstrap, no BeforeShutdown is fired
    fn abort(&mut self) {
        if let Some(booting) = self.booting.as_mut() {
            booting.cancel_preloading();
            booting
                .services
                .contexts
                .invalidate(&booting.deployment_manager);
            booting.executor.shutdown();
        }
        self.state = ContainerState::Shutdown;
    }
}

fn to_bootstrap_error(problems: Problems) -> BootstrapError {
    match problems.into_result() {
        Err(e) => e,
        Ok(()) => BootstrapError::Other("Deployment failed without a reported problem".to_string()),
    }
}

/// Loads a class and lets the extensions observing it modify or veto it
fn discover_class(
    services: &ContainerServices,
    notifier: &ObserverNotifier,
    fast: Option<&FastProcessAnnotatedTypeResolver>,
    strict: bool,
    archive: ArchiveId,
    name: &str,
) -> Result<Option<(ArchiveId, Arc<AnnotatedType>)>, Problems> {
    let ty = match services.transformer.load(name) {
        Ok(ty) => ty,
        Err(e) if strict => return Err(Problem::from(e).into()),
        Err(e) => {
            tracing::warn!("Skipping class {name} of archive {archive}: {e}");
            return Ok(None);
        }
    };

    let Some(fast) = fast else {
        return Ok(Some((archive, ty)));
    };
    let observing = match fast.resolve(&ty.class_info()) {
        Ok(observing) => observing,
        Err(e) => {
            tracing::trace!("{e}, resolving over the loaded class");
            let enhanced = services.transformer.enhance(&ty)?;
            fast.resolve_loaded(&enhanced)
        }
    };
    if observing.is_empty() {
        return Ok(Some((archive, ty)));
    }

    let mut event = ProcessAnnotatedType::new(archive.clone(), (*ty).clone());
    let problems = notifier.fire_to(observing.iter(), &mut event);
    if !problems.is_empty() {
        return Err(problems);
    }
    let modified = event.is_modified();
    match event.into_result() {
        (None, _) => {
            tracing::debug!("Class {name} was vetoed");
            Ok(None)
        }
        (Some(replacement), _) if modified => {
            Ok(Some((archive, services.transformer.register(replacement))))
        }
        (Some(_), _) => Ok(Some((archive, ty))),
    }
}
