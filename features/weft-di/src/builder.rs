use std::sync::Arc;

use weft_config::{ConfigProvider, ContainerConfiguration};

use crate::{
    bootstrap::{
        deployment::{Archive, DeploymentDescriptor},
        services::{ResourceLoader, ServiceRegistry, StaticResourceLoader},
    },
    container::Container,
    errors::BootstrapError,
    events::extension::Extension,
    initiator::ContainerInitiator,
    interception::proxy::ProxyFactory,
    metadata::annotation::AnnotationDefinition,
    types::Injectable,
};

//////////////////////////////////////////////////////////////////////
///
/// Booting a container takes three steps.
/// 1. The ContainerBuilder collects archives, extensions and host services
/// 2. The ContainerInitiator runs the bootstrap phases
/// 3. The Container hands out managers until it is shut down

pub struct ContainerBuilder {
    descriptor: DeploymentDescriptor,
    configuration: ContainerConfiguration,
    services: ServiceRegistry,
    configs: ConfigProvider,
}

impl ContainerBuilder {
    /// A builder for the deployment `id`
    ///
    /// Classes not registered with an archive are loaded through an empty
    /// [StaticResourceLoader] unless another loader is set.
    pub fn new(id: impl AsRef<str>) -> Self {
        let services = ServiceRegistry::new();
        services.add::<Arc<dyn ResourceLoader>>(Arc::new(StaticResourceLoader::new()));
        ContainerBuilder {
            descriptor: DeploymentDescriptor::new(id),
            configuration: ContainerConfiguration::default(),
            services,
            configs: ConfigProvider::new(),
        }
    }
}

impl ContainerBuilder {
    pub fn add_archive(mut self, archive: Archive) -> Self {
        self.descriptor.archives.push(archive);
        self
    }

    /// Extensions observe the lifecycle events in the order they were added
    pub fn add_extension<E: Extension + 'static>(mut self, extension: E) -> Self {
        self.descriptor.extensions.push(Arc::new(extension));
        self
    }

    pub fn add_annotation(mut self, definition: AnnotationDefinition) -> Self {
        self.descriptor.annotations.push(definition);
        self
    }

    /// Adds or replaces a host service, trait objects are added as `Arc<dyn Trait>`
    pub fn add_service<S: Injectable + Clone>(self, service: S) -> Self {
        self.services.add(service);
        self
    }

    pub fn resource_loader(self, loader: impl ResourceLoader + 'static) -> Self {
        self.add_service::<Arc<dyn ResourceLoader>>(Arc::new(loader))
    }

    pub fn proxy_factory(self, factory: impl ProxyFactory + 'static) -> Self {
        self.add_service::<Arc<dyn ProxyFactory>>(Arc::new(factory))
    }

    pub fn configuration(mut self, configuration: ContainerConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Adds a configuration object extensions can read through the [ConfigProvider] service
    pub fn add_config<T: Send + Sync + 'static>(mut self, config: T) -> Result<Self, BootstrapError> {
        self.configs.add_config(config)?;
        Ok(self)
    }

    /// The descriptor built so far
    pub fn descriptor(&self) -> &DeploymentDescriptor {
        &self.descriptor
    }

    /// Boots the container
    ///
    /// An empty deployment still yields a running container without components.
    pub fn build(self) -> Result<Container, BootstrapError> {
        let ContainerBuilder {
            mut descriptor,
            configuration,
            services,
            configs,
        } = self;

        tracing::debug!(
            "Building container {} with {} archives",
            descriptor.id,
            descriptor.archives.len()
        );
        services.add(configs);

        if descriptor.archives.is_empty() {
            descriptor.archives.push(Archive::new("default"));
        }

        let mut initiator = ContainerInitiator::new(configuration, services);
        initiator.boot(descriptor)?;
        Container::new(initiator)
    }
}
