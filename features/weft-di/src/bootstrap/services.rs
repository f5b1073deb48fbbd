//! Services the container consumes from its host

use std::{
    any::{Any, TypeId},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    errors::{BootstrapError, ResourceLoadingError},
    metadata::annotated::{AnnotatedType, ClassInfo},
    types::{Injectable, TypeInfo},
};

/// Loads class descriptions by name
pub trait ResourceLoader: Send + Sync {
    fn load_class(&self, name: &str) -> Result<AnnotatedType, ResourceLoadingError>;

    /// Names of the resources with the given name, e.g. extension registrations
    fn resources(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Class level metadata without materializing the class
    fn class_info(&self, name: &str) -> Option<ClassInfo> {
        self.load_class(name).ok().map(|ty| ty.class_info())
    }
}

/// Loader over classes registered up front
#[derive(Default)]
pub struct StaticResourceLoader {
    classes: DashMap<Arc<str>, AnnotatedType>,
    resources: DashMap<String, Vec<String>>,
}

impl StaticResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&self, ty: AnnotatedType) {
        self.classes.insert(ty.name.clone(), ty);
    }

    pub fn add_resource(&self, name: impl Into<String>, location: impl Into<String>) {
        self.resources
            .entry(name.into())
            .or_default()
            .push(location.into());
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ResourceLoader for StaticResourceLoader {
    fn load_class(&self, name: &str) -> Result<AnnotatedType, ResourceLoadingError> {
        self.classes
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| ResourceLoadingError::ClassNotFound {
                name: name.to_string(),
            })
    }

    fn resources(&self, name: &str) -> Vec<String> {
        self.resources
            .get(name)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    fn class_info(&self, name: &str) -> Option<ClassInfo> {
        self.classes.get(name).map(|c| c.class_info())
    }
}

/// Services keyed by their type
///
/// Trait object services are registered as `Arc<dyn Trait>`, which is the key they are looked up by.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<TypeId, (TypeInfo, Arc<dyn Any + Send + Sync>)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a service
    pub fn add<S: Injectable + Clone>(&self, service: S) {
        let info = TypeInfo::of::<S>();
        tracing::trace!("Service {info} registered");
        self.services
            .insert(info.type_id, (info, Arc::new(service)));
    }

    pub fn get<S: Injectable + Clone>(&self) -> Option<S> {
        self.services
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.value().1.downcast_ref::<S>().cloned())
    }

    /// Fails with [BootstrapError::MissingService] when the service is absent
    pub fn require<S: Injectable + Clone>(&self) -> Result<S, BootstrapError> {
        self.get::<S>().ok_or(BootstrapError::MissingService {
            service: std::any::type_name::<S>(),
        })
    }

    pub fn contains<S: Injectable>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    /// Names of every registered service, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = self
            .services
            .iter()
            .map(|e| e.value().0.type_name)
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_object_services_are_keyed_by_arc() {
        let registry = ServiceRegistry::new();
        let loader: Arc<dyn ResourceLoader> = Arc::new(StaticResourceLoader::new());
        registry.add(loader);

        assert!(registry.get::<Arc<dyn ResourceLoader>>().is_some());
        assert!(matches!(
            registry.require::<Arc<StaticResourceLoader>>(),
            Err(BootstrapError::MissingService { .. })
        ));
    }

    #[test]
    fn static_loader_reports_missing_classes() {
        let loader = StaticResourceLoader::new();
        loader.add_class(AnnotatedType::declare("Foo").build());

        assert!(loader.load_class("Foo").is_ok());
        assert!(loader.class_info("Foo").is_some());
        assert!(matches!(
            loader.load_class("Bar"),
            Err(ResourceLoadingError::ClassNotFound { .. })
        ));
    }
}
