use std::convert::Infallible;

use crate::{
    manager::BeanManager,
    metadata::annotated::Param,
    reference::Reference,
    types::{downcast, DynError, Injectable, TypeInfo, Value},
};

/// A factory creating the instances of a synthetic component
pub trait SyntheticFactory: Send + Sync + 'static {
    type Provides: Injectable;

    /// Returns the typeinfo about the factory's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Injection points resolved before every [SyntheticFactory::create] call
    fn dependencies(&self) -> Vec<Param> {
        Vec::new()
    }

    /// Constructs a new instance, `dependencies` holds one reference per [SyntheticFactory::dependencies] entry
    ///
    /// Returning None is only legal for dependent components.
    fn create(
        &self,
        manager: &BeanManager,
        dependencies: &[Reference],
    ) -> Result<Option<Self::Provides>, impl Into<DynError>>;

    /// Called when an instance is destroyed
    fn destroy(&self, instance: &Self::Provides) -> Result<(), impl Into<DynError>> {
        let _ = instance;
        Ok::<_, Infallible>(())
    }
}

/// Wrapper Trait for factories, providing instances of Any
pub trait DynSyntheticFactory: Send + Sync {
    fn supplies(&self) -> TypeInfo;

    fn dependencies(&self) -> Vec<Param>;

    fn create(&self, manager: &BeanManager, dependencies: &[Reference]) -> Result<Option<Value>, DynError>;

    fn destroy(&self, instance: &Value) -> Result<(), DynError>;
}
// Impl DynSyntheticFactory for any SyntheticFactory
impl<T: Injectable, SpecificFactory: SyntheticFactory<Provides = T>> DynSyntheticFactory
    for SpecificFactory
{
    fn supplies(&self) -> TypeInfo {
        SpecificFactory::supplies()
    }

    fn dependencies(&self) -> Vec<Param> {
        SpecificFactory::dependencies(self)
    }

    fn create(&self, manager: &BeanManager, dependencies: &[Reference]) -> Result<Option<Value>, DynError> {
        // Forward the call to the specific implementation
        SpecificFactory::create(self, manager, dependencies)
            .map(|instance| instance.map(|i| std::sync::Arc::new(i) as Value))
            .map_err(|e| e.into())
    }

    fn destroy(&self, instance: &Value) -> Result<(), DynError> {
        let instance = downcast::<T>(instance)
            .map_err(|required| format!("synthetic instance is not a '{required}'"))?;
        SpecificFactory::destroy(self, &instance).map_err(|e| e.into())
    }
}

type CreateFn<T> = dyn Fn(&BeanManager, &[Reference]) -> Result<Option<T>, DynError> + Send + Sync;

/// A [SyntheticFactory] backed by a closure
pub struct FnFactory<T> {
    dependencies: Vec<Param>,
    create: Box<CreateFn<T>>,
}

impl<T: Injectable> FnFactory<T> {
    pub fn new(
        create: impl Fn(&BeanManager, &[Reference]) -> Result<Option<T>, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dependencies: Vec::new(),
            create: Box::new(create),
        }
    }

    pub fn depends_on(mut self, param: impl Into<Param>) -> Self {
        self.dependencies.push(param.into());
        self
    }
}

impl<T: Injectable> SyntheticFactory for FnFactory<T> {
    type Provides = T;

    fn dependencies(&self) -> Vec<Param> {
        self.dependencies.clone()
    }

    fn create(
        &self,
        manager: &BeanManager,
        dependencies: &[Reference],
    ) -> Result<Option<T>, impl Into<DynError>> {
        (self.create)(manager, dependencies)
    }
}
