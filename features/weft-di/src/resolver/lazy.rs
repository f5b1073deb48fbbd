use std::{
    fmt::Debug,
    marker::PhantomData,
    sync::{Arc, OnceLock},
};

use crate::{
    component::builtin::Lookup,
    errors::InjectError,
    manager::BeanManager,
    metadata::annotation::Annotation,
    resolver::Resolver,
    types::Injectable,
};

/// Lazily resolved dependency
///
/// Resolution happens on first access and its result, success or failure, is kept.
/// Selecting a `Lazy` never fails, even if nothing satisfies the lookup.
pub struct Lazy<T: Injectable>(Arc<LazyInner<T>>);

struct LazyInner<T: Injectable> {
    once: OnceLock<Result<Arc<T>, InjectError>>,
    lookup: Lookup,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Injectable + Debug> Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.once.get() {
            Some(result) => f.debug_tuple("Lazy").field(result).finish(),
            None => f.debug_tuple("Lazy").field(&"unresolved").finish(),
        }
    }
}

impl<T: Injectable> Resolver for Lazy<T> {
    fn resolve(manager: &BeanManager, qualifiers: &[Annotation]) -> Result<Self, InjectError> {
        let lookup = manager.lookup(manager.type_of::<T>(), qualifiers);
        Ok(Lazy(Arc::new(LazyInner {
            once: OnceLock::new(),
            lookup,
            _marker: PhantomData,
        })))
    }
}

impl<T: Injectable> Lazy<T> {
    /// Accesses the dependency, resolving it on first use
    pub fn get(&self) -> Result<&Arc<T>, &InjectError> {
        self.0
            .once
            .get_or_init(|| self.0.lookup.get()?.get::<T>())
            .as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.once.get().is_some()
    }
}

/// Lazy dependency which may not exist
pub struct LazyOption<T: Injectable> {
    lazy: Lazy<T>,
}

impl<T: Injectable> Resolver for LazyOption<T> {
    fn resolve(manager: &BeanManager, qualifiers: &[Annotation]) -> Result<Self, InjectError> {
        Ok(LazyOption {
            lazy: Lazy::resolve(manager, qualifiers)?,
        })
    }
}

impl<T: Injectable> LazyOption<T> {
    /// None if nothing satisfies the lookup
    pub fn get(&self) -> Result<Option<&Arc<T>>, &InjectError> {
        match self.lazy.get() {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if e.is_unsatisfied() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
