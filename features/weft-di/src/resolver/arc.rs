use std::sync::Arc;

use crate::{
    errors::InjectError, manager::BeanManager, metadata::annotation::Annotation,
    resolver::Resolver, types::Injectable,
};

/// The instance itself
///
/// For normal scoped components this is the instance of the context active right now,
/// calls made on it bypass interceptors and decorators.
impl<T: Injectable> Resolver for Arc<T> {
    fn resolve(manager: &BeanManager, qualifiers: &[Annotation]) -> Result<Self, InjectError> {
        manager.get::<T>(qualifiers)?.get::<T>()
    }
}

impl<R: Resolver> Resolver for Option<R> {
    fn resolve(manager: &BeanManager, qualifiers: &[Annotation]) -> Result<Self, InjectError>
    where
        Self: Sized,
    {
        match R::resolve(manager, qualifiers) {
            Ok(resolved) => Ok(Some(resolved)),
            // Nothing satisfying the lookup is not an error for Option
            Err(e) if e.is_unsatisfied() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
