use crate::{errors::InjectError, manager::BeanManager, metadata::annotation::Annotation};

pub mod arc;
pub mod lazy;

/// Typed access to components from Rust code
///
/// Used through [BeanManager::select]: `manager.select::<Arc<Foo>>(&[])`.
pub trait Resolver {
    fn resolve(manager: &BeanManager, qualifiers: &[Annotation]) -> Result<Self, InjectError>
    where
        Self: Sized;
}
