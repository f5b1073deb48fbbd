use std::{
    any::{Any, TypeId},
    sync::Arc,
};

/// All errors raised by user callbacks must be thread safe
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Bootstrap work is spread across a thread pool
/// So anything the container hands out needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A type erased, shared value (an instance, an argument or a return value)
pub type Value = Arc<dyn Any + Send + Sync + 'static>;

/// A type erased value which is still exclusively owned (before injection completes)
pub type Unshared = Box<dyn Any + Send + Sync + 'static>;

/// Wraps a value into a [Value]
pub fn value<T: Injectable>(value: T) -> Value {
    Arc::new(value)
}

/// Downcasts a [Value], reporting the type name on failure
pub fn downcast<T: Injectable>(value: &Value) -> Result<Arc<T>, &'static str> {
    Arc::downcast::<T>(value.clone()).map_err(|_| std::any::type_name::<T>())
}

/// The id of the concrete type behind a [Value]
pub fn runtime_type_id(value: &Value) -> TypeId {
    (**value).type_id()
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}
