//! Events: observer methods of components and lifecycle events of extensions
//!
//! Application events are resolved against observer methods with the same type safe
//! rules as injection (see [TypeSafeObserverResolver](crate::resolution::observers::TypeSafeObserverResolver)).
//! Lifecycle events go to [Extension]s through the [ObserverNotifier].

pub mod extension;
pub mod fast;
pub mod lifecycle;
pub mod notifier;
pub mod observer;
pub mod preloader;

pub use extension::{Extension, TypeFilter};
pub use notifier::ObserverNotifier;
pub use observer::{ObserverMethod, Reception};
