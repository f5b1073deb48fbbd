//! Interceptors, decorators and client proxies
//!
//! Interceptors run first (outermost), then decorators, then the target method.

pub mod decorators;
pub mod handler;
pub mod invocation;
pub mod metadata;
pub mod model;
pub mod proxy;
