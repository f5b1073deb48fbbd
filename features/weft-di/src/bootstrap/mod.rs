//! Deployment description, host services and the machinery of the bootstrap phases
//!
//! The phases themselves are driven by the [ContainerInitiator](crate::initiator::ContainerInitiator).

pub(crate) mod deployer;
pub mod deployment;
pub mod executor;
pub mod services;
pub mod validator;

pub use deployment::{Archive, DeploymentDescriptor, DeploymentStructure, Enablement};
pub use executor::Executor;
pub use services::{ResourceLoader, ServiceRegistry, StaticResourceLoader};
pub use validator::Validator;
