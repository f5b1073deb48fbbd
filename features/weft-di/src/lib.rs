//! Weft DI is a contextual dependency injection container.
//!
//! Components are described as annotated classes, discovered per archive, resolved by
//! type and qualifiers and created in the context of their scope. Extensions observe
//! the bootstrap through lifecycle events and may add, modify or veto components.
//!
//! Using the container consists of three steps:
//! 1. Describe classes with [AnnotatedType::builder] and group them into [Archive]s
//! 2. Boot them with the [ContainerBuilder], which runs the [ContainerInitiator] phases
//! 3. Look components up through the [BeanManager] of the resulting [Container]
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_di::{builtin, AnnotatedType, Archive, ContainerBuilder, ContainerConfiguration};
//!
//! struct Greeter;
//! impl Greeter {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let greeter = AnnotatedType::builder::<Greeter>("Greeter")
//!     .marked(builtin::APPLICATION_SCOPED)
//!     .constructor(|| Greeter)
//!     .build();
//!
//! let container = ContainerBuilder::new("docs")
//!     .configuration(ContainerConfiguration::sequential())
//!     .add_archive(Archive::new("app").with_class(greeter))
//!     .build()
//!     .unwrap();
//!
//! let greeter = container.manager().select::<Arc<Greeter>>(&[]).unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! container.shutdown();
//! ```

pub mod bootstrap;
pub mod builder;
pub mod component;
pub mod container;
pub mod context;
pub mod dependency_graph;
pub mod errors;
pub mod events;
pub mod factories;
pub mod ids;
pub mod initiator;
pub mod interception;
pub mod manager;
pub mod metadata;
pub mod reference;
pub mod resolution;
pub mod resolver;
pub mod types;

pub use bootstrap::{Archive, DeploymentDescriptor, Enablement, ResourceLoader, ServiceRegistry, StaticResourceLoader};
pub use builder::ContainerBuilder;
pub use component::{Component, ComponentKind, InjectionPoint};
pub use container::{Container, ContainerRegistry};
pub use errors::{
    BootstrapError, DefinitionError, DeploymentError, IllegalProductError, InjectError, Problem,
    Problems, ResolutionError,
};
pub use events::{Extension, ObserverMethod, Reception, TypeFilter};
pub use factories::SyntheticFactory;
pub use ids::{ArchiveId, ComponentIdentifier, DeploymentId};
pub use initiator::{ContainerInitiator, ContainerState};
pub use manager::BeanManager;
pub use metadata::{
    annotated::{AnnotatedType, Field, Method, MethodBody, Param},
    annotation::{Annotation, AnnotationDefinition},
    builtin,
    reflection::Type,
};
pub use reference::Reference;
pub use resolver::{
    lazy::{Lazy, LazyOption},
    Resolver,
};
pub use types::{value, DynError, Injectable, Value};
pub use weft_config::{ConfigProvider, ContainerConfiguration};
