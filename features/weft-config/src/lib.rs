//! Weft Config holds the settings of a container and a registry of typed configs that
//! extensions can look up.
//!
//! Weft Config is split into two major parts:
//! 1. ContainerConfiguration: the settings consumed by the bootstrap (parallelism, strictness,
//!    shutdown grace period, conversation context initialization)
//! 2. ConfigProvider: a registry of arbitrary config objects, one per type
//!
//! # Examples
//!
//! ```rust
//! use weft_config::{ConfigProvider, ContainerConfiguration};
//!
//! let config = ContainerConfiguration::from_pairs([("weft.executor_threads", "2")]).unwrap();
//! assert_eq!(config.executor_threads, 2);
//!
//! let mut provider = ConfigProvider::new();
//! provider.add_config(config.clone()).unwrap();
//! let stored = provider.get_config::<ContainerConfiguration>().unwrap().unwrap();
//! assert_eq!(*stored, config);
//! ```

pub mod config;
pub mod errors;
pub mod provider;

pub use config::{ConfigKey, ContainerConfiguration};
pub use errors::ConfigError;
pub use provider::ConfigProvider;
