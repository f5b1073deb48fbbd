#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use weft_di::{
    Archive, BootstrapError, Container, ContainerBuilder, ContainerConfiguration, Value,
};

/// Installs a subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A builder without worker threads
pub fn builder(id: &str) -> ContainerBuilder {
    ContainerBuilder::new(id).configuration(ContainerConfiguration::sequential())
}

/// Boots a single archive without worker threads
pub fn boot(archive: Archive) -> Container {
    try_boot(builder("test").add_archive(archive)).expect("container boots")
}

pub fn try_boot(builder: ContainerBuilder) -> Result<Container, BootstrapError> {
    init_tracing();
    builder.build()
}

/// Records what callbacks observed, shared between closures
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Reads a `String` returned from an invocation
pub fn text(result: Option<Value>) -> String {
    result
        .and_then(|v| v.downcast_ref::<String>().cloned())
        .expect("invocation returns a String")
}
