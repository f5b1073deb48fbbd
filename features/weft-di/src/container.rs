use std::{fmt::Debug, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;

use crate::{
    errors::BootstrapError,
    ids::{ArchiveId, DeploymentId},
    initiator::{ContainerInitiator, ContainerState},
    manager::BeanManager,
};

/// A booted container
///
/// Cheap to clone. The container is shut down explicitly with [Container::shutdown] or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);
struct ContainerInner {
    id: DeploymentId,
    manager: BeanManager,
    initiator: Mutex<ContainerInitiator>,
}
impl Drop for ContainerInner {
    fn drop(&mut self) {
        self.initiator.get_mut().shutdown();
    }
}
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("deployment", &self.0.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Container {
    /// Wraps an initiator which finished every bootstrap phase
    pub fn new(initiator: ContainerInitiator) -> Result<Self, BootstrapError> {
        let state = initiator.state();
        let (Some(id), Some(manager)) = (initiator.deployment(), initiator.manager()) else {
            return Err(BootstrapError::IllegalState {
                operation: "hand out the container",
                state: state.to_string(),
            });
        };
        if state != ContainerState::Initialized {
            return Err(BootstrapError::IllegalState {
                operation: "hand out the container",
                state: state.to_string(),
            });
        }
        Ok(Self(Arc::new(ContainerInner {
            id: id.clone(),
            manager: manager.clone(),
            initiator: Mutex::new(initiator),
        })))
    }

    pub fn id(&self) -> &DeploymentId {
        &self.0.id
    }

    /// The manager seeing every component of the deployment
    pub fn manager(&self) -> &BeanManager {
        &self.0.manager
    }

    /// The manager of one archive, seeing what the archive can access
    pub fn manager_for(&self, archive: &ArchiveId) -> Option<BeanManager> {
        self.0.initiator.lock().manager_for(archive).cloned()
    }

    pub fn state(&self) -> ContainerState {
        self.0.initiator.lock().state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContainerState::Initialized
    }

    /// Destroys every contextual instance, later calls do nothing
    pub fn shutdown(&self) {
        self.0.initiator.lock().shutdown();
    }
}

/// The containers of one process, keyed by their deployment
///
/// Containers do not register themselves, a host keeps a registry if it needs to find
/// containers by deployment.
#[derive(Default)]
pub struct ContainerRegistry {
    containers: DashMap<DeploymentId, Container>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, container: Container) -> Result<(), BootstrapError> {
        match self.containers.entry(container.id().clone()) {
            Entry::Occupied(_) => Err(BootstrapError::DuplicateDeployment(
                container.id().to_string(),
            )),
            Entry::Vacant(entry) => {
                tracing::debug!("Registered container {}", container.id());
                entry.insert(container);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &DeploymentId) -> Option<Container> {
        self.containers.get(id).map(|c| c.value().clone())
    }

    /// Removes the container and shuts it down
    pub fn shutdown(&self, id: &DeploymentId) -> bool {
        match self.containers.remove(id) {
            Some((_, container)) => {
                container.shutdown();
                true
            }
            None => false,
        }
    }

    /// Shuts down every container
    pub fn shutdown_all(&self) {
        let ids = self.ids();
        for id in ids {
            self.shutdown(&id);
        }
    }

    pub fn ids(&self) -> Vec<DeploymentId> {
        let mut ids = self
            .containers
            .iter()
            .map(|c| c.key().clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
