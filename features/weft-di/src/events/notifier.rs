use std::sync::Arc;

use crate::{
    errors::Problems,
    events::{extension::Extension, lifecycle::LifecycleEvent},
};

/// Delivers lifecycle events to the extensions of a deployment, in registration order
#[derive(Clone, Default)]
pub struct ObserverNotifier {
    extensions: Arc<[Arc<dyn Extension>]>,
}

impl ObserverNotifier {
    pub fn new(extensions: Vec<Arc<dyn Extension>>) -> Self {
        Self {
            extensions: extensions.into(),
        }
    }

    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Delivers the event to every extension
    ///
    /// A failing extension does not stop the others, the returned problems hold every
    /// failure plus whatever the extensions reported through the event.
    pub fn fire_lifecycle_event<E: LifecycleEvent>(&self, event: &mut E) -> Problems {
        self.fire_to(self.extensions.iter(), event)
    }

    /// Delivers the event to the given extensions only
    pub fn fire_to<'a, E: LifecycleEvent>(
        &self,
        extensions: impl IntoIterator<Item = &'a Arc<dyn Extension>>,
        event: &mut E,
    ) -> Problems {
        for extension in extensions {
            tracing::trace!("{} observes {}", extension.name(), E::NAME);
            if let Err(e) = event.deliver(extension.as_ref()) {
                tracing::debug!("{} failed on {}: {e}", extension.name(), E::NAME);
                let problem = E::report(extension.name(), &e);
                event.problems_mut().push(problem);
            }
        }
        event.take_problems()
    }
}
