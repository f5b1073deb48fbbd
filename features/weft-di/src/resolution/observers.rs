use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    events::observer::ObserverMethod,
    metadata::{reflection::TypeHierarchy, transformer::ClassTransformer},
    resolution::{
        assignability::is_event_assignable,
        resolvable::{Candidates, EventDescriptor},
    },
};

/// Resolves the observers of an event, cached per [EventDescriptor]
pub struct TypeSafeObserverResolver {
    transformer: Arc<ClassTransformer>,
    observers: RwLock<Candidates<ObserverMethod>>,
    cache: DashMap<EventDescriptor, Candidates<ObserverMethod>>,
}

impl TypeSafeObserverResolver {
    pub fn new(transformer: Arc<ClassTransformer>) -> Self {
        Self {
            transformer,
            observers: RwLock::new(Vec::new().into()),
            cache: DashMap::new(),
        }
    }

    /// Replaces the known observers and flushes the cache
    pub fn set_observers(&self, mut observers: Vec<Arc<ObserverMethod>>) {
        observers.sort_by(|a, b| a.id.cmp(&b.id));
        observers.dedup_by(|a, b| a.id == b.id);
        *self.observers.write() = observers.into();
        self.clear();
    }

    pub fn observers(&self) -> Candidates<ObserverMethod> {
        self.observers.read().clone()
    }

    /// Observers of the event ordered by priority, then identifier
    pub fn resolve(&self, event: &EventDescriptor) -> Candidates<ObserverMethod> {
        if let Some(cached) = self.cache.get(event) {
            tracing::trace!("Observer cache hit for {event}");
            return cached.clone();
        }

        let closure = self.transformer.closure(&event.event_type);
        let mut matching = self
            .observers()
            .iter()
            .filter(|observer| {
                observer.qualifiers.is_subset(&event.qualifiers)
                    && closure.iter().any(|event_type| {
                        is_event_assignable(&*self.transformer, &observer.observed_type, event_type)
                    })
            })
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        let matching: Candidates<ObserverMethod> = matching.into();
        self.cache
            .entry(event.clone())
            .or_insert(matching)
            .clone()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
