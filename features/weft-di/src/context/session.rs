use std::{
    any::Any,
    sync::Arc,
    thread::{self, ThreadId},
};

use dashmap::DashMap;

use crate::{
    component::Component,
    context::{
        creational::CreationalContext,
        store::BeanStore,
        Context, ContextualInstance, ScopeEvents, ScopeTransition,
    },
    errors::InjectError,
    ids::ContextualStore,
    manager::BeanManager,
    metadata::builtin,
    types::value,
};

/// Session scope: instances live in a store keyed by session id
///
/// A thread sees a session after [SessionContext::associate] and until
/// [SessionContext::dissociate]. The session itself lives until it is invalidated.
pub struct SessionContext {
    contextual: Arc<ContextualStore>,
    sessions: DashMap<Arc<str>, Arc<BeanStore>>,
    associations: DashMap<ThreadId, Arc<str>>,
    events: Arc<ScopeEvents>,
}

impl SessionContext {
    pub fn new(contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>) -> Self {
        Self {
            contextual,
            sessions: DashMap::new(),
            associations: DashMap::new(),
            events,
        }
    }

    /// Binds the calling thread to the session, starting it if it is new
    pub fn associate(&self, session: &str) {
        let session: Arc<str> = Arc::from(session);
        let mut started = false;
        self.sessions.entry(session.clone()).or_insert_with(|| {
            started = true;
            Arc::new(BeanStore::new())
        });
        self.associations.insert(thread::current().id(), session.clone());
        if started {
            self.events.fire(
                ScopeTransition::Initialized,
                builtin::SESSION_SCOPED,
                value(session.to_string()),
            );
        }
    }

    /// Unbinds the calling thread, the session keeps its instances
    pub fn dissociate(&self) -> Option<Arc<str>> {
        self.associations
            .remove(&thread::current().id())
            .map(|(_, session)| session)
    }

    /// Destroys the session and its instances
    pub fn invalidate_session(&self, session: &str, manager: &BeanManager) {
        let Some((session, store)) = self
            .sessions
            .get(session)
            .map(|s| (s.key().clone(), s.value().clone()))
        else {
            return;
        };
        store.destroy_all(manager);
        self.sessions.remove(&session);
        self.associations.retain(|_, s| *s != session);
        self.events.fire(
            ScopeTransition::Destroyed,
            builtin::SESSION_SCOPED,
            value(session.to_string()),
        );
    }

    pub fn current_session(&self) -> Option<Arc<str>> {
        self.associations
            .get(&thread::current().id())
            .map(|s| s.value().clone())
    }

    fn current(&self) -> Result<Arc<BeanStore>, InjectError> {
        self.current_session()
            .and_then(|session| self.sessions.get(&session).map(|s| s.value().clone()))
            .ok_or_else(|| InjectError::ContextNotActive {
                scope: builtin::SESSION_SCOPED.to_string(),
            })
    }
}

impl Context for SessionContext {
    fn scope(&self) -> &str {
        builtin::SESSION_SCOPED
    }

    fn is_active(&self) -> bool {
        self.current().is_ok()
    }

    fn get(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
    ) -> Result<ContextualInstance, InjectError> {
        let store = self.current()?;
        let key = self.contextual.put_if_absent(component);
        store.get_or_create(&key, || {
            let cc = CreationalContext::new(manager, Some(component.clone()));
            component.create(manager, &cc)
        })
    }

    fn get_if_exists(
        &self,
        component: &Arc<Component>,
    ) -> Result<Option<ContextualInstance>, InjectError> {
        let store = self.current()?;
        let key = self.contextual.put_if_absent(component);
        Ok(store.get(&key))
    }

    fn destroy(&self, component: &Arc<Component>, manager: &BeanManager) -> Result<(), InjectError> {
        let Ok(store) = self.current() else {
            return Ok(());
        };
        let key = self.contextual.put_if_absent(component);
        store.destroy(&key, manager)
    }

    fn invalidate(&self, manager: &BeanManager) {
        let sessions = self
            .sessions
            .iter()
            .map(|s| s.key().clone())
            .collect::<Vec<_>>();
        for session in sessions {
            self.invalidate_session(&session, manager);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
