use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
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

struct Conversation {
    id: Arc<str>,
    /// Transient conversations end with the activation that started them
    transient: bool,
}

/// Conversation scope
///
/// A conversation is activated on a thread, either a long running one by id or a new
/// transient one. When lazy, a conversation's store and its `Initialized` event are only
/// created on first use.
pub struct ConversationContext {
    contextual: Arc<ContextualStore>,
    lazy: bool,
    conversations: DashMap<Arc<str>, Arc<BeanStore>>,
    active: DashMap<ThreadId, Conversation>,
    counter: AtomicUsize,
    events: Arc<ScopeEvents>,
}

impl ConversationContext {
    pub fn new(contextual: Arc<ContextualStore>, events: Arc<ScopeEvents>, lazy: bool) -> Self {
        Self {
            contextual,
            lazy,
            conversations: DashMap::new(),
            active: DashMap::new(),
            counter: AtomicUsize::new(0),
            events,
        }
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Activates the conversation `id` on this thread, or a new transient one
    pub fn activate(&self, id: Option<&str>) -> Arc<str> {
        let conversation = match id {
            Some(id) => Conversation {
                id: Arc::from(id),
                transient: false,
            },
            None => Conversation {
                id: Arc::from(format!(
                    "transient-{}",
                    self.counter.fetch_add(1, Ordering::SeqCst)
                )),
                transient: true,
            },
        };
        let id = conversation.id.clone();
        self.active.insert(thread::current().id(), conversation);
        if !self.lazy {
            self.store(&id);
        }
        id
    }

    /// Deactivates the thread's conversation, ending it if it is transient
    pub fn deactivate(&self, manager: &BeanManager) {
        let Some((_, conversation)) = self.active.remove(&thread::current().id()) else {
            return;
        };
        if conversation.transient {
            self.end(&conversation.id, manager);
        }
    }

    /// Ends a long running conversation, destroying its instances
    pub fn end(&self, id: &str, manager: &BeanManager) {
        let Some((id, store)) = self
            .conversations
            .get(id)
            .map(|c| (c.key().clone(), c.value().clone()))
        else {
            return;
        };
        store.destroy_all(manager);
        self.conversations.remove(&id);
        self.events.fire(
            ScopeTransition::Destroyed,
            builtin::CONVERSATION_SCOPED,
            value(id.to_string()),
        );
    }

    pub fn current_conversation(&self) -> Option<Arc<str>> {
        self.active
            .get(&thread::current().id())
            .map(|c| c.id.clone())
    }

    /// The store of the conversation, created on first use
    fn store(&self, id: &Arc<str>) -> Arc<BeanStore> {
        let mut started = false;
        let store = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| {
                started = true;
                Arc::new(BeanStore::new())
            })
            .value()
            .clone();
        if started {
            self.events.fire(
                ScopeTransition::Initialized,
                builtin::CONVERSATION_SCOPED,
                value(id.to_string()),
            );
        }
        store
    }

    fn current(&self) -> Result<Arc<BeanStore>, InjectError> {
        let id = self
            .current_conversation()
            .ok_or_else(|| InjectError::ContextNotActive {
                scope: builtin::CONVERSATION_SCOPED.to_string(),
            })?;
        Ok(self.store(&id))
    }
}

impl Context for ConversationContext {
    fn scope(&self) -> &str {
        builtin::CONVERSATION_SCOPED
    }

    fn is_active(&self) -> bool {
        self.active.contains_key(&thread::current().id())
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
        let Some(id) = self.current_conversation() else {
            return Err(InjectError::ContextNotActive {
                scope: builtin::CONVERSATION_SCOPED.to_string(),
            });
        };
        let key = self.contextual.put_if_absent(component);
        Ok(self
            .conversations
            .get(&id)
            .and_then(|store| store.get(&key)))
    }

    fn destroy(&self, component: &Arc<Component>, manager: &BeanManager) -> Result<(), InjectError> {
        let Some(store) = self
            .current_conversation()
            .and_then(|id| self.conversations.get(&id).map(|s| s.value().clone()))
        else {
            return Ok(());
        };
        let key = self.contextual.put_if_absent(component);
        store.destroy(&key, manager)
    }

    fn invalidate(&self, manager: &BeanManager) {
        self.active.clear();
        let ids = self
            .conversations
            .iter()
            .map(|c| c.key().clone())
            .collect::<Vec<_>>();
        for id in ids {
            self.end(&id, manager);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
