use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    context::{
        conversation::ConversationContext, dependent::DependentContext, request::RequestContext,
        session::SessionContext, shared::SharedContext, Context, ScopeEvents,
    },
    errors::InjectError,
    ids::ContextualStore,
    manager::{BeanManager, WeakManager},
    metadata::builtin,
};

/// The contexts of one container, builtin ones plus those added by extensions
pub struct Contexts {
    events: Arc<ScopeEvents>,
    dependent: Arc<DependentContext>,
    singleton: Arc<SharedContext>,
    application: Arc<SharedContext>,
    request: Arc<RequestContext>,
    session: Arc<SessionContext>,
    conversation: Arc<ConversationContext>,
    custom: RwLock<Vec<Arc<dyn Context>>>,
}

impl Contexts {
    pub fn new(contextual: Arc<ContextualStore>, lazy_conversation: bool) -> Self {
        let events = Arc::new(ScopeEvents::default());
        Self {
            dependent: Arc::new(DependentContext),
            singleton: Arc::new(SharedContext::singleton(contextual.clone(), events.clone())),
            application: Arc::new(SharedContext::application(
                contextual.clone(),
                events.clone(),
            )),
            request: Arc::new(RequestContext::new(contextual.clone(), events.clone())),
            session: Arc::new(SessionContext::new(contextual.clone(), events.clone())),
            conversation: Arc::new(ConversationContext::new(
                contextual,
                events.clone(),
                lazy_conversation,
            )),
            custom: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Scope events are fired through this manager from now on
    pub fn attach(&self, manager: WeakManager) {
        self.events.attach(manager);
    }

    pub fn add(&self, context: Arc<dyn Context>) {
        tracing::debug!("Adding context for scope {}", context.scope());
        self.custom.write().push(context);
    }

    /// The context of the scope
    ///
    /// If extensions registered several contexts for one scope, the active one is returned.
    pub fn get(&self, scope: &str) -> Result<Arc<dyn Context>, InjectError> {
        let builtin: Option<Arc<dyn Context>> = match scope {
            builtin::DEPENDENT => Some(self.dependent.clone()),
            builtin::SINGLETON => Some(self.singleton.clone()),
            builtin::APPLICATION_SCOPED => Some(self.application.clone()),
            builtin::REQUEST_SCOPED => Some(self.request.clone()),
            builtin::SESSION_SCOPED => Some(self.session.clone()),
            builtin::CONVERSATION_SCOPED => Some(self.conversation.clone()),
            _ => None,
        };
        if let Some(context) = builtin {
            return Ok(context);
        }

        let custom = self.custom.read();
        let mut registered = custom.iter().filter(|c| c.scope() == scope).peekable();
        if registered.peek().is_none() {
            return Err(InjectError::NoContext {
                scope: scope.to_string(),
            });
        }
        registered
            .find(|c| c.is_active())
            .cloned()
            .ok_or_else(|| InjectError::ContextNotActive {
                scope: scope.to_string(),
            })
    }

    pub fn application(&self) -> &Arc<SharedContext> {
        &self.application
    }

    pub fn singleton(&self) -> &Arc<SharedContext> {
        &self.singleton
    }

    pub fn request(&self) -> &Arc<RequestContext> {
        &self.request
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn conversation(&self) -> &Arc<ConversationContext> {
        &self.conversation
    }

    /// Destroys every instance, shortest lived scopes first
    pub fn invalidate(&self, manager: &BeanManager) {
        self.request.invalidate(manager);
        self.conversation.invalidate(manager);
        self.session.invalidate(manager);
        for context in self.custom.read().iter() {
            context.invalidate(manager);
        }
        self.application.invalidate(manager);
        self.singleton.invalidate(manager);
    }
}
