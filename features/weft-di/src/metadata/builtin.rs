//! Names of the annotations and types the container itself understands

// Types
pub const OBJECT: &str = "weft.lang.Object";
pub const SERIALIZABLE: &str = "weft.lang.Serializable";
pub const STRING: &str = "weft.lang.String";
pub const BEAN_MANAGER: &str = "weft.inject.BeanManager";
pub const INJECTION_POINT: &str = "weft.inject.InjectionPoint";
pub const INSTANCE: &str = "weft.inject.Instance";

// Injection
pub const INJECT: &str = "weft.inject.Inject";
pub const QUALIFIER: &str = "weft.inject.Qualifier";
pub const DEFAULT: &str = "weft.inject.Default";
pub const ANY: &str = "weft.inject.Any";
pub const NAMED: &str = "weft.inject.Named";
pub const NONBINDING: &str = "weft.inject.Nonbinding";
pub const TRANSIENT: &str = "weft.inject.Transient";

// Scopes
pub const SCOPE: &str = "weft.inject.Scope";
pub const NORMAL_SCOPE: &str = "weft.inject.NormalScope";
pub const DEPENDENT: &str = "weft.inject.Dependent";
pub const SINGLETON: &str = "weft.inject.Singleton";
pub const APPLICATION_SCOPED: &str = "weft.inject.ApplicationScoped";
pub const REQUEST_SCOPED: &str = "weft.inject.RequestScoped";
pub const SESSION_SCOPED: &str = "weft.inject.SessionScoped";
pub const CONVERSATION_SCOPED: &str = "weft.inject.ConversationScoped";

// Component definition
pub const STEREOTYPE: &str = "weft.inject.Stereotype";
pub const ALTERNATIVE: &str = "weft.inject.Alternative";
pub const SPECIALIZES: &str = "weft.inject.Specializes";
pub const TYPED: &str = "weft.inject.Typed";
pub const VETOED: &str = "weft.inject.Vetoed";
pub const PRODUCES: &str = "weft.inject.Produces";
pub const DISPOSES: &str = "weft.inject.Disposes";
pub const PRIORITY: &str = "weft.inject.Priority";

// Events
pub const OBSERVES: &str = "weft.inject.Observes";
pub const INITIALIZED: &str = "weft.inject.Initialized";
pub const DESTROYED: &str = "weft.inject.Destroyed";

// Lifecycle and interception
pub const POST_CONSTRUCT: &str = "weft.inject.PostConstruct";
pub const PRE_DESTROY: &str = "weft.inject.PreDestroy";
pub const AROUND_INVOKE: &str = "weft.inject.AroundInvoke";
pub const AROUND_CONSTRUCT: &str = "weft.inject.AroundConstruct";
pub const INTERCEPTOR: &str = "weft.inject.Interceptor";
pub const INTERCEPTOR_BINDING: &str = "weft.inject.InterceptorBinding";
pub const DECORATOR: &str = "weft.inject.Decorator";
pub const DELEGATE: &str = "weft.inject.Delegate";

/// Member names used by the builtin annotations
pub mod members {
    pub const VALUE: &str = "value";
    /// `@NormalScope(passivating = true)`
    pub const PASSIVATING: &str = "passivating";
    /// `@Observes(reception = IF_EXISTS)`
    pub const RECEPTION: &str = "reception";
    pub const IF_EXISTS: &str = "IF_EXISTS";
    pub const ALWAYS: &str = "ALWAYS";
}
