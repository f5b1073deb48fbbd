use std::sync::Arc;

use thiserror::Error;
use weft_config::ConfigError;

use crate::{ids::ComponentIdentifier, types::DynError};

/// Structural violations which can be detected from metadata alone
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefinitionError {
    #[error("'{class}' declares more than one constructor annotated @Inject")]
    MultipleInjectConstructors { class: String },
    #[error("'{class}' has neither an @Inject constructor nor a no-argument constructor")]
    NoSuitableConstructor { class: String },
    #[error("'{class}' is normal scoped but declares the public field '{field}'")]
    PublicFieldOnNormalScope { class: String, field: String },
    #[error("'{member}' declares more than one scope: {scopes:?}")]
    ConflictingScopes { member: String, scopes: Vec<String> },
    #[error("'{member}' inherits conflicting default scopes from its stereotypes: {scopes:?}")]
    ConflictingStereotypeScopes { member: String, scopes: Vec<String> },
    #[error("The producer '{member}' has a wildcard type '{ty}'")]
    WildcardProducerType { member: String, ty: String },
    #[error("The producer '{member}' has the type variable '{ty}' but is scoped '{scope}' instead of dependent")]
    TypeVariableProducer {
        member: String,
        ty: String,
        scope: String,
    },
    #[error("The decorator '{class}' must have exactly one delegate injection point, found {found}")]
    DecoratorDelegate { class: String, found: usize },
    #[error("The interceptor '{class}' declares no interceptor binding")]
    InterceptorWithoutBindings { class: String },
    #[error("'{class}' declares more than one {interception} interceptor method")]
    DuplicateInterceptorMethod { class: String, interception: String },
    #[error("'{class}' is annotated @Specializes but does not directly extend a managed component")]
    SpecializationWithoutSuper { class: String },
    #[error("'{member}' has {found} parameters annotated @Observes")]
    ObservedParameters { member: String, found: usize },
    #[error("The disposer '{member}' has no matching producer")]
    UnmatchedDisposer { member: String },
    #[error("The producer '{member}' has more than one disposer: {disposers:?}")]
    MultipleDisposers {
        member: String,
        disposers: Vec<String>,
    },
    #[error("The annotation '{annotation}' is invalid: {reason}")]
    InvalidAnnotation { annotation: String, reason: String },
    #[error("'{member}' is invalid: {reason}")]
    InvalidMember { member: String, reason: String },
    #[error("'{source_name}' reported a definition error: {message}")]
    Reported {
        source_name: String,
        message: String,
    },
}

/// Violations which are only detectable once the whole deployment is known
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeploymentError {
    #[error("Unsatisfied dependency for '{required}' at injection point {injection_point}")]
    UnsatisfiedDependency {
        injection_point: String,
        required: String,
    },
    #[error("Ambiguous dependency for '{required}' at injection point {injection_point}, candidates: {candidates:?}")]
    AmbiguousDependency {
        injection_point: String,
        required: String,
        candidates: Vec<String>,
    },
    #[error("The normal scoped component '{component}' injected at {injection_point} is not proxyable")]
    UnproxyableDependency {
        injection_point: String,
        component: String,
    },
    #[error("The component '{component}' injected at {injection_point} is not passivation capable")]
    UnserializableDependency {
        injection_point: String,
        component: String,
    },
    #[error("The component '{component}' declares the passivating scope '{scope}' but is not passivation capable")]
    NotPassivationCapable { component: String, scope: String },
    #[error("The name '{name}' is ambiguous between {candidates:?}")]
    AmbiguousName {
        name: String,
        candidates: Vec<String>,
    },
    #[error("Pseudo scoped components form a cycle: {chain:?}")]
    PseudoScopedCycle { chain: Vec<String> },
    #[error("The archive '{archive}' enables '{class}' which is not a known {kind}")]
    UnknownEnabledClass {
        archive: String,
        class: String,
        kind: String,
    },
    #[error("'{source_name}' reported a deployment problem: {message}")]
    Reported {
        source_name: String,
        message: String,
    },
}

/// A producer broke its contract at runtime
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IllegalProductError {
    #[error("'{component}' produced null but is scoped '{scope}'")]
    NullProduct { component: String, scope: String },
    #[error("'{component}' produced an instance of '{class}' which is not serializable but its scope is passivating")]
    NonSerializableProduct { component: String, class: String },
    #[error("'{component}' received the non passivation capable dependency at {injection_point}")]
    NonSerializableDependency {
        component: String,
        injection_point: String,
    },
}

/// The resource loader could not provide a class
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceLoadingError {
    #[error("The class '{name}' was not found")]
    ClassNotFound { name: String },
    #[error("The class '{name}' failed to load: {reason}")]
    Failed { name: String, reason: String },
}

/// A lookup did not lead to exactly one component
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResolutionError {
    #[error("No component satisfies '{required}' with qualifiers {qualifiers:?}")]
    Unsatisfied {
        required: String,
        qualifiers: Vec<String>,
    },
    #[error("'{required}' with qualifiers {qualifiers:?} is ambiguous between {candidates:?}")]
    Ambiguous {
        required: String,
        qualifiers: Vec<String>,
        candidates: Vec<ComponentIdentifier>,
    },
}
impl ResolutionError {
    /// Candidates which caused an ambiguity - empty if unsatisfied
    pub fn candidates(&self) -> &[ComponentIdentifier] {
        match self {
            ResolutionError::Unsatisfied { .. } => &[],
            ResolutionError::Ambiguous { candidates, .. } => candidates,
        }
    }
}

/// Failures of the proxy indirection
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProxyError {
    #[error("The proxy for {proxied:?} was invoked before a handler was set")]
    HandlerNotSet { proxied: Vec<String> },
    #[error("The handler of the proxy for {proxied:?} was already set")]
    HandlerAlreadySet { proxied: Vec<String> },
    #[error("'{class}' has no method '{method}'")]
    NoSuchMethod { class: String, method: String },
    #[error("The component '{component}' is no longer reachable - its container was shut down")]
    TargetUnavailable { component: String },
}

/// The fast observer path cannot decide without loading the class
///
/// Used as control flow signal only, callers fall back to full resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("The observer '{observer}' cannot be matched against '{class}' from class info alone")]
pub struct UnsupportedObserverMethod {
    pub observer: String,
    pub class: String,
}

/// Errors raised while using a running container
#[derive(Error, Debug, Clone)]
pub enum InjectError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    IllegalProduct(#[from] IllegalProductError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    ResourceLoading(#[from] ResourceLoadingError),
    /// The context for the scope exists but is not active on this thread
    #[error("The context for scope '{scope}' is not active")]
    ContextNotActive { scope: String },
    /// No context is registered for the scope
    #[error("No context is registered for scope '{scope}'")]
    NoContext { scope: String },
    /// A user supplied constructor, method, field accessor or observer failed
    #[error("'{member}' failed - error: {error}")]
    Callback {
        member: String,
        error: Arc<DynError>,
    },
    #[error("Failed to downcast, required: '{required}' actual: '{actual}'")]
    DowncastFailed { required: String, actual: String },
    /// A null reference was dereferenced
    #[error("The reference to '{component}' is null")]
    NullReference { component: String },
    /// The container backing a handle has been dropped
    #[error("The container is no longer available")]
    ContainerUnavailable,
}
impl InjectError {
    pub fn callback(member: impl Into<String>, error: DynError) -> Self {
        Self::Callback {
            member: member.into(),
            error: Arc::new(error),
        }
    }

    /// True for resolution errors with zero candidates
    pub fn is_unsatisfied(&self) -> bool {
        matches!(
            self,
            InjectError::Resolution(ResolutionError::Unsatisfied { .. })
        )
    }
}

/// A single problem collected during bootstrap
#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Problem {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    ResourceLoading(#[from] ResourceLoadingError),
    /// A failure that is not part of the taxonomy (a failed callback, a panicked task)
    #[error("{0}")]
    Other(String),
}
impl From<InjectError> for Problem {
    fn from(error: InjectError) -> Self {
        match error {
            InjectError::Definition(e) => Problem::Definition(e),
            InjectError::ResourceLoading(e) => Problem::ResourceLoading(e),
            other => Problem::Other(other.to_string()),
        }
    }
}

/// All problems of one bootstrap phase
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
pub struct Problems {
    pub errors: Vec<Problem>,
}
impl std::fmt::Display for Problems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The deployment had one or more problems:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: impl Into<Problem>) {
        self.errors.push(problem.into());
    }

    pub fn extend(&mut self, other: Problems) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Sorts and removes duplicates, so that the order in which problems were found does not matter
    pub fn normalize(&mut self) {
        self.errors.sort();
        self.errors.dedup();
    }

    /// Surfaces no error, the single error or the composite
    pub fn into_result(mut self) -> Result<(), BootstrapError> {
        self.normalize();
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0).into()),
            _ => Err(BootstrapError::Problems(self)),
        }
    }
}
impl From<Problem> for Problems {
    fn from(problem: Problem) -> Self {
        Problems {
            errors: vec![problem],
        }
    }
}
impl From<DefinitionError> for Problems {
    fn from(error: DefinitionError) -> Self {
        Problem::from(error).into()
    }
}
impl From<DeploymentError> for Problems {
    fn from(error: DeploymentError) -> Self {
        Problem::from(error).into()
    }
}

/// Errors which abort the bootstrap
#[derive(Error, Debug, Clone)]
pub enum BootstrapError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    ResourceLoading(#[from] ResourceLoadingError),
    #[error(transparent)]
    Problems(#[from] Problems),
    #[error(transparent)]
    Inject(#[from] InjectError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A service the container cannot run without is not registered
    #[error("The required service '{service}' is not registered")]
    MissingService { service: &'static str },
    /// The worker pool could not be created
    #[error("The executor could not be created: {0}")]
    Executor(String),
    /// A phase was started out of order
    #[error("Cannot {operation} while the container is {state}")]
    IllegalState {
        operation: &'static str,
        state: String,
    },
    /// A registry already holds a container for the deployment
    #[error("A container for deployment '{0}' is already registered")]
    DuplicateDeployment(String),
    #[error("{0}")]
    Other(String),
}
impl From<Problem> for BootstrapError {
    fn from(problem: Problem) -> Self {
        match problem {
            Problem::Definition(e) => BootstrapError::Definition(e),
            Problem::Deployment(e) => BootstrapError::Deployment(e),
            Problem::ResourceLoading(e) => BootstrapError::ResourceLoading(e),
            Problem::Other(e) => BootstrapError::Other(e),
        }
    }
}
impl BootstrapError {
    /// Flattens the error into individual problems
    pub fn problems(&self) -> Vec<Problem> {
        match self {
            BootstrapError::Definition(e) => vec![e.clone().into()],
            BootstrapError::Deployment(e) => vec![e.clone().into()],
            BootstrapError::ResourceLoading(e) => vec![e.clone().into()],
            BootstrapError::Problems(p) => p.errors.clone(),
            other => vec![Problem::Other(other.to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_problem_is_surfaced_directly() {
        let problems = Problems::from(DefinitionError::NoSuitableConstructor {
            class: "Foo".into(),
        });
        assert!(matches!(
            problems.into_result(),
            Err(BootstrapError::Definition(
                DefinitionError::NoSuitableConstructor { .. }
            ))
        ));
    }

    #[test]
    fn multiple_problems_are_sorted_into_a_composite() {
        let mut problems = Problems::new();
        problems.push(DeploymentError::PseudoScopedCycle {
            chain: vec!["b".into()],
        });
        problems.push(DeploymentError::PseudoScopedCycle {
            chain: vec!["a".into()],
        });

        let Err(BootstrapError::Problems(composite)) = problems.into_result() else {
            panic!("expected a composite")
        };
        assert_eq!(composite.errors.len(), 2);
        assert!(composite.to_string().contains("- Pseudo scoped components form a cycle: [\"a\"]"));
        assert_eq!(
            composite.errors[0],
            Problem::Deployment(DeploymentError::PseudoScopedCycle {
                chain: vec!["a".into()]
            })
        );
    }

    #[test]
    fn empty_problems_are_ok() {
        assert!(Problems::new().into_result().is_ok());
    }
}
