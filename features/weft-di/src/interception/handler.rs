use std::sync::Arc;

use crate::{
    component::{Component, ComponentRole},
    errors::InjectError,
    ids::ComponentIdentifier,
    interception::{
        decorators::{invoke_target, DecoratorChain},
        invocation::{InterceptorStep, InvocationContext},
        metadata::{ClassMetadata, InterceptionType},
        model::InterceptionModel,
    },
    metadata::{annotated::AnyRef, enhanced::EnhancedAnnotatedType},
    types::Value,
};

/// The interceptor instances created for one target instance
#[derive(Default)]
pub struct InterceptorInstances {
    entries: Vec<(ComponentIdentifier, Value)>,
}

impl InterceptorInstances {
    pub fn new(entries: Vec<(ComponentIdentifier, Value)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, interceptor: &ComponentIdentifier) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(id, _)| id == interceptor)
            .map(|(_, instance)| instance)
    }

    /// Steps for the interceptors' methods of the given type, followed by the target's own
    pub fn steps(
        &self,
        interceptors: &[Arc<Component>],
        interception: InterceptionType,
        target: Option<(&Value, &ClassMetadata)>,
    ) -> Result<Vec<InterceptorStep>, InjectError> {
        let mut steps = Vec::new();
        for interceptor in interceptors {
            let ComponentRole::Interceptor(info) = &interceptor.role else {
                continue;
            };
            let instance = self
                .get(&interceptor.id)
                .ok_or_else(|| InjectError::NullReference {
                    component: interceptor.id.to_string(),
                })?;
            for method in info.metadata.methods(interception) {
                steps.push(InterceptorStep::new(instance.clone(), method.clone()));
            }
        }
        if let Some((instance, metadata)) = target {
            for method in metadata.methods(interception) {
                steps.push(InterceptorStep::new(instance.clone(), method.clone()));
            }
        }
        Ok(steps)
    }
}

/// Runs `@PostConstruct` or `@PreDestroy` callbacks, interceptors first
pub fn run_lifecycle(
    interception: InterceptionType,
    target: &Value,
    metadata: &ClassMetadata,
    interceptors: &[Arc<Component>],
    instances: &InterceptorInstances,
) -> Result<(), InjectError> {
    let steps = instances.steps(interceptors, interception, Some((target, metadata)))?;
    if steps.is_empty() {
        return Ok(());
    }
    let terminal = |_: Option<&AnyRef>, _: &[Value]| -> Result<Option<Value>, InjectError> { Ok(None) };
    InvocationContext::new(
        interception,
        Some(target.as_ref()),
        None,
        Vec::new(),
        &steps,
        &terminal,
    )
    .proceed()
    .map(|_| ())
}

/// Routes business method calls of one instance: interceptors, then decorators, then the target
pub struct MethodHandler {
    component: Arc<Component>,
    target: Value,
    class: Arc<EnhancedAnnotatedType>,
    model: Arc<InterceptionModel>,
    interceptors: Arc<InterceptorInstances>,
    decorators: Option<DecoratorChain>,
}

impl MethodHandler {
    pub fn new(
        component: Arc<Component>,
        target: Value,
        class: Arc<EnhancedAnnotatedType>,
        model: Arc<InterceptionModel>,
        interceptors: Arc<InterceptorInstances>,
        decorators: Option<DecoratorChain>,
    ) -> Self {
        Self {
            component,
            target,
            class,
            model,
            interceptors,
            decorators,
        }
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, InjectError> {
        let interceptors = self.model.around_invoke(method);
        let steps = self.interceptors.steps(
            &interceptors,
            InterceptionType::AroundInvoke,
            Some((&self.target, &self.model.target)),
        )?;
        tracing::trace!(
            "{}.{method}: {} interceptor methods",
            self.component.id,
            steps.len()
        );

        let terminal = |_: Option<&AnyRef>, params: &[Value]| match &self.decorators {
            Some(chain) => chain.invoke(method, params),
            None => invoke_target(&self.class, &self.target, method, params),
        };
        InvocationContext::new(
            InterceptionType::AroundInvoke,
            Some(self.target.as_ref()),
            Some(Arc::from(method)),
            args,
            &steps,
            &terminal,
        )
        .proceed()
    }

    pub fn lifecycle(&self, interception: InterceptionType) -> Result<(), InjectError> {
        run_lifecycle(
            interception,
            &self.target,
            &self.model.target,
            &self.model.class_level(interception),
            &self.interceptors,
        )
    }
}
