use std::{collections::HashMap, sync::Arc};

use crate::{
    errors::InjectError,
    interception::metadata::InterceptionType,
    metadata::{annotated::{AnyRef, MethodBody}, enhanced::EnhancedMethod},
    types::Value,
};

/// One interceptor method in a chain, with the instance it runs on
#[derive(Clone)]
pub struct InterceptorStep {
    pub instance: Value,
    pub method: EnhancedMethod,
}

impl InterceptorStep {
    pub fn new(instance: Value, method: EnhancedMethod) -> Self {
        Self { instance, method }
    }

    fn invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Option<Value>, InjectError> {
        let member = &self.method.member;
        let receiver = self
            .method
            .receiver(self.instance.as_ref())
            .ok_or_else(|| InjectError::DowncastFailed {
                required: member.declaring.to_string(),
                actual: "interceptor instance".to_string(),
            })?;
        match &member.body {
            MethodBody::Intercept(body) => body(receiver, ctx),
            // Callbacks without a context parameter proceed implicitly
            MethodBody::Invoke(_) => {
                self.method.invoke(Some(self.instance.as_ref()), &[])?;
                ctx.proceed()
            }
            body => Err(InjectError::callback(
                member.qualified_name(),
                format!("a {body:?} body cannot intercept").into(),
            )),
        }
    }
}

/// Runs after the last interceptor: the target method, the constructor or nothing
pub type Terminal<'a> =
    dyn Fn(Option<&AnyRef>, &[Value]) -> Result<Option<Value>, InjectError> + 'a;

/// State of one intercepted invocation, handed to every interceptor method
///
/// [InvocationContext::proceed] calls the next interceptor, or the terminal after the last one.
/// It may be called more than once.
pub struct InvocationContext<'a> {
    interception: InterceptionType,
    target: Option<&'a AnyRef>,
    method: Option<Arc<str>>,
    parameters: Vec<Value>,
    data: HashMap<String, Value>,
    chain: &'a [InterceptorStep],
    position: usize,
    terminal: &'a Terminal<'a>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(
        interception: InterceptionType,
        target: Option<&'a AnyRef>,
        method: Option<Arc<str>>,
        parameters: Vec<Value>,
        chain: &'a [InterceptorStep],
        terminal: &'a Terminal<'a>,
    ) -> Self {
        Self {
            interception,
            target,
            method,
            parameters,
            data: HashMap::new(),
            chain,
            position: 0,
            terminal,
        }
    }

    pub fn proceed(&mut self) -> Result<Option<Value>, InjectError> {
        let chain = self.chain;
        match chain.get(self.position) {
            Some(step) => {
                self.position += 1;
                let result = step.invoke(self);
                self.position -= 1;
                result
            }
            None => (self.terminal)(self.target, &self.parameters),
        }
    }

    pub fn interception_type(&self) -> InterceptionType {
        self.interception
    }

    /// The intercepted instance, None while constructing
    pub fn target(&self) -> Option<&'a AnyRef> {
        self.target
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: Vec<Value>) {
        self.parameters = parameters;
    }

    /// Data shared between the interceptors of this invocation
    pub fn context_data(&mut self) -> &mut HashMap<String, Value> {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        metadata::{
            annotated::AnnotatedType, builtin, store::MetaAnnotationStore,
            transformer::ClassTransformer,
        },
        types::{downcast, value},
    };

    struct Doubler;
    struct ShortCircuit;

    fn step<T: Send + Sync + 'static>(
        instance: T,
        class: &str,
        body: impl Fn(&T, &mut InvocationContext<'_>) -> Result<Option<Value>, InjectError>
            + Send
            + Sync
            + 'static,
    ) -> InterceptorStep {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        let ty = transformer.register(
            AnnotatedType::builder::<T>(class)
                .interceptor_method("around", builtin::AROUND_INVOKE, body)
                .build(),
        );
        let enhanced = transformer.enhance(&ty).unwrap();
        InterceptorStep::new(value(instance), enhanced.methods[0].clone())
    }

    #[test]
    fn interceptors_wrap_the_terminal() {
        let calls = AtomicUsize::new(0);
        let doubler = step(Doubler, "Doubler", |_: &Doubler, ctx| {
            let result = ctx.proceed()?.expect("terminal returns a value");
            let n = downcast::<i64>(&result).unwrap();
            Ok(Some(value(*n * 2)))
        });
        let chain = [doubler];
        let terminal = |_: Option<&AnyRef>, args: &[Value]| -> Result<Option<Value>, InjectError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let n = downcast::<i64>(&args[0]).unwrap();
            Ok(Some(value(*n + 1)))
        };
        let mut ctx = InvocationContext::new(
            InterceptionType::AroundInvoke,
            None,
            Some(Arc::from("inc")),
            vec![value(20i64)],
            &chain,
            &terminal,
        );

        let result = ctx.proceed().unwrap().unwrap();
        assert_eq!(*downcast::<i64>(&result).unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interceptor_can_skip_the_target() {
        let short = step(ShortCircuit, "ShortCircuit", |_: &ShortCircuit, _ctx| {
            Ok(Some(value("cached")))
        });
        let chain = [short];
        let terminal = |_: Option<&AnyRef>, _: &[Value]| -> Result<Option<Value>, InjectError> {
            panic!("target must not run")
        };
        let mut ctx = InvocationContext::new(
            InterceptionType::AroundInvoke,
            None,
            None,
            vec![],
            &chain,
            &terminal,
        );
        let result = ctx.proceed().unwrap().unwrap();
        assert_eq!(*downcast::<&str>(&result).unwrap(), "cached");
    }
}
