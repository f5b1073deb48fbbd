use std::{any::Any, sync::Arc};

use parking_lot::Mutex;

use crate::{
    component::{Component, InjectionPoint, Producer, Product},
    context::{creational::CreationalContext, ContextualInstance},
    errors::{DefinitionError, InjectError},
    ids::ComponentIdentifier,
    interception::{
        decorators::DecoratorChain,
        handler::{run_lifecycle, InterceptorInstances, MethodHandler},
        invocation::InvocationContext,
        metadata::InterceptionType,
    },
    manager::BeanManager,
    metadata::{
        annotated::{AnnotatedConstructor, AnyRef, MethodBody},
        builtin,
        enhanced::{EnhancedAnnotatedType, EnhancedField, EnhancedMethod},
        store::MetaAnnotationStore,
    },
    types::{Unshared, Value},
};

/// Lifecycle of class based components: constructor, field and initializer injection,
/// lifecycle callbacks and interception
pub struct ManagedProducer {
    class: Arc<EnhancedAnnotatedType>,
    constructor: Arc<AnnotatedConstructor>,
    constructor_points: Vec<InjectionPoint>,
    fields: Vec<(EnhancedField, InjectionPoint)>,
    initializers: Vec<(EnhancedMethod, Vec<InjectionPoint>)>,
}

impl ManagedProducer {
    pub fn new(
        store: &MetaAnnotationStore,
        class: Arc<EnhancedAnnotatedType>,
        id: &ComponentIdentifier,
    ) -> Result<Self, DefinitionError> {
        let constructor = match class.injectable_constructors().as_slice() {
            [constructor] => (*constructor).clone(),
            [] => {
                return Err(DefinitionError::NoSuitableConstructor {
                    class: class.name().to_string(),
                })
            }
            _ => {
                return Err(DefinitionError::MultipleInjectConstructors {
                    class: class.name().to_string(),
                })
            }
        };
        let constructor_points = constructor
            .parameters
            .iter()
            .map(|p| {
                InjectionPoint::parameter(store, &constructor.declaring, &constructor.signature(), p)
                    .owned_by(id)
            })
            .collect();

        let fields = class
            .fields_annotated(builtin::INJECT)
            .filter(|f| !f.member.modifiers.is_static)
            .map(|f| {
                let field = &f.member;
                let ip = InjectionPoint::field(
                    store,
                    &field.declaring,
                    &field.name,
                    &field.ty,
                    &field.annotations,
                    field.modifiers.is_transient,
                )
                .owned_by(id);
                (f.clone(), ip)
            })
            .collect();

        let mut initializers = Vec::new();
        for method in class.methods_annotated(builtin::INJECT) {
            let member = &method.member;
            if member.modifiers.is_static {
                continue;
            }
            if !matches!(member.body, MethodBody::Initialize(_)) {
                return Err(DefinitionError::InvalidMember {
                    member: member.qualified_name(),
                    reason: "initializer methods need an initializer body".to_string(),
                });
            }
            let points = member
                .parameters
                .iter()
                .map(|p| {
                    InjectionPoint::parameter(store, &member.declaring, &member.qualified_name(), p)
                        .owned_by(id)
                })
                .collect();
            initializers.push((method.clone(), points));
        }

        Ok(Self {
            class,
            constructor,
            constructor_points,
            fields,
            initializers,
        })
    }

    pub fn class(&self) -> &Arc<EnhancedAnnotatedType> {
        &self.class
    }

    /// Constructor parameters, then fields, then initializer parameters
    pub fn injection_points(&self) -> Vec<InjectionPoint> {
        let mut points = self.constructor_points.clone();
        points.extend(self.fields.iter().map(|(_, ip)| ip.clone()));
        points.extend(self.initializers.iter().flat_map(|(_, ips)| ips.iter().cloned()));
        points
    }

    fn values(
        manager: &BeanManager,
        points: &[InjectionPoint],
        cc: &Arc<CreationalContext>,
    ) -> Result<Vec<Value>, InjectError> {
        points
            .iter()
            .map(|ip| Ok(manager.get_injectable_reference(ip, cc)?.into_value()))
            .collect()
    }

    fn construct(&self, args: &[Value]) -> Result<Unshared, InjectError> {
        (self.constructor.body)(args)
            .map_err(|e| InjectError::callback(self.constructor.signature(), e))
    }

    /// Creates the interceptor instances of the class, they live as dependents of `cc`
    fn create_interceptors(
        manager: &BeanManager,
        interceptors: &[Arc<Component>],
        cc: &Arc<CreationalContext>,
    ) -> Result<Arc<InterceptorInstances>, InjectError> {
        let mut entries = Vec::with_capacity(interceptors.len());
        for interceptor in interceptors {
            let created = manager.create_dependent(interceptor, cc)?;
            let instance = created.instance.ok_or_else(|| InjectError::NullReference {
                component: interceptor.id.to_string(),
            })?;
            entries.push((interceptor.id.clone(), instance));
        }
        Ok(Arc::new(InterceptorInstances::new(entries)))
    }

    fn lifecycle(
        &self,
        instance: &ContextualInstance,
        interception: InterceptionType,
    ) -> Result<(), InjectError> {
        let Some(target) = &instance.instance else {
            return Ok(());
        };
        let manager = instance.cc.manager()?;
        let empty = InterceptorInstances::default();
        let interceptors = instance.cc.interceptors().map(|i| &**i).unwrap_or(&empty);
        match manager.interception_model(&instance.component)? {
            Some(model) => run_lifecycle(
                interception,
                target,
                &model.target,
                &model.class_level(interception),
                interceptors,
            ),
            None => {
                let mut metadata = manager.interceptor_metadata().class_metadata(&self.class)?;
                if instance.component.is_interceptor() {
                    metadata = Arc::new(metadata.own_callbacks());
                }
                run_lifecycle(interception, target, &metadata, &[], interceptors)
            }
        }
    }
}

impl Producer for ManagedProducer {
    fn produce(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let args = Self::values(manager, &self.constructor_points, cc)?;

        let Some(model) = manager.interception_model(component)? else {
            return Ok(Product::Unshared(self.construct(&args)?));
        };
        if model.has_interceptors() {
            let instances = Self::create_interceptors(manager, model.interceptors(), cc)?;
            cc.set_interceptors(instances);
        }

        let around = model.class_level(InterceptionType::AroundConstruct);
        if around.is_empty() {
            return Ok(Product::Unshared(self.construct(&args)?));
        }

        let empty = InterceptorInstances::default();
        let instances = cc.interceptors().map(|i| &**i).unwrap_or(&empty);
        let steps = instances.steps(&around, InterceptionType::AroundConstruct, None)?;
        let constructed: Mutex<Option<Unshared>> = Mutex::new(None);
        let terminal = |_: Option<&AnyRef>, params: &[Value]| -> Result<Option<Value>, InjectError> {
            let instance = self.construct(params)?;
            *constructed.lock() = Some(instance);
            Ok(None)
        };
        InvocationContext::new(
            InterceptionType::AroundConstruct,
            None,
            Some(self.constructor.signature().into()),
            args,
            &steps,
            &terminal,
        )
        .proceed()?;

        match constructed.into_inner() {
            Some(instance) => Ok(Product::Unshared(instance)),
            None => Err(InjectError::callback(
                self.constructor.signature(),
                "an around construct interceptor did not proceed".into(),
            )),
        }
    }

    fn inject(
        &self,
        instance: &mut AnyRef,
        _component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<(), InjectError> {
        for (field, ip) in &self.fields {
            let value = manager.get_injectable_reference(ip, cc)?.into_value();
            field.set(instance, value)?;
        }
        for (method, points) in &self.initializers {
            let args = Self::values(manager, points, cc)?;
            method.initialize(instance, &args)?;
        }
        Ok(())
    }

    fn method_handler(
        &self,
        component: &Arc<Component>,
        instance: &Value,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Option<Arc<MethodHandler>>, InjectError> {
        let Some(model) = manager.interception_model(component)? else {
            return Ok(None);
        };
        let decorators = manager.decorators_for(component);
        if !model.intercepts_invocations() && decorators.is_empty() {
            return Ok(None);
        }

        let chain = DecoratorChain::build(manager, &decorators, instance, &self.class, cc)?;
        let interceptors = cc.interceptors().cloned().unwrap_or_default();
        Ok(Some(Arc::new(MethodHandler::new(
            component.clone(),
            instance.clone(),
            self.class.clone(),
            model,
            interceptors,
            chain,
        ))))
    }

    fn post_construct(&self, instance: &ContextualInstance) -> Result<(), InjectError> {
        self.lifecycle(instance, InterceptionType::PostConstruct)
    }

    fn pre_destroy(&self, instance: &ContextualInstance) -> Result<(), InjectError> {
        self.lifecycle(instance, InterceptionType::PreDestroy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
