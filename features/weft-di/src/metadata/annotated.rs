//! Declared classes and their members
//!
//! Rust has no runtime reflection, so classes are described once through
//! [AnnotatedType::builder] and the container works from that description.
//! Member bodies are type erased closures which downcast their receiver.

use std::{any::Any, fmt::Debug, marker::PhantomData, sync::Arc};

use crate::{
    errors::InjectError,
    interception::invocation::InvocationContext,
    metadata::{
        annotation::{Annotation, AnnotationSet},
        builtin,
        reflection::Type,
    },
    reference::Reference,
    types::{DynError, Injectable, TypeInfo, Unshared, Value},
};

/// A shared, type erased receiver
pub type AnyRef = dyn Any + Send + Sync;

pub type InvokeFn =
    dyn Fn(Option<&AnyRef>, &[Value]) -> Result<Option<Value>, DynError> + Send + Sync;
pub type InitializeFn = dyn Fn(&mut AnyRef, &[Value]) -> Result<(), DynError> + Send + Sync;
pub type InterceptFn = dyn Fn(&AnyRef, &mut InvocationContext<'_>) -> Result<Option<Value>, InjectError>
    + Send
    + Sync;
pub type ConstructFn = dyn Fn(&[Value]) -> Result<Unshared, DynError> + Send + Sync;
pub type FieldSetFn = dyn Fn(&mut AnyRef, Value) -> Result<(), DynError> + Send + Sync;
pub type FieldGetFn = dyn Fn(Option<&AnyRef>) -> Result<Option<Value>, DynError> + Send + Sync;

type ProjectFn = dyn for<'a> Fn(&'a AnyRef) -> Option<&'a AnyRef> + Send + Sync;
type ProjectMutFn = dyn for<'a> Fn(&'a mut AnyRef) -> Option<&'a mut AnyRef> + Send + Sync;

fn receiver_error<T>() -> DynError {
    format!("receiver is not a '{}'", std::any::type_name::<T>()).into()
}

/// What a method does when invoked
#[derive(Clone)]
pub enum MethodBody {
    /// Business, producer, observer and lifecycle callback methods
    Invoke(Arc<InvokeFn>),
    /// Initializer methods, invoked while the instance is still exclusively owned
    Initialize(Arc<InitializeFn>),
    /// Interceptor methods receiving the invocation context
    Intercept(Arc<InterceptFn>),
    /// Declared without a body (interfaces, abstract methods)
    Abstract,
}
impl Debug for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MethodBody::Invoke(_) => "Invoke",
            MethodBody::Initialize(_) => "Initialize",
            MethodBody::Intercept(_) => "Intercept",
            MethodBody::Abstract => "Abstract",
        })
    }
}

impl MethodBody {
    /// Instance method on `T`
    pub fn on<T: Injectable>(
        f: impl Fn(&T, &[Value]) -> Result<Option<Value>, DynError> + Send + Sync + 'static,
    ) -> Self {
        MethodBody::Invoke(Arc::new(move |receiver: Option<&AnyRef>, args: &[Value]| {
            let receiver = receiver
                .and_then(|r| r.downcast_ref::<T>())
                .ok_or_else(receiver_error::<T>)?;
            f(receiver, args)
        }))
    }

    /// Static method
    pub fn function(
        f: impl Fn(&[Value]) -> Result<Option<Value>, DynError> + Send + Sync + 'static,
    ) -> Self {
        MethodBody::Invoke(Arc::new(move |_: Option<&AnyRef>, args: &[Value]| f(args)))
    }

    /// Initializer method on `T`
    pub fn initialize<T: Injectable>(
        f: impl Fn(&mut T, &[Value]) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        MethodBody::Initialize(Arc::new(move |receiver: &mut AnyRef, args: &[Value]| {
            let receiver = receiver
                .downcast_mut::<T>()
                .ok_or_else(receiver_error::<T>)?;
            f(receiver, args)
        }))
    }

    /// Interceptor method on `T`
    pub fn intercept<T: Injectable>(
        f: impl Fn(&T, &mut InvocationContext<'_>) -> Result<Option<Value>, InjectError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        MethodBody::Intercept(Arc::new(
            move |receiver: &AnyRef, ctx: &mut InvocationContext<'_>| {
                let receiver =
                    receiver
                        .downcast_ref::<T>()
                        .ok_or_else(|| InjectError::DowncastFailed {
                            required: std::any::type_name::<T>().to_string(),
                            actual: "interceptor receiver".to_string(),
                        })?;
                f(receiver, ctx)
            },
        ))
    }
}

/// Access from a class to the part of it which represents its superclass
///
/// Rust composes instead of inheriting, a subclass embeds its superclass and the
/// projection selects it so inherited members can run against it.
#[derive(Clone)]
pub struct Projection {
    get: Arc<ProjectFn>,
    get_mut: Arc<ProjectMutFn>,
}
impl Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Projection")
    }
}

fn project_ref<F>(f: F) -> F
where
    F: for<'a> Fn(&'a AnyRef) -> Option<&'a AnyRef>,
{
    f
}

fn project_mut<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut AnyRef) -> Option<&'a mut AnyRef>,
{
    f
}

impl Projection {
    pub fn new<S: Injectable, B: Injectable>(
        get: fn(&S) -> &B,
        get_mut: fn(&mut S) -> &mut B,
    ) -> Self {
        Self {
            get: Arc::new(project_ref(move |any: &AnyRef| {
                any.downcast_ref::<S>().map(|s| get(s) as &AnyRef)
            })),
            get_mut: Arc::new(project_mut(move |any: &mut AnyRef| {
                any.downcast_mut::<S>().map(|s| get_mut(s) as &mut AnyRef)
            })),
        }
    }

    pub fn apply<'a>(&self, target: &'a AnyRef) -> Option<&'a AnyRef> {
        (self.get)(target)
    }

    pub fn apply_mut<'a>(&self, target: &'a mut AnyRef) -> Option<&'a mut AnyRef> {
        (self.get_mut)(target)
    }
}

/// Class level modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassModifiers {
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub serializable: bool,
}

/// Member level modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberModifiers {
    pub is_static: bool,
    pub is_private: bool,
    pub is_public: bool,
    pub is_final: bool,
    pub is_transient: bool,
}

/// A parameter of a method or constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedParameter {
    pub position: usize,
    pub ty: Type,
    pub annotations: AnnotationSet,
}

/// Builder for a parameter or injected field type
#[derive(Debug, Clone)]
pub struct Param {
    ty: Type,
    annotations: Vec<Annotation>,
}
impl Param {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            annotations: Vec::new(),
        }
    }

    pub fn class(name: &str) -> Self {
        Self::new(Type::class(name))
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Marks the parameter as the observed event
    pub fn observes(self) -> Self {
        self.annotate(Annotation::marker(builtin::OBSERVES))
    }

    /// Marks the parameter as disposed product
    pub fn disposes(self) -> Self {
        self.annotate(Annotation::marker(builtin::DISPOSES))
    }

    /// Marks the parameter as the delegate of a decorator
    pub fn delegate(self) -> Self {
        self.annotate(Annotation::marker(builtin::DELEGATE))
    }

    pub(crate) fn into_parameter(self, position: usize) -> AnnotatedParameter {
        AnnotatedParameter {
            position,
            ty: self.ty,
            annotations: AnnotationSet::new(self.annotations),
        }
    }
}
impl From<Type> for Param {
    fn from(ty: Type) -> Self {
        Param::new(ty)
    }
}

fn parameters(params: Vec<Param>) -> Vec<AnnotatedParameter> {
    params
        .into_iter()
        .enumerate()
        .map(|(position, p)| p.into_parameter(position))
        .collect()
}

/// A method of a class
#[derive(Debug, Clone)]
pub struct AnnotatedMethod {
    pub name: Arc<str>,
    pub declaring: Arc<str>,
    pub parameters: Vec<AnnotatedParameter>,
    pub return_type: Option<Type>,
    pub annotations: AnnotationSet,
    pub modifiers: MemberModifiers,
    pub body: MethodBody,
}
impl AnnotatedMethod {
    /// `name(T1, T2)` - used for override detection and identifiers
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.ty.to_string())
            .collect::<Vec<_>>();
        format!("{}({})", self.name, params.join(", "))
    }

    /// `Declaring.name(T1, T2)`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring, self.signature())
    }

    pub fn is_annotated(&self, annotation_type: &str) -> bool {
        self.annotations.contains(annotation_type)
    }

    /// Parameters annotated with the given annotation
    pub fn parameters_annotated(&self, annotation_type: &str) -> Vec<&AnnotatedParameter> {
        self.parameters
            .iter()
            .filter(|p| p.annotations.contains(annotation_type))
            .collect()
    }
}

/// Builder for [AnnotatedMethod]
pub struct Method {
    name: Arc<str>,
    parameters: Vec<Param>,
    return_type: Option<Type>,
    annotations: Vec<Annotation>,
    modifiers: MemberModifiers,
    body: MethodBody,
}
impl Method {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            parameters: Vec::new(),
            return_type: None,
            annotations: Vec::new(),
            modifiers: MemberModifiers {
                is_public: true,
                ..Default::default()
            },
            body: MethodBody::Abstract,
        }
    }

    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.parameters.push(param.into());
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Shorthand for `annotate(Annotation::marker(..))`
    pub fn marked(self, annotation_type: &str) -> Self {
        self.annotate(Annotation::marker(annotation_type))
    }

    pub fn make_static(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn make_private(mut self) -> Self {
        self.modifiers.is_private = true;
        self.modifiers.is_public = false;
        self
    }

    pub fn make_final(mut self) -> Self {
        self.modifiers.is_final = true;
        self
    }

    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = body;
        self
    }

    fn build(self, declaring: &Arc<str>) -> AnnotatedMethod {
        AnnotatedMethod {
            name: self.name,
            declaring: declaring.clone(),
            parameters: parameters(self.parameters),
            return_type: self.return_type,
            annotations: AnnotationSet::new(self.annotations),
            modifiers: self.modifiers,
            body: self.body,
        }
    }
}

/// Reads and writes a field
#[derive(Clone, Default)]
pub struct FieldAccessor {
    pub set: Option<Arc<FieldSetFn>>,
    pub get: Option<Arc<FieldGetFn>>,
}
impl Debug for FieldAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("set", &self.set.is_some())
            .field("get", &self.get.is_some())
            .finish()
    }
}

/// A field of a class
#[derive(Debug, Clone)]
pub struct AnnotatedField {
    pub name: Arc<str>,
    pub declaring: Arc<str>,
    pub ty: Type,
    pub annotations: AnnotationSet,
    pub modifiers: MemberModifiers,
    pub accessor: FieldAccessor,
}
impl AnnotatedField {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring, self.name)
    }
}

/// Builder for [AnnotatedField]
pub struct Field {
    name: Arc<str>,
    ty: Type,
    annotations: Vec<Annotation>,
    modifiers: MemberModifiers,
    accessor: FieldAccessor,
}
impl Field {
    pub fn new(name: impl AsRef<str>, ty: Type) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
            annotations: Vec::new(),
            modifiers: MemberModifiers {
                is_private: true,
                ..Default::default()
            },
            accessor: FieldAccessor::default(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn make_public(mut self) -> Self {
        self.modifiers.is_public = true;
        self.modifiers.is_private = false;
        self
    }

    pub fn make_static(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    pub fn make_transient(mut self) -> Self {
        self.modifiers.is_transient = true;
        self
    }

    /// Writes the field of a `T`
    pub fn setter<T: Injectable>(
        mut self,
        f: impl Fn(&mut T, Value) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.accessor.set = Some(Arc::new(move |target: &mut AnyRef, value: Value| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(receiver_error::<T>)?;
            f(target, value)
        }));
        self
    }

    /// Reads the field of a `T`
    pub fn getter<T: Injectable>(
        mut self,
        f: impl Fn(&T) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.accessor.get = Some(Arc::new(move |target: Option<&AnyRef>| {
            let target = target
                .and_then(|t| t.downcast_ref::<T>())
                .ok_or_else(receiver_error::<T>)?;
            Ok(f(target))
        }));
        self
    }

    /// Reads a static field
    pub fn static_getter(
        mut self,
        f: impl Fn() -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.modifiers.is_static = true;
        self.accessor.get = Some(Arc::new(move |_: Option<&AnyRef>| Ok(f())));
        self
    }

    fn build(self, declaring: &Arc<str>) -> AnnotatedField {
        AnnotatedField {
            name: self.name,
            declaring: declaring.clone(),
            ty: self.ty,
            annotations: AnnotationSet::new(self.annotations),
            modifiers: self.modifiers,
            accessor: self.accessor,
        }
    }
}

/// A constructor of a class
#[derive(Clone)]
pub struct AnnotatedConstructor {
    pub declaring: Arc<str>,
    pub parameters: Vec<AnnotatedParameter>,
    pub annotations: AnnotationSet,
    pub body: Arc<ConstructFn>,
}
impl Debug for AnnotatedConstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotatedConstructor")
            .field("declaring", &self.declaring)
            .field("parameters", &self.parameters)
            .finish()
    }
}
impl AnnotatedConstructor {
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.ty.to_string())
            .collect::<Vec<_>>();
        format!("{}({})", self.declaring, params.join(", "))
    }
}

/// Link to the superclass
#[derive(Debug, Clone)]
pub struct Superclass {
    pub ty: Type,
    pub projection: Option<Projection>,
}

/// A declared class
#[derive(Debug, Clone)]
pub struct AnnotatedType {
    pub name: Arc<str>,
    pub rust_type: Option<TypeInfo>,
    pub type_parameters: Vec<Type>,
    pub superclass: Option<Superclass>,
    pub interfaces: Vec<Type>,
    pub annotations: AnnotationSet,
    pub fields: Vec<Arc<AnnotatedField>>,
    pub methods: Vec<Arc<AnnotatedMethod>>,
    pub constructors: Vec<Arc<AnnotatedConstructor>>,
    pub modifiers: ClassModifiers,
}

impl AnnotatedType {
    /// Describes the class `name`, implemented by the Rust type `T`
    pub fn builder<T: Injectable>(name: impl AsRef<str>) -> AnnotatedTypeBuilder<T> {
        AnnotatedTypeBuilder::new(name, Some(TypeInfo::of::<T>()))
    }

    /// Describes a class without a Rust implementation (interfaces, abstract classes)
    pub fn declare(name: impl AsRef<str>) -> AnnotatedTypeBuilder<()> {
        AnnotatedTypeBuilder::new(name, None)
    }

    /// The type of this class, parameterized by its own type parameters
    pub fn as_type(&self) -> Type {
        if self.type_parameters.is_empty() {
            Type::Class(self.name.clone())
        } else {
            Type::Parameterized {
                raw: self.name.clone(),
                args: self.type_parameters.clone(),
            }
        }
    }

    pub fn is_annotated(&self, annotation_type: &str) -> bool {
        self.annotations.contains(annotation_type)
    }

    /// A copy with an additional annotation - used by extensions modifying types
    pub fn with_annotation(&self, annotation: Annotation) -> Self {
        let mut copy = self.clone();
        copy.annotations.insert(annotation);
        copy
    }

    /// A copy without the annotation
    pub fn without_annotation(&self, annotation_type: &str) -> Self {
        let mut copy = self.clone();
        copy.annotations.remove(annotation_type);
        copy
    }

    /// Structural information available without materializing the class
    pub fn class_info(&self) -> ClassInfo {
        ClassInfo {
            name: self.name.clone(),
            superclass: self
                .superclass
                .as_ref()
                .and_then(|s| s.ty.raw_name().cloned()),
            interfaces: self
                .interfaces
                .iter()
                .filter_map(|i| i.raw_name().cloned())
                .collect(),
            annotations: self
                .annotations
                .iter()
                .map(|a| a.annotation_type.clone())
                .collect(),
        }
    }
}

/// Names only view of a class, as provided by a resource loader index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: Arc<str>,
    pub superclass: Option<Arc<str>>,
    pub interfaces: Vec<Arc<str>>,
    pub annotations: Vec<Arc<str>>,
}

/// Builder for [AnnotatedType]
pub struct AnnotatedTypeBuilder<T> {
    ty: AnnotatedType,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AnnotatedTypeBuilder<T> {
    fn new(name: impl AsRef<str>, rust_type: Option<TypeInfo>) -> Self {
        Self {
            ty: AnnotatedType {
                name: Arc::from(name.as_ref()),
                rust_type,
                type_parameters: Vec::new(),
                superclass: None,
                interfaces: Vec::new(),
                annotations: AnnotationSet::default(),
                fields: Vec::new(),
                methods: Vec::new(),
                constructors: Vec::new(),
                modifiers: ClassModifiers::default(),
            },
            _marker: PhantomData,
        }
    }

    pub fn type_parameter(mut self, variable: Type) -> Self {
        self.ty.type_parameters.push(variable);
        self
    }

    /// Extends a class which runs against the same Rust value
    pub fn extends(mut self, superclass: Type) -> Self {
        self.ty.superclass = Some(Superclass {
            ty: superclass,
            projection: None,
        });
        self
    }

    pub fn implements(mut self, interface: Type) -> Self {
        self.ty.interfaces.push(interface);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.ty.annotations.insert(annotation);
        self
    }

    /// Shorthand for `annotate(Annotation::marker(..))`
    pub fn marked(self, annotation_type: &str) -> Self {
        self.annotate(Annotation::marker(annotation_type))
    }

    pub fn make_final(mut self) -> Self {
        self.ty.modifiers.is_final = true;
        self
    }

    pub fn make_abstract(mut self) -> Self {
        self.ty.modifiers.is_abstract = true;
        self
    }

    pub fn make_interface(mut self) -> Self {
        self.ty.modifiers.is_interface = true;
        self.ty.modifiers.is_abstract = true;
        self
    }

    pub fn serializable(mut self) -> Self {
        self.ty.modifiers.serializable = true;
        self.ty.interfaces.push(Type::class(builtin::SERIALIZABLE));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        let method = method.build(&self.ty.name);
        self.ty.methods.push(Arc::new(method));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        let field = field.build(&self.ty.name);
        self.ty.fields.push(Arc::new(field));
        self
    }

    /// Constructor taking injected values
    pub fn constructor_with(
        mut self,
        params: Vec<Param>,
        annotations: Vec<Annotation>,
        body: Arc<ConstructFn>,
    ) -> Self {
        let constructor = AnnotatedConstructor {
            declaring: self.ty.name.clone(),
            parameters: parameters(params),
            annotations: AnnotationSet::new(annotations),
            body,
        };
        self.ty.constructors.push(Arc::new(constructor));
        self
    }

    pub fn build(self) -> AnnotatedType {
        self.ty
    }
}

impl<T: Injectable> AnnotatedTypeBuilder<T> {
    /// Extends a class whose Rust value is embedded in `T`
    pub fn extends_with<B: Injectable>(
        mut self,
        superclass: Type,
        get: fn(&T) -> &B,
        get_mut: fn(&mut T) -> &mut B,
    ) -> Self {
        self.ty.superclass = Some(Superclass {
            ty: superclass,
            projection: Some(Projection::new(get, get_mut)),
        });
        self
    }

    /// No-argument constructor
    pub fn constructor(self, f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.constructor_with(
            vec![],
            vec![],
            Arc::new(move |_: &[Value]| Ok(Box::new(f()) as Unshared)),
        )
    }

    /// Constructor annotated @Inject, receiving one reference per parameter
    pub fn inject_constructor(
        self,
        params: Vec<Param>,
        f: impl Fn(&[Reference]) -> Result<T, DynError> + Send + Sync + 'static,
    ) -> Self {
        self.constructor_with(
            params,
            vec![Annotation::marker(builtin::INJECT)],
            Arc::new(move |args: &[Value]| {
                let references = Reference::from_values(args)?;
                Ok(Box::new(f(&references)?) as Unshared)
            }),
        )
    }

    /// Field annotated @Inject
    pub fn inject_field(
        self,
        name: impl AsRef<str>,
        param: impl Into<Param>,
        f: impl Fn(&mut T, Reference) + Send + Sync + 'static,
    ) -> Self {
        let param = param.into();
        let mut field = Field::new(name, param.ty)
            .annotate(Annotation::marker(builtin::INJECT))
            .setter(move |target: &mut T, value: Value| {
                f(target, Reference::from_value(&value)?.clone());
                Ok(())
            });
        for annotation in param.annotations {
            field = field.annotate(annotation);
        }
        self.field(field)
    }

    /// Initializer method annotated @Inject
    pub fn initializer(
        self,
        name: impl AsRef<str>,
        params: Vec<Param>,
        f: impl Fn(&mut T, &[Reference]) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        let mut method = Method::new(name).marked(builtin::INJECT).body(MethodBody::initialize(
            move |target: &mut T, args: &[Value]| f(target, &Reference::from_values(args)?),
        ));
        for param in params {
            method = method.param(param);
        }
        self.method(method)
    }

    /// Method annotated @PostConstruct
    pub fn post_construct(
        self,
        name: impl AsRef<str>,
        f: impl Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.callback(name, builtin::POST_CONSTRUCT, f)
    }

    /// Method annotated @PreDestroy
    pub fn pre_destroy(
        self,
        name: impl AsRef<str>,
        f: impl Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.callback(name, builtin::PRE_DESTROY, f)
    }

    fn callback(
        self,
        name: impl AsRef<str>,
        annotation_type: &str,
        f: impl Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.method(
            Method::new(name)
                .marked(annotation_type)
                .body(MethodBody::on(move |target: &T, _: &[Value]| {
                    f(target)?;
                    Ok(None)
                })),
        )
    }

    /// Business method
    pub fn business(
        self,
        name: impl AsRef<str>,
        f: impl Fn(&T, &[Value]) -> Result<Option<Value>, DynError> + Send + Sync + 'static,
    ) -> Self {
        self.method(Method::new(name).body(MethodBody::on(f)))
    }

    /// Interceptor method, `annotation_type` is one of the interception annotations
    pub fn interceptor_method(
        self,
        name: impl AsRef<str>,
        annotation_type: &str,
        f: impl Fn(&T, &mut InvocationContext<'_>) -> Result<Option<Value>, InjectError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.method(
            Method::new(name)
                .marked(annotation_type)
                .body(MethodBody::intercept(f)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Base {
        hits: std::sync::atomic::AtomicUsize,
    }
    #[derive(Default)]
    struct Sub {
        base: Base,
    }

    #[test]
    fn builder_collects_members() {
        let ty = AnnotatedType::builder::<Sub>("Sub")
            .extends_with(Type::class("Base"), |s: &Sub| &s.base, |s: &mut Sub| &mut s.base)
            .marked(builtin::APPLICATION_SCOPED)
            .constructor(Sub::default)
            .business("run", |_: &Sub, _| Ok(None))
            .build();

        assert_eq!(&*ty.name, "Sub");
        assert_eq!(ty.constructors.len(), 1);
        assert_eq!(ty.methods[0].signature(), "run()");
        assert_eq!(&*ty.methods[0].declaring, "Sub");
        assert!(ty.is_annotated(builtin::APPLICATION_SCOPED));
        assert_eq!(ty.class_info().superclass.as_deref(), Some("Base"));
    }

    #[test]
    fn projection_selects_embedded_superclass() {
        let projection = Projection::new(|s: &Sub| &s.base, |s: &mut Sub| &mut s.base);
        let mut sub = Sub::default();

        let base = projection.apply_mut(&mut sub).unwrap();
        base.downcast_mut::<Base>()
            .unwrap()
            .hits
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let base = projection.apply(&sub).unwrap().downcast_ref::<Base>().unwrap();
        assert_eq!(base.hits.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(projection.apply(&Base::default()).is_none());
    }

    #[test]
    fn typed_bodies_reject_foreign_receivers() {
        let body = MethodBody::on(|_: &Sub, _| Ok(None));
        let MethodBody::Invoke(invoke) = body else {
            panic!("expected invoke body")
        };
        let base = Base::default();
        let sub = Sub::default();
        assert!(invoke(Some(&base as &AnyRef), &[]).is_err());
        assert!(invoke(Some(&sub as &AnyRef), &[]).is_ok());
        assert!(invoke(None, &[]).is_err());
    }
}
