use std::{collections::HashMap, sync::Arc};

use crate::{
    errors::InjectError,
    metadata::{
        annotated::{
            AnnotatedConstructor, AnnotatedField, AnnotatedMethod, AnnotatedType, AnyRef,
            MethodBody, Projection,
        },
        annotation::Annotation,
        builtin,
        reflection::Type,
        store::MetaAnnotationStore,
    },
    types::Value,
};

/// A member reachable from the leaf class, with the projections leading to its declaring class
#[derive(Debug, Clone)]
pub struct Inherited<M> {
    pub member: Arc<M>,
    /// 0 = outermost superclass
    pub depth: usize,
    path: Vec<Projection>,
}

impl<M> Inherited<M> {
    /// The part of `target` the member was declared on
    pub fn receiver<'a>(&self, target: &'a AnyRef) -> Option<&'a AnyRef> {
        self.path
            .iter()
            .try_fold(target, |current, projection| projection.apply(current))
    }

    pub fn receiver_mut<'a>(&self, target: &'a mut AnyRef) -> Option<&'a mut AnyRef> {
        let mut current = target;
        for projection in &self.path {
            current = projection.apply_mut(current)?;
        }
        Some(current)
    }
}

pub type EnhancedMethod = Inherited<AnnotatedMethod>;
pub type EnhancedField = Inherited<AnnotatedField>;

impl EnhancedMethod {
    /// Invokes a method with an [MethodBody::Invoke] body
    pub fn invoke(
        &self,
        target: Option<&AnyRef>,
        args: &[Value],
    ) -> Result<Option<Value>, InjectError> {
        let method = &self.member;
        let MethodBody::Invoke(body) = &method.body else {
            return Err(InjectError::callback(
                method.qualified_name(),
                format!("cannot invoke a {:?} body directly", method.body).into(),
            ));
        };

        let receiver = match (method.modifiers.is_static, target) {
            (true, _) => None,
            (false, Some(target)) => Some(self.receiver(target).ok_or_else(|| {
                InjectError::DowncastFailed {
                    required: method.declaring.to_string(),
                    actual: "receiver".to_string(),
                }
            })?),
            (false, None) => {
                return Err(InjectError::callback(
                    method.qualified_name(),
                    "instance method invoked without a receiver".into(),
                ))
            }
        };

        body(receiver, args).map_err(|e| InjectError::callback(method.qualified_name(), e))
    }

    /// Invokes an initializer on an exclusively owned instance
    pub fn initialize(&self, target: &mut AnyRef, args: &[Value]) -> Result<(), InjectError> {
        let method = &self.member;
        let MethodBody::Initialize(body) = &method.body else {
            return Err(InjectError::callback(
                method.qualified_name(),
                format!("a {:?} body cannot initialize", method.body).into(),
            ));
        };
        let receiver = self
            .receiver_mut(target)
            .ok_or_else(|| InjectError::DowncastFailed {
                required: method.declaring.to_string(),
                actual: "receiver".to_string(),
            })?;
        body(receiver, args).map_err(|e| InjectError::callback(method.qualified_name(), e))
    }
}

impl EnhancedField {
    /// Writes the field of an exclusively owned instance
    pub fn set(&self, target: &mut AnyRef, value: Value) -> Result<(), InjectError> {
        let field = &self.member;
        let Some(setter) = &field.accessor.set else {
            return Err(InjectError::callback(
                field.qualified_name(),
                "field has no setter".into(),
            ));
        };
        let receiver = self
            .receiver_mut(target)
            .ok_or_else(|| InjectError::DowncastFailed {
                required: field.declaring.to_string(),
                actual: "receiver".to_string(),
            })?;
        setter(receiver, value).map_err(|e| InjectError::callback(field.qualified_name(), e))
    }

    /// Reads the field, `target` is None for static fields
    pub fn get(&self, target: Option<&AnyRef>) -> Result<Option<Value>, InjectError> {
        let field = &self.member;
        let Some(getter) = &field.accessor.get else {
            return Err(InjectError::callback(
                field.qualified_name(),
                "field has no getter".into(),
            ));
        };
        let receiver = match target {
            Some(target) if !field.modifiers.is_static => Some(self.receiver(target).ok_or_else(
                || InjectError::DowncastFailed {
                    required: field.declaring.to_string(),
                    actual: "receiver".to_string(),
                },
            )?),
            _ => None,
        };
        getter(receiver).map_err(|e| InjectError::callback(field.qualified_name(), e))
    }
}

/// A class with its hierarchy resolved and its annotations indexed
#[derive(Debug)]
pub struct EnhancedAnnotatedType {
    pub annotated: Arc<AnnotatedType>,
    /// Outermost superclass first, this class last
    pub hierarchy: Vec<Arc<AnnotatedType>>,
    /// Every type instances of this class can be assigned to, sorted
    pub type_closure: Vec<Type>,
    /// Visible methods, overridden methods removed, outermost declaring class first
    pub methods: Vec<EnhancedMethod>,
    /// All fields, outermost declaring class first
    pub fields: Vec<EnhancedField>,
    pub constructors: Vec<Arc<AnnotatedConstructor>>,
    pub qualifiers: Vec<Annotation>,
    pub scopes: Vec<Annotation>,
    pub stereotypes: Vec<Annotation>,
    pub interceptor_bindings: Vec<Annotation>,
    /// The class is extended through a proxy indirection
    pub proxyable: bool,
}

impl EnhancedAnnotatedType {
    /// Builds the view from an already resolved hierarchy (outermost first)
    pub(crate) fn new(
        hierarchy: Vec<Arc<AnnotatedType>>,
        type_closure: Vec<Type>,
        store: &MetaAnnotationStore,
    ) -> Self {
        let annotated = hierarchy
            .last()
            .cloned()
            .expect("hierarchy contains at least the class itself");

        // Projections between neighbours, from the leaf upwards
        let links = hierarchy
            .iter()
            .map(|ty| ty.superclass.as_ref().and_then(|s| s.projection.clone()))
            .collect::<Vec<_>>();
        let path_to = |depth: usize| -> Vec<Projection> {
            // links[i] projects hierarchy[i] onto hierarchy[i - 1]
            (depth + 1..hierarchy.len())
                .rev()
                .filter_map(|i| links[i].clone())
                .collect()
        };

        let mut methods: Vec<EnhancedMethod> = Vec::new();
        let mut overridable: HashMap<String, usize> = HashMap::new();
        let mut fields = Vec::new();
        for (depth, class) in hierarchy.iter().enumerate() {
            for method in &class.methods {
                let enhanced = Inherited {
                    member: method.clone(),
                    depth,
                    path: path_to(depth),
                };
                if method.modifiers.is_private || method.modifiers.is_static {
                    methods.push(enhanced);
                    continue;
                }
                let signature = method.signature();
                if let Some(previous) = overridable.remove(&signature) {
                    methods.remove(previous);
                    for index in overridable.values_mut() {
                        if *index > previous {
                            *index -= 1;
                        }
                    }
                }
                overridable.insert(signature, methods.len());
                methods.push(enhanced);
            }
            for field in &class.fields {
                fields.push(Inherited {
                    member: field.clone(),
                    depth,
                    path: path_to(depth),
                });
            }
        }

        let by_meta = |predicate: &dyn Fn(&str) -> bool| {
            annotated
                .annotations
                .iter()
                .filter(|a| predicate(&a.annotation_type))
                .cloned()
                .collect::<Vec<_>>()
        };
        let qualifiers = by_meta(&|name| store.is_qualifier(name));
        let scopes = by_meta(&|name| store.is_scope(name));
        let stereotypes = by_meta(&|name| store.is_stereotype(name));
        let interceptor_bindings = by_meta(&|name| store.is_interceptor_binding(name));

        // Only final classes and non private final methods prevent proxying
        let proxyable = !annotated.modifiers.is_final
            && !methods.iter().any(|m| {
                m.member.modifiers.is_final
                    && !m.member.modifiers.is_private
                    && !m.member.modifiers.is_static
            });

        Self {
            constructors: annotated.constructors.clone(),
            annotated,
            hierarchy,
            type_closure,
            methods,
            fields,
            qualifiers,
            scopes,
            stereotypes,
            interceptor_bindings,
            proxyable,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.annotated.name
    }

    pub fn methods_annotated<'a>(
        &'a self,
        annotation_type: &'a str,
    ) -> impl Iterator<Item = &'a EnhancedMethod> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.member.is_annotated(annotation_type))
    }

    /// Methods with at least one parameter carrying the annotation
    pub fn methods_with_parameter_annotated<'a>(
        &'a self,
        annotation_type: &'a str,
    ) -> impl Iterator<Item = &'a EnhancedMethod> + 'a {
        self.methods.iter().filter(move |m| {
            m.member
                .parameters
                .iter()
                .any(|p| p.annotations.contains(annotation_type))
        })
    }

    pub fn fields_annotated<'a>(
        &'a self,
        annotation_type: &'a str,
    ) -> impl Iterator<Item = &'a EnhancedField> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.member.annotations.contains(annotation_type))
    }

    /// The most specific method with the given name
    pub fn method(&self, name: &str) -> Option<&EnhancedMethod> {
        self.methods
            .iter()
            .rev()
            .find(|m| &*m.member.name == name && !m.member.modifiers.is_static)
    }

    /// Constructor annotated @Inject, or the no-argument constructor
    pub fn injectable_constructors(&self) -> Vec<&Arc<AnnotatedConstructor>> {
        let inject = self
            .constructors
            .iter()
            .filter(|c| c.annotations.contains(builtin::INJECT))
            .collect::<Vec<_>>();
        if !inject.is_empty() {
            return inject;
        }
        self.constructors
            .iter()
            .filter(|c| c.parameters.is_empty())
            .collect()
    }

    /// The class this one directly extends, if it is known
    pub fn direct_superclass(&self) -> Option<&Arc<AnnotatedType>> {
        let len = self.hierarchy.len();
        (len >= 2).then(|| &self.hierarchy[len - 2])
    }

    pub fn is_annotated(&self, annotation_type: &str) -> bool {
        self.annotated.is_annotated(annotation_type)
    }
}
