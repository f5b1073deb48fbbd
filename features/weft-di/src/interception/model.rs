use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    component::{Component, ComponentRole},
    errors::DefinitionError,
    interception::metadata::{ClassMetadata, InterceptionType, InterceptorMetadataReader},
    metadata::{
        annotated::MethodBody, annotation::Annotation, enhanced::EnhancedAnnotatedType,
        store::MetaAnnotationStore,
    },
    resolution::qualifiers::QualifierInstance,
};

/// Which interceptors apply to a class and to each of its business methods
#[derive(Debug)]
pub struct InterceptionModel {
    pub class: Arc<str>,
    /// Interception methods the class itself declares
    pub target: Arc<ClassMetadata>,
    /// Every distinct interceptor, in enablement order
    interceptors: Vec<Arc<Component>>,
    class_level: Vec<Arc<Component>>,
    /// Methods with their own bindings
    methods: HashMap<Arc<str>, Vec<Arc<Component>>>,
}

impl InterceptionModel {
    pub fn interceptors(&self) -> &[Arc<Component>] {
        &self.interceptors
    }

    /// Interceptors for constructor and lifecycle callbacks
    pub fn class_level(&self, interception: InterceptionType) -> Vec<Arc<Component>> {
        filter_declaring(&self.class_level, interception)
    }

    pub fn around_invoke(&self, method: &str) -> Vec<Arc<Component>> {
        let bound = self.methods.get(method).unwrap_or(&self.class_level);
        filter_declaring(bound, InterceptionType::AroundInvoke)
    }

    /// Business method calls need to go through a handler
    pub fn intercepts_invocations(&self) -> bool {
        self.target.declares(InterceptionType::AroundInvoke)
            || self
                .interceptors
                .iter()
                .any(|i| declares(i, InterceptionType::AroundInvoke))
    }

    pub fn has_interceptors(&self) -> bool {
        !self.interceptors.is_empty()
    }
}

fn declares(interceptor: &Component, interception: InterceptionType) -> bool {
    match &interceptor.role {
        ComponentRole::Interceptor(info) => info.metadata.declares(interception),
        _ => false,
    }
}

fn filter_declaring(
    interceptors: &[Arc<Component>],
    interception: InterceptionType,
) -> Vec<Arc<Component>> {
    interceptors
        .iter()
        .filter(|i| declares(i, interception))
        .cloned()
        .collect()
}

/// Builds [InterceptionModel]s against the enabled interceptors of an archive
pub struct InterceptionModelBuilder<'a> {
    store: &'a MetaAnnotationStore,
    reader: &'a InterceptorMetadataReader,
    /// Enabled interceptors, in enablement order
    enabled: &'a [Arc<Component>],
}

impl<'a> InterceptionModelBuilder<'a> {
    pub fn new(
        store: &'a MetaAnnotationStore,
        reader: &'a InterceptorMetadataReader,
        enabled: &'a [Arc<Component>],
    ) -> Self {
        Self {
            store,
            reader,
            enabled,
        }
    }

    pub fn build(&self, class: &EnhancedAnnotatedType) -> Result<InterceptionModel, DefinitionError> {
        let target = self.reader.class_metadata(class)?;

        let mut class_bindings = BTreeSet::new();
        for binding in &class.interceptor_bindings {
            class_bindings.extend(self.store.binding_closure(binding));
        }
        for stereotype in &class.stereotypes {
            let model = self.store.model(&stereotype.annotation_type);
            for binding in model.stereotype.iter().flat_map(|s| &s.interceptor_bindings) {
                class_bindings.extend(self.store.binding_closure(binding));
            }
        }

        let class_level = self.matching(&class_bindings);
        let mut used: Vec<Arc<Component>> = class_level.clone();

        let mut methods = HashMap::new();
        for method in &class.methods {
            let member = &method.member;
            if member.modifiers.is_static
                || member.modifiers.is_private
                || !matches!(member.body, MethodBody::Invoke(_))
            {
                continue;
            }
            let own = self.bindings(member.annotations.iter());
            if own.is_empty() {
                continue;
            }
            let mut bindings = class_bindings.clone();
            bindings.extend(own);
            let bound = self.matching(&bindings);
            for interceptor in &bound {
                if !used.iter().any(|u| u.id == interceptor.id) {
                    used.push(interceptor.clone());
                }
            }
            methods.insert(member.name.clone(), bound);
        }

        // Keep enablement order
        let interceptors = self
            .enabled
            .iter()
            .filter(|e| used.iter().any(|u| u.id == e.id))
            .cloned()
            .collect();

        Ok(InterceptionModel {
            class: class.name().clone(),
            target,
            interceptors,
            class_level,
            methods,
        })
    }

    fn bindings<'b>(&self, annotations: impl Iterator<Item = &'b Annotation>) -> BTreeSet<QualifierInstance> {
        annotations
            .filter(|a| self.store.is_interceptor_binding(&a.annotation_type))
            .flat_map(|a| self.store.binding_closure(a))
            .collect()
    }

    fn matching(&self, bindings: &BTreeSet<QualifierInstance>) -> Vec<Arc<Component>> {
        if bindings.is_empty() {
            return Vec::new();
        }
        self.enabled
            .iter()
            .filter(|interceptor| match &interceptor.role {
                ComponentRole::Interceptor(info) => {
                    !info.bindings.is_empty() && info.bindings.iter().all(|b| bindings.contains(b))
                }
                _ => false,
            })
            .cloned()
            .collect()
    }
}
