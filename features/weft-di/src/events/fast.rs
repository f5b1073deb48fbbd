//! Decides which extensions observe a class's [ProcessAnnotatedType] from class level
//! metadata, so that classes nobody observes never have to be fully loaded
//!
//! [ProcessAnnotatedType]: crate::events::lifecycle::ProcessAnnotatedType

use std::{collections::HashSet, sync::Arc};

use crate::{
    bootstrap::services::ResourceLoader,
    errors::UnsupportedObserverMethod,
    events::extension::{Extension, TypeFilter},
    metadata::{
        annotated::ClassInfo, builtin, enhanced::EnhancedAnnotatedType, store::MetaAnnotationStore,
    },
};

pub struct FastProcessAnnotatedTypeResolver {
    extensions: Vec<(Arc<dyn Extension>, TypeFilter)>,
    loader: Arc<dyn ResourceLoader>,
    store: Arc<MetaAnnotationStore>,
}

impl FastProcessAnnotatedTypeResolver {
    pub fn new(
        extensions: &[Arc<dyn Extension>],
        loader: Arc<dyn ResourceLoader>,
        store: Arc<MetaAnnotationStore>,
    ) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| (e.clone(), e.annotated_type_filter()))
                .collect(),
            loader,
            store,
        }
    }

    /// Nobody observes any class, discovery can skip the event altogether
    pub fn is_empty(&self) -> bool {
        self.extensions
            .iter()
            .all(|(_, filter)| *filter == TypeFilter::Nothing)
    }

    /// The extensions observing the class, in registration order
    ///
    /// Fails when the metadata does not suffice to decide, the caller then falls back to
    /// [FastProcessAnnotatedTypeResolver::resolve_loaded].
    pub fn resolve(
        &self,
        class: &ClassInfo,
    ) -> Result<Vec<Arc<dyn Extension>>, UnsupportedObserverMethod> {
        let mut observing = Vec::new();
        for (extension, filter) in &self.extensions {
            let observes = match filter {
                TypeFilter::All => true,
                TypeFilter::Nothing => false,
                TypeFilter::Annotated(annotations) => {
                    self.is_annotated(extension, class, annotations)?
                }
                TypeFilter::Assignable(target) => self.is_assignable(extension, class, target)?,
            };
            if observes {
                observing.push(extension.clone());
            }
        }
        Ok(observing)
    }

    /// Slow path over the fully loaded class
    pub fn resolve_loaded(&self, class: &EnhancedAnnotatedType) -> Vec<Arc<dyn Extension>> {
        self.extensions
            .iter()
            .filter(|(_, filter)| match filter {
                TypeFilter::All => true,
                TypeFilter::Nothing => false,
                TypeFilter::Annotated(annotations) => {
                    annotations.iter().any(|a| class.is_annotated(a))
                }
                TypeFilter::Assignable(target) => class
                    .type_closure
                    .iter()
                    .any(|t| t.raw_name().is_some_and(|raw| raw == target)),
            })
            .map(|(extension, _)| extension.clone())
            .collect()
    }

    fn is_annotated(
        &self,
        extension: &Arc<dyn Extension>,
        class: &ClassInfo,
        annotations: &[Arc<str>],
    ) -> Result<bool, UnsupportedObserverMethod> {
        if class.annotations.iter().any(|a| annotations.contains(a)) {
            return Ok(true);
        }
        // Stereotypes may carry the annotation, which only the full model knows
        if class.annotations.iter().any(|a| self.store.is_stereotype(a)) {
            return Err(unsupported(extension, class));
        }
        Ok(false)
    }

    fn is_assignable(
        &self,
        extension: &Arc<dyn Extension>,
        class: &ClassInfo,
        target: &Arc<str>,
    ) -> Result<bool, UnsupportedObserverMethod> {
        if **target == *builtin::OBJECT {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut pending = vec![class.clone()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.name.clone()) {
                continue;
            }
            if current.name == *target || current.interfaces.contains(target) {
                return Ok(true);
            }
            let supertypes = current
                .superclass
                .iter()
                .filter(|s| ***s != *builtin::OBJECT)
                .chain(current.interfaces.iter());
            for supertype in supertypes {
                match self.loader.class_info(supertype) {
                    Some(info) => pending.push(info),
                    None => return Err(unsupported(extension, class)),
                }
            }
        }
        Ok(false)
    }
}

fn unsupported(extension: &Arc<dyn Extension>, class: &ClassInfo) -> UnsupportedObserverMethod {
    UnsupportedObserverMethod {
        observer: extension.name().to_string(),
        class: class.name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bootstrap::services::StaticResourceLoader,
        metadata::{annotated::AnnotatedType, reflection::Type},
    };

    struct Filtered(TypeFilter);
    impl Extension for Filtered {
        fn name(&self) -> &str {
            "filtered"
        }

        fn annotated_type_filter(&self) -> TypeFilter {
            self.0.clone()
        }
    }

    fn resolver(filter: TypeFilter, loader: StaticResourceLoader) -> FastProcessAnnotatedTypeResolver {
        let extension: Arc<dyn Extension> = Arc::new(Filtered(filter));
        FastProcessAnnotatedTypeResolver::new(
            &[extension],
            Arc::new(loader),
            Arc::new(MetaAnnotationStore::new()),
        )
    }

    #[test]
    fn assignability_walks_loadable_supertypes() {
        let loader = StaticResourceLoader::new();
        loader.add_class(
            AnnotatedType::declare("Base")
                .implements(Type::class("Service"))
                .build(),
        );
        let resolver = resolver(TypeFilter::Assignable(Arc::from("Service")), loader);

        let derived = AnnotatedType::declare("Derived")
            .extends(Type::class("Base"))
            .build()
            .class_info();
        assert_eq!(resolver.resolve(&derived).unwrap().len(), 1);

        let unrelated = AnnotatedType::declare("Unrelated").build().class_info();
        assert!(resolver.resolve(&unrelated).unwrap().is_empty());
    }

    #[test]
    fn unknown_superclasses_need_the_slow_path() {
        let resolver = resolver(
            TypeFilter::Assignable(Arc::from("Service")),
            StaticResourceLoader::new(),
        );
        let orphan = AnnotatedType::declare("Orphan")
            .extends(Type::class("Missing"))
            .build()
            .class_info();

        let Err(error) = resolver.resolve(&orphan) else {
            panic!("an unknown superclass cannot be decided from metadata")
        };
        assert_eq!(error.class, "Orphan");
    }

    #[test]
    fn annotation_filters_match_direct_annotations() {
        let resolver = resolver(
            TypeFilter::Annotated(vec![Arc::from("Marked")]),
            StaticResourceLoader::new(),
        );
        let marked = AnnotatedType::declare("Foo").marked("Marked").build().class_info();
        let plain = AnnotatedType::declare("Bar").build().class_info();

        assert_eq!(resolver.resolve(&marked).unwrap().len(), 1);
        assert!(resolver.resolve(&plain).unwrap().is_empty());
    }
}
