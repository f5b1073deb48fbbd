use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use dashmap::DashMap;

use crate::{
    errors::DefinitionError,
    metadata::{
        annotated::MethodBody,
        builtin,
        enhanced::{EnhancedAnnotatedType, EnhancedMethod},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterceptionType {
    AroundConstruct,
    PostConstruct,
    AroundInvoke,
    PreDestroy,
}

impl InterceptionType {
    pub const ALL: [InterceptionType; 4] = [
        InterceptionType::AroundConstruct,
        InterceptionType::PostConstruct,
        InterceptionType::AroundInvoke,
        InterceptionType::PreDestroy,
    ];

    pub fn annotation(&self) -> &'static str {
        match self {
            InterceptionType::AroundConstruct => builtin::AROUND_CONSTRUCT,
            InterceptionType::PostConstruct => builtin::POST_CONSTRUCT,
            InterceptionType::AroundInvoke => builtin::AROUND_INVOKE,
            InterceptionType::PreDestroy => builtin::PRE_DESTROY,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            InterceptionType::PostConstruct | InterceptionType::PreDestroy
        )
    }
}

impl Display for InterceptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.annotation())
    }
}

/// The interception methods a class declares, per [InterceptionType]
///
/// Methods are ordered outermost superclass first, one per class at most.
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    pub class: Arc<str>,
    methods: BTreeMap<InterceptionType, Vec<EnhancedMethod>>,
}

impl ClassMetadata {
    pub fn methods(&self, interception: InterceptionType) -> &[EnhancedMethod] {
        self.methods
            .get(&interception)
            .map(|m| m.as_slice())
            .unwrap_or_default()
    }

    pub fn declares(&self, interception: InterceptionType) -> bool {
        !self.methods(interception).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.values().all(|m| m.is_empty())
    }

    /// The callbacks of an interceptor instance itself
    ///
    /// Methods receiving an invocation context intercept other components and are left out.
    pub fn own_callbacks(&self) -> ClassMetadata {
        let methods = self
            .methods
            .iter()
            .map(|(interception, methods)| {
                let own = methods
                    .iter()
                    .filter(|m| !matches!(m.member.body, MethodBody::Intercept(_)))
                    .cloned()
                    .collect::<Vec<_>>();
                (*interception, own)
            })
            .filter(|(_, own)| !own.is_empty())
            .collect();
        ClassMetadata {
            class: self.class.clone(),
            methods,
        }
    }
}

/// Reads and caches [ClassMetadata] per class
#[derive(Default)]
pub struct InterceptorMetadataReader {
    cache: DashMap<Arc<str>, Arc<ClassMetadata>>,
}

impl InterceptorMetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_metadata(
        &self,
        class: &EnhancedAnnotatedType,
    ) -> Result<Arc<ClassMetadata>, DefinitionError> {
        if let Some(cached) = self.cache.get(class.name()) {
            return Ok(cached.clone());
        }

        let mut methods: BTreeMap<InterceptionType, Vec<EnhancedMethod>> = BTreeMap::new();
        for interception in InterceptionType::ALL {
            let mut found: Vec<EnhancedMethod> = Vec::new();
            for method in class.methods_annotated(interception.annotation()) {
                if matches!(method.member.body, MethodBody::Initialize(_)) {
                    return Err(DefinitionError::InvalidMember {
                        member: method.member.qualified_name(),
                        reason: format!("{interception} methods cannot be initializers"),
                    });
                }
                if found.iter().any(|f| f.depth == method.depth) {
                    return Err(DefinitionError::DuplicateInterceptorMethod {
                        class: method.member.declaring.to_string(),
                        interception: interception.to_string(),
                    });
                }
                found.push(method.clone());
            }
            found.sort_by_key(|m| m.depth);
            if !found.is_empty() {
                methods.insert(interception, found);
            }
        }

        let metadata = Arc::new(ClassMetadata {
            class: class.name().clone(),
            methods,
        });
        self.cache.insert(class.name().clone(), metadata.clone());
        Ok(metadata)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            annotated::{AnnotatedType, Method, MethodBody},
            reflection::Type,
            store::MetaAnnotationStore,
            transformer::ClassTransformer,
        },
    };

    #[derive(Default)]
    struct Base;
    #[derive(Default)]
    struct Leaf {
        base: Base,
    }

    fn transformer() -> ClassTransformer {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        transformer.register(
            AnnotatedType::builder::<Base>("Base")
                .constructor(Base::default)
                .post_construct("base_init", |_: &Base| Ok(()))
                .build(),
        );
        transformer
    }

    #[test]
    fn lifecycle_methods_run_outermost_first() {
        let transformer = transformer();
        let leaf = transformer.register(
            AnnotatedType::builder::<Leaf>("Leaf")
                .extends_with(Type::class("Base"), |l: &Leaf| &l.base, |l: &mut Leaf| &mut l.base)
                .constructor(Leaf::default)
                .post_construct("leaf_init", |_: &Leaf| Ok(()))
                .build(),
        );
        let enhanced = transformer.enhance(&leaf).unwrap();

        let reader = InterceptorMetadataReader::new();
        let metadata = reader.class_metadata(&enhanced).unwrap();
        let names = metadata
            .methods(InterceptionType::PostConstruct)
            .iter()
            .map(|m| m.member.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["base_init", "leaf_init"]);
        assert!(!metadata.declares(InterceptionType::AroundInvoke));
    }

    #[test]
    fn own_callbacks_leave_out_invocation_context_methods() {
        let transformer = transformer();
        let leaf = transformer.register(
            AnnotatedType::builder::<Leaf>("Audit")
                .extends_with(Type::class("Base"), |l: &Leaf| &l.base, |l: &mut Leaf| &mut l.base)
                .constructor(Leaf::default)
                .interceptor_method("audit", builtin::POST_CONSTRUCT, |_: &Leaf, ctx| ctx.proceed())
                .build(),
        );
        let enhanced = transformer.enhance(&leaf).unwrap();
        let metadata = InterceptorMetadataReader::new().class_metadata(&enhanced).unwrap();
        assert_eq!(metadata.methods(InterceptionType::PostConstruct).len(), 2);

        let own = metadata.own_callbacks();
        let names = own
            .methods(InterceptionType::PostConstruct)
            .iter()
            .map(|m| m.member.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["base_init"]);
    }

    #[test]
    fn two_callbacks_on_one_class_are_rejected() {
        let transformer = transformer();
        let ty = transformer.register(
            AnnotatedType::builder::<Base>("Twice")
                .constructor(Base::default)
                .method(
                    Method::new("a")
                        .marked(builtin::PRE_DESTROY)
                        .body(MethodBody::function(|_| Ok(None))),
                )
                .method(
                    Method::new("b")
                        .marked(builtin::PRE_DESTROY)
                        .body(MethodBody::function(|_| Ok(None))),
                )
                .build(),
        );
        let enhanced = transformer.enhance(&ty).unwrap();
        assert!(matches!(
            InterceptorMetadataReader::new().class_metadata(&enhanced),
            Err(DefinitionError::DuplicateInterceptorMethod { .. })
        ));
    }
}
