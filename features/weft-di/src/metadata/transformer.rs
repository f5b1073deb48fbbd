use std::{
    any::TypeId,
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    bootstrap::services::ResourceLoader,
    errors::{DefinitionError, ResourceLoadingError},
    metadata::{
        annotated::AnnotatedType,
        enhanced::EnhancedAnnotatedType,
        reflection::{Type, TypeHierarchy},
        store::MetaAnnotationStore,
    },
};

/// Materializes classes and caches derived metadata
///
/// Loaded classes stay for the lifetime of the container. Enhanced views and type
/// closures are per bootstrap and dropped with [ClassTransformer::clear].
pub struct ClassTransformer {
    store: Arc<MetaAnnotationStore>,
    loader: RwLock<Option<Arc<dyn ResourceLoader>>>,
    types: DashMap<Arc<str>, Arc<AnnotatedType>>,
    by_type_id: DashMap<TypeId, Arc<str>>,
    enhanced: DashMap<Arc<str>, Arc<EnhancedAnnotatedType>>,
    closures: DashMap<Type, Arc<[Type]>>,
}

impl ClassTransformer {
    pub fn new(store: Arc<MetaAnnotationStore>) -> Self {
        Self {
            store,
            loader: RwLock::new(None),
            types: DashMap::new(),
            by_type_id: DashMap::new(),
            enhanced: DashMap::new(),
            closures: DashMap::new(),
        }
    }

    /// Classes not registered up front are loaded through `loader`
    pub fn set_loader(&self, loader: Arc<dyn ResourceLoader>) {
        *self.loader.write() = Some(loader);
    }

    pub fn store(&self) -> &Arc<MetaAnnotationStore> {
        &self.store
    }

    /// Registers or replaces a class
    pub fn register(&self, ty: AnnotatedType) -> Arc<AnnotatedType> {
        let ty = Arc::new(ty);
        if let Some(info) = ty.rust_type {
            self.by_type_id.insert(info.type_id, ty.name.clone());
        }
        if self.types.insert(ty.name.clone(), ty.clone()).is_some() {
            // Subclasses embed the replaced class, so all derived views may be stale
            self.enhanced.clear();
            self.closures.clear();
        }
        ty
    }

    /// A class which was already loaded or registered
    pub fn get(&self, name: &str) -> Option<Arc<AnnotatedType>> {
        self.types.get(name).map(|t| t.value().clone())
    }

    /// Returns the class, asking the resource loader if it is not known yet
    pub fn load(&self, name: &str) -> Result<Arc<AnnotatedType>, ResourceLoadingError> {
        if let Some(ty) = self.get(name) {
            tracing::trace!("Class {name} already loaded");
            return Ok(ty);
        }

        let loader = self.loader.read().clone();
        let Some(loader) = loader else {
            return Err(ResourceLoadingError::ClassNotFound {
                name: name.to_string(),
            });
        };

        let ty = loader.load_class(name)?;
        Ok(self.register(ty))
    }

    /// Name of the class a Rust type implements
    pub fn name_of(&self, type_id: TypeId) -> Option<Arc<str>> {
        self.by_type_id.get(&type_id).map(|n| n.value().clone())
    }

    /// Serializability of the class implemented by a Rust type
    pub fn is_serializable(&self, type_id: TypeId) -> Option<bool> {
        let name = self.name_of(type_id)?;
        self.is_serializable_class(&name)
    }

    pub fn is_serializable_class(&self, name: &str) -> Option<bool> {
        self.get(name).map(|t| t.modifiers.serializable)
    }

    /// The enhanced view of a class - cached as long as the same class is registered
    pub fn enhance(
        &self,
        ty: &Arc<AnnotatedType>,
    ) -> Result<Arc<EnhancedAnnotatedType>, DefinitionError> {
        if let Some(cached) = self.enhanced.get(&ty.name) {
            if Arc::ptr_eq(&cached.annotated, ty) {
                return Ok(cached.clone());
            }
        }

        let mut hierarchy = vec![ty.clone()];
        let mut seen = HashSet::from([ty.name.clone()]);
        let mut current = ty.clone();
        while let Some(superclass) = current.superclass.as_ref().and_then(|s| s.ty.raw_name()) {
            if !seen.insert(superclass.clone()) {
                return Err(DefinitionError::InvalidMember {
                    member: ty.name.to_string(),
                    reason: format!("cyclic class hierarchy through '{superclass}'"),
                });
            }
            let Ok(next) = self.load(superclass) else {
                tracing::debug!("Superclass {superclass} of {} is not known", ty.name);
                break;
            };
            hierarchy.push(next.clone());
            current = next;
        }
        hierarchy.reverse();

        let closure = self.closure(&ty.as_type());
        let enhanced = Arc::new(EnhancedAnnotatedType::new(hierarchy, closure, &self.store));
        self.enhanced.insert(ty.name.clone(), enhanced.clone());
        Ok(enhanced)
    }

    /// Loads and enhances a class by name
    pub fn enhance_by_name(&self, name: &str) -> Result<Arc<EnhancedAnnotatedType>, DefinitionError> {
        let ty = self.load(name).map_err(|e| DefinitionError::InvalidMember {
            member: name.to_string(),
            reason: e.to_string(),
        })?;
        self.enhance(&ty)
    }

    /// Drops the per bootstrap caches
    pub fn clear(&self) {
        tracing::debug!(
            "Clearing {} enhanced types and {} type closures",
            self.enhanced.len(),
            self.closures.len()
        );
        self.enhanced.clear();
        self.closures.clear();
    }

    fn compute_closure(&self, ty: &Type, seen: &mut HashSet<Type>, out: &mut BTreeSet<Type>) {
        if !seen.insert(ty.clone()) {
            return;
        }
        match ty {
            Type::Class(_) | Type::Parameterized { .. } => {
                out.insert(ty.clone());
                let Some(class) = ty.raw_name().and_then(|name| self.load(name).ok()) else {
                    return;
                };

                let bindings = class
                    .type_parameters
                    .iter()
                    .zip(ty.args())
                    .filter_map(|(param, arg)| match param {
                        Type::Variable { name, .. } => Some((name.clone(), arg.clone())),
                        _ => None,
                    })
                    .collect::<HashMap<_, _>>();

                let supertypes = class
                    .superclass
                    .iter()
                    .map(|s| &s.ty)
                    .chain(class.interfaces.iter());
                for supertype in supertypes {
                    self.compute_closure(&supertype.substitute(&bindings), seen, out);
                }
            }
            Type::Variable { bounds, .. } | Type::Wildcard { upper: bounds, .. } => {
                out.insert(ty.clone());
                for bound in bounds {
                    self.compute_closure(bound, seen, out);
                }
            }
        }
    }
}

impl TypeHierarchy for ClassTransformer {
    fn closure(&self, ty: &Type) -> Vec<Type> {
        if let Some(cached) = self.closures.get(ty) {
            return cached.to_vec();
        }

        let mut out = BTreeSet::new();
        self.compute_closure(ty, &mut HashSet::new(), &mut out);
        out.insert(Type::object());

        let closure: Arc<[Type]> = out.into_iter().collect();
        self.closures.insert(ty.clone(), closure.clone());
        closure.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        annotated::{Method, Param},
        annotation::Annotation,
        builtin,
    };

    struct Thing;

    fn transformer() -> ClassTransformer {
        let transformer = ClassTransformer::new(Arc::new(MetaAnnotationStore::new()));
        transformer.register(
            AnnotatedType::declare("Collection")
                .type_parameter(Type::variable("E"))
                .make_interface()
                .build(),
        );
        transformer.register(
            AnnotatedType::declare("List")
                .type_parameter(Type::variable("E"))
                .implements(Type::parameterized("Collection", vec![Type::variable("E")]))
                .make_interface()
                .build(),
        );
        transformer
    }

    #[test]
    fn closure_substitutes_type_arguments() {
        let transformer = transformer();
        let closure = transformer.closure(&Type::parameterized("List", vec![Type::class("String")]));

        assert!(closure.contains(&Type::parameterized("Collection", vec![Type::class("String")])));
        assert!(closure.contains(&Type::parameterized("List", vec![Type::class("String")])));
        assert!(closure.contains(&Type::object()));
    }

    #[test]
    fn enhance_resolves_hierarchy_and_overrides() {
        let transformer = transformer();
        transformer.register(
            AnnotatedType::declare("Base")
                .method(Method::new("ping"))
                .build(),
        );
        let leaf = transformer.register(
            AnnotatedType::builder::<Thing>("Leaf")
                .extends(Type::class("Base"))
                .marked(builtin::SINGLETON)
                .annotate(Annotation::named("leaf"))
                .constructor(|| Thing)
                .business("ping", |_: &Thing, _| Ok(None))
                .build(),
        );

        let enhanced = transformer.enhance(&leaf).unwrap();
        assert_eq!(enhanced.hierarchy.len(), 2);
        assert_eq!(enhanced.methods.len(), 1, "Base.ping is overridden");
        assert_eq!(&*enhanced.methods[0].member.declaring, "Leaf");
        assert!(enhanced.type_closure.contains(&Type::class("Base")));
        assert_eq!(enhanced.scopes.len(), 1);
        assert_eq!(enhanced.qualifiers.len(), 1);
        assert!(enhanced.proxyable);

        // Cached until the class is replaced
        assert!(Arc::ptr_eq(&enhanced, &transformer.enhance(&leaf).unwrap()));
    }

    #[test]
    fn classes_with_only_injecting_constructors_are_proxyable() {
        let transformer = transformer();
        let injected = transformer.register(
            AnnotatedType::builder::<Thing>("Injected")
                .inject_constructor(vec![Param::class("Dep")], |_| Ok(Thing))
                .build(),
        );
        assert!(transformer.enhance(&injected).unwrap().proxyable);

        let sealed = transformer.register(
            AnnotatedType::builder::<Thing>("Sealed")
                .make_final()
                .inject_constructor(vec![Param::class("Dep")], |_| Ok(Thing))
                .build(),
        );
        assert!(!transformer.enhance(&sealed).unwrap().proxyable);
    }

    #[test]
    fn rust_types_map_to_class_names() {
        let transformer = transformer();
        transformer.register(
            AnnotatedType::builder::<Thing>("Thing")
                .serializable()
                .build(),
        );
        assert_eq!(transformer.name_of(TypeId::of::<Thing>()).as_deref(), Some("Thing"));
        assert_eq!(transformer.is_serializable(TypeId::of::<Thing>()), Some(true));
    }

    #[test]
    fn unknown_classes_fail_to_load_without_a_loader() {
        let transformer = transformer();
        assert!(matches!(
            transformer.load("Missing"),
            Err(ResourceLoadingError::ClassNotFound { .. })
        ));
    }
}
