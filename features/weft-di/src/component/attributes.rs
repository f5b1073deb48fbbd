use std::{collections::BTreeSet, sync::Arc};

use crate::{
    errors::DefinitionError,
    metadata::{
        annotation::{AnnotationSet, AnnotationValue},
        builtin::{self, members},
        reflection::{Type, TypeHierarchy},
        store::MetaAnnotationStore,
    },
    resolution::qualifiers::{normalize_component_qualifiers, QualifierInstance, QualifierSet},
};

/// What resolution needs to know about a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentAttributes {
    /// Always contains `Object`
    pub types: BTreeSet<Type>,
    pub qualifiers: QualifierSet,
    pub scope: Arc<str>,
    pub name: Option<Arc<str>>,
    /// Declared stereotypes and the ones they inherit
    pub stereotypes: BTreeSet<Arc<str>>,
    pub alternative: bool,
    pub priority: Option<i64>,
}

impl ComponentAttributes {
    /// Attributes of components the container declares itself
    pub fn built_in(types: impl IntoIterator<Item = Type>, scope: &str) -> Self {
        let mut types: BTreeSet<Type> = types.into_iter().collect();
        types.insert(Type::object());
        Self {
            types,
            qualifiers: normalize_component_qualifiers(QualifierSet::new()),
            scope: Arc::from(scope),
            name: None,
            stereotypes: BTreeSet::new(),
            alternative: false,
            priority: None,
        }
    }

    pub fn is_dependent(&self) -> bool {
        &*self.scope == builtin::DEPENDENT
    }
}

/// Where the attributes are read from
pub struct AttributeSource<'a> {
    /// Describes the member in errors
    pub member: String,
    pub annotations: &'a AnnotationSet,
    /// The class type for managed components, the declared type for producers
    pub base_type: Type,
    /// Used for `@Named` without a value
    pub default_name: String,
}

/// Reads the attributes a class or producer member declares
pub fn read_attributes(
    store: &MetaAnnotationStore,
    hierarchy: &dyn TypeHierarchy,
    source: AttributeSource<'_>,
) -> Result<ComponentAttributes, DefinitionError> {
    let annotations = source.annotations;

    // Stereotypes, transitively
    let mut stereotypes = BTreeSet::new();
    let mut stereotype_scopes = BTreeSet::new();
    let mut alternative = annotations.contains(builtin::ALTERNATIVE);
    let mut stereotype_named = false;
    let mut priority = None;
    for annotation in annotations
        .iter()
        .filter(|a| store.is_stereotype(&a.annotation_type))
    {
        let model = store.model(&annotation.annotation_type);
        let Some(stereotype) = &model.stereotype else {
            continue;
        };
        stereotypes.extend(stereotype.stereotypes.iter().cloned());
        stereotype_scopes.extend(stereotype.default_scopes.iter().cloned());
        alternative |= stereotype.alternative;
        stereotype_named |= stereotype.named;
        priority = priority.or(stereotype.priority);
    }
    if let Some(declared) = annotations
        .get(builtin::PRIORITY)
        .and_then(|p| p.value())
        .and_then(|v| v.as_int())
    {
        priority = Some(declared);
    }

    let scope = read_scope(store, &source.member, annotations, stereotype_scopes)?;

    // Qualifiers and name
    let mut declared: QualifierSet = annotations
        .iter()
        .filter(|a| store.is_qualifier(&a.annotation_type))
        .map(|a| store.qualifier_instance(a))
        .collect();
    let named = annotations.get(builtin::NAMED);
    let name = match named {
        Some(named) => {
            let value = named
                .value()
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .unwrap_or(&source.default_name);
            Some(Arc::from(value))
        }
        None if stereotype_named => Some(Arc::from(source.default_name.as_str())),
        None => None,
    };
    if let Some(name) = &name {
        declared.retain(|q| !q.is(builtin::NAMED));
        declared.insert(QualifierInstance::named(name));
    }
    let qualifiers = normalize_component_qualifiers(declared);

    let types = read_types(hierarchy, &source.member, annotations, &source.base_type)?;

    Ok(ComponentAttributes {
        types,
        qualifiers,
        scope,
        name,
        stereotypes,
        alternative,
        priority,
    })
}

fn read_scope(
    store: &MetaAnnotationStore,
    member: &str,
    annotations: &AnnotationSet,
    stereotype_scopes: BTreeSet<Arc<str>>,
) -> Result<Arc<str>, DefinitionError> {
    let declared = annotations
        .iter()
        .filter(|a| store.is_scope(&a.annotation_type))
        .map(|a| a.annotation_type.clone())
        .collect::<Vec<_>>();

    match declared.as_slice() {
        [scope] => return Ok(scope.clone()),
        [] => {}
        _ => {
            return Err(DefinitionError::ConflictingScopes {
                member: member.to_string(),
                scopes: scope_names(declared.iter()),
            })
        }
    }

    let stereotype_scopes = stereotype_scopes.into_iter().collect::<Vec<_>>();
    match stereotype_scopes.as_slice() {
        [] => Ok(Arc::from(builtin::DEPENDENT)),
        [scope] => Ok(scope.clone()),
        _ => Err(DefinitionError::ConflictingStereotypeScopes {
            member: member.to_string(),
            scopes: scope_names(stereotype_scopes.iter()),
        }),
    }
}

/// `@Typed` restricts the types to the listed classes, otherwise the full closure applies
fn read_types(
    hierarchy: &dyn TypeHierarchy,
    member: &str,
    annotations: &AnnotationSet,
    base_type: &Type,
) -> Result<BTreeSet<Type>, DefinitionError> {
    let closure = hierarchy.closure(base_type);
    let Some(typed) = annotations.get(builtin::TYPED) else {
        return Ok(closure.into_iter().collect());
    };

    let restricted = typed
        .member(members::VALUE)
        .and_then(|v| v.as_array())
        .unwrap_or_default();
    let mut types = BTreeSet::from([Type::object()]);
    for class in restricted {
        let AnnotationValue::Class(class) = class else {
            return Err(DefinitionError::InvalidAnnotation {
                annotation: builtin::TYPED.to_string(),
                reason: format!("{class} is not a class literal"),
            });
        };
        let Some(ty) = closure
            .iter()
            .find(|t| t.raw_name().is_some_and(|raw| raw == class))
        else {
            return Err(DefinitionError::InvalidMember {
                member: member.to_string(),
                reason: format!("@Typed names {class} which is not one of its types"),
            });
        };
        types.insert(ty.clone());
    }
    Ok(types)
}

/// Sorted so that the reported conflict does not depend on declaration order
fn scope_names<'a>(names: impl Iterator<Item = &'a Arc<str>>) -> Vec<String> {
    let mut names = names.map(|n| n.to_string()).collect::<Vec<_>>();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        annotation::{Annotation, AnnotationDefinition},
        reflection::FlatHierarchy,
    };

    fn read(store: &MetaAnnotationStore, annotations: &AnnotationSet) -> Result<ComponentAttributes, DefinitionError> {
        read_attributes(
            store,
            &FlatHierarchy,
            AttributeSource {
                member: "Foo".to_string(),
                annotations,
                base_type: Type::class("Foo"),
                default_name: "foo".to_string(),
            },
        )
    }

    #[test]
    fn defaults_to_dependent_with_default_qualifiers() {
        let store = MetaAnnotationStore::new();
        let attributes = read(&store, &AnnotationSet::new([])).unwrap();

        assert!(attributes.is_dependent());
        assert!(attributes.types.contains(&Type::object()));
        assert!(attributes.types.contains(&Type::class("Foo")));
        assert_eq!(
            attributes.qualifiers,
            QualifierSet::from([QualifierInstance::default_qualifier(), QualifierInstance::any()])
        );
        assert_eq!(attributes.name, None);
    }

    #[test]
    fn stereotype_contributes_scope_and_name() {
        let store = MetaAnnotationStore::new();
        store.register(
            AnnotationDefinition::stereotype("Model")
                .annotated(Annotation::marker(builtin::REQUEST_SCOPED))
                .annotated(Annotation::marker(builtin::NAMED)),
        );

        let attributes = read(&store, &AnnotationSet::new([Annotation::marker("Model")])).unwrap();
        assert_eq!(&*attributes.scope, builtin::REQUEST_SCOPED);
        assert_eq!(attributes.name.as_deref(), Some("foo"));
        assert!(attributes.qualifiers.contains(&QualifierInstance::named("foo")));
        assert!(attributes.stereotypes.contains("Model"));
    }

    #[test]
    fn two_scopes_conflict() {
        let store = MetaAnnotationStore::new();
        let annotations = AnnotationSet::new([
            Annotation::marker(builtin::REQUEST_SCOPED),
            Annotation::marker(builtin::APPLICATION_SCOPED),
        ]);
        let Err(DefinitionError::ConflictingScopes { member, scopes }) = read(&store, &annotations)
        else {
            panic!("two scopes must conflict")
        };
        assert_eq!(member, "Foo");
        let mut expected = vec![
            builtin::APPLICATION_SCOPED.to_string(),
            builtin::REQUEST_SCOPED.to_string(),
        ];
        expected.sort();
        assert_eq!(scopes, expected);
    }

    #[test]
    fn stereotypes_with_different_scopes_conflict() {
        let store = MetaAnnotationStore::new();
        store.register(
            AnnotationDefinition::stereotype("Model")
                .annotated(Annotation::marker(builtin::REQUEST_SCOPED)),
        );
        store.register(
            AnnotationDefinition::stereotype("Service")
                .annotated(Annotation::marker(builtin::APPLICATION_SCOPED)),
        );
        let annotations =
            AnnotationSet::new([Annotation::marker("Model"), Annotation::marker("Service")]);

        let Err(DefinitionError::ConflictingStereotypeScopes { scopes, .. }) =
            read(&store, &annotations)
        else {
            panic!("stereotype scopes must conflict")
        };
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains(&builtin::REQUEST_SCOPED.to_string()));
    }

    #[test]
    fn typed_restricts_types() {
        let store = MetaAnnotationStore::new();
        let annotations = AnnotationSet::new([Annotation::typed(&["Foo"])]);
        let attributes = read(&store, &annotations).unwrap();
        assert_eq!(
            attributes.types,
            BTreeSet::from([Type::object(), Type::class("Foo")])
        );

        let annotations = AnnotationSet::new([Annotation::typed(&["Bar"])]);
        assert!(read(&store, &annotations).is_err());
    }
}
