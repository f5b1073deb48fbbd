use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    metadata::{
        annotation::{Annotation, AnnotationDefinition},
        builtin::{self, members},
    },
    resolution::qualifiers::QualifierInstance,
};

/// Scope related facts of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeModel {
    pub normal: bool,
    pub passivating: bool,
}

/// Everything a stereotype contributes, merged over the stereotypes it is annotated with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StereotypeModel {
    pub default_scopes: BTreeSet<Arc<str>>,
    pub alternative: bool,
    /// Declares `@Named` without a value, so components get a default name
    pub named: bool,
    pub interceptor_bindings: Vec<Annotation>,
    pub priority: Option<i64>,
    /// This stereotype and every stereotype it inherits
    pub stereotypes: BTreeSet<Arc<str>>,
}

/// Derived facts about an annotation type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationModel {
    pub name: Arc<str>,
    pub known: bool,
    pub qualifier: bool,
    pub interceptor_binding: bool,
    pub scope: Option<ScopeModel>,
    pub stereotype: Option<StereotypeModel>,
    pub nonbinding: BTreeSet<Arc<str>>,
    /// Interceptor bindings declared on this interceptor binding
    pub inherited_bindings: Vec<Annotation>,
}

/// Caches [AnnotationModel]s
///
/// Definitions stay for the lifetime of the container, derived models are per bootstrap
/// and are dropped with [MetaAnnotationStore::clear].
pub struct MetaAnnotationStore {
    definitions: DashMap<Arc<str>, AnnotationDefinition>,
    models: DashMap<Arc<str>, Arc<AnnotationModel>>,
}

impl Default for MetaAnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaAnnotationStore {
    /// Store knowing the builtin qualifiers and scopes
    pub fn new() -> Self {
        let store = Self {
            definitions: DashMap::new(),
            models: DashMap::new(),
        };

        for qualifier in [
            builtin::DEFAULT,
            builtin::ANY,
            builtin::NAMED,
            builtin::INITIALIZED,
            builtin::DESTROYED,
        ] {
            store.register(AnnotationDefinition::qualifier(qualifier));
        }
        store.register(AnnotationDefinition::pseudo_scope(builtin::DEPENDENT));
        store.register(AnnotationDefinition::pseudo_scope(builtin::SINGLETON));
        store.register(AnnotationDefinition::normal_scope(
            builtin::APPLICATION_SCOPED,
            false,
        ));
        store.register(AnnotationDefinition::normal_scope(builtin::REQUEST_SCOPED, false));
        store.register(AnnotationDefinition::normal_scope(builtin::SESSION_SCOPED, true));
        store.register(AnnotationDefinition::normal_scope(
            builtin::CONVERSATION_SCOPED,
            true,
        ));

        store
    }

    /// Registers or replaces an annotation definition
    pub fn register(&self, definition: AnnotationDefinition) {
        tracing::trace!("Registering annotation {}", definition.name);
        let name = definition.name.clone();
        self.definitions.insert(name, definition);
        // Stereotypes and bindings fold in other definitions, so every model may be stale
        self.models.clear();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// The model of an annotation type - unknown annotations have no flags set
    pub fn model(&self, name: &str) -> Arc<AnnotationModel> {
        if let Some(model) = self.models.get(name) {
            return model.clone();
        }

        let model = Arc::new(self.build_model(name));
        self.models
            .entry(model.name.clone())
            .or_insert(model)
            .clone()
    }

    pub fn is_qualifier(&self, name: &str) -> bool {
        self.model(name).qualifier
    }

    pub fn is_scope(&self, name: &str) -> bool {
        self.model(name).scope.is_some()
    }

    pub fn is_normal_scope(&self, name: &str) -> bool {
        self.model(name).scope.is_some_and(|s| s.normal)
    }

    pub fn is_passivating_scope(&self, name: &str) -> bool {
        self.model(name).scope.is_some_and(|s| s.passivating)
    }

    pub fn is_stereotype(&self, name: &str) -> bool {
        self.model(name).stereotype.is_some()
    }

    pub fn is_interceptor_binding(&self, name: &str) -> bool {
        self.model(name).interceptor_binding
    }

    /// The annotation reduced to its binding members
    pub fn qualifier_instance(&self, annotation: &Annotation) -> QualifierInstance {
        let model = self.model(&annotation.annotation_type);
        QualifierInstance {
            annotation_type: annotation.annotation_type.clone(),
            members: annotation
                .members
                .iter()
                .filter(|(member, _)| !model.nonbinding.contains(*member))
                .map(|(member, value)| (member.clone(), value.clone()))
                .collect(),
        }
    }

    /// The binding and every binding it inherits, as qualifier instances
    pub fn binding_closure(&self, annotation: &Annotation) -> Vec<QualifierInstance> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut pending = vec![annotation.clone()];
        while let Some(binding) = pending.pop() {
            let instance = self.qualifier_instance(&binding);
            if !seen.insert(instance.clone()) {
                continue;
            }
            result.push(instance);
            pending.extend(self.model(&binding.annotation_type).inherited_bindings.clone());
        }
        result.sort();
        result
    }

    /// Drops the derived models
    pub fn clear(&self) {
        self.models.clear();
    }

    fn build_model(&self, name: &str) -> AnnotationModel {
        let Some(definition) = self.definitions.get(name).map(|d| d.value().clone()) else {
            return AnnotationModel {
                name: Arc::from(name),
                known: false,
                qualifier: false,
                interceptor_binding: false,
                scope: None,
                stereotype: None,
                nonbinding: BTreeSet::new(),
                inherited_bindings: Vec::new(),
            };
        };

        let has_meta = |meta: &str| definition.meta_annotations.iter().any(|a| a.is(meta));

        let scope = if has_meta(builtin::SCOPE) {
            Some(ScopeModel {
                normal: false,
                passivating: false,
            })
        } else {
            definition
                .meta_annotations
                .iter()
                .find(|a| a.is(builtin::NORMAL_SCOPE))
                .map(|normal| ScopeModel {
                    normal: true,
                    passivating: normal
                        .member(members::PASSIVATING)
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                })
        };

        let interceptor_binding = has_meta(builtin::INTERCEPTOR_BINDING);
        let inherited_bindings = if interceptor_binding {
            definition
                .meta_annotations
                .iter()
                .filter(|a| self.definition_has_meta(&a.annotation_type, builtin::INTERCEPTOR_BINDING))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let stereotype = has_meta(builtin::STEREOTYPE).then(|| {
            let mut merged = StereotypeModel::default();
            self.merge_stereotype(&definition, &mut merged);
            merged
        });

        AnnotationModel {
            name: definition.name.clone(),
            known: true,
            qualifier: has_meta(builtin::QUALIFIER),
            interceptor_binding,
            scope,
            stereotype,
            nonbinding: definition.nonbinding.iter().cloned().collect(),
            inherited_bindings,
        }
    }

    fn definition_has_meta(&self, name: &str, meta: &str) -> bool {
        self.definitions
            .get(name)
            .is_some_and(|d| d.meta_annotations.iter().any(|a| a.is(meta)))
    }

    /// Folds a stereotype and the stereotypes it is annotated with into `merged`
    fn merge_stereotype(&self, definition: &AnnotationDefinition, merged: &mut StereotypeModel) {
        if !merged.stereotypes.insert(definition.name.clone()) {
            return; // Stereotypes may annotate each other
        }

        for meta in &definition.meta_annotations {
            let name = &meta.annotation_type;
            if meta.is(builtin::ALTERNATIVE) {
                merged.alternative = true;
            } else if meta.is(builtin::NAMED) {
                merged.named = true;
            } else if meta.is(builtin::PRIORITY) {
                merged.priority = merged
                    .priority
                    .or_else(|| meta.value().and_then(|v| v.as_int()));
            } else if self.definition_has_meta(name, builtin::SCOPE)
                || self.definition_has_meta(name, builtin::NORMAL_SCOPE)
            {
                merged.default_scopes.insert(name.clone());
            } else if self.definition_has_meta(name, builtin::INTERCEPTOR_BINDING) {
                merged.interceptor_bindings.push(meta.clone());
            } else if self.definition_has_meta(name, builtin::STEREOTYPE) {
                let inherited = self.definitions.get(&**name).map(|d| d.value().clone());
                if let Some(inherited) = inherited {
                    self.merge_stereotype(&inherited, merged);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::annotation::AnnotationValue;

    #[test]
    fn builtin_scopes_are_known() {
        let store = MetaAnnotationStore::new();
        assert!(store.is_normal_scope(builtin::REQUEST_SCOPED));
        assert!(store.is_passivating_scope(builtin::SESSION_SCOPED));
        assert!(store.is_scope(builtin::DEPENDENT));
        assert!(!store.is_normal_scope(builtin::SINGLETON));
        assert!(store.is_qualifier(builtin::NAMED));
        assert!(!store.model("Unknown").known);
    }

    #[test]
    fn nonbinding_members_are_excluded_from_qualifier_instances() {
        let store = MetaAnnotationStore::new();
        store.register(AnnotationDefinition::qualifier("Pay").nonbinding("comment"));

        let a = Annotation::marker("Pay")
            .with("value", AnnotationValue::enumeration("CHEQUE"))
            .with("comment", AnnotationValue::str("first"));
        let b = Annotation::marker("Pay")
            .with("value", AnnotationValue::enumeration("CHEQUE"))
            .with("comment", AnnotationValue::str("second"));
        let c = Annotation::marker("Pay").with("value", AnnotationValue::enumeration("CASH"));

        assert_eq!(store.qualifier_instance(&a), store.qualifier_instance(&b));
        assert_ne!(store.qualifier_instance(&a), store.qualifier_instance(&c));
    }

    #[test]
    fn stereotypes_merge_transitively() {
        let store = MetaAnnotationStore::new();
        store.register(AnnotationDefinition::interceptor_binding("Logged"));
        store.register(
            AnnotationDefinition::stereotype("Action")
                .annotated(Annotation::marker(builtin::REQUEST_SCOPED))
                .annotated(Annotation::marker(builtin::NAMED))
                .annotated(Annotation::marker("Logged")),
        );
        store.register(
            AnnotationDefinition::stereotype("Mock")
                .annotated(Annotation::marker(builtin::ALTERNATIVE))
                .annotated(Annotation::marker("Action")),
        );

        let mock = store.model("Mock");
        let merged = mock.stereotype.as_ref().unwrap();
        assert!(merged.alternative);
        assert!(merged.named);
        assert!(merged.default_scopes.contains(builtin::REQUEST_SCOPED));
        assert_eq!(merged.interceptor_bindings, vec![Annotation::marker("Logged")]);
        assert_eq!(merged.stereotypes.len(), 2);
    }

    #[test]
    fn inherited_bindings_are_part_of_the_closure() {
        let store = MetaAnnotationStore::new();
        store.register(AnnotationDefinition::interceptor_binding("Logged"));
        store.register(
            AnnotationDefinition::interceptor_binding("Audited")
                .annotated(Annotation::marker("Logged")),
        );

        let closure = store.binding_closure(&Annotation::marker("Audited"));
        assert_eq!(closure.len(), 2);
    }
}
