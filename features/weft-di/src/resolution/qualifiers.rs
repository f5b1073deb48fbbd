use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    sync::Arc,
};

use crate::metadata::{
    annotation::{Annotation, AnnotationValue},
    builtin::{self, members},
};

/// A qualifier reduced to its type and binding members
///
/// Two instances are equal when their type and every binding member value are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifierInstance {
    pub annotation_type: Arc<str>,
    pub members: BTreeMap<Arc<str>, AnnotationValue>,
}

pub type QualifierSet = BTreeSet<QualifierInstance>;

impl QualifierInstance {
    pub fn marker(annotation_type: &str) -> Self {
        Self {
            annotation_type: Arc::from(annotation_type),
            members: BTreeMap::new(),
        }
    }

    pub fn default_qualifier() -> Self {
        Self::marker(builtin::DEFAULT)
    }

    pub fn any() -> Self {
        Self::marker(builtin::ANY)
    }

    pub fn named(name: &str) -> Self {
        let mut instance = Self::marker(builtin::NAMED);
        instance
            .members
            .insert(Arc::from(members::VALUE), AnnotationValue::str(name));
        instance
    }

    pub fn is(&self, annotation_type: &str) -> bool {
        &*self.annotation_type == annotation_type
    }

    /// The `@Named` value, if this is a name qualifier
    pub fn name(&self) -> Option<&str> {
        if !self.is(builtin::NAMED) {
            return None;
        }
        self.members.get(members::VALUE).and_then(|v| v.as_str())
    }

    /// Back to a plain annotation (without the nonbinding members)
    pub fn to_annotation(&self) -> Annotation {
        Annotation {
            annotation_type: self.annotation_type.clone(),
            members: self.members.clone(),
        }
    }
}

impl Display for QualifierInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_annotation().fmt(f)
    }
}

/// Display form of a qualifier set, used in diagnostics
pub fn describe(qualifiers: &QualifierSet) -> Vec<String> {
    qualifiers.iter().map(|q| q.to_string()).collect()
}

/// Qualifiers every component carries, given its explicitly declared ones
///
/// Every component has `@Any`. Components declaring nothing but `@Named` or `@Any` also get `@Default`.
pub fn normalize_component_qualifiers(mut declared: QualifierSet) -> QualifierSet {
    let only_implicit = declared
        .iter()
        .all(|q| q.is(builtin::NAMED) || q.is(builtin::ANY));
    if only_implicit {
        declared.insert(QualifierInstance::default_qualifier());
    }
    declared.insert(QualifierInstance::any());
    declared
}

/// Qualifiers required by an injection point, given its explicitly declared ones
///
/// An injection point without qualifiers, or with only `@Named`, requires `@Default`.
pub fn normalize_required_qualifiers(mut declared: QualifierSet) -> QualifierSet {
    if declared.iter().all(|q| q.is(builtin::NAMED)) {
        declared.insert(QualifierInstance::default_qualifier());
    }
    declared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_get_default_and_any() {
        let qualifiers = normalize_component_qualifiers(QualifierSet::from([
            QualifierInstance::named("foo"),
        ]));
        assert!(qualifiers.contains(&QualifierInstance::default_qualifier()));
        assert!(qualifiers.contains(&QualifierInstance::any()));

        let qualifiers =
            normalize_component_qualifiers(QualifierSet::from([QualifierInstance::marker("Fast")]));
        assert!(!qualifiers.contains(&QualifierInstance::default_qualifier()));
        assert!(qualifiers.contains(&QualifierInstance::any()));
    }

    #[test]
    fn injection_points_require_default_when_unqualified() {
        let required = normalize_required_qualifiers(QualifierSet::new());
        assert_eq!(
            required,
            QualifierSet::from([QualifierInstance::default_qualifier()])
        );

        let required =
            normalize_required_qualifiers(QualifierSet::from([QualifierInstance::any()]));
        assert_eq!(required, QualifierSet::from([QualifierInstance::any()]));
    }

    #[test]
    fn named_exposes_its_value() {
        assert_eq!(QualifierInstance::named("foo").name(), Some("foo"));
        assert_eq!(QualifierInstance::any().name(), None);
    }
}
