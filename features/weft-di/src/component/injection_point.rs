use std::{fmt::Display, sync::Arc};

use crate::{
    ids::ComponentIdentifier,
    metadata::{
        annotated::AnnotatedParameter, annotation::AnnotationSet, builtin,
        reflection::Type, store::MetaAnnotationStore,
    },
    resolution::{
        qualifiers::{normalize_required_qualifiers, QualifierSet},
        resolvable::Resolvable,
    },
};

/// The member an injection point belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InjectionMember {
    Field { name: Arc<str> },
    Parameter { member: Arc<str>, position: usize },
}

/// A place requiring a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectionPoint {
    /// Class declaring the member
    pub declaring_class: Arc<str>,
    pub member: InjectionMember,
    pub required: Type,
    /// Normalized - contains `@Default` if nothing else was required
    pub qualifiers: QualifierSet,
    pub delegate: bool,
    pub transient: bool,
    /// The component the injection point belongs to, None for observers of extensions
    pub component: Option<ComponentIdentifier>,
}

impl InjectionPoint {
    pub fn field(
        store: &MetaAnnotationStore,
        declaring_class: &Arc<str>,
        name: &Arc<str>,
        required: &Type,
        annotations: &AnnotationSet,
        transient: bool,
    ) -> Self {
        Self {
            declaring_class: declaring_class.clone(),
            member: InjectionMember::Field { name: name.clone() },
            required: required.clone(),
            qualifiers: qualifiers(store, annotations),
            delegate: annotations.contains(builtin::DELEGATE),
            transient,
            component: None,
        }
    }

    /// `member` is the qualified signature of the method or constructor
    pub fn parameter(
        store: &MetaAnnotationStore,
        declaring_class: &Arc<str>,
        member: &str,
        parameter: &AnnotatedParameter,
    ) -> Self {
        Self {
            declaring_class: declaring_class.clone(),
            member: InjectionMember::Parameter {
                member: Arc::from(member),
                position: parameter.position,
            },
            required: parameter.ty.clone(),
            qualifiers: qualifiers(store, &parameter.annotations),
            delegate: parameter.annotations.contains(builtin::DELEGATE),
            transient: parameter.annotations.contains(builtin::TRANSIENT),
            component: None,
        }
    }

    pub fn owned_by(mut self, component: &ComponentIdentifier) -> Self {
        self.component = Some(component.clone());
        self
    }

    pub fn resolvable(&self) -> Resolvable {
        let resolvable = Resolvable::new(self.required.clone(), self.qualifiers.clone());
        if self.delegate {
            resolvable.delegate()
        } else {
            resolvable
        }
    }

    /// Built-in lookups which are never resolved against the component universe
    pub fn is_programmatic_lookup(&self) -> bool {
        self.required.raw_name().is_some_and(|r| &**r == builtin::INSTANCE)
    }

    pub fn is_injection_point_metadata(&self) -> bool {
        self.required
            .raw_name()
            .is_some_and(|r| &**r == builtin::INJECTION_POINT)
    }
}

fn qualifiers(store: &MetaAnnotationStore, annotations: &AnnotationSet) -> QualifierSet {
    let declared = annotations
        .iter()
        .filter(|a| store.is_qualifier(&a.annotation_type))
        .map(|a| store.qualifier_instance(a))
        .collect();
    normalize_required_qualifiers(declared)
}

impl Display for InjectionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.member {
            InjectionMember::Field { name } => write!(f, "[field {}.{name}]", self.declaring_class),
            InjectionMember::Parameter { member, position } => {
                write!(f, "[parameter {} of {member}]", position + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::annotation::Annotation, resolution::qualifiers::QualifierInstance};

    #[test]
    fn unqualified_points_require_default() {
        let store = MetaAnnotationStore::new();
        let ip = InjectionPoint::field(
            &store,
            &Arc::from("Foo"),
            &Arc::from("bar"),
            &Type::class("Bar"),
            &AnnotationSet::new([Annotation::marker(builtin::INJECT)]),
            false,
        );
        assert_eq!(
            ip.qualifiers,
            QualifierSet::from([QualifierInstance::default_qualifier()])
        );
        assert_eq!(ip.to_string(), "[field Foo.bar]");
    }
}
