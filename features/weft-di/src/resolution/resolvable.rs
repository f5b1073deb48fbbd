use std::{fmt::Display, sync::Arc};

use crate::{
    metadata::{annotation::Annotation, reflection::Type, store::MetaAnnotationStore},
    resolution::qualifiers::{describe, normalize_required_qualifiers, QualifierSet},
};

/// The shape of a lookup - the cache key of the resolvers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolvable {
    pub required: Type,
    pub qualifiers: QualifierSet,
    /// Delegate injection points of decorators never resolve to decorators
    pub delegate: bool,
}

impl Resolvable {
    /// Lookup of `required` with already normalized qualifiers
    pub fn new(required: Type, qualifiers: QualifierSet) -> Self {
        Self {
            required,
            qualifiers,
            delegate: false,
        }
    }

    /// Lookup from declared annotations - nonbinding members are dropped, `@Default` is implied
    pub fn from_annotations(
        store: &MetaAnnotationStore,
        required: Type,
        qualifiers: &[Annotation],
    ) -> Self {
        let declared = qualifiers
            .iter()
            .map(|a| store.qualifier_instance(a))
            .collect();
        Self::new(required, normalize_required_qualifiers(declared))
    }

    pub fn delegate(mut self) -> Self {
        self.delegate = true;
        self
    }

    pub fn qualifier_names(&self) -> Vec<String> {
        describe(&self.qualifiers)
    }
}

impl Display for Resolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.required)?;
        for qualifier in &self.qualifiers {
            write!(f, " {qualifier}")?;
        }
        Ok(())
    }
}

/// Shape of an event - the cache key of the observer resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventDescriptor {
    pub event_type: Type,
    /// Always contains `@Any`
    pub qualifiers: QualifierSet,
}

impl EventDescriptor {
    pub fn new(event_type: Type, mut qualifiers: QualifierSet) -> Self {
        qualifiers.insert(crate::resolution::qualifiers::QualifierInstance::any());
        Self {
            event_type,
            qualifiers,
        }
    }
}

impl Display for EventDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_type)?;
        for qualifier in &self.qualifiers {
            write!(f, " {qualifier}")?;
        }
        Ok(())
    }
}

/// Shared form of a resolver result
pub type Candidates<T> = Arc<[Arc<T>]>;
