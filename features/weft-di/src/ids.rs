//! Deterministic identifiers
//!
//! Every component receives an identifier derived from its content (archive, class, member
//! signature) so that the same logical component has the same identity in every container
//! built from the same deployment.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::component::Component;

const SEPARATOR: char = '%';

/// Identifies a whole deployment (one container)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentId(Arc<str>);
impl DeploymentId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies an archive inside a deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(Arc<str>);
impl ArchiveId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind prefix of a [ComponentIdentifier]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentifierKind {
    Managed,
    ProducerMethod,
    ProducerField,
    Observer,
    Synthetic,
    External,
    BuiltIn,
}
impl IdentifierKind {
    fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::Managed => "MANAGED",
            IdentifierKind::ProducerMethod => "PRODUCER_METHOD",
            IdentifierKind::ProducerField => "PRODUCER_FIELD",
            IdentifierKind::Observer => "OBSERVER",
            IdentifierKind::Synthetic => "SYNTHETIC",
            IdentifierKind::External => "EXTERNAL",
            IdentifierKind::BuiltIn => "BUILTIN",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "MANAGED" => IdentifierKind::Managed,
            "PRODUCER_METHOD" => IdentifierKind::ProducerMethod,
            "PRODUCER_FIELD" => IdentifierKind::ProducerField,
            "OBSERVER" => IdentifierKind::Observer,
            "SYNTHETIC" => IdentifierKind::Synthetic,
            "EXTERNAL" => IdentifierKind::External,
            "BUILTIN" => IdentifierKind::BuiltIn,
            _ => return None,
        })
    }
}

/// Identity of a component or observer
///
/// The string form is `KIND%part%part...`, e.g. `MANAGED%app%com.acme.Foo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentIdentifier(Arc<str>);

impl ComponentIdentifier {
    fn compose(kind: IdentifierKind, parts: &[&str]) -> Self {
        let mut id = String::from(kind.prefix());
        for part in parts {
            id.push(SEPARATOR);
            id.push_str(part);
        }
        Self(Arc::from(id))
    }

    pub fn managed(archive: &ArchiveId, class: &str) -> Self {
        Self::compose(IdentifierKind::Managed, &[archive.as_str(), class])
    }

    /// `signature` is the method name followed by its parameter types
    pub fn producer_method(declaring: &ComponentIdentifier, signature: &str) -> Self {
        Self::compose(IdentifierKind::ProducerMethod, &[declaring.as_str(), signature])
    }

    pub fn producer_field(declaring: &ComponentIdentifier, field: &str) -> Self {
        Self::compose(IdentifierKind::ProducerField, &[declaring.as_str(), field])
    }

    pub fn observer(declaring: &ComponentIdentifier, signature: &str) -> Self {
        Self::compose(IdentifierKind::Observer, &[declaring.as_str(), signature])
    }

    /// Synthetic components have no class, their id is derived from their attributes
    pub fn synthetic(archive: &ArchiveId, descriptor: &str) -> Self {
        Self::compose(IdentifierKind::Synthetic, &[archive.as_str(), descriptor])
    }

    pub fn external(archive: &ArchiveId, type_name: &str) -> Self {
        Self::compose(IdentifierKind::External, &[archive.as_str(), type_name])
    }

    pub fn built_in(name: &str) -> Self {
        Self::compose(IdentifierKind::BuiltIn, &[name])
    }

    /// Parses an identifier previously obtained through [ComponentIdentifier::as_str]
    pub fn parse(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once(SEPARATOR)?;
        IdentifierKind::from_prefix(prefix)?;
        Some(Self(Arc::from(id)))
    }

    pub fn kind(&self) -> IdentifierKind {
        self.0
            .split(SEPARATOR)
            .next()
            .and_then(IdentifierKind::from_prefix)
            .unwrap_or(IdentifierKind::Synthetic)
    }

    /// The class of a managed component's identifier
    pub fn class_name(&self) -> Option<&str> {
        match self.kind() {
            IdentifierKind::Managed => self.0.rsplit(SEPARATOR).next(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for ComponentIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps contextuals to the identifiers used as keys in contextual storage
///
/// Passivation capable components use their deterministic identifier, all others
/// receive a generated `CONTEXTUAL_<n>` identifier which is only valid in this container.
#[derive(Default)]
pub struct ContextualStore {
    identifiers: DashMap<ComponentIdentifier, Arc<str>>,
    contextuals: DashMap<Arc<str>, Arc<Component>>,
    counter: AtomicUsize,
}

impl ContextualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier of the component, assigning one if it has none yet
    pub fn put_if_absent(&self, component: &Arc<Component>) -> Arc<str> {
        let entry = self
            .identifiers
            .entry(component.id.clone())
            .or_insert_with(|| {
                if component.passivation_capable {
                    Arc::from(component.id.as_str())
                } else {
                    let n = self.counter.fetch_add(1, Ordering::Relaxed);
                    Arc::from(format!("CONTEXTUAL_{n}"))
                }
            });
        let identifier = entry.value().clone();
        drop(entry);

        self.contextuals
            .entry(identifier.clone())
            .or_insert_with(|| component.clone());
        identifier
    }

    /// The component stored under the identifier
    pub fn contextual(&self, identifier: &str) -> Option<Arc<Component>> {
        self.contextuals.get(identifier).map(|c| c.value().clone())
    }

    /// The identifier of a component, if one was assigned
    pub fn identifier(&self, component: &ComponentIdentifier) -> Option<Arc<str>> {
        self.identifiers.get(component).map(|i| i.value().clone())
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_content_derived() {
        let archive = ArchiveId::new("app");
        let a = ComponentIdentifier::managed(&archive, "com.acme.Foo");
        let b = ComponentIdentifier::managed(&ArchiveId::new("app"), "com.acme.Foo");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "MANAGED%app%com.acme.Foo");
        assert_eq!(a.kind(), IdentifierKind::Managed);

        let producer = ComponentIdentifier::producer_method(&a, "create()");
        assert_eq!(producer.kind(), IdentifierKind::ProducerMethod);
        assert_eq!(ComponentIdentifier::parse(producer.as_str()), Some(producer));
    }

    #[test]
    fn parse_rejects_unknown_prefixes() {
        assert_eq!(ComponentIdentifier::parse("FOO%bar"), None);
        assert_eq!(ComponentIdentifier::parse("MANAGED"), None);
    }
}
