//! The shape of a deployment: archives, their classes and which archives see which

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

use crate::{
    component::{Component, ComponentKind},
    events::extension::Extension,
    ids::{ArchiveId, DeploymentId},
    metadata::{annotated::AnnotatedType, annotation::AnnotationDefinition},
};

/// Rank of an enabled interceptor or decorator, lower runs first
///
/// Enabled through `@Priority` first (by priority), then enabled per archive (by position).
pub type Rank = (u8, i64);

/// Alternatives, interceptors and decorators an archive enables by class name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enablement {
    /// Class or stereotype names
    pub alternatives: Vec<Arc<str>>,
    pub interceptors: Vec<Arc<str>>,
    pub decorators: Vec<Arc<str>>,
}

impl Enablement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alternative(mut self, class_or_stereotype: impl AsRef<str>) -> Self {
        self.alternatives.push(Arc::from(class_or_stereotype.as_ref()));
        self
    }

    pub fn interceptor(mut self, class: impl AsRef<str>) -> Self {
        self.interceptors.push(Arc::from(class.as_ref()));
        self
    }

    pub fn decorator(mut self, class: impl AsRef<str>) -> Self {
        self.decorators.push(Arc::from(class.as_ref()));
        self
    }

    /// Non alternatives are always enabled
    pub fn is_alternative_enabled(&self, component: &Component) -> bool {
        let attributes = &component.attributes;
        if !attributes.alternative || attributes.priority.is_some() {
            return true;
        }
        let class = self.selection_class(component);
        self.alternatives.iter().any(|selected| {
            **selected == *class || attributes.stereotypes.contains(selected)
        })
    }

    pub fn interceptor_rank(&self, component: &Component) -> Option<Rank> {
        self.rank(&self.interceptors, component)
    }

    pub fn decorator_rank(&self, component: &Component) -> Option<Rank> {
        self.rank(&self.decorators, component)
    }

    fn rank(&self, enabled: &[Arc<str>], component: &Component) -> Option<Rank> {
        if let Some(priority) = component.attributes.priority {
            return Some((0, priority));
        }
        let class = component.class_name();
        enabled
            .iter()
            .position(|e| **e == *class)
            .map(|position| (1, position as i64))
    }

    /// Producers are selected through the class declaring them
    fn selection_class(&self, component: &Component) -> String {
        match (component.kind, &component.declaring) {
            (ComponentKind::ProducerMethod | ComponentKind::ProducerField, Some(declaring)) => {
                declaring.class_name().unwrap_or_default().to_string()
            }
            _ => component.class_name(),
        }
    }

    /// Every class name referenced, with the kind of reference
    pub fn references(&self) -> Vec<(&'static str, &Arc<str>)> {
        let alternatives = self.alternatives.iter().map(|a| ("alternative", a));
        let interceptors = self.interceptors.iter().map(|i| ("interceptor", i));
        let decorators = self.decorators.iter().map(|d| ("decorator", d));
        alternatives.chain(interceptors).chain(decorators).collect()
    }
}

/// A unit of deployment with its own classes and visibility
#[derive(Clone)]
pub struct Archive {
    pub id: ArchiveId,
    /// Names of the classes to discover, in order
    pub classes: Vec<Arc<str>>,
    /// Classes registered with the archive, made available through the resource loader
    pub types: Vec<AnnotatedType>,
    /// Archives whose components this archive sees
    pub accessible: Vec<ArchiveId>,
    pub enablement: Enablement,
}

impl Archive {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self {
            id: ArchiveId::new(id),
            classes: Vec::new(),
            types: Vec::new(),
            accessible: Vec::new(),
            enablement: Enablement::default(),
        }
    }

    /// Adds a class loaded by name through the resource loader
    pub fn with_class_name(mut self, name: impl AsRef<str>) -> Self {
        self.classes.push(Arc::from(name.as_ref()));
        self
    }

    /// Adds a class described in place
    pub fn with_class(mut self, ty: AnnotatedType) -> Self {
        self.classes.push(ty.name.clone());
        self.types.push(ty);
        self
    }

    pub fn accessing(mut self, archive: impl AsRef<str>) -> Self {
        self.accessible.push(ArchiveId::new(archive));
        self
    }

    pub fn enabling(mut self, enablement: Enablement) -> Self {
        self.enablement = enablement;
        self
    }
}

/// Everything [ContainerInitiator::initialize](crate::initiator::ContainerInitiator::initialize) boots
#[derive(Clone)]
pub struct DeploymentDescriptor {
    pub id: DeploymentId,
    pub archives: Vec<Archive>,
    pub extensions: Vec<Arc<dyn Extension>>,
    /// Annotation types the deployment declares (qualifiers, scopes, stereotypes, bindings)
    pub annotations: Vec<AnnotationDefinition>,
}

impl DeploymentDescriptor {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self {
            id: DeploymentId::new(id),
            archives: Vec::new(),
            extensions: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Nothing to deploy, no archive has a class and no extension may add one
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.archives.iter().all(|a| a.classes.is_empty())
    }
}

/// Visibility between archives
///
/// Archive links may form cycles, visiting cuts them with a seen set.
#[derive(Debug, Default, Clone)]
pub struct DeploymentStructure {
    links: BTreeMap<ArchiveId, Vec<ArchiveId>>,
}

impl DeploymentStructure {
    pub fn new<'a>(archives: impl IntoIterator<Item = &'a Archive>) -> Self {
        let mut structure = Self::default();
        for archive in archives {
            structure.add(archive);
        }
        structure
    }

    /// Adds or replaces the links of an archive
    pub fn add(&mut self, archive: &Archive) {
        self.links
            .insert(archive.id.clone(), archive.accessible.clone());
    }

    pub fn archives(&self) -> impl Iterator<Item = &ArchiveId> {
        self.links.keys()
    }

    /// Every archive reachable from `start`, including itself, in visiting order
    pub fn visit(&self, start: &ArchiveId) -> Vec<ArchiveId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut pending = vec![start.clone()];
        while let Some(archive) = pending.pop() {
            if !seen.insert(archive.clone()) {
                continue;
            }
            if let Some(links) = self.links.get(&archive) {
                pending.extend(links.iter().rev().cloned());
            } else if &archive != start {
                tracing::warn!("Archive {start} references unknown archive {archive}");
                continue;
            }
            order.push(archive);
        }
        order
    }

    /// [DeploymentStructure::visit] for every archive
    pub fn accessibility(&self) -> BTreeMap<ArchiveId, BTreeSet<ArchiveId>> {
        self.links
            .keys()
            .map(|archive| (archive.clone(), self.visit(archive).into_iter().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visiting_cuts_cycles() {
        let structure = DeploymentStructure::new(&[
            Archive::new("a").accessing("b"),
            Archive::new("b").accessing("c"),
            Archive::new("c").accessing("a"),
            Archive::new("d"),
        ]);

        let visited = structure.visit(&ArchiveId::new("a"));
        assert_eq!(
            visited,
            vec![ArchiveId::new("a"), ArchiveId::new("b"), ArchiveId::new("c")]
        );
        assert_eq!(structure.visit(&ArchiveId::new("d")), vec![ArchiveId::new("d")]);

        // Visiting is idempotent
        assert_eq!(structure.visit(&ArchiveId::new("a")), visited);
    }

    #[test]
    fn unknown_links_are_skipped() {
        let structure = DeploymentStructure::new(&[Archive::new("a").accessing("missing")]);
        assert_eq!(structure.visit(&ArchiveId::new("a")), vec![ArchiveId::new("a")]);
    }
}
