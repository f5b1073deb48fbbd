use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use crate::{
    component::{producers::ProducerMethodProducer, Component, ComponentKind},
    errors::DeploymentError,
    ids::ComponentIdentifier,
    manager::BeanManager,
};

/// Graph of the injection dependencies between pseudo scoped components
///
/// Only dependent and singleton components are part of the graph. A normal scoped
/// component is injected through its client proxy and a programmatic lookup is resolved
/// when used, so both break cycles.
pub struct DependencyGraph {
    map: BTreeMap<ComponentIdentifier, DependencyGraphEntry>,
}

struct DependencyGraphEntry {
    id: ComponentIdentifier,
    dependencies: Vec<ComponentIdentifier>,
}

fn is_pseudo_scoped(component: &Component) -> bool {
    !component.normal_scoped && component.kind != ComponentKind::BuiltIn
}

impl DependencyGraph {
    /// Builds the graph, every component's injection points are resolved by the manager
    /// of its archive
    ///
    /// Injection points which do not resolve are skipped, validation reports them.
    pub fn new<'a>(components: impl IntoIterator<Item = (&'a BeanManager, &'a Arc<Component>)>) -> Self {
        let mut graph = Self {
            map: Default::default(),
        };

        for (manager, component) in components {
            if !is_pseudo_scoped(component) {
                continue;
            }
            let mut dependencies = component
                .injection_points
                .iter()
                .filter(|ip| !ip.delegate && !ip.is_programmatic_lookup() && !ip.is_injection_point_metadata())
                .filter_map(|ip| manager.resolve_unique(&ip.resolvable()).ok())
                .filter(|target| is_pseudo_scoped(target))
                .map(|target| target.id.clone())
                .collect::<Vec<_>>();

            // Non static producer methods need an instance of their declaring component
            if let Some(declaring) = component.declaring.as_ref().and_then(|d| manager.component(d)) {
                let is_static = component
                    .producer
                    .as_any()
                    .downcast_ref::<ProducerMethodProducer>()
                    .is_some_and(|p| p.method().member.modifiers.is_static);
                if !is_static && is_pseudo_scoped(&declaring) {
                    dependencies.push(declaring.id.clone());
                }
            }

            graph.add(component.id.clone(), dependencies);
        }

        graph
    }

    pub fn add(&mut self, id: ComponentIdentifier, mut dependencies: Vec<ComponentIdentifier>) {
        dependencies.sort();
        dependencies.dedup();
        self.map
            .insert(id.clone(), DependencyGraphEntry { id, dependencies });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Validate the graph
    ///
    /// Returns every cycle, each one starting and ending with the same component
    pub fn check(&self) -> Vec<DeploymentError> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();
        for entry in self.map.values() {
            let mut dependency_chain = Vec::new();
            check_recurse(
                self,
                &mut checked,
                &mut errors,
                &mut dependency_chain,
                entry,
            );
        }

        return errors;

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<ComponentIdentifier>,
            errors: &mut Vec<DeploymentError>,
            dependency_chain: &mut Vec<ComponentIdentifier>,
            entry: &DependencyGraphEntry,
        ) {
            // Circular Dependency Check
            if let Some(start) = dependency_chain.iter().position(|id| *id == entry.id) {
                let mut chain = dependency_chain[start..]
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>();
                chain.push(entry.id.to_string()); // Add current so chain is complete

                errors.push(DeploymentError::PseudoScopedCycle { chain });
            }

            // Skip other checks if already checked
            if !checked.insert(entry.id.clone()) {
                return;
            };

            dependency_chain.push(entry.id.clone());

            for dependency in &entry.dependencies {
                // Unknown targets are not pseudo scoped
                let Some(next_entry) = graph.map.get(dependency) else {
                    continue;
                };

                check_recurse(graph, checked, errors, dependency_chain, next_entry);
            }

            dependency_chain.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ArchiveId;

    fn id(class: &str) -> ComponentIdentifier {
        ComponentIdentifier::managed(&ArchiveId::new("app"), class)
    }

    #[test]
    fn cycles_are_reported_once_from_their_start() {
        let mut graph = DependencyGraph {
            map: Default::default(),
        };
        graph.add(id("A"), vec![id("B")]);
        graph.add(id("B"), vec![id("C")]);
        graph.add(id("C"), vec![id("B")]);
        graph.add(id("D"), vec![id("A")]);

        let errors = graph.check();
        assert_eq!(
            errors,
            vec![DeploymentError::PseudoScopedCycle {
                chain: vec![id("B").to_string(), id("C").to_string(), id("B").to_string()]
            }]
        );
    }

    #[test]
    fn acyclic_graphs_pass() {
        let mut graph = DependencyGraph {
            map: Default::default(),
        };
        graph.add(id("A"), vec![id("B"), id("C")]);
        graph.add(id("B"), vec![id("C")]);
        graph.add(id("C"), vec![id("Unknown")]);

        assert!(graph.check().is_empty());
        assert_eq!(graph.len(), 3);
    }
}
