//! Deployment validation, once every component of every archive is known

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    bootstrap::executor::Executor,
    component::{Component, InjectionPoint},
    dependency_graph::DependencyGraph,
    errors::{DeploymentError, Problem, Problems, ResolutionError},
    ids::ArchiveId,
    manager::BeanManager,
};

/// Checks a deployed container before it is handed out
///
/// Every problem of the deployment is collected, the result is sorted so that sequential
/// and parallel validation report the same thing.
pub struct Validator<'a> {
    executor: &'a Executor,
    managers: &'a BTreeMap<ArchiveId, BeanManager>,
}

impl<'a> Validator<'a> {
    pub fn new(executor: &'a Executor, managers: &'a BTreeMap<ArchiveId, BeanManager>) -> Self {
        Self { executor, managers }
    }

    /// Components an archive declares and enables, paired with the archive's manager
    fn enabled_components(&self) -> Vec<(BeanManager, Arc<Component>)> {
        let mut items = Vec::new();
        for (archive, manager) in self.managers {
            let visible = manager
                .components()
                .iter()
                .chain(manager.interceptors().iter())
                .chain(manager.decorators().iter())
                .filter(|c| &c.archive == archive)
                .cloned()
                .collect::<Vec<_>>();
            items.extend(visible.into_iter().map(|c| (manager.clone(), c)));
        }
        items.sort_by(|(_, a), (_, b)| a.id.cmp(&b.id));
        items.dedup_by(|(_, a), (_, b)| a.id == b.id);
        items
    }

    pub fn validate_deployment(&self) -> Result<(), Problems> {
        let items = self.enabled_components();
        tracing::debug!("Validating {} components", items.len());

        let mut problems = Problems::new();
        if let Err(p) = self
            .executor
            .invoke_all(items.clone(), |(manager, component)| {
                validate_component(&manager, &component)
            })
        {
            problems.extend(p);
        }

        for manager in self.managers.values() {
            for observer in manager.own_observers() {
                for ip in observer.injection_points() {
                    if let Err(e) = validate_injection_point(manager, ip) {
                        problems.push(e);
                    }
                }
            }
            problems.extend(self.validate_names(manager));
            problems.extend(self.validate_enablement(manager));
        }

        let graph = DependencyGraph::new(items.iter().map(|(m, c)| (m, c)));
        for cycle in graph.check() {
            problems.push(cycle);
        }

        if problems.is_empty() {
            return Ok(());
        }
        problems.normalize();
        tracing::debug!("Validation found {} problems", problems.errors.len());
        Err(problems)
    }

    fn validate_names(&self, manager: &BeanManager) -> Problems {
        let names = manager
            .components()
            .iter()
            .filter_map(|c| c.attributes.name.clone())
            .collect::<BTreeSet<_>>();

        let mut problems = Problems::new();
        for name in names {
            if let Err(ResolutionError::Ambiguous { candidates, .. }) = manager.resolve_by_name(&name) {
                problems.push(DeploymentError::AmbiguousName {
                    name: name.to_string(),
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
        problems
    }

    /// Every class an archive enables must be a known alternative, interceptor or decorator
    fn validate_enablement(&self, manager: &BeanManager) -> Problems {
        let services = manager.container_services();
        let store = manager.store();
        let mut problems = Problems::new();
        for (kind, class) in manager.enablement().references() {
            let known = services.components.iter().any(|entry| {
                let component = entry.value();
                let declares = component.class_name() == **class;
                match kind {
                    "interceptor" => declares && component.is_interceptor(),
                    "decorator" => declares && component.is_decorator(),
                    _ => {
                        (declares
                            || component
                                .declaring
                                .as_ref()
                                .and_then(|d| d.class_name())
                                .is_some_and(|d| d == &**class))
                            && component.attributes.alternative
                    }
                }
            });
            let stereotype = kind == "alternative" && store.is_stereotype(class);
            if !known && !stereotype {
                problems.push(DeploymentError::UnknownEnabledClass {
                    archive: manager.archive().to_string(),
                    class: class.to_string(),
                    kind: kind.to_string(),
                });
            }
        }
        problems
    }
}

fn validate_component(manager: &BeanManager, component: &Arc<Component>) -> Result<(), Problems> {
    let mut problems = Problems::new();

    if component.passivating_scope && !component.passivation_capable {
        problems.push(DeploymentError::NotPassivationCapable {
            component: component.id.to_string(),
            scope: component.attributes.scope.to_string(),
        });
    }

    for ip in &component.injection_points {
        let target = match validate_injection_point(manager, ip) {
            Ok(Some(target)) => target,
            Ok(None) => continue,
            Err(e) => {
                problems.push(e);
                continue;
            }
        };
        if target.normal_scoped && !target.proxyable {
            problems.push(DeploymentError::UnproxyableDependency {
                injection_point: ip.to_string(),
                component: target.id.to_string(),
            });
        }
        if component.passivating_scope
            && !ip.transient
            && !target.normal_scoped
            && !target.passivation_capable
        {
            problems.push(DeploymentError::UnserializableDependency {
                injection_point: ip.to_string(),
                component: target.id.to_string(),
            });
        }
    }

    // Surfaces binding and interceptor method problems before the first instance
    if let Err(e) = manager.interception_model(component) {
        problems.push(Problem::from(e));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Resolves the injection point, None for points the container fills itself
fn validate_injection_point(
    manager: &BeanManager,
    ip: &InjectionPoint,
) -> Result<Option<Arc<Component>>, DeploymentError> {
    if ip.delegate || ip.is_programmatic_lookup() || ip.is_injection_point_metadata() {
        return Ok(None);
    }
    match manager.resolve_unique(&ip.resolvable()) {
        Ok(target) => Ok(Some(target)),
        Err(ResolutionError::Unsatisfied { required, .. }) => {
            Err(DeploymentError::UnsatisfiedDependency {
                injection_point: ip.to_string(),
                required,
            })
        }
        Err(ResolutionError::Ambiguous {
            required,
            candidates,
            ..
        }) => Err(DeploymentError::AmbiguousDependency {
            injection_point: ip.to_string(),
            required,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }),
    }
}
