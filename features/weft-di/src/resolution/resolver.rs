use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    bootstrap::deployment::Enablement,
    component::{Component, ComponentRole},
    errors::ResolutionError,
    ids::ComponentIdentifier,
    metadata::{reflection::Type, transformer::ClassTransformer},
    resolution::{
        assignability::matches_any,
        qualifiers::QualifierSet,
        resolvable::{Candidates, Resolvable},
    },
};

/// Resolves lookups against the components visible to one archive
///
/// Results are cached per [Resolvable]. The set of components (the universe) is replaced
/// as a whole with [TypeSafeBeanResolver::set_universe], which also flushes every cache.
pub struct TypeSafeBeanResolver {
    transformer: Arc<ClassTransformer>,
    universe: RwLock<Universe>,
    candidates: DashMap<Resolvable, Candidates<Component>>,
    unique: DashMap<Resolvable, Result<Arc<Component>, ResolutionError>>,
    names: DashMap<Arc<str>, Result<Arc<Component>, ResolutionError>>,
}

#[derive(Clone)]
struct Universe {
    components: Candidates<Component>,
    interceptors: Candidates<Component>,
    decorators: Candidates<Component>,
}
impl Universe {
    fn empty() -> Self {
        Self {
            components: Vec::new().into(),
            interceptors: Vec::new().into(),
            decorators: Vec::new().into(),
        }
    }
}

impl TypeSafeBeanResolver {
    pub fn new(transformer: Arc<ClassTransformer>) -> Self {
        Self {
            transformer,
            universe: RwLock::new(Universe::empty()),
            candidates: DashMap::new(),
            unique: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Replaces the visible components
    ///
    /// Disabled alternatives, disabled interceptors and decorators and specialized
    /// components are removed before any lookup sees them.
    pub fn set_universe(&self, components: Vec<Arc<Component>>, enablement: &Enablement) {
        let specialized = specialized_components(&components, enablement);

        let mut plain = Vec::new();
        let mut interceptors = Vec::new();
        let mut decorators = Vec::new();
        for component in components {
            if specialized.contains(&component.id) {
                tracing::trace!("{} is specialized and removed from resolution", component.id);
                continue;
            }
            match &component.role {
                ComponentRole::Plain if enablement.is_alternative_enabled(&component) => {
                    plain.push(component)
                }
                ComponentRole::Plain => {
                    tracing::trace!("Alternative {} is not enabled", component.id)
                }
                ComponentRole::Interceptor(_) => {
                    if let Some(rank) = enablement.interceptor_rank(&component) {
                        interceptors.push((rank, component));
                    }
                }
                ComponentRole::Decorator(_) => {
                    if let Some(rank) = enablement.decorator_rank(&component) {
                        decorators.push((rank, component));
                    }
                }
            }
        }

        plain.sort_by(|a, b| a.id.cmp(&b.id));
        plain.dedup_by(|a, b| a.id == b.id);
        interceptors.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.id.cmp(&b.id)));
        decorators.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(
            "Resolver universe: {} components, {} interceptors, {} decorators",
            plain.len(),
            interceptors.len(),
            decorators.len()
        );

        *self.universe.write() = Universe {
            components: plain.into(),
            interceptors: interceptors.into_iter().map(|(_, c)| c).collect(),
            decorators: decorators.into_iter().map(|(_, c)| c).collect(),
        };
        self.clear();
    }

    /// Every component lookups can return, sorted by identifier
    pub fn components(&self) -> Candidates<Component> {
        self.universe.read().components.clone()
    }

    /// Enabled interceptors in invocation order
    pub fn interceptors(&self) -> Candidates<Component> {
        self.universe.read().interceptors.clone()
    }

    /// Enabled decorators in invocation order
    pub fn decorators(&self) -> Candidates<Component> {
        self.universe.read().decorators.clone()
    }

    /// Every component matching the lookup
    pub fn resolve(&self, resolvable: &Resolvable) -> Candidates<Component> {
        if let Some(cached) = self.candidates.get(resolvable) {
            tracing::trace!("Resolution cache hit for {resolvable}");
            return cached.clone();
        }

        let universe = self.components();
        let matching: Candidates<Component> = universe
            .iter()
            .filter(|c| self.matches(c, &resolvable.required, &resolvable.qualifiers))
            .cloned()
            .collect();

        self.candidates
            .entry(resolvable.clone())
            .or_insert(matching)
            .clone()
    }

    /// The single component satisfying the lookup
    pub fn resolve_unique(&self, resolvable: &Resolvable) -> Result<Arc<Component>, ResolutionError> {
        if let Some(cached) = self.unique.get(resolvable) {
            return cached.clone();
        }

        let candidates = self.resolve(resolvable);
        let result = disambiguate(&candidates).map_err(|candidates| match candidates.len() {
            0 => ResolutionError::Unsatisfied {
                required: resolvable.required.to_string(),
                qualifiers: resolvable.qualifier_names(),
            },
            _ => ResolutionError::Ambiguous {
                required: resolvable.required.to_string(),
                qualifiers: resolvable.qualifier_names(),
                candidates,
            },
        });

        self.unique
            .entry(resolvable.clone())
            .or_insert(result)
            .clone()
    }

    /// The single component with the name
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<Component>, ResolutionError> {
        if let Some(cached) = self.names.get(name) {
            return cached.clone();
        }

        let universe = self.components();
        let candidates = universe
            .iter()
            .filter(|c| c.attributes.name.as_deref() == Some(name))
            .cloned()
            .collect::<Vec<_>>();

        let result = disambiguate(&candidates).map_err(|candidates| match candidates.len() {
            0 => ResolutionError::Unsatisfied {
                required: format!("#{name}"),
                qualifiers: vec![],
            },
            _ => ResolutionError::Ambiguous {
                required: format!("#{name}"),
                qualifiers: vec![],
                candidates,
            },
        });

        self.names
            .entry(Arc::from(name))
            .or_insert(result)
            .clone()
    }

    /// Enabled decorators decorating a component with the given types and qualifiers
    pub fn resolve_decorators(
        &self,
        types: &BTreeSet<Type>,
        qualifiers: &QualifierSet,
    ) -> Vec<Arc<Component>> {
        self.decorators()
            .iter()
            .filter(|decorator| {
                let ComponentRole::Decorator(info) = &decorator.role else {
                    return false;
                };
                let delegate = &info.delegate;
                let bean_types = types.iter().cloned().collect::<Vec<_>>();
                matches_any(&*self.transformer, &delegate.required, &bean_types)
                    && delegate.qualifiers.is_subset(qualifiers)
            })
            .cloned()
            .collect()
    }

    /// Flushes all cached results
    pub fn clear(&self) {
        self.candidates.clear();
        self.unique.clear();
        self.names.clear();
    }

    fn matches(&self, component: &Component, required: &Type, qualifiers: &QualifierSet) -> bool {
        let bean_types = component.attributes.types.iter().cloned().collect::<Vec<_>>();
        matches_any(&*self.transformer, required, &bean_types)
            && qualifiers.is_subset(&component.attributes.qualifiers)
    }
}

/// Reduces candidates to a single winner
///
/// Alternatives win over other components, among alternatives the highest priority wins.
/// Returns the remaining candidates if there is no single winner.
pub fn disambiguate(candidates: &[Arc<Component>]) -> Result<Arc<Component>, Vec<ComponentIdentifier>> {
    match candidates {
        [] => return Err(vec![]),
        [single] => return Ok(single.clone()),
        _ => {}
    }

    let alternatives = candidates
        .iter()
        .filter(|c| c.attributes.alternative)
        .cloned()
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return Err(sorted_ids(candidates));
    }

    let highest = alternatives.iter().filter_map(|c| c.attributes.priority).max();
    let winners = alternatives
        .into_iter()
        .filter(|c| highest.is_none() || c.attributes.priority == highest)
        .collect::<Vec<_>>();

    match winners.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(sorted_ids(&winners)),
    }
}

fn sorted_ids(components: &[Arc<Component>]) -> Vec<ComponentIdentifier> {
    let mut ids = components.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
    ids.sort();
    ids
}

/// Components replaced by an enabled specializing component, transitively
fn specialized_components(
    components: &[Arc<Component>],
    enablement: &Enablement,
) -> BTreeSet<ComponentIdentifier> {
    let by_id = components
        .iter()
        .map(|c| (c.id.clone(), c))
        .collect::<HashMap<_, _>>();

    let mut specialized = BTreeSet::new();
    for component in components {
        if !enablement.is_alternative_enabled(component) {
            continue;
        }
        let mut next = component.specializes.clone();
        while let Some(target) = next {
            if !specialized.insert(target.clone()) {
                break;
            }
            next = by_id.get(&target).and_then(|c| c.specializes.clone());
        }
    }
    specialized
}
