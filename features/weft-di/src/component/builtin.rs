//! Components the container provides itself

use std::{any::Any, sync::Arc};

use crate::{
    component::{
        Component, ComponentAttributes, ComponentKind, ComponentRole, Producer, Product,
    },
    context::{creational::CreationalContext, ContextualInstance},
    errors::{InjectError, ResolutionError},
    ids::{ArchiveId, ComponentIdentifier},
    manager::{BeanManager, WeakManager},
    metadata::{annotation::Annotation, builtin, reflection::Type},
    reference::Reference,
    resolution::{
        qualifiers::{normalize_required_qualifiers, QualifierSet},
        resolvable::Resolvable,
    },
    types::value,
};

const ARCHIVE: &str = "weft";

fn built_in(name: &str, types: Vec<Type>, producer: Arc<dyn Producer>) -> Arc<Component> {
    Arc::new(Component {
        id: ComponentIdentifier::built_in(name),
        kind: ComponentKind::BuiltIn,
        archive: ArchiveId::new(ARCHIVE),
        role: ComponentRole::Plain,
        attributes: ComponentAttributes::built_in(types, builtin::DEPENDENT),
        class: None,
        injection_points: Vec::new(),
        proxyable: true,
        passivation_capable: true,
        normal_scoped: false,
        passivating_scope: false,
        specializes: None,
        declaring: None,
        producer,
    })
}

/// Components visible in every archive: the manager and injection point metadata
pub fn components() -> Vec<Arc<Component>> {
    vec![
        built_in(
            "BeanManager",
            vec![Type::class(builtin::BEAN_MANAGER)],
            Arc::new(BeanManagerProducer),
        ),
        built_in(
            "InjectionPoint",
            vec![Type::class(builtin::INJECTION_POINT)],
            Arc::new(InjectionPointProducer),
        ),
    ]
}

/// Component behind `Instance<T>` injection points
///
/// It is never part of resolution, `Instance<T>` matches with any qualifiers.
pub fn instance_component() -> Arc<Component> {
    built_in(
        "Instance",
        vec![Type::parameterized(
            builtin::INSTANCE,
            vec![Type::variable("T")],
        )],
        Arc::new(InstanceProducer),
    )
}

struct BeanManagerProducer;
impl Producer for BeanManagerProducer {
    fn produce(
        &self,
        _component: &Arc<Component>,
        manager: &BeanManager,
        _cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        Ok(Product::Shared(value(manager.clone())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Yields the injection point the requesting instance is injected into
struct InjectionPointProducer;
impl Producer for InjectionPointProducer {
    fn produce(
        &self,
        component: &Arc<Component>,
        _manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let requesting = cc
            .parent()
            .and_then(|parent| parent.injection_point())
            .cloned();
        match requesting {
            Some(ip) => Ok(Product::Shared(value(ip))),
            None => Err(InjectError::callback(
                component.id.to_string(),
                "InjectionPoint is only available to instances created for an injection point"
                    .into(),
            )),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct InstanceProducer;
impl Producer for InstanceProducer {
    fn produce(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
        cc: &Arc<CreationalContext>,
    ) -> Result<Product, InjectError> {
        let Some(ip) = cc.injection_point() else {
            return Err(InjectError::callback(
                component.id.to_string(),
                "Instance<T> requires an injection point".into(),
            ));
        };
        let required = ip.required.args().first().cloned().unwrap_or_else(Type::object);
        Ok(Product::Shared(value(Lookup::new(
            manager,
            required,
            ip.qualifiers.clone(),
            cc.clone(),
        ))))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Programmatic lookup, resolved on use instead of at injection
///
/// Dependent instances obtained through the lookup belong to the creational context of the
/// instance the lookup was injected into.
#[derive(Clone)]
pub struct Lookup {
    manager: WeakManager,
    required: Type,
    qualifiers: QualifierSet,
    cc: Arc<CreationalContext>,
}

impl Lookup {
    pub fn new(
        manager: &BeanManager,
        required: Type,
        qualifiers: QualifierSet,
        cc: Arc<CreationalContext>,
    ) -> Self {
        Self {
            manager: manager.downgrade(),
            required,
            qualifiers: normalize_required_qualifiers(qualifiers),
            cc,
        }
    }

    pub fn required(&self) -> &Type {
        &self.required
    }

    fn resolvable(&self) -> Resolvable {
        Resolvable::new(self.required.clone(), self.qualifiers.clone())
    }

    /// Narrows the lookup with more qualifiers
    pub fn select(&self, qualifiers: &[Annotation]) -> Result<Lookup, InjectError> {
        let manager = self.manager.upgrade()?;
        let mut narrowed = self.clone();
        let mut required: QualifierSet = self
            .qualifiers
            .iter()
            .filter(|q| !q.is(builtin::DEFAULT))
            .cloned()
            .collect();
        required.extend(qualifiers.iter().map(|q| manager.store().qualifier_instance(q)));
        narrowed.qualifiers = normalize_required_qualifiers(required);
        Ok(narrowed)
    }

    pub fn is_unsatisfied(&self) -> Result<bool, InjectError> {
        Ok(self.manager.upgrade()?.resolve(&self.resolvable()).is_empty())
    }

    pub fn is_ambiguous(&self) -> Result<bool, InjectError> {
        let manager = self.manager.upgrade()?;
        Ok(matches!(
            manager.resolve_unique(&self.resolvable()),
            Err(ResolutionError::Ambiguous { .. })
        ))
    }

    pub fn is_resolvable(&self) -> Result<bool, InjectError> {
        let manager = self.manager.upgrade()?;
        Ok(manager.resolve_unique(&self.resolvable()).is_ok())
    }

    /// Resolves the single matching component and returns a reference to it
    pub fn get(&self) -> Result<Reference, InjectError> {
        let manager = self.manager.upgrade()?;
        let component = manager.resolve_unique(&self.resolvable())?;
        manager.get_reference(&component, &self.cc)
    }

    /// References to every matching component, sorted by identifier
    pub fn all(&self) -> Result<Vec<Reference>, InjectError> {
        let manager = self.manager.upgrade()?;
        manager
            .resolve(&self.resolvable())
            .iter()
            .map(|component| manager.get_reference(component, &self.cc))
            .collect()
    }

    /// Destroys an instance obtained from this lookup
    ///
    /// Normal scoped instances are removed from their context, dependent instances are
    /// destroyed directly.
    pub fn destroy(&self, reference: &Reference) -> Result<(), InjectError> {
        let manager = self.manager.upgrade()?;
        match reference {
            Reference::Contextual(instance) if instance.component.attributes.is_dependent() => {
                instance.component.destroy(instance, &manager)
            }
            Reference::Contextual(ContextualInstance { component, .. })
            | Reference::Proxy { component, .. } => manager
                .context(&component.attributes.scope)?
                .destroy(component, &manager),
            Reference::Delegate(_) => Ok(()),
        }
    }
}
