use std::{fmt::Debug, sync::Arc};

use crate::{
    component::{Component, InjectionPoint},
    context::creational::CreationalContext,
    errors::{DefinitionError, InjectError},
    ids::{ArchiveId, ComponentIdentifier},
    manager::BeanManager,
    metadata::{
        annotated::MethodBody,
        builtin::{self, members},
        enhanced::EnhancedMethod,
        reflection::Type,
        store::MetaAnnotationStore,
    },
    resolution::qualifiers::QualifierSet,
    types::{DynError, Value},
};

/// Observers without `@Priority` are notified after those with a lower priority
pub const DEFAULT_OBSERVER_PRIORITY: i64 = 2500;

/// When an observer of a normal scoped component is notified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    /// Creates the declaring instance if needed
    Always,
    /// Only if the declaring instance already exists in the active context
    IfExists,
}

pub type NotifyFn = dyn Fn(&BeanManager, &Value) -> Result<(), DynError> + Send + Sync;

enum ObserverBody {
    Method {
        method: EnhancedMethod,
        /// Injected parameters, the event parameter excluded
        points: Vec<InjectionPoint>,
    },
    Synthetic(Arc<NotifyFn>),
}

/// Receives events of a type and qualifiers
pub struct ObserverMethod {
    pub id: ComponentIdentifier,
    pub archive: ArchiveId,
    pub declaring: Option<ComponentIdentifier>,
    pub observed_type: Type,
    /// Qualifiers of the observed parameter, an event needs all of them
    pub qualifiers: QualifierSet,
    pub reception: Reception,
    pub priority: i64,
    body: ObserverBody,
}

impl Debug for ObserverMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverMethod")
            .field("id", &self.id)
            .field("observed_type", &self.observed_type)
            .field("priority", &self.priority)
            .finish()
    }
}

impl ObserverMethod {
    /// Reads an observer method declared by a component
    pub fn from_method(
        store: &MetaAnnotationStore,
        declaring: &Component,
        method: &EnhancedMethod,
    ) -> Result<Self, DefinitionError> {
        let member = &method.member;
        let observed = member.parameters_annotated(builtin::OBSERVES);
        let [observed] = observed.as_slice() else {
            return Err(DefinitionError::ObservedParameters {
                member: member.qualified_name(),
                found: observed.len(),
            });
        };
        if !member.parameters_annotated(builtin::DISPOSES).is_empty() {
            return Err(DefinitionError::InvalidMember {
                member: member.qualified_name(),
                reason: "an observer cannot dispose".to_string(),
            });
        }
        if !matches!(member.body, MethodBody::Invoke(_)) {
            return Err(DefinitionError::InvalidMember {
                member: member.qualified_name(),
                reason: "observer methods need an invocable body".to_string(),
            });
        }

        let id = ComponentIdentifier::observer(&declaring.id, &member.signature());
        let reception = match observed
            .annotations
            .get(builtin::OBSERVES)
            .and_then(|o| o.member(members::RECEPTION))
            .and_then(|r| r.as_str())
        {
            Some(members::IF_EXISTS) => Reception::IfExists,
            _ => Reception::Always,
        };
        if reception == Reception::IfExists && declaring.attributes.is_dependent() {
            return Err(DefinitionError::InvalidMember {
                member: member.qualified_name(),
                reason: "dependent components cannot declare conditional observers".to_string(),
            });
        }

        let priority = observed
            .annotations
            .get(builtin::PRIORITY)
            .or_else(|| member.annotations.get(builtin::PRIORITY))
            .and_then(|p| p.value())
            .and_then(|v| v.as_int())
            .unwrap_or(DEFAULT_OBSERVER_PRIORITY);

        let qualifiers = observed
            .annotations
            .iter()
            .filter(|a| store.is_qualifier(&a.annotation_type))
            .map(|a| store.qualifier_instance(a))
            .collect();

        let points = member
            .parameters
            .iter()
            .filter(|p| p.position != observed.position)
            .map(|p| {
                InjectionPoint::parameter(store, &member.declaring, &member.qualified_name(), p)
                    .owned_by(&id)
            })
            .collect();

        Ok(Self {
            id,
            archive: declaring.archive.clone(),
            declaring: Some(declaring.id.clone()),
            observed_type: observed.ty.clone(),
            qualifiers,
            reception,
            priority,
            body: ObserverBody::Method {
                method: method.clone(),
                points,
            },
        })
    }

    /// An observer backed by a closure, registered by an extension
    pub fn synthetic(
        archive: &ArchiveId,
        name: &str,
        observed_type: Type,
        qualifiers: QualifierSet,
        priority: i64,
        notify: impl Fn(&BeanManager, &Value) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        let declaring = ComponentIdentifier::synthetic(archive, name);
        Self {
            id: ComponentIdentifier::observer(&declaring, &observed_type.to_string()),
            archive: archive.clone(),
            declaring: None,
            observed_type,
            qualifiers,
            reception: Reception::Always,
            priority,
            body: ObserverBody::Synthetic(Arc::new(notify)),
        }
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        match &self.body {
            ObserverBody::Method { points, .. } => points,
            ObserverBody::Synthetic(_) => &[],
        }
    }

    /// Delivers the event
    pub fn notify(&self, manager: &BeanManager, event: &Value) -> Result<(), InjectError> {
        match &self.body {
            ObserverBody::Synthetic(notify) => {
                notify(manager, event).map_err(|e| InjectError::callback(self.id.as_str(), e))
            }
            ObserverBody::Method { method, points } => {
                let cc = manager.create_creational_context(None);
                let result = self.notify_method(manager, method, points, event, &cc);
                cc.release();
                result
            }
        }
    }

    fn notify_method(
        &self,
        manager: &BeanManager,
        method: &EnhancedMethod,
        points: &[InjectionPoint],
        event: &Value,
        cc: &Arc<CreationalContext>,
    ) -> Result<(), InjectError> {
        let member = &method.member;
        let receiver = if member.modifiers.is_static {
            None
        } else {
            let declaring = self
                .declaring
                .as_ref()
                .and_then(|id| manager.component(id))
                .ok_or_else(|| InjectError::NullReference {
                    component: self.id.to_string(),
                })?;
            match self.reception {
                Reception::IfExists => {
                    let context = manager.context(&declaring.attributes.scope)?;
                    match context.get_if_exists(&declaring) {
                        Ok(Some(existing)) => existing.instance,
                        Ok(None) | Err(InjectError::ContextNotActive { .. }) => {
                            tracing::trace!("{} skipped, no instance exists", self.id);
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    }
                }
                Reception::Always => Some(manager.get_reference(&declaring, cc)?.instance()?),
            }
        };

        let mut injected = points.iter();
        let mut args = Vec::with_capacity(member.parameters.len());
        for parameter in &member.parameters {
            if parameter.annotations.contains(builtin::OBSERVES) {
                args.push(event.clone());
            } else if let Some(ip) = injected.next() {
                args.push(manager.get_injectable_reference(ip, cc)?.into_value());
            }
        }
        method.invoke(receiver.as_deref(), &args).map(|_| ())
    }
}
