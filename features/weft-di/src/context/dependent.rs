use std::{any::Any, sync::Arc};

use crate::{
    component::Component,
    context::{creational::CreationalContext, Context, ContextualInstance},
    errors::InjectError,
    manager::BeanManager,
    metadata::builtin,
};

/// Every lookup creates a new instance, owned by whoever asked for it
///
/// Instances created through [Context::get] get their own creational context;
/// injection creates dependents in the injecting instance's context instead.
#[derive(Debug, Default)]
pub struct DependentContext;

impl Context for DependentContext {
    fn scope(&self) -> &str {
        builtin::DEPENDENT
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get(
        &self,
        component: &Arc<Component>,
        manager: &BeanManager,
    ) -> Result<ContextualInstance, InjectError> {
        let cc = CreationalContext::new(manager, Some(component.clone()));
        component.create(manager, &cc)
    }

    fn get_if_exists(
        &self,
        _component: &Arc<Component>,
    ) -> Result<Option<ContextualInstance>, InjectError> {
        Ok(None)
    }

    fn destroy(&self, _component: &Arc<Component>, _manager: &BeanManager) -> Result<(), InjectError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
