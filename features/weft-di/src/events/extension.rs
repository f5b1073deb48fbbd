//! Extensions observe the container's bootstrap
//!
//! Every method defaults to doing nothing, an extension overrides the events it cares
//! about. Errors returned by an extension are collected as problems of the phase the
//! event belongs to, the phase still completes.

use std::sync::Arc;

use crate::{
    events::lifecycle::{
        AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, BeforeBeanDiscovery,
        BeforeShutdown, ProcessAnnotatedType, ProcessBean, ProcessBeanAttributes,
    },
    types::DynError,
};

/// Which discovered classes an extension wants [ProcessAnnotatedType] for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Nothing,
    /// Classes carrying any of the annotations
    Annotated(Vec<Arc<str>>),
    /// Classes assignable to the named class or interface
    Assignable(Arc<str>),
}

pub trait Extension: Send + Sync {
    /// Used in logs and to attribute problems
    fn name(&self) -> &str;

    fn annotated_type_filter(&self) -> TypeFilter {
        TypeFilter::All
    }

    fn before_bean_discovery(&self, _event: &mut BeforeBeanDiscovery) -> Result<(), DynError> {
        Ok(())
    }

    fn after_type_discovery(&self, _event: &mut AfterTypeDiscovery) -> Result<(), DynError> {
        Ok(())
    }

    fn process_annotated_type(&self, _event: &mut ProcessAnnotatedType) -> Result<(), DynError> {
        Ok(())
    }

    fn process_bean_attributes(
        &self,
        _event: &mut ProcessBeanAttributes,
    ) -> Result<(), DynError> {
        Ok(())
    }

    fn process_bean(&self, _event: &mut ProcessBean) -> Result<(), DynError> {
        Ok(())
    }

    fn after_bean_discovery(&self, _event: &mut AfterBeanDiscovery) -> Result<(), DynError> {
        Ok(())
    }

    fn after_deployment_validation(
        &self,
        _event: &mut AfterDeploymentValidation,
    ) -> Result<(), DynError> {
        Ok(())
    }

    fn before_shutdown(&self, _event: &mut BeforeShutdown) -> Result<(), DynError> {
        Ok(())
    }
}
