//! Events fired to extensions during bootstrap and shutdown

use std::{mem, sync::Arc};

use crate::{
    bootstrap::Archive,
    component::{synthetic::SyntheticComponent, Component, ComponentAttributes, ComponentKind},
    context::Context,
    errors::{DefinitionError, DeploymentError, Problem, Problems},
    events::{extension::Extension, observer::ObserverMethod},
    ids::{ArchiveId, ComponentIdentifier},
    manager::BeanManager,
    metadata::{annotated::AnnotatedType, annotation::AnnotationDefinition},
    types::DynError,
};

/// An event delivered to every extension in order
pub trait LifecycleEvent {
    const NAME: &'static str;

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError>;

    fn problems_mut(&mut self) -> &mut Problems;

    /// The problem an extension failing on this event causes
    fn report(source_name: &str, error: &DynError) -> Problem {
        DefinitionError::Reported {
            source_name: source_name.to_string(),
            message: error.to_string(),
        }
        .into()
    }

    fn take_problems(&mut self) -> Problems {
        mem::take(self.problems_mut())
    }
}

/// First event, before any class is read
pub struct BeforeBeanDiscovery {
    default_archive: ArchiveId,
    pub(crate) annotations: Vec<AnnotationDefinition>,
    pub(crate) types: Vec<(ArchiveId, AnnotatedType)>,
    pub(crate) archives: Vec<Archive>,
    problems: Problems,
}

impl BeforeBeanDiscovery {
    pub(crate) fn new(default_archive: ArchiveId) -> Self {
        Self {
            default_archive,
            annotations: Vec::new(),
            types: Vec::new(),
            archives: Vec::new(),
            problems: Problems::new(),
        }
    }

    /// Declares a qualifier, scope, stereotype or interceptor binding
    pub fn add_annotation(&mut self, definition: AnnotationDefinition) {
        self.annotations.push(definition);
    }

    /// Adds a class to the first archive of the deployment
    pub fn add_annotated_type(&mut self, ty: AnnotatedType) {
        let archive = self.default_archive.clone();
        self.add_annotated_type_to(archive, ty);
    }

    pub fn add_annotated_type_to(&mut self, archive: ArchiveId, ty: AnnotatedType) {
        self.types.push((archive, ty));
    }

    /// Adds an archive to the deployment, its classes are discovered with the others
    ///
    /// Links may point to archives of the deployment and back, an id already in use extends
    /// that archive.
    pub fn add_archive(&mut self, archive: Archive) {
        self.archives.push(archive);
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for BeforeBeanDiscovery {
    const NAME: &'static str = "BeforeBeanDiscovery";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.before_bean_discovery(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Fired once every archive's classes are read
///
/// Alternatives, interceptors and decorators enabled here are enabled in every archive.
pub struct AfterTypeDiscovery {
    default_archive: ArchiveId,
    pub(crate) types: Vec<(ArchiveId, AnnotatedType)>,
    pub(crate) archives: Vec<Archive>,
    pub(crate) alternatives: Vec<Arc<str>>,
    pub(crate) interceptors: Vec<Arc<str>>,
    pub(crate) decorators: Vec<Arc<str>>,
    problems: Problems,
}

impl AfterTypeDiscovery {
    pub(crate) fn new(default_archive: ArchiveId) -> Self {
        Self {
            default_archive,
            types: Vec::new(),
            archives: Vec::new(),
            alternatives: Vec::new(),
            interceptors: Vec::new(),
            decorators: Vec::new(),
            problems: Problems::new(),
        }
    }

    pub fn add_annotated_type(&mut self, ty: AnnotatedType) {
        self.types.push((self.default_archive.clone(), ty));
    }

    /// Adds an archive whose classes are discovered right after this event
    pub fn add_archive(&mut self, archive: Archive) {
        self.archives.push(archive);
    }

    pub fn enable_alternative(&mut self, class_or_stereotype: impl AsRef<str>) {
        self.alternatives
            .push(Arc::from(class_or_stereotype.as_ref()));
    }

    pub fn enable_interceptor(&mut self, class: impl AsRef<str>) {
        self.interceptors.push(Arc::from(class.as_ref()));
    }

    pub fn enable_decorator(&mut self, class: impl AsRef<str>) {
        self.decorators.push(Arc::from(class.as_ref()));
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for AfterTypeDiscovery {
    const NAME: &'static str = "AfterTypeDiscovery";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.after_type_discovery(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Fired for every discovered class before it becomes a component
pub struct ProcessAnnotatedType {
    archive: ArchiveId,
    annotated_type: AnnotatedType,
    modified: bool,
    vetoed: bool,
    problems: Problems,
}

impl ProcessAnnotatedType {
    pub(crate) fn new(archive: ArchiveId, annotated_type: AnnotatedType) -> Self {
        Self {
            archive,
            annotated_type,
            modified: false,
            vetoed: false,
            problems: Problems::new(),
        }
    }

    pub fn archive(&self) -> &ArchiveId {
        &self.archive
    }

    pub fn annotated_type(&self) -> &AnnotatedType {
        &self.annotated_type
    }

    /// Replaces the class description used from now on
    pub fn set_annotated_type(&mut self, annotated_type: AnnotatedType) {
        self.annotated_type = annotated_type;
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The class is ignored by the container
    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }

    pub(crate) fn into_result(self) -> (Option<AnnotatedType>, Problems) {
        let ty = (!self.vetoed).then_some(self.annotated_type);
        (ty, self.problems)
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for ProcessAnnotatedType {
    const NAME: &'static str = "ProcessAnnotatedType";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.process_annotated_type(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Fired with the attributes of every component before it is created
pub struct ProcessBeanAttributes {
    component: ComponentIdentifier,
    kind: ComponentKind,
    attributes: ComponentAttributes,
    modified: bool,
    vetoed: bool,
    problems: Problems,
}

impl ProcessBeanAttributes {
    pub(crate) fn new(
        component: ComponentIdentifier,
        kind: ComponentKind,
        attributes: ComponentAttributes,
    ) -> Self {
        Self {
            component,
            kind,
            attributes,
            modified: false,
            vetoed: false,
            problems: Problems::new(),
        }
    }

    pub fn component(&self) -> &ComponentIdentifier {
        &self.component
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn attributes(&self) -> &ComponentAttributes {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: ComponentAttributes) {
        self.attributes = attributes;
        self.modified = true;
    }

    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }

    /// The attributes to use, None if vetoed
    pub(crate) fn into_result(self) -> (Option<ComponentAttributes>, Problems) {
        if self.modified {
            tracing::trace!("Attributes of {} replaced", self.component);
        }
        let attributes = (!self.vetoed).then_some(self.attributes);
        (attributes, self.problems)
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for ProcessBeanAttributes {
    const NAME: &'static str = "ProcessBeanAttributes";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.process_bean_attributes(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Fired for every component once it exists
pub struct ProcessBean {
    component: Arc<Component>,
    problems: Problems,
}

impl ProcessBean {
    pub(crate) fn new(component: Arc<Component>) -> Self {
        Self {
            component,
            problems: Problems::new(),
        }
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn kind(&self) -> ComponentKind {
        self.component.kind
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for ProcessBean {
    const NAME: &'static str = "ProcessBean";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.process_bean(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Last chance to add components, observers and contexts
pub struct AfterBeanDiscovery {
    default_archive: ArchiveId,
    pub(crate) components: Vec<(ArchiveId, SyntheticComponent)>,
    pub(crate) observers: Vec<ObserverMethod>,
    pub(crate) contexts: Vec<Arc<dyn Context>>,
    problems: Problems,
}

impl AfterBeanDiscovery {
    pub(crate) fn new(default_archive: ArchiveId) -> Self {
        Self {
            default_archive,
            components: Vec::new(),
            observers: Vec::new(),
            contexts: Vec::new(),
            problems: Problems::new(),
        }
    }

    /// The archive components and observers are added to by default
    pub fn default_archive(&self) -> &ArchiveId {
        &self.default_archive
    }

    pub fn add_bean(&mut self, component: SyntheticComponent) {
        self.components
            .push((self.default_archive.clone(), component));
    }

    pub fn add_bean_to(&mut self, archive: ArchiveId, component: SyntheticComponent) {
        self.components.push((archive, component));
    }

    pub fn add_observer(&mut self, observer: ObserverMethod) {
        self.observers.push(observer);
    }

    /// Registers the context of a custom scope
    pub fn add_context(&mut self, context: Arc<dyn Context>) {
        self.contexts.push(context);
    }

    pub fn add_definition_error(&mut self, error: DefinitionError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for AfterBeanDiscovery {
    const NAME: &'static str = "AfterBeanDiscovery";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.after_bean_discovery(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}

/// Fired after validation, the manager is fully usable
pub struct AfterDeploymentValidation {
    manager: BeanManager,
    problems: Problems,
}

impl AfterDeploymentValidation {
    pub(crate) fn new(manager: BeanManager) -> Self {
        Self {
            manager,
            problems: Problems::new(),
        }
    }

    pub fn manager(&self) -> &BeanManager {
        &self.manager
    }

    pub fn add_deployment_problem(&mut self, error: DeploymentError) {
        self.problems.push(error);
    }
}

impl LifecycleEvent for AfterDeploymentValidation {
    const NAME: &'static str = "AfterDeploymentValidation";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.after_deployment_validation(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }

    fn report(source_name: &str, error: &DynError) -> Problem {
        DeploymentError::Reported {
            source_name: source_name.to_string(),
            message: error.to_string(),
        }
        .into()
    }
}

/// Fired before the contexts are invalidated
pub struct BeforeShutdown {
    manager: BeanManager,
    problems: Problems,
}

impl BeforeShutdown {
    pub(crate) fn new(manager: BeanManager) -> Self {
        Self {
            manager,
            problems: Problems::new(),
        }
    }

    pub fn manager(&self) -> &BeanManager {
        &self.manager
    }
}

impl LifecycleEvent for BeforeShutdown {
    const NAME: &'static str = "BeforeShutdown";

    fn deliver(&mut self, extension: &dyn Extension) -> Result<(), DynError> {
        extension.before_shutdown(self)
    }

    fn problems_mut(&mut self) -> &mut Problems {
        &mut self.problems
    }
}
