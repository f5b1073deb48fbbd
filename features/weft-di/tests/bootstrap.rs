mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use common::{boot, builder, init_tracing, try_boot};
use weft_di::{
    builtin,
    component::synthetic::SyntheticComponent,
    errors::ResourceLoadingError,
    events::lifecycle::{
        AfterBeanDiscovery, AfterDeploymentValidation, AfterTypeDiscovery, BeforeBeanDiscovery,
        ProcessAnnotatedType,
    },
    AnnotatedType, Archive, ArchiveId, BootstrapError, ComponentKind, ContainerBuilder,
    ContainerConfiguration, ContainerInitiator, ContainerRegistry, ContainerState,
    DefinitionError, DeploymentDescriptor, DeploymentError, DeploymentId, DynError, Extension,
    Param, Problem, ServiceRegistry, StaticResourceLoader, Type, TypeFilter,
};

struct Alpha;
struct Beta;
struct Orphan;
struct Stray;
struct Chicken;
struct Egg;
struct Late;
struct Clock {
    tick: usize,
}

fn alpha() -> AnnotatedType {
    AnnotatedType::builder::<Alpha>("Alpha")
        .constructor(|| Alpha)
        .build()
}

fn beta() -> AnnotatedType {
    AnnotatedType::builder::<Beta>("Beta").constructor(|| Beta).build()
}

/// Two classes depending on a class nobody provides
fn broken_archive() -> Archive {
    Archive::new("app")
        .with_class(alpha())
        .with_class(
            AnnotatedType::builder::<Orphan>("Orphan")
                .inject_constructor(vec![Param::class("Nothing")], |_| Ok(Orphan))
                .build(),
        )
        .with_class(
            AnnotatedType::builder::<Stray>("Stray")
                .inject_constructor(vec![Param::class("Nowhere")], |_| Ok(Stray))
                .build(),
        )
}

fn descriptor(archive: Archive) -> DeploymentDescriptor {
    let mut descriptor = DeploymentDescriptor::new("test");
    descriptor.archives.push(archive);
    descriptor
}

fn registry() -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    registry.add::<Arc<dyn weft_di::ResourceLoader>>(Arc::new(StaticResourceLoader::new()));
    registry
}

#[test]
fn empty_deployments_are_not_booted() {
    init_tracing();
    let mut initiator = ContainerInitiator::new(ContainerConfiguration::sequential(), registry());
    let booted = initiator
        .initialize(descriptor(Archive::new("app")))
        .unwrap();
    assert!(!booted);
    assert_eq!(initiator.state(), ContainerState::Stopped);

    // The builder still hands out a container without components
    let container = try_boot(builder("empty")).unwrap();
    assert!(container.is_running());
    let manager = container.manager();
    assert!(manager.components().is_empty());

    // Built-in components are unlisted but still resolve
    let resolvable = manager.resolvable(Type::class(builtin::BEAN_MANAGER), &[]);
    let bean_manager = manager.resolve_unique(&resolvable).unwrap();
    assert_eq!(bean_manager.kind, ComponentKind::BuiltIn);
}

#[test]
fn a_resource_loader_is_required() {
    init_tracing();
    let mut initiator =
        ContainerInitiator::new(ContainerConfiguration::sequential(), ServiceRegistry::new());
    let result = initiator.initialize(descriptor(Archive::new("app").with_class(alpha())));
    assert!(matches!(result, Err(BootstrapError::MissingService { .. })));
}

#[test]
fn phases_run_in_order() {
    init_tracing();
    let mut initiator = ContainerInitiator::new(ContainerConfiguration::sequential(), registry());
    assert!(matches!(
        initiator.deploy_beans(),
        Err(BootstrapError::IllegalState { .. })
    ));

    initiator
        .start_container(descriptor(Archive::new("app").with_class(alpha())))
        .unwrap();
    assert_eq!(initiator.state(), ContainerState::Starting);
    assert!(matches!(
        initiator.validate_beans(),
        Err(BootstrapError::IllegalState { .. })
    ));
    initiator.start_initialization().unwrap();
    initiator.deploy_beans().unwrap();
    assert_eq!(initiator.state(), ContainerState::Deployed);
    initiator.validate_beans().unwrap();
    initiator.end_initialization().unwrap();
    assert_eq!(initiator.state(), ContainerState::Initialized);

    let container = weft_di::Container::new(initiator).unwrap();
    assert_eq!(container.manager().components().len(), 1);
    assert!(container.manager().select::<Arc<Alpha>>(&[]).is_ok());

    container.shutdown();
    assert_eq!(container.state(), ContainerState::Shutdown);
}

#[test]
fn deployment_problems_are_reported_together() {
    let Err(error) = try_boot(builder("test").add_archive(broken_archive())) else {
        panic!("unsatisfied dependencies must fail the bootstrap")
    };
    assert!(matches!(error, BootstrapError::Problems(_)));

    let problems = error.problems();
    assert_eq!(problems.len(), 2);
    assert!(problems.iter().all(|p| matches!(
        p,
        Problem::Deployment(DeploymentError::UnsatisfiedDependency { .. })
    )));
    assert!(error.to_string().contains("Nothing"));
    assert!(error.to_string().contains("Nowhere"));
}

#[test]
fn parallel_and_sequential_deployments_agree() {
    let parallel = || {
        ContainerConfiguration::default()
            .with_concurrent_deployment(true)
            .with_executor_threads(4)
    };
    let archive = || {
        Archive::new("app")
            .with_class(alpha())
            .with_class(beta())
            .with_class(
                AnnotatedType::builder::<Orphan>("Orphan")
                    .inject_constructor(vec![Param::class("Alpha")], |_| Ok(Orphan))
                    .build(),
            )
    };

    let sequential = try_boot(builder("sequential").add_archive(archive())).unwrap();
    let concurrent = try_boot(
        ContainerBuilder::new("concurrent")
            .configuration(parallel())
            .add_archive(archive()),
    )
    .unwrap();
    let ids = |container: &weft_di::Container| {
        container
            .manager()
            .components()
            .iter()
            .map(|c| c.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&sequential), ids(&concurrent));

    let sequential = try_boot(builder("sequential").add_archive(broken_archive())).unwrap_err();
    let concurrent = try_boot(
        ContainerBuilder::new("concurrent")
            .configuration(parallel())
            .add_archive(broken_archive()),
    )
    .unwrap_err();
    assert_eq!(sequential.problems(), concurrent.problems());
}

#[test]
fn dependent_cycles_fail_validation() {
    let result = try_boot(
        builder("test").add_archive(
            Archive::new("app")
                .with_class(
                    AnnotatedType::builder::<Chicken>("Chicken")
                        .inject_constructor(vec![Param::class("Egg")], |_| Ok(Chicken))
                        .build(),
                )
                .with_class(
                    AnnotatedType::builder::<Egg>("Egg")
                        .inject_constructor(vec![Param::class("Chicken")], |_| Ok(Egg))
                        .build(),
                ),
        ),
    );
    let Err(error) = result else {
        panic!("a dependent cycle must fail the bootstrap")
    };
    assert!(error.problems().iter().any(|p| matches!(
        p,
        Problem::Deployment(DeploymentError::PseudoScopedCycle { .. })
    )));
}

#[test]
fn normal_scopes_break_dependency_cycles() {
    let container = boot(
        Archive::new("app")
            .with_class(
                AnnotatedType::builder::<Chicken>("Chicken")
                    .marked(builtin::APPLICATION_SCOPED)
                    .inject_constructor(vec![Param::class("Egg")], |_| Ok(Chicken))
                    .build(),
            )
            .with_class(
                AnnotatedType::builder::<Egg>("Egg")
                    .inject_constructor(vec![Param::class("Chicken")], |_| Ok(Egg))
                    .build(),
            ),
    );
    assert!(container.manager().select::<Arc<Egg>>(&[]).is_ok());
}

#[test]
fn missing_classes_are_skipped_unless_discovery_is_strict() {
    let archive = || Archive::new("app").with_class(alpha()).with_class_name("Missing");

    let lenient = try_boot(builder("lenient").add_archive(archive())).unwrap();
    assert_eq!(lenient.manager().components().len(), 1);

    let strict = try_boot(
        ContainerBuilder::new("strict")
            .configuration(ContainerConfiguration::sequential().with_strict_discovery(true))
            .add_archive(archive()),
    );
    assert!(matches!(
        strict,
        Err(BootstrapError::ResourceLoading(
            ResourceLoadingError::ClassNotFound { ref name }
        )) if name == "Missing"
    ));
}

#[test]
fn classes_load_through_the_resource_loader() {
    let loader = StaticResourceLoader::new();
    loader.add_class(beta());
    let container = try_boot(
        builder("test")
            .resource_loader(loader)
            .add_archive(Archive::new("app").with_class_name("Beta")),
    )
    .unwrap();
    assert!(container.manager().select::<Arc<Beta>>(&[]).is_ok());
}

/// Vetoes marked classes, adds a clock and counts validations
#[derive(Clone, Default)]
struct Curator {
    seen: Arc<AtomicUsize>,
    validated: Arc<AtomicUsize>,
}

impl Extension for Curator {
    fn name(&self) -> &str {
        "curator"
    }

    fn annotated_type_filter(&self) -> TypeFilter {
        TypeFilter::Annotated(vec![Arc::from("Vetoed")])
    }

    fn process_annotated_type(&self, event: &mut ProcessAnnotatedType) -> Result<(), DynError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        event.veto();
        Ok(())
    }

    fn after_bean_discovery(&self, event: &mut AfterBeanDiscovery) -> Result<(), DynError> {
        event.add_bean(SyntheticComponent::from_instance(Clock { tick: 7 }));
        Ok(())
    }

    fn after_deployment_validation(
        &self,
        _: &mut AfterDeploymentValidation,
    ) -> Result<(), DynError> {
        self.validated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn extensions_shape_the_deployment() {
    let curator = Curator::default();
    let container = try_boot(
        builder("test").add_extension(curator.clone()).add_archive(
            Archive::new("app").with_class(alpha()).with_class(
                AnnotatedType::builder::<Beta>("Beta")
                    .marked("Vetoed")
                    .constructor(|| Beta)
                    .build(),
            ),
        ),
    )
    .unwrap();
    let manager = container.manager();

    assert_eq!(curator.seen.load(Ordering::SeqCst), 1);
    assert!(manager.select::<Arc<Beta>>(&[]).is_err());
    assert!(manager.select::<Arc<Alpha>>(&[]).is_ok());

    let clock = manager.select::<Arc<Clock>>(&[]).unwrap();
    assert_eq!(clock.tick, 7);
    let again = manager.select::<Arc<Clock>>(&[]).unwrap();
    assert!(Arc::ptr_eq(&clock, &again));
    assert_eq!(curator.validated.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_deployments_skip_validation_observers() {
    let curator = Curator::default();
    let result = try_boot(
        builder("test")
            .add_extension(curator.clone())
            .add_archive(broken_archive()),
    );
    assert!(result.is_err());
    assert_eq!(curator.validated.load(Ordering::SeqCst), 0);
}

/// Brings in a plugin archive linked back to "app", then a late archive on top of it
struct Plugins;

impl Extension for Plugins {
    fn name(&self) -> &str {
        "plugins"
    }

    fn before_bean_discovery(&self, event: &mut BeforeBeanDiscovery) -> Result<(), DynError> {
        event.add_archive(Archive::new("plugin").accessing("app").with_class(beta()));
        Ok(())
    }

    fn after_type_discovery(&self, event: &mut AfterTypeDiscovery) -> Result<(), DynError> {
        event.add_archive(
            Archive::new("late").accessing("plugin").with_class(
                AnnotatedType::builder::<Late>("Late")
                    .constructor(|| Late)
                    .build(),
            ),
        );
        Ok(())
    }
}

#[test]
fn extensions_add_archives_with_cyclic_links() {
    let container = try_boot(
        builder("test")
            .add_extension(Plugins)
            .add_archive(Archive::new("app").accessing("plugin").with_class(alpha())),
    )
    .unwrap();
    let manager = |id: &str| container.manager_for(&ArchiveId::new(id)).unwrap();

    let app = manager("app");
    assert!(app.select::<Arc<Alpha>>(&[]).is_ok());
    assert!(app.select::<Arc<Beta>>(&[]).is_ok());
    assert!(app.select::<Arc<Late>>(&[]).is_err());

    let plugin = manager("plugin");
    assert!(plugin.select::<Arc<Alpha>>(&[]).is_ok());
    assert!(plugin.select::<Arc<Beta>>(&[]).is_ok());

    // Reaches "app" through "plugin"
    let late = manager("late");
    let mut names = late
        .components()
        .iter()
        .map(|c| c.class_name())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, ["Alpha", "Beta", "Late"]);
}

struct Failing;

impl Extension for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn before_bean_discovery(&self, _: &mut BeforeBeanDiscovery) -> Result<(), DynError> {
        Err("refusing to start".into())
    }
}

#[test]
fn failing_extensions_abort_the_bootstrap() {
    let result = try_boot(
        builder("test")
            .add_extension(Failing)
            .add_archive(Archive::new("app").with_class(alpha())),
    );
    let Err(BootstrapError::Definition(DefinitionError::Reported {
        source_name,
        message,
    })) = result
    else {
        panic!("the extension failure must be reported")
    };
    assert_eq!(source_name, "failing");
    assert_eq!(message, "refusing to start");
}

#[test]
fn containers_do_not_share_instances() {
    let archive = || {
        Archive::new("app").with_class(
            AnnotatedType::builder::<Alpha>("Alpha")
                .marked(builtin::APPLICATION_SCOPED)
                .constructor(|| Alpha)
                .build(),
        )
    };
    let first = try_boot(builder("first").add_archive(archive())).unwrap();
    let second = try_boot(builder("second").add_archive(archive())).unwrap();

    let a = first.manager().get::<Alpha>(&[]).unwrap().get::<Alpha>().unwrap();
    let b = second.manager().get::<Alpha>(&[]).unwrap().get::<Alpha>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    first.shutdown();
    assert!(!first.is_running());
    assert!(second.is_running());
    assert!(second.manager().select::<Arc<Alpha>>(&[]).is_ok());
}

#[test]
fn registries_track_containers_by_deployment() {
    let registry = ContainerRegistry::new();
    let first = try_boot(builder("first").add_archive(Archive::new("app").with_class(alpha())))
        .unwrap();
    registry.register(first.clone()).unwrap();
    assert!(matches!(
        registry.register(first.clone()),
        Err(BootstrapError::DuplicateDeployment(_))
    ));

    let second = try_boot(builder("second").add_archive(Archive::new("app").with_class(beta())))
        .unwrap();
    registry.register(second.clone()).unwrap();
    assert_eq!(
        registry.ids(),
        [DeploymentId::new("first"), DeploymentId::new("second")]
    );
    assert!(registry.get(&DeploymentId::new("first")).is_some());

    assert!(registry.shutdown(&DeploymentId::new("first")));
    assert!(!first.is_running());
    assert!(!registry.shutdown(&DeploymentId::new("first")));

    registry.shutdown_all();
    assert!(registry.is_empty());
    assert!(!second.is_running());
}

#[test]
fn archives_only_see_what_they_access() {
    let container = try_boot(
        builder("test")
            .add_archive(Archive::new("web").with_class(alpha()).accessing("lib"))
            .add_archive(Archive::new("lib").with_class(beta())),
    )
    .unwrap();

    let web = container.manager_for(&ArchiveId::new("web")).unwrap();
    assert!(web.select::<Arc<Alpha>>(&[]).is_ok());
    assert!(web.select::<Arc<Beta>>(&[]).is_ok());

    let lib = container.manager_for(&ArchiveId::new("lib")).unwrap();
    assert!(lib.select::<Arc<Beta>>(&[]).is_ok());
    assert!(lib.select::<Arc<Alpha>>(&[]).is_err());
}
