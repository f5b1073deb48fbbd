mod common;

use std::sync::Arc;

use common::{boot, builder, try_boot};
use weft_di::{
    builtin, errors::ResolutionError, metadata::annotation::AnnotationValue, AnnotatedType,
    Annotation, AnnotationDefinition, Archive, ArchiveId, BootstrapError, ComponentIdentifier,
    DeploymentError, InjectError, Lazy, Param, Problem, Type,
};

struct Alpha;
struct Beta;
struct Card;
struct Cash;
struct Service;
struct MockService;
struct Lemonade;
struct Cola;
struct Checkout;

fn payment() -> AnnotatedType {
    AnnotatedType::declare("Payment").make_interface().build()
}

fn card() -> AnnotatedType {
    AnnotatedType::builder::<Card>("Card")
        .implements(Type::class("Payment"))
        .constructor(|| Card)
        .build()
}

fn cash() -> AnnotatedType {
    AnnotatedType::builder::<Cash>("Cash")
        .implements(Type::class("Payment"))
        .constructor(|| Cash)
        .build()
}

fn id(class: &str) -> ComponentIdentifier {
    ComponentIdentifier::managed(&ArchiveId::new("app"), class)
}

#[test]
fn repeated_resolution_returns_the_same_component() {
    let container = boot(
        Archive::new("app")
            .with_class(AnnotatedType::builder::<Alpha>("Alpha").constructor(|| Alpha).build())
            .with_class(AnnotatedType::builder::<Beta>("Beta").constructor(|| Beta).build()),
    );
    let manager = container.manager();
    let alpha = manager.resolvable(Type::class("Alpha"), &[]);
    let beta = manager.resolvable(Type::class("Beta"), &[]);

    let first = manager.resolve_unique(&alpha).unwrap();
    assert_eq!(first.id, id("Alpha"));
    for _ in 0..10 {
        assert!(Arc::ptr_eq(&first, &manager.resolve_unique(&alpha).unwrap()));
        assert_eq!(manager.resolve_unique(&beta).unwrap().id, id("Beta"));
    }

    let candidates = manager.resolve(&alpha);
    assert!(Arc::ptr_eq(&candidates, &manager.resolve(&alpha)));
}

#[test]
fn identical_contracts_are_ambiguous() {
    let container = boot(
        Archive::new("app")
            .with_class(payment())
            .with_class(card())
            .with_class(cash()),
    );
    let manager = container.manager();
    let resolvable = manager.resolvable(Type::class("Payment"), &[]);

    let error = manager.resolve_unique(&resolvable).unwrap_err();
    assert!(matches!(error, ResolutionError::Ambiguous { .. }));
    assert_eq!(error.candidates(), &[id("Card"), id("Cash")]);
    assert_eq!(manager.resolve(&resolvable).len(), 2);

    let lookup = manager.lookup(Type::class("Payment"), &[]);
    assert!(lookup.is_ambiguous().unwrap());
    assert_eq!(lookup.all().unwrap().len(), 2);
}

#[test]
fn unknown_contracts_are_unsatisfied() {
    let container = boot(Archive::new("app").with_class(card()));
    let manager = container.manager();

    let error = manager
        .resolve_unique(&manager.resolvable(Type::class("Nothing"), &[]))
        .unwrap_err();
    assert!(matches!(error, ResolutionError::Unsatisfied { .. }));
    assert!(error.candidates().is_empty());

    let missing = manager.select::<Option<Arc<Alpha>>>(&[]).unwrap();
    assert!(missing.is_none());
}

#[test]
fn specialization_replaces_the_specialized_component() {
    let container = boot(
        Archive::new("app")
            .with_class(
                AnnotatedType::builder::<Service>("Service")
                    .annotate(Annotation::named("service"))
                    .constructor(|| Service)
                    .build(),
            )
            .with_class(
                AnnotatedType::builder::<MockService>("MockService")
                    .extends(Type::class("Service"))
                    .marked(builtin::SPECIALIZES)
                    .constructor(|| MockService)
                    .build(),
            ),
    );
    let manager = container.manager();

    let service = manager
        .resolve_unique(&manager.resolvable(Type::class("Service"), &[]))
        .unwrap();
    assert_eq!(service.id, id("MockService"));
    assert_eq!(service.specializes, Some(id("Service")));

    // The name and qualifiers are inherited
    let named = manager.resolve_by_name("service").unwrap();
    assert_eq!(named.id, id("MockService"));
    let qualified = manager
        .resolve_unique(&manager.resolvable(Type::class("Service"), &[Annotation::named("service")]))
        .unwrap();
    assert_eq!(qualified.id, id("MockService"));

    assert!(manager.components().iter().all(|c| c.id != id("Service")));
}

#[test]
fn nonbinding_members_do_not_affect_matching() {
    let flavor = |value: &str, note: &str| {
        Annotation::marker("Flavor")
            .with(builtin::members::VALUE, AnnotationValue::str(value))
            .with("note", AnnotationValue::str(note))
    };
    let container = try_boot(
        builder("test")
            .add_annotation(AnnotationDefinition::qualifier("Flavor").nonbinding("note"))
            .add_archive(
                Archive::new("app")
                    .with_class(
                        AnnotatedType::builder::<Lemonade>("Lemonade")
                            .annotate(flavor("sour", "fresh"))
                            .constructor(|| Lemonade)
                            .build(),
                    )
                    .with_class(
                        AnnotatedType::builder::<Cola>("Cola")
                            .annotate(flavor("sweet", "fizzy"))
                            .constructor(|| Cola)
                            .build(),
                    ),
            ),
    )
    .unwrap();
    let manager = container.manager();

    let sour = manager
        .resolve_unique(&manager.resolvable(Type::object(), &[flavor("sour", "anything")]))
        .unwrap();
    assert_eq!(sour.id, id("Lemonade"));

    let sweet = manager
        .resolve_unique(&manager.resolvable(Type::object(), &[flavor("sweet", "fresh")]))
        .unwrap();
    assert_eq!(sweet.id, id("Cola"));

    let bitter = manager.resolve(&manager.resolvable(Type::object(), &[flavor("bitter", "fresh")]));
    assert!(bitter.is_empty());

    // Without qualifiers only @Default components match
    assert!(manager
        .resolve(&manager.resolvable(Type::class("Lemonade"), &[]))
        .is_empty());
    assert!(manager
        .select::<Arc<Lemonade>>(&[flavor("sour", "")])
        .is_ok());
}

#[test]
fn priority_alternative_wins_the_resolution() {
    let container = boot(
        Archive::new("app")
            .with_class(payment())
            .with_class(card())
            .with_class(
                AnnotatedType::builder::<Cash>("Cash")
                    .implements(Type::class("Payment"))
                    .marked(builtin::ALTERNATIVE)
                    .annotate(Annotation::priority(10))
                    .constructor(|| Cash)
                    .build(),
            ),
    );
    let manager = container.manager();
    let winner = manager
        .resolve_unique(&manager.resolvable(Type::class("Payment"), &[]))
        .unwrap();
    assert_eq!(winner.id, id("Cash"));
}

#[test]
fn alternatives_are_invisible_unless_enabled() {
    let alternative = || {
        AnnotatedType::builder::<Cash>("Cash")
            .implements(Type::class("Payment"))
            .marked(builtin::ALTERNATIVE)
            .constructor(|| Cash)
            .build()
    };

    let disabled = boot(Archive::new("app").with_class(payment()).with_class(alternative()));
    let manager = disabled.manager();
    assert!(manager
        .resolve(&manager.resolvable(Type::class("Payment"), &[]))
        .is_empty());

    let enabled = boot(
        Archive::new("app")
            .with_class(payment())
            .with_class(card())
            .with_class(alternative())
            .enabling(weft_di::Enablement::new().alternative("Cash")),
    );
    let manager = enabled.manager();
    let winner = manager
        .resolve_unique(&manager.resolvable(Type::class("Payment"), &[]))
        .unwrap();
    assert_eq!(winner.id, id("Cash"));
}

#[test]
fn components_resolve_by_name() {
    let container = boot(
        Archive::new("app")
            .with_class(
                AnnotatedType::builder::<Alpha>("Alpha")
                    .annotate(Annotation::named("first"))
                    .constructor(|| Alpha)
                    .build(),
            )
            .with_class(AnnotatedType::builder::<Beta>("Beta").constructor(|| Beta).build()),
    );
    let manager = container.manager();

    assert_eq!(manager.resolve_by_name("first").unwrap().id, id("Alpha"));
    assert!(matches!(
        manager.resolve_by_name("second"),
        Err(ResolutionError::Unsatisfied { .. })
    ));
}

#[test]
fn duplicate_names_fail_validation() {
    let named = |name: &str| Annotation::named(name);
    let result = try_boot(
        builder("test").add_archive(
            Archive::new("app")
                .with_class(
                    AnnotatedType::builder::<Alpha>("Alpha")
                        .annotate(named("twin"))
                        .constructor(|| Alpha)
                        .build(),
                )
                .with_class(
                    AnnotatedType::builder::<Beta>("Beta")
                        .annotate(named("twin"))
                        .constructor(|| Beta)
                        .build(),
                ),
        ),
    );

    let Err(error) = result else {
        panic!("duplicate names must fail")
    };
    assert!(error.problems().iter().any(|p| matches!(
        p,
        Problem::Deployment(DeploymentError::AmbiguousName { name, .. }) if name == "twin"
    )));
}

#[test]
fn injection_points_are_validated_at_bootstrap() {
    let result = try_boot(
        builder("test").add_archive(
            Archive::new("app")
                .with_class(payment())
                .with_class(card())
                .with_class(cash())
                .with_class(
                    AnnotatedType::builder::<Checkout>("Checkout")
                        .inject_constructor(vec![Param::class("Payment")], |_| Ok(Checkout))
                        .build(),
                ),
        ),
    );

    assert!(matches!(
        result,
        Err(BootstrapError::Deployment(
            DeploymentError::AmbiguousDependency { .. }
        ))
    ));
}

#[test]
fn lazy_handles_resolve_on_first_access() {
    let container = boot(
        Archive::new("app")
            .with_class(AnnotatedType::builder::<Alpha>("Alpha").constructor(|| Alpha).build()),
    );
    let manager = container.manager();

    let lazy = manager.select::<Lazy<Alpha>>(&[]).unwrap();
    assert!(!lazy.is_resolved());
    assert!(lazy.get().is_ok());
    assert!(lazy.is_resolved());

    let missing = manager.select::<Lazy<Beta>>(&[]).unwrap();
    assert!(matches!(
        missing.get(),
        Err(InjectError::Resolution(ResolutionError::Unsatisfied { .. }))
    ));
}
