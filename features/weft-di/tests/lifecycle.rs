mod common;

use std::sync::Arc;

use common::{boot, builder, try_boot, Journal};
use parking_lot::Mutex;
use weft_di::{
    builtin, context::Context, errors::IllegalProductError, value, AnnotatedType, Archive,
    BootstrapError, Component, DeploymentError, InjectError, Method, MethodBody, Param, Reference,
    Type, Value,
};

struct Bar;

struct Foo {
    bar: Option<Reference>,
}

struct Cache;
struct Vault;
struct Blob;

fn bar(journal: &Journal) -> AnnotatedType {
    let destroyed = journal.clone();
    AnnotatedType::builder::<Bar>("Bar")
        .constructor(|| Bar)
        .pre_destroy("close", move |_: &Bar| {
            destroyed.record("bar destroyed");
            Ok(())
        })
        .build()
}

fn foo(journal: &Journal, scope: &str) -> AnnotatedType {
    let constructed = journal.clone();
    let injected = journal.clone();
    let initialized = journal.clone();
    let post_construct = journal.clone();
    let pre_destroy = journal.clone();
    AnnotatedType::builder::<Foo>("Foo")
        .marked(scope)
        .constructor(move || {
            constructed.record("construct");
            Foo { bar: None }
        })
        .inject_field("bar", Param::class("Bar"), move |foo: &mut Foo, bar| {
            injected.record("field");
            foo.bar = Some(bar);
        })
        .initializer("setup", vec![], move |_: &mut Foo, _| {
            initialized.record("initializer");
            Ok(())
        })
        .post_construct("init", move |foo: &Foo| {
            if foo.bar.is_none() {
                return Err("bar was not injected before post construct".into());
            }
            post_construct.record("post construct");
            Ok(())
        })
        .pre_destroy("close", move |_: &Foo| {
            pre_destroy.record("foo destroyed");
            Ok(())
        })
        .build()
}

#[test]
fn fields_are_injected_before_post_construct() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(bar(&journal))
            .with_class(foo(&journal, builtin::DEPENDENT)),
    );

    let foo = container.manager().select::<Arc<Foo>>(&[]).unwrap();
    assert!(foo.bar.as_ref().is_some_and(|bar| bar.get::<Bar>().is_ok()));
    assert_eq!(
        journal.entries(),
        ["construct", "field", "initializer", "post construct"]
    );
}

#[test]
fn destroying_twice_is_a_no_op() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(bar(&journal))
            .with_class(foo(&journal, builtin::APPLICATION_SCOPED)),
    );
    let manager = container.manager();

    let reference = manager.get::<Foo>(&[]).unwrap();
    assert!(reference.is_proxy());
    reference.instance().unwrap();
    let component = reference.component().unwrap().clone();
    let context = manager.context(builtin::APPLICATION_SCOPED).unwrap();
    assert!(context.get_if_exists(&component).unwrap().is_some());

    context.destroy(&component, manager).unwrap();
    assert!(context.get_if_exists(&component).unwrap().is_none());
    assert_eq!(journal.count("foo destroyed"), 1);
    // The dependent Bar is destroyed with its parent
    assert_eq!(journal.count("bar destroyed"), 1);

    context.destroy(&component, manager).unwrap();
    assert_eq!(journal.count("foo destroyed"), 1);

    // A new instance is created on next use
    reference.instance().unwrap();
    assert_eq!(journal.count("construct"), 2);
}

#[test]
fn shutdown_destroys_application_instances() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(bar(&journal))
            .with_class(foo(&journal, builtin::APPLICATION_SCOPED)),
    );
    container
        .manager()
        .get::<Foo>(&[])
        .unwrap()
        .instance()
        .unwrap();

    container.shutdown();
    assert_eq!(journal.count("foo destroyed"), 1);
    assert_eq!(journal.count("bar destroyed"), 1);
    assert!(!container.is_running());

    container.shutdown();
    assert_eq!(journal.count("foo destroyed"), 1);
}

type Handle = Arc<Mutex<Option<(Arc<dyn Context>, Arc<Component>)>>>;

/// An application scoped Cache whose pre destroy looks itself up in its context
fn self_observing_cache(journal: &Journal, handle: &Handle) -> AnnotatedType {
    let journal = journal.clone();
    let handle = handle.clone();
    AnnotatedType::builder::<Cache>("Cache")
        .marked(builtin::APPLICATION_SCOPED)
        .constructor(|| Cache)
        .pre_destroy("flush", move |_: &Cache| {
            let guard = handle.lock();
            let (context, component) = guard.as_ref().ok_or("handle not set")?;
            let present = context.get_if_exists(component)?.is_some();
            journal.record(format!("present during pre-destroy: {present}"));
            Ok(())
        })
        .build()
}

#[test]
fn instances_stay_in_their_context_during_pre_destroy() {
    let journal = Journal::new();
    let handle = Handle::default();
    let container = boot(Archive::new("app").with_class(self_observing_cache(&journal, &handle)));
    let manager = container.manager();

    let reference = manager.get::<Cache>(&[]).unwrap();
    reference.instance().unwrap();
    let component = reference.component().unwrap().clone();
    let context = manager.context(builtin::APPLICATION_SCOPED).unwrap();
    *handle.lock() = Some((context.clone(), component.clone()));

    context.destroy(&component, manager).unwrap();
    assert_eq!(journal.entries(), ["present during pre-destroy: true"]);
    assert!(context.get_if_exists(&component).unwrap().is_none());

    // Shutdown destroys the recreated instance the same way
    journal.clear();
    reference.instance().unwrap();
    container.shutdown();
    assert_eq!(journal.entries(), ["present during pre-destroy: true"]);
    assert!(!context.is_active());
}

#[test]
fn lookups_destroy_dependent_instances() {
    let journal = Journal::new();
    let container = boot(Archive::new("app").with_class(bar(&journal)));
    let lookup = container.manager().lookup(Type::class("Bar"), &[]);

    let instance = lookup.get().unwrap();
    assert!(!instance.is_proxy());
    lookup.destroy(&instance).unwrap();
    assert_eq!(journal.entries(), ["bar destroyed"]);
}

fn vault(returns: &str, scope: &str, produce: fn() -> Option<Value>) -> AnnotatedType {
    AnnotatedType::builder::<Vault>("Vault")
        .constructor(|| Vault)
        .method(
            Method::new("produce")
                .marked(builtin::PRODUCES)
                .marked(scope)
                .returns(Type::class(returns))
                .body(MethodBody::on(move |_: &Vault, _: &[Value]| Ok(produce()))),
        )
        .build()
}

fn token() -> AnnotatedType {
    AnnotatedType::declare("Token").make_interface().build()
}

#[test]
fn null_products_are_only_legal_for_dependent_producers() {
    let dependent = boot(
        Archive::new("app")
            .with_class(token())
            .with_class(vault("Token", builtin::DEPENDENT, || None)),
    );
    let product = dependent
        .manager()
        .lookup(Type::class("Token"), &[])
        .get()
        .unwrap();
    assert!(product.is_null());
    assert!(matches!(
        product.instance(),
        Err(InjectError::NullReference { .. })
    ));

    let scoped = boot(
        Archive::new("app")
            .with_class(token())
            .with_class(vault("Token", builtin::APPLICATION_SCOPED, || None)),
    );
    let product = scoped
        .manager()
        .lookup(Type::class("Token"), &[])
        .get()
        .unwrap();
    assert!(matches!(
        product.instance(),
        Err(InjectError::IllegalProduct(IllegalProductError::NullProduct { .. }))
    ));
}

#[test]
fn non_serializable_products_fail_in_passivating_scopes() {
    let container = boot(
        Archive::new("app")
            .with_class(
                AnnotatedType::declare("Payload")
                    .make_interface()
                    .serializable()
                    .build(),
            )
            .with_class(
                AnnotatedType::builder::<Blob>("Blob")
                    .implements(Type::class("Payload"))
                    .build(),
            )
            .with_class(vault("Payload", builtin::SESSION_SCOPED, || Some(value(Blob)))),
    );
    let manager = container.manager();
    manager.session().associate("s1");

    let payload = manager.lookup(Type::class("Payload"), &[]).get().unwrap();
    assert!(matches!(
        payload.instance(),
        Err(InjectError::IllegalProduct(
            IllegalProductError::NonSerializableProduct { .. }
        ))
    ));
    manager.session().dissociate();
}

#[test]
fn passivating_components_must_be_serializable() {
    let result = try_boot(
        builder("test").add_archive(
            Archive::new("app").with_class(
                AnnotatedType::builder::<Cache>("Cache")
                    .marked(builtin::SESSION_SCOPED)
                    .constructor(|| Cache)
                    .build(),
            ),
        ),
    );
    assert!(matches!(
        result,
        Err(BootstrapError::Deployment(
            DeploymentError::NotPassivationCapable { .. }
        ))
    ));

    let container = boot(
        Archive::new("app").with_class(
            AnnotatedType::builder::<Cache>("Cache")
                .marked(builtin::SESSION_SCOPED)
                .serializable()
                .constructor(|| Cache)
                .build(),
        ),
    );
    assert!(container.is_running());
}

#[test]
fn failing_callbacks_surface_as_callback_errors() {
    let container = boot(
        Archive::new("app").with_class(
            AnnotatedType::builder::<Cache>("Cache")
                .constructor(|| Cache)
                .post_construct("init", |_: &Cache| Err("cold cache".into()))
                .build(),
        ),
    );
    let Err(error) = container.manager().get::<Cache>(&[]) else {
        panic!("post construct failure must propagate")
    };
    assert!(matches!(error, InjectError::Callback { .. }));
    assert!(error.to_string().contains("cold cache"));
}
