mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use common::{boot, text, try_boot, Journal};
use parking_lot::Mutex;
use weft_di::{
    builtin,
    context::{scope_qualifier, Context, ScopeTransition},
    value, AnnotatedType, Archive, ContainerBuilder, ContainerConfiguration, InjectError, Method,
    MethodBody, Param, Reference, Type, Value,
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

struct Counter {
    id: usize,
}

struct Cart {
    items: Mutex<Vec<String>>,
}

struct Wizard {
    step: AtomicUsize,
}

struct Watcher;

struct Greeter {
    locale: Option<Reference>,
}

struct Locale;

fn counter(journal: &Journal) -> AnnotatedType {
    let destroyed = journal.clone();
    AnnotatedType::builder::<Counter>("Counter")
        .marked(builtin::REQUEST_SCOPED)
        .constructor(|| Counter {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        })
        .pre_destroy("close", move |_: &Counter| {
            destroyed.record("counter destroyed");
            Ok(())
        })
        .build()
}

fn cart(journal: &Journal) -> AnnotatedType {
    let destroyed = journal.clone();
    AnnotatedType::builder::<Cart>("Cart")
        .marked(builtin::SESSION_SCOPED)
        .serializable()
        .constructor(|| Cart {
            items: Mutex::new(Vec::new()),
        })
        .business("add", |cart: &Cart, args: &[Value]| {
            let item = args
                .first()
                .and_then(|a| a.downcast_ref::<String>())
                .ok_or("add takes a String")?;
            cart.items.lock().push(item.clone());
            Ok(None)
        })
        .business("size", |cart: &Cart, _: &[Value]| {
            Ok(Some(value(cart.items.lock().len())))
        })
        .pre_destroy("close", move |_: &Cart| {
            destroyed.record("cart destroyed");
            Ok(())
        })
        .build()
}

fn wizard(journal: &Journal) -> AnnotatedType {
    let destroyed = journal.clone();
    AnnotatedType::builder::<Wizard>("Wizard")
        .marked(builtin::CONVERSATION_SCOPED)
        .serializable()
        .constructor(|| Wizard {
            step: AtomicUsize::new(0),
        })
        .business("next", |wizard: &Wizard, _: &[Value]| {
            Ok(Some(value(wizard.step.fetch_add(1, Ordering::SeqCst) + 1)))
        })
        .pre_destroy("close", move |_: &Wizard| {
            destroyed.record("wizard destroyed");
            Ok(())
        })
        .build()
}

/// Records every scope event as `<scope> <transition> <payload>`
fn watcher(journal: &Journal) -> AnnotatedType {
    let mut builder = AnnotatedType::builder::<Watcher>("Watcher").constructor(|| Watcher);
    let scopes = [
        ("request", builtin::REQUEST_SCOPED),
        ("session", builtin::SESSION_SCOPED),
        ("conversation", builtin::CONVERSATION_SCOPED),
    ];
    for (label, scope) in scopes {
        for (transition, name) in [
            (ScopeTransition::Initialized, "initialized"),
            (ScopeTransition::Destroyed, "destroyed"),
        ] {
            let journal = journal.clone();
            builder = builder.method(
                Method::new(format!("on_{label}_{name}"))
                    .param(
                        Param::new(Type::object())
                            .observes()
                            .annotate(scope_qualifier(transition, scope)),
                    )
                    .body(MethodBody::on(move |_: &Watcher, args: &[Value]| {
                        let payload = args
                            .first()
                            .and_then(|a| a.downcast_ref::<String>())
                            .cloned()
                            .unwrap_or_default();
                        let entry = match label {
                            "request" => format!("{label} {name}"),
                            _ => format!("{label} {name} {payload}"),
                        };
                        journal.record(entry);
                        Ok(None)
                    })),
            );
        }
    }
    builder.build()
}

fn size(reference: &Reference) -> usize {
    let result = reference.invoke("size", vec![]).unwrap().unwrap();
    *result.downcast_ref::<usize>().unwrap()
}

#[test]
fn request_instances_live_as_long_as_the_request() {
    let journal = Journal::new();
    let container = boot(Archive::new("app").with_class(counter(&journal)));
    let manager = container.manager();
    let reference = manager.get::<Counter>(&[]).unwrap();
    assert!(reference.is_proxy());

    assert!(matches!(
        reference.instance(),
        Err(InjectError::ContextNotActive { .. })
    ));

    assert!(manager.request().activate());
    assert!(!manager.request().activate());
    let first = reference.get::<Counter>().unwrap();
    assert!(Arc::ptr_eq(&first, &reference.get::<Counter>().unwrap()));
    manager.request().deactivate(manager);
    assert_eq!(journal.count("counter destroyed"), 1);

    manager.request().activate();
    let second = reference.get::<Counter>().unwrap();
    assert_ne!(first.id, second.id);
    manager.request().deactivate(manager);
    assert_eq!(journal.count("counter destroyed"), 2);
}

#[test]
fn requests_are_bound_to_their_thread() {
    let journal = Journal::new();
    let container = boot(Archive::new("app").with_class(counter(&journal)));
    let manager = container.manager().clone();
    manager.request().activate();
    let here = manager.select::<Arc<Counter>>(&[]).unwrap();

    let other = manager.clone();
    let there = thread::spawn(move || {
        let outside = other.select::<Arc<Counter>>(&[]);
        assert!(matches!(outside, Err(InjectError::ContextNotActive { .. })));

        other.request().activate();
        let inside = other.select::<Arc<Counter>>(&[]).unwrap();
        other.request().deactivate(&other);
        inside.id
    })
    .join()
    .unwrap();

    assert_ne!(here.id, there);
    manager.request().deactivate(&manager);
}

#[test]
fn scope_transitions_are_observable() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(counter(&journal))
            .with_class(watcher(&journal)),
    );
    let manager = container.manager();

    manager.request().activate();
    manager.request().deactivate(manager);
    assert_eq!(journal.entries(), ["request initialized", "request destroyed"]);

    journal.clear();
    {
        let _request = manager.activate_request_silently().unwrap();
        assert!(manager.request().is_active());
        manager.select::<Arc<Counter>>(&[]).unwrap();
    }
    assert!(!manager.request().is_active());
    assert_eq!(journal.entries(), ["counter destroyed"]);
}

#[test]
fn post_construct_runs_inside_a_silent_request() {
    let journal = Journal::new();
    let locale = AnnotatedType::builder::<Locale>("Locale")
        .marked(builtin::REQUEST_SCOPED)
        .constructor(|| Locale)
        .business("tag", |_: &Locale, _: &[Value]| Ok(Some(value("en".to_string()))))
        .build();
    let greeted = journal.clone();
    let greeter = AnnotatedType::builder::<Greeter>("Greeter")
        .constructor(|| Greeter { locale: None })
        .inject_field("locale", Param::class("Locale"), |g: &mut Greeter, locale| {
            g.locale = Some(locale)
        })
        .post_construct("init", move |g: &Greeter| {
            let locale = g.locale.as_ref().ok_or("locale was not injected")?;
            greeted.record(text(locale.invoke("tag", vec![])?));
            Ok(())
        })
        .build();
    let container = boot(
        Archive::new("app")
            .with_class(locale)
            .with_class(greeter)
            .with_class(watcher(&journal)),
    );
    let manager = container.manager();

    assert!(!manager.request().is_active());
    manager.select::<Arc<Greeter>>(&[]).unwrap();
    assert!(!manager.request().is_active());
    assert_eq!(journal.entries(), ["en"]);
}

#[test]
fn sessions_keep_their_instances_until_invalidated() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(cart(&journal))
            .with_class(watcher(&journal)),
    );
    let manager = container.manager();
    let session = manager.session();
    let cart = manager.get::<Cart>(&[]).unwrap();

    session.associate("alice");
    cart.invoke("add", vec![value("book".to_string())]).unwrap();
    cart.invoke("add", vec![value("pen".to_string())]).unwrap();
    assert_eq!(size(&cart), 2);

    session.associate("bob");
    assert_eq!(size(&cart), 0);

    session.associate("alice");
    assert_eq!(session.current_session().as_deref(), Some("alice"));
    assert_eq!(size(&cart), 2);

    session.invalidate_session("alice", manager);
    assert_eq!(journal.count("cart destroyed"), 1);
    assert!(session.current_session().is_none());
    assert!(matches!(
        cart.invoke("size", vec![]),
        Err(InjectError::ContextNotActive { .. })
    ));

    session.associate("bob");
    session.dissociate();
    assert!(!session.is_active());

    assert_eq!(
        journal.entries(),
        [
            "session initialized alice",
            "session initialized bob",
            "cart destroyed",
            "session destroyed alice",
        ]
    );
}

#[test]
fn transient_conversations_end_with_their_activation() {
    let journal = Journal::new();
    let container = boot(Archive::new("app").with_class(wizard(&journal)));
    let manager = container.manager();
    let conversation = manager.conversation();
    let wizard = manager.get::<Wizard>(&[]).unwrap();

    let id = conversation.activate(None);
    assert_eq!(conversation.current_conversation(), Some(id));
    wizard.invoke("next", vec![]).unwrap();
    conversation.deactivate(manager);
    assert_eq!(journal.count("wizard destroyed"), 1);
    assert!(!conversation.is_active());
}

#[test]
fn long_running_conversations_survive_deactivation() {
    let journal = Journal::new();
    let container = boot(Archive::new("app").with_class(wizard(&journal)));
    let manager = container.manager();
    let conversation = manager.conversation();
    let wizard = manager.get::<Wizard>(&[]).unwrap();
    let next = || {
        let result = wizard.invoke("next", vec![]).unwrap().unwrap();
        *result.downcast_ref::<usize>().unwrap()
    };

    conversation.activate(Some("checkout"));
    assert_eq!(next(), 1);
    conversation.deactivate(manager);
    assert_eq!(journal.count("wizard destroyed"), 0);

    conversation.activate(Some("checkout"));
    assert_eq!(next(), 2);
    conversation.end("checkout", manager);
    assert_eq!(journal.count("wizard destroyed"), 1);
    conversation.deactivate(manager);
}

#[test]
fn conversation_laziness_follows_the_configuration() {
    let journal = Journal::new();
    let archive = || {
        Archive::new("app")
            .with_class(wizard(&journal))
            .with_class(watcher(&journal))
    };

    let lazy = boot(archive());
    let manager = lazy.manager();
    assert!(manager.conversation().is_lazy());
    manager.conversation().activate(Some("c1"));
    assert!(journal.entries().is_empty());
    manager.select::<Arc<Wizard>>(&[]).unwrap();
    assert_eq!(journal.entries(), ["conversation initialized c1"]);
    manager.conversation().deactivate(manager);

    journal.clear();
    let eager = try_boot(
        ContainerBuilder::new("eager")
            .add_archive(archive())
            .configuration(ContainerConfiguration::sequential().with_lazy_conversation_context(false)),
    )
    .unwrap();
    let manager = eager.manager();
    assert!(!manager.conversation().is_lazy());
    manager.conversation().activate(Some("c2"));
    assert_eq!(journal.entries(), ["conversation initialized c2"]);
    manager.conversation().deactivate(manager);
}
