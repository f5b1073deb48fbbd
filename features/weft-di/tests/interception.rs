mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use common::{builder, text, try_boot, Journal};
use weft_di::{
    builtin,
    errors::ProxyError,
    interception::proxy::{DynamicProxyFactory, ProxyFactory, ProxyObject},
    value, AnnotatedType, Annotation, AnnotationDefinition, Archive, Container, InjectError,
    Method, MethodBody, Param, Reference, Type, Value,
};

struct Shop;
struct Outer;
struct Inner;
struct Memo;
struct English;
struct Loud {
    delegate: Option<Reference>,
}

const TRACED: &str = "Traced";
const CACHED: &str = "Cached";

fn boot(archive: Archive) -> Container {
    try_boot(
        builder("test")
            .add_annotation(AnnotationDefinition::interceptor_binding(TRACED))
            .add_annotation(AnnotationDefinition::interceptor_binding(CACHED))
            .add_archive(archive),
    )
    .expect("container boots")
}

/// An interceptor recording around the invocation
fn tracer<T: Send + Sync + 'static>(
    name: &str,
    priority: i64,
    journal: &Journal,
    constructor: fn() -> T,
) -> AnnotatedType {
    let label = name.to_lowercase();
    let journal = journal.clone();
    AnnotatedType::builder::<T>(name)
        .marked(builtin::INTERCEPTOR)
        .marked(TRACED)
        .annotate(Annotation::priority(priority))
        .constructor(constructor)
        .interceptor_method("around", builtin::AROUND_INVOKE, move |_: &T, ctx| {
            journal.record(format!("{label} before {}", ctx.method().unwrap_or_default()));
            let result = ctx.proceed();
            journal.record(format!("{label} after"));
            result
        })
        .build()
}

fn shop(journal: &Journal) -> AnnotatedType {
    let bought = journal.clone();
    let priced = journal.clone();
    AnnotatedType::builder::<Shop>("Shop")
        .marked(builtin::APPLICATION_SCOPED)
        .marked(TRACED)
        .constructor(|| Shop)
        .business("buy", move |_: &Shop, _: &[Value]| {
            bought.record("target");
            Ok(Some(value("bought".to_string())))
        })
        .method(
            Method::new("price")
                .marked(CACHED)
                .body(MethodBody::on(move |_: &Shop, _: &[Value]| {
                    priced.record("priced");
                    Ok(Some(value(10u32)))
                })),
        )
        .build()
}

#[test]
fn interceptors_run_in_priority_order_around_the_target() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(shop(&journal))
            // Declared out of order, priority decides
            .with_class(tracer("Inner", 20, &journal, || Inner))
            .with_class(tracer("Outer", 10, &journal, || Outer)),
    );
    let manager = container.manager();

    let interceptors = manager.interceptors();
    let names = interceptors.iter().map(|i| i.class_name()).collect::<Vec<_>>();
    assert_eq!(names, ["Outer", "Inner"]);

    let shop = manager.get::<Shop>(&[]).unwrap();
    let result = shop.invoke("buy", vec![]).unwrap();
    assert_eq!(text(result), "bought");
    assert_eq!(
        journal.entries(),
        [
            "outer before buy",
            "inner before buy",
            "target",
            "inner after",
            "outer after",
        ]
    );
}

#[test]
fn interceptors_may_skip_the_target() {
    let journal = Journal::new();
    let memo = AnnotatedType::builder::<Memo>("Memo")
        .marked(builtin::INTERCEPTOR)
        .marked(CACHED)
        .annotate(Annotation::priority(5))
        .constructor(|| Memo)
        .interceptor_method("cached", builtin::AROUND_INVOKE, |_: &Memo, _ctx| {
            Ok(Some(value(42u32)))
        })
        .build();
    let container = boot(
        Archive::new("app")
            .with_class(shop(&journal))
            .with_class(memo),
    );
    let shop = container.manager().get::<Shop>(&[]).unwrap();

    let price = shop.invoke("price", vec![]).unwrap().unwrap();
    assert_eq!(price.downcast_ref::<u32>(), Some(&42));
    assert_eq!(journal.count("priced"), 0);

    // The binding is declared on the method only
    shop.invoke("buy", vec![]).unwrap();
    assert_eq!(journal.entries(), ["target"]);
}

#[test]
fn target_lifecycle_callbacks_run_inside_lifecycle_interceptors() {
    let journal = Journal::new();
    let audited = journal.clone();
    let audit = AnnotatedType::builder::<Outer>("Audit")
        .marked(builtin::INTERCEPTOR)
        .marked(TRACED)
        .annotate(Annotation::priority(1))
        .constructor(|| Outer)
        .interceptor_method("audit", builtin::POST_CONSTRUCT, move |_: &Outer, ctx| {
            audited.record("interceptor post construct");
            ctx.proceed()
        })
        .build();
    let constructed = journal.clone();
    let target = AnnotatedType::builder::<Shop>("Shop")
        .marked(TRACED)
        .constructor(|| Shop)
        .post_construct("init", move |_: &Shop| {
            constructed.record("target post construct");
            Ok(())
        })
        .build();
    let container = boot(Archive::new("app").with_class(audit).with_class(target));

    container.manager().select::<Arc<Shop>>(&[]).unwrap();
    // Creating the Audit instance itself does not run its intercepting method
    assert_eq!(
        journal.entries(),
        ["interceptor post construct", "target post construct"]
    );
    assert_eq!(journal.count("interceptor post construct"), 1);
}

fn greeting() -> AnnotatedType {
    AnnotatedType::declare("Greeting").make_interface().build()
}

fn english(journal: &Journal) -> AnnotatedType {
    let journal = journal.clone();
    AnnotatedType::builder::<English>("English")
        .implements(Type::class("Greeting"))
        .marked(TRACED)
        .constructor(|| English)
        .business("greet", move |_: &English, _: &[Value]| {
            journal.record("target");
            Ok(Some(value("hello".to_string())))
        })
        .build()
}

fn loud(journal: &Journal) -> AnnotatedType {
    let journal = journal.clone();
    AnnotatedType::builder::<Loud>("Loud")
        .marked(builtin::DECORATOR)
        .implements(Type::class("Greeting"))
        .annotate(Annotation::priority(10))
        .constructor(|| Loud { delegate: None })
        .inject_field(
            "delegate",
            Param::class("Greeting").delegate(),
            |loud: &mut Loud, delegate| loud.delegate = Some(delegate),
        )
        .business("greet", move |loud: &Loud, args: &[Value]| {
            journal.record("decorator");
            let delegate = loud.delegate.as_ref().ok_or("delegate not injected")?;
            let greeting = text(delegate.invoke("greet", args.to_vec())?);
            Ok(Some(value(format!("{}!", greeting.to_uppercase()))))
        })
        .build()
}

#[test]
fn decorators_wrap_the_target_inside_interceptors() {
    let journal = Journal::new();
    let container = boot(
        Archive::new("app")
            .with_class(greeting())
            .with_class(english(&journal))
            .with_class(loud(&journal))
            .with_class(tracer("Outer", 10, &journal, || Outer)),
    );
    let manager = container.manager();
    assert_eq!(manager.decorators().len(), 1);

    let greeting = manager.lookup(Type::class("Greeting"), &[]).get().unwrap();
    assert_eq!(
        greeting.component().map(|c| c.class_name()).as_deref(),
        Some("English")
    );
    let result = greeting.invoke("greet", vec![]).unwrap();
    assert_eq!(text(result), "HELLO!");
    assert_eq!(
        journal.entries(),
        ["outer before greet", "decorator", "target", "outer after"]
    );
}

#[test]
fn decorators_are_skipped_unless_enabled() {
    let journal = Journal::new();
    let disabled = AnnotatedType::builder::<Loud>("Loud")
        .marked(builtin::DECORATOR)
        .implements(Type::class("Greeting"))
        .constructor(|| Loud { delegate: None })
        .inject_field(
            "delegate",
            Param::class("Greeting").delegate(),
            |loud: &mut Loud, delegate| loud.delegate = Some(delegate),
        )
        .build();
    let container = boot(
        Archive::new("app")
            .with_class(greeting())
            .with_class(english(&journal))
            .with_class(disabled),
    );
    let manager = container.manager();
    assert!(manager.decorators().is_empty());

    let greeting = manager.lookup(Type::class("Greeting"), &[]).get().unwrap();
    assert_eq!(text(greeting.invoke("greet", vec![]).unwrap()), "hello");
}

#[derive(Clone, Default)]
struct CountingFactory {
    created: Arc<AtomicUsize>,
}

impl ProxyFactory for CountingFactory {
    fn create(&self, types: &[Type]) -> Result<Arc<dyn ProxyObject>, ProxyError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        DynamicProxyFactory.create(types)
    }
}

#[test]
fn normal_scoped_components_share_one_client_proxy() {
    let journal = Journal::new();
    let factory = CountingFactory::default();
    let container = try_boot(
        builder("test")
            .add_annotation(AnnotationDefinition::interceptor_binding(TRACED))
            .add_annotation(AnnotationDefinition::interceptor_binding(CACHED))
            .proxy_factory(factory.clone())
            .add_archive(Archive::new("app").with_class(shop(&journal))),
    )
    .unwrap();
    let manager = container.manager();

    let first = manager.get::<Shop>(&[]).unwrap();
    let second = manager.get::<Shop>(&[]).unwrap();
    assert!(first.is_proxy() && second.is_proxy());
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);

    // Both proxies lead to the same contextual instance
    let a = first.get::<Shop>().unwrap();
    let b = second.get::<Shop>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn proxies_without_handler_fail() {
    let proxy = DynamicProxyFactory.create(&[Type::class("Shop")]).unwrap();
    assert!(matches!(
        proxy.invoke("buy", vec![]),
        Err(InjectError::Proxy(ProxyError::HandlerNotSet { .. }))
    ));
}
