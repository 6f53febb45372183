//! Guarded dispatch through self-specializing call sites

use pretty_assertions::assert_eq;
use reify_core::Value;
use reify_runtime::{
    Adaptation, ClassSpec, Instance, Location, ReceiverCallSite, Runtime, RuntimeConfig,
    RuntimeError, SpecializedCallSite,
};
use reify_test_fixtures::FixtureType;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn load(runtime: &Runtime, fixtures: &[FixtureType]) {
    for fixture in fixtures {
        let spec = ClassSpec::from_json_value(fixture.spec()).unwrap();
        runtime.define_class(spec).unwrap();
    }
}

fn runtime_with(fixtures: &[FixtureType]) -> Runtime {
    let runtime = Runtime::default();
    load(&runtime, fixtures);
    runtime
}

#[test]
fn test_alternating_carriers_relink_on_every_switch() {
    init_tracing();
    let runtime = runtime_with(&[FixtureType::Box]);
    let class = runtime.class("Box").unwrap();
    let location = Location::class(&class);
    let c1 = runtime
        .create_raw_carrier(&location, Some(&Value::ty("String")))
        .unwrap();
    let c2 = runtime
        .create_raw_carrier(&location, Some(&Value::ty("Integer")))
        .unwrap();

    let site = SpecializedCallSite::new(&class, "describe", Adaptation::None);
    let mut relinks = Vec::new();
    let mut results = Vec::new();
    for carrier in [&c1, &c1, &c2, &c1] {
        results.push(site.invoke(&runtime, carrier, &[]).unwrap());
        relinks.push(site.relinks());
    }

    assert_eq!(
        results,
        vec![
            Value::string("String"),
            Value::string("String"),
            Value::string("Integer"),
            Value::string("String"),
        ]
    );
    assert_eq!(relinks, vec![1, 1, 2, 3]);
}

#[test]
fn test_insert_carrier_adaptations() {
    let runtime = runtime_with(&[FixtureType::Box, FixtureType::NestedMethod]);

    let boxed = runtime.class("Box").unwrap();
    let carrier = runtime
        .create_raw_carrier(&Location::class(&boxed), Some(&Value::ty("String")))
        .unwrap();
    let site = SpecializedCallSite::new(&boxed, "name_of", Adaptation::InsertCarrier);
    assert_eq!(
        site.invoke(&runtime, &carrier, &[]).unwrap(),
        Value::string("String")
    );

    let util = runtime.class("Util").unwrap();
    let location = Location::method(&util, Some(Value::ty("String")), "append_both(List)List");
    let method_carrier = runtime
        .create_raw_carrier(&location, Some(&Value::ty("Long")))
        .unwrap();
    let site = SpecializedCallSite::new(&util, "name_of", Adaptation::InsertMethodCarrier);
    assert_eq!(
        site.invoke(&runtime, &method_carrier, &[]).unwrap(),
        Value::string("Long")
    );
}

#[test]
fn test_method_level_carrier_reads_both_anchors() {
    let runtime = runtime_with(&[FixtureType::NestedMethod]);
    let util = runtime.class("Util").unwrap();
    let location = Location::method(&util, Some(Value::ty("String")), "append_both(List)List");
    let carrier = runtime
        .create_raw_carrier(&location, Some(&Value::ty("Long")))
        .unwrap();

    let site = SpecializedCallSite::new(&util, "append_both", Adaptation::None);
    let result = site
        .invoke(&runtime, &carrier, &[Value::list([Value::Int(1)])])
        .unwrap();

    assert_eq!(
        result,
        Value::list([Value::Int(1), Value::ty("String"), Value::ty("Long")])
    );
}

#[test]
fn test_restriction_checked_on_every_call() {
    let runtime = runtime_with(&[FixtureType::Box]);
    let class = runtime.class("Box").unwrap();
    let carrier = runtime
        .create_raw_carrier(&Location::class(&class), Some(&Value::ty("String")))
        .unwrap();

    let site = SpecializedCallSite::new(&class, "describe", Adaptation::DropLeading(1))
        .with_restriction(0, "element");

    assert_eq!(
        site.invoke(&runtime, &carrier, &[Value::string("ok")]).unwrap(),
        Value::string("String")
    );
    let err = site.invoke(&runtime, &carrier, &[Value::Int(7)]).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::RestrictionViolation {
            slot: 0,
            expected: vec!["String".into()],
            actual: "int".into(),
        }
    );
    assert_eq!(site.relinks(), 1);
}

#[test]
fn test_receiver_site_dispatches_through_supertype_carrier() {
    init_tracing();
    let runtime = runtime_with(&[FixtureType::Box, FixtureType::StringBox]);
    let site = ReceiverCallSite::new("describe", Adaptation::None);

    let sub = runtime
        .instantiate("StringBox", Some(&Value::ty("Long")))
        .unwrap();
    let boxed = runtime.instantiate("Box", Some(&Value::ty("String"))).unwrap();

    assert_eq!(site.invoke(&runtime, &sub, &[]).unwrap(), Value::string("Long"));
    assert_eq!(site.invoke(&runtime, &sub, &[]).unwrap(), Value::string("Long"));
    assert_eq!(site.relinks(), 1);

    assert_eq!(site.invoke(&runtime, &boxed, &[]).unwrap(), Value::string("String"));
    assert_eq!(site.relinks(), 2);
}

#[test]
fn test_receiver_guard_without_backing_types() {
    let runtime = Runtime::new(
        RuntimeConfig::default().with_backing_types(false),
        reify_core::FunctionRegistry::with_builtins(),
    );
    load(&runtime, &[FixtureType::Box]);
    let site = ReceiverCallSite::new("describe", Adaptation::None);

    let a = runtime.instantiate("Box", Some(&Value::ty("String"))).unwrap();
    let b = runtime.instantiate("Box", Some(&Value::ty("Integer"))).unwrap();
    assert_eq!(a.runtime_class(), b.runtime_class());

    assert_eq!(site.invoke(&runtime, &a, &[]).unwrap(), Value::string("String"));
    assert_eq!(site.invoke(&runtime, &b, &[]).unwrap(), Value::string("Integer"));
    assert_eq!(site.relinks(), 2);
}

#[test]
fn test_plain_receiver_uses_raw_supertype_carrier() {
    let runtime = runtime_with(&[FixtureType::Box]);
    let sub = runtime
        .define_class(ClassSpec {
            superclass: Some("Box".into()),
            ..ClassSpec::new("Sub")
        })
        .unwrap();
    let site = ReceiverCallSite::new("describe", Adaptation::None);

    let receiver = Instance::plain(&sub);
    assert_eq!(
        site.invoke(&runtime, &receiver, &[]).unwrap(),
        Value::string("Object")
    );
    assert_eq!(
        site.invoke(&runtime, &receiver, &[]).unwrap(),
        Value::string("Object")
    );
    assert_eq!(site.relinks(), 1);
}

#[test]
fn test_specialized_site_rejects_carrier_of_another_class() {
    let runtime = runtime_with(&[FixtureType::Box, FixtureType::Pair]);
    let boxed = runtime.class("Box").unwrap();
    let pair = runtime.class("Pair").unwrap();
    let carrier = runtime
        .create_raw_carrier(&Location::class(&pair), None)
        .unwrap();

    let site = SpecializedCallSite::new(&boxed, "describe", Adaptation::None);
    assert_eq!(
        site.invoke(&runtime, &carrier, &[]).unwrap_err(),
        RuntimeError::CarrierMismatch {
            constant: "describe".into(),
            expected: "Box".into(),
            found: "Pair".into(),
        }
    );
    assert_eq!(site.relinks(), 0);
}

#[test]
fn test_missing_restricted_argument_is_reported() {
    let runtime = runtime_with(&[FixtureType::Box]);
    let class = runtime.class("Box").unwrap();
    let carrier = runtime
        .create_raw_carrier(&Location::class(&class), Some(&Value::ty("String")))
        .unwrap();
    let site = SpecializedCallSite::new(&class, "describe", Adaptation::DropLeading(1))
        .with_restriction(0, "element");

    assert_eq!(
        site.invoke(&runtime, &carrier, &[]).unwrap_err(),
        RuntimeError::MissingArgument { slot: 0 }
    );
}

#[test]
fn test_unknown_method() {
    let runtime = runtime_with(&[FixtureType::Box]);
    let instance = runtime.instantiate("Box", None).unwrap();
    let site = ReceiverCallSite::new("missing", Adaptation::None);

    assert_eq!(
        site.invoke(&runtime, &instance, &[]).unwrap_err(),
        RuntimeError::UnknownMethod {
            class: "Box".into(),
            method: "missing".into(),
        }
    );
    assert_eq!(site.relinks(), 0);
}

#[test]
fn test_concurrent_unlinked_site_is_consistent() {
    let runtime = runtime_with(&[FixtureType::Box]);
    let class = runtime.class("Box").unwrap();
    let carrier = runtime
        .create_raw_carrier(&Location::class(&class), Some(&Value::ty("String")))
        .unwrap();
    let site = SpecializedCallSite::new(&class, "describe", Adaptation::None);

    let results: Vec<Value> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| site.invoke(&runtime, &carrier, &[]).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|v| *v == Value::string("String")));
    assert!(site.relinks() >= 1);
}
