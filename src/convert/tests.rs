//! Value conversion tests

use super::*;
use crate::config::BridgeConfig;
use crate::sim::SimRuntime;
use crate::value::StructValue;

fn setup() -> (SimRuntime, &'static Bridge) {
    let sim = SimRuntime::new();
    let bridge = Bridge::with_runtime(Box::new(sim), BridgeConfig::default()).unwrap();
    (sim, bridge)
}

fn round_trip(bridge: &'static Bridge, value: &Value) -> Value {
    let boxed = bridge.box_value(value).unwrap();
    let back = boxed.to_value().unwrap();
    boxed.release().unwrap();
    back
}

#[test]
fn test_strings() {
    let (_, bridge) = setup();
    let boxed = bridge.box_value(&Value::Str("héllo wörld".to_string())).unwrap();
    assert_eq!(boxed.class_name(), "NSString");
    assert_eq!(boxed.to_value().unwrap().as_str(), Some("héllo wörld"));
    boxed.release().unwrap();

    assert_eq!(round_trip(bridge, &Value::Str(String::new())).as_str(), Some(""));
}

#[test]
fn test_numbers_keep_their_kind() {
    let (_, bridge) = setup();
    assert!(matches!(round_trip(bridge, &Value::Int(-5)), Value::Int(-5)));
    assert!(matches!(round_trip(bridge, &Value::UInt(u64::MAX)), Value::UInt(u64::MAX)));
    assert!(matches!(round_trip(bridge, &Value::Bool(true)), Value::Bool(true)));
    assert!(matches!(round_trip(bridge, &Value::Bool(false)), Value::Bool(false)));
    match round_trip(bridge, &Value::Float(1.5)) {
        Value::Float(f) => assert_eq!(f, 1.5),
        other => panic!("expected a float, got {:?}", other),
    }
}

#[test]
fn test_nil_is_nsnull() {
    let (_, bridge) = setup();
    let boxed = bridge.box_value(&Value::Nil).unwrap();
    assert_eq!(boxed.class_name(), "NSNull");
    assert!(boxed.to_value().unwrap().is_nil());
    // The singleton survives any number of releases
    boxed.release().unwrap();
    assert!(boxed.is_alive());
}

#[test]
fn test_list_with_mixed_elements() {
    let (_, bridge) = setup();
    let list = Value::List(vec![Value::Int(1), Value::Str("two".to_string()), Value::Nil]);
    let boxed = bridge.box_value(&list).unwrap();
    assert_eq!(boxed.class_name(), "NSArray");
    assert_eq!(boxed.send("count", &[]).unwrap().as_u64(), Some(3));

    match boxed.to_value().unwrap() {
        Value::List(items) => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[0].as_i64(), Some(1));
            assert_eq!(items[1].as_str(), Some("two"));
            assert!(items[2].is_nil());
        }
        other => panic!("expected a list, got {:?}", other),
    }
    boxed.release().unwrap();
}

#[test]
fn test_dictionary_with_nested_values() {
    let (_, bridge) = setup();
    let dict = Value::Dict(vec![
        (Value::Str("name".to_string()), Value::Str("typthon".to_string())),
        (
            Value::Str("flags".to_string()),
            Value::List(vec![Value::Bool(false), Value::Float(0.5)]),
        ),
    ]);
    let boxed = bridge.box_value(&dict).unwrap();
    assert_eq!(boxed.class_name(), "NSDictionary");

    let Value::Dict(pairs) = boxed.to_value().unwrap() else {
        panic!("expected a dictionary");
    };
    assert_eq!(pairs.len(), 2);
    let lookup = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(lookup("name").as_str(), Some("typthon"));
    match lookup("flags") {
        Value::List(flags) => {
            assert_eq!(flags[0].as_bool(), Some(false));
            assert_eq!(flags[1].as_f64(), Some(0.5));
        }
        other => panic!("expected a list, got {:?}", other),
    }
    boxed.release().unwrap();
}

#[test]
fn test_sets() {
    let (_, bridge) = setup();
    let set = Value::Set(vec![Value::Str("x".to_string()), Value::Str("y".to_string())]);
    let Value::Set(members) = round_trip(bridge, &set) else {
        panic!("expected a set");
    };
    let mut names: Vec<_> = members.iter().filter_map(Value::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["x", "y"]);
}

#[test]
fn test_objects_pass_through() {
    let (_, bridge) = setup();
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    let before = object.retain_count().unwrap();

    let boxed = bridge.box_value(&Value::Object(object.clone())).unwrap();
    assert!(Instance::ptr_eq(&boxed, &object));
    assert_eq!(object.retain_count().unwrap(), before + 1);

    match object.to_value().unwrap() {
        Value::Object(same) => assert!(Instance::ptr_eq(&same, &object)),
        other => panic!("expected the object back, got {:?}", other),
    }
    boxed.release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_objects_inside_collections_are_not_converted() {
    let (_, bridge) = setup();
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    let list = bridge.box_value(&Value::List(vec![Value::Object(object.clone())])).unwrap();
    let Value::List(items) = list.to_value().unwrap() else {
        panic!("expected a list");
    };
    assert!(Instance::ptr_eq(items[0].as_instance().unwrap(), &object));
    list.release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_conversion_does_not_leak() {
    let (sim, bridge) = setup();
    // Warm up the observer class and the NSNull singleton
    round_trip(bridge, &Value::Nil);
    let before = sim.live_objects();

    let value = Value::Dict(vec![(
        Value::Str("items".to_string()),
        Value::List(vec![Value::Int(1), Value::Float(2.0), Value::Str("three".to_string())]),
    )]);
    round_trip(bridge, &value);
    assert_eq!(sim.live_objects(), before);
}

#[test]
fn test_unconvertible_values() {
    let (_, bridge) = setup();
    let selector = bridge.selector("count").unwrap();
    for value in [
        Value::Selector(selector),
        Value::Pointer(0x1000),
        Value::Struct(StructValue::new("CGPoint", vec![Value::Float(0.0), Value::Float(0.0)])),
    ] {
        match to_native(bridge, &value) {
            Err(BridgeError::Type { found, .. }) => assert_eq!(found, value.kind()),
            other => panic!("expected a type error, got {:?}", other),
        }
    }
}

#[test]
fn test_dead_element_rejected() {
    let (_, bridge) = setup();
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    object.release().unwrap();
    assert!(!object.is_alive());

    let err = bridge
        .box_value(&Value::List(vec![Value::Int(1), Value::Object(object)]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Deallocated { .. }));
}

#[test]
fn test_nil_instance_converts_to_nil() {
    assert!(Instance::nil().to_value().unwrap().is_nil());
}
