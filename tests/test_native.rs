//! Against the system runtime; only meaningful where Foundation exists
#![cfg(target_os = "macos")]

use typthon_objc::{BridgeError, Value};


#[test]
fn test_foundation_round_trip() {
    let bridge = typthon_objc::init().unwrap();
    bridge
        .with_autorelease_pool(|| {
            let text = bridge
                .get_class("NSString")
                .unwrap()
                .call("stringWithUTF8String_", &[Value::Str("héllo".to_string())])?;
            let text = text.as_instance().unwrap();
            assert!(text.class_name().contains("String"));
            assert_eq!(text.to_value()?.as_str(), Some("héllo"));

            let list = bridge.box_value(&Value::List(vec![Value::Int(1), Value::Str("x".into())]))?;
            let back = list.to_value()?;
            list.release()?;
            assert_eq!(back, Value::List(vec![Value::Int(1), Value::Str("x".into())]));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_unknown_selector_is_a_lookup_error() {
    let bridge = typthon_objc::init().unwrap();
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    // Unknown selectors fail at lookup, before anything is sent
    assert!(matches!(
        object.method("frobnicate"),
        Err(BridgeError::Lookup { .. })
    ));
    object.release().unwrap();
}
