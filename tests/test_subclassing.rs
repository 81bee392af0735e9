use parking_lot::Mutex;
use std::sync::Arc;
use typthon_objc::{Bridge, BridgeConfig, BridgeError, Instance, Value};

fn bridge() -> &'static Bridge {
    Bridge::simulated(BridgeConfig::default()).unwrap()
}

#[test]
fn test_delegate_style_callbacks() {
    let bridge = bridge();
    let root = bridge.get_class("NSObject").unwrap();
    let builder = bridge.create_subclass(&root, "AppDelegate").unwrap();
    builder.add_ivar("launches", "i").unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    builder
        .add_method("application:didFinishLaunching:", "v@:@B", move |call| {
            let launches = call.receiver.get_ivar("launches")?.as_i64().unwrap_or(0);
            call.receiver.set_ivar("launches", &Value::Int(launches + 1))?;
            let app = call.arg(0).and_then(Value::as_instance).map(Instance::class_name);
            log.lock().push(format!(
                "{} {}",
                app.unwrap_or("nil"),
                call.arg(1).and_then(Value::as_bool).unwrap_or(false)
            ));
            Ok(Value::Nil)
        })
        .unwrap();
    let delegate_class = builder.register().unwrap();

    let delegate = delegate_class.send("new", &[]).unwrap().as_instance().unwrap().clone();
    let app = root.send("new", &[]).unwrap().as_instance().unwrap().clone();
    delegate
        .call(
            "application_didFinishLaunching_",
            &[Value::Object(app.clone()), Value::Bool(true)],
        )
        .unwrap();
    delegate
        .send("application:didFinishLaunching:", &[Value::Nil, Value::Bool(false)])
        .unwrap();

    assert_eq!(*events.lock(), vec!["NSObject true".to_string(), "nil false".to_string()]);
    assert_eq!(delegate.get_ivar("launches").unwrap().as_i64(), Some(2));
    assert!(delegate_class.responds_to("application:didFinishLaunching:"));

    app.release().unwrap();
    delegate.release().unwrap();
    assert!(!delegate.is_alive());
}

#[test]
fn test_overridden_dealloc_chains_to_super() {
    let bridge = bridge();
    let root = bridge.get_class("NSObject").unwrap();
    let builder = bridge.create_subclass(&root, "Tracked").unwrap();
    let deallocs = Arc::new(Mutex::new(0));
    let count = Arc::clone(&deallocs);
    builder
        .add_method("dealloc", "v@:", move |call| {
            *count.lock() += 1;
            call.send_super("dealloc", &[])
        })
        .unwrap();
    let class = builder.register().unwrap();

    let object = class.send("new", &[]).unwrap().as_instance().unwrap().clone();
    object.release().unwrap();
    assert_eq!(*deallocs.lock(), 1);
    assert!(!object.is_alive());
}

#[test]
fn test_errors_from_nested_callbacks() {
    let bridge = bridge();
    let root = bridge.get_class("NSObject").unwrap();
    let builder = bridge.create_subclass(&root, "Validator").unwrap();
    builder
        .add_method("check:", "B@:q", |call| {
            let value = call.arg(0).and_then(Value::as_i64).unwrap_or(0);
            if value < 0 {
                return Err(BridgeError::runtime(format!("negative input {}", value)));
            }
            Ok(Value::Bool(value % 2 == 0))
        })
        .unwrap();
    builder
        .add_method("checkAll", "B@:", |call| {
            for value in [2, 4, -1] {
                call.receiver.send("check:", &[Value::Int(value)])?;
            }
            Ok(Value::Bool(true))
        })
        .unwrap();
    let class = builder.register().unwrap();
    let validator = class.send("new", &[]).unwrap().as_instance().unwrap().clone();

    assert_eq!(validator.send("check:", &[Value::Int(4)]).unwrap(), Value::Bool(true));
    match validator.send("checkAll", &[]) {
        Err(BridgeError::Callback { selector, message }) => {
            assert_eq!(selector, "check:");
            assert!(message.contains("negative input -1"));
        }
        other => panic!("expected a callback error, got {:?}", other),
    }
    assert_eq!(validator.send("check:", &[Value::Int(3)]).unwrap(), Value::Bool(false));
}
