//! Exceptions raised while no send is in flight; kept to a single test so
//! no other bridge is created in this process meanwhile

use typthon_objc::exceptions::take_uncaught;
use typthon_objc::{Bridge, BridgeConfig, BridgeError, SimRuntime};

#[test]
fn test_exception_outside_a_send_is_held_for_the_thread() {
    let sim = SimRuntime::new();
    let bridge = Bridge::with_runtime(Box::new(sim), BridgeConfig::default()).unwrap();
    assert!(take_uncaught().is_none());

    sim.raise("NSRangeException", "index 7 beyond bounds [0 .. 2]");
    match take_uncaught() {
        Some(BridgeError::NativeException { name, reason }) => {
            assert_eq!(name, "NSRangeException");
            assert!(reason.contains("beyond bounds"));
        }
        other => panic!("expected a native exception, got {:?}", other),
    }
    assert!(take_uncaught().is_none());

    // Objects torn down afterwards run their observers through sends of
    // their own; the held exception survives them
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    sim.raise("NSInternalInconsistencyException", "raised with an observed object alive");
    object.release().unwrap();
    assert!(!object.is_alive());
    match take_uncaught() {
        Some(BridgeError::NativeException { name, .. }) => {
            assert_eq!(name, "NSInternalInconsistencyException")
        }
        other => panic!("expected a native exception, got {:?}", other),
    }

    // Another thread sees nothing
    sim.raise("NSGenericException", "first");
    let elsewhere = std::thread::spawn(|| take_uncaught().is_none()).join().unwrap();
    assert!(elsewhere);
    assert!(take_uncaught().is_some());
}
