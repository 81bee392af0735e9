use typthon_objc::{Bridge, BridgeConfig, BridgeError, Instance, SimRuntime, Value};

fn bridge() -> (SimRuntime, &'static Bridge) {
    let sim = SimRuntime::new();
    let bridge = Bridge::with_runtime(Box::new(sim), BridgeConfig::default()).unwrap();
    (sim, bridge)
}

fn string(bridge: &'static Bridge, text: &str) -> Instance {
    bridge
        .get_class("NSString")
        .unwrap()
        .send("stringWithUTF8String:", &[Value::Str(text.to_string())])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone()
}

#[test]
fn test_wrappers_track_native_lifetime() {
    let (sim, bridge) = bridge();
    let live = sim.live_objects();

    let pool = bridge.autorelease_pool();
    let hello = string(bridge, "hello");
    let again = bridge.wrap(hello.address());
    assert!(Instance::ptr_eq(&hello, &again));
    assert_eq!(hello.send("length", &[]).unwrap().as_u64(), Some(5));
    pool.drain().unwrap();

    assert!(!hello.is_alive());
    assert!(bridge.cached_wrapper(hello.address()).is_none());
    assert!(matches!(
        hello.send("length", &[]),
        Err(BridgeError::Deallocated { .. })
    ));
    // The observer went with the string
    assert_eq!(sim.live_objects(), live);
}

#[test]
fn test_retained_objects_outlive_their_pool() {
    let (_, bridge) = bridge();
    let kept = bridge
        .with_autorelease_pool(|| {
            let text = string(bridge, "kept");
            text.retain()?;
            Ok(text)
        })
        .unwrap();
    assert!(kept.is_alive());
    assert_eq!(kept.retain_count().unwrap(), 1);
    assert_eq!(kept.to_value().unwrap().as_str(), Some("kept"));

    kept.release().unwrap();
    assert!(!kept.is_alive());
}

#[test]
fn test_cache_returns_to_its_size_after_a_pool() {
    let (_, bridge) = bridge();
    // Class objects and singletons stay cached; measure after warming up
    bridge.with_autorelease_pool(|| string(bridge, "warm").to_value()).unwrap();
    let baseline = bridge.wrapper_count();

    bridge
        .with_autorelease_pool(|| {
            for i in 0..32 {
                let text = string(bridge, &format!("item {}", i));
                assert!(bridge.wrapper_count() > baseline);
                assert_eq!(text.to_value()?.as_str(), Some(format!("item {}", i).as_str()));
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(bridge.wrapper_count(), baseline);

    let stats = bridge.stats();
    assert_eq!(stats.wrappers_created - stats.wrappers_evicted, baseline as u64);
}

#[test]
fn test_objects_shared_across_threads() {
    let (_, bridge) = bridge();
    let object = bridge
        .get_class("NSObject")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let object = object.clone();
            std::thread::spawn(move || {
                let wrapped = bridge.wrap(object.address());
                assert!(Instance::ptr_eq(&wrapped, &object));
                wrapped.send("hash", &[]).unwrap().as_u64().unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), object.address() as u64);
    }
    object.release().unwrap();
}
