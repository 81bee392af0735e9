//! Identity cache and lifecycle tests

use super::*;
use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::sim::SimRuntime;
use crate::value::Value;
use std::sync::{Arc, Barrier};
use std::thread;

fn setup() -> (SimRuntime, &'static Bridge) {
    let sim = SimRuntime::new();
    let bridge = Bridge::with_runtime(Box::new(sim), BridgeConfig::default()).unwrap();
    (sim, bridge)
}

fn new_object(bridge: &'static Bridge, class: &str) -> Instance {
    let class = bridge.get_class(class).unwrap();
    class.send("new", &[]).unwrap().as_instance().unwrap().clone()
}

#[test]
fn test_wrap_null_is_nil() {
    let (_, bridge) = setup();
    let nil = bridge.wrap(0);
    assert!(nil.is_nil());
    assert!(Instance::ptr_eq(&nil, &Instance::nil()));
    assert_eq!(nil.class_name(), "nil");
    assert_eq!(nil.to_string(), "nil");
}

#[test]
fn test_wrap_returns_the_same_wrapper() {
    let (sim, bridge) = setup();
    let address = sim.new_object("NSObject").unwrap();
    let a = bridge.wrap(address);
    let b = bridge.wrap(address);
    assert!(Instance::ptr_eq(&a, &b));
    assert_eq!(a.class_name(), "NSObject");
    assert!(bridge.cached_wrapper(address).is_some());
    assert_eq!(bridge.stats().observers_attached, 1);
    a.release().unwrap();
}

#[test]
fn test_send_results_share_wrappers() {
    let (_, bridge) = setup();
    let object = new_object(bridge, "NSObject");
    let same = object.send("self", &[]).unwrap();
    assert!(Instance::ptr_eq(same.as_instance().unwrap(), &object));
    object.release().unwrap();
}

#[test]
fn test_dealloc_evicts_and_kills_wrapper() {
    let (sim, bridge) = setup();
    let object = new_object(bridge, "NSObject");
    let address = object.address();
    let cached = bridge.wrapper_count();
    assert!(object.is_alive());

    object.release().unwrap();

    assert!(!sim.is_live(address));
    assert!(!object.is_alive());
    assert!(bridge.cached_wrapper(address).is_none());
    assert_eq!(bridge.wrapper_count(), cached - 1);
    assert_eq!(bridge.stats().wrappers_evicted, 1);

    let error = object.send("hash", &[]).unwrap_err();
    assert_eq!(error, BridgeError::Deallocated { address });
}

#[test]
fn test_dead_wrappers_are_not_reused() {
    let (sim, bridge) = setup();
    let object = new_object(bridge, "NSObject");
    let address = object.address();
    object.release().unwrap();

    // A new object may land on the same address; it gets a new wrapper
    let fresh = bridge.wrap(sim.new_object("NSObject").unwrap());
    assert!(!Instance::ptr_eq(&fresh, &object));
    assert!(fresh.is_alive());
    if fresh.address() == address {
        assert_ne!(fresh, object);
    }
    fresh.release().unwrap();
}

#[test]
fn test_observers_die_with_their_objects() {
    let (sim, bridge) = setup();
    // Builds the observer class
    new_object(bridge, "NSObject").release().unwrap();

    let live = sim.live_objects();
    let object = new_object(bridge, "NSObject");
    // The object and its observer
    assert_eq!(sim.live_objects(), live + 2);
    object.release().unwrap();
    assert_eq!(sim.live_objects(), live);
}

#[test]
fn test_class_objects_are_not_observed() {
    let (_, bridge) = setup();
    let class = bridge.get_class("NSObject").unwrap();
    let wrapped = bridge.wrap(class.as_ptr() as usize);
    assert!(wrapped.class().unwrap().is_meta());
    assert_eq!(bridge.stats().observers_attached, 0);
    assert!(Instance::ptr_eq(&wrapped, &bridge.wrap(class.as_ptr() as usize)));
}

#[test]
fn test_retain_counts() {
    let (_, bridge) = setup();
    let object = new_object(bridge, "NSObject");
    assert_eq!(object.retain_count().unwrap(), 1);
    object.retain().unwrap();
    assert_eq!(object.retain_count().unwrap(), 2);
    object.release().unwrap();
    assert_eq!(object.retain_count().unwrap(), 1);
    object.release().unwrap();
    assert!(object.retain_count().is_err());
    assert_eq!(Instance::nil().retain_count().unwrap(), 0);
}

#[test]
fn test_pool_drain_restores_cache_size() {
    let (sim, bridge) = setup();
    // Warm up: observer class, the number class handle
    bridge
        .with_autorelease_pool(|| bridge.get_class("NSNumber").unwrap().send("numberWithInt:", &[Value::Int(0)]))
        .unwrap();
    let cached = bridge.wrapper_count();
    let live = sim.live_objects();

    let number = bridge.get_class("NSNumber").unwrap();
    let pool = bridge.autorelease_pool();
    for i in 0..16 {
        number.send("numberWithInt:", &[Value::Int(i)]).unwrap();
    }
    assert_eq!(bridge.wrapper_count(), cached + 16);
    pool.drain().unwrap();

    assert_eq!(bridge.wrapper_count(), cached);
    assert_eq!(sim.live_objects(), live);
}

#[test]
fn test_dropped_pool_drains() {
    let (_, bridge) = setup();
    let number = bridge.get_class("NSNumber").unwrap();
    let kept;
    {
        let _pool = bridge.autorelease_pool();
        kept = number.send("numberWithInt:", &[Value::Int(7)]).unwrap();
    }
    assert!(!kept.as_instance().unwrap().is_alive());
}

#[test]
fn test_autorelease_hands_object_to_pool() {
    let (_, bridge) = setup();
    let pool = bridge.autorelease_pool();
    let object = new_object(bridge, "NSObject");
    object.autorelease().unwrap();
    assert!(object.is_alive());
    pool.drain().unwrap();
    assert!(!object.is_alive());
}

#[test]
fn test_concurrent_wrap_builds_one_wrapper() {
    let (sim, bridge) = setup();
    // Observer class first, so the race is only over the wrapper
    new_object(bridge, "NSObject").release().unwrap();
    let created = bridge.stats().wrappers_created;
    let observed = bridge.stats().observers_attached;

    let address = sim.new_object("NSObject").unwrap();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                bridge.wrap(address)
            })
        })
        .collect();
    let wrappers: Vec<Instance> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(wrappers.iter().all(|w| Instance::ptr_eq(w, &wrappers[0])));
    assert_eq!(bridge.stats().wrappers_created, created + 1);
    assert_eq!(bridge.stats().observers_attached, observed + 1);
    wrappers[0].release().unwrap();
    assert!(wrappers.iter().all(|w| !w.is_alive()));
}

#[test]
fn test_borrowed_instances_compare_by_address() {
    let (_, bridge) = setup();
    let object = new_object(bridge, "NSObject");
    let borrowed = Instance::borrowed(bridge, object.address());
    assert_eq!(borrowed, object);
    assert!(!Instance::ptr_eq(&borrowed, &object));
    assert!(object.to_string().starts_with("<NSObject: 0x"));
    object.release().unwrap();
}

#[test]
fn test_is_kind_of() {
    let (_, bridge) = setup();
    let array = new_object(bridge, "NSMutableArray");
    assert!(array.is_kind_of(&bridge.get_class("NSArray").unwrap()));
    assert!(!array.is_kind_of(&bridge.get_class("NSString").unwrap()));
    array.release().unwrap();
}
