//! Runtime-level tests for the simulator, below the bridge

use super::*;
use crate::runtime::{c_string, ObjcRuntime};
use std::ffi::CString;
use std::sync::atomic::AtomicUsize;

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn instance_of(sim: &SimRuntime, class: &str) -> Id {
    let class = sim.state.registered_class(class).unwrap();
    sim.state.alloc_instance(class)
}

#[test]
fn test_seeded_classes_resolve() {
    let sim = SimRuntime::new();
    let object = sim.get_class(&cstr("NSObject"));
    let string = sim.get_class(&cstr("NSString"));
    assert!(!object.is_null());
    assert!(!string.is_null());
    assert!(sim.get_class(&cstr("NSDefinitelyMissing")).is_null());

    unsafe {
        assert_eq!(sim.superclass(string), object);
        assert!(sim.superclass(object).is_null());
        let meta = sim.get_meta_class(&cstr("NSObject"));
        assert!(sim.is_meta_class(meta));
        assert!(!sim.is_meta_class(object));
        // Root metaclass inherits from the root class
        assert_eq!(sim.superclass(meta), object);
    }
}

#[test]
fn test_selectors_are_interned() {
    let sim = SimRuntime::new();
    let a = sim.register_selector(&cstr("initWithFrame:"));
    let b = sim.register_selector(&cstr("initWithFrame:"));
    let c = sim.register_selector(&cstr("init"));
    assert_eq!(a, b);
    assert_ne!(a, c);
    let name = unsafe { c_string(sim.selector_name(a)) };
    assert_eq!(name.as_deref(), Some("initWithFrame:"));
}

#[test]
fn test_class_pair_names_are_unique() {
    let sim = SimRuntime::new();
    let root = sim.get_class(&cstr("NSObject"));
    unsafe {
        let first = sim.allocate_class_pair(root, &cstr("SimWidget"), 0);
        assert!(!first.is_null());
        assert!(sim.allocate_class_pair(root, &cstr("SimWidget"), 0).is_null());
        assert!(sim.allocate_class_pair(root, &cstr("NSObject"), 0).is_null());

        // Invisible by name until registered
        assert!(sim.get_class(&cstr("SimWidget")).is_null());
        sim.register_class_pair(first);
        assert_eq!(sim.get_class(&cstr("SimWidget")), first);
    }
}

#[test]
fn test_ivars_frozen_after_registration() {
    let sim = SimRuntime::new();
    let root = sim.get_class(&cstr("NSObject"));
    unsafe {
        let cls = sim.allocate_class_pair(root, &cstr("SimFrozen"), 0);
        let base = sim.instance_size(cls);
        assert!(sim.add_ivar(cls, &cstr("count"), 4, 2, &cstr("i")));
        assert!(sim.add_ivar(cls, &cstr("total"), 8, 3, &cstr("q")));
        assert!(!sim.add_ivar(cls, &cstr("count"), 4, 2, &cstr("i")));
        sim.register_class_pair(cls);
        assert!(!sim.add_ivar(cls, &cstr("late"), 8, 3, &cstr("q")));

        let total = sim.instance_variable(cls, &cstr("total"));
        assert!(!total.is_null());
        assert_eq!(sim.ivar_offset(total) as usize % 8, 0);
        assert!(sim.instance_size(cls) >= base + 12);
        assert!(sim.instance_variable(cls, &cstr("late")).is_null());
    }
}

#[test]
fn test_ivar_lookup_searches_ancestors() {
    let sim = SimRuntime::new();
    let string = sim.get_class(&cstr("NSString"));
    unsafe {
        assert!(!sim.instance_variable(string, &cstr("isa")).is_null());
    }
}

#[test]
fn test_retain_release_dealloc() {
    let sim = SimRuntime::new();
    let obj = instance_of(&sim, "NSObject");
    let before = sim.live_objects();
    unsafe {
        assert_eq!(sim.retain_count(obj), 1);
        sim.state.retain(obj);
        assert_eq!(sim.retain_count(obj), 2);
        sim.state.release(obj);
        assert!(sim.is_live(obj as usize));
        sim.state.release(obj);
    }
    assert!(!sim.is_live(obj as usize));
    assert_eq!(sim.live_objects(), before - 1);
}

#[test]
fn test_retained_association_dies_with_owner() {
    let sim = SimRuntime::new();
    let owner = instance_of(&sim, "NSObject");
    let helper = instance_of(&sim, "NSObject");
    static KEY: u8 = 0;
    let key = &KEY as *const u8 as *const std::ffi::c_void;

    unsafe {
        sim.set_associated_object(owner, key, helper, AssociationPolicy::RetainNonatomic);
        assert_eq!(sim.retain_count(helper), 2);
        assert_eq!(sim.get_associated_object(owner, key), helper);
    }
    sim.state.release(helper);
    assert!(sim.is_live(helper as usize));

    sim.state.release(owner);
    assert!(!sim.is_live(owner as usize));
    assert!(!sim.is_live(helper as usize));
}

#[test]
fn test_assign_association_does_not_retain() {
    let sim = SimRuntime::new();
    let owner = instance_of(&sim, "NSObject");
    let other = instance_of(&sim, "NSObject");
    static KEY: u8 = 0;
    let key = &KEY as *const u8 as *const std::ffi::c_void;

    unsafe {
        sim.set_associated_object(owner, key, other, AssociationPolicy::Assign);
        assert_eq!(sim.retain_count(other), 1);
    }
    sim.state.release(owner);
    assert!(sim.is_live(other as usize));
    sim.state.release(other);
}

#[test]
fn test_nested_pools_drain_innermost_first() {
    let sim = SimRuntime::new();
    let outer_obj = instance_of(&sim, "NSObject");
    let inner_obj = instance_of(&sim, "NSObject");

    let outer = sim.autorelease_pool_push();
    sim.state.autorelease(outer_obj);
    let inner = sim.autorelease_pool_push();
    sim.state.autorelease(inner_obj);

    unsafe { sim.autorelease_pool_pop(inner) };
    assert!(!sim.is_live(inner_obj as usize));
    assert!(sim.is_live(outer_obj as usize));

    unsafe { sim.autorelease_pool_pop(outer) };
    assert!(!sim.is_live(outer_obj as usize));
}

#[test]
fn test_popping_outer_pool_drains_inner_pools() {
    let sim = SimRuntime::new();
    let obj = instance_of(&sim, "NSObject");
    let outer = sim.autorelease_pool_push();
    let _inner = sim.autorelease_pool_push();
    sim.state.autorelease(obj);
    unsafe { sim.autorelease_pool_pop(outer) };
    assert!(!sim.is_live(obj as usize));
}

#[test]
fn test_immortal_objects_ignore_release() {
    let sim = SimRuntime::new();
    let obj = instance_of(&sim, "NSObject");
    sim.state.make_immortal(obj);
    sim.state.release(obj);
    sim.state.release(obj);
    assert!(sim.is_live(obj as usize));
    assert_eq!(unsafe { sim.retain_count(obj) }, u32::MAX as usize);
}

#[test]
fn test_method_lists_are_heap_allocated() {
    let sim = SimRuntime::new();
    let string = sim.get_class(&cstr("NSString"));
    let mut count = 0;
    unsafe {
        let list = sim.copy_method_list(string, &mut count);
        assert!(count > 0);
        assert!(!list.is_null());
        let names: Vec<String> = (0..count as usize)
            .filter_map(|i| c_string(sim.selector_name(sim.method_name(*list.add(i)))))
            .collect();
        libc::free(list as *mut std::ffi::c_void);
        assert!(names.iter().any(|n| n == "UTF8String"));
        // Inherited methods are not listed
        assert!(!names.iter().any(|n| n == "retain"));
    }
}

#[test]
fn test_method_replacement_returns_previous() {
    let sim = SimRuntime::new();
    let object = sim.get_class(&cstr("NSObject"));
    let sel = sim.register_selector(&cstr("hash"));
    unsafe {
        let method = sim.instance_method(object, sel);
        let original = sim.method_implementation(method);
        let types = cstr("Q@:");
        assert!(!sim.add_method(object, sel, original, &types));
        let previous = sim.replace_method(object, sel, original, &types);
        assert_eq!(previous, original);
    }
}

#[test]
fn test_protocols_and_properties() {
    let sim = SimRuntime::new();
    let object = sim.get_class(&cstr("NSObject"));
    let protocol = sim.get_protocol(&cstr("NSObject"));
    assert!(!protocol.is_null());
    assert!(sim.get_protocol(&cstr("NSMissingProtocol")).is_null());

    let mut count = 0;
    unsafe {
        let list = sim.copy_property_list(object, &mut count);
        let names: Vec<String> = (0..count as usize)
            .filter_map(|i| c_string(sim.property_name(*list.add(i))))
            .collect();
        libc::free(list as *mut std::ffi::c_void);
        assert!(names.iter().any(|n| n == "description"));
    }
}

static RAISED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn counting_handler(exception: Id) {
    if !exception.is_null() {
        RAISED.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_raise_reaches_installed_handler() {
    let sim = SimRuntime::new();
    let before = sim.live_objects();
    sim.set_uncaught_exception_handler(Some(counting_handler));
    sim.raise("NSGenericException", "test");
    assert_eq!(RAISED.load(Ordering::SeqCst), 1);
    // The exception and its strings are released afterwards
    assert_eq!(sim.live_objects(), before);

    sim.set_uncaught_exception_handler(None);
    sim.raise("NSGenericException", "unhandled");
    assert_eq!(RAISED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_runtimes_are_independent() {
    let a = SimRuntime::new();
    let b = SimRuntime::new();
    let name = cstr("NSObject");
    assert_ne!(a.get_class(&name), b.get_class(&name));
    unsafe {
        let cls = a.allocate_class_pair(a.get_class(&name), &cstr("OnlyInA"), 0);
        a.register_class_pair(cls);
    }
    assert!(!a.get_class(&cstr("OnlyInA")).is_null());
    assert!(b.get_class(&cstr("OnlyInA")).is_null());
}
