//! Introspection tests against the simulated runtime

use super::*;
use crate::codec::NativeType;
use crate::config::BridgeConfig;

fn bridge() -> &'static Bridge {
    Bridge::simulated(BridgeConfig::default()).unwrap()
}

#[test]
fn test_get_class_and_missing_class() {
    let bridge = bridge();
    let string = bridge.get_class("NSString").unwrap();
    assert_eq!(string.name(), "NSString");
    assert!(!string.is_meta());
    assert!(bridge.get_class("NSNotAClass").is_none());
    assert!(bridge.require_class("NSNotAClass").is_err());
}

#[test]
fn test_class_handles_are_cached() {
    let bridge = bridge();
    let a = bridge.get_class("NSArray").unwrap();
    let b = bridge.get_class("NSArray").unwrap();
    assert_eq!(a, b);
    assert_eq!(bridge.class_for_ptr(a.as_ptr()), Some(a));
    assert!(bridge.class_for_ptr(std::ptr::null_mut()).is_none());
}

#[test]
fn test_metaclass_and_superclass() {
    let bridge = bridge();
    let string = bridge.get_class("NSString").unwrap();
    let object = bridge.get_class("NSObject").unwrap();

    let meta = bridge.get_metaclass("NSString").unwrap();
    assert!(meta.is_meta());
    assert_eq!(string.metaclass(), Some(meta));

    assert_eq!(bridge.get_superclass(&string), Some(object.clone()));
    assert!(bridge.get_superclass(&object).is_none());
}

#[test]
fn test_inheritance_starts_at_the_class_itself() {
    let bridge = bridge();
    let mutable = bridge.get_class("NSMutableArray").unwrap();
    let chain: Vec<String> = bridge
        .get_inheritance(&mutable)
        .map(|class| class.name().to_string())
        .collect();
    assert_eq!(chain, ["NSMutableArray", "NSArray", "NSObject"]);

    let array = bridge.get_class("NSArray").unwrap();
    assert!(mutable.is_subclass_of(&array));
    assert!(!array.is_subclass_of(&mutable));
}

#[test]
fn test_selectors_share_identity() {
    let bridge = bridge();
    let a = bridge.get_selector("objectAtIndex:").unwrap();
    let b = bridge.get_selector("objectAtIndex:").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.name(), "objectAtIndex:");
    assert_eq!(a.arity(), 1);
    assert_eq!(bridge.get_selector("init").unwrap().arity(), 0);
}

#[test]
fn test_host_selector_names() {
    assert_eq!(host_selector_name("init"), "init");
    assert_eq!(host_selector_name("initWithFrame_"), "initWithFrame:");
    assert_eq!(host_selector_name("setObject_forKey_"), "setObject:forKey:");
    assert_eq!(host_selector_name("_private_"), "_private:");
}

#[test]
fn test_get_methods_filters_by_prefix() {
    let bridge = bridge();
    let number = bridge.get_class("NSNumber").unwrap();

    let inits: Vec<MethodInfo> = bridge.get_methods(&number, &["initWith"]).collect();
    assert!(!inits.is_empty());
    assert!(inits.iter().all(|m| m.name.starts_with("initWith")));

    let double = inits.iter().find(|m| m.name == "initWithDouble:").unwrap();
    assert_eq!(double.arg_types, vec![NativeType::Id, NativeType::Sel, NativeType::F64]);

    let all = bridge.get_methods(&number, &[]).count();
    assert!(all > inits.len());
    assert_eq!(bridge.get_methods(&number, &["zzz"]).count(), 0);
}

#[test]
fn test_get_methods_requeries_each_call() {
    let bridge = bridge();
    let set = bridge.get_class("NSSet").unwrap();
    let first = bridge.get_methods(&set, &[]).count();
    let second = bridge.get_methods(&set, &[]).count();
    assert_eq!(first, second);
    assert!(first > 0);
}

#[test]
fn test_get_ivars_and_ivar_lookup() {
    let bridge = bridge();
    let object = bridge.get_class("NSObject").unwrap();
    let ivars: Vec<IvarInfo> = bridge.get_ivars(&object).collect();
    assert_eq!(ivars.len(), 1);
    assert_eq!(ivars[0].name, "isa");
    assert_eq!(ivars[0].offset, 0);

    // Found through the superclass
    let string = bridge.get_class("NSString").unwrap();
    assert_eq!(string.ivar("isa").map(|i| i.encoding), Some("#".to_string()));
    assert!(string.ivar("missing").is_none());
}

#[test]
fn test_get_properties() {
    let bridge = bridge();
    let screen = bridge.get_class("SimScreen").unwrap();
    let props: Vec<PropertyInfo> = bridge.get_properties(&screen).collect();

    let frame = props.iter().find(|p| p.name == "frame").unwrap();
    assert!(frame.type_encoding().unwrap().starts_with("{CGRect"));
    assert!(frame.is_readonly());

    let scale = props.iter().find(|p| p.name == "backingScaleFactor").unwrap();
    assert_eq!(scale.type_encoding(), Some("d"));
}

#[test]
fn test_protocols() {
    let bridge = bridge();
    let copying = bridge.get_protocol("NSCopying").unwrap();
    assert_eq!(copying.name(), "NSCopying");
    assert!(bridge.get_protocol("NSMissingProtocol").is_none());

    let string = bridge.get_class("NSString").unwrap();
    assert!(string.protocols().any(|p| p.name() == "NSCopying"));
}

#[test]
fn test_method_resolution_and_caches() {
    let bridge = bridge();
    let string = bridge.get_class("NSString").unwrap();

    let length = string.instance_method("length").unwrap();
    assert_eq!(length.name(), "length");
    assert_eq!(length.signature().explicit_arg_count(), 0);
    assert!(!length.implementation().is_null());

    // Inherited from NSObject
    assert!(string.instance_method("retain").is_some());
    assert!(string.responds_to("retain"));
    assert!(!string.responds_to("noSuchMethod"));

    // Class side is separate from the instance side
    assert!(string.class_method("stringWithUTF8String:").is_some());
    assert!(string.instance_method("stringWithUTF8String:").is_none());
    assert!(string.class_method("length").is_none());
}

#[test]
fn test_instance_size_grows_with_ivars() {
    let bridge = bridge();
    let object = bridge.get_class("NSObject").unwrap();
    assert_eq!(object.instance_size(), std::mem::size_of::<usize>());
}
