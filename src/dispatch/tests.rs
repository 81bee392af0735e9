//! Dispatch tests: entry-point selection, marshalling, sends

use super::marshal::{self, read_return, read_value, write_value, Keepalive, MarshalError, Slot};
use super::*;
use crate::bridge::Bridge;
use crate::codec::{split_one, to_native_type, NativeType};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::sim::{self, SimRuntime};
use crate::value::{StructValue, Value};

fn bridge() -> &'static Bridge {
    Bridge::simulated(BridgeConfig::default()).unwrap()
}

fn native(encoding: &str) -> NativeType {
    to_native_type(&split_one(encoding).unwrap(), None).unwrap()
}

// ============================================================================
// Entry-point selection
// ============================================================================

#[test]
fn test_classify_x86_64() {
    let arch = Arch::X86_64;
    assert_eq!(SendKind::classify(&native("@"), arch), SendKind::Send);
    assert_eq!(SendKind::classify(&native("d"), arch), SendKind::Send);
    assert_eq!(SendKind::classify(&native("D"), arch), SendKind::SendFpret);
    assert_eq!(SendKind::classify(&native("{CGPoint=dd}"), arch), SendKind::Send);
    assert_eq!(SendKind::classify(&native("{CGRect}"), arch), SendKind::SendStret);
}

#[test]
fn test_classify_x86() {
    let arch = Arch::X86;
    assert_eq!(SendKind::classify(&native("f"), arch), SendKind::SendFpret);
    assert_eq!(SendKind::classify(&native("d"), arch), SendKind::SendFpret);
    assert_eq!(SendKind::classify(&native("i"), arch), SendKind::Send);
    assert_eq!(SendKind::classify(&native("{Pair=ii}"), arch), SendKind::Send);
    assert_eq!(SendKind::classify(&native("{Triple=iii}"), arch), SendKind::SendStret);
}

#[test]
fn test_classify_arm_families() {
    let rect = native("{CGRect}");
    assert_eq!(SendKind::classify(&rect, Arch::Aarch64), SendKind::Send);
    assert_eq!(SendKind::classify(&native("D"), Arch::Aarch64), SendKind::Send);
    assert_eq!(SendKind::classify(&native("{Pair=ii}"), Arch::Arm), SendKind::SendStret);
    assert_eq!(SendKind::classify(&native("{One=i}"), Arch::Arm), SendKind::Send);
}

#[test]
fn test_super_kinds_keep_return_convention() {
    assert_eq!(SendKind::Send.to_super(), SendKind::SendSuper);
    assert_eq!(SendKind::SendFpret.to_super(), SendKind::SendSuper);
    assert_eq!(SendKind::SendStret.to_super(), SendKind::SendSuperStret);
    assert!(SendKind::SendSuperStret.is_stret());
    assert!(SendKind::SendSuperStret.is_super());
    assert!(!SendKind::SendFpret.is_stret());
    assert_eq!(SendKind::SendStret.symbol(), "objc_msgSend_stret");
}

// ============================================================================
// long double formats
// ============================================================================

#[test]
fn test_x87_known_encoding() {
    let one = marshal::to_x87(1.0);
    assert_eq!(one, [0, 0, 0, 0, 0, 0, 0, 0x80, 0xff, 0x3f]);
    let minus_two = marshal::to_x87(-2.0);
    assert_eq!(&minus_two[8..], &[0x00, 0xc0]);
}

#[test]
fn test_x87_preserves_doubles() {
    for value in [0.0, -0.0, 1.5, -2.25e-300, 6.02214076e23, f64::MAX, f64::MIN_POSITIVE, 5e-324] {
        let back = marshal::from_x87(marshal::to_x87(value));
        assert_eq!(back.to_bits(), value.to_bits(), "{}", value);
    }
    assert_eq!(marshal::from_x87(marshal::to_x87(f64::INFINITY)), f64::INFINITY);
    assert!(marshal::from_x87(marshal::to_x87(f64::NAN)).is_nan());
}

#[test]
fn test_long_double_below_one() {
    assert_eq!(marshal::to_x87(0.5), [0, 0, 0, 0, 0, 0, 0, 0x80, 0xfe, 0x3f]);
    assert_eq!(&marshal::to_x87(-0.25)[8..], &[0xfd, 0xbf]);
    // Smallest subnormal double is 2^-1074
    assert_eq!(marshal::to_x87(5e-324), [0, 0, 0, 0, 0, 0, 0, 0x80, 0xcd, 0x3b]);
    assert_eq!(marshal::to_binary128(0.5), 0x3ffeu128 << 112);
    assert_eq!(marshal::to_binary128(-0.5), (0xbffeu128) << 112);

    let bridge = bridge();
    for value in [0.5, -0.1, 1e-5, -2.25e-300, 2.2250738585072014e-308, 4.9e-320] {
        assert_eq!(write(bridge, "D", &Value::Float(value)).unwrap(), Value::Float(value));
        assert_eq!(marshal::from_binary128(marshal::to_binary128(value)).to_bits(), value.to_bits());
    }
}

#[test]
fn test_binary128_preserves_doubles() {
    assert_eq!(marshal::to_binary128(1.0), 0x3fffu128 << 112);
    for value in [0.0, 3.0, -1.0e10, 1.0e-310, f64::MAX, 5e-324] {
        let back = marshal::from_binary128(marshal::to_binary128(value));
        assert_eq!(back.to_bits(), value.to_bits(), "{}", value);
    }
    assert_eq!(marshal::from_binary128(marshal::to_binary128(f64::NEG_INFINITY)), f64::NEG_INFINITY);
}

// ============================================================================
// Marshalling
// ============================================================================

fn write(bridge: &'static Bridge, encoding: &str, value: &Value) -> Result<Value, MarshalError> {
    let ty = native(encoding);
    let mut slot = Slot::new(ty.size());
    let mut keep = Keepalive::new();
    let written = unsafe { write_value(bridge, &ty, value, slot.as_mut_ptr(), &mut keep) };
    let read = written.map(|_| unsafe { read_value(bridge, &ty, slot.as_ptr()) });
    keep.release(bridge);
    read
}

#[test]
fn test_integer_range_checks() {
    let bridge = bridge();
    assert_eq!(write(bridge, "c", &Value::Int(-100)).unwrap(), Value::Int(-100));
    assert!(matches!(write(bridge, "C", &Value::Int(300)), Err(MarshalError::Mismatch { .. })));
    assert!(matches!(write(bridge, "I", &Value::Int(-1)), Err(MarshalError::Mismatch { .. })));
    assert_eq!(write(bridge, "Q", &Value::UInt(u64::MAX)).unwrap(), Value::UInt(u64::MAX));
    assert!(matches!(write(bridge, "q", &Value::UInt(u64::MAX)), Err(MarshalError::Mismatch { .. })));
    assert!(matches!(write(bridge, "i", &Value::Str("1".into())), Err(MarshalError::Mismatch { .. })));
}

#[test]
fn test_floats_and_bools() {
    let bridge = bridge();
    assert_eq!(write(bridge, "d", &Value::Float(2.5)).unwrap(), Value::Float(2.5));
    assert_eq!(write(bridge, "f", &Value::Int(3)).unwrap(), Value::Float(3.0));
    assert!(matches!(write(bridge, "d", &Value::Bool(true)), Err(MarshalError::Mismatch { .. })));
    assert_eq!(write(bridge, "B", &Value::Bool(true)).unwrap(), Value::Bool(true));
    assert_eq!(write(bridge, "D", &Value::Float(-0.75)).unwrap(), Value::Float(-0.75));
}

#[test]
fn test_c_strings_selectors_classes() {
    let bridge = bridge();
    assert_eq!(write(bridge, "*", &Value::Str("hello".into())).unwrap(), Value::Str("hello".into()));
    assert_eq!(write(bridge, "*", &Value::Nil).unwrap(), Value::Nil);

    let sel = write(bridge, ":", &Value::Str("count".into())).unwrap();
    assert_eq!(sel, Value::Selector(bridge.selector("count").unwrap()));

    let class = write(bridge, "#", &Value::Str("NSArray".into())).unwrap();
    assert_eq!(class.as_class().map(|c| c.name().to_string()), Some("NSArray".to_string()));
    assert!(matches!(
        write(bridge, "#", &Value::Str("NSMissing".into())),
        Err(MarshalError::Failed(BridgeError::Lookup { .. }))
    ));
}

#[test]
fn test_structs_arrays_unions() {
    let bridge = bridge();
    let point = Value::Struct(StructValue::new("CGPoint", vec![Value::Float(1.0), Value::Float(2.0)]));
    assert_eq!(write(bridge, "{CGPoint=dd}", &point).unwrap(), point);

    // Lists are accepted for structs
    let from_list = write(bridge, "{CGPoint=dd}", &Value::List(vec![3.0.into(), 4.0.into()])).unwrap();
    assert_eq!(from_list.as_struct().unwrap().flatten_f64(), Some(vec![3.0, 4.0]));

    assert!(matches!(
        write(bridge, "{CGPoint=dd}", &Value::List(vec![1.0.into()])),
        Err(MarshalError::Mismatch { .. })
    ));

    let array = Value::List(vec![1.into(), 2.into(), 3.into()]);
    assert_eq!(write(bridge, "[3i]", &array).unwrap(), array);
    assert!(write(bridge, "[4i]", &array).is_err());

    assert_eq!(write(bridge, "(Number=iq)", &Value::Int(9)).unwrap(), Value::Int(9));
}

#[test]
fn test_return_words_are_narrowed() {
    let bridge = bridge();
    let mut slot = Slot::new(8);
    unsafe {
        std::ptr::write_unaligned(slot.as_mut_ptr() as *mut u64, 0xdead_beef_ffff_ffff);
        assert_eq!(read_return(bridge, &NativeType::I32, slot.as_ptr()), Value::Int(-1));
        assert_eq!(read_return(bridge, &NativeType::U16, slot.as_ptr()), Value::UInt(0xffff));
        std::ptr::write_unaligned(slot.as_mut_ptr() as *mut u64, 0x100);
        assert_eq!(read_return(bridge, &NativeType::Bool, slot.as_ptr()), Value::Bool(false));
    }
}

// ============================================================================
// Sends
// ============================================================================

#[test]
fn test_class_and_instance_sends() {
    let bridge = bridge();
    let number = bridge.get_class("NSNumber").unwrap();
    bridge
        .with_autorelease_pool(|| {
            let n = number.send("numberWithInt:", &[Value::Int(42)])?;
            let n = n.as_instance().unwrap();
            assert_eq!(n.class_name(), "NSNumber");
            assert_eq!(n.send("intValue", &[])?, Value::Int(42));
            assert_eq!(n.call("doubleValue", &[])?, Value::Float(42.0));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_bound_method() {
    let bridge = bridge();
    let string = bridge.get_class("NSString").unwrap();
    bridge
        .with_autorelease_pool(|| {
            let s = string.send("stringWithUTF8String:", &[Value::Str("bridge".into())])?;
            let s = s.as_instance().unwrap();
            let length = s.method("length")?;
            assert_eq!(length.selector().name(), "length");
            assert_eq!(length.signature().explicit_arg_count(), 0);
            assert_eq!(length.receiver(), s.address());
            assert_eq!(length.call(&[])?, Value::UInt(6));
            assert!(format!("{:?}", length).starts_with("BoundMethod(-[NSString length]"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_send_to_nil_returns_nil() {
    let nil = crate::lifecycle::Instance::nil();
    assert_eq!(nil.send("anything:", &[Value::Int(1)]).unwrap(), Value::Nil);
}

#[test]
fn test_argument_count_checked_before_sending() {
    let bridge = bridge();
    let number = bridge.get_class("NSNumber").unwrap();
    let before = sim::messages_on_this_thread();
    let sent = bridge.stats().messages_sent;

    let error = number.send("numberWithInt:", &[]).unwrap_err();
    match &error {
        BridgeError::Argument { selector, expected, found, call_shape } => {
            assert_eq!(selector, "numberWithInt:");
            assert_eq!((*expected, *found), (1, 0));
            assert!(call_shape.contains("int32"), "{}", call_shape);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(error.is_pre_call());
    assert!(number
        .send("numberWithInt:", &[Value::Int(1), Value::Int(2)])
        .is_err());

    assert_eq!(sim::messages_on_this_thread(), before);
    assert_eq!(bridge.stats().messages_sent, sent);
    assert_eq!(bridge.stats().argument_errors, 2);
}

#[test]
fn test_type_error_names_the_argument() {
    let bridge = bridge();
    let number = bridge.get_class("NSNumber").unwrap();
    let before = sim::messages_on_this_thread();
    let error = number
        .send("numberWithInt:", &[Value::Str("seven".into())])
        .unwrap_err();
    assert!(matches!(error, BridgeError::Type { index: 0, .. }), "{:?}", error);
    assert_eq!(sim::messages_on_this_thread(), before);
}

#[test]
fn test_missing_method_is_a_lookup_error() {
    let bridge = bridge();
    let object = bridge.get_class("NSObject").unwrap();
    let error = object.send("noSuchClassMethod", &[]).unwrap_err();
    assert!(matches!(error, BridgeError::Lookup { .. }));
    assert!(error.to_string().contains("+[NSObject noSuchClassMethod]"));
}

#[test]
fn test_struct_returns_both_conventions() {
    let bridge = bridge();
    let screen = bridge.get_class("SimScreen").unwrap();
    let main = screen.send("mainScreen", &[]).unwrap();
    let main = main.as_instance().unwrap();

    // 32 bytes: memory return on x86_64
    let frame = main.send("frame", &[]).unwrap();
    let frame = frame.as_struct().unwrap();
    assert_eq!(frame.name, "CGRect");
    assert_eq!(frame.flatten_f64(), Some(vec![0.0, 0.0, 1440.0, 900.0]));

    let visible = main.send("visibleFrame", &[]).unwrap();
    let visible = visible.as_struct().unwrap().flatten_f64().unwrap();
    assert_eq!(visible, vec![0.0, 25.0, 1440.0, 875.0]);

    // 16 bytes: register return
    let origin = main.send("origin", &[]).unwrap();
    assert_eq!(origin.as_struct().unwrap().flatten_f64(), Some(vec![0.0, 0.0]));
}

#[test]
fn test_scalar_returns_and_struct_arguments() {
    let bridge = bridge();
    let screen = bridge.get_class("SimScreen").unwrap();
    let main = screen.send("mainScreen", &[]).unwrap();
    let main = main.as_instance().unwrap();

    assert_eq!(main.send("backingScaleFactor", &[]).unwrap(), Value::Float(2.0));
    assert_eq!(main.send("brightness", &[]).unwrap(), Value::Float(0.75));
    assert_eq!(main.send("depth", &[]).unwrap(), Value::Int(24));

    let inside = Value::Struct(StructValue::new("CGPoint", vec![10.0.into(), 10.0.into()]));
    let outside = Value::List(vec![(-1.0).into(), 0.0.into()]);
    assert_eq!(main.send("containsPoint:", &[inside]).unwrap(), Value::Bool(true));
    assert_eq!(main.send("containsPoint:", &[outside]).unwrap(), Value::Bool(false));
}

#[test]
fn test_prepared_calls_are_shared() {
    let sim = SimRuntime::new();
    let bridge = Bridge::with_runtime(Box::new(sim), BridgeConfig::default()).unwrap();
    let screen = bridge.get_class("SimScreen").unwrap();
    let main = screen.send("mainScreen", &[]).unwrap();
    let main = main.as_instance().unwrap();

    main.send("frame", &[]).unwrap();
    let prepared = bridge.calls.len();
    main.send("frame", &[]).unwrap();
    // Same shape as frame
    main.send("visibleFrame", &[]).unwrap();
    assert_eq!(bridge.calls.len(), prepared);
    assert_eq!(bridge.stats().messages_sent, sim.messages_sent());
}

#[test]
fn test_send_with_explicit_signature() {
    let bridge = bridge();
    let array = bridge.get_class("NSMutableArray").unwrap();
    let list = array.send("new", &[]).unwrap();
    let list = list.as_instance().unwrap().clone();
    list.send_with_signature("addObject:", "v@:@", &[Value::Str("x".into())])
        .unwrap();
    assert_eq!(list.send("count", &[]).unwrap(), Value::UInt(1));
    list.release().unwrap();
}
