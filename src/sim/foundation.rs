//! Seeded classes
//!
//! A small Foundation-like surface: the root class, value classes with
//! the conversion entry points the bridge uses, collections, exceptions,
//! and `SimScreen`, which vends struct-returning methods.

use super::class::{SimClass, SimProtocol};
use super::object::{class_of, Number, Payload};
use super::SimState;
use crate::logging::error;
use crate::runtime::{Id, Imp, Sel};
use std::ffi::{c_char, CStr, CString};

type Bool = u8;
const YES: Bool = 1;
const NO: Bool = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CGPoint {
    x: f64,
    y: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CGSize {
    width: f64,
    height: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CGRect {
    origin: CGPoint,
    size: CGSize,
}

const SCREEN_FRAME: CGRect = CGRect {
    origin: CGPoint { x: 0.0, y: 0.0 },
    size: CGSize { width: 1440.0, height: 900.0 },
};
const SCREEN_VISIBLE_FRAME: CGRect = CGRect {
    origin: CGPoint { x: 0.0, y: 25.0 },
    size: CGSize { width: 1440.0, height: 875.0 },
};
const RECT: &str = "{CGRect={CGPoint=dd}{CGSize=dd}}";

pub(super) fn seed(state: &'static SimState) {
    if seed_classes(state).is_none() {
        error!("Seeding the simulated runtime failed");
    }
}

fn seed_classes(state: &'static SimState) -> Option<()> {
    let ns_object = state.protocol("NSObject");
    let ns_copying = state.protocol("NSCopying");

    let object = state.allocate_pair(None, "NSObject")?;
    object.add_ivar(c("isa"), std::mem::size_of::<usize>(), 3, c("#"));
    object.add_protocol(ns_object);
    object.add_property("hash", "TQ,R");
    object.add_property("description", "T@\"NSString\",R,C");
    class_side(state, object, "alloc", object_alloc as usize, "@#:");
    class_side(state, object, "new", object_new as usize, "@#:");
    class_side(state, object, "class", object_self as usize, "#@:");
    methods(state, object, &[
        ("init", object_self as usize, "@16@0:8"),
        ("self", object_self as usize, "@@:"),
        ("retain", object_retain as usize, "@@:"),
        ("release", object_release as usize, "v@:"),
        ("autorelease", object_autorelease as usize, "@@:"),
        ("retainCount", object_retain_count as usize, "Q@:"),
        ("dealloc", object_dealloc as usize, "v@:"),
        ("finalize", object_finalize as usize, "v@:"),
        ("class", object_class as usize, "#@:"),
        ("isKindOfClass:", object_is_kind as usize, "B@:#"),
        ("isMemberOfClass:", object_is_member as usize, "B@:#"),
        ("respondsToSelector:", object_responds as usize, "B@::"),
        ("conformsToProtocol:", object_conforms as usize, "B@:@"),
        ("isEqual:", object_is_equal as usize, "B24@0:8@16"),
        ("hash", object_hash as usize, "Q@:"),
        ("description", object_description as usize, "@@:"),
    ]);
    state.register(object);

    let string = state.allocate_pair(Some(object), "NSString")?;
    string.add_protocol(ns_copying);
    string.add_property("length", "TQ,R");
    class_side(state, string, "stringWithUTF8String:", string_with_utf8 as usize, "@#:r*");
    methods(state, string, &[
        ("initWithUTF8String:", string_init_utf8 as usize, "@@:r*"),
        ("UTF8String", string_utf8 as usize, "r*16@0:8"),
        ("length", string_length as usize, "Q@:"),
        ("isEqualToString:", string_is_equal as usize, "B@:@"),
        ("description", object_self as usize, "@@:"),
    ]);
    state.register(string);

    let number = state.allocate_pair(Some(object), "NSNumber")?;
    number.add_protocol(ns_copying);
    class_side(state, number, "numberWithBool:", number_with_bool as usize, "@#:B");
    class_side(state, number, "numberWithInt:", number_with_int as usize, "@#:i");
    class_side(state, number, "numberWithLongLong:", number_with_long_long as usize, "@#:q");
    class_side(state, number, "numberWithUnsignedLongLong:", number_with_ulong_long as usize, "@#:Q");
    class_side(state, number, "numberWithDouble:", number_with_double as usize, "@#:d");
    methods(state, number, &[
        ("initWithBool:", number_init_bool as usize, "@@:B"),
        ("initWithInt:", number_init_int as usize, "@@:i"),
        ("initWithLongLong:", number_init_long_long as usize, "@@:q"),
        ("initWithUnsignedLongLong:", number_init_ulong_long as usize, "@@:Q"),
        ("initWithDouble:", number_init_double as usize, "@24@0:8d16"),
        ("boolValue", number_bool_value as usize, "B@:"),
        ("intValue", number_int_value as usize, "i@:"),
        ("longLongValue", number_long_long_value as usize, "q@:"),
        ("unsignedLongLongValue", number_ulong_long_value as usize, "Q@:"),
        ("doubleValue", number_double_value as usize, "d@:"),
        ("objCType", number_objc_type as usize, "r*@:"),
        ("description", number_description as usize, "@@:"),
    ]);
    state.register(number);

    let array = state.allocate_pair(Some(object), "NSArray")?;
    array.add_protocol(ns_copying);
    array.add_property("count", "TQ,R");
    class_side(state, array, "arrayWithObjects:count:", array_with_objects as usize, "@#:^@Q");
    methods(state, array, &[
        ("initWithObjects:count:", array_init_objects as usize, "@@:^@Q"),
        ("count", collection_count as usize, "Q@:"),
        ("objectAtIndex:", array_object_at as usize, "@@:Q"),
        ("containsObject:", collection_contains as usize, "B@:@"),
    ]);
    state.register(array);

    let mutable = state.allocate_pair(Some(array), "NSMutableArray")?;
    methods(state, mutable, &[
        ("addObject:", array_add_object as usize, "v@:@"),
        ("removeAllObjects", array_remove_all as usize, "v@:"),
    ]);
    state.register(mutable);

    let dict = state.allocate_pair(Some(object), "NSDictionary")?;
    dict.add_protocol(ns_copying);
    class_side(state, dict, "dictionaryWithObjects:forKeys:count:", dict_with_objects as usize, "@#:^@^@Q");
    methods(state, dict, &[
        ("initWithObjects:forKeys:count:", dict_init_objects as usize, "@@:^@^@Q"),
        ("count", collection_count as usize, "Q@:"),
        ("objectForKey:", dict_object_for_key as usize, "@@:@"),
        ("allKeys", dict_all_keys as usize, "@@:"),
        ("allValues", dict_all_values as usize, "@@:"),
    ]);
    state.register(dict);

    let set = state.allocate_pair(Some(object), "NSSet")?;
    class_side(state, set, "setWithObjects:count:", set_with_objects as usize, "@#:^@Q");
    methods(state, set, &[
        ("initWithObjects:count:", set_init_objects as usize, "@@:^@Q"),
        ("count", collection_count as usize, "Q@:"),
        ("allObjects", set_all_objects as usize, "@@:"),
        ("containsObject:", collection_contains as usize, "B@:@"),
    ]);
    state.register(set);

    let null = state.allocate_pair(Some(object), "NSNull")?;
    class_side(state, null, "null", null_singleton as usize, "@#:");
    state.register(null);

    let exception = state.allocate_pair(Some(object), "NSException")?;
    exception.add_property("name", "T@\"NSString\",R,C");
    exception.add_property("reason", "T@\"NSString\",R,C");
    class_side(
        state,
        exception,
        "exceptionWithName:reason:userInfo:",
        exception_with_name as usize,
        "@#:@@@",
    );
    methods(state, exception, &[
        ("initWithName:reason:userInfo:", exception_init as usize, "@@:@@@"),
        ("name", exception_name as usize, "@@:"),
        ("reason", exception_reason as usize, "@@:"),
        ("raise", exception_raise as usize, "v@:"),
    ]);
    state.register(exception);

    let screen = state.allocate_pair(Some(object), "SimScreen")?;
    screen.add_property("frame", &format!("T{},R,N", RECT));
    screen.add_property("backingScaleFactor", "Td,R,N");
    class_side(state, screen, "mainScreen", screen_main as usize, "@#:");
    let rect_getter = format!("{}16@0:8", RECT);
    methods(state, screen, &[
        ("frame", screen_frame as usize, rect_getter.as_str()),
        ("visibleFrame", screen_visible_frame as usize, rect_getter.as_str()),
        ("origin", screen_origin as usize, "{CGPoint=dd}@:"),
        ("backingScaleFactor", screen_scale as usize, "d16@0:8"),
        ("brightness", screen_brightness as usize, "f@:"),
        ("depth", screen_depth as usize, "i@:"),
        ("containsPoint:", screen_contains as usize, "B@:{CGPoint=dd}"),
    ]);
    state.register(screen);

    Some(())
}

fn c(text: &str) -> CString {
    CString::new(text).unwrap_or_default()
}

fn methods(state: &SimState, class: &SimClass, table: &[(&str, usize, &str)]) {
    for (name, imp, types) in table {
        class.add_method(state.intern(name), *imp as Imp, c(types));
    }
}

fn class_side(state: &SimState, class: &SimClass, name: &str, imp: usize, types: &str) {
    if let Some(meta) = unsafe { class.isa.as_ref() } {
        meta.add_method(state.intern(name), imp as Imp, c(types));
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
unsafe fn state(obj: Id) -> &'static SimState {
    &*(*class_of(obj)).state
}

/// Class pointer for a class-method receiver
#[inline]
unsafe fn receiver_class(this: Id) -> Option<&'static SimClass> {
    (this as *const SimClass).as_ref()
}

/// Fresh autoreleased instance of `this`, a class
unsafe fn alloc_autoreleased(this: Id) -> Option<(&'static SimState, Id)> {
    let state = state(this);
    let class = receiver_class(this)?;
    let obj = state.alloc_instance(class);
    Some((state, state.autorelease(obj)))
}

fn new_instance(state: &'static SimState, class: &str) -> Id {
    match state.registered_class(class) {
        Some(class) => state.alloc_instance(class),
        None => std::ptr::null_mut(),
    }
}

/// Owned array retaining `items`
fn new_array(state: &'static SimState, items: Vec<usize>) -> Id {
    for item in &items {
        state.retain(*item as Id);
    }
    let array = new_instance(state, "NSArray");
    state.set_payload(array, Payload::Array(items));
    array
}

unsafe fn objects_from(objects: *const Id, count: u64) -> Vec<usize> {
    if objects.is_null() {
        return Vec::new();
    }
    (0..count as usize)
        .map(|i| *objects.add(i) as usize)
        .filter(|obj| *obj != 0)
        .collect()
}

fn number(state: &SimState, obj: Id) -> Number {
    state
        .with_payload(obj, |p| match p {
            Payload::Number(n) => *n,
            _ => Number::Int(0),
        })
        .unwrap_or(Number::Int(0))
}

fn items(state: &SimState, obj: Id) -> Vec<usize> {
    state
        .with_payload(obj, |p| match p {
            Payload::Array(items) | Payload::Set(items) => items.clone(),
            Payload::Dict(pairs) => pairs.iter().map(|(k, _)| *k).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

fn pairs(state: &SimState, obj: Id) -> Vec<(usize, usize)> {
    state
        .with_payload(obj, |p| match p {
            Payload::Dict(pairs) => pairs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

#[inline]
fn flag(value: bool) -> Bool {
    if value {
        YES
    } else {
        NO
    }
}

// ============================================================================
// NSObject
// ============================================================================

unsafe extern "C" fn object_alloc(this: Id, _sel: Sel) -> Id {
    match receiver_class(this) {
        Some(class) => state(this).alloc_instance(class),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn object_new(this: Id, sel: Sel) -> Id {
    let obj = object_alloc(this, sel);
    state(this).send_id(obj, "init")
}

unsafe extern "C" fn object_self(this: Id, _sel: Sel) -> Id {
    this
}

unsafe extern "C" fn object_retain(this: Id, _sel: Sel) -> Id {
    state(this).retain(this)
}

unsafe extern "C" fn object_release(this: Id, _sel: Sel) {
    state(this).release(this)
}

unsafe extern "C" fn object_autorelease(this: Id, _sel: Sel) -> Id {
    state(this).autorelease(this)
}

unsafe extern "C" fn object_retain_count(this: Id, _sel: Sel) -> u64 {
    state(this).retain_count_of(this) as u64
}

unsafe extern "C" fn object_dealloc(this: Id, _sel: Sel) {
    state(this).destroy(this)
}

unsafe extern "C" fn object_finalize(_this: Id, _sel: Sel) {}

unsafe extern "C" fn object_class(this: Id, _sel: Sel) -> Id {
    class_of(this) as Id
}

unsafe extern "C" fn object_is_kind(this: Id, _sel: Sel, class: Id) -> Bool {
    let own: Option<&'static SimClass> = class_of(this).as_ref();
    flag(own.map_or(false, |own| own.is_subclass_of(class as *const SimClass)))
}

unsafe extern "C" fn object_is_member(this: Id, _sel: Sel, class: Id) -> Bool {
    flag(class_of(this) == class as *const SimClass)
}

unsafe extern "C" fn object_responds(this: Id, _sel: Sel, selector: Sel) -> Bool {
    let own: Option<&'static SimClass> = class_of(this).as_ref();
    flag(own.map_or(false, |own| own.find_method(selector).is_some()))
}

unsafe extern "C" fn object_conforms(this: Id, _sel: Sel, protocol: Id) -> Bool {
    let mut class: Option<&'static SimClass> = class_of(this).as_ref();
    while let Some(current) = class {
        let found = current
            .protocols
            .read()
            .iter()
            .any(|p| *p as *const SimProtocol as usize == protocol as usize);
        if found {
            return YES;
        }
        class = current.superclass();
    }
    NO
}

unsafe extern "C" fn object_is_equal(this: Id, _sel: Sel, other: Id) -> Bool {
    flag(state(this).objects_equal(this, other))
}

unsafe extern "C" fn object_hash(this: Id, _sel: Sel) -> u64 {
    this as u64
}

unsafe extern "C" fn object_description(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    let name = class_of(this)
        .as_ref()
        .map_or_else(String::new, |c| c.name.to_string_lossy().into_owned());
    let text = format!("<{}: {:#x}>", name, this as usize);
    state.autorelease(state.new_string(&text))
}

// ============================================================================
// NSString
// ============================================================================

unsafe extern "C" fn string_with_utf8(this: Id, sel: Sel, text: *const c_char) -> Id {
    let obj = object_alloc(this, sel);
    let obj = string_init_utf8(obj, sel, text);
    state(this).autorelease(obj)
}

unsafe extern "C" fn string_init_utf8(this: Id, _sel: Sel, text: *const c_char) -> Id {
    let state = state(this);
    if text.is_null() {
        state.release(this);
        return std::ptr::null_mut();
    }
    state.set_payload(this, Payload::Str(CStr::from_ptr(text).to_owned()));
    this
}

unsafe extern "C" fn string_utf8(this: Id, _sel: Sel) -> *const c_char {
    state(this)
        .with_payload(this, |p| match p {
            // The buffer lives as long as the object
            Payload::Str(text) => text.as_ptr(),
            _ => std::ptr::null(),
        })
        .unwrap_or(std::ptr::null())
}

unsafe extern "C" fn string_length(this: Id, _sel: Sel) -> u64 {
    state(this)
        .with_payload(this, |p| match p {
            Payload::Str(text) => text.to_string_lossy().encode_utf16().count() as u64,
            _ => 0,
        })
        .unwrap_or(0)
}

unsafe extern "C" fn string_is_equal(this: Id, _sel: Sel, other: Id) -> Bool {
    flag(state(this).objects_equal(this, other))
}

// ============================================================================
// NSNumber
// ============================================================================

unsafe fn number_init(this: Id, value: Number) -> Id {
    state(this).set_payload(this, Payload::Number(value));
    this
}

unsafe fn number_with(this: Id, value: Number) -> Id {
    match alloc_autoreleased(this) {
        Some((_, obj)) => number_init(obj, value),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn number_with_bool(this: Id, _sel: Sel, value: Bool) -> Id {
    number_with(this, Number::Bool(value != 0))
}

unsafe extern "C" fn number_with_int(this: Id, _sel: Sel, value: i32) -> Id {
    number_with(this, Number::Int(i64::from(value)))
}

unsafe extern "C" fn number_with_long_long(this: Id, _sel: Sel, value: i64) -> Id {
    number_with(this, Number::Int(value))
}

unsafe extern "C" fn number_with_ulong_long(this: Id, _sel: Sel, value: u64) -> Id {
    number_with(this, Number::UInt(value))
}

unsafe extern "C" fn number_with_double(this: Id, _sel: Sel, value: f64) -> Id {
    number_with(this, Number::Double(value))
}

unsafe extern "C" fn number_init_bool(this: Id, _sel: Sel, value: Bool) -> Id {
    number_init(this, Number::Bool(value != 0))
}

unsafe extern "C" fn number_init_int(this: Id, _sel: Sel, value: i32) -> Id {
    number_init(this, Number::Int(i64::from(value)))
}

unsafe extern "C" fn number_init_long_long(this: Id, _sel: Sel, value: i64) -> Id {
    number_init(this, Number::Int(value))
}

unsafe extern "C" fn number_init_ulong_long(this: Id, _sel: Sel, value: u64) -> Id {
    number_init(this, Number::UInt(value))
}

unsafe extern "C" fn number_init_double(this: Id, _sel: Sel, value: f64) -> Id {
    number_init(this, Number::Double(value))
}

unsafe extern "C" fn number_bool_value(this: Id, _sel: Sel) -> Bool {
    flag(number(state(this), this).as_i64() != 0)
}

unsafe extern "C" fn number_int_value(this: Id, _sel: Sel) -> i32 {
    number(state(this), this).as_i64() as i32
}

unsafe extern "C" fn number_long_long_value(this: Id, _sel: Sel) -> i64 {
    number(state(this), this).as_i64()
}

unsafe extern "C" fn number_ulong_long_value(this: Id, _sel: Sel) -> u64 {
    number(state(this), this).as_u64()
}

unsafe extern "C" fn number_double_value(this: Id, _sel: Sel) -> f64 {
    number(state(this), this).as_f64()
}

unsafe extern "C" fn number_objc_type(this: Id, _sel: Sel) -> *const c_char {
    number(state(this), this).obj_c_type().as_ptr() as *const c_char
}

unsafe extern "C" fn number_description(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    let text = match number(state, this) {
        Number::Bool(b) => u8::from(b).to_string(),
        Number::Int(i) => i.to_string(),
        Number::UInt(u) => u.to_string(),
        Number::Double(d) => d.to_string(),
    };
    state.autorelease(state.new_string(&text))
}

// ============================================================================
// Collections
// ============================================================================

unsafe extern "C" fn array_with_objects(this: Id, sel: Sel, objects: *const Id, count: u64) -> Id {
    match alloc_autoreleased(this) {
        Some((_, obj)) => array_init_objects(obj, sel, objects, count),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn array_init_objects(this: Id, _sel: Sel, objects: *const Id, count: u64) -> Id {
    let state = state(this);
    let items = objects_from(objects, count);
    for item in &items {
        state.retain(*item as Id);
    }
    state.set_payload(this, Payload::Array(items));
    this
}

unsafe extern "C" fn collection_count(this: Id, _sel: Sel) -> u64 {
    let state = state(this);
    state
        .with_payload(this, |p| match p {
            Payload::Array(items) | Payload::Set(items) => items.len() as u64,
            Payload::Dict(pairs) => pairs.len() as u64,
            _ => 0,
        })
        .unwrap_or(0)
}

unsafe extern "C" fn array_object_at(this: Id, _sel: Sel, index: u64) -> Id {
    let state = state(this);
    let items = items(state, this);
    match items.get(index as usize) {
        Some(item) => *item as Id,
        None => {
            let reason = format!(
                "*** -[NSArray objectAtIndex:]: index {} beyond bounds [0 .. {}]",
                index,
                items.len() as i64 - 1
            );
            state.raise("NSRangeException", &reason);
            std::ptr::null_mut()
        }
    }
}

unsafe extern "C" fn collection_contains(this: Id, _sel: Sel, object: Id) -> Bool {
    let state = state(this);
    flag(items(state, this).into_iter().any(|item| state.objects_equal(item as Id, object)))
}

unsafe extern "C" fn array_add_object(this: Id, _sel: Sel, object: Id) {
    if object.is_null() {
        state(this).raise("NSInvalidArgumentException", "*** -[NSMutableArray addObject:]: object cannot be nil");
        return;
    }
    let state = state(this);
    state.retain(object);
    let added = state.with_payload_mut(this, |p| match p {
        Payload::Array(items) => {
            items.push(object as usize);
            true
        }
        other => {
            *other = Payload::Array(vec![object as usize]);
            true
        }
    });
    if added.is_none() {
        state.release(object);
    }
}

unsafe extern "C" fn array_remove_all(this: Id, _sel: Sel) {
    let state = state(this);
    let removed = state
        .with_payload_mut(this, |p| match p {
            Payload::Array(items) => std::mem::take(items),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    for item in removed {
        state.release(item as Id);
    }
}

unsafe extern "C" fn dict_with_objects(this: Id, sel: Sel, objects: *const Id, keys: *const Id, count: u64) -> Id {
    match alloc_autoreleased(this) {
        Some((_, obj)) => dict_init_objects(obj, sel, objects, keys, count),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn dict_init_objects(this: Id, _sel: Sel, objects: *const Id, keys: *const Id, count: u64) -> Id {
    let state = state(this);
    let mut entries: Vec<(usize, usize)> = Vec::with_capacity(count as usize);
    if !objects.is_null() && !keys.is_null() {
        for i in 0..count as usize {
            let (key, value) = (*keys.add(i), *objects.add(i));
            if key.is_null() || value.is_null() {
                continue;
            }
            state.retain(key);
            state.retain(value);
            match entries.iter().position(|(k, _)| state.objects_equal(*k as Id, key)) {
                Some(existing) => {
                    let (old_key, old_value) = entries[existing];
                    entries[existing] = (key as usize, value as usize);
                    state.release(old_key as Id);
                    state.release(old_value as Id);
                }
                None => entries.push((key as usize, value as usize)),
            }
        }
    }
    state.set_payload(this, Payload::Dict(entries));
    this
}

unsafe extern "C" fn dict_object_for_key(this: Id, _sel: Sel, key: Id) -> Id {
    let state = state(this);
    pairs(state, this)
        .into_iter()
        .find(|(k, _)| state.objects_equal(*k as Id, key))
        .map_or(std::ptr::null_mut(), |(_, v)| v as Id)
}

unsafe extern "C" fn dict_all_keys(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    let keys = pairs(state, this).into_iter().map(|(k, _)| k).collect();
    state.autorelease(new_array(state, keys))
}

unsafe extern "C" fn dict_all_values(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    let values = pairs(state, this).into_iter().map(|(_, v)| v).collect();
    state.autorelease(new_array(state, values))
}

unsafe extern "C" fn set_with_objects(this: Id, sel: Sel, objects: *const Id, count: u64) -> Id {
    match alloc_autoreleased(this) {
        Some((_, obj)) => set_init_objects(obj, sel, objects, count),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn set_init_objects(this: Id, _sel: Sel, objects: *const Id, count: u64) -> Id {
    let state = state(this);
    let mut members: Vec<usize> = Vec::new();
    for item in objects_from(objects, count) {
        if !members.iter().any(|m| state.objects_equal(*m as Id, item as Id)) {
            state.retain(item as Id);
            members.push(item);
        }
    }
    state.set_payload(this, Payload::Set(members));
    this
}

unsafe extern "C" fn set_all_objects(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    let members = items(state, this);
    state.autorelease(new_array(state, members))
}

unsafe extern "C" fn null_singleton(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    state.singleton("NSNull", || match receiver_class(this) {
        Some(class) => state.alloc_instance(class),
        None => std::ptr::null_mut(),
    })
}

// ============================================================================
// NSException
// ============================================================================

unsafe extern "C" fn exception_with_name(this: Id, sel: Sel, name: Id, reason: Id, info: Id) -> Id {
    match alloc_autoreleased(this) {
        Some((_, obj)) => exception_init(obj, sel, name, reason, info),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn exception_init(this: Id, _sel: Sel, name: Id, reason: Id, _info: Id) -> Id {
    let state = state(this);
    state.retain(name);
    state.retain(reason);
    state.set_payload(
        this,
        Payload::Exception {
            name: name as usize,
            reason: reason as usize,
        },
    );
    this
}

unsafe extern "C" fn exception_name(this: Id, _sel: Sel) -> Id {
    state(this)
        .with_payload(this, |p| match p {
            Payload::Exception { name, .. } => *name as Id,
            _ => std::ptr::null_mut(),
        })
        .unwrap_or(std::ptr::null_mut())
}

unsafe extern "C" fn exception_reason(this: Id, _sel: Sel) -> Id {
    state(this)
        .with_payload(this, |p| match p {
            Payload::Exception { reason, .. } => *reason as Id,
            _ => std::ptr::null_mut(),
        })
        .unwrap_or(std::ptr::null_mut())
}

unsafe extern "C" fn exception_raise(this: Id, _sel: Sel) {
    state(this).raise_object(this)
}

// ============================================================================
// SimScreen
// ============================================================================

unsafe extern "C" fn screen_main(this: Id, _sel: Sel) -> Id {
    let state = state(this);
    state.singleton("SimScreen", || match receiver_class(this) {
        Some(class) => state.alloc_instance(class),
        None => std::ptr::null_mut(),
    })
}

unsafe extern "C" fn screen_frame(_this: Id, _sel: Sel) -> CGRect {
    SCREEN_FRAME
}

unsafe extern "C" fn screen_visible_frame(_this: Id, _sel: Sel) -> CGRect {
    SCREEN_VISIBLE_FRAME
}

unsafe extern "C" fn screen_origin(_this: Id, _sel: Sel) -> CGPoint {
    SCREEN_FRAME.origin
}

unsafe extern "C" fn screen_scale(_this: Id, _sel: Sel) -> f64 {
    2.0
}

unsafe extern "C" fn screen_brightness(_this: Id, _sel: Sel) -> f32 {
    0.75
}

unsafe extern "C" fn screen_depth(_this: Id, _sel: Sel) -> i32 {
    24
}

unsafe extern "C" fn screen_contains(_this: Id, _sel: Sel, point: CGPoint) -> Bool {
    let frame = SCREEN_FRAME;
    flag(
        point.x >= frame.origin.x
            && point.y >= frame.origin.y
            && point.x < frame.origin.x + frame.size.width
            && point.y < frame.origin.y + frame.size.height,
    )
}
