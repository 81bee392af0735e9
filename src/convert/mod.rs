//! Value conversion - host values to Foundation objects and back
//!
//! Design: conversion goes through ordinary message sends, so it works the
//! same against any `ObjcRuntime`. Objects produced by `to_native` are
//! owned (+1); the caller releases them. Collections convert element by
//! element, with `Value::Nil` stored as the `NSNull` singleton since
//! Foundation collections cannot hold nil.
//!
//! Mapping:
//! - `Str` <-> `NSString`
//! - `Bool`, `Int`, `UInt`, `Float` <-> `NSNumber` (by `objCType`)
//! - `List` <-> `NSArray`, `Dict` <-> `NSDictionary`, `Set` <-> `NSSet`
//! - `Nil` <-> `NSNull`
//! - anything else stays `Value::Object`

#[cfg(test)]
mod tests;

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::introspect::ClassHandle;
use crate::lifecycle::Instance;
use crate::logging::trace;
use crate::value::Value;

/// Owned objects released when the conversion finishes, success or not
struct Temporaries {
    bridge: &'static Bridge,
    owned: Vec<usize>,
}

impl Temporaries {
    fn new(bridge: &'static Bridge) -> Self {
        Self {
            bridge,
            owned: Vec::new(),
        }
    }
}

impl Drop for Temporaries {
    fn drop(&mut self) {
        for address in self.owned.drain(..) {
            self.bridge.release_raw(address);
        }
    }
}

/// Box `value` as a native object, returning an owned reference
pub fn to_native(bridge: &'static Bridge, value: &Value) -> Result<usize> {
    let object = match value {
        Value::Nil => {
            let null = singleton(bridge, "NSNull", "null")?;
            retained(null)?
        }
        Value::Object(instance) => retained(instance.clone())?,
        Value::Class(class) => class.as_ptr() as usize,
        Value::Str(s) => alloc_init(bridge, "NSString", "initWithUTF8String:", &[Value::Str(s.clone())])?,
        Value::Bool(b) => alloc_init(bridge, "NSNumber", "initWithBool:", &[Value::Bool(*b)])?,
        Value::Int(i) => alloc_init(bridge, "NSNumber", "initWithLongLong:", &[Value::Int(*i)])?,
        Value::UInt(u) => alloc_init(bridge, "NSNumber", "initWithUnsignedLongLong:", &[Value::UInt(*u)])?,
        Value::Float(f) => alloc_init(bridge, "NSNumber", "initWithDouble:", &[Value::Float(*f)])?,
        Value::List(items) => collection(bridge, "NSArray", items)?,
        Value::Set(items) => collection(bridge, "NSSet", items)?,
        Value::Dict(pairs) => dictionary(bridge, pairs)?,
        Value::Selector(_) | Value::Pointer(_) | Value::Struct(_) => {
            return Err(BridgeError::Type {
                selector: "to_native".to_string(),
                index: 0,
                expected: "object-convertible value".to_string(),
                found: value.kind(),
                call_shape: "@".to_string(),
            })
        }
    };
    trace!(kind = %value.kind(), object = object as u64, "Value boxed");
    Ok(object)
}

/// Convert a native object to the closest host value
pub fn to_value(instance: &Instance) -> Result<Value> {
    if instance.is_nil() {
        return Ok(Value::Nil);
    }
    let bridge = instance
        .bridge()
        .ok_or_else(|| BridgeError::runtime("object has no runtime class"))?;

    if is_kind(bridge, instance, "NSString")? {
        return Ok(match instance.send("UTF8String", &[])? {
            Value::Str(s) => Value::Str(s),
            _ => Value::Str(String::new()),
        });
    }
    if is_kind(bridge, instance, "NSNumber")? {
        return number(instance);
    }
    if is_kind(bridge, instance, "NSNull")? {
        return Ok(Value::Nil);
    }
    if is_kind(bridge, instance, "NSArray")? {
        return Ok(Value::List(elements(instance)?));
    }
    if is_kind(bridge, instance, "NSDictionary")? {
        // allKeys and allObjects hand back autoreleased arrays
        return bridge.with_autorelease_pool(|| {
            let keys = object_of(instance.send("allKeys", &[])?);
            let count = keys.send("count", &[])?.as_u64().unwrap_or(0);
            let mut pairs = Vec::with_capacity(count as usize);
            for i in 0..count {
                let key = object_of(keys.send("objectAtIndex:", &[Value::UInt(i)])?);
                let value = object_of(instance.send("objectForKey:", &[Value::Object(key.clone())])?);
                pairs.push((to_value(&key)?, to_value(&value)?));
            }
            Ok(Value::Dict(pairs))
        });
    }
    if is_kind(bridge, instance, "NSSet")? {
        return bridge.with_autorelease_pool(|| {
            let all = object_of(instance.send("allObjects", &[])?);
            Ok(Value::Set(elements(&all)?))
        });
    }
    Ok(Value::Object(instance.clone()))
}

impl Instance {
    /// Convert this object with `convert::to_value`
    pub fn to_value(&self) -> Result<Value> {
        to_value(self)
    }
}

impl Bridge {
    /// Box `value` as a native object owned by the caller
    ///
    /// Release the result when done with it.
    pub fn box_value(&'static self, value: &Value) -> Result<Instance> {
        let address = to_native(self, value)?;
        Ok(self.wrap(address))
    }
}

fn object_of(value: Value) -> Instance {
    match value {
        Value::Object(instance) => instance,
        _ => Instance::nil(),
    }
}

fn retained(instance: Instance) -> Result<usize> {
    instance.retain()?;
    Ok(instance.address())
}

fn singleton(bridge: &'static Bridge, class: &str, selector: &str) -> Result<Instance> {
    Ok(object_of(bridge.require_class(class)?.send(selector, &[])?))
}

fn alloc_init(bridge: &'static Bridge, class: &str, selector: &str, args: &[Value]) -> Result<usize> {
    let class = bridge.require_class(class)?;
    let allocated = object_of(class.send("alloc", &[])?);
    let object = object_of(allocated.send(selector, args)?);
    if object.is_nil() {
        return Err(BridgeError::runtime(format!("-[{} {}] returned nil", class.name(), selector)));
    }
    Ok(object.address())
}

/// Element pointer for a collection slot; converted elements are owned by
/// `temps` until the collection has retained them
fn element(bridge: &'static Bridge, value: &Value, temps: &mut Temporaries) -> Result<usize> {
    match value {
        Value::Object(instance) if !instance.is_nil() => {
            if !instance.is_alive() {
                return Err(BridgeError::Deallocated {
                    address: instance.address(),
                });
            }
            Ok(instance.address())
        }
        other => {
            let object = to_native(bridge, other)?;
            temps.owned.push(object);
            Ok(object)
        }
    }
}

fn collection(bridge: &'static Bridge, class: &str, items: &[Value]) -> Result<usize> {
    let mut temps = Temporaries::new(bridge);
    let objects = items
        .iter()
        .map(|item| element(bridge, item, &mut temps))
        .collect::<Result<Vec<usize>>>()?;
    alloc_init(
        bridge,
        class,
        "initWithObjects:count:",
        &[
            Value::Pointer(objects.as_ptr() as usize),
            Value::UInt(objects.len() as u64),
        ],
    )
}

fn dictionary(bridge: &'static Bridge, pairs: &[(Value, Value)]) -> Result<usize> {
    let mut temps = Temporaries::new(bridge);
    let mut keys = Vec::with_capacity(pairs.len());
    let mut values = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        keys.push(element(bridge, key, &mut temps)?);
        values.push(element(bridge, value, &mut temps)?);
    }
    alloc_init(
        bridge,
        "NSDictionary",
        "initWithObjects:forKeys:count:",
        &[
            Value::Pointer(values.as_ptr() as usize),
            Value::Pointer(keys.as_ptr() as usize),
            Value::UInt(pairs.len() as u64),
        ],
    )
}

fn is_kind(bridge: &'static Bridge, instance: &Instance, class: &str) -> Result<bool> {
    let Some(class) = bridge.get_class(class) else {
        return Ok(false);
    };
    kind_of(instance, &class)
}

fn kind_of(instance: &Instance, class: &ClassHandle) -> Result<bool> {
    Ok(instance
        .send("isKindOfClass:", &[Value::Class(class.clone())])?
        .as_bool()
        .unwrap_or(false))
}

fn number(instance: &Instance) -> Result<Value> {
    let code = instance.send("objCType", &[])?;
    let code = code.as_str().unwrap_or("q");
    // 'c' is how BOOL numbers report themselves
    Ok(match code {
        "c" | "B" => Value::Bool(instance.send("boolValue", &[])?.as_bool().unwrap_or(false)),
        "f" | "d" => instance.send("doubleValue", &[])?,
        "C" | "S" | "I" | "L" | "Q" => instance.send("unsignedLongLongValue", &[])?,
        _ => instance.send("longLongValue", &[])?,
    })
}

fn elements(array: &Instance) -> Result<Vec<Value>> {
    let count = array.send("count", &[])?.as_u64().unwrap_or(0);
    (0..count)
        .map(|i| to_value(&object_of(array.send("objectAtIndex:", &[Value::UInt(i)])?)))
        .collect()
}
