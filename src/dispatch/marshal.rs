//! Host values to native memory and back
//!
//! Writers fill caller-provided, suitably aligned storage; anything that
//! must outlive the write (C strings, converted objects) goes into a
//! `Keepalive` owned by the call.

use crate::bridge::Bridge;
use crate::codec::{NativeType, StructLayout};
use crate::error::BridgeError;
use crate::lifecycle::Instance;
use crate::runtime::Id;
use crate::value::{StructValue, Value};
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

#[derive(Debug)]
pub(crate) enum MarshalError {
    /// Value does not fit the native type
    Mismatch { expected: String, found: String },
    /// Conversion itself failed (dead object, missing class, ...)
    Failed(BridgeError),
}

impl From<BridgeError> for MarshalError {
    fn from(error: BridgeError) -> Self {
        Self::Failed(error)
    }
}

type Written = std::result::Result<(), MarshalError>;

fn mismatch(ty: &NativeType, value: &Value) -> MarshalError {
    MarshalError::Mismatch {
        expected: ty.to_string(),
        found: value.kind(),
    }
}

/// Storage that must outlive a native call
#[derive(Default)]
pub(crate) struct Keepalive {
    strings: Vec<CString>,
    /// Owned references created for the call, released afterwards
    temporaries: Vec<usize>,
}

impl Keepalive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release converted temporaries
    pub fn release(self, bridge: &'static Bridge) {
        for object in self.temporaries {
            bridge.release_raw(object);
        }
    }

    /// Hand temporaries to the current autorelease pool instead
    pub fn autorelease(mut self, bridge: &'static Bridge) {
        for object in self.temporaries.drain(..) {
            bridge.autorelease_raw(object);
        }
    }
}

/// Aligned scratch memory for one native value
pub(crate) struct Slot {
    words: Vec<u128>,
}

impl Slot {
    /// At least `size` bytes, never smaller than a return register
    pub fn new(size: usize) -> Self {
        let bytes = size.max(std::mem::size_of::<u64>());
        Self {
            words: vec![0u128; (bytes + 15) / 16],
        }
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as *mut u8
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr() as *const u8
    }
}

#[inline]
unsafe fn put<T>(dst: *mut u8, value: T) {
    ptr::write_unaligned(dst as *mut T, value)
}

#[inline]
unsafe fn get<T: Copy>(src: *const u8) -> T {
    ptr::read_unaligned(src as *const T)
}

/// Write `value` as `ty` at `dst`
///
/// # Safety
/// `dst` must have room for `ty.size()` bytes.
pub(crate) unsafe fn write_value(
    bridge: &'static Bridge,
    ty: &NativeType,
    value: &Value,
    dst: *mut u8,
    keep: &mut Keepalive,
) -> Written {
    match ty {
        NativeType::Void => return Err(mismatch(ty, value)),
        NativeType::I8 => put(dst, signed::<i8>(ty, value)?),
        NativeType::I16 => put(dst, signed::<i16>(ty, value)?),
        NativeType::I32 => put(dst, signed::<i32>(ty, value)?),
        NativeType::I64 => put(dst, signed::<i64>(ty, value)?),
        NativeType::U8 => put(dst, unsigned::<u8>(ty, value)?),
        NativeType::U16 => put(dst, unsigned::<u16>(ty, value)?),
        NativeType::U32 => put(dst, unsigned::<u32>(ty, value)?),
        NativeType::U64 => put(dst, unsigned::<u64>(ty, value)?),
        NativeType::Bool => put(dst, u8::from(value.as_bool().ok_or_else(|| mismatch(ty, value))?)),
        NativeType::F32 => put(dst, float(ty, value)? as f32),
        NativeType::F64 => put(dst, float(ty, value)?),
        NativeType::LongDouble => long_double::write(dst, float(ty, value)?),
        NativeType::Id => put(dst, object_pointer(bridge, ty, value, keep)?),
        NativeType::Class => {
            let class = match value {
                Value::Nil => 0,
                Value::Class(class) => class.as_ptr() as usize,
                Value::Str(name) => bridge.require_class(name)?.as_ptr() as usize,
                _ => return Err(mismatch(ty, value)),
            };
            put(dst, class)
        }
        NativeType::Sel => {
            let sel = match value {
                Value::Nil => 0,
                Value::Selector(sel) => sel.as_ptr() as usize,
                Value::Str(name) => bridge.selector(name)?.as_ptr() as usize,
                _ => return Err(mismatch(ty, value)),
            };
            put(dst, sel)
        }
        NativeType::CStr => {
            let text = match value {
                Value::Nil => 0,
                Value::Pointer(p) => *p,
                Value::Str(s) => {
                    let owned = CString::new(s.as_str()).map_err(|_| mismatch(ty, value))?;
                    let address = owned.as_ptr() as usize;
                    keep.strings.push(owned);
                    address
                }
                _ => return Err(mismatch(ty, value)),
            };
            put(dst, text)
        }
        NativeType::Pointer(_) | NativeType::Block => {
            let address = match value {
                Value::Nil => 0,
                Value::Pointer(p) => *p,
                Value::Object(instance) => live_address(instance)?,
                _ => return Err(mismatch(ty, value)),
            };
            put(dst, address)
        }
        NativeType::Struct(layout) => write_struct(bridge, ty, layout, value, dst, keep)?,
        NativeType::Union(layout) => {
            ptr::write_bytes(dst, 0, layout.size);
            let first = match value {
                Value::Struct(s) if s.fields.len() == 1 => &s.fields[0],
                Value::List(items) if items.len() == 1 => &items[0],
                other => other,
            };
            match layout.fields.first() {
                Some(field) => write_value(bridge, field, first, dst, keep)?,
                None => return Err(mismatch(ty, value)),
            }
        }
        NativeType::Array { len, element } => {
            let items = match value {
                Value::List(items) if items.len() == *len => items,
                _ => return Err(mismatch(ty, value)),
            };
            let stride = element.size();
            for (i, item) in items.iter().enumerate() {
                write_value(bridge, element, item, dst.add(i * stride), keep)?;
            }
        }
    }
    Ok(())
}

unsafe fn write_struct(
    bridge: &'static Bridge,
    ty: &NativeType,
    layout: &StructLayout,
    value: &Value,
    dst: *mut u8,
    keep: &mut Keepalive,
) -> Written {
    let fields: &[Value] = match value {
        Value::Struct(s) => &s.fields,
        Value::List(items) => items,
        _ => return Err(mismatch(ty, value)),
    };
    if fields.len() != layout.fields.len() {
        return Err(MarshalError::Mismatch {
            expected: format!("{} with {} field(s)", ty, layout.fields.len()),
            found: value.kind(),
        });
    }
    ptr::write_bytes(dst, 0, layout.size);
    for ((field_ty, offset), field) in layout.fields.iter().zip(&layout.offsets).zip(fields) {
        write_value(bridge, field_ty, field, dst.add(*offset), keep)?;
    }
    Ok(())
}

fn signed<T: TryFrom<i64>>(ty: &NativeType, value: &Value) -> std::result::Result<T, MarshalError> {
    value
        .as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(ty, value))
}

fn unsigned<T: TryFrom<u64>>(ty: &NativeType, value: &Value) -> std::result::Result<T, MarshalError> {
    value
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(ty, value))
}

fn float(ty: &NativeType, value: &Value) -> std::result::Result<f64, MarshalError> {
    match value {
        Value::Bool(_) => Err(mismatch(ty, value)),
        other => other.as_f64().ok_or_else(|| mismatch(ty, value)),
    }
}

fn live_address(instance: &Instance) -> std::result::Result<usize, MarshalError> {
    if instance.is_nil() {
        return Ok(0);
    }
    if !instance.is_alive() {
        return Err(MarshalError::Failed(BridgeError::Deallocated {
            address: instance.address(),
        }));
    }
    Ok(instance.address())
}

/// Object pointer for an `id` slot, converting host values on the way
fn object_pointer(
    bridge: &'static Bridge,
    ty: &NativeType,
    value: &Value,
    keep: &mut Keepalive,
) -> std::result::Result<usize, MarshalError> {
    match value {
        Value::Nil => Ok(0),
        Value::Object(instance) => live_address(instance),
        Value::Class(class) => Ok(class.as_ptr() as usize),
        Value::Pointer(p) => Ok(*p),
        Value::Selector(_) => Err(mismatch(ty, value)),
        Value::Struct(_) => Err(mismatch(ty, value)),
        _ => {
            let object = crate::convert::to_native(bridge, value)?;
            keep.temporaries.push(object);
            Ok(object)
        }
    }
}

/// Read a value of type `ty` from `src`
///
/// # Safety
/// `src` must hold an initialized `ty`.
pub(crate) unsafe fn read_value(bridge: &'static Bridge, ty: &NativeType, src: *const u8) -> Value {
    match ty {
        NativeType::Void => Value::Nil,
        NativeType::I8 => Value::Int(i64::from(get::<i8>(src))),
        NativeType::I16 => Value::Int(i64::from(get::<i16>(src))),
        NativeType::I32 => Value::Int(i64::from(get::<i32>(src))),
        NativeType::I64 => Value::Int(get::<i64>(src)),
        NativeType::U8 => Value::UInt(u64::from(get::<u8>(src))),
        NativeType::U16 => Value::UInt(u64::from(get::<u16>(src))),
        NativeType::U32 => Value::UInt(u64::from(get::<u32>(src))),
        NativeType::U64 => Value::UInt(get::<u64>(src)),
        NativeType::Bool => Value::Bool(get::<u8>(src) != 0),
        NativeType::F32 => Value::Float(f64::from(get::<f32>(src))),
        NativeType::F64 => Value::Float(get::<f64>(src)),
        NativeType::LongDouble => Value::Float(long_double::read(src)),
        NativeType::Id => Value::Object(bridge.wrap(get::<usize>(src))),
        NativeType::Class => match bridge.class_for_ptr(get::<usize>(src) as Id) {
            Some(class) => Value::Class(class),
            None => Value::Nil,
        },
        NativeType::Sel => match bridge.selector_from_ptr(get::<usize>(src) as _) {
            Some(sel) => Value::Selector(sel),
            None => Value::Nil,
        },
        NativeType::CStr => {
            let text = get::<*const c_char>(src);
            if text.is_null() {
                Value::Nil
            } else {
                Value::Str(CStr::from_ptr(text).to_string_lossy().into_owned())
            }
        }
        NativeType::Pointer(_) | NativeType::Block => Value::Pointer(get::<usize>(src)),
        NativeType::Struct(layout) => Value::Struct(StructValue::new(
            layout.name.clone(),
            layout
                .fields
                .iter()
                .zip(&layout.offsets)
                .map(|(field, offset)| read_value(bridge, field, src.add(*offset)))
                .collect(),
        )),
        NativeType::Union(layout) => match layout.fields.first() {
            Some(field) => read_value(bridge, field, src),
            None => Value::Nil,
        },
        NativeType::Array { len, element } => Value::List(
            (0..*len)
                .map(|i| read_value(bridge, element, src.add(i * element.size())))
                .collect(),
        ),
    }
}

/// Read a call result
///
/// libffi widens integral results narrower than a register to a full
/// `ffi_arg`; read the whole word and narrow it.
pub(crate) unsafe fn read_return(bridge: &'static Bridge, ty: &NativeType, src: *const u8) -> Value {
    match ty {
        NativeType::I8 | NativeType::I16 | NativeType::I32 => {
            let word = get::<i64>(src);
            let narrowed = match ty {
                NativeType::I8 => i64::from(word as i8),
                NativeType::I16 => i64::from(word as i16),
                _ => i64::from(word as i32),
            };
            Value::Int(narrowed)
        }
        NativeType::U8 | NativeType::U16 | NativeType::U32 => {
            let word = get::<u64>(src);
            let narrowed = match ty {
                NativeType::U8 => u64::from(word as u8),
                NativeType::U16 => u64::from(word as u16),
                _ => u64::from(word as u32),
            };
            Value::UInt(narrowed)
        }
        NativeType::Bool => Value::Bool(get::<u64>(src) as u8 != 0),
        other => read_value(bridge, other, src),
    }
}

thread_local! {
    /// Backing store for the last C string a host implementation returned
    static RETURNED_STRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Write a host implementation's result into a libffi closure result
///
/// Integral results are widened to a full `ffi_arg`. Returned C strings
/// stay valid until the next string return on the same thread; converted
/// objects are autoreleased.
///
/// # Safety
/// `dst` must have room for the larger of `ty.size()` and a register.
pub(crate) unsafe fn write_return(
    bridge: &'static Bridge,
    ty: &NativeType,
    value: &Value,
    dst: *mut u8,
) -> Written {
    match ty {
        NativeType::Void => Ok(()),
        NativeType::I8 | NativeType::I16 | NativeType::I32 => {
            let v = match ty {
                NativeType::I8 => i64::from(signed::<i8>(ty, value)?),
                NativeType::I16 => i64::from(signed::<i16>(ty, value)?),
                _ => i64::from(signed::<i32>(ty, value)?),
            };
            put(dst, v);
            Ok(())
        }
        NativeType::U8 | NativeType::U16 | NativeType::U32 => {
            let v = match ty {
                NativeType::U8 => u64::from(unsigned::<u8>(ty, value)?),
                NativeType::U16 => u64::from(unsigned::<u16>(ty, value)?),
                _ => u64::from(unsigned::<u32>(ty, value)?),
            };
            put(dst, v);
            Ok(())
        }
        NativeType::Bool => {
            let flag = value.as_bool().ok_or_else(|| mismatch(ty, value))?;
            put(dst, u64::from(flag));
            Ok(())
        }
        NativeType::CStr => match value {
            Value::Str(s) => {
                let owned = CString::new(s.as_str()).map_err(|_| mismatch(ty, value))?;
                put(dst, owned.as_ptr() as usize);
                RETURNED_STRING.with(|slot| *slot.borrow_mut() = Some(owned));
                Ok(())
            }
            other => {
                let mut keep = Keepalive::new();
                write_value(bridge, ty, other, dst, &mut keep)
            }
        },
        other => {
            let mut keep = Keepalive::new();
            let written = write_value(bridge, other, value, dst, &mut keep);
            keep.autorelease(bridge);
            written
        }
    }
}

/// `long double` storage formats
mod long_double {
    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    pub unsafe fn write(dst: *mut u8, value: f64) {
        let bytes = to_x87(value);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    pub unsafe fn read(src: *const u8) -> f64 {
        let mut bytes = [0u8; 10];
        std::ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), bytes.len());
        from_x87(bytes)
    }

    #[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
    pub unsafe fn write(dst: *mut u8, value: f64) {
        let bytes = to_binary128(value).to_le_bytes();
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    }

    #[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
    pub unsafe fn read(src: *const u8) -> f64 {
        from_binary128(std::ptr::read_unaligned(src as *const u128))
    }

    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        all(target_arch = "aarch64", not(target_vendor = "apple"))
    )))]
    pub unsafe fn write(dst: *mut u8, value: f64) {
        std::ptr::write_unaligned(dst as *mut f64, value)
    }

    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        all(target_arch = "aarch64", not(target_vendor = "apple"))
    )))]
    pub unsafe fn read(src: *const u8) -> f64 {
        std::ptr::read_unaligned(src as *const f64)
    }

    /// 80-bit x87 extended precision, explicit integer bit
    #[allow(dead_code)]
    pub fn to_x87(value: f64) -> [u8; 10] {
        let bits = value.to_bits();
        let sign = ((bits >> 63) as u16) << 15;
        let exp = ((bits >> 52) & 0x7ff) as u16;
        let frac = bits & ((1u64 << 52) - 1);

        let (exp, mantissa) = if exp == 0 && frac == 0 {
            (0u16, 0u64)
        } else if exp == 0x7ff {
            (0x7fff, (1u64 << 63) | (frac << 11))
        } else if exp == 0 {
            // Subnormal double: normalize
            let shift = frac.leading_zeros();
            ((15372 - shift) as u16, frac << shift)
        } else {
            (exp + (16383 - 1023), (1u64 << 63) | (frac << 11))
        };

        let mut out = [0u8; 10];
        out[..8].copy_from_slice(&mantissa.to_le_bytes());
        out[8..].copy_from_slice(&(sign | exp).to_le_bytes());
        out
    }

    #[allow(dead_code)]
    pub fn from_x87(bytes: [u8; 10]) -> f64 {
        let mut m = [0u8; 8];
        m.copy_from_slice(&bytes[..8]);
        let mantissa = u64::from_le_bytes(m);
        let se = u16::from_le_bytes([bytes[8], bytes[9]]);
        let sign = if se & 0x8000 != 0 { -1.0 } else { 1.0 };
        let exp = i32::from(se & 0x7fff);
        if exp == 0 && mantissa == 0 {
            return sign * 0.0;
        }
        if exp == 0x7fff {
            return if mantissa << 1 == 0 { sign * f64::INFINITY } else { f64::NAN };
        }
        sign * ldexp(mantissa as f64, exp - 16383 - 63)
    }

    /// `value * 2^exp` without overflowing the intermediate power
    #[allow(dead_code)]
    fn ldexp(mut value: f64, mut exp: i32) -> f64 {
        while exp > 1000 {
            value *= 2f64.powi(1000);
            exp -= 1000;
        }
        while exp < -1000 {
            value *= 2f64.powi(-1000);
            exp += 1000;
        }
        value * 2f64.powi(exp)
    }

    /// IEEE binary128
    #[allow(dead_code)]
    pub fn to_binary128(value: f64) -> u128 {
        let bits = value.to_bits();
        let sign = u128::from(bits >> 63) << 127;
        let exp = (bits >> 52) & 0x7ff;
        let frac = u128::from(bits & ((1u64 << 52) - 1));
        if exp == 0 && frac == 0 {
            return sign;
        }
        if exp == 0x7ff {
            return sign | (0x7fffu128 << 112) | (frac << 60);
        }
        if exp == 0 {
            let top = 127 - frac.leading_zeros();
            let field = (frac & !(1u128 << top)) << (112 - top);
            let exp = u128::from(top) + 16383 - 1074;
            return sign | (exp << 112) | field;
        }
        sign | (u128::from(exp + (16383 - 1023)) << 112) | (frac << 60)
    }

    #[allow(dead_code)]
    pub fn from_binary128(bits: u128) -> f64 {
        let sign = if bits >> 127 != 0 { -1.0 } else { 1.0 };
        let exp = ((bits >> 112) & 0x7fff) as i32;
        let frac = bits & ((1u128 << 112) - 1);
        if exp == 0 && frac == 0 {
            return sign * 0.0;
        }
        if exp == 0x7fff {
            return if frac == 0 { sign * f64::INFINITY } else { f64::NAN };
        }
        let mantissa = (frac >> 60) as u64 | (1u64 << 52);
        sign * ldexp(mantissa as f64, exp - 16383 - 52)
    }
}

#[cfg(test)]
pub(crate) use long_double::{from_binary128, from_x87, to_binary128, to_x87};
