//! Native calling-convention types
//!
//! Every type unit maps to exactly one `NativeType`; the mapping carries C
//! layout (size, alignment, field offsets) for the target and the libffi
//! type used to build call interfaces.

use super::split::{split, split_one};
use super::structs::lookup_struct;
use super::typecode::TypeCode;
use crate::error::{BridgeError, Result};
use libffi::middle::Type;
use std::cell::RefCell;
use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::Arc;

#[cfg(target_arch = "x86_64")]
const LONG_DOUBLE_LAYOUT: (usize, usize) = (16, 16);
#[cfg(target_arch = "x86")]
const LONG_DOUBLE_LAYOUT: (usize, usize) = (12, 4);
#[cfg(all(target_arch = "aarch64", target_vendor = "apple"))]
const LONG_DOUBLE_LAYOUT: (usize, usize) = (8, 8);
#[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
const LONG_DOUBLE_LAYOUT: (usize, usize) = (16, 16);
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
const LONG_DOUBLE_LAYOUT: (usize, usize) = (8, 8);

#[derive(Debug, Clone, PartialEq)]
pub enum NativeType {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    LongDouble,
    Bool,
    Id,
    Class,
    Sel,
    CStr,
    Block,
    Pointer(Box<NativeType>),
    Struct(Arc<StructLayout>),
    Union(Arc<StructLayout>),
    Array { len: usize, element: Box<NativeType> },
}

/// C layout of a struct or union
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<NativeType>,
    pub offsets: Vec<usize>,
    pub size: usize,
    pub align: usize,
}

impl StructLayout {
    fn structure(name: &str, fields: Vec<NativeType>) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for field in &fields {
            let a = field.align();
            offset = round_up(offset, a);
            offsets.push(offset);
            offset += field.size();
            align = align.max(a);
        }
        Self {
            name: name.to_string(),
            // Empty aggregates still occupy a byte, as their libffi type does
            size: round_up(offset.max(1), align),
            fields,
            offsets,
            align,
        }
    }

    fn union(name: &str, fields: Vec<NativeType>) -> Self {
        let align = fields.iter().map(NativeType::align).max().unwrap_or(1);
        let size = fields.iter().map(NativeType::size).max().unwrap_or(0).max(1);
        Self {
            name: name.to_string(),
            offsets: vec![0; fields.len()],
            size: round_up(size, align),
            fields,
            align,
        }
    }
}

#[inline]
const fn round_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

impl NativeType {
    /// Size in bytes on the target
    pub fn size(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 => size_of::<u64>(),
            Self::F64 => size_of::<f64>(),
            Self::LongDouble => LONG_DOUBLE_LAYOUT.0,
            Self::Id | Self::Class | Self::Sel | Self::CStr | Self::Block | Self::Pointer(_) => {
                size_of::<usize>()
            }
            Self::Struct(layout) | Self::Union(layout) => layout.size,
            Self::Array { len, element } => len * element.size(),
        }
    }

    /// Alignment requirement on the target
    pub fn align(&self) -> usize {
        match self {
            Self::Void | Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 => align_of::<u64>(),
            Self::F64 => align_of::<f64>(),
            Self::LongDouble => LONG_DOUBLE_LAYOUT.1,
            Self::Id | Self::Class | Self::Sel | Self::CStr | Self::Block | Self::Pointer(_) => {
                align_of::<usize>()
            }
            Self::Struct(layout) | Self::Union(layout) => layout.align,
            Self::Array { element, .. } => element.align(),
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::LongDouble)
    }

    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Union(_) | Self::Array { .. })
    }

    #[inline]
    pub fn is_pointer_sized_handle(&self) -> bool {
        matches!(
            self,
            Self::Id | Self::Class | Self::Sel | Self::CStr | Self::Block | Self::Pointer(_)
        )
    }

    /// libffi description of this type
    pub fn ffi_type(&self) -> Type {
        match self {
            Self::Void => Type::void(),
            Self::I8 => Type::i8(),
            Self::U8 | Self::Bool => Type::u8(),
            Self::I16 => Type::i16(),
            Self::U16 => Type::u16(),
            Self::I32 => Type::i32(),
            Self::U32 => Type::u32(),
            Self::I64 => Type::i64(),
            Self::U64 => Type::u64(),
            Self::F32 => Type::f32(),
            Self::F64 => Type::f64(),
            Self::LongDouble => Type::longdouble(),
            Self::Id | Self::Class | Self::Sel | Self::CStr | Self::Block | Self::Pointer(_) => {
                Type::pointer()
            }
            Self::Struct(layout) => {
                let mut elements = Vec::with_capacity(layout.fields.len());
                for field in &layout.fields {
                    push_flattened(field, &mut elements);
                }
                if elements.is_empty() {
                    elements.push(Type::u8());
                }
                Type::structure(elements)
            }
            Self::Union(layout) => blob(layout.size, layout.align),
            Self::Array { .. } => {
                let mut elements = Vec::new();
                push_flattened(self, &mut elements);
                Type::structure(elements)
            }
        }
    }
}

/// Arrays inside aggregates are laid out as repeated elements
fn push_flattened(ty: &NativeType, out: &mut Vec<Type>) {
    match ty {
        NativeType::Array { len, element } => {
            for _ in 0..*len {
                push_flattened(element, out);
            }
        }
        other => out.push(other.ffi_type()),
    }
}

/// Unions have no libffi counterpart; pass them as a blob with the same
/// size and alignment
fn blob(size: usize, align: usize) -> Type {
    let (unit, unit_size) = match align {
        8 => (Type::u64 as fn() -> Type, 8),
        4 => (Type::u32 as fn() -> Type, 4),
        2 => (Type::u16 as fn() -> Type, 2),
        _ => (Type::u8 as fn() -> Type, 1),
    };
    let count = (size / unit_size).max(1);
    Type::structure((0..count).map(|_| unit()).collect::<Vec<_>>())
}

/// Map a type unit to its native type
///
/// Unknown codes resolve to `default` when one is given. Pointers whose
/// target cannot be resolved become opaque `void *` handles.
pub fn to_native_type(code: &TypeCode, default: Option<&NativeType>) -> Result<NativeType> {
    let unresolved = |reason: &str| -> Result<NativeType> {
        match default {
            Some(fallback) => Ok(fallback.clone()),
            None => Err(BridgeError::encoding(&code.encode(), 0, reason)),
        }
    };

    let native = match code {
        TypeCode::Char => NativeType::I8,
        TypeCode::UChar => NativeType::U8,
        TypeCode::Short => NativeType::I16,
        TypeCode::UShort => NativeType::U16,
        TypeCode::Int | TypeCode::Long => NativeType::I32,
        TypeCode::UInt | TypeCode::ULong => NativeType::U32,
        TypeCode::LongLong => NativeType::I64,
        TypeCode::ULongLong => NativeType::U64,
        TypeCode::Float => NativeType::F32,
        TypeCode::Double => NativeType::F64,
        TypeCode::LongDouble => NativeType::LongDouble,
        TypeCode::Bool => NativeType::Bool,
        TypeCode::Void => NativeType::Void,
        TypeCode::CString => NativeType::CStr,
        TypeCode::Object => NativeType::Id,
        TypeCode::Class => NativeType::Class,
        TypeCode::Selector => NativeType::Sel,
        TypeCode::Block => NativeType::Block,
        TypeCode::Pointer(inner) => {
            let target = to_native_type(inner, None).unwrap_or(NativeType::Void);
            NativeType::Pointer(Box::new(target))
        }
        TypeCode::Array { len, element } => {
            let element = to_native_type(&split_one(element)?, default)?;
            NativeType::Array {
                len: *len,
                element: Box::new(element),
            }
        }
        TypeCode::Struct { name, body } => match aggregate_fields(name, body.as_deref())? {
            Some(fields) => NativeType::Struct(Arc::new(StructLayout::structure(name, fields))),
            None => return unresolved("struct has no known layout"),
        },
        TypeCode::Union { name, body } => match aggregate_fields(name, body.as_deref())? {
            Some(fields) => NativeType::Union(Arc::new(StructLayout::union(name, fields))),
            None => return unresolved("union has no known layout"),
        },
        TypeCode::BitField(bits) => match *bits {
            0..=8 => NativeType::U8,
            9..=16 => NativeType::U16,
            17..=32 => NativeType::U32,
            _ => NativeType::U64,
        },
        TypeCode::Unknown => return unresolved("unknown type '?'"),
        TypeCode::Other(c) => return unresolved(&format!("unsupported type code '{}'", c)),
    };
    Ok(native)
}

thread_local! {
    /// Registered struct names being expanded on this thread
    static EXPANDING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Pops the registered name on drop, including on early error returns
struct Expanding;

impl Drop for Expanding {
    fn drop(&mut self) {
        EXPANDING.with(|names| names.borrow_mut().pop());
    }
}

fn aggregate_fields(name: &str, body: Option<&str>) -> Result<Option<Vec<NativeType>>> {
    let (body, _expanding) = match body {
        Some(body) => (body.to_string(), None),
        None => match lookup_struct(name) {
            Some(body) => {
                let cyclic = EXPANDING.with(|names| {
                    let mut names = names.borrow_mut();
                    if names.iter().any(|n| n == name) {
                        true
                    } else {
                        names.push(name.to_string());
                        false
                    }
                });
                if cyclic {
                    return Err(BridgeError::encoding(name, 0, "struct contains itself"));
                }
                (body, Some(Expanding))
            }
            None => return Ok(None),
        },
    };
    let fields = split(&body)?
        .iter()
        .map(|field| to_native_type(field, None))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(fields))
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::I8 => f.write_str("int8"),
            Self::U8 => f.write_str("uint8"),
            Self::I16 => f.write_str("int16"),
            Self::U16 => f.write_str("uint16"),
            Self::I32 => f.write_str("int32"),
            Self::U32 => f.write_str("uint32"),
            Self::I64 => f.write_str("int64"),
            Self::U64 => f.write_str("uint64"),
            Self::F32 => f.write_str("float"),
            Self::F64 => f.write_str("double"),
            Self::LongDouble => f.write_str("long double"),
            Self::Bool => f.write_str("bool"),
            Self::Id => f.write_str("id"),
            Self::Class => f.write_str("Class"),
            Self::Sel => f.write_str("SEL"),
            Self::CStr => f.write_str("char *"),
            Self::Block => f.write_str("block"),
            Self::Pointer(inner) => write!(f, "{} *", inner),
            Self::Struct(layout) => write!(f, "struct {} ({} bytes)", layout.name, layout.size),
            Self::Union(layout) => write!(f, "union {} ({} bytes)", layout.name, layout.size),
            Self::Array { len, element } => write!(f, "{}[{}]", element, len),
        }
    }
}
