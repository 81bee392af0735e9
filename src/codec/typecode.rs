//! Single encoded type units

use std::fmt;

/// One unit of an Objective-C type encoding
///
/// Compound forms keep their interior as canonical text (quoted field
/// names removed). The interior is only interpreted when a native layout
/// is requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    /// `l` is always 32 bits, even on LP64 targets
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    Bool,
    Void,
    CString,
    Object,
    Class,
    Selector,
    /// `?`: unknown type, usually a function pointer target
    Unknown,
    /// `@?`
    Block,
    Pointer(Box<TypeCode>),
    Array { len: usize, element: String },
    Struct { name: String, body: Option<String> },
    Union { name: String, body: Option<String> },
    BitField(u32),
    /// Printable code this codec does not know
    Other(char),
}

impl TypeCode {
    /// Map a one-character primitive code
    pub(crate) fn primitive(code: u8) -> Option<Self> {
        let code = match code {
            b'c' => Self::Char,
            b'C' => Self::UChar,
            b's' => Self::Short,
            b'S' => Self::UShort,
            b'i' => Self::Int,
            b'I' => Self::UInt,
            b'l' => Self::Long,
            b'L' => Self::ULong,
            b'q' => Self::LongLong,
            b'Q' => Self::ULongLong,
            b'f' => Self::Float,
            b'd' => Self::Double,
            b'D' => Self::LongDouble,
            b'B' => Self::Bool,
            b'v' => Self::Void,
            b'*' => Self::CString,
            b'@' => Self::Object,
            b'#' => Self::Class,
            b':' => Self::Selector,
            b'?' => Self::Unknown,
            _ => return None,
        };
        Some(code)
    }

    /// Canonical encoding: no qualifiers, offsets or quoted names
    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn encode_into(&self, out: &mut String) {
        match self {
            Self::Char => out.push('c'),
            Self::UChar => out.push('C'),
            Self::Short => out.push('s'),
            Self::UShort => out.push('S'),
            Self::Int => out.push('i'),
            Self::UInt => out.push('I'),
            Self::Long => out.push('l'),
            Self::ULong => out.push('L'),
            Self::LongLong => out.push('q'),
            Self::ULongLong => out.push('Q'),
            Self::Float => out.push('f'),
            Self::Double => out.push('d'),
            Self::LongDouble => out.push('D'),
            Self::Bool => out.push('B'),
            Self::Void => out.push('v'),
            Self::CString => out.push('*'),
            Self::Object => out.push('@'),
            Self::Class => out.push('#'),
            Self::Selector => out.push(':'),
            Self::Unknown => out.push('?'),
            Self::Block => out.push_str("@?"),
            Self::Pointer(inner) => {
                out.push('^');
                inner.encode_into(out);
            }
            Self::Array { len, element } => {
                out.push('[');
                out.push_str(&len.to_string());
                out.push_str(element);
                out.push(']');
            }
            Self::Struct { name, body } => encode_aggregate(out, '{', '}', name, body.as_deref()),
            Self::Union { name, body } => encode_aggregate(out, '(', ')', name, body.as_deref()),
            Self::BitField(bits) => {
                out.push('b');
                out.push_str(&bits.to_string());
            }
            Self::Other(c) => out.push(*c),
        }
    }

    /// Object-like codes: `@`, `#` and blocks are all retainable pointers
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object | Self::Class | Self::Block)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Category used in diagnostics and by the dispatch classifier
    pub fn category(&self) -> TypeCategory {
        match self {
            Self::Object | Self::Class | Self::Block | Self::Selector | Self::Unknown => {
                TypeCategory::Handle
            }
            Self::Pointer(_) | Self::CString => TypeCategory::Pointer,
            Self::Struct { .. } | Self::Union { .. } | Self::Array { .. } => TypeCategory::Aggregate,
            _ => TypeCategory::Primitive,
        }
    }
}

fn encode_aggregate(out: &mut String, open: char, close: char, name: &str, body: Option<&str>) {
    out.push(open);
    out.push_str(name);
    if let Some(body) = body {
        out.push('=');
        out.push_str(body);
    }
    out.push(close);
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Coarse classification of a type unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Primitive,
    Pointer,
    Aggregate,
    /// Opaque runtime handle: object, class, selector, block
    Handle,
}
