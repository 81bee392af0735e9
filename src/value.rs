//! Host-side values exchanged with the runtime

use crate::introspect::{ClassHandle, Selector};
use crate::lifecycle::Instance;
use std::fmt;

/// A value crossing the bridge
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Selector(Selector),
    Class(ClassHandle),
    Object(Instance),
    /// Raw address for `^`, `?` and block arguments
    Pointer(usize),
    Struct(StructValue),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Set(Vec<Value>),
}

/// A C struct passed or returned by value
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub name: String,
    pub fields: Vec<Value>,
}

impl StructValue {
    pub fn new(name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// All scalar leaves as `f64`, depth first
    ///
    /// `None` if any leaf is not numeric. Handy for geometry structs.
    pub fn flatten_f64(&self) -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(self.fields.len());
        fn walk(value: &Value, out: &mut Vec<f64>) -> bool {
            match value {
                Value::Struct(inner) => inner.fields.iter().all(|f| walk(f, out)),
                Value::List(items) => items.iter().all(|f| walk(f, out)),
                other => match other.as_f64() {
                    Some(v) => {
                        out.push(v);
                        true
                    }
                    None => false,
                },
            }
        }
        if self.fields.iter().all(|f| walk(f, &mut out)) {
            Some(out)
        } else {
            None
        }
    }
}

impl Value {
    /// True for `Nil` and for the nil instance
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Object(instance) => instance.is_nil(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::UInt(u) => Some(*u != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassHandle> {
        match self {
            Value::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Short description of the variant, used in type errors
    pub fn kind(&self) -> String {
        match self {
            Value::Nil => "nil".into(),
            Value::Bool(b) => format!("bool {}", b),
            Value::Int(i) => format!("int {}", i),
            Value::UInt(u) => format!("uint {}", u),
            Value::Float(f) => format!("float {}", f),
            Value::Str(_) => "string".into(),
            Value::Selector(_) => "selector".into(),
            Value::Class(_) => "class".into(),
            Value::Object(_) => "object".into(),
            Value::Pointer(_) => "pointer".into(),
            Value::Struct(s) => format!("struct {}", s.name),
            Value::List(items) => format!("list of {}", items.len()),
            Value::Dict(items) => format!("dict of {}", items.len()),
            Value::Set(items) => format!("set of {}", items.len()),
        }
    }
}

/// Objects and classes compare by identity, everything else by value
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).map_or(false, |a| a == *b)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Selector(a), Value::Selector(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "YES" } else { "NO" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Selector(sel) => write!(f, "@selector({})", sel.name()),
            Value::Class(class) => f.write_str(class.name()),
            Value::Object(instance) => write!(f, "{}", instance),
            Value::Pointer(addr) => write!(f, "{:#x}", addr),
            Value::Struct(s) => {
                write!(f, "{}(", s.name)?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str(")")
            }
            Value::List(items) | Value::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Dict(items) => {
                f.write_str("{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Object(v)
    }
}

impl From<&Instance> for Value {
    fn from(v: &Instance) -> Self {
        Value::Object(v.clone())
    }
}

impl From<ClassHandle> for Value {
    fn from(v: ClassHandle) -> Self {
        Value::Class(v)
    }
}

impl From<Selector> for Value {
    fn from(v: Selector) -> Self {
        Value::Selector(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
